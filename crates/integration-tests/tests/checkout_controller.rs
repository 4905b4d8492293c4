//! Integration tests for the checkout steps.
//!
//! Run with: cargo test -p corner-shop-integration-tests

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use axum::http::StatusCode;

use corner_shop_core::checkout::CheckoutStep;
use corner_shop_core::{PaymentState, UserId, VariantId};
use corner_shop_integration_tests::{
    SHOPPER_API_KEY, TestApp, address_fields, card_payment, pairs, us_address,
};

const CHECK: i32 = 1;
const CREDIT_CARD: i32 = 2;
const GOOD_CARD: &str = "4111111111111111";
const DECLINED_CARD: &str = "4000000000000002";

// ============================================================================
// Entry
// ============================================================================

#[tokio::test]
async fn test_checkout_without_order_redirects_to_cart() {
    let mut app = TestApp::new();

    app.get("/checkout").await.assert_redirect("/cart");
    app.get("/checkout/address").await.assert_redirect("/cart");
}

#[tokio::test]
async fn test_checkout_starts_at_first_step() {
    let mut app = TestApp::new();
    app.cart_with(1, 1).await;

    app.get("/checkout").await.assert_redirect("/checkout/address");

    let response = app.get("/checkout/address").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Billing Address"));
    assert!(response.body.contains("/checkout/update/address"));
}

#[tokio::test]
async fn test_unknown_step_redirects_to_first_step() {
    let mut app = TestApp::new();
    app.cart_with(1, 1).await;

    app.get("/checkout/nowhere")
        .await
        .assert_redirect("/checkout/address");
}

#[tokio::test]
async fn test_cannot_skip_ahead() {
    let mut app = TestApp::new();
    app.order_at_delivery().await;

    app.get("/checkout/confirm")
        .await
        .assert_redirect("/checkout/delivery");
}

#[tokio::test]
async fn test_viewing_earlier_step_does_not_store_it() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;

    let response = app.get("/checkout/address").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("10 Lovely Street"));

    assert_eq!(app.order(&order.number).await.state, CheckoutStep::PAYMENT);
}

#[tokio::test]
async fn test_empty_cart_cannot_check_out() {
    let mut app = TestApp::new();
    let order = app.cart_with(1, 1).await;
    app.post("/cart/empty", &[]).await.assert_redirect("/cart");

    app.get("/checkout/address").await.assert_redirect("/cart");
    assert!(app.order(&order.number).await.line_items.is_empty());
}

#[tokio::test]
async fn test_unavailable_items_block_checkout() {
    let mut app = TestApp::new();
    app.cart_with(1, 3).await;
    app.sell_elsewhere(1, 24).await;

    app.get("/checkout/address").await.assert_redirect("/cart");

    let cart = app.get("/cart").await;
    assert!(cart.body.contains("Ruby on Rails Tote became unavailable."));
}

// ============================================================================
// Address
// ============================================================================

#[tokio::test]
async fn test_address_step_proposes_shipment() {
    let mut app = TestApp::new();
    let order = app.order_at_delivery().await;

    assert_eq!(order.state, CheckoutStep::DELIVERY);
    assert_eq!(order.email.as_ref().unwrap().as_str(), "guest@example.com");
    assert!(order.ship_address.as_ref().unwrap().same_location(&us_address()));
    assert_eq!(order.shipments.len(), 1);

    let response = app.get("/checkout/delivery").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("UPS Ground (USD)"));
    assert!(response.body.contains("UPS Two Day (USD)"));
    assert!(!response.body.contains("Internal Courier"));
}

#[tokio::test]
async fn test_unshippable_address_stays_on_address_step() {
    let mut app = TestApp::new();
    let order = app.cart_with(1, 1).await;

    let mut address = us_address();
    address.country_iso = "CA".to_string();
    address.state_name = "Ontario".to_string();
    let mut fields = address_fields(&address);
    fields.push(("order[email]".to_string(), "guest@example.com".to_string()));

    app.patch("/checkout/update/address", &fields)
        .await
        .assert_redirect("/checkout/address");

    let response = app.get("/checkout/address").await;
    assert!(
        response
            .body
            .contains("We are unable to calculate shipping rates for the selected items.")
    );
    assert_eq!(app.order(&order.number).await.state, CheckoutStep::ADDRESS);
}

#[tokio::test]
async fn test_missing_address_fields_keep_order_at_address() {
    let mut app = TestApp::new();
    let order = app.cart_with(1, 1).await;

    let mut address = us_address();
    address.city = String::new();
    let mut fields = address_fields(&address);
    fields.push(("order[email]".to_string(), "guest@example.com".to_string()));

    app.patch("/checkout/update/address", &fields)
        .await
        .assert_redirect("/checkout/address");
    assert_eq!(app.order(&order.number).await.state, CheckoutStep::ADDRESS);
}

#[tokio::test]
async fn test_malformed_email_is_rejected() {
    let mut app = TestApp::new();
    let order = app.cart_with(1, 1).await;

    let mut fields = address_fields(&us_address());
    fields.push(("order[email]".to_string(), "not-an-email".to_string()));

    let response = app.patch("/checkout/update/address", &fields).await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.order(&order.number).await.email.is_none());
}

#[tokio::test]
async fn test_signed_in_user_addresses_are_prefilled() {
    let mut app = TestApp::new();
    app.sign_in(SHOPPER_API_KEY);
    app.cart_with(1, 1).await;

    let response = app.get("/checkout/address").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("10 Lovely Street"));
    assert!(response.body.contains("shopper@cornershop.test"));
    assert!(response.body.contains("save_user_address"));
}

#[tokio::test]
async fn test_save_user_address_updates_user() {
    let mut app = TestApp::new();
    app.sign_in(SHOPPER_API_KEY);
    app.cart_with(1, 1).await;

    let mut address = us_address();
    address.address1 = "1 Market Street".to_string();
    let mut fields = address_fields(&address);
    fields.push(("save_user_address".to_string(), "1".to_string()));

    app.patch("/checkout/update/address", &fields)
        .await
        .assert_redirect("/checkout/delivery");

    let user = app
        .state
        .users()
        .find_by_api_key(SHOPPER_API_KEY)
        .await
        .unwrap();
    assert_eq!(user.id, UserId::new(2));
    assert_eq!(user.bill_address.unwrap().address1, "1 Market Street");
}

#[tokio::test]
async fn test_non_shippable_order_skips_delivery() {
    let mut app = TestApp::new();
    app.cart_with(5, 1).await;

    let mut fields = address_fields(&us_address());
    fields.push(("order[email]".to_string(), "guest@example.com".to_string()));

    app.patch("/checkout/update/address", &fields)
        .await
        .assert_redirect("/checkout/payment");
}

// ============================================================================
// Payment and confirm
// ============================================================================

#[tokio::test]
async fn test_payment_step_lists_methods() {
    let mut app = TestApp::new();
    app.order_at_payment().await;

    let response = app.get("/checkout/payment").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Check"));
    assert!(response.body.contains("Credit Card"));
}

#[tokio::test]
async fn test_confirm_requires_payment() {
    let mut app = TestApp::new();
    let mut order = app.order_at_payment().await;
    order.state = CheckoutStep::CONFIRM;
    app.store(&order).await;

    app.get("/checkout/confirm")
        .await
        .assert_redirect("/checkout/payment");
}

#[tokio::test]
async fn test_check_payment_completes_order() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;

    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    app.patch("/checkout/update/payment", &fields)
        .await
        .assert_redirect("/checkout/confirm");

    let confirm = app.get("/checkout/confirm").await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert!(confirm.body.contains("Place Order"));

    let response = app.patch("/checkout/update/confirm", &[]).await;
    response.assert_redirect(&format!("/orders/{}", order.number));

    let stored = app.order(&order.number).await;
    assert!(stored.is_completed());
    assert_eq!(stored.state, CheckoutStep::COMPLETE);

    let page = app.get(&format!("/orders/{}", order.number)).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Your order has been processed successfully"));

    let catalog = app.state.catalog().snapshot().await;
    let (_, variant) = catalog.variant(VariantId::new(1)).unwrap();
    assert_eq!(variant.stock.count_on_hand, 24);

    // The completed order is no longer the current one.
    app.get("/checkout").await.assert_redirect("/cart");
}

#[tokio::test]
async fn test_card_payment_completes_order() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;

    app.patch(
        "/checkout/update/payment",
        &card_payment(CREDIT_CARD, GOOD_CARD),
    )
    .await
    .assert_redirect("/checkout/confirm");

    let stored = app.order(&order.number).await;
    assert_eq!(stored.payments.len(), 1);
    assert_eq!(stored.payments[0].amount, stored.total());
    assert_eq!(
        stored.payments[0].source.as_ref().unwrap().last_digits,
        "1111"
    );

    app.patch("/checkout/update/confirm", &[])
        .await
        .assert_redirect(&format!("/orders/{}", order.number));
    let stored = app.order(&order.number).await;
    assert_eq!(stored.payments[0].state, PaymentState::Completed);
}

#[tokio::test]
async fn test_declined_card_shows_gateway_error() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;
    app.patch(
        "/checkout/update/payment",
        &card_payment(CREDIT_CARD, DECLINED_CARD),
    )
    .await
    .assert_redirect("/checkout/confirm");

    let response = app.patch("/checkout/update/confirm", &[]).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(
        "There was a problem with your payment information. Please check your information and try again."
    ));

    let stored = app.order(&order.number).await;
    assert!(!stored.is_completed());
    assert_eq!(stored.state, CheckoutStep::CONFIRM);
    assert_eq!(stored.payments[0].state, PaymentState::Failed);
}

#[tokio::test]
async fn test_invalid_card_is_unprocessable() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;

    let response = app
        .patch("/checkout/update/payment", &card_payment(CREDIT_CARD, ""))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app.order(&order.number).await.payments.is_empty());
}

#[tokio::test]
async fn test_unknown_payment_method_is_not_found() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;

    let fields = pairs(&[("order[payments_attributes][][payment_method_id]", "99")]);
    let response = app.patch("/checkout/update/payment", &fields).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let stored = app.order(&order.number).await;
    assert!(stored.payments.is_empty());
    assert_eq!(stored.state, CheckoutStep::PAYMENT);
}

#[tokio::test]
async fn test_hidden_payment_method_is_not_found() {
    let mut app = TestApp::builder()
        .seed(|seed| {
            for method in &mut seed.catalog.payment_methods {
                method.available_to_users = false;
            }
        })
        .build();
    app.order_at_payment().await;

    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    let response = app.patch("/checkout/update/payment", &fields).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_lost_at_confirm_restarts_checkout() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;
    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    app.patch("/checkout/update/payment", &fields)
        .await
        .assert_redirect("/checkout/confirm");

    app.sell_elsewhere(1, 25).await;

    app.patch("/checkout/update/confirm", &[])
        .await
        .assert_redirect("/checkout/address");

    let stored = app.order(&order.number).await;
    assert!(!stored.is_completed());
    assert_eq!(stored.state, CheckoutStep::ADDRESS);
    assert!(stored.shipments.is_empty());
    assert_eq!(stored.payments[0].state, PaymentState::Checkout);

    let cart = app.get("/cart").await;
    assert!(cart.body.contains(
        "Unfortunately some items in your order are no longer available: Ruby on Rails Tote."
    ));
}

#[tokio::test]
async fn test_completion_takes_remaining_stock() {
    let mut app = TestApp::new();
    app.order_at_payment().await;
    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    app.patch("/checkout/update/payment", &fields).await;
    app.sell_elsewhere(1, 24).await;

    let response = app.patch("/checkout/update/confirm", &[]).await;
    assert!(response.location().unwrap().starts_with("/orders/"));

    let catalog = app.state.catalog().snapshot().await;
    let (_, tote) = catalog.variant(VariantId::new(1)).unwrap();
    assert_eq!(tote.stock.count_on_hand, 0);
}

#[tokio::test]
async fn test_adding_items_during_checkout_restarts_it() {
    let mut app = TestApp::new();
    let order = app.order_at_payment().await;
    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    app.patch("/checkout/update/payment", &fields)
        .await
        .assert_redirect("/checkout/confirm");

    app.populate(4, 1).await.assert_redirect("/cart");

    let stored = app.order(&order.number).await;
    assert_eq!(stored.state, CheckoutStep::ADDRESS);
    assert_eq!(stored.line_items.len(), 2);
    assert!(stored.shipments.is_empty());

    app.get("/checkout/confirm")
        .await
        .assert_redirect("/checkout/address");
    app.patch("/checkout/update/confirm", &[])
        .await
        .assert_redirect("/checkout/address");
    assert!(!app.order(&order.number).await.is_completed());

    // Leaving the address step again ships both lines.
    let mut fields = address_fields(&us_address());
    fields.push(("order[email]".to_string(), "guest@example.com".to_string()));
    app.patch("/checkout/update/address", &fields)
        .await
        .assert_redirect("/checkout/delivery");
    let stored = app.order(&order.number).await;
    assert_eq!(
        stored.shipments[0].variant_ids,
        vec![VariantId::new(1), VariantId::new(4)]
    );
}

#[tokio::test]
async fn test_extra_step_after_payment() {
    let mut app = TestApp::builder()
        .extra_step("new_step:after:payment")
        .build();
    let order = app.order_at_payment().await;

    let fields = pairs(&[(
        "order[payments_attributes][][payment_method_id]",
        &CHECK.to_string(),
    )]);
    app.patch("/checkout/update/payment", &fields)
        .await
        .assert_redirect("/checkout/new_step");

    let response = app.get("/checkout/new_step").await;
    assert_eq!(response.status, StatusCode::OK);

    app.patch("/checkout/update/new_step", &[])
        .await
        .assert_redirect("/checkout/confirm");
    assert_eq!(app.order(&order.number).await.state, CheckoutStep::CONFIRM);
}

#[tokio::test]
async fn test_untracked_inventory_ignores_stock() {
    let mut app = TestApp::builder().track_inventory(false).build();
    // More totes than the 25 on hand.
    app.cart_with(1, 30).await;

    app.get("/checkout").await.assert_redirect("/checkout/address");
}
