//! Cart and order route handlers.
//!
//! The cart is the shopper's current incomplete order. Guests are tied to
//! their orders by the guest token kept in the signed session.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use corner_shop_core::checkout::CheckoutStep;
use corner_shop_core::order::{Address, Order};
use corner_shop_core::{Money, OrderNumber};

use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::{CurrentUser, ensure_guest_token, guest_token, shopper_key};
use crate::models::{Catalog, Flash};
use crate::routes::referer_path;
use crate::services::cart::{self, CartError};
use crate::services::flash;
use crate::services::forms::FormFields;
use crate::state::AppState;

/// Flash when a shopper edits an order that is not their cart.
pub const NOT_CURRENT_ORDER: &str = "You may only edit your current shopping cart.";

/// Flash when the cart to update is gone.
pub const ORDER_NOT_FOUND: &str = "The order you were looking for could not be found.";

// =============================================================================
// View Types
// =============================================================================

/// Line item display data for templates.
#[derive(Debug, Clone)]
pub struct LineItemView {
    pub id: i32,
    pub name: String,
    pub sku: String,
    pub price: String,
    pub quantity: u32,
    pub amount: String,
}

/// Shipping rate display data for templates.
#[derive(Debug, Clone)]
pub struct RateView {
    pub shipping_method_id: i32,
    pub name: String,
    pub cost: String,
    pub selected: bool,
}

/// Shipment display data for templates.
#[derive(Debug, Clone)]
pub struct ShipmentView {
    pub id: i32,
    pub number: String,
    pub rates: Vec<RateView>,
}

/// Payment display data for templates.
#[derive(Debug, Clone)]
pub struct PaymentView {
    pub method: String,
    pub amount: String,
    pub state: String,
    pub last_digits: Option<String>,
}

/// Order display data for templates.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub number: String,
    pub state: String,
    pub email: String,
    pub line_items: Vec<LineItemView>,
    pub item_count: u64,
    pub item_total: String,
    pub shipment_total: String,
    pub total: String,
    pub bill_address: Option<Address>,
    pub ship_address: Option<Address>,
    pub shipments: Vec<ShipmentView>,
    pub payments: Vec<PaymentView>,
    pub completed: bool,
}

impl OrderView {
    /// Build the view, naming payment methods from `catalog`.
    #[must_use]
    pub fn new(order: &Order, catalog: &Catalog) -> Self {
        let money = |amount| Money::new(amount, order.currency).to_string();

        Self {
            number: order.number.to_string(),
            state: order.state.to_string(),
            email: order
                .email
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            line_items: order
                .line_items
                .iter()
                .map(|line| LineItemView {
                    id: line.id.as_i32(),
                    name: line.name.clone(),
                    sku: line.sku.clone(),
                    price: money(line.price),
                    quantity: line.quantity,
                    amount: money(line.amount()),
                })
                .collect(),
            item_count: order.item_count(),
            item_total: money(order.item_total()),
            shipment_total: money(order.shipment_total()),
            total: order.display_total().to_string(),
            bill_address: order.bill_address.clone(),
            ship_address: order.ship_address.clone(),
            shipments: order
                .shipments
                .iter()
                .map(|shipment| ShipmentView {
                    id: shipment.id.as_i32(),
                    number: shipment.number.clone(),
                    rates: shipment
                        .shipping_rates
                        .iter()
                        .map(|rate| RateView {
                            shipping_method_id: rate.shipping_method_id.as_i32(),
                            name: rate.name.clone(),
                            cost: money(rate.cost),
                            selected: rate.selected,
                        })
                        .collect(),
                })
                .collect(),
            payments: order
                .valid_payments()
                .map(|payment| PaymentView {
                    method: catalog
                        .payment_method(payment.payment_method_id)
                        .map_or_else(|| "Payment".to_owned(), |m| m.name.clone()),
                    amount: money(payment.amount),
                    state: payment.state.to_string(),
                    last_digits: payment.source.as_ref().map(|s| s.last_digits.clone()),
                })
                .collect(),
            completed: order.is_completed(),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/edit.html")]
pub struct CartTemplate {
    pub order: OrderView,
    pub flash: Flash,
    pub errors: Vec<String>,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub order: OrderView,
    pub flash: Flash,
}

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct PopulateForm {
    #[serde(default)]
    pub variant_id: String,
    pub quantity: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the current cart, or an empty one.
#[instrument(skip(state, session, user))]
pub async fn cart(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let shopper = shopper_key(&session, user.as_ref()).await;
    let order = state
        .orders()
        .current_order_for(&shopper)
        .await?
        .unwrap_or_else(|| {
            Order::new(shopper.user_id, shopper.guest_token, state.config().currency)
        });

    render_cart(&state, &session, &order, Vec::new(), StatusCode::OK).await
}

/// Display the cart for `number`, which must be the current order.
#[instrument(skip(state, session, user))]
pub async fn edit(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(number): Path<String>,
) -> Result<Response> {
    let shopper = shopper_key(&session, user.as_ref()).await;
    match state.orders().current_order_for(&shopper).await? {
        Some(order) if order.number.as_str() == number => {
            render_cart(&state, &session, &order, Vec::new(), StatusCode::OK).await
        }
        _ => {
            flash::error(&session, NOT_CURRENT_ORDER).await?;
            Ok(Redirect::to("/cart").into_response())
        }
    }
}

/// Add a variant to the cart, creating the order if needed.
#[instrument(skip(state, session, user, headers))]
pub async fn populate(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    Form(form): Form<PopulateForm>,
) -> Result<Response> {
    ensure_guest_token(&session).await?;
    let shopper = shopper_key(&session, user.as_ref()).await;
    let catalog = state.catalog().snapshot().await;
    let config = state.config();

    match cart::populate(
        state.orders(),
        &catalog,
        state.machine(),
        &shopper,
        config.currency,
        config.track_inventory,
        &form.variant_id,
        form.quantity.as_deref(),
    )
    .await
    {
        Ok(order) => {
            add_breadcrumb(
                "cart",
                "Added to cart",
                Some(&[
                    ("order", order.number.as_str()),
                    ("variant_id", form.variant_id.as_str()),
                ]),
            );
            Ok(Redirect::to("/cart").into_response())
        }
        Err(CartError::VariantNotFound) => Err(AppError::NotFound("variant".to_string())),
        Err(CartError::Repository(e)) => Err(e.into()),
        Err(e) => {
            flash::error(&session, e.to_string()).await?;
            let back = referer_path(&headers).unwrap_or_else(|| "/".to_string());
            Ok(Redirect::to(&back).into_response())
        }
    }
}

/// Update the current order's email and quantities.
///
/// With a `checkout` field the shopper continues to the first checkout step.
#[instrument(skip(state, session, user, fields))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(number): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let shopper = shopper_key(&session, user.as_ref()).await;
    let Some(current) = state.orders().current_order_for(&shopper).await? else {
        flash::error(&session, ORDER_NOT_FOUND).await?;
        return Ok(Redirect::to("/").into_response());
    };
    if current.number.as_str() != number {
        flash::error(&session, NOT_CURRENT_ORDER).await?;
        return Ok(Redirect::to("/cart").into_response());
    }

    let form = FormFields::from(fields).cart_update();
    let catalog = state.catalog().snapshot().await;
    let mut order = current.clone();
    if let Err(e) = cart::apply_update(
        &mut order,
        &form,
        &catalog,
        state.config().track_inventory,
        state.machine(),
    ) {
        if let CartError::Repository(e) = e {
            return Err(e.into());
        }
        return render_cart(
            &state,
            &session,
            &current,
            vec![e.to_string()],
            StatusCode::UNPROCESSABLE_ENTITY,
        )
        .await;
    }

    let machine = state.machine();
    let checkout = form.checkout && order.checkout_allowed();
    if checkout && order.state == CheckoutStep::CART {
        order.state = machine.first_step(&order);
        order.touch();
    }
    let order = state.orders().save(order).await?;
    tracing::info!(order = %order.number, "Cart updated");

    if checkout {
        let step = machine.first_step(&order);
        return Ok(Redirect::to(&format!("/checkout/{step}")).into_response());
    }
    Ok(Redirect::to("/cart").into_response())
}

/// Remove every line from the current order.
#[instrument(skip(state, session, user))]
pub async fn empty(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let shopper = shopper_key(&session, user.as_ref()).await;
    if let Some(mut order) = state.orders().current_order_for(&shopper).await? {
        order.empty();
        state.orders().save(order).await?;
    }
    Ok(Redirect::to("/cart").into_response())
}

/// Display an order to its owner or to the session that placed it.
#[instrument(skip(state, session, user))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(number): Path<String>,
) -> Result<Response> {
    let not_found = || AppError::NotFound(format!("order {number}"));
    let order = state
        .orders()
        .find_by_number(&OrderNumber::new(number.clone()))
        .await?
        .ok_or_else(not_found)?;

    let owned_by_user = user
        .as_ref()
        .is_some_and(|u| order.user_id == Some(u.id));
    let token = guest_token(&session).await;
    let placed_by_session = token.is_some() && order.guest_token == token;
    if !owned_by_user && !placed_by_session {
        return Err(not_found());
    }

    let catalog = state.catalog().snapshot().await;
    Ok(OrderShowTemplate {
        order: OrderView::new(&order, &catalog),
        flash: flash::take(&session).await,
    }
    .into_response())
}

async fn render_cart(
    state: &AppState,
    session: &Session,
    order: &Order,
    errors: Vec<String>,
    status: StatusCode,
) -> Result<Response> {
    let catalog = state.catalog().snapshot().await;
    let template = CartTemplate {
        order: OrderView::new(order, &catalog),
        flash: flash::take(session).await,
        errors,
    };
    Ok((status, template).into_response())
}
