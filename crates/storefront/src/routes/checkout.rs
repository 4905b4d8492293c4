//! Checkout route handlers.
//!
//! Each step is shown at `/checkout/{state}` and submitted to
//! `/checkout/update/{state}`. Which step a shopper may see is decided by
//! the checkout state machine; what the submitted form does is decided by
//! [`crate::services::checkout`].

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use tracing::instrument;

use corner_shop_core::checkout::{CheckoutStep, EntryDecision};
use corner_shop_core::order::{Address, Order};

use crate::error::{AppError, Result};
use crate::middleware::{CurrentUser, shopper_key};
use crate::models::{Catalog, Flash, User};
use crate::routes::orders::OrderView;
use crate::services::cart::stock_shortfalls;
use crate::services::checkout::{
    self as checkout_service, CheckoutContext, GATEWAY_ERROR, ORDER_PROCESSED, UpdateOutcome,
    prepare_step, unavailable_message,
};
use crate::services::flash;
use crate::services::forms::FormFields;
use crate::state::AppState;

/// A step in the progress bar.
#[derive(Debug, Clone)]
pub struct StepView {
    pub name: String,
    pub title: String,
    pub current: bool,
    pub done: bool,
}

/// A payment method the shopper may pick.
#[derive(Debug, Clone)]
pub struct PaymentMethodView {
    pub id: i32,
    pub name: String,
    pub card: bool,
}

/// An editable address on the address step.
#[derive(Debug, Clone)]
pub struct AddressFormView {
    /// `bill` or `ship`, as used in field names.
    pub kind: &'static str,
    pub legend: &'static str,
    pub address: Address,
}

/// Checkout step page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/edit.html")]
pub struct CheckoutEditTemplate {
    pub order: OrderView,
    pub step: String,
    pub step_title: String,
    pub steps: Vec<StepView>,
    pub address_forms: Vec<AddressFormView>,
    pub use_billing: bool,
    pub signed_in: bool,
    pub payment_methods: Vec<PaymentMethodView>,
    pub flash: Flash,
    pub errors: Vec<String>,
}

/// Parse a step from the path. Unknown names never match a flow, so they
/// send the shopper to the first step.
fn target_step(raw: &str) -> CheckoutStep {
    CheckoutStep::parse(raw).unwrap_or(CheckoutStep::CART)
}

fn redirect_to_step(step: &CheckoutStep) -> Response {
    Redirect::to(&format!("/checkout/{step}")).into_response()
}

fn redirect_to_cart() -> Response {
    Redirect::to("/cart").into_response()
}

/// The current order, ready for `target`, or where to send the shopper
/// instead.
///
/// With a `catalog` the order is also sent back to the cart when stock no
/// longer covers it.
async fn load_order(
    state: &AppState,
    session: &Session,
    user: Option<&User>,
    catalog: Option<&Catalog>,
    target: Option<&CheckoutStep>,
) -> Result<std::result::Result<Order, Response>> {
    let shopper = shopper_key(session, user).await;
    let order = state.orders().current_order_for(&shopper).await?;

    let decision = state.machine().entry(order.as_ref(), target);
    let Some(order) = order.filter(|_| decision != EntryDecision::RedirectToCart) else {
        return Ok(Err(redirect_to_cart()));
    };

    if let Some(catalog) = catalog
        && let Some(response) = ensure_sufficient_stock(state, session, catalog, &order).await?
    {
        return Ok(Err(response));
    }

    match decision {
        EntryDecision::RedirectToStep(step) => Ok(Err(redirect_to_step(&step))),
        EntryDecision::RedirectToCart => Ok(Err(redirect_to_cart())),
        EntryDecision::Proceed => Ok(Ok(order)),
    }
}

/// A redirect to the cart if some line can no longer be supplied.
async fn ensure_sufficient_stock(
    state: &AppState,
    session: &Session,
    catalog: &Catalog,
    order: &Order,
) -> Result<Option<Response>> {
    let shortfalls = stock_shortfalls(catalog, order, state.config().track_inventory);
    if shortfalls.is_empty() {
        return Ok(None);
    }
    tracing::info!(order = %order.number, items = ?shortfalls, "Checkout blocked by stock");
    flash::error(session, unavailable_message(&shortfalls)).await?;
    Ok(Some(redirect_to_cart()))
}

/// Redirect to the order's current step.
#[instrument(skip(state, session, user))]
pub async fn edit_current(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
) -> Result<Response> {
    let catalog = state.catalog().snapshot().await;
    match load_order(&state, &session, user.as_ref(), Some(&catalog), None).await? {
        Ok(order) => Ok(redirect_to_step(&state.machine().current_step(&order))),
        Err(response) => Ok(response),
    }
}

/// Show a checkout step.
///
/// Viewing an earlier step moves the order back to it in memory only; the
/// change is stored when the step is submitted.
#[instrument(skip(state, session, user))]
pub async fn edit(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(raw_step): Path<String>,
) -> Result<Response> {
    let target = target_step(&raw_step);
    let catalog = state.catalog().snapshot().await;
    let mut order =
        match load_order(&state, &session, user.as_ref(), Some(&catalog), Some(&target)).await? {
            Ok(order) => order,
            Err(response) => return Ok(response),
        };

    if !state.machine().enter(&mut order, &target) {
        return Ok(redirect_to_step(&state.machine().current_step(&order)));
    }
    prepare_step(&mut order, user.as_ref());

    let flash = flash::take(&session).await;
    Ok(render_edit(&state, &order, &catalog, user.is_some(), flash, Vec::new(), StatusCode::OK))
}

/// Submit a checkout step.
///
/// The submission that completes the order holds the stock lock from the
/// completion check until its stock is taken, so a shortfall found there
/// restarts checkout instead of overselling.
#[instrument(skip(state, session, user, fields))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Path(raw_step): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response> {
    let target = target_step(&raw_step);
    let mut order = match load_order(&state, &session, user.as_ref(), None, Some(&target)).await? {
        Ok(order) => order,
        Err(response) => return Ok(response),
    };

    let machine = state.machine();
    if !machine.enter(&mut order, &target) {
        return Ok(redirect_to_step(&machine.current_step(&order)));
    }
    prepare_step(&mut order, user.as_ref());

    let track_inventory = state.config().track_inventory;
    let mut stock = if machine.next_step(&order) == Some(CheckoutStep::COMPLETE) {
        Some(state.catalog().lock_stock().await)
    } else {
        None
    };
    let catalog = match &stock {
        Some(lock) => lock.catalog(),
        None => {
            let catalog = state.catalog().snapshot().await;
            if let Some(response) = ensure_sufficient_stock(&state, &session, &catalog, &order).await?
            {
                return Ok(response);
            }
            catalog
        }
    };

    let form = FormFields::from(fields).checkout_update();
    let context = CheckoutContext {
        catalog: &catalog,
        track_inventory,
    };

    match checkout_service::update(machine, &mut order, &form, &context) {
        UpdateOutcome::PaymentMethodNotFound => {
            Err(AppError::NotFound("payment method".to_string()))
        }
        UpdateOutcome::Invalid(errors) => Ok(render_edit(
            &state,
            &order,
            &catalog,
            user.is_some(),
            flash::take(&session).await,
            errors,
            StatusCode::UNPROCESSABLE_ENTITY,
        )),
        UpdateOutcome::Advanced { from, to } => {
            let order = state.orders().save(order).await?;
            if from == CheckoutStep::ADDRESS
                && form.save_user_address
                && let Some(user) = &user
                && !state.users().persist_order_address(user.id, &order).await
            {
                tracing::warn!(user_id = %user.id, order = %order.number, "User address not saved");
            }
            tracing::info!(order = %order.number, from = %from, to = %to, "Checkout advanced");
            Ok(redirect_to_step(&to))
        }
        UpdateOutcome::Completed => {
            let order = state.orders().save(order).await?;
            let shortfalls = match stock.as_mut() {
                Some(lock) => lock.unstock(&order, track_inventory),
                None => state.catalog().lock_stock().await.unstock(&order, track_inventory),
            };
            drop(stock);
            if !shortfalls.is_empty() {
                tracing::warn!(order = %order.number, items = ?shortfalls, "Order completed beyond stock");
            }
            flash::notice(&session, ORDER_PROCESSED).await?;
            Ok(Redirect::to(&format!("/orders/{}", order.number)).into_response())
        }
        UpdateOutcome::GatewayFailed(message) => {
            let order = state.orders().save(order).await?;
            Ok(render_edit(
                &state,
                &order,
                &catalog,
                user.is_some(),
                Flash::error(GATEWAY_ERROR),
                vec![message],
                StatusCode::OK,
            ))
        }
        UpdateOutcome::OutOfStock(message) | UpdateOutcome::Failed(message) => {
            let order = state.orders().save(order).await?;
            flash::error(&session, message).await?;
            Ok(redirect_to_step(&order.state))
        }
    }
}

fn render_edit(
    state: &AppState,
    order: &Order,
    catalog: &Catalog,
    signed_in: bool,
    flash: Flash,
    errors: Vec<String>,
    status: StatusCode,
) -> Response {
    let steps = state.machine().steps_for(order);
    let current = steps.iter().position(|s| *s == order.state);
    let steps = steps
        .iter()
        .enumerate()
        .filter(|(_, step)| **step != CheckoutStep::COMPLETE)
        .map(|(index, step)| StepView {
            name: step.to_string(),
            title: step.title(),
            current: current == Some(index),
            done: current.is_some_and(|c| index < c),
        })
        .collect();

    let address_forms = vec![
        AddressFormView {
            kind: "bill",
            legend: "Billing Address",
            address: order.bill_address.clone().unwrap_or_default(),
        },
        AddressFormView {
            kind: "ship",
            legend: "Shipping Address",
            address: order.ship_address.clone().unwrap_or_default(),
        },
    ];
    let use_billing = order.ship_address.is_none()
        || order
            .bill_address
            .as_ref()
            .zip(order.ship_address.as_ref())
            .is_some_and(|(b, s)| b.same_location(s));

    let template = CheckoutEditTemplate {
        order: OrderView::new(order, catalog),
        step: order.state.to_string(),
        step_title: order.state.title(),
        steps,
        address_forms,
        use_billing,
        signed_in,
        payment_methods: catalog
            .selectable_payment_methods()
            .map(|m| PaymentMethodView {
                id: m.id.as_i32(),
                name: m.name.clone(),
                card: m.kind.source_required(),
            })
            .collect(),
        flash,
        errors,
    };
    (status, template).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_step() {
        assert_eq!(target_step("delivery"), CheckoutStep::DELIVERY);
        assert_eq!(target_step("not a step!"), CheckoutStep::CART);
    }
}
