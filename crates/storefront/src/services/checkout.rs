//! Checkout step handling on top of the core state machine.
//!
//! Routes load the order and check entry; this module applies the submitted
//! attributes for the order's step, advances it and reports what the route
//! should do next. Nothing here touches storage.

use tracing::instrument;

use corner_shop_core::checkout::{CheckoutHooks, CheckoutStateMachine, CheckoutStep, TransitionError};
use corner_shop_core::order::{Order, ShippingRate};
use corner_shop_core::payment::{CardSource, GatewayError, PaymentMethodKind};
use corner_shop_core::{AddressKind, Email, PaymentMethodId};

use crate::models::{Catalog, User};
use crate::services::cart::stock_shortfalls;
use crate::services::forms::{CheckoutForm, PaymentForm};

/// Notice shown after a successful checkout.
pub const ORDER_PROCESSED: &str = "Your order has been processed successfully";

/// Flash shown when the gateway refuses a payment.
pub const GATEWAY_ERROR: &str =
    "There was a problem with your payment information. Please check your information and try again.";

/// The catalog seen through the state machine's hooks.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutContext<'a> {
    pub catalog: &'a Catalog,
    pub track_inventory: bool,
}

impl CheckoutHooks for CheckoutContext<'_> {
    fn shipping_rates(&self, order: &Order) -> Vec<ShippingRate> {
        let Some(country) = order.ship_address.as_ref().map(|a| a.country_iso.as_str()) else {
            return Vec::new();
        };
        self.catalog
            .shipping_methods
            .iter()
            .filter(|m| m.available_to_users && m.ships_to(country))
            .map(|m| ShippingRate {
                shipping_method_id: m.id,
                name: m.name.clone(),
                cost: m.cost,
                selected: false,
            })
            .collect()
    }

    fn unavailable_items(&self, order: &Order) -> Vec<String> {
        stock_shortfalls(self.catalog, order, self.track_inventory)
    }

    fn payment_method(&self, id: PaymentMethodId) -> Option<PaymentMethodKind> {
        self.catalog
            .payment_method(id)
            .filter(|m| m.active)
            .map(|m| m.kind)
    }
}

/// Join names the way a sentence lists them.
#[must_use]
pub fn to_sentence(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

/// Flash for lines that ran out of stock before checkout.
#[must_use]
pub fn unavailable_message(names: &[String]) -> String {
    format!("{} became unavailable.", to_sentence(names))
}

/// Fill in what the current step needs before it is shown or updated.
///
/// On the address step a signed-in shopper's default addresses fill any
/// missing order address, and the order takes the user's email if it has
/// none.
pub fn prepare_step(order: &mut Order, user: Option<&User>) {
    let Some(user) = user else {
        return;
    };
    if order.email.is_none() {
        order.email = Some(user.email.clone());
    }
    if order.state != CheckoutStep::ADDRESS {
        return;
    }
    if order.bill_address.is_none()
        && let Some(bill) = &user.bill_address
    {
        order.assign_address(AddressKind::Bill, bill.clone());
    }
    if order.ship_address.is_none()
        && let Some(ship) = &user.ship_address
    {
        order.assign_address(AddressKind::Ship, ship.clone());
    }
}

/// Why submitted attributes were not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckoutUpdateError {
    /// The payment method does not exist or is not offered to shoppers.
    #[error("Payment method not found")]
    PaymentMethodNotFound(String),

    #[error("{}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Apply the attributes the order's current step accepts.
///
/// # Errors
///
/// Returns a [`CheckoutUpdateError`]; the order may be partially updated
/// and should be discarded.
pub fn apply_form(
    order: &mut Order,
    form: &CheckoutForm,
    catalog: &Catalog,
) -> Result<(), CheckoutUpdateError> {
    match order.state.as_str() {
        "address" => apply_address(order, form),
        "delivery" => apply_delivery(order, form),
        "payment" => form
            .payments
            .iter()
            .try_for_each(|payment| apply_payment(order, payment, catalog)),
        _ => Ok(()),
    }
}

fn apply_address(order: &mut Order, form: &CheckoutForm) -> Result<(), CheckoutUpdateError> {
    if let Some(raw) = &form.email {
        order.email = if raw.trim().is_empty() {
            None
        } else {
            Some(Email::parse(raw).map_err(|e| CheckoutUpdateError::Invalid(vec![e.to_string()]))?)
        };
    }

    if let Some(bill) = &form.bill_address {
        order.assign_address(AddressKind::Bill, bill.clone());
    }
    if form.use_billing {
        if let Some(bill) = order.bill_address.clone() {
            order.assign_address(AddressKind::Ship, bill);
        }
    } else if let Some(ship) = &form.ship_address {
        order.assign_address(AddressKind::Ship, ship.clone());
    }
    Ok(())
}

fn apply_delivery(order: &mut Order, form: &CheckoutForm) -> Result<(), CheckoutUpdateError> {
    for selection in &form.shipping_rates {
        let shipment = match selection.shipment_id {
            Some(id) => order.shipments.iter_mut().find(|s| s.id == id),
            None => order.shipments.first_mut(),
        };
        let selected = shipment.is_some_and(|s| s.select_rate(selection.shipping_method_id));
        if !selected {
            return Err(CheckoutUpdateError::Invalid(vec![
                "Shipping method is invalid".to_owned(),
            ]));
        }
    }
    order.touch();
    Ok(())
}

fn apply_payment(
    order: &mut Order,
    form: &PaymentForm,
    catalog: &Catalog,
) -> Result<(), CheckoutUpdateError> {
    let not_found = || CheckoutUpdateError::PaymentMethodNotFound(form.payment_method_id.clone());
    let id = form
        .payment_method_id
        .parse::<i32>()
        .map(PaymentMethodId::new)
        .map_err(|_| not_found())?;
    let method = catalog
        .payment_method(id)
        .filter(|m| m.is_selectable())
        .ok_or_else(not_found)?;

    let source = if method.kind.source_required() {
        let errors = form.card.validate();
        if !errors.is_empty() {
            return Err(CheckoutUpdateError::Invalid(errors));
        }
        let profile = method.kind.gateway().create_profile(&form.card)?;
        Some(CardSource {
            name: form.card.name.trim().to_owned(),
            last_digits: form.card.last_digits(),
            month: form.card.month.trim().to_owned(),
            year: form.card.year.trim().to_owned(),
            gateway_profile_id: profile,
        })
    } else {
        None
    };

    order.add_payment(method.id, order.outstanding_balance(), source);
    Ok(())
}

/// What the route should do after an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The payment method is unknown; respond 404 without saving.
    PaymentMethodNotFound,
    /// The attributes were rejected; re-render the step without saving.
    Invalid(Vec<String>),
    /// The order moved on to `to`.
    Advanced { from: CheckoutStep, to: CheckoutStep },
    /// The order is complete.
    Completed,
    /// A payment was declined; the order stays on its step.
    GatewayFailed(String),
    /// Stock ran out; checkout was restarted.
    OutOfStock(String),
    /// The order could not leave its step.
    Failed(String),
}

/// Apply `form` to `order` at its current step and try to advance.
///
/// Except for [`UpdateOutcome::PaymentMethodNotFound`] and
/// [`UpdateOutcome::Invalid`], the order should be saved afterwards.
#[instrument(skip_all, fields(order = %order.number, state = %order.state))]
pub fn update(
    machine: &CheckoutStateMachine,
    order: &mut Order,
    form: &CheckoutForm,
    context: &CheckoutContext<'_>,
) -> UpdateOutcome {
    match apply_form(order, form, context.catalog) {
        Ok(()) => {}
        Err(CheckoutUpdateError::PaymentMethodNotFound(id)) => {
            tracing::warn!(payment_method_id = %id, "Payment method not available");
            return UpdateOutcome::PaymentMethodNotFound;
        }
        Err(CheckoutUpdateError::Invalid(errors)) => return UpdateOutcome::Invalid(errors),
        Err(CheckoutUpdateError::Gateway(err)) => return UpdateOutcome::GatewayFailed(err.0),
    }

    let from = order.state.clone();
    match machine.advance(order, context) {
        Ok(to) if to == CheckoutStep::COMPLETE => {
            tracing::info!(total = %order.total(), "Order completed");
            UpdateOutcome::Completed
        }
        Ok(to) => UpdateOutcome::Advanced { from, to },
        Err(TransitionError::Gateway(err)) => {
            tracing::warn!(error = %err, "Payment declined");
            UpdateOutcome::GatewayFailed(err.0)
        }
        Err(err @ TransitionError::InsufficientStock(_)) => {
            machine.restart(order);
            UpdateOutcome::OutOfStock(err.to_string())
        }
        Err(err @ TransitionError::UnshippedItems(_)) => {
            machine.restart(order);
            UpdateOutcome::Failed(err.to_string())
        }
        Err(err) => UpdateOutcome::Failed(err.to_string()),
    }
}
