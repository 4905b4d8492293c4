use chrono::Utc;

use super::{CheckoutFlow, CheckoutStep};
use crate::order::{Order, ShippingRate};
use crate::payment::{GatewayError, PaymentMethodKind};
use crate::types::{AddressKind, PaymentMethodId, PaymentState, ShipmentState};

/// What the checkout needs to know about the world outside the order.
pub trait CheckoutHooks {
    /// Shipping rates available for the order's ship address.
    fn shipping_rates(&self, order: &Order) -> Vec<ShippingRate>;

    /// Names of line items whose stock cannot cover the ordered quantity.
    fn unavailable_items(&self, order: &Order) -> Vec<String>;

    /// Kind of a configured, active payment method.
    fn payment_method(&self, id: PaymentMethodId) -> Option<PaymentMethodKind>;
}

/// Why an order could not leave its current step.
///
/// `Display` output is shown to the shopper.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Your cart is empty")]
    EmptyCart,

    #[error("This order has already been completed")]
    AlreadyComplete,

    #[error("{0} is not a checkout step for this order")]
    NotInFlow(CheckoutStep),

    #[error("There is no step after {0}")]
    NoNextStep(CheckoutStep),

    #[error("Email can't be blank")]
    MissingEmail,

    #[error("{0} can't be blank")]
    MissingAddress(AddressKind),

    #[error("{}", .errors.join(", "))]
    InvalidAddress {
        kind: AddressKind,
        errors: Vec<String>,
    },

    #[error("We are unable to calculate shipping rates for the selected items.")]
    ItemsCannotBeShipped,

    #[error("{} cannot be shipped. Please review your order.", .0.join(", "))]
    UnshippedItems(Vec<String>),

    #[error("Please select a shipping method for every shipment")]
    NoShippingRateSelected,

    #[error("No payment found")]
    PaymentRequired,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Payment method not found")]
    UnknownPaymentMethod(PaymentMethodId),

    #[error(
        "Unfortunately some items in your order are no longer available: {}.",
        .0.join(", ")
    )]
    InsufficientStock(Vec<String>),
}

/// Outcome of asking to view a checkout step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    /// Show the requested step.
    Proceed,
    /// Send the shopper to the cart.
    RedirectToCart,
    /// Send the shopper to another step.
    RedirectToStep(CheckoutStep),
}

/// Drives orders through a [`CheckoutFlow`].
#[derive(Debug, Clone, Default)]
pub struct CheckoutStateMachine {
    flow: CheckoutFlow,
}

impl CheckoutStateMachine {
    #[must_use]
    pub const fn new(flow: CheckoutFlow) -> Self {
        Self { flow }
    }

    /// Applicable steps for `order`, ending with `complete`.
    #[must_use]
    pub fn steps_for(&self, order: &Order) -> Vec<CheckoutStep> {
        self.flow.steps_for(order)
    }

    /// The first checkout step for `order`.
    #[must_use]
    pub fn first_step(&self, order: &Order) -> CheckoutStep {
        self.steps_for(order)
            .into_iter()
            .next()
            .unwrap_or(CheckoutStep::COMPLETE)
    }

    /// Where the shopper currently is: the order's step, or the first step
    /// for an order that has not started checkout.
    #[must_use]
    pub fn current_step(&self, order: &Order) -> CheckoutStep {
        if order.state == CheckoutStep::CART {
            self.first_step(order)
        } else {
            order.state.clone()
        }
    }

    /// Whether the shopper may view `target`: it must be in the order's flow
    /// and not ahead of the order's current step.
    #[must_use]
    pub fn can_enter(&self, order: &Order, target: &CheckoutStep) -> bool {
        if order.is_completed() || !order.checkout_allowed() || *target == CheckoutStep::COMPLETE {
            return false;
        }

        let steps = self.steps_for(order);
        let Some(target_index) = steps.iter().position(|s| s == target) else {
            return false;
        };

        if order.state == CheckoutStep::CART {
            return target_index == 0;
        }

        steps
            .iter()
            .position(|s| *s == order.state)
            .is_some_and(|current| target_index <= current)
    }

    /// Decide how to answer a request for `target` (or the current step
    /// when `target` is `None`).
    #[must_use]
    pub fn entry(&self, order: Option<&Order>, target: Option<&CheckoutStep>) -> EntryDecision {
        let Some(order) = order else {
            return EntryDecision::RedirectToCart;
        };
        if order.is_completed() || !order.checkout_allowed() {
            return EntryDecision::RedirectToCart;
        }

        let current = self.current_step(order);
        let Some(target) = target else {
            return EntryDecision::RedirectToStep(current);
        };

        let steps = self.steps_for(order);
        if !steps.contains(target) || *target == CheckoutStep::COMPLETE {
            return EntryDecision::RedirectToStep(self.first_step(order));
        }

        if !self.can_enter(order, target) {
            return EntryDecision::RedirectToStep(current);
        }

        if *target == CheckoutStep::CONFIRM && order.payment_required() && !order.has_valid_payment()
        {
            return EntryDecision::RedirectToStep(CheckoutStep::PAYMENT);
        }

        EntryDecision::Proceed
    }

    /// Move the order back (or, from `cart`, forward to the first step) to
    /// `target`. Returns `false` and leaves the order alone if `target`
    /// cannot be entered.
    pub fn enter(&self, order: &mut Order, target: &CheckoutStep) -> bool {
        if !self.can_enter(order, target) {
            return false;
        }
        if order.state != *target {
            order.state = target.clone();
            order.touch();
        }
        true
    }

    /// The step after the order's current one.
    #[must_use]
    pub fn next_step(&self, order: &Order) -> Option<CheckoutStep> {
        if order.state == CheckoutStep::CART {
            return Some(self.first_step(order));
        }
        let steps = self.steps_for(order);
        let index = steps.iter().position(|s| *s == order.state)?;
        steps.get(index + 1).cloned()
    }

    /// Send a started checkout back to its first step. Proposed shipments
    /// are dropped and get proposed again when the address step is left.
    pub fn restart(&self, order: &mut Order) {
        if order.is_completed() {
            return;
        }
        order.shipments.clear();
        order.state = self.first_step(order);
        order.touch();
    }

    /// Leave the current step, running its guard, and return the new step.
    ///
    /// On error the order stays at its current step. Payments processed
    /// before a gateway failure keep their new state.
    ///
    /// # Errors
    ///
    /// Returns a [`TransitionError`] describing the unmet requirement.
    pub fn advance(
        &self,
        order: &mut Order,
        hooks: &dyn CheckoutHooks,
    ) -> Result<CheckoutStep, TransitionError> {
        if order.is_completed() {
            return Err(TransitionError::AlreadyComplete);
        }
        if !order.checkout_allowed() {
            return Err(TransitionError::EmptyCart);
        }

        let current = order.state.clone();
        if current == CheckoutStep::CART {
            let first = self.first_step(order);
            order.state = first.clone();
            order.touch();
            return Ok(first);
        }

        if !self.steps_for(order).contains(&current) {
            return Err(TransitionError::NotInFlow(current));
        }

        match current.as_str() {
            "address" => leave_address(order, hooks)?,
            "delivery" => leave_delivery(order)?,
            "payment" => leave_payment(order)?,
            _ => {}
        }

        // Leaving the address step can change which steps apply.
        let steps = self.steps_for(order);
        let index = steps
            .iter()
            .position(|s| *s == current)
            .ok_or_else(|| TransitionError::NotInFlow(current.clone()))?;
        let next = steps
            .get(index + 1)
            .cloned()
            .ok_or(TransitionError::NoNextStep(current))?;

        if next == CheckoutStep::COMPLETE {
            complete(order, hooks)?;
        }

        order.state = next.clone();
        order.touch();
        Ok(next)
    }
}

fn leave_address(order: &mut Order, hooks: &dyn CheckoutHooks) -> Result<(), TransitionError> {
    if order.email.is_none() {
        return Err(TransitionError::MissingEmail);
    }

    check_address(order, AddressKind::Bill)?;
    if !order.requires_shipping() {
        order.shipments.clear();
        return Ok(());
    }
    check_address(order, AddressKind::Ship)?;

    let rates = hooks.shipping_rates(order);
    if rates.is_empty() {
        return Err(TransitionError::ItemsCannotBeShipped);
    }
    order.propose_shipment(rates);
    Ok(())
}

fn check_address(order: &Order, kind: AddressKind) -> Result<(), TransitionError> {
    let address = match kind {
        AddressKind::Bill => order.bill_address.as_ref(),
        AddressKind::Ship => order.ship_address.as_ref(),
    }
    .ok_or(TransitionError::MissingAddress(kind))?;

    let errors = address.validate(kind);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TransitionError::InvalidAddress { kind, errors })
    }
}

fn leave_delivery(order: &Order) -> Result<(), TransitionError> {
    if order.requires_shipping() && order.shipments.is_empty() {
        return Err(TransitionError::ItemsCannotBeShipped);
    }
    if order.shipments.iter().any(|s| s.selected_rate().is_none()) {
        return Err(TransitionError::NoShippingRateSelected);
    }
    Ok(())
}

fn leave_payment(order: &Order) -> Result<(), TransitionError> {
    if !order.payment_required() {
        return Ok(());
    }
    let covered: rust_decimal::Decimal = order.valid_payments().map(|p| p.amount).sum();
    if covered < order.total() {
        return Err(TransitionError::PaymentRequired);
    }
    Ok(())
}

fn complete(order: &mut Order, hooks: &dyn CheckoutHooks) -> Result<(), TransitionError> {
    let unavailable = hooks.unavailable_items(order);
    if !unavailable.is_empty() {
        return Err(TransitionError::InsufficientStock(unavailable));
    }
    let unshipped = order.unshipped_items();
    if !unshipped.is_empty() {
        return Err(TransitionError::UnshippedItems(unshipped));
    }

    for payment in &mut order.payments {
        if payment.state != PaymentState::Checkout {
            continue;
        }
        let kind = hooks
            .payment_method(payment.payment_method_id)
            .ok_or(TransitionError::UnknownPaymentMethod(payment.payment_method_id))?;

        match kind.gateway().purchase(payment.amount, payment.source.as_ref()) {
            Ok(response) => {
                payment.state = PaymentState::Completed;
                payment.authorization = Some(response.authorization);
                payment.response_message = None;
            }
            Err(err) => {
                payment.state = PaymentState::Failed;
                payment.response_message = Some(err.to_string());
                order.updated_at = Utc::now();
                return Err(err.into());
            }
        }
    }

    if order.payment_required() && order.payment_total() < order.total() {
        return Err(TransitionError::PaymentRequired);
    }

    for shipment in &mut order.shipments {
        shipment.state = ShipmentState::Ready;
    }
    order.completed_at = Some(Utc::now());
    Ok(())
}
