//! Checkout steps and the configurable flow.
//!
//! A [`CheckoutFlow`] is an ordered list of named steps between `cart` and
//! `complete`. Each step carries a [`StepCondition`] deciding whether it
//! applies to a given order, so the flow for a digital order skips
//! `delivery` and a free order skips `payment`. Extra steps can be inserted
//! at runtime relative to any existing step.

mod machine;

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::order::Order;

pub use machine::{CheckoutHooks, CheckoutStateMachine, EntryDecision, TransitionError};

/// Name of a checkout step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutStep(Cow<'static, str>);

impl CheckoutStep {
    pub const CART: Self = Self(Cow::Borrowed("cart"));
    pub const ADDRESS: Self = Self(Cow::Borrowed("address"));
    pub const DELIVERY: Self = Self(Cow::Borrowed("delivery"));
    pub const PAYMENT: Self = Self(Cow::Borrowed("payment"));
    pub const CONFIRM: Self = Self(Cow::Borrowed("confirm"));
    pub const COMPLETE: Self = Self(Cow::Borrowed("complete"));

    const MAX_LEN: usize = 32;

    /// Parse a step name: 1 to 32 characters of `a-z`, `0-9` or `_`.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidName` for anything else.
    pub fn parse(name: &str) -> Result<Self, FlowError> {
        let valid = !name.is_empty()
            && name.len() <= Self::MAX_LEN
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(FlowError::InvalidName(name.to_owned()));
        }

        let known = [
            Self::CART,
            Self::ADDRESS,
            Self::DELIVERY,
            Self::PAYMENT,
            Self::CONFIRM,
            Self::COMPLETE,
        ];
        Ok(known
            .into_iter()
            .find(|step| step.as_str() == name)
            .unwrap_or_else(|| Self(Cow::Owned(name.to_owned()))))
    }

    /// Returns the step name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable title, e.g. `gift_wrap` -> `Gift Wrap`.
    #[must_use]
    pub fn title(&self) -> String {
        self.0
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_ascii_uppercase().to_string() + chars.as_str()
                })
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `cart` and `complete` bracket every flow and cannot be inserted or removed.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        *self == Self::CART || *self == Self::COMPLETE
    }
}

impl fmt::Display for CheckoutStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CheckoutStep {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// When a step applies to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepCondition {
    #[default]
    Always,
    /// Only when a line item is shippable.
    RequiresShipping,
    /// Only when the order total is positive.
    PaymentRequired,
}

impl StepCondition {
    /// Whether the condition holds for `order`.
    #[must_use]
    pub fn holds(self, order: &Order) -> bool {
        match self {
            Self::Always => true,
            Self::RequiresShipping => order.requires_shipping(),
            Self::PaymentRequired => order.payment_required(),
        }
    }
}

/// A step in a flow together with its condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    pub step: CheckoutStep,
    pub condition: StepCondition,
}

/// Errors building or editing a checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("invalid checkout step name: {0:?}")]
    InvalidName(String),

    #[error("checkout step {0} is reserved")]
    Reserved(CheckoutStep),

    #[error("checkout step {0} is already in the flow")]
    Duplicate(CheckoutStep),

    #[error("checkout step {0} is not in the flow")]
    UnknownAnchor(CheckoutStep),

    #[error("invalid step insertion {0:?}, expected <step>:<after|before>:<anchor>")]
    InvalidInsertion(String),
}

/// Ordered checkout steps between `cart` and `complete`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutFlow {
    steps: Vec<FlowStep>,
}

impl Default for CheckoutFlow {
    fn default() -> Self {
        Self::standard()
    }
}

impl CheckoutFlow {
    /// `address`, `delivery` (shippable orders), `payment` (orders with a
    /// positive total), `confirm`.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            steps: vec![
                FlowStep {
                    step: CheckoutStep::ADDRESS,
                    condition: StepCondition::Always,
                },
                FlowStep {
                    step: CheckoutStep::DELIVERY,
                    condition: StepCondition::RequiresShipping,
                },
                FlowStep {
                    step: CheckoutStep::PAYMENT,
                    condition: StepCondition::PaymentRequired,
                },
                FlowStep {
                    step: CheckoutStep::CONFIRM,
                    condition: StepCondition::Always,
                },
            ],
        }
    }

    /// All configured steps, regardless of condition.
    #[must_use]
    pub fn steps(&self) -> &[FlowStep] {
        &self.steps
    }

    /// Whether `step` is configured.
    #[must_use]
    pub fn contains(&self, step: &CheckoutStep) -> bool {
        self.steps.iter().any(|s| s.step == *step)
    }

    fn position(&self, step: &CheckoutStep) -> Option<usize> {
        self.steps.iter().position(|s| s.step == *step)
    }

    fn check_insertable(&self, step: &CheckoutStep) -> Result<(), FlowError> {
        if step.is_reserved() {
            return Err(FlowError::Reserved(step.clone()));
        }
        if self.contains(step) {
            return Err(FlowError::Duplicate(step.clone()));
        }
        Ok(())
    }

    /// Insert `step` right after `anchor`.
    ///
    /// # Errors
    ///
    /// Fails if `step` is reserved or already present, or `anchor` is unknown.
    pub fn insert_after(
        &mut self,
        step: CheckoutStep,
        anchor: &CheckoutStep,
        condition: StepCondition,
    ) -> Result<(), FlowError> {
        self.check_insertable(&step)?;
        let index = self
            .position(anchor)
            .ok_or_else(|| FlowError::UnknownAnchor(anchor.clone()))?;
        self.steps.insert(index + 1, FlowStep { step, condition });
        Ok(())
    }

    /// Insert `step` right before `anchor`.
    ///
    /// # Errors
    ///
    /// Fails if `step` is reserved or already present, or `anchor` is unknown.
    pub fn insert_before(
        &mut self,
        step: CheckoutStep,
        anchor: &CheckoutStep,
        condition: StepCondition,
    ) -> Result<(), FlowError> {
        self.check_insertable(&step)?;
        let index = self
            .position(anchor)
            .ok_or_else(|| FlowError::UnknownAnchor(anchor.clone()))?;
        self.steps.insert(index, FlowStep { step, condition });
        Ok(())
    }

    /// Remove `step`. Returns `false` if it was not configured.
    pub fn remove(&mut self, step: &CheckoutStep) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.step != *step);
        self.steps.len() != before
    }

    /// Apply a parsed insertion. Inserted steps always apply.
    ///
    /// # Errors
    ///
    /// See [`CheckoutFlow::insert_after`].
    pub fn apply(&mut self, insertion: StepInsertion) -> Result<(), FlowError> {
        match insertion.placement {
            Placement::After => {
                self.insert_after(insertion.step, &insertion.anchor, StepCondition::Always)
            }
            Placement::Before => {
                self.insert_before(insertion.step, &insertion.anchor, StepCondition::Always)
            }
        }
    }

    /// Steps that apply to `order`, followed by `complete`. `cart` is excluded.
    #[must_use]
    pub fn steps_for(&self, order: &Order) -> Vec<CheckoutStep> {
        self.steps
            .iter()
            .filter(|s| s.condition.holds(order))
            .map(|s| s.step.clone())
            .chain(std::iter::once(CheckoutStep::COMPLETE))
            .collect()
    }
}

/// Where an inserted step goes relative to its anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    After,
    Before,
}

/// An extra step parsed from `<step>:<after|before>:<anchor>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepInsertion {
    pub step: CheckoutStep,
    pub placement: Placement,
    pub anchor: CheckoutStep,
}

impl FromStr for StepInsertion {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FlowError::InvalidInsertion(s.to_owned());
        let mut parts = s.trim().split(':');
        let (Some(step), Some(placement), Some(anchor), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let placement = match placement {
            "after" => Placement::After,
            "before" => Placement::Before,
            _ => return Err(invalid()),
        };

        Ok(Self {
            step: step.parse()?,
            placement,
            anchor: anchor.parse()?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::order::LineItemSpec;
    use crate::types::{Currency, VariantId};

    fn order_with(price: i64, shippable: bool) -> Order {
        let mut order = Order::new(None, None, Currency::USD);
        order.add_line_item(
            &LineItemSpec {
                variant_id: VariantId::new(1),
                name: "Amazing Item".to_owned(),
                sku: "AMZ-1".to_owned(),
                price: Decimal::new(price, 2),
                shippable,
            },
            1,
        );
        order
    }

    fn names(steps: &[CheckoutStep]) -> Vec<&str> {
        steps.iter().map(CheckoutStep::as_str).collect()
    }

    #[test]
    fn test_standard_flow_for_shippable_order() {
        let flow = CheckoutFlow::standard();
        let steps = flow.steps_for(&order_with(1999, true));
        assert_eq!(
            names(&steps),
            ["address", "delivery", "payment", "confirm", "complete"]
        );
    }

    #[test]
    fn test_conditional_steps_are_skipped() {
        let flow = CheckoutFlow::standard();
        let steps = flow.steps_for(&order_with(0, false));
        assert_eq!(names(&steps), ["address", "confirm", "complete"]);
    }

    #[test]
    fn test_insert_after_payment() {
        let mut flow = CheckoutFlow::standard();
        let gift_wrap = CheckoutStep::parse("gift_wrap").unwrap();
        flow.insert_after(
            gift_wrap.clone(),
            &CheckoutStep::PAYMENT,
            StepCondition::Always,
        )
        .unwrap();

        let steps = flow.steps_for(&order_with(1999, true));
        assert_eq!(
            names(&steps),
            ["address", "delivery", "payment", "gift_wrap", "confirm", "complete"]
        );

        assert_eq!(
            flow.insert_after(gift_wrap, &CheckoutStep::PAYMENT, StepCondition::Always),
            Err(FlowError::Duplicate(CheckoutStep::parse("gift_wrap").unwrap()))
        );
    }

    #[test]
    fn test_insert_before_and_remove() {
        let mut flow = CheckoutFlow::standard();
        let review = CheckoutStep::parse("review").unwrap();
        flow.insert_before(review.clone(), &CheckoutStep::ADDRESS, StepCondition::Always)
            .unwrap();
        assert_eq!(flow.steps()[0].step, review);

        assert!(flow.remove(&CheckoutStep::DELIVERY));
        assert!(!flow.remove(&CheckoutStep::DELIVERY));
        assert!(!flow.contains(&CheckoutStep::DELIVERY));
    }

    #[test]
    fn test_reserved_and_unknown_anchor() {
        let mut flow = CheckoutFlow::standard();
        assert_eq!(
            flow.insert_after(CheckoutStep::COMPLETE, &CheckoutStep::CONFIRM, StepCondition::Always),
            Err(FlowError::Reserved(CheckoutStep::COMPLETE))
        );

        let missing = CheckoutStep::parse("missing").unwrap();
        let extra = CheckoutStep::parse("extra").unwrap();
        assert_eq!(
            flow.insert_after(extra, &missing, StepCondition::Always),
            Err(FlowError::UnknownAnchor(missing))
        );
    }

    #[test]
    fn test_step_parse() {
        assert_eq!(CheckoutStep::parse("payment").unwrap(), CheckoutStep::PAYMENT);
        assert!(CheckoutStep::parse("").is_err());
        assert!(CheckoutStep::parse("Payment").is_err());
        assert!(CheckoutStep::parse("../etc").is_err());
        assert!(CheckoutStep::parse(&"a".repeat(33)).is_err());
        assert_eq!(CheckoutStep::parse("gift_wrap").unwrap().title(), "Gift Wrap");
    }

    #[test]
    fn test_step_insertion_from_str() {
        let insertion: StepInsertion = "gift_wrap:after:payment".parse().unwrap();
        assert_eq!(insertion.step.as_str(), "gift_wrap");
        assert_eq!(insertion.placement, Placement::After);
        assert_eq!(insertion.anchor, CheckoutStep::PAYMENT);

        assert!("gift_wrap:around:payment".parse::<StepInsertion>().is_err());
        assert!("gift_wrap:after".parse::<StepInsertion>().is_err());
        assert!("a:after:b:c".parse::<StepInsertion>().is_err());
    }

    #[test]
    fn test_step_serde_is_plain_string() {
        let json = serde_json::to_string(&CheckoutStep::DELIVERY).unwrap();
        assert_eq!(json, "\"delivery\"");
        let back: CheckoutStep = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CheckoutStep::DELIVERY);
    }
}
