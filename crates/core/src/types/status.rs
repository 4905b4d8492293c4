//! Status enums for order aggregate members and shoppers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Processing state of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// Entered during checkout, not yet sent to the gateway.
    #[default]
    Checkout,
    /// Captured by the gateway.
    Completed,
    /// Declined or errored at the gateway.
    Failed,
    /// Superseded by a newer payment before it was processed.
    Invalid,
}

impl PaymentState {
    /// Whether the payment still counts towards the order (not failed or superseded).
    #[must_use]
    pub const fn is_valid(self) -> bool {
        matches!(self, Self::Checkout | Self::Completed)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Checkout => "checkout",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Invalid => "invalid",
        })
    }
}

/// Fulfilment state of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentState {
    /// Proposed during checkout.
    #[default]
    Pending,
    /// Order completed and paid; ready to ship.
    Ready,
}

/// Which of an order's two addresses is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressKind {
    Bill,
    Ship,
}

impl fmt::Display for AddressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bill => "Bill address",
            Self::Ship => "Ship address",
        })
    }
}

/// Storefront role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Can view products that are not yet (or no longer) available.
    Admin,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            _ => Err(format!("invalid user role: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_payment_states() {
        assert!(PaymentState::Checkout.is_valid());
        assert!(PaymentState::Completed.is_valid());
        assert!(!PaymentState::Failed.is_valid());
        assert!(!PaymentState::Invalid.is_valid());
    }

    #[test]
    fn test_payment_state_serde_names() {
        let json = serde_json::to_string(&PaymentState::Completed).ok();
        assert_eq!(json.as_deref(), Some("\"completed\""));
    }

    #[test]
    fn test_role_round_trip_through_str() {
        assert_eq!("admin".parse::<UserRole>(), Ok(UserRole::Admin));
        assert!("owner".parse::<UserRole>().is_err());
    }
}
