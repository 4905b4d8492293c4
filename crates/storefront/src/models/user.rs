//! Registered shoppers.

use serde::{Deserialize, Serialize};

use corner_shop_core::order::{Address, Order};
use corner_shop_core::{Email, UserId, UserRole};

/// A registered shopper, identified on requests by API key.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub api_key: String,
    #[serde(default)]
    pub roles: Vec<UserRole>,
    /// Default bill address copied onto new checkouts.
    #[serde(default)]
    pub bill_address: Option<Address>,
    /// Default ship address copied onto new checkouts.
    #[serde(default)]
    pub ship_address: Option<Address>,
    /// Every address the user has checked out with.
    #[serde(default)]
    pub addresses: Vec<Address>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("api_key", &"[REDACTED]")
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

impl User {
    #[must_use]
    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }

    /// Remember an order's addresses as the user's defaults and add them to
    /// the address book.
    pub fn persist_order_address(&mut self, order: &Order) {
        if let Some(bill) = &order.bill_address {
            self.remember(bill);
            self.bill_address = Some(bill.clone());
        }
        if let Some(ship) = &order.ship_address {
            self.remember(ship);
            self.ship_address = Some(ship.clone());
        }
    }

    fn remember(&mut self, address: &Address) {
        if !self.addresses.iter().any(|a| a.same_location(address)) {
            self.addresses.push(address.clone());
        }
    }
}
