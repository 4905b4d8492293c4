//! Order storage and the seeded catalog.
//!
//! # Backends
//!
//! Orders live behind the [`OrderRepository`] trait with two backends:
//!
//! - [`MemoryOrderRepository`] - used when no database URL is configured and in tests
//! - [`PgOrderRepository`] - `PostgreSQL`, one JSONB document per order
//!
//! The catalog and users are loaded from a YAML seed into [`CatalogStore`]
//! and [`UserStore`] at startup.
//!
//! # Database: `corner_shop`
//!
//! ## Tables
//!
//! - `storefront.orders` - Order aggregates with indexed lookup columns
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p corner-shop-cli -- migrate storefront
//! ```

mod catalog;
mod memory;
mod postgres;
pub mod seed;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use corner_shop_core::checkout::{CheckoutStateMachine, CheckoutStep};
use corner_shop_core::order::{LineItemSpec, Order};
use corner_shop_core::{Currency, GuestToken, OrderNumber, UserId};

pub use catalog::{CatalogStore, StockLock, UserStore};
pub use memory::MemoryOrderRepository;
pub use postgres::PgOrderRepository;
pub use seed::{Seed, SeedError};

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Order document could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate order number).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Who is shopping: a registered user, a guest token, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShopperKey {
    pub user_id: Option<UserId>,
    pub guest_token: Option<GuestToken>,
}

/// Storage for order aggregates.
///
/// Backends implement the lookups; [`OrderRepository::current_order_for`]
/// and [`OrderRepository::create_or_append`] build the shopper-facing rules
/// on top of them.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Find an order by its public number.
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError>;

    /// Find the incomplete order carrying `token` whose owner is exactly `user_id`.
    async fn find_incomplete_by_token(
        &self,
        token: &GuestToken,
        user_id: Option<UserId>,
    ) -> Result<Option<Order>, RepositoryError>;

    /// The user's most recently updated incomplete order.
    async fn find_latest_incomplete_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Store a new order, assigning its id.
    async fn insert(&self, order: Order) -> Result<Order, RepositoryError>;

    /// Replace a stored order.
    async fn update(&self, order: &Order) -> Result<(), RepositoryError>;

    /// Number of stored orders.
    async fn count(&self) -> Result<u64, RepositoryError>;

    /// Check the backend is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Insert or update depending on whether the order is stored yet.
    async fn save(&self, order: Order) -> Result<Order, RepositoryError> {
        if order.is_persisted() {
            self.update(&order).await?;
            Ok(order)
        } else {
            self.insert(order).await
        }
    }

    /// The shopper's incomplete order, if any.
    ///
    /// A user's order is found by guest token first, then by recency. A
    /// user holding an unowned guest order and no order of their own adopts
    /// the guest order.
    async fn current_order_for(
        &self,
        shopper: &ShopperKey,
    ) -> Result<Option<Order>, RepositoryError> {
        let Some(user_id) = shopper.user_id else {
            return match &shopper.guest_token {
                Some(token) => self.find_incomplete_by_token(token, None).await,
                None => Ok(None),
            };
        };

        if let Some(token) = &shopper.guest_token
            && let Some(order) = self.find_incomplete_by_token(token, Some(user_id)).await?
        {
            return Ok(Some(order));
        }

        if let Some(order) = self.find_latest_incomplete_for_user(user_id).await? {
            return Ok(Some(order));
        }

        let Some(token) = &shopper.guest_token else {
            return Ok(None);
        };
        match self.find_incomplete_by_token(token, None).await? {
            Some(mut order) => {
                order.user_id = Some(user_id);
                order.created_by = order.created_by.or(Some(user_id));
                order.touch();
                self.update(&order).await?;
                tracing::info!(order = %order.number, user_id = %user_id, "Guest order adopted");
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    /// Add `quantity` of a variant to the shopper's current order, creating
    /// the order if there is none.
    ///
    /// An order already in checkout goes back to the first step of
    /// `machine`, since its shipments no longer cover every line. Callers
    /// validate `quantity`; an overflowing total is a `Conflict`.
    async fn create_or_append(
        &self,
        shopper: &ShopperKey,
        currency: Currency,
        item: &LineItemSpec,
        quantity: u32,
        machine: &CheckoutStateMachine,
    ) -> Result<Order, RepositoryError> {
        let mut order = match self.current_order_for(shopper).await? {
            Some(order) => order,
            None => Order::new(shopper.user_id, shopper.guest_token.clone(), currency),
        };

        if order.add_line_item(item, quantity).is_none() {
            return Err(RepositoryError::Conflict(format!(
                "quantity of {} out of range",
                item.name
            )));
        }
        if order.state != CheckoutStep::CART {
            machine.restart(&mut order);
        }
        // Orders found through the user keep working from this session's cart.
        if order.guest_token.is_none() {
            order.guest_token.clone_from(&shopper.guest_token);
        }
        self.save(order).await
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
