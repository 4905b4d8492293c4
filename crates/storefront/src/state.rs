//! Application state shared across handlers.

use std::sync::Arc;

use corner_shop_core::checkout::{CheckoutStateMachine, FlowError};

use crate::config::StorefrontConfig;
use crate::db::{CatalogStore, OrderRepository, Seed, UserStore};
use crate::services::search::{CatalogSearcher, ProductSearcher};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// order repository, the seeded catalog and users, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    orders: Arc<dyn OrderRepository>,
    catalog: CatalogStore,
    users: UserStore,
    machine: CheckoutStateMachine,
    searcher: Arc<dyn ProductSearcher>,
}

impl AppState {
    /// Create a new application state with the catalog searcher.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `orders` - Order storage backend
    /// * `seed` - Catalog and users
    ///
    /// # Errors
    ///
    /// Returns an error if the configured checkout steps cannot be applied.
    pub fn new(
        config: StorefrontConfig,
        orders: Arc<dyn OrderRepository>,
        seed: Seed,
    ) -> Result<Self, FlowError> {
        Self::with_searcher(config, orders, seed, Arc::new(CatalogSearcher))
    }

    /// Create a new application state with a custom product searcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured checkout steps cannot be applied.
    pub fn with_searcher(
        config: StorefrontConfig,
        orders: Arc<dyn OrderRepository>,
        seed: Seed,
        searcher: Arc<dyn ProductSearcher>,
    ) -> Result<Self, FlowError> {
        let machine = CheckoutStateMachine::new(config.checkout_flow()?);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                orders,
                catalog: CatalogStore::new(seed.catalog),
                users: UserStore::new(seed.users),
                machine,
                searcher,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the order repository.
    #[must_use]
    pub fn orders(&self) -> &dyn OrderRepository {
        self.inner.orders.as_ref()
    }

    /// Get the catalog store.
    #[must_use]
    pub fn catalog(&self) -> &CatalogStore {
        &self.inner.catalog
    }

    /// Get the user store.
    #[must_use]
    pub fn users(&self) -> &UserStore {
        &self.inner.users
    }

    /// Get the checkout state machine.
    #[must_use]
    pub fn machine(&self) -> &CheckoutStateMachine {
        &self.inner.machine
    }

    /// Get the product searcher.
    #[must_use]
    pub fn searcher(&self) -> &dyn ProductSearcher {
        self.inner.searcher.as_ref()
    }
}
