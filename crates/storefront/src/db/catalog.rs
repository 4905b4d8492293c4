//! Seeded catalog and user stores.

use std::sync::Arc;

use tokio::sync::{RwLock, RwLockWriteGuard};

use corner_shop_core::order::Order;
use corner_shop_core::{UserId, VariantId};

use crate::models::{Catalog, User};
use crate::services::cart::stock_shortfalls;

/// The catalog, shared as immutable snapshots.
///
/// Readers take a cheap `Arc` snapshot; stock updates copy on write.
#[derive(Debug, Default)]
pub struct CatalogStore {
    catalog: RwLock<Arc<Catalog>>,
}

impl CatalogStore {
    #[must_use]
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
        }
    }

    /// The current catalog.
    pub async fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&*self.catalog.read().await)
    }

    /// Hold the catalog exclusively until the returned lock is dropped.
    ///
    /// Completing an order checks stock against [`StockLock::catalog`] and
    /// then takes it with [`StockLock::unstock`]; no other writer runs in
    /// between.
    pub async fn lock_stock(&self) -> StockLock<'_> {
        StockLock {
            guard: self.catalog.write().await,
        }
    }
}

/// Exclusive access to the catalog's stock levels.
#[derive(Debug)]
pub struct StockLock<'a> {
    guard: RwLockWriteGuard<'a, Arc<Catalog>>,
}

impl StockLock<'_> {
    /// The catalog as of taking the lock.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.guard)
    }

    /// Take the order's quantities out of stock.
    ///
    /// Returns the names of lines the stock could not cover; nothing is
    /// taken then.
    pub fn unstock(&mut self, order: &Order, track_inventory: bool) -> Vec<String> {
        let shortfalls = stock_shortfalls(&self.guard, order, track_inventory);
        if !shortfalls.is_empty() {
            return shortfalls;
        }

        let sold: Vec<(VariantId, u32)> = order
            .line_items
            .iter()
            .map(|item| (item.variant_id, item.quantity))
            .collect();
        Arc::make_mut(&mut self.guard).unstock(&sold);
        tracing::debug!(order = %order.number, lines = sold.len(), "Inventory unstocked");
        Vec::new()
    }
}

/// Registered users, looked up by API key.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    #[must_use]
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: RwLock::new(users),
        }
    }

    /// Find the user holding `api_key`. Blank keys match nobody.
    pub async fn find_by_api_key(&self, api_key: &str) -> Option<User> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return None;
        }
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.api_key == api_key)
            .cloned()
    }

    /// Save a user's default addresses and address book from `order`.
    ///
    /// Returns `false` if the user does not exist.
    pub async fn persist_order_address(&self, id: UserId, order: &Order) -> bool {
        let mut users = self.users.write().await;
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return false;
        };
        user.persist_order_address(order);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use corner_shop_core::Email;

    use super::*;

    fn user(key: &str) -> User {
        User {
            id: UserId::new(1),
            email: Email::parse("shopper@example.com").unwrap(),
            api_key: key.to_string(),
            roles: vec![],
            bill_address: None,
            ship_address: None,
            addresses: vec![],
        }
    }

    #[tokio::test]
    async fn test_find_by_api_key() {
        let store = UserStore::new(vec![user("fake")]);
        assert!(store.find_by_api_key("fake").await.is_some());
        assert!(store.find_by_api_key("other").await.is_none());
        assert!(store.find_by_api_key("  ").await.is_none());
    }

    fn tote_order(catalog: &Catalog, quantity: u32) -> Order {
        let mut order = Order::new(None, None, corner_shop_core::Currency::USD);
        order.add_line_item(&catalog.line_item_spec(VariantId::new(1)).unwrap(), quantity);
        order
    }

    #[tokio::test]
    async fn test_unstock_takes_only_covered_orders() {
        let seed = crate::db::Seed::from_yaml(include_str!("../../seeds/catalog.yaml")).unwrap();
        let store = CatalogStore::new(seed.catalog);
        let before = store.snapshot().await;

        let mut stock = store.lock_stock().await;
        let catalog = stock.catalog();
        assert!(stock.unstock(&tote_order(&catalog, 20), true).is_empty());
        assert_eq!(
            stock.unstock(&tote_order(&catalog, 10), true),
            vec!["Ruby on Rails Tote"]
        );
        assert!(stock.unstock(&tote_order(&catalog, 10), false).is_empty());
        drop(stock);

        let on_hand = |c: &Catalog| c.variant(VariantId::new(1)).unwrap().1.stock.count_on_hand;
        assert_eq!(on_hand(&before), 25);
        assert_eq!(on_hand(&*store.snapshot().await), 5);
    }
}
