//! In-memory order storage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use corner_shop_core::order::Order;
use corner_shop_core::{GuestToken, OrderId, OrderNumber, UserId};

use super::{OrderRepository, RepositoryError};

/// Orders held in a process-local map. Writes are serialized by the lock.
#[derive(Debug, Default)]
pub struct MemoryOrderRepository {
    orders: RwLock<BTreeMap<OrderId, Order>>,
    last_id: AtomicI32,
}

impl MemoryOrderRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored order, oldest first.
    pub async fn all(&self) -> Vec<Order> {
        self.orders.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderRepository {
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.values().find(|o| o.number == *number).cloned())
    }

    async fn find_incomplete_by_token(
        &self,
        token: &GuestToken,
        user_id: Option<UserId>,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| {
                !o.is_completed() && o.guest_token.as_ref() == Some(token) && o.user_id == user_id
            })
            .max_by_key(|o| o.updated_at)
            .cloned())
    }

    async fn find_latest_incomplete_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .filter(|o| !o.is_completed() && o.user_id == Some(user_id))
            .max_by_key(|o| (o.updated_at, o.id))
            .cloned())
    }

    async fn insert(&self, mut order: Order) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.values().any(|o| o.number == order.number) {
            return Err(RepositoryError::Conflict(format!(
                "order number {} already exists",
                order.number
            )));
        }

        let id = OrderId::new(self.last_id.fetch_add(1, Ordering::SeqCst) + 1);
        order.id = id;
        orders.insert(id, order.clone());
        drop(orders);

        tracing::debug!(order = %order.number, id = %id, "Order created");
        Ok(order)
    }

    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or(RepositoryError::NotFound)?;
        *stored = order.clone();
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.len() as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;

    use corner_shop_core::checkout::{CheckoutStateMachine, CheckoutStep};
    use corner_shop_core::order::LineItemSpec;
    use corner_shop_core::{Currency, VariantId};

    use super::*;
    use crate::db::ShopperKey;

    fn machine() -> CheckoutStateMachine {
        CheckoutStateMachine::default()
    }

    fn item() -> LineItemSpec {
        LineItemSpec {
            variant_id: VariantId::new(1),
            name: "Amazing Item".to_string(),
            sku: "AMZ-1".to_string(),
            price: Decimal::new(1999, 2),
            shippable: true,
        }
    }

    #[tokio::test]
    async fn test_create_or_append_reuses_current_order() {
        let repo = MemoryOrderRepository::new();
        let shopper = ShopperKey {
            user_id: None,
            guest_token: Some(GuestToken::generate()),
        };

        let first = repo
            .create_or_append(&shopper, Currency::USD, &item(), 2, &machine())
            .await
            .unwrap();
        let second = repo
            .create_or_append(&shopper, Currency::USD, &item(), 3, &machine())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.line_items.first().unwrap().quantity, 5);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_completed_orders_are_not_current() {
        let repo = MemoryOrderRepository::new();
        let token = GuestToken::generate();
        let shopper = ShopperKey {
            user_id: None,
            guest_token: Some(token),
        };

        let mut order = repo
            .create_or_append(&shopper, Currency::USD, &item(), 1, &machine())
            .await
            .unwrap();
        order.completed_at = Some(chrono::Utc::now());
        repo.update(&order).await.unwrap();

        assert!(repo.current_order_for(&shopper).await.unwrap().is_none());
        assert!(repo.find_by_number(&order.number).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_adopts_guest_order() {
        let repo = MemoryOrderRepository::new();
        let token = GuestToken::generate();
        let guest = ShopperKey {
            user_id: None,
            guest_token: Some(token.clone()),
        };
        let order = repo
            .create_or_append(&guest, Currency::USD, &item(), 1, &machine())
            .await
            .unwrap();

        let user = ShopperKey {
            user_id: Some(UserId::new(7)),
            guest_token: Some(token),
        };
        let adopted = repo.current_order_for(&user).await.unwrap().unwrap();
        assert_eq!(adopted.id, order.id);
        assert_eq!(adopted.user_id, Some(UserId::new(7)));

        // The guest view no longer matches an owned order.
        assert!(repo.current_order_for(&guest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_order_found_without_token() {
        let repo = MemoryOrderRepository::new();
        let user = ShopperKey {
            user_id: Some(UserId::new(3)),
            guest_token: None,
        };
        let order = repo
            .create_or_append(&user, Currency::USD, &item(), 1, &machine())
            .await
            .unwrap();

        let found = repo.current_order_for(&user).await.unwrap().unwrap();
        assert_eq!(found.number, order.number);
    }

    #[tokio::test]
    async fn test_update_unknown_order_is_not_found() {
        let repo = MemoryOrderRepository::new();
        let order = Order::new(None, None, Currency::USD);
        assert!(matches!(
            repo.update(&order).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_appending_restarts_started_checkout() {
        let repo = MemoryOrderRepository::new();
        let shopper = ShopperKey {
            user_id: None,
            guest_token: Some(GuestToken::generate()),
        };
        let mut order = repo
            .create_or_append(&shopper, Currency::USD, &item(), 1, &machine())
            .await
            .unwrap();
        order.state = CheckoutStep::PAYMENT;
        order.propose_shipment(Vec::new());
        repo.update(&order).await.unwrap();

        let order = repo
            .create_or_append(&shopper, Currency::USD, &item(), 1, &machine())
            .await
            .unwrap();
        assert_eq!(order.state, CheckoutStep::ADDRESS);
        assert!(order.shipments.is_empty());
        assert_eq!(
            repo.find_by_number(&order.number).await.unwrap().unwrap().state,
            CheckoutStep::ADDRESS
        );
    }
}
