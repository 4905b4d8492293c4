//! `PostgreSQL` order storage.
//!
//! Each order is one row: the aggregate as JSONB in `data`, with the
//! columns used for lookups kept alongside.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use corner_shop_core::order::Order;
use corner_shop_core::{GuestToken, OrderId, OrderNumber, UserId};

use super::{OrderRepository, RepositoryError};

/// Repository for orders in `storefront.orders`.
#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode(row: &sqlx::postgres::PgRow) -> Result<Order, RepositoryError> {
    let id: i32 = row.try_get("id")?;
    let Json(mut order): Json<Order> = row.try_get("data")?;
    if order.id.as_i32() != id {
        if order.is_persisted() {
            return Err(RepositoryError::DataCorruption(format!(
                "order row {id} holds document for order {}",
                order.id
            )));
        }
        order.id = OrderId::new(id);
    }
    Ok(order)
}

fn map_unique_violation(e: sqlx::Error, number: &OrderNumber) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("order number {number} already exists"));
    }
    RepositoryError::Database(e)
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT id, data FROM storefront.orders WHERE number = $1")
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn find_incomplete_by_token(
        &self,
        token: &GuestToken,
        user_id: Option<UserId>,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, data
            FROM storefront.orders
            WHERE guest_token = $1
              AND user_id IS NOT DISTINCT FROM $2
              AND completed_at IS NULL
            ORDER BY updated_at DESC
            LIMIT 1
            ",
        )
        .bind(token.as_str())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn find_latest_incomplete_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            r"
            SELECT id, data
            FROM storefront.orders
            WHERE user_id = $1 AND completed_at IS NULL
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn insert(&self, mut order: Order) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id: i32 = sqlx::query_scalar(
            r"
            INSERT INTO storefront.orders (number, guest_token, user_id, state, completed_at, data, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(order.number.as_str())
        .bind(order.guest_token.as_ref().map(GuestToken::as_str))
        .bind(order.user_id)
        .bind(order.state.as_str())
        .bind(order.completed_at)
        .bind(Json(&order))
        .bind(order.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, &order.number))?;

        order.id = OrderId::new(id);
        sqlx::query("UPDATE storefront.orders SET data = $2 WHERE id = $1")
            .bind(order.id)
            .bind(Json(&order))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(order = %order.number, id = %order.id, "Order created");
        Ok(order)
    }

    async fn update(&self, order: &Order) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE storefront.orders
            SET guest_token = $2,
                user_id = $3,
                state = $4,
                completed_at = $5,
                data = $6,
                updated_at = $7
            WHERE id = $1
            ",
        )
        .bind(order.id)
        .bind(order.guest_token.as_ref().map(GuestToken::as_str))
        .bind(order.user_id)
        .bind(order.state.as_str())
        .bind(order.completed_at)
        .bind(Json(order))
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storefront.orders")
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count)
            .map_err(|e| RepositoryError::DataCorruption(format!("negative order count: {e}")))
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
