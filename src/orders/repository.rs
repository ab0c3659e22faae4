//! OrderRepository: the persistence boundary for OpenOrder/PendingOrder/Trade.
//!
//! Grounded in the teacher's `persistence/repository.rs` trait-per-aggregate
//! pattern (`OrderRepository`, `TradeRepository`), generalized from its
//! TDengine time-series backing to the Postgres-as-source-of-truth model
//! this spec requires.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::core_types::{MarketType, OrderDbId, OrderStatus, OrderType, Side, StrategyAccountId};
use crate::error::{EngineError, EngineResult};

use super::models::{OpenOrder, PendingOrder, Trade};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert_open_order(&self, order: &OpenOrder) -> EngineResult<OrderDbId>;
    async fn insert_open_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &OpenOrder,
    ) -> EngineResult<OrderDbId>;
    async fn delete_open_order(&self, id: OrderDbId) -> EngineResult<()>;
    async fn delete_open_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: OrderDbId,
    ) -> EngineResult<()>;
    async fn get_open_order(&self, id: OrderDbId) -> EngineResult<Option<OpenOrder>>;
    async fn list_open_for_symbol(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<Vec<OpenOrder>>;
    async fn list_open_by_status(&self, status: &str) -> EngineResult<Vec<OpenOrder>>;
    async fn update_fill_state(
        &self,
        id: OrderDbId,
        filled_quantity: rust_decimal::Decimal,
        status: crate::core_types::OrderStatus,
        filled_at: Option<DateTime<Utc>>,
    ) -> EngineResult<()>;
    /// Deletes OpenOrder/PendingOrder rows in terminal states older than
    /// `older_than` (§4.6 — the 7-day GC).
    async fn gc_terminal(&self, older_than: DateTime<Utc>) -> EngineResult<u64>;

    async fn insert_pending_order(&self, order: &PendingOrder) -> EngineResult<OrderDbId>;
    async fn insert_pending_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &PendingOrder,
    ) -> EngineResult<OrderDbId>;
    async fn delete_pending_order(&self, id: OrderDbId) -> EngineResult<()>;
    async fn delete_pending_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: OrderDbId,
    ) -> EngineResult<()>;
    async fn list_pending_for_symbol(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<Vec<PendingOrder>>;
    /// Every `(strategy_account_id, symbol)` pair currently present in
    /// either store — the scheduler's per-tick work list (§4.5.4).
    async fn list_active_symbol_pairs(&self) -> EngineResult<Vec<(StrategyAccountId, String)>>;
    async fn bump_retry_count(&self, id: OrderDbId) -> EngineResult<u32>;

    /// Inserts a Trade row inside a transaction. A unique-violation on
    /// `(strategy_account_id, exchange_order_id)` is surfaced as
    /// `Ok(None)` rather than an error — the caller (Reconciler) treats a
    /// lost race as "someone else already recorded this fill", not a
    /// failure (§4.6, seed scenario 5).
    async fn insert_trade_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        trade: &Trade,
    ) -> EngineResult<Option<i64>>;
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_open_order(&self, order: &OpenOrder) -> EngineResult<OrderDbId> {
        let row = sqlx::query!(
            r#"INSERT INTO open_orders
                 (exchange_order_id, strategy_account_id, symbol, side, order_type,
                  price, stop_price, quantity, filled_quantity, status, market_type,
                  webhook_received_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
               RETURNING id"#,
            order.exchange_order_id,
            order.strategy_account_id,
            order.symbol,
            order.side.to_string(),
            order.order_type.to_string(),
            order.price,
            order.stop_price,
            order.quantity,
            order.filled_quantity,
            "OPEN",
            order.market_type.to_string(),
            order.webhook_received_at,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.id)
    }

    async fn insert_open_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &OpenOrder,
    ) -> EngineResult<OrderDbId> {
        let row = sqlx::query!(
            r#"INSERT INTO open_orders
                 (exchange_order_id, strategy_account_id, symbol, side, order_type,
                  price, stop_price, quantity, filled_quantity, status, market_type,
                  webhook_received_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
               RETURNING id"#,
            order.exchange_order_id,
            order.strategy_account_id,
            order.symbol,
            order.side.to_string(),
            order.order_type.to_string(),
            order.price,
            order.stop_price,
            order.quantity,
            order.filled_quantity,
            "OPEN",
            order.market_type.to_string(),
            order.webhook_received_at,
        )
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.id)
    }

    async fn delete_open_order(&self, id: OrderDbId) -> EngineResult<()> {
        sqlx::query!("DELETE FROM open_orders WHERE id = $1", id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_open_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: OrderDbId,
    ) -> EngineResult<()> {
        sqlx::query!("DELETE FROM open_orders WHERE id = $1", id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn get_open_order(&self, id: OrderDbId) -> EngineResult<Option<OpenOrder>> {
        let row = sqlx::query!(
            r#"SELECT id, exchange_order_id, strategy_account_id, symbol, side, order_type,
                      price, stop_price, quantity, filled_quantity, status, market_type,
                      webhook_received_at, filled_at
               FROM open_orders
               WHERE id = $1"#,
            id,
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(OpenOrder {
                id: r.id,
                exchange_order_id: r.exchange_order_id,
                strategy_account_id: r.strategy_account_id,
                symbol: r.symbol,
                side: Side::from_str(&r.side).map_err(EngineError::Internal)?,
                order_type: OrderType::from_str(&r.order_type).map_err(EngineError::Internal)?,
                price: r.price,
                stop_price: r.stop_price,
                quantity: r.quantity,
                filled_quantity: r.filled_quantity,
                status: OrderStatus::from_str(&r.status).map_err(EngineError::Internal)?,
                market_type: MarketType::from_str(&r.market_type).map_err(EngineError::Internal)?,
                webhook_received_at: r.webhook_received_at,
                filled_at: r.filled_at,
            })
        })
        .transpose()
    }

    async fn list_open_for_symbol(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<Vec<OpenOrder>> {
        let rows = sqlx::query!(
            r#"SELECT id, exchange_order_id, strategy_account_id, symbol, side, order_type,
                      price, stop_price, quantity, filled_quantity, status, market_type,
                      webhook_received_at, filled_at
               FROM open_orders
               WHERE strategy_account_id = $1 AND symbol = $2"#,
            strategy_account_id,
            symbol,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(OpenOrder {
                    id: r.id,
                    exchange_order_id: r.exchange_order_id,
                    strategy_account_id: r.strategy_account_id,
                    symbol: r.symbol,
                    side: Side::from_str(&r.side).map_err(EngineError::Internal)?,
                    order_type: OrderType::from_str(&r.order_type).map_err(EngineError::Internal)?,
                    price: r.price,
                    stop_price: r.stop_price,
                    quantity: r.quantity,
                    filled_quantity: r.filled_quantity,
                    status: OrderStatus::from_str(&r.status).map_err(EngineError::Internal)?,
                    market_type: MarketType::from_str(&r.market_type).map_err(EngineError::Internal)?,
                    webhook_received_at: r.webhook_received_at,
                    filled_at: r.filled_at,
                })
            })
            .collect()
    }

    async fn list_open_by_status(&self, status: &str) -> EngineResult<Vec<OpenOrder>> {
        let rows = sqlx::query!(
            r#"SELECT id, exchange_order_id, strategy_account_id, symbol, side, order_type,
                      price, stop_price, quantity, filled_quantity, status, market_type,
                      webhook_received_at, filled_at
               FROM open_orders
               WHERE status = $1"#,
            status,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(OpenOrder {
                    id: r.id,
                    exchange_order_id: r.exchange_order_id,
                    strategy_account_id: r.strategy_account_id,
                    symbol: r.symbol,
                    side: Side::from_str(&r.side).map_err(EngineError::Internal)?,
                    order_type: OrderType::from_str(&r.order_type).map_err(EngineError::Internal)?,
                    price: r.price,
                    stop_price: r.stop_price,
                    quantity: r.quantity,
                    filled_quantity: r.filled_quantity,
                    status: OrderStatus::from_str(&r.status).map_err(EngineError::Internal)?,
                    market_type: MarketType::from_str(&r.market_type).map_err(EngineError::Internal)?,
                    webhook_received_at: r.webhook_received_at,
                    filled_at: r.filled_at,
                })
            })
            .collect()
    }

    async fn update_fill_state(
        &self,
        id: OrderDbId,
        filled_quantity: rust_decimal::Decimal,
        status: crate::core_types::OrderStatus,
        filled_at: Option<DateTime<Utc>>,
    ) -> EngineResult<()> {
        let status_str = match status {
            crate::core_types::OrderStatus::Open => "OPEN",
            crate::core_types::OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            crate::core_types::OrderStatus::Filled => "FILLED",
            crate::core_types::OrderStatus::Canceled => "CANCELED",
        };
        sqlx::query!(
            r#"UPDATE open_orders SET filled_quantity = $1, status = $2, filled_at = $3
               WHERE id = $4"#,
            filled_quantity,
            status_str,
            filled_at,
            id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn gc_terminal(&self, older_than: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query!(
            r#"DELETE FROM open_orders
               WHERE status IN ('FILLED','CANCELED') AND filled_at < $1"#,
            older_than
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_pending_order(&self, order: &PendingOrder) -> EngineResult<OrderDbId> {
        let row = sqlx::query!(
            r#"INSERT INTO pending_orders
                 (strategy_account_id, symbol, side, order_type, price, stop_price,
                  quantity, market_type, webhook_received_at, priority, sort_price,
                  retry_count, reason)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
               RETURNING id"#,
            order.strategy_account_id,
            order.symbol,
            order.side.to_string(),
            order.order_type.to_string(),
            order.price,
            order.stop_price,
            order.quantity,
            order.market_type.to_string(),
            order.webhook_received_at,
            order.priority,
            order.sort_price,
            order.retry_count as i32,
            order.reason,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.id)
    }

    async fn insert_pending_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order: &PendingOrder,
    ) -> EngineResult<OrderDbId> {
        let row = sqlx::query!(
            r#"INSERT INTO pending_orders
                 (strategy_account_id, symbol, side, order_type, price, stop_price,
                  quantity, market_type, webhook_received_at, priority, sort_price,
                  retry_count, reason)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
               RETURNING id"#,
            order.strategy_account_id,
            order.symbol,
            order.side.to_string(),
            order.order_type.to_string(),
            order.price,
            order.stop_price,
            order.quantity,
            order.market_type.to_string(),
            order.webhook_received_at,
            order.priority,
            order.sort_price,
            order.retry_count as i32,
            order.reason,
        )
        .fetch_one(&mut **tx)
        .await?;
        Ok(row.id)
    }

    async fn delete_pending_order(&self, id: OrderDbId) -> EngineResult<()> {
        sqlx::query!("DELETE FROM pending_orders WHERE id = $1", id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_pending_order_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: OrderDbId,
    ) -> EngineResult<()> {
        sqlx::query!("DELETE FROM pending_orders WHERE id = $1", id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list_pending_for_symbol(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<Vec<PendingOrder>> {
        let rows = sqlx::query!(
            r#"SELECT id, strategy_account_id, symbol, side, order_type, price, stop_price,
                      quantity, market_type, webhook_received_at, priority, sort_price,
                      retry_count, reason
               FROM pending_orders
               WHERE strategy_account_id = $1 AND symbol = $2"#,
            strategy_account_id,
            symbol,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(PendingOrder {
                    id: r.id,
                    strategy_account_id: r.strategy_account_id,
                    symbol: r.symbol,
                    side: Side::from_str(&r.side).map_err(EngineError::Internal)?,
                    order_type: OrderType::from_str(&r.order_type).map_err(EngineError::Internal)?,
                    price: r.price,
                    stop_price: r.stop_price,
                    quantity: r.quantity,
                    market_type: MarketType::from_str(&r.market_type).map_err(EngineError::Internal)?,
                    webhook_received_at: r.webhook_received_at,
                    priority: r.priority,
                    sort_price: r.sort_price,
                    retry_count: r.retry_count as u32,
                    reason: r.reason,
                })
            })
            .collect()
    }

    async fn list_active_symbol_pairs(&self) -> EngineResult<Vec<(StrategyAccountId, String)>> {
        let rows = sqlx::query!(
            r#"SELECT strategy_account_id, symbol FROM pending_orders
               UNION
               SELECT strategy_account_id, symbol FROM open_orders WHERE status = 'OPEN'"#
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.strategy_account_id, r.symbol))
            .collect())
    }

    async fn bump_retry_count(&self, id: OrderDbId) -> EngineResult<u32> {
        let row = sqlx::query!(
            r#"UPDATE pending_orders SET retry_count = retry_count + 1
               WHERE id = $1 RETURNING retry_count"#,
            id
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.retry_count as u32)
    }

    async fn insert_trade_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        trade: &Trade,
    ) -> EngineResult<Option<i64>> {
        let result = sqlx::query!(
            r#"INSERT INTO trades
                 (strategy_account_id, exchange_order_id, symbol, side, price,
                  quantity, pnl, fee, is_entry, timestamp)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
               ON CONFLICT (strategy_account_id, exchange_order_id) DO NOTHING
               RETURNING id"#,
            trade.strategy_account_id,
            trade.exchange_order_id,
            trade.symbol,
            trade.side.to_string(),
            trade.price,
            trade.quantity,
            trade.pnl,
            trade.fee,
            trade.is_entry,
            trade.timestamp,
        )
        .fetch_optional(&mut **tx)
        .await?;

        Ok(result.map(|r| r.id))
    }
}
