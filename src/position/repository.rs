//! PositionRepository: persistence for StrategyPosition (§3, §4.7).
//!
//! Follows the same trait-plus-Postgres-impl shape as
//! `orders::repository::OrderRepository`.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::core_types::StrategyAccountId;
use crate::error::EngineResult;

use super::StrategyPosition;

#[async_trait]
pub trait PositionRepository: Send + Sync {
    /// Reads the current position, or a flat one if none is on record yet —
    /// a strategy account's first fill on a symbol has no prior row.
    async fn get_or_flat(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<StrategyPosition>;

    /// Upserts the new quantity/entry_price/pnl delta for this symbol.
    async fn upsert(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
        quantity: Decimal,
        entry_price: Decimal,
        realized_pnl_delta: Decimal,
    ) -> EngineResult<()>;

    async fn list_for_strategy_account(
        &self,
        strategy_account_id: StrategyAccountId,
    ) -> EngineResult<Vec<StrategyPosition>>;

    /// Every non-flat position across every strategy account — the
    /// unrealized-PnL sweep's per-tick work list (§4.7).
    async fn list_all_nonzero(&self) -> EngineResult<Vec<StrategyPosition>>;
}

pub struct PgPositionRepository {
    pool: PgPool,
}

impl PgPositionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for PgPositionRepository {
    async fn get_or_flat(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
    ) -> EngineResult<StrategyPosition> {
        let row = sqlx::query!(
            r#"SELECT quantity, entry_price, current_pnl, updated_at
               FROM strategy_positions
               WHERE strategy_account_id = $1 AND symbol = $2"#,
            strategy_account_id,
            symbol,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => StrategyPosition {
                strategy_account_id,
                symbol: symbol.to_string(),
                quantity: r.quantity,
                entry_price: r.entry_price,
                current_pnl: r.current_pnl,
                updated_at: r.updated_at,
            },
            None => StrategyPosition::flat(strategy_account_id, symbol.to_string()),
        })
    }

    async fn upsert(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
        quantity: Decimal,
        entry_price: Decimal,
        realized_pnl_delta: Decimal,
    ) -> EngineResult<()> {
        sqlx::query!(
            r#"INSERT INTO strategy_positions
                 (strategy_account_id, symbol, quantity, entry_price, current_pnl, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (strategy_account_id, symbol) DO UPDATE
                 SET quantity = EXCLUDED.quantity,
                     entry_price = EXCLUDED.entry_price,
                     current_pnl = strategy_positions.current_pnl + $5,
                     updated_at = EXCLUDED.updated_at"#,
            strategy_account_id,
            symbol,
            quantity,
            entry_price,
            realized_pnl_delta,
            Utc::now(),
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_strategy_account(
        &self,
        strategy_account_id: StrategyAccountId,
    ) -> EngineResult<Vec<StrategyPosition>> {
        let rows = sqlx::query!(
            r#"SELECT symbol, quantity, entry_price, current_pnl, updated_at
               FROM strategy_positions WHERE strategy_account_id = $1"#,
            strategy_account_id,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StrategyPosition {
                strategy_account_id,
                symbol: r.symbol,
                quantity: r.quantity,
                entry_price: r.entry_price,
                current_pnl: r.current_pnl,
                updated_at: r.updated_at,
            })
            .collect())
    }

    async fn list_all_nonzero(&self) -> EngineResult<Vec<StrategyPosition>> {
        let rows = sqlx::query!(
            r#"SELECT strategy_account_id, symbol, quantity, entry_price, current_pnl, updated_at
               FROM strategy_positions WHERE quantity != 0"#
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StrategyPosition {
                strategy_account_id: r.strategy_account_id,
                symbol: r.symbol,
                quantity: r.quantity,
                entry_price: r.entry_price,
                current_pnl: r.current_pnl,
                updated_at: r.updated_at,
            })
            .collect())
    }
}
