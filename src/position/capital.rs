//! StrategyCapital: per-strategy-account unrealized PnL, written by the
//! periodic mark-to-market sweep (§4.7, supplemented).
//!
//! Distinct from `StrategyPosition::current_pnl`, which accumulates
//! *realized* PnL as fills land. This is the unrealized half: a mark of
//! every open position against the latest price, recomputed from scratch
//! each sweep tick rather than accumulated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::core_types::StrategyAccountId;
use crate::error::EngineResult;

#[derive(Debug, Clone)]
pub struct StrategyCapital {
    pub strategy_account_id: StrategyAccountId,
    pub unrealized_pnl: Decimal,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait StrategyCapitalRepository: Send + Sync {
    /// Overwrites the unrealized PnL mark for one strategy account.
    async fn upsert_unrealized_pnl(
        &self,
        strategy_account_id: StrategyAccountId,
        unrealized_pnl: Decimal,
    ) -> EngineResult<()>;

    async fn get(&self, strategy_account_id: StrategyAccountId) -> EngineResult<Option<StrategyCapital>>;
}

pub struct PgStrategyCapitalRepository {
    pool: PgPool,
}

impl PgStrategyCapitalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StrategyCapitalRepository for PgStrategyCapitalRepository {
    async fn upsert_unrealized_pnl(
        &self,
        strategy_account_id: StrategyAccountId,
        unrealized_pnl: Decimal,
    ) -> EngineResult<()> {
        sqlx::query!(
            r#"INSERT INTO strategy_capital (strategy_account_id, unrealized_pnl, updated_at)
               VALUES ($1, $2, $3)
               ON CONFLICT (strategy_account_id) DO UPDATE
                 SET unrealized_pnl = EXCLUDED.unrealized_pnl,
                     updated_at = EXCLUDED.updated_at"#,
            strategy_account_id,
            unrealized_pnl,
            Utc::now(),
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, strategy_account_id: StrategyAccountId) -> EngineResult<Option<StrategyCapital>> {
        let row = sqlx::query!(
            r#"SELECT unrealized_pnl, updated_at FROM strategy_capital WHERE strategy_account_id = $1"#,
            strategy_account_id,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StrategyCapital {
            strategy_account_id,
            unrealized_pnl: r.unrealized_pnl,
            updated_at: r.updated_at,
        }))
    }
}
