//! Execution context resolution: the join from a bare `strategy_account_id`
//! (all that OpenOrder/PendingOrder carry) to everything the order path,
//! the rebalance scheduler, and the reconciler need to act on it.
//!
//! Grounded in the teacher's "no module-level hidden state" convention
//! (§9): callers hold an `ExecutionContext` rather than reaching for
//! globals, and every lookup goes through a repository by id.

use std::sync::Arc;

use sqlx::PgPool;

use crate::account::{Account, AccountRepository, Strategy, StrategyAccount, StrategyAccountRepository, StrategyRepository};
use crate::config::AppConfig;
use crate::core_types::{MarketType, StrategyAccountId};
use crate::error::{EngineError, EngineResult};
use crate::exchange::ExchangeRegistry;
use crate::exchange_port::ExchangePort;

/// Everything resolved for one `(strategy, account)` pair: the entities
/// themselves plus the live `ExchangePort` and the submission-strategy
/// flags derived from config.
pub struct ResolvedAccount {
    pub strategy_account: StrategyAccount,
    pub strategy: Strategy,
    pub account: Account,
    pub exchange: Arc<dyn ExchangePort>,
    pub market_type: MarketType,
    pub native_batch: bool,
}

pub struct ExecutionContext {
    pool: PgPool,
    config: Arc<AppConfig>,
    registry: Arc<ExchangeRegistry>,
}

impl ExecutionContext {
    pub fn new(pool: PgPool, config: Arc<AppConfig>, registry: Arc<ExchangeRegistry>) -> Self {
        ExecutionContext {
            pool,
            config,
            registry,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn resolve(&self, strategy_account_id: StrategyAccountId) -> EngineResult<ResolvedAccount> {
        let strategy_account = StrategyAccountRepository::get_by_id(&self.pool, strategy_account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("strategy_account {strategy_account_id}")))?;

        let strategy = StrategyRepository::get_by_id(&self.pool, strategy_account.strategy_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("strategy {}", strategy_account.strategy_id)))?;

        let account = AccountRepository::get_by_id(&self.pool, strategy_account.account_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("account {}", strategy_account.account_id)))?;

        let exchange_config = self
            .config
            .exchanges
            .get(&account.exchange.to_lowercase())
            .ok_or_else(|| EngineError::Internal(format!("no exchange config for '{}'", account.exchange)))?;

        let exchange = self.registry.get(&account).await?;

        Ok(ResolvedAccount {
            market_type: strategy.market_type,
            native_batch: exchange_config.supports_native_batch,
            strategy_account,
            strategy,
            account,
            exchange,
        })
    }
}
