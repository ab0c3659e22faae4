//! Repository layer for Account/Strategy/StrategyAccount lookups.
//!
//! Follows the teacher's static-struct repository pattern (`UserRepository`,
//! `AssetManager`) rather than instance methods on `Database` — a repository
//! is a namespace for queries against a shared pool, not an owned resource.

use sqlx::PgPool;

use crate::core_types::{AccountId, MarketType, StrategyAccountId, StrategyId};

use super::models::{Account, Strategy, StrategyAccount};

pub struct AccountRepository;

impl AccountRepository {
    pub async fn get_by_id(
        pool: &PgPool,
        account_id: AccountId,
    ) -> Result<Option<Account>, sqlx::Error> {
        let row = sqlx::query_as!(
            AccountRow,
            r#"SELECT id, exchange, credentials, is_testnet, is_active
               FROM accounts WHERE id = $1"#,
            account_id
        )
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Every `(Account, MarketType)` pair actually bound to an active
    /// strategy — the startup bootstrap's warmup target list (§5). One
    /// account can serve both a spot and a futures strategy, so this is
    /// deduplicated on the pair, not just the account.
    pub async fn list_active_bootstrap_targets(
        pool: &PgPool,
    ) -> Result<Vec<(Account, MarketType)>, sqlx::Error> {
        let rows = sqlx::query_as!(
            AccountMarketRow,
            r#"SELECT DISTINCT ON (a.id, s.market_type)
                   a.id, a.exchange, a.credentials, a.is_testnet, a.is_active, s.market_type
               FROM accounts a
               JOIN strategy_accounts sa ON sa.account_id = a.id
               JOIN strategies s ON s.id = sa.strategy_id
               WHERE a.is_active = true AND sa.is_active = true"#
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(TryInto::try_into)
            .collect::<Result<Vec<_>, String>>()
            .map_err(|e| sqlx::Error::Decode(e.into()))
    }
}

struct AccountRow {
    id: i64,
    exchange: String,
    credentials: String,
    is_testnet: bool,
    is_active: bool,
}

impl From<AccountRow> for Account {
    fn from(r: AccountRow) -> Self {
        Account {
            id: r.id,
            exchange: r.exchange,
            credentials: r.credentials,
            is_testnet: r.is_testnet,
            is_active: r.is_active,
        }
    }
}

struct AccountMarketRow {
    id: i64,
    exchange: String,
    credentials: String,
    is_testnet: bool,
    is_active: bool,
    market_type: String,
}

impl TryFrom<AccountMarketRow> for (Account, MarketType) {
    type Error = String;

    fn try_from(r: AccountMarketRow) -> Result<Self, Self::Error> {
        let market_type = match r.market_type.as_str() {
            "SPOT" => MarketType::Spot,
            "FUTURES" => MarketType::Futures,
            other => return Err(format!("unknown market_type: {other}")),
        };
        Ok((
            Account {
                id: r.id,
                exchange: r.exchange,
                credentials: r.credentials,
                is_testnet: r.is_testnet,
                is_active: r.is_active,
            },
            market_type,
        ))
    }
}

pub struct StrategyRepository;

impl StrategyRepository {
    /// Resolves the webhook's `group_name` to its Strategy row. This is the
    /// entry point for the Dispatcher's authorization step.
    pub async fn get_by_group_name(
        pool: &PgPool,
        group_name: &str,
    ) -> Result<Option<Strategy>, sqlx::Error> {
        let row = sqlx::query_as!(
            StrategyRow,
            r#"SELECT id, owner_user_id, group_name, market_type, is_public, webhook_token
               FROM strategies WHERE group_name = $1"#,
            group_name
        )
        .fetch_optional(pool)
        .await?;

        row.map(TryInto::try_into).transpose().map_err(|e: String| {
            sqlx::Error::Decode(e.into())
        })
    }

    pub async fn get_by_id(pool: &PgPool, id: StrategyId) -> Result<Option<Strategy>, sqlx::Error> {
        let row = sqlx::query_as!(
            StrategyRow,
            r#"SELECT id, owner_user_id, group_name, market_type, is_public, webhook_token
               FROM strategies WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await?;

        row.map(TryInto::try_into).transpose().map_err(|e: String| {
            sqlx::Error::Decode(e.into())
        })
    }
}

struct StrategyRow {
    id: i64,
    owner_user_id: i64,
    group_name: String,
    market_type: String,
    is_public: bool,
    webhook_token: String,
}

impl TryFrom<StrategyRow> for Strategy {
    type Error = String;

    fn try_from(r: StrategyRow) -> Result<Self, Self::Error> {
        let market_type = match r.market_type.as_str() {
            "SPOT" => MarketType::Spot,
            "FUTURES" => MarketType::Futures,
            other => return Err(format!("unknown market_type: {other}")),
        };
        Ok(Strategy {
            id: r.id,
            owner_user_id: r.owner_user_id,
            group_name: r.group_name,
            market_type,
            is_public: r.is_public,
            webhook_token: r.webhook_token,
        })
    }
}

pub struct StrategyAccountRepository;

impl StrategyAccountRepository {
    /// All active (strategy, account) bindings for a strategy — the
    /// Dispatcher's fan-out list for one webhook.
    pub async fn list_active_for_strategy(
        pool: &PgPool,
        strategy_id: StrategyId,
    ) -> Result<Vec<StrategyAccount>, sqlx::Error> {
        sqlx::query_as!(
            StrategyAccount,
            r#"SELECT id, strategy_id, account_id, weight, leverage, max_symbols, is_active
               FROM strategy_accounts
               WHERE strategy_id = $1 AND is_active = true"#,
            strategy_id
        )
        .fetch_all(pool)
        .await
    }

    /// Resolves one binding by its own id — the join point the
    /// QueueManager scheduler and Reconciler use to go from a bare
    /// `strategy_account_id` (all that OpenOrder/PendingOrder rows carry)
    /// back to its owning Strategy/Account.
    pub async fn get_by_id(
        pool: &PgPool,
        id: StrategyAccountId,
    ) -> Result<Option<StrategyAccount>, sqlx::Error> {
        sqlx::query_as!(
            StrategyAccount,
            r#"SELECT id, strategy_id, account_id, weight, leverage, max_symbols, is_active
               FROM strategy_accounts WHERE id = $1"#,
            id
        )
        .fetch_optional(pool)
        .await
    }
}
