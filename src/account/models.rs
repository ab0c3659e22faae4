//! Data models for Account, Strategy, and StrategyAccount (§3).

use chrono::{DateTime, Utc};

use crate::core_types::{AccountId, MarketType, StrategyAccountId, StrategyId};

/// One external exchange identity. Credentials are immutable once set; any
/// mutation must go through `invalidate` paths that also evict the
/// exchange-client cache keyed on `account_id` (§5).
#[derive(Debug, Clone)]
pub struct Account {
    pub id: AccountId,
    pub exchange: String,
    /// Opaque, already-encrypted-at-rest credential blob. The engine never
    /// parses this; it is handed whole to the ExchangePort implementation.
    pub credentials: String,
    pub is_testnet: bool,
    pub is_active: bool,
}

/// A tradeable signal source. `group_name` is the webhook routing key.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub id: StrategyId,
    pub owner_user_id: i64,
    pub group_name: String,
    pub market_type: MarketType,
    pub is_public: bool,
    /// Webhook bearer token; compared to the `token` field of the incoming
    /// signal during dispatch.
    pub webhook_token: String,
}

/// Binds a Strategy to one Account with an allocation policy.
#[derive(Debug, Clone)]
pub struct StrategyAccount {
    pub id: StrategyAccountId,
    pub strategy_id: StrategyId,
    pub account_id: AccountId,
    /// Fraction of the strategy's allocated capital this account receives;
    /// used to resolve `qty_per` into an absolute quantity.
    pub weight: rust_decimal::Decimal,
    pub leverage: i32,
    pub max_symbols: i32,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_account_weight_is_a_fraction() {
        let sa = StrategyAccount {
            id: 1,
            strategy_id: 1,
            account_id: 1,
            weight: rust_decimal::Decimal::new(50, 2), // 0.50
            leverage: 10,
            max_symbols: 5,
            is_active: true,
        };
        assert!(sa.weight <= rust_decimal::Decimal::ONE);
    }
}
