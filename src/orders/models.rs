//! OpenOrder, PendingOrder, Trade and CancelQueue row types (§3).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{
    MarketType, OrderDbId, OrderStatus, OrderType, Side, StrategyAccountId,
};

/// A live exchange order.
#[derive(Debug, Clone)]
pub struct OpenOrder {
    pub id: OrderDbId,
    pub exchange_order_id: String,
    pub strategy_account_id: StrategyAccountId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub status: OrderStatus,
    pub market_type: MarketType,
    pub webhook_received_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl OpenOrder {
    pub fn is_fully_filled(&self) -> bool {
        self.filled_quantity >= self.quantity
    }
}

/// An order parked by the QueueManager, awaiting promotion.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub id: OrderDbId,
    pub strategy_account_id: StrategyAccountId,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub market_type: MarketType,
    /// Preserved across Open<->Pending transitions; the primary tie-breaker
    /// in the rebalance comparator (§4.5.1).
    pub webhook_received_at: DateTime<Utc>,
    /// Lower sorts first under the LIMIT/STOP priority tier (§4.5.1).
    pub priority: i32,
    /// Transformed price making "most desirable" sort first; `None` is
    /// unreachable in practice since MARKET never enters a PendingOrder.
    pub sort_price: Option<Decimal>,
    pub retry_count: u32,
    pub reason: Option<String>,
}

impl PendingOrder {
    /// Total order used by the rebalance comparator: ascending by priority,
    /// then descending desirability (i.e. ascending by `-sort_price`), then
    /// `webhook_received_at`, then db id as the final tie-breaker.
    pub fn sort_key(&self) -> (i32, Decimal, DateTime<Utc>, OrderDbId) {
        let neg_sort_price = self.sort_price.map(|p| -p).unwrap_or(Decimal::MAX);
        (self.priority, neg_sort_price, self.webhook_received_at, self.id)
    }
}

/// At-most-one-per-fill record, database-uniqueness enforced on
/// `(strategy_account_id, exchange_order_id)`.
#[derive(Debug, Clone)]
pub struct Trade {
    pub id: i64,
    pub strategy_account_id: StrategyAccountId,
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub pnl: Decimal,
    pub fee: Decimal,
    pub is_entry: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelQueueStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

/// Orphan-cancel mop-up row: a cancel requested before the order was
/// visible on the exchange (§4.9).
#[derive(Debug, Clone)]
pub struct CancelQueueEntry {
    pub id: i64,
    pub order_id: OrderDbId,
    pub status: CancelQueueStatus,
    pub retry_count: u32,
    pub next_retry_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pending(priority: i32, sort_price: &str, seq: i64) -> PendingOrder {
        PendingOrder {
            id: seq,
            strategy_account_id: 1,
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some(Decimal::from_str(sort_price).unwrap()),
            stop_price: None,
            quantity: Decimal::ONE,
            market_type: MarketType::Futures,
            webhook_received_at: Utc::now(),
            priority,
            sort_price: Some(Decimal::from_str(sort_price).unwrap()),
            retry_count: 0,
            reason: None,
        }
    }

    #[test]
    fn sort_key_orders_by_priority_then_desirability() {
        let mut orders = vec![pending(0, "50000", 1), pending(0, "50500", 2)];
        orders.sort_by_key(|o| o.sort_key());
        // higher sort_price (more desirable) should sort first because we
        // negate it in the comparator.
        assert_eq!(orders[0].id, 2);
        assert_eq!(orders[1].id, 1);
    }
}
