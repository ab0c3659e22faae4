//! Pure rebalance planning: given the live OpenOrders and parked
//! PendingOrders for one symbol, decide the target live set and the diff
//! against current reality (§4.5.1–4.5.3).
//!
//! Kept free of I/O so the core algorithm is exercised directly in tests
//! without a database or exchange.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{Bucket, OrderDbId, OrderType, Side};
use crate::orders::{OpenOrder, PendingOrder};

/// `sort_price` per the bucket-specific desirability rule (§4.5.1). `None`
/// for anything outside the four queueable buckets (MARKET/CANCEL_ALL_ORDER).
pub fn sort_price(
    order_type: OrderType,
    side: Side,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> Option<Decimal> {
    match Bucket::classify(order_type, side)? {
        Bucket::LimitBuy => price,
        Bucket::LimitSell => price.map(|p| -p),
        Bucket::StopBuy => stop_price.map(|p| -p),
        Bucket::StopSell => stop_price,
    }
}

/// One order under consideration for a bucket slot, regardless of whether
/// it currently lives in the OpenOrder or PendingOrder store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Open,
    Pending,
}

#[derive(Debug, Clone)]
struct Candidate {
    origin: Origin,
    id: OrderDbId,
    order_type: OrderType,
    side: Side,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    webhook_received_at: DateTime<Utc>,
}

impl Candidate {
    fn bucket(&self) -> Option<Bucket> {
        Bucket::classify(self.order_type, self.side)
    }

    fn sort_key(&self) -> (i32, Decimal, DateTime<Utc>, OrderDbId) {
        let sp = sort_price(self.order_type, self.side, self.price, self.stop_price);
        let neg_sort_price = sp.map(|p| -p).unwrap_or(Decimal::MAX);
        (self.order_type.priority(), neg_sort_price, self.webhook_received_at, self.id)
    }
}

impl From<&OpenOrder> for Candidate {
    fn from(o: &OpenOrder) -> Self {
        Candidate {
            origin: Origin::Open,
            id: o.id,
            order_type: o.order_type,
            side: o.side,
            price: o.price,
            stop_price: o.stop_price,
            webhook_received_at: o.webhook_received_at,
        }
    }
}

impl From<&PendingOrder> for Candidate {
    fn from(p: &PendingOrder) -> Self {
        Candidate {
            origin: Origin::Pending,
            id: p.id,
            order_type: p.order_type,
            side: p.side,
            price: p.price,
            stop_price: p.stop_price,
            webhook_received_at: p.webhook_received_at,
        }
    }
}

/// The diff a `rebalance_symbol` pass must apply to reach the target state.
#[derive(Debug, Default)]
pub struct RebalancePlan {
    /// Live OpenOrders to cancel on the exchange and park as PendingOrder.
    pub to_cancel: Vec<OrderDbId>,
    /// Parked PendingOrders to submit to the exchange and delete on success.
    pub to_promote: Vec<OrderDbId>,
}

/// Computes the rebalance diff for one symbol's four buckets, each capped
/// at `cap` live orders (§4.5.3, steps 1-5).
pub fn plan_rebalance(open: &[OpenOrder], pending: &[PendingOrder], cap: usize) -> RebalancePlan {
    let mut plan = RebalancePlan::default();

    for bucket in Bucket::ALL {
        let mut candidates: Vec<Candidate> = open
            .iter()
            .map(Candidate::from)
            .chain(pending.iter().map(Candidate::from))
            .filter(|c| c.bucket() == Some(bucket))
            .collect();

        candidates.sort_by_key(|c| c.sort_key());

        let (target, rest) = candidates.split_at(candidates.len().min(cap));

        for c in rest {
            if c.origin == Origin::Open {
                plan.to_cancel.push(c.id);
            }
        }
        for c in target {
            if c.origin == Origin::Pending {
                plan.to_promote.push(c.id);
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::MarketType;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn open(id: OrderDbId, order_type: OrderType, side: Side, price: &str) -> OpenOrder {
        OpenOrder {
            id,
            exchange_order_id: format!("ex-{id}"),
            strategy_account_id: 1,
            symbol: "BTC/USDT".into(),
            side,
            order_type,
            price: Some(d(price)),
            stop_price: None,
            quantity: Decimal::ONE,
            filled_quantity: Decimal::ZERO,
            status: crate::core_types::OrderStatus::Open,
            market_type: MarketType::Futures,
            webhook_received_at: Utc::now(),
            filled_at: None,
        }
    }

    fn pending(id: OrderDbId, order_type: OrderType, side: Side, price: &str) -> PendingOrder {
        PendingOrder {
            id,
            strategy_account_id: 1,
            symbol: "BTC/USDT".into(),
            side,
            order_type,
            price: Some(d(price)),
            stop_price: None,
            quantity: Decimal::ONE,
            market_type: MarketType::Futures,
            webhook_received_at: Utc::now(),
            priority: order_type.priority(),
            sort_price: sort_price(order_type, side, Some(d(price)), None),
            retry_count: 0,
            reason: None,
        }
    }

    #[test]
    fn limit_buy_sort_price_is_price_itself() {
        assert_eq!(
            sort_price(OrderType::Limit, Side::Buy, Some(d("50000")), None),
            Some(d("50000"))
        );
    }

    #[test]
    fn limit_sell_sort_price_is_negated() {
        assert_eq!(
            sort_price(OrderType::Limit, Side::Sell, Some(d("50000")), None),
            Some(d("-50000"))
        );
    }

    #[test]
    fn market_has_no_sort_price() {
        assert_eq!(sort_price(OrderType::Market, Side::Buy, Some(d("1")), None), None);
    }

    #[test]
    fn promotes_better_priced_pending_order_over_worse_live_one() {
        // cap=1: one live LIMIT BUY at 49000, one pending LIMIT BUY at
        // 50000 (willing to pay more => more desirable). The live order
        // should be cancelled and the pending one promoted.
        let open_orders = vec![open(1, OrderType::Limit, Side::Buy, "49000")];
        let pending_orders = vec![pending(2, OrderType::Limit, Side::Buy, "50000")];

        let plan = plan_rebalance(&open_orders, &pending_orders, 1);
        assert_eq!(plan.to_cancel, vec![1]);
        assert_eq!(plan.to_promote, vec![2]);
    }

    #[test]
    fn no_change_needed_is_a_no_op() {
        let open_orders = vec![
            open(1, OrderType::Limit, Side::Buy, "50000"),
            open(2, OrderType::Limit, Side::Buy, "49000"),
        ];
        let plan = plan_rebalance(&open_orders, &[], 2);
        assert!(plan.to_cancel.is_empty());
        assert!(plan.to_promote.is_empty());
    }

    #[test]
    fn buckets_are_independent() {
        // a LIMIT SELL pending order must never affect the LIMIT BUY bucket's cap.
        let open_orders = vec![open(1, OrderType::Limit, Side::Buy, "50000")];
        let pending_orders = vec![pending(2, OrderType::Limit, Side::Sell, "51000")];
        let plan = plan_rebalance(&open_orders, &pending_orders, 1);
        assert_eq!(plan.to_cancel, Vec::<OrderDbId>::new());
        assert_eq!(plan.to_promote, vec![2]);
    }

    #[test]
    fn rebalance_is_idempotent() {
        let open_orders = vec![
            open(1, OrderType::Limit, Side::Buy, "50000"),
            open(2, OrderType::Limit, Side::Buy, "49000"),
        ];
        let pending_orders = vec![pending(3, OrderType::Limit, Side::Buy, "48000")];
        let plan = plan_rebalance(&open_orders, &pending_orders, 2);
        assert!(plan.to_cancel.is_empty());
        assert!(plan.to_promote.is_empty());
    }
}
