//! Core type definitions shared across the engine.
//!
//! Dynamic, duck-typed records on the signal-generation side map onto
//! explicit records and tagged sum types here: every field that was a
//! string constant upstream gets a real enum, so a bad value is a parse
//! error at the boundary instead of a silent no-op three components in.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account ID - primary key into the Account table.
pub type AccountId = i64;
/// Strategy ID - primary key into the Strategy table.
pub type StrategyId = i64;
/// StrategyAccount ID - primary key into the join table.
pub type StrategyAccountId = i64;
/// Local, auto-incrementing ID for OpenOrder/PendingOrder rows.
pub type OrderDbId = i64;

/// Which side of the book an order acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// `1` for BUY, `-1` for SELL — the sign convention used by StrategyPosition.
    pub fn sign(self) -> i8 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Order type as normalized by the Dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    StopMarket,
    StopLimit,
    /// Pass-through control signal: never queued, never stored as an
    /// OpenOrder/PendingOrder. Handled entirely by the Dispatcher.
    CancelAllOrder,
}

impl OrderType {
    /// Whether this type ever enters a QueueManager bucket.
    pub fn is_queueable(self) -> bool {
        !matches!(self, OrderType::Market | OrderType::CancelAllOrder)
    }

    /// LIMIT sorts before STOP by convention; both stop variants share a tier.
    pub fn priority(self) -> i32 {
        match self {
            OrderType::Limit => 0,
            OrderType::StopMarket | OrderType::StopLimit => 1,
            OrderType::Market | OrderType::CancelAllOrder => i32::MAX,
        }
    }

    pub fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    pub fn requires_stop_price(self) -> bool {
        matches!(self, OrderType::StopMarket | OrderType::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopMarket => "STOP_MARKET",
            OrderType::StopLimit => "STOP_LIMIT",
            OrderType::CancelAllOrder => "CANCEL_ALL_ORDER",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "STOP_MARKET" => Ok(OrderType::StopMarket),
            "STOP_LIMIT" => Ok(OrderType::StopLimit),
            "CANCEL_ALL_ORDER" => Ok(OrderType::CancelAllOrder),
            other => Err(format!("unknown order type: {other}")),
        }
    }
}

/// Lifecycle status of an OpenOrder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(OrderStatus::Open),
            "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" => Ok(OrderStatus::Canceled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// SPOT vs FUTURES. Affects batch-submission strategy and leverage fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketType {
    Spot,
    Futures,
}

impl MarketType {
    /// The other market type, used by the defensive re-fetch a failed
    /// cancel performs before concluding an order is truly gone.
    pub fn opposite(self) -> MarketType {
        match self {
            MarketType::Spot => MarketType::Futures,
            MarketType::Futures => MarketType::Spot,
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::Spot => write!(f, "SPOT"),
            MarketType::Futures => write!(f, "FUTURES"),
        }
    }
}

impl std::str::FromStr for MarketType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SPOT" => Ok(MarketType::Spot),
            "FUTURES" => Ok(MarketType::Futures),
            other => Err(format!("unknown market type: {other}")),
        }
    }
}

/// One of the four `(type_group, side)` partitions a symbol's queue splits into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    LimitBuy,
    LimitSell,
    StopBuy,
    StopSell,
}

impl Bucket {
    pub const ALL: [Bucket; 4] = [
        Bucket::LimitBuy,
        Bucket::LimitSell,
        Bucket::StopBuy,
        Bucket::StopSell,
    ];

    /// Which bucket an order falls into, or `None` for MARKET/CANCEL_ALL_ORDER.
    pub fn classify(order_type: OrderType, side: Side) -> Option<Bucket> {
        use OrderType::*;
        use Side::*;
        match (order_type, side) {
            (Limit, Buy) => Some(Bucket::LimitBuy),
            (Limit, Sell) => Some(Bucket::LimitSell),
            (StopMarket | StopLimit, Buy) => Some(Bucket::StopBuy),
            (StopMarket | StopLimit, Sell) => Some(Bucket::StopSell),
            (Market, _) | (CancelAllOrder, _) => None,
        }
    }
}
