//! Market metadata: trading rules and price snapshots, and the cache that
//! fronts them (§4.3).

pub mod cache;
pub mod warmup;

pub use cache::MarketDataCache;
pub use warmup::{quantize_for_order, run_refresher, warmup as warmup_caches, MarketCacheRegistry, WarmupTarget};

use rust_decimal::Decimal;

/// Exchange-reported trading rules for one `(exchange, market_type, symbol)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketInfo {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
    pub price_precision: u32,
    pub qty_precision: u32,
}

/// A best bid/ask/last snapshot, refreshed on the short ticker TTL.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
}
