//! The three-tier, independently-TTL'd in-memory cache behind `MarketInfo`
//! and `Ticker` lookups.
//!
//! Grounded in `original_source/web_server/app/exchanges/cache.py`'s
//! `CacheItem`/`MarketDataCache`: the same market/ticker/precision tiers and
//! TTLs (24h / 60s / 24h), reimplemented over `dashmap` instead of a single
//! `threading.RLock`-guarded dict, since this engine is multi-threaded by
//! default rather than GIL-serialized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{MarketInfo, Ticker};

pub const MARKET_TTL: Duration = Duration::from_secs(86_400);
pub const TICKER_TTL: Duration = Duration::from_secs(60);
pub const PRECISION_TTL: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone)]
struct CacheItem<T> {
    data: T,
    inserted_at: Instant,
    ttl: Duration,
}

impl<T> CacheItem<T> {
    fn new(data: T, ttl: Duration) -> Self {
        CacheItem {
            data,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }

    #[allow(dead_code)]
    fn age(&self) -> Duration {
        self.inserted_at.elapsed()
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Per-exchange market/ticker cache. `get_precision` reads straight through
/// `markets` rather than a parallel precision map — the Python original
/// keeps a separate `precision` dict that its own `get_precision` never
/// actually reads from, always deriving through `get_market` instead; this
/// keeps that observed behavior without the dead second map.
pub struct MarketDataCache {
    exchange_name: String,
    markets: DashMap<String, CacheItem<MarketInfo>>,
    tickers: DashMap<String, CacheItem<Ticker>>,
    stats: CacheStats,
}

impl MarketDataCache {
    pub fn new(exchange_name: impl Into<String>) -> Self {
        MarketDataCache {
            exchange_name: exchange_name.into(),
            markets: DashMap::new(),
            tickers: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn get_market(&self, symbol: &str) -> Option<MarketInfo> {
        match self.markets.get(symbol) {
            Some(item) if !item.is_expired() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(item.data.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set_market(&self, symbol: impl Into<String>, info: MarketInfo) {
        self.markets
            .insert(symbol.into(), CacheItem::new(info, MARKET_TTL));
    }

    pub fn get_ticker(&self, symbol: &str) -> Option<Ticker> {
        match self.tickers.get(symbol) {
            Some(item) if !item.is_expired() => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(item.data.clone())
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn set_ticker(&self, symbol: impl Into<String>, ticker: Ticker) {
        self.tickers
            .insert(symbol.into(), CacheItem::new(ticker, TICKER_TTL));
    }

    pub fn get_precision(&self, symbol: &str) -> Option<(u32, u32)> {
        self.get_market(symbol)
            .map(|m| (m.price_precision, m.qty_precision))
    }

    pub fn update_markets_batch(&self, markets: Vec<(String, MarketInfo)>) -> usize {
        let n = markets.len();
        for (symbol, info) in markets {
            self.set_market(symbol, info);
        }
        n
    }

    pub fn clear_expired(&self) {
        self.markets.retain(|_, v| !v.is_expired());
        self.tickers.retain(|_, v| !v.is_expired());
    }

    pub fn clear_all(&self) {
        self.markets.clear();
        self.tickers.clear();
    }

    pub fn stats(&self) -> (u64, u64) {
        (
            self.stats.hits.load(Ordering::Relaxed),
            self.stats.misses.load(Ordering::Relaxed),
        )
    }

    pub fn market_count(&self) -> usize {
        self.markets.len()
    }

    pub fn ticker_count(&self) -> usize {
        self.tickers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use rust_decimal::Decimal;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn sample_market() -> MarketInfo {
        MarketInfo {
            tick_size: d("0.5"),
            step_size: d("0.001"),
            min_qty: d("0.001"),
            min_notional: d("10"),
            price_precision: 1,
            qty_precision: 3,
        }
    }

    #[test]
    fn miss_before_insert_hit_after() {
        let cache = MarketDataCache::new("binance");
        assert!(cache.get_market("BTC/USDT").is_none());
        cache.set_market("BTC/USDT", sample_market());
        assert_eq!(cache.get_market("BTC/USDT"), Some(sample_market()));
        let (hits, misses) = cache.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
    }

    #[test]
    fn expired_entry_is_a_miss_and_is_swept() {
        let cache = MarketDataCache::new("binance");
        cache.markets.insert(
            "OLD/USDT".into(),
            CacheItem::new(sample_market(), Duration::from_secs(0)),
        );
        // a zero-ttl entry is expired the instant any time at all elapses.
        std::thread::sleep(Duration::from_millis(1));
        assert!(cache.get_market("OLD/USDT").is_none());
        cache.clear_expired();
        assert_eq!(cache.market_count(), 0);
    }

    #[test]
    fn precision_reads_through_market() {
        let cache = MarketDataCache::new("binance");
        cache.set_market("BTC/USDT", sample_market());
        assert_eq!(cache.get_precision("BTC/USDT"), Some((1, 3)));
        assert_eq!(cache.get_precision("ETH/USDT"), None);
    }

    #[test]
    fn clear_all_empties_both_tiers() {
        let cache = MarketDataCache::new("binance");
        cache.set_market("BTC/USDT", sample_market());
        cache.set_ticker(
            "BTC/USDT",
            Ticker {
                symbol: "BTC/USDT".into(),
                bid: d("50000"),
                ask: d("50001"),
                last: d("50000.5"),
            },
        );
        cache.clear_all();
        assert_eq!(cache.market_count(), 0);
        assert_eq!(cache.ticker_count(), 0);
    }
}
