//! MarketCacheRegistry: one `MarketDataCache` per exchange, plus the startup
//! warmup and background refresher that keep it populated (§4.3).
//!
//! Grounded in `original_source/.../exchanges/cache.py`'s per-exchange cache
//! instance and `schedule_background_update`'s periodic-reload loop,
//! reimplemented as a `tokio::time::interval` task rather than a thread-pool
//! submission, and in `exchanges/registry.py`'s per-exchange client lookup
//! for the set of exchanges a warmup pass needs to cover.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::core_types::MarketType;
use crate::error::{EngineError, EngineResult};
use crate::exchange_port::ExchangePort;
use crate::money::{check_min_notional, quantize_price, quantize_qty};

use super::MarketDataCache;

const PER_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);
const TOTAL_WARMUP_TIMEOUT: Duration = Duration::from_secs(120);

/// One `MarketDataCache` per exchange name, shared across every account on
/// that exchange — trading rules are exchange-wide, not account-specific.
#[derive(Default)]
pub struct MarketCacheRegistry {
    caches: DashMap<String, Arc<MarketDataCache>>,
}

impl MarketCacheRegistry {
    pub fn new() -> Self {
        MarketCacheRegistry {
            caches: DashMap::new(),
        }
    }

    pub fn get_or_create(&self, exchange_name: &str) -> Arc<MarketDataCache> {
        self.caches
            .entry(exchange_name.to_string())
            .or_insert_with(|| Arc::new(MarketDataCache::new(exchange_name)))
            .clone()
    }

    pub fn get(&self, exchange_name: &str) -> Option<Arc<MarketDataCache>> {
        self.caches.get(exchange_name).map(|c| c.clone())
    }

    pub fn clear_all(&self) {
        for entry in self.caches.iter() {
            entry.value().clear_all();
        }
    }
}

/// One exchange's warmup target: a representative client (any active
/// account on that exchange) plus the market type to load, and whether its
/// metadata is API-sourced (and therefore worth periodic reloading).
pub struct WarmupTarget {
    pub exchange_name: String,
    pub market_type: MarketType,
    pub client: Arc<dyn ExchangePort>,
    pub api_sourced: bool,
}

/// Loads markets for every target in parallel, bounding each load to
/// `PER_EXCHANGE_TIMEOUT` and the whole pass to `TOTAL_WARMUP_TIMEOUT`.
/// Failures and timeouts are logged and skipped — warmup never blocks
/// startup or fails the process; a cold cache degrades to
/// `CacheMissOnOrderPath` errors on the order path until it fills in.
pub async fn warmup(registry: &MarketCacheRegistry, targets: &[WarmupTarget]) {
    let loads = targets.iter().map(|target| async move {
        let cache = registry.get_or_create(&target.exchange_name);
        match tokio::time::timeout(
            PER_EXCHANGE_TIMEOUT,
            target.client.load_markets(target.market_type, true),
        )
        .await
        {
            Ok(Ok(markets)) => {
                let n = cache.update_markets_batch(markets);
                tracing::info!(exchange = %target.exchange_name, market_type = %target.market_type, count = n, "warmed market cache");
            }
            Ok(Err(err)) => {
                tracing::warn!(exchange = %target.exchange_name, market_type = %target.market_type, error = %err, "market warmup failed, continuing in degraded mode");
            }
            Err(_) => {
                tracing::warn!(exchange = %target.exchange_name, market_type = %target.market_type, "market warmup timed out after 60s, continuing in degraded mode");
            }
        }
    });

    if tokio::time::timeout(TOTAL_WARMUP_TIMEOUT, futures::future::join_all(loads))
        .await
        .is_err()
    {
        tracing::warn!("market warmup exceeded the 120s total budget, continuing in degraded mode");
    }
}

/// Background reload loop: reloads every API-sourced exchange on the
/// configured interval. Rule-based exchanges (static tick rules) are never
/// in `targets` with `api_sourced = true`, so they're simply never reloaded.
pub async fn run_refresher(
    registry: Arc<MarketCacheRegistry>,
    targets: Vec<WarmupTarget>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let api_sourced: Vec<WarmupTarget> = targets.into_iter().filter(|t| t.api_sourced).collect();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                warmup(&registry, &api_sourced).await;
            }
            _ = cancel.cancelled() => {
                tracing::info!("market cache refresher shutting down");
                break;
            }
        }
    }
}

/// Quantizes `(quantity, price, stop_price)` against the cached `MarketInfo`
/// for `symbol`. The order path must call this rather than round ad hoc; a
/// cache miss here is a bug signal — `CacheMissOnOrderPath` — never a
/// trigger to call the exchange inline (§4.3).
pub fn quantize_for_order(
    cache: &MarketDataCache,
    symbol: &str,
    quantity: Decimal,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> EngineResult<(Decimal, Option<Decimal>, Option<Decimal>)> {
    let market = cache.get_market(symbol).ok_or_else(|| EngineError::CacheMissOnOrderPath {
        exchange: cache.exchange_name().to_string(),
        symbol: symbol.to_string(),
    })?;

    let qty = quantize_qty(quantity, &market).map_err(|e| EngineError::Validation(e.to_string()))?;
    let quantized_price = price
        .map(|p| quantize_price(p, &market).map_err(|e| EngineError::Validation(e.to_string())))
        .transpose()?;
    let quantized_stop = stop_price
        .map(|p| quantize_price(p, &market).map_err(|e| EngineError::Validation(e.to_string())))
        .transpose()?;

    if let Some(p) = quantized_price {
        check_min_notional(qty, p, &market).map_err(|e| EngineError::Validation(e.to_string()))?;
    }

    Ok((qty, quantized_price, quantized_stop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::exchange_port::{
        Balance, ExchangeError, ExchangeOrder, ExchangeResult, OrderRequest, PriceQuote,
    };
    use crate::market::{MarketInfo, Ticker};

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

    struct SlowExchange {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ExchangePort for SlowExchange {
        fn name(&self) -> &str {
            "slow"
        }

        async fn load_markets(
            &self,
            _market_type: MarketType,
            _reload: bool,
        ) -> ExchangeResult<Vec<(String, MarketInfo)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![("BTC/USDT".to_string(), sample_market())])
        }

        async fn fetch_balance(&self, _market_type: MarketType) -> ExchangeResult<Vec<Balance>> {
            Ok(Vec::new())
        }

        async fn create_order(
            &self,
            _market_type: MarketType,
            _request: &OrderRequest,
        ) -> ExchangeResult<ExchangeOrder> {
            Err(ExchangeError::Other {
                exchange: "slow".into(),
                message: "unsupported in test".into(),
            })
        }

        async fn create_batch_orders(
            &self,
            _market_type: MarketType,
            _requests: &[OrderRequest],
        ) -> ExchangeResult<Vec<ExchangeResult<ExchangeOrder>>> {
            Ok(Vec::new())
        }

        async fn cancel_order(
            &self,
            _market_type: MarketType,
            _symbol: &str,
            _exchange_order_id: &str,
        ) -> ExchangeResult<()> {
            Ok(())
        }

        async fn fetch_order(
            &self,
            _market_type: MarketType,
            _symbol: &str,
            _exchange_order_id: &str,
        ) -> ExchangeResult<ExchangeOrder> {
            Err(ExchangeError::OrderNotFound {
                exchange: "slow".into(),
                message: "gone".into(),
            })
        }

        async fn fetch_open_orders(
            &self,
            _market_type: MarketType,
            _symbol: Option<&str>,
        ) -> ExchangeResult<Vec<ExchangeOrder>> {
            Ok(Vec::new())
        }

        async fn fetch_ticker(&self, _market_type: MarketType, symbol: &str) -> ExchangeResult<Ticker> {
            Ok(Ticker {
                symbol: symbol.to_string(),
                bid: Decimal::ONE,
                ask: Decimal::ONE,
                last: Decimal::ONE,
            })
        }

        async fn fetch_price_quotes(
            &self,
            _market_type: MarketType,
            _symbols: &[String],
        ) -> ExchangeResult<Vec<PriceQuote>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn warmup_populates_cache_on_success() {
        let registry = MarketCacheRegistry::new();
        let target = WarmupTarget {
            exchange_name: "binance".into(),
            market_type: MarketType::Spot,
            client: Arc::new(SlowExchange {
                delay: Duration::from_millis(1),
                calls: AtomicU32::new(0),
            }),
            api_sourced: true,
        };
        warmup(&registry, &[target]).await;
        let cache = registry.get("binance").unwrap();
        assert_eq!(cache.market_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warmup_times_out_per_exchange_without_panicking() {
        let registry = MarketCacheRegistry::new();
        let target = WarmupTarget {
            exchange_name: "stuck".into(),
            market_type: MarketType::Spot,
            client: Arc::new(SlowExchange {
                delay: Duration::from_secs(3600),
                calls: AtomicU32::new(0),
            }),
            api_sourced: true,
        };
        let handle = tokio::spawn(async move {
            warmup(&registry, &[target]).await;
            registry
        });
        tokio::time::advance(PER_EXCHANGE_TIMEOUT + Duration::from_secs(1)).await;
        let registry = handle.await.unwrap();
        assert!(registry.get("stuck").unwrap().market_count() == 0);
    }

    #[test]
    fn quantize_for_order_raises_cache_miss_on_unknown_symbol() {
        let cache = MarketDataCache::new("binance");
        let err = quantize_for_order(&cache, "ETH/USDT", d("1"), None, None).unwrap_err();
        assert!(matches!(err, EngineError::CacheMissOnOrderPath { .. }));
    }

    #[test]
    fn quantize_for_order_quantizes_and_checks_notional() {
        let cache = MarketDataCache::new("binance");
        cache.set_market("BTC/USDT", sample_market());
        let (qty, price, stop) =
            quantize_for_order(&cache, "BTC/USDT", d("0.0015"), Some(d("50000.37")), None).unwrap();
        assert_eq!(qty, d("0.001"));
        assert_eq!(price, Some(d("50000.0")));
        assert_eq!(stop, None);
    }
}
