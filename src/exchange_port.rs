//! ExchangePort: the abstract boundary between the engine and a concrete
//! exchange's REST API (§6).
//!
//! Grounded in `original_source/web_server/app/exchanges/base.py`'s
//! `BaseExchange`/`BaseCryptoExchange` abstract interface and
//! `crypto/binance.py`'s concrete method set (`load_markets`, `fetch_balance`,
//! order CRUD, `fetch_ticker`). The Python base class is duck-typed and
//! carries instance state (cached sessions, metadata); here that collapses
//! to a single `async_trait` any concrete client implements, with the
//! session/credential state living inside the implementor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::core_types::{MarketType, OrderType, Side};
use crate::market::{MarketInfo, Ticker};

/// Mirrors the Python hierarchy's `ExchangeError`/`NetworkError`/
/// `AuthenticationError`/`InsufficientFunds`/`InvalidOrder` split, collapsed
/// to the two buckets the retry/classification logic (§4.4) actually acts
/// on, plus the specific cases callers need to branch on directly.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("{exchange}: authentication failed: {message}")]
    Authentication { exchange: String, message: String },
    #[error("{exchange}: insufficient funds: {message}")]
    InsufficientFunds { exchange: String, message: String },
    #[error("{exchange}: invalid order: {message}")]
    InvalidOrder { exchange: String, message: String },
    #[error("{exchange}: network error: {message}")]
    Network { exchange: String, message: String },
    /// The exchange has no record of this order. Callers cancelling an
    /// order treat this as success rather than a failure (§5) — the order
    /// is gone either way.
    #[error("{exchange}: order not found: {message}")]
    OrderNotFound { exchange: String, message: String },
    #[error("{exchange}: {message}")]
    Other { exchange: String, message: String },
}

impl ExchangeError {
    pub fn exchange(&self) -> &str {
        match self {
            ExchangeError::Authentication { exchange, .. }
            | ExchangeError::InsufficientFunds { exchange, .. }
            | ExchangeError::InvalidOrder { exchange, .. }
            | ExchangeError::Network { exchange, .. }
            | ExchangeError::OrderNotFound { exchange, .. }
            | ExchangeError::Other { exchange, .. } => exchange,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExchangeError::Authentication { message, .. }
            | ExchangeError::InsufficientFunds { message, .. }
            | ExchangeError::InvalidOrder { message, .. }
            | ExchangeError::Network { message, .. }
            | ExchangeError::OrderNotFound { message, .. }
            | ExchangeError::Other { message, .. } => message,
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Exchange-side balance of one asset.
#[derive(Debug, Clone)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub used: Decimal,
}

/// The exchange's view of one order, as returned by `create_order`,
/// `fetch_order` or `fetch_open_orders`.
#[derive(Debug, Clone)]
pub struct ExchangeOrder {
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    /// Cumulative fee charged so far, in quote currency. Zero for an order
    /// with no fills yet.
    pub fee: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// One leg of a client-submitted order, independent of persistence.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub reduce_only: bool,
}

/// A best bid/ask snapshot for a batch of symbols, as used by the
/// rebalancer's desirability re-pricing (§4.5).
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub symbol: String,
    pub bid: Decimal,
    pub ask: Decimal,
}

/// The per-exchange client contract the rest of the engine depends on.
/// Implementors own their own HTTP client, credentials and rate limiting at
/// the transport layer; `RateLimiter` (§4.2) wraps calls to this trait from
/// the outside rather than being implemented by it.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    fn name(&self) -> &str;

    /// Loads (or reloads) the exchange's trading rules for `market_type`.
    /// Callers populate the `MarketDataCache` from the result rather than
    /// this trait owning caching itself.
    async fn load_markets(
        &self,
        market_type: MarketType,
        reload: bool,
    ) -> ExchangeResult<Vec<(String, MarketInfo)>>;

    async fn fetch_balance(&self, market_type: MarketType) -> ExchangeResult<Vec<Balance>>;

    async fn create_order(
        &self,
        market_type: MarketType,
        request: &OrderRequest,
    ) -> ExchangeResult<ExchangeOrder>;

    /// Submits up to `requests.len()` orders in one call, for exchanges
    /// whose `supports_native_batch` is true (§4.5.5). Implementations that
    /// don't support native batching should not implement this trait's
    /// default — the `executor::batch` module decides native-vs-fallback
    /// from `ExchangeConfig`, not by probing this method.
    async fn create_batch_orders(
        &self,
        market_type: MarketType,
        requests: &[OrderRequest],
    ) -> ExchangeResult<Vec<ExchangeResult<ExchangeOrder>>>;

    async fn cancel_order(
        &self,
        market_type: MarketType,
        symbol: &str,
        exchange_order_id: &str,
    ) -> ExchangeResult<()>;

    async fn fetch_order(
        &self,
        market_type: MarketType,
        symbol: &str,
        exchange_order_id: &str,
    ) -> ExchangeResult<ExchangeOrder>;

    async fn fetch_open_orders(
        &self,
        market_type: MarketType,
        symbol: Option<&str>,
    ) -> ExchangeResult<Vec<ExchangeOrder>>;

    async fn fetch_ticker(&self, market_type: MarketType, symbol: &str) -> ExchangeResult<Ticker>;

    async fn fetch_price_quotes(
        &self,
        market_type: MarketType,
        symbols: &[String],
    ) -> ExchangeResult<Vec<PriceQuote>>;
}
