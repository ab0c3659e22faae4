//! Cancel-with-retry: exponential backoff around `ExchangePort::cancel_order`,
//! plus the defensive re-fetch that turns an `OrderNotFound` into either a
//! benign success or a `MarketTypeMismatch` bug signal (§5).
//!
//! Grounded in `original_source/.../cancel_queue_service.py::process_cancel`'s
//! retry/give-up shape, generalized from its "retry next tick" polling loop
//! into an in-process bounded backoff usable both from the rebalancer's
//! inline cancel and the CancelQueue mop-up worker.

use std::time::Duration;

use crate::core_types::MarketType;
use crate::error::{EngineError, EngineResult};
use crate::exchange_port::{ExchangeError, ExchangePort};
use crate::executor::classify::{classify, FailureKind};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Cancels `exchange_order_id`, retrying network/timeout failures up to
/// `MAX_ATTEMPTS` times with 1/2/4s backoff. `OrderNotFound` is not retried:
/// it is resolved immediately via a defensive re-fetch on the opposite
/// `market_type` (seed scenario 4) and never counted as a failed attempt.
/// Used by the rebalancer's inline cancel, where blocking the one lock
/// holder for a few seconds is acceptable.
pub async fn cancel_with_retry(
    exchange: &dyn ExchangePort,
    market_type: MarketType,
    symbol: &str,
    exchange_order_id: &str,
) -> EngineResult<()> {
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        match attempt_cancel(exchange, market_type, symbol, exchange_order_id).await {
            Ok(()) => return Ok(()),
            Err(AttemptError::Permanent(err)) => return Err(err),
            Err(AttemptError::Temporary(message)) => {
                if attempt == MAX_ATTEMPTS {
                    return Err(EngineError::RetryExhausted {
                        attempts: MAX_ATTEMPTS,
                        message,
                    });
                }
                tracing::warn!(attempt, exchange_order_id, message, "cancel attempt failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }

    unreachable!("loop always returns within MAX_ATTEMPTS iterations")
}

/// Result of one non-retrying cancel attempt, as consumed by the CancelQueue
/// mop-up worker: that worker spreads retries across poll ticks via
/// `next_retry_at` rather than sleeping in-process.
pub enum AttemptError {
    Temporary(String),
    Permanent(EngineError),
}

/// Makes exactly one cancel call, resolving `OrderNotFound` via the
/// defensive re-fetch and classifying any other failure as temporary or
/// permanent. No sleeping, no retry loop — callers own the retry policy.
pub async fn attempt_cancel(
    exchange: &dyn ExchangePort,
    market_type: MarketType,
    symbol: &str,
    exchange_order_id: &str,
) -> Result<(), AttemptError> {
    match exchange
        .cancel_order(market_type, symbol, exchange_order_id)
        .await
    {
        Ok(()) => Ok(()),
        Err(ExchangeError::OrderNotFound { .. }) => {
            verify_not_misplaced(exchange, market_type, symbol, exchange_order_id)
                .await
                .map_err(AttemptError::Permanent)
        }
        Err(err) => {
            let kind = classify(err.message());
            if kind == FailureKind::Permanent {
                Err(AttemptError::Permanent(EngineError::ExchangePermanent {
                    exchange: err.exchange().to_string(),
                    message: err.message().to_string(),
                }))
            } else {
                Err(AttemptError::Temporary(err.message().to_string()))
            }
        }
    }
}

/// An `OrderNotFound` on cancel usually means the order already filled,
/// expired, or was cancelled by some other path — all benign. But it can
/// also mean the caller cancelled against the wrong `market_type` (the
/// order lives on the account's other market). A defensive re-fetch on the
/// opposite market type distinguishes the two.
async fn verify_not_misplaced(
    exchange: &dyn ExchangePort,
    market_type: MarketType,
    symbol: &str,
    exchange_order_id: &str,
) -> EngineResult<()> {
    match exchange
        .fetch_order(market_type.opposite(), symbol, exchange_order_id)
        .await
    {
        Ok(_) => Err(EngineError::MarketTypeMismatch {
            order_id: exchange_order_id.to_string(),
        }),
        Err(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::core_types::{OrderType, Side};
    use crate::exchange_port::{
        Balance, ExchangeOrder, ExchangeResult, OrderRequest, PriceQuote,
    };
    use crate::market::{MarketInfo, Ticker};

    struct ScriptedExchange {
        cancel_calls: AtomicU32,
        fail_n_times: u32,
        then: FinalOutcome,
    }

    #[derive(Clone, Copy)]
    enum FinalOutcome {
        Success,
        NotFound,
        PermanentError,
    }

    fn sample_order() -> ExchangeOrder {
        ExchangeOrder {
            exchange_order_id: "abc".into(),
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: Some(Decimal::ONE),
            stop_price: None,
            quantity: Decimal::ONE,
            filled_quantity: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: "OPEN".into(),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl ExchangePort for ScriptedExchange {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn load_markets(
            &self,
            _market_type: MarketType,
            _reload: bool,
        ) -> ExchangeResult<Vec<(String, MarketInfo)>> {
            Ok(Vec::new())
        }

        async fn fetch_balance(&self, _market_type: MarketType) -> ExchangeResult<Vec<Balance>> {
            Ok(Vec::new())
        }

        async fn create_order(
            &self,
            _market_type: MarketType,
            _request: &OrderRequest,
        ) -> ExchangeResult<ExchangeOrder> {
            Ok(sample_order())
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
            let call = self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_n_times {
                return Err(ExchangeError::Network {
                    exchange: "scripted".into(),
                    message: "connection reset".into(),
                });
            }
            match self.then {
                FinalOutcome::Success => Ok(()),
                FinalOutcome::NotFound => Err(ExchangeError::OrderNotFound {
                    exchange: "scripted".into(),
                    message: "order not found".into(),
                }),
                FinalOutcome::PermanentError => Err(ExchangeError::InsufficientFunds {
                    exchange: "scripted".into(),
                    message: "insufficient balance".into(),
                }),
            }
        }

        async fn fetch_order(
            &self,
            _market_type: MarketType,
            _symbol: &str,
            _exchange_order_id: &str,
        ) -> ExchangeResult<ExchangeOrder> {
            Err(ExchangeError::OrderNotFound {
                exchange: "scripted".into(),
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

        async fn fetch_ticker(
            &self,
            _market_type: MarketType,
            symbol: &str,
        ) -> ExchangeResult<Ticker> {
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
    async fn succeeds_immediately_with_no_retries_needed() {
        let exchange = ScriptedExchange {
            cancel_calls: AtomicU32::new(0),
            fail_n_times: 0,
            then: FinalOutcome::Success,
        };
        let result = cancel_with_retry(&exchange, MarketType::Futures, "BTC/USDT", "abc").await;
        assert!(result.is_ok());
        assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let exchange = ScriptedExchange {
            cancel_calls: AtomicU32::new(0),
            fail_n_times: 2,
            then: FinalOutcome::Success,
        };
        let result = cancel_with_retry(&exchange, MarketType::Futures, "BTC/USDT", "abc").await;
        assert!(result.is_ok());
        assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_retry_exhausted() {
        let exchange = ScriptedExchange {
            cancel_calls: AtomicU32::new(0),
            fail_n_times: MAX_ATTEMPTS,
            then: FinalOutcome::Success,
        };
        let result = cancel_with_retry(&exchange, MarketType::Futures, "BTC/USDT", "abc").await;
        assert!(matches!(result, Err(EngineError::RetryExhausted { .. })));
    }

    #[tokio::test]
    async fn permanent_failure_short_circuits_without_retry() {
        let exchange = ScriptedExchange {
            cancel_calls: AtomicU32::new(0),
            fail_n_times: 0,
            then: FinalOutcome::PermanentError,
        };
        let result = cancel_with_retry(&exchange, MarketType::Futures, "BTC/USDT", "abc").await;
        assert!(matches!(result, Err(EngineError::ExchangePermanent { .. })));
        assert_eq!(exchange.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn order_not_found_with_no_trace_on_other_market_is_treated_as_success() {
        let exchange = ScriptedExchange {
            cancel_calls: AtomicU32::new(0),
            fail_n_times: 0,
            then: FinalOutcome::NotFound,
        };
        let result = cancel_with_retry(&exchange, MarketType::Futures, "BTC/USDT", "abc").await;
        assert!(result.is_ok());
    }
}
