//! BatchSubmitter: turns a list of pending orders into exchange submissions,
//! chunked natively or semaphore-limited, per §4.4.
//!
//! Grounded in `original_source/.../order_queue_manager.py::_process_pending_batch`:
//! chunks of 5 for native-batch futures exchanges (Binance's hard limit,
//! unified across exchanges for consistency even where an exchange allows
//! more), falling back to bounded-concurrency individual calls otherwise. A
//! whole-chunk batch-call failure marks every order in that chunk as
//! temporary-failed, exactly as the Python original does at its
//! `except Exception as batch_error` branch.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::core_types::MarketType;
use crate::exchange_port::{ExchangeOrder, ExchangePort, ExchangeResult, OrderRequest};

use super::classify::{classify, FailureKind};

pub const NATIVE_BATCH_CHUNK_SIZE: usize = 5;
pub const FALLBACK_CONCURRENCY: usize = 10;

/// The outcome of submitting one order request, already classified.
pub enum SubmitOutcome {
    Success(ExchangeOrder),
    Failure {
        kind: FailureKind,
        message: String,
    },
}

pub struct BatchSubmitter<'a> {
    exchange: &'a dyn ExchangePort,
    native_batch: bool,
}

impl<'a> BatchSubmitter<'a> {
    pub fn new(exchange: &'a dyn ExchangePort, native_batch: bool) -> Self {
        BatchSubmitter {
            exchange,
            native_batch,
        }
    }

    /// Submits `requests`, preserving input order in the returned vector so
    /// callers can zip the result back against the originating PendingOrder.
    pub async fn submit_all(
        &self,
        market_type: MarketType,
        requests: &[OrderRequest],
    ) -> Vec<SubmitOutcome> {
        if requests.is_empty() {
            return Vec::new();
        }

        if self.native_batch && market_type == MarketType::Futures {
            self.submit_native_batches(market_type, requests).await
        } else {
            self.submit_with_semaphore(market_type, requests).await
        }
    }

    async fn submit_native_batches(
        &self,
        market_type: MarketType,
        requests: &[OrderRequest],
    ) -> Vec<SubmitOutcome> {
        let mut outcomes = Vec::with_capacity(requests.len());
        for chunk in requests.chunks(NATIVE_BATCH_CHUNK_SIZE) {
            match self.exchange.create_batch_orders(market_type, chunk).await {
                Ok(results) => {
                    for (i, result) in results.into_iter().enumerate() {
                        if i >= chunk.len() {
                            break;
                        }
                        outcomes.push(to_outcome(result));
                    }
                }
                Err(err) => {
                    // The whole chunk failed as one request; mark every
                    // order in it as failed with the same classification.
                    let message = err.message().to_string();
                    let kind = classify(&message);
                    for _ in chunk {
                        outcomes.push(SubmitOutcome::Failure {
                            kind,
                            message: message.clone(),
                        });
                    }
                }
            }
        }
        outcomes
    }

    async fn submit_with_semaphore(
        &self,
        market_type: MarketType,
        requests: &[OrderRequest],
    ) -> Vec<SubmitOutcome> {
        let semaphore = Arc::new(Semaphore::new(FALLBACK_CONCURRENCY));
        let futures = requests.iter().map(|request| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");
                let result = self.exchange.create_order(market_type, request).await;
                to_outcome(result)
            }
        });
        join_all(futures).await
    }
}

fn to_outcome(result: ExchangeResult<ExchangeOrder>) -> SubmitOutcome {
    match result {
        Ok(order) => SubmitOutcome::Success(order),
        Err(err) => {
            let message = err.message().to_string();
            let kind = classify(&message);
            SubmitOutcome::Failure { kind, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::core_types::{OrderType, Side};
    use crate::exchange_port::{Balance, ExchangeError, PriceQuote};
    use crate::market::{MarketInfo, Ticker};

    struct FakeExchange {
        batch_calls: AtomicUsize,
        fail_batch: bool,
    }

    fn sample_request() -> OrderRequest {
        OrderRequest {
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: Decimal::ONE,
            price: None,
            stop_price: None,
            reduce_only: false,
        }
    }

    fn sample_order(id: &str) -> ExchangeOrder {
        ExchangeOrder {
            exchange_order_id: id.to_string(),
            symbol: "BTC/USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: None,
            stop_price: None,
            quantity: Decimal::ONE,
            filled_quantity: Decimal::ZERO,
            fee: Decimal::ZERO,
            status: "OPEN".into(),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl ExchangePort for FakeExchange {
        fn name(&self) -> &str {
            "fake"
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
            Ok(sample_order("single-1"))
        }

        async fn create_batch_orders(
            &self,
            _market_type: MarketType,
            requests: &[OrderRequest],
        ) -> ExchangeResult<Vec<ExchangeResult<ExchangeOrder>>> {
            self.batch_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_batch {
                return Err(ExchangeError::Network {
                    exchange: "fake".into(),
                    message: "connection reset".into(),
                });
            }
            Ok(requests
                .iter()
                .enumerate()
                .map(|(i, _)| Ok(sample_order(&format!("batch-{i}"))))
                .collect())
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
            Ok(sample_order("fetched"))
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
            symbols: &[String],
        ) -> ExchangeResult<Vec<PriceQuote>> {
            Ok(symbols
                .iter()
                .map(|s| PriceQuote {
                    symbol: s.clone(),
                    bid: Decimal::ONE,
                    ask: Decimal::ONE,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn futures_native_batch_chunks_into_fives() {
        let exchange = FakeExchange {
            batch_calls: AtomicUsize::new(0),
            fail_batch: false,
        };
        let submitter = BatchSubmitter::new(&exchange, true);
        let requests: Vec<_> = (0..12).map(|_| sample_request()).collect();
        let outcomes = submitter.submit_all(MarketType::Futures, &requests).await;

        assert_eq!(outcomes.len(), 12);
        assert_eq!(exchange.batch_calls.load(Ordering::SeqCst), 3); // 5 + 5 + 2
        assert!(outcomes.iter().all(|o| matches!(o, SubmitOutcome::Success(_))));
    }

    #[tokio::test]
    async fn failed_batch_marks_whole_chunk_as_failed() {
        let exchange = FakeExchange {
            batch_calls: AtomicUsize::new(0),
            fail_batch: true,
        };
        let submitter = BatchSubmitter::new(&exchange, true);
        let requests: Vec<_> = (0..3).map(|_| sample_request()).collect();
        let outcomes = submitter.submit_all(MarketType::Futures, &requests).await;

        assert_eq!(outcomes.len(), 3);
        for outcome in outcomes {
            match outcome {
                SubmitOutcome::Failure { kind, .. } => assert_eq!(kind, FailureKind::Temporary),
                SubmitOutcome::Success(_) => panic!("expected failure"),
            }
        }
    }

    #[tokio::test]
    async fn spot_orders_fall_back_to_individual_calls() {
        let exchange = FakeExchange {
            batch_calls: AtomicUsize::new(0),
            fail_batch: false,
        };
        let submitter = BatchSubmitter::new(&exchange, true);
        let requests: Vec<_> = (0..3).map(|_| sample_request()).collect();
        let outcomes = submitter.submit_all(MarketType::Spot, &requests).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(exchange.batch_calls.load(Ordering::SeqCst), 0);
    }
}
