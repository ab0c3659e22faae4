//! Background rebalance scheduler (§4.5.4).
//!
//! Grounded in the teacher's `WsService::run` shape (a struct wrapping a
//! `tokio::time::interval` loop) applied to `order_queue_manager.py`'s APS
//! job: a ~1s tick over every `(account, symbol)` pair with pending or open
//! orders. `max_instances=1` reentry protection falls out for free here —
//! the loop awaits one full pass before the next `interval.tick()`, so two
//! passes can never run concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::alerts::AlertSink;
use crate::context::ExecutionContext;
use crate::orders::repository::OrderRepository;

use super::manager::QueueManager;

const BACKPRESSURE_PENDING_THRESHOLD: usize = 20;
const BACKPRESSURE_SYMBOL_COUNT_ALERT: usize = 10;
const MEMORY_SAMPLE_EVERY: u64 = 300;

pub struct RebalanceScheduler {
    queue: Arc<QueueManager>,
    orders: Arc<dyn OrderRepository>,
    context: Arc<ExecutionContext>,
    alerts: Arc<dyn AlertSink>,
    tick: Duration,
}

impl RebalanceScheduler {
    pub fn new(
        queue: Arc<QueueManager>,
        orders: Arc<dyn OrderRepository>,
        context: Arc<ExecutionContext>,
        alerts: Arc<dyn AlertSink>,
        tick: Duration,
    ) -> Self {
        RebalanceScheduler {
            queue,
            orders,
            context,
            alerts,
            tick,
        }
    }

    /// Runs until `cancel` fires. Intended to be `tokio::spawn`ed once at
    /// startup alongside the reconciler and cache-refresh tasks (§5).
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        let mut elapsed_secs: u64 = 0;
        let tick_secs = self.tick.as_secs().max(1);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_once().await;
                    elapsed_secs += tick_secs;
                    if elapsed_secs >= MEMORY_SAMPLE_EVERY {
                        elapsed_secs = 0;
                        self.sample_memory().await;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("rebalance scheduler shutting down");
                    break;
                }
            }
        }
    }

    async fn tick_once(&self) {
        let pairs = match self.orders.list_active_symbol_pairs().await {
            Ok(pairs) => pairs,
            Err(err) => {
                tracing::error!(error = %err, "failed to list active symbol pairs");
                return;
            }
        };

        let mut backpressure_symbols = 0usize;

        for (strategy_account_id, symbol) in pairs {
            if let Ok(pending) = self
                .orders
                .list_pending_for_symbol(strategy_account_id, &symbol)
                .await
            {
                if pending.len() > BACKPRESSURE_PENDING_THRESHOLD {
                    backpressure_symbols += 1;
                    tracing::warn!(
                        strategy_account_id,
                        symbol = %symbol,
                        depth = pending.len(),
                        "pending queue depth exceeds backpressure threshold"
                    );
                }
            }

            let resolved = match self.context.resolve(strategy_account_id).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::error!(
                        strategy_account_id,
                        symbol = %symbol,
                        error = %err,
                        "failed to resolve execution context for rebalance"
                    );
                    continue;
                }
            };

            if let Err(err) = self
                .queue
                .rebalance_symbol(
                    strategy_account_id,
                    &symbol,
                    resolved.exchange.as_ref(),
                    resolved.market_type,
                    resolved.native_batch,
                    true,
                )
                .await
            {
                tracing::error!(
                    strategy_account_id,
                    symbol = %symbol,
                    error = %err,
                    "rebalance_symbol failed"
                );
            }
        }

        if backpressure_symbols >= BACKPRESSURE_SYMBOL_COUNT_ALERT {
            self.alerts
                .alert(&format!(
                    "{backpressure_symbols} symbols are over the pending-queue backpressure threshold"
                ))
                .await;
        }
    }

    /// Approximates memory pressure from queue sizes rather than a true RSS
    /// read: the dependency stack carries no process-stats crate, and the
    /// active-pair count is the signal this engine can act on directly
    /// (shed load by symbol) anyway.
    async fn sample_memory(&self) {
        match self.orders.list_active_symbol_pairs().await {
            Ok(pairs) => tracing::info!(active_symbol_pairs = pairs.len(), "periodic load sample"),
            Err(err) => tracing::warn!(error = %err, "periodic load sample failed"),
        }
    }
}
