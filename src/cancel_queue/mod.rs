//! CancelQueue: orphan-cancel mop-up (§4.9, supplemented).
//!
//! Grounded in `original_source/.../cancel_queue_service.py`. A cancel
//! requested for an order the create-path raced against (the order wasn't
//! yet visible on the exchange, or wasn't yet persisted locally) is parked
//! here instead of retried inline; a background worker drains it on the
//! same 1/2/4s backoff as the rest of the cancel path (§5), moving to
//! `FAILED` with an alert once retries are exhausted.

pub mod repository;

pub use repository::{CancelQueueRepository, PgCancelQueueRepository};

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertSink;
use crate::context::ExecutionContext;
use crate::events::{emit_best_effort, EngineEvent, EventEmitter};
use crate::executor::{attempt_cancel, AttemptError};
use crate::orders::repository::OrderRepository;

const POLL_LIMIT: i64 = 100;
const MAX_RETRY_COUNT: u32 = 3;
const INITIAL_BACKOFF_SECS: i64 = 1;

pub struct CancelQueueWorker {
    queue: Arc<dyn CancelQueueRepository>,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventEmitter>,
    alerts: Arc<dyn AlertSink>,
    context: Arc<ExecutionContext>,
    tick: StdDuration,
}

impl CancelQueueWorker {
    pub fn new(
        queue: Arc<dyn CancelQueueRepository>,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventEmitter>,
        alerts: Arc<dyn AlertSink>,
        context: Arc<ExecutionContext>,
        tick: StdDuration,
    ) -> Self {
        CancelQueueWorker {
            queue,
            orders,
            events,
            alerts,
            context,
            tick,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.poll_once().await,
                _ = cancel.cancelled() => {
                    tracing::info!("cancel queue worker shutting down");
                    break;
                }
            }
        }
    }

    async fn poll_once(&self) {
        let entries = match self.queue.get_pending_cancels(POLL_LIMIT).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "failed to list pending cancel queue entries");
                return;
            }
        };

        for entry in entries {
            let order = match self.orders.get_open_order(entry.order_id).await {
                Ok(order) => order,
                Err(err) => {
                    tracing::error!(entry_id = entry.id, error = %err, "failed to load order for cancel queue entry");
                    continue;
                }
            };

            let Some(order) = order else {
                // Already gone from our own state - whatever raced it is
                // resolved one way or another.
                if let Err(err) = self.queue.mark_success(entry.id).await {
                    tracing::error!(entry_id = entry.id, error = %err, "failed to mark cancel queue entry success");
                }
                continue;
            };

            let resolved = match self.context.resolve(order.strategy_account_id).await {
                Ok(resolved) => resolved,
                Err(err) => {
                    tracing::error!(entry_id = entry.id, order_id = order.id, error = %err, "failed to resolve execution context for cancel queue entry");
                    continue;
                }
            };

            match attempt_cancel(
                resolved.exchange.as_ref(),
                resolved.market_type,
                &order.symbol,
                &order.exchange_order_id,
            )
            .await
            {
                Ok(()) => {
                    if let Err(err) = self.orders.delete_open_order(order.id).await {
                        tracing::error!(entry_id = entry.id, order_id = order.id, error = %err, "cancelled on exchange but failed to delete local open order");
                        self.alerts
                            .alert(&format!(
                                "order {} cancelled on exchange but local delete failed: {err}",
                                order.id
                            ))
                            .await;
                    }
                    if let Err(err) = self.queue.mark_success(entry.id).await {
                        tracing::error!(entry_id = entry.id, error = %err, "failed to mark cancel queue entry success");
                    }
                    emit_best_effort(
                        self.events.as_ref(),
                        EngineEvent::OrderCancelled {
                            order_id: order.id,
                            strategy_account_id: order.strategy_account_id,
                            symbol: order.symbol.clone(),
                        },
                    )
                    .await;
                }
                Err(AttemptError::Permanent(err)) => {
                    tracing::error!(entry_id = entry.id, order_id = order.id, error = %err, "cancel queue entry hit a permanent failure");
                    if let Err(err) = self.queue.mark_failed(entry.id).await {
                        tracing::error!(entry_id = entry.id, error = %err, "failed to mark cancel queue entry failed");
                    }
                    self.alerts
                        .alert(&format!(
                            "cancel queue entry {} for order {} failed permanently: {err}",
                            entry.id, order.id
                        ))
                        .await;
                }
                Err(AttemptError::Temporary(message)) => {
                    self.handle_temporary_failure(&entry, order.id, &message).await;
                }
            }
        }
    }

    async fn handle_temporary_failure(
        &self,
        entry: &crate::orders::models::CancelQueueEntry,
        order_id: crate::core_types::OrderDbId,
        message: &str,
    ) {
        if entry.retry_count + 1 >= MAX_RETRY_COUNT {
            if let Err(err) = self.queue.mark_failed(entry.id).await {
                tracing::error!(entry_id = entry.id, error = %err, "failed to mark cancel queue entry failed");
            }
            self.alerts
                .alert(&format!(
                    "cancel queue entry {} for order {order_id} exhausted retries: {message}",
                    entry.id
                ))
                .await;
            return;
        }

        let backoff_secs = INITIAL_BACKOFF_SECS << entry.retry_count;
        let next_retry_at = Utc::now() + ChronoDuration::seconds(backoff_secs);
        if let Err(err) = self.queue.bump_retry(entry.id, next_retry_at).await {
            tracing::error!(entry_id = entry.id, error = %err, "failed to bump cancel queue retry count");
        }
    }
}
