//! QueueManager: `enqueue` and `rebalance_symbol` (§4.5.2–4.5.3, §4.5.5).
//!
//! Grounded in `original_source/.../order_queue_manager.py`'s
//! `OrderQueueManager`: a per-`(account_id, symbol)` lock guards the whole
//! read-plan-write cycle, mirroring that module's `_locks_lock` supervisor
//! mutex around a dict of per-key locks, reimplemented here over `dashmap`
//! get-or-insert (§5).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{Acquire, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use dashmap::DashMap;

use crate::alerts::AlertSink;
use crate::core_types::{MarketType, OrderDbId, OrderStatus, OrderType, StrategyAccountId};
use crate::error::{EngineError, EngineResult};
use crate::events::{emit_best_effort, EngineEvent, EventEmitter};
use crate::exchange_port::{ExchangePort, OrderRequest};
use crate::executor::batch::{BatchSubmitter, SubmitOutcome};
use crate::executor::classify::FailureKind;
use crate::orders::models::{OpenOrder, PendingOrder};
use crate::orders::repository::OrderRepository;

use super::plan::{plan_rebalance, sort_price};

/// Rebalance passes slower than this are logged as a warning (§4.5.3 step 7).
const SLOW_REBALANCE_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy)]
pub struct RebalanceOutcome {
    pub cancelled: usize,
    pub promoted: usize,
    pub duration: Duration,
}

/// Cumulative rebalance counters exposed by the admin metrics endpoint
/// (§4.5.3 step 7).
#[derive(Debug, Clone, Copy)]
pub struct RebalanceMetrics {
    pub rebalance_count: u64,
    pub total_cancelled: u64,
    pub total_promoted: u64,
    pub last_duration: Duration,
}

#[derive(Default)]
struct MetricsCounters {
    rebalance_count: AtomicU64,
    total_cancelled: AtomicU64,
    total_promoted: AtomicU64,
    last_duration_micros: AtomicU64,
}

pub struct QueueManager {
    pool: PgPool,
    orders: Arc<dyn OrderRepository>,
    events: Arc<dyn EventEmitter>,
    alerts: Arc<dyn AlertSink>,
    locks: DashMap<(StrategyAccountId, String), Arc<Mutex<()>>>,
    bucket_cap: usize,
    max_retry_count: u32,
    metrics: MetricsCounters,
}

impl QueueManager {
    pub fn new(
        pool: PgPool,
        orders: Arc<dyn OrderRepository>,
        events: Arc<dyn EventEmitter>,
        alerts: Arc<dyn AlertSink>,
        bucket_cap: usize,
        max_retry_count: u32,
    ) -> Self {
        QueueManager {
            pool,
            orders,
            events,
            alerts,
            locks: DashMap::new(),
            bucket_cap,
            max_retry_count,
            metrics: MetricsCounters::default(),
        }
    }

    /// Snapshot of the cumulative rebalance counters (§4.10).
    pub fn metrics(&self) -> RebalanceMetrics {
        RebalanceMetrics {
            rebalance_count: self.metrics.rebalance_count.load(Ordering::Relaxed),
            total_cancelled: self.metrics.total_cancelled.load(Ordering::Relaxed),
            total_promoted: self.metrics.total_promoted.load(Ordering::Relaxed),
            last_duration: Duration::from_micros(
                self.metrics.last_duration_micros.load(Ordering::Relaxed),
            ),
        }
    }

    /// Per-(account, symbol) pending-order depth, for `GET /admin/queue/depth`.
    pub async fn queue_depth(&self) -> EngineResult<Vec<(StrategyAccountId, String, usize)>> {
        let pairs = self.orders.list_active_symbol_pairs().await?;
        let mut depths = Vec::with_capacity(pairs.len());
        for (strategy_account_id, symbol) in pairs {
            let pending = self
                .orders
                .list_pending_for_symbol(strategy_account_id, &symbol)
                .await?;
            depths.push((strategy_account_id, symbol, pending.len()));
        }
        Ok(depths)
    }

    fn lock_for(&self, strategy_account_id: StrategyAccountId, symbol: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((strategy_account_id, symbol.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Parks an order, computing its `priority`/`sort_price` and persisting
    /// `webhook_received_at` untouched (§4.5.2).
    pub async fn enqueue(&self, mut order: PendingOrder) -> EngineResult<OrderDbId> {
        order.priority = order.order_type.priority();
        order.sort_price = sort_price(order.order_type, order.side, order.price, order.stop_price);

        let id = self.orders.insert_pending_order(&order).await?;

        emit_best_effort(
            self.events.as_ref(),
            EngineEvent::PendingOrderChanged {
                order_id: id,
                strategy_account_id: order.strategy_account_id,
                symbol: order.symbol.clone(),
            },
        )
        .await;

        Ok(id)
    }

    /// Runs one rebalance pass for `(strategy_account_id, symbol)` under the
    /// tuple's exclusive lock (§4.5.3). Every cancel-and-park and promote
    /// write in the pass runs inside one pass-scoped transaction, each as
    /// its own nested savepoint so one order's failure can't poison the
    /// rest of the pass; `commit` mirrors the original's `commit=True/False`
    /// (§4.5.3 step 6) — `false` leaves the transaction uncommitted so a
    /// caller composing several passes into one larger transaction can
    /// finish it later. No caller in this crate currently composes passes
    /// that way, so both current call sites pass `true`.
    pub async fn rebalance_symbol(
        &self,
        strategy_account_id: StrategyAccountId,
        symbol: &str,
        exchange: &dyn ExchangePort,
        market_type: MarketType,
        native_batch: bool,
        commit: bool,
    ) -> EngineResult<RebalanceOutcome> {
        let lock = self.lock_for(strategy_account_id, symbol);
        let _guard = lock.lock().await;
        let started = Instant::now();

        let open = self
            .orders
            .list_open_for_symbol(strategy_account_id, symbol)
            .await?;
        let pending = self
            .orders
            .list_pending_for_symbol(strategy_account_id, symbol)
            .await?;

        let plan = plan_rebalance(&open, &pending, self.bucket_cap);

        let mut tx = self.pool.begin().await.map_err(EngineError::Database)?;

        let mut cancelled = 0usize;
        for id in &plan.to_cancel {
            if let Some(order) = open.iter().find(|o| o.id == *id) {
                if self
                    .cancel_and_park(&mut tx, exchange, market_type, order)
                    .await
                {
                    cancelled += 1;
                }
            }
        }

        let promote_targets: Vec<&PendingOrder> = plan
            .to_promote
            .iter()
            .filter_map(|id| pending.iter().find(|p| p.id == *id))
            .collect();
        let promoted = self
            .promote(&mut tx, exchange, market_type, native_batch, &promote_targets)
            .await;

        if commit {
            tx.commit().await.map_err(EngineError::Database)?;
        }

        let duration = started.elapsed();
        if duration > SLOW_REBALANCE_THRESHOLD {
            tracing::warn!(
                strategy_account_id,
                symbol,
                ?duration,
                "rebalance_symbol exceeded 500ms"
            );
        }

        emit_best_effort(
            self.events.as_ref(),
            EngineEvent::OrderListUpdate {
                strategy_account_id,
                symbol: symbol.to_string(),
            },
        )
        .await;

        self.metrics.rebalance_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_cancelled
            .fetch_add(cancelled as u64, Ordering::Relaxed);
        self.metrics
            .total_promoted
            .fetch_add(promoted as u64, Ordering::Relaxed);
        self.metrics
            .last_duration_micros
            .store(duration.as_micros() as u64, Ordering::Relaxed);

        Ok(RebalanceOutcome {
            cancelled,
            promoted,
            duration,
        })
    }

    /// Cancels one live order on the exchange and re-parks it as a
    /// PendingOrder, preserving `webhook_received_at` (§4.5.3 step 5). The
    /// cancel itself retries transient failures with backoff and resolves
    /// `OrderNotFound` defensively (§5); a cancel that still fails leaves
    /// the order live and is logged, not retried again within this pass.
    ///
    /// The delete-open/insert-pending pair runs inside a savepoint nested
    /// in the pass's transaction: either both land or neither does, so the
    /// order never appears in both stores at once even though the exchange
    /// cancel already happened outside the DB transaction's reach.
    async fn cancel_and_park(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        exchange: &dyn ExchangePort,
        market_type: MarketType,
        order: &OpenOrder,
    ) -> bool {
        if let Err(err) = crate::executor::cancel_with_retry(
            exchange,
            market_type,
            &order.symbol,
            &order.exchange_order_id,
        )
        .await
        {
            tracing::warn!(
                order_id = order.id,
                error = %err,
                "cancel failed during rebalance; order stays live"
            );
            if matches!(err, crate::error::EngineError::MarketTypeMismatch { .. }) {
                self.alerts
                    .alert(&format!(
                        "order {} cancel hit a market_type mismatch on {}",
                        order.id, order.symbol
                    ))
                    .await;
            }
            return false;
        }

        let mut savepoint = match tx.begin().await {
            Ok(savepoint) => savepoint,
            Err(err) => {
                tracing::error!(order_id = order.id, error = %err, "failed to open cancel-and-park savepoint");
                return false;
            }
        };

        if let Err(err) = self
            .orders
            .delete_open_order_tx(&mut savepoint, order.id)
            .await
        {
            tracing::error!(order_id = order.id, error = %err, "failed to delete cancelled open order");
            let _ = savepoint.rollback().await;
            return false;
        }

        let parked = PendingOrder {
            id: 0,
            strategy_account_id: order.strategy_account_id,
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            price: order.price,
            stop_price: order.stop_price,
            quantity: order.quantity - order.filled_quantity,
            market_type: order.market_type,
            webhook_received_at: order.webhook_received_at,
            priority: order.order_type.priority(),
            sort_price: sort_price(order.order_type, order.side, order.price, order.stop_price),
            retry_count: 0,
            reason: Some("cancelled_and_parked".into()),
        };

        let inserted = self
            .orders
            .insert_pending_order_tx(&mut savepoint, &parked)
            .await;

        match inserted {
            Ok(id) => {
                if let Err(err) = savepoint.commit().await {
                    tracing::error!(order_id = order.id, error = %err, "failed to commit cancel-and-park savepoint");
                    return false;
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
                emit_best_effort(
                    self.events.as_ref(),
                    EngineEvent::PendingOrderChanged {
                        order_id: id,
                        strategy_account_id: order.strategy_account_id,
                        symbol: order.symbol.clone(),
                    },
                )
                .await;
                true
            }
            Err(err) => {
                tracing::error!(order_id = order.id, error = %err, "failed to park cancelled order; rolling back delete");
                let _ = savepoint.rollback().await;
                false
            }
        }
    }

    /// Submits the target set's PendingOrders to the exchange and deletes
    /// each on success. A failed submission bumps `retry_count`; at or past
    /// `max_retry_count` the order is dropped with an alert (§4.5.5).
    ///
    /// The insert-open/delete-pending pair for each success runs inside a
    /// savepoint nested in the pass's transaction, via
    /// `OrderRepository::insert_open_order_tx` — either both land or
    /// neither does, so a failed delete after a successful insert can never
    /// leave the order live in both stores at once.
    async fn promote(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        exchange: &dyn ExchangePort,
        market_type: MarketType,
        native_batch: bool,
        targets: &[&PendingOrder],
    ) -> usize {
        if targets.is_empty() {
            return 0;
        }

        let requests: Vec<OrderRequest> = targets
            .iter()
            .map(|p| OrderRequest {
                symbol: p.symbol.clone(),
                side: p.side,
                order_type: p.order_type,
                quantity: p.quantity,
                price: p.price,
                stop_price: p.stop_price,
                reduce_only: false,
            })
            .collect();

        let submitter = BatchSubmitter::new(exchange, native_batch);
        let outcomes = submitter.submit_all(market_type, &requests).await;

        let mut promoted = 0usize;
        for (pending_order, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                SubmitOutcome::Success(exchange_order) => {
                    let open_order = OpenOrder {
                        id: 0,
                        exchange_order_id: exchange_order.exchange_order_id,
                        strategy_account_id: pending_order.strategy_account_id,
                        symbol: pending_order.symbol.clone(),
                        side: pending_order.side,
                        order_type: pending_order.order_type,
                        price: pending_order.price,
                        stop_price: pending_order.stop_price,
                        quantity: pending_order.quantity,
                        filled_quantity: exchange_order.filled_quantity,
                        status: OrderStatus::Open,
                        market_type,
                        webhook_received_at: pending_order.webhook_received_at,
                        filled_at: None,
                    };

                    let mut savepoint = match tx.begin().await {
                        Ok(savepoint) => savepoint,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to open promote savepoint");
                            continue;
                        }
                    };

                    let insert = self
                        .orders
                        .insert_open_order_tx(&mut savepoint, &open_order)
                        .await;

                    match insert {
                        Ok(id) => {
                            if let Err(err) = self
                                .orders
                                .delete_pending_order_tx(&mut savepoint, pending_order.id)
                                .await
                            {
                                tracing::error!(order_id = id, error = %err, "failed to delete promoted pending order; rolling back promotion");
                                let _ = savepoint.rollback().await;
                                continue;
                            }
                            if let Err(err) = savepoint.commit().await {
                                tracing::error!(order_id = id, error = %err, "failed to commit promote savepoint");
                                continue;
                            }
                            promoted += 1;
                            emit_best_effort(
                                self.events.as_ref(),
                                EngineEvent::OrderCreated {
                                    order_id: id,
                                    strategy_account_id: pending_order.strategy_account_id,
                                    symbol: pending_order.symbol.clone(),
                                    side: pending_order.side,
                                    order_type: pending_order.order_type,
                                },
                            )
                            .await;
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to persist promoted order");
                            let _ = savepoint.rollback().await;
                        }
                    }
                }
                SubmitOutcome::Failure { kind, message } => {
                    self.handle_promotion_failure(pending_order, kind, &message)
                        .await;
                }
            }
        }
        promoted
    }

    async fn handle_promotion_failure(
        &self,
        pending_order: &PendingOrder,
        kind: FailureKind,
        message: &str,
    ) {
        if kind == FailureKind::Permanent {
            let _ = self.orders.delete_pending_order(pending_order.id).await;
            self.alerts
                .alert(&format!(
                    "order permanently rejected during promotion: {} {} {message}",
                    pending_order.symbol, pending_order.side
                ))
                .await;
            return;
        }

        match self.orders.bump_retry_count(pending_order.id).await {
            Ok(retry_count) if retry_count >= self.max_retry_count => {
                let _ = self.orders.delete_pending_order(pending_order.id).await;
                self.alerts
                    .alert(&format!(
                        "order dropped after {retry_count} promotion retries: {} {}",
                        pending_order.symbol, pending_order.side
                    ))
                    .await;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "failed to bump retry_count on promotion failure");
            }
        }
    }
}
