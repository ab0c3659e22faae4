//! Reconciler: keeps local OpenOrder state in sync with exchange reality
//! and produces at-most-one Trade per filled order (§4.6).
//!
//! Grounded in `original_source/web_server/app/services/unified_order_service.py`'s
//! `update_open_orders_status` polling loop, restructured as the teacher's
//! `Service { run(self) }` background task. The
//! `UNIQUE(strategy_account_id, exchange_order_id)` constraint on Trade
//! (enforced by `insert_trade_if_absent`) is the idempotency mechanism a
//! concurrent WebSocket fill handler would race against; this poller is
//! written to lose that race gracefully.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::core_types::OrderStatus;
use crate::events::{emit_best_effort, EngineEvent, EventEmitter};
use crate::orders::models::Trade;
use crate::orders::repository::OrderRepository;
use crate::position::{apply_fill, PositionRepository};

const GC_RETENTION_DAYS: i64 = 7;
const GC_EVERY_TICKS: u64 = 3_600;

pub struct Reconciler {
    pool: PgPool,
    orders: Arc<dyn OrderRepository>,
    positions: Arc<dyn PositionRepository>,
    events: Arc<dyn EventEmitter>,
    context: Arc<ExecutionContext>,
    tick: StdDuration,
}

impl Reconciler {
    pub fn new(
        pool: PgPool,
        orders: Arc<dyn OrderRepository>,
        positions: Arc<dyn PositionRepository>,
        events: Arc<dyn EventEmitter>,
        context: Arc<ExecutionContext>,
        tick: StdDuration,
    ) -> Self {
        Reconciler {
            pool,
            orders,
            positions,
            events,
            context,
            tick,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                    ticks += 1;
                    if ticks >= GC_EVERY_TICKS {
                        ticks = 0;
                        self.gc_once().await;
                    }
                }
                _ = cancel.cancelled() => {
                    tracing::info!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    async fn poll_once(&self) {
        for status in ["OPEN", "PARTIALLY_FILLED"] {
            let orders = match self.orders.list_open_by_status(status).await {
                Ok(orders) => orders,
                Err(err) => {
                    tracing::error!(status, error = %err, "failed to list open orders for reconciliation");
                    continue;
                }
            };

            for order in orders {
                let resolved = match self.context.resolve(order.strategy_account_id).await {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        tracing::error!(order_id = order.id, error = %err, "failed to resolve execution context");
                        continue;
                    }
                };

                let exchange_order = match resolved
                    .exchange
                    .fetch_order(resolved.market_type, &order.symbol, &order.exchange_order_id)
                    .await
                {
                    Ok(eo) => eo,
                    Err(err) => {
                        tracing::warn!(order_id = order.id, error = %err, "fetch_order failed during reconciliation");
                        continue;
                    }
                };

                let new_status = OrderStatus::from_str(&exchange_order.status).unwrap_or(order.status);
                let filled_at = new_status.is_terminal().then(Utc::now);

                if let Err(err) = self
                    .orders
                    .update_fill_state(order.id, exchange_order.filled_quantity, new_status, filled_at)
                    .await
                {
                    tracing::error!(order_id = order.id, error = %err, "failed to persist fill state");
                    continue;
                }

                if new_status != OrderStatus::Filled {
                    continue;
                }

                let fill_delta = exchange_order.filled_quantity - order.filled_quantity;
                if fill_delta <= Decimal::ZERO {
                    continue;
                }

                let price = exchange_order.price.or(order.price).unwrap_or(Decimal::ZERO);
                self.record_fill(&order, fill_delta, price, exchange_order.fee)
                    .await;
            }
        }
    }

    /// Applies one fill: the Trade insert commits first under
    /// `insert_trade_if_absent`'s uniqueness guard, and only a writer that
    /// actually won that race proceeds to the position upsert afterwards,
    /// as a separate best-effort write. A losing racer sees `None` back
    /// from the insert and returns before ever touching the position
    /// (§4.6, §4.7, seed scenario 5).
    async fn record_fill(
        &self,
        order: &crate::orders::models::OpenOrder,
        fill_delta: Decimal,
        price: Decimal,
        fee: Decimal,
    ) {
        let position = match self
            .positions
            .get_or_flat(order.strategy_account_id, &order.symbol)
            .await
        {
            Ok(p) => p,
            Err(err) => {
                tracing::error!(order_id = order.id, error = %err, "failed to read position before fill");
                return;
            }
        };

        let update = apply_fill(&position, order.side, fill_delta, price);

        let trade = Trade {
            id: 0,
            strategy_account_id: order.strategy_account_id,
            exchange_order_id: order.exchange_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            price,
            quantity: fill_delta,
            pnl: update.realized_pnl,
            fee,
            is_entry: update.is_entry,
            timestamp: Utc::now(),
        };

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::error!(order_id = order.id, error = %err, "failed to open reconciliation transaction");
                return;
            }
        };

        let inserted = match self.orders.insert_trade_if_absent(&mut tx, &trade).await {
            Ok(inserted) => inserted,
            Err(err) => {
                tracing::error!(order_id = order.id, error = %err, "failed to insert trade");
                let _ = tx.rollback().await;
                return;
            }
        };

        let Some(_trade_id) = inserted else {
            // Lost the race against a concurrent reconciliation pass or a
            // websocket fill handler; the other writer already recorded
            // this fill and updated the position. Nothing left to do.
            let _ = tx.rollback().await;
            return;
        };

        if let Err(err) = tx.commit().await {
            tracing::error!(order_id = order.id, error = %err, "failed to commit trade insert");
            return;
        }

        if let Err(err) = self
            .positions
            .upsert(
                order.strategy_account_id,
                &order.symbol,
                update.position.quantity,
                update.position.entry_price,
                update.realized_pnl,
            )
            .await
        {
            tracing::error!(order_id = order.id, error = %err, "failed to upsert position after trade commit");
        }

        emit_best_effort(
            self.events.as_ref(),
            EngineEvent::OrderFilled {
                order_id: order.id,
                strategy_account_id: order.strategy_account_id,
                symbol: order.symbol.clone(),
                filled_quantity: fill_delta,
                filled_at: Utc::now(),
            },
        )
        .await;

        emit_best_effort(
            self.events.as_ref(),
            EngineEvent::PositionUpdated {
                strategy_account_id: order.strategy_account_id,
                symbol: order.symbol.clone(),
                quantity: update.position.quantity,
                realized_pnl_delta: update.realized_pnl,
            },
        )
        .await;
    }

    async fn gc_once(&self) {
        let cutoff = Utc::now() - ChronoDuration::days(GC_RETENTION_DAYS);
        match self.orders.gc_terminal(cutoff).await {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "garbage-collected terminal order rows");
                }
            }
            Err(err) => tracing::error!(error = %err, "terminal row gc failed"),
        }
    }
}
