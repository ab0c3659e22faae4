//! OrderExecutor: the single call site that turns one `NormalizedOrder`
//! (already resolved to an account) into either a direct exchange
//! submission (MARKET) or a parked-then-rebalanced PendingOrder (LIMIT,
//! STOP_MARKET, STOP_LIMIT) — §4.4 and §4.5.2 wired together.
//!
//! `CANCEL_ALL_ORDER` never reaches this type; the Dispatcher handles it
//! as a direct pass-through against the ExchangePort (§4.5.1).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertSink;
use crate::context::ResolvedAccount;
use crate::core_types::{OrderDbId, OrderStatus};
use crate::dispatcher::normalize::{NormalizedOrder, QuantitySpec};
use crate::error::{EngineError, EngineResult};
use crate::events::{emit_best_effort, EngineEvent, EventEmitter};
use crate::exchange_port::OrderRequest;
use crate::market::{quantize_for_order, MarketCacheRegistry};
use crate::orders::models::{OpenOrder, PendingOrder};
use crate::orders::repository::OrderRepository;
use crate::queue::QueueManager;
use crate::rate_limiter::{EndpointType, RateLimiter};

use super::classify::{classify, FailureKind};
use super::params::validate_params;

/// What happened to one order after `execute` returns successfully.
#[derive(Debug, Clone, Copy)]
pub enum ExecutionOutcome {
    /// Submitted straight to the exchange and persisted as an OpenOrder.
    Submitted { open_order_id: OrderDbId },
    /// Parked as a PendingOrder; a rebalance pass was attempted immediately
    /// and may have already promoted it (§4.5.2's enqueue-then-rebalance
    /// flow — there is no separate "try direct submit first" path).
    Enqueued { pending_order_id: OrderDbId },
}

pub struct OrderExecutor {
    orders: Arc<dyn OrderRepository>,
    queue: Arc<QueueManager>,
    rate_limiter: Arc<RateLimiter>,
    market_caches: Arc<MarketCacheRegistry>,
    events: Arc<dyn EventEmitter>,
    alerts: Arc<dyn AlertSink>,
}

impl OrderExecutor {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        queue: Arc<QueueManager>,
        rate_limiter: Arc<RateLimiter>,
        market_caches: Arc<MarketCacheRegistry>,
        events: Arc<dyn EventEmitter>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        OrderExecutor {
            orders,
            queue,
            rate_limiter,
            market_caches,
            events,
            alerts,
        }
    }

    /// Executes one normalized order against an already-resolved account.
    /// `webhook_received_at` is the original signal arrival time, carried
    /// through to OpenOrder/PendingOrder unchanged (§4.5.2).
    pub async fn execute(
        &self,
        resolved: &ResolvedAccount,
        order: &NormalizedOrder,
        webhook_received_at: DateTime<Utc>,
    ) -> EngineResult<ExecutionOutcome> {
        let quantity = self.resolve_quantity(resolved, order).await?;

        let cache = self
            .market_caches
            .get(&resolved.account.exchange)
            .ok_or_else(|| EngineError::CacheMissOnOrderPath {
                exchange: resolved.account.exchange.clone(),
                symbol: order.symbol.clone(),
            })?;
        let (qty, price, stop_price) =
            quantize_for_order(&cache, &order.symbol, quantity, order.price, order.stop_price)?;

        let request = OrderRequest {
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            quantity: qty,
            price,
            stop_price,
            reduce_only: false,
        };
        validate_params(&request).map_err(|e| EngineError::Validation(e.to_string()))?;

        // The RateLimiter waits for an order-endpoint slot. A fresh,
        // never-cancelled token is fine here: the caller (Dispatcher) has
        // already committed to this order by the time it reaches us.
        let never_cancel = CancellationToken::new();
        self.rate_limiter
            .acquire(
                &resolved.account.exchange,
                EndpointType::Order,
                Some(resolved.account.id),
                &never_cancel,
            )
            .await;

        if order.order_type.is_queueable() {
            self.enqueue_and_rebalance(resolved, order, &request, webhook_received_at)
                .await
        } else {
            self.submit_direct(resolved, order, &request, webhook_received_at)
                .await
        }
    }

    async fn enqueue_and_rebalance(
        &self,
        resolved: &ResolvedAccount,
        order: &NormalizedOrder,
        request: &OrderRequest,
        webhook_received_at: DateTime<Utc>,
    ) -> EngineResult<ExecutionOutcome> {
        let pending = PendingOrder {
            id: 0,
            strategy_account_id: resolved.strategy_account.id,
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            price: request.price,
            stop_price: request.stop_price,
            quantity: request.quantity,
            market_type: resolved.market_type,
            webhook_received_at,
            priority: 0,
            sort_price: None,
            retry_count: 0,
            reason: None,
        };

        let pending_order_id = self.queue.enqueue(pending).await?;

        // Immediately try to promote: if the bucket has room, this is what
        // turns a freshly-parked order straight into a live one without
        // waiting for the next scheduler tick.
        if let Err(err) = self
            .queue
            .rebalance_symbol(
                resolved.strategy_account.id,
                &order.symbol,
                resolved.exchange.as_ref(),
                resolved.market_type,
                resolved.native_batch,
                true,
            )
            .await
        {
            tracing::warn!(
                strategy_account_id = resolved.strategy_account.id,
                symbol = %order.symbol,
                error = %err,
                "immediate rebalance after enqueue failed; scheduler will retry"
            );
        }

        Ok(ExecutionOutcome::Enqueued { pending_order_id })
    }

    async fn submit_direct(
        &self,
        resolved: &ResolvedAccount,
        order: &NormalizedOrder,
        request: &OrderRequest,
        webhook_received_at: DateTime<Utc>,
    ) -> EngineResult<ExecutionOutcome> {
        match resolved
            .exchange
            .create_order(resolved.market_type, request)
            .await
        {
            Ok(exchange_order) => {
                let open_order = OpenOrder {
                    id: 0,
                    exchange_order_id: exchange_order.exchange_order_id,
                    strategy_account_id: resolved.strategy_account.id,
                    symbol: request.symbol.clone(),
                    side: request.side,
                    order_type: request.order_type,
                    price: request.price,
                    stop_price: request.stop_price,
                    quantity: request.quantity,
                    filled_quantity: exchange_order.filled_quantity,
                    status: OrderStatus::Open,
                    market_type: resolved.market_type,
                    webhook_received_at,
                    filled_at: None,
                };
                let open_order_id = self.orders.insert_open_order(&open_order).await?;

                emit_best_effort(
                    self.events.as_ref(),
                    EngineEvent::OrderCreated {
                        order_id: open_order_id,
                        strategy_account_id: resolved.strategy_account.id,
                        symbol: order.symbol.clone(),
                        side: order.side,
                        order_type: order.order_type,
                    },
                )
                .await;

                Ok(ExecutionOutcome::Submitted { open_order_id })
            }
            Err(err) => {
                let message = err.message().to_string();
                let kind = classify(&message);
                if kind == FailureKind::Permanent {
                    self.alerts
                        .alert(&format!(
                            "order permanently rejected: {} {} {message}",
                            order.symbol, order.side
                        ))
                        .await;
                    Err(EngineError::ExchangePermanent {
                        exchange: resolved.account.exchange.clone(),
                        message,
                    })
                } else {
                    Err(EngineError::ExchangeTemporary {
                        exchange: resolved.account.exchange.clone(),
                        message,
                    })
                }
            }
        }
    }

    /// Resolves `qty_per` into an absolute quantity against the account's
    /// allocated share of free balance: `free_balance(quote) * weight *
    /// qty_per`, divided by a reference price (the order's own price/stop
    /// for LIMIT/STOP, else the latest ticker for MARKET). `qty` (absolute)
    /// passes through untouched.
    async fn resolve_quantity(
        &self,
        resolved: &ResolvedAccount,
        order: &NormalizedOrder,
    ) -> EngineResult<Decimal> {
        let fraction = match order.quantity {
            QuantitySpec::Absolute(q) => return Ok(q),
            QuantitySpec::Fraction(f) => f,
        };

        let (_, quote) = order.symbol.split_once('/').ok_or_else(|| {
            EngineError::Validation(format!("symbol {} is not in BASE/QUOTE form", order.symbol))
        })?;

        let balances = resolved
            .exchange
            .fetch_balance(resolved.market_type)
            .await
            .map_err(|e| EngineError::ExchangeTemporary {
                exchange: resolved.account.exchange.clone(),
                message: e.message().to_string(),
            })?;
        let free = balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(quote))
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO);

        let allocated_capital = free * resolved.strategy_account.weight * fraction;

        let reference_price = match order.price.or(order.stop_price) {
            Some(p) => p,
            None => {
                let ticker = resolved
                    .exchange
                    .fetch_ticker(resolved.market_type, &order.symbol)
                    .await
                    .map_err(|e| EngineError::ExchangeTemporary {
                        exchange: resolved.account.exchange.clone(),
                        message: e.message().to_string(),
                    })?;
                ticker.last
            }
        };

        if reference_price.is_zero() {
            return Err(EngineError::Validation(format!(
                "no reference price available to resolve qty_per for {}",
                order.symbol
            )));
        }

        Ok(allocated_capital / reference_price)
    }
}
