//! Dispatcher: the webhook entry point's fan-out (§4.1).
//!
//! Resolves `group_name -> Strategy -> [StrategyAccount]`, authorizes the
//! signal's `token` against `Strategy.webhook_token`, normalizes the
//! payload into one or more orders, and executes each order per account.
//! Fan-out is parallel across accounts, sequential within one account, so
//! that a single webhook's rate-limit and queue ordering stay deterministic
//! per account (§4.1).

pub mod normalize;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;

use crate::account::{StrategyAccountRepository, StrategyRepository};
use crate::context::{ExecutionContext, ResolvedAccount};
use crate::core_types::{OrderType, Side, StrategyAccountId};
use crate::error::{EngineError, EngineResult};
use crate::events::{emit_best_effort, EngineEvent, EventEmitter};
use crate::executor::OrderExecutor;
use crate::orders::repository::OrderRepository;

use self::normalize::{normalize_signal, NormalizedOrder};
use crate::gateway::types::WebhookSignal;

/// Outcome of dispatching one normalized order to one account.
#[derive(Debug, Clone)]
pub struct OrderDispatchResult {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub success: bool,
    pub message: Option<String>,
}

impl OrderDispatchResult {
    fn success(order: &NormalizedOrder) -> Self {
        OrderDispatchResult {
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            success: true,
            message: None,
        }
    }

    fn failed(order: &NormalizedOrder, message: String) -> Self {
        OrderDispatchResult {
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type,
            success: false,
            message: Some(message),
        }
    }
}

/// Every order result for one StrategyAccount in this webhook.
#[derive(Debug, Clone)]
pub struct AccountDispatchResult {
    pub strategy_account_id: StrategyAccountId,
    pub orders: Vec<OrderDispatchResult>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// The full result of one webhook dispatch — what the HTTP handler turns
/// into the `{success, results[], summary}` response body (§6).
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub accounts: Vec<AccountDispatchResult>,
    pub summary: DispatchSummary,
}

impl DispatchOutcome {
    /// 207 iff at least one order succeeded and at least one failed across
    /// the whole webhook — a clean all-success or all-failure stays 200/an
    /// error status instead (§4.1 "PartialDispatch").
    pub fn is_partial(&self) -> bool {
        self.summary.successful > 0 && self.summary.failed > 0
    }
}

pub struct Dispatcher {
    context: Arc<ExecutionContext>,
    orders: Arc<dyn OrderRepository>,
    executor: Arc<OrderExecutor>,
    events: Arc<dyn EventEmitter>,
}

impl Dispatcher {
    pub fn new(
        context: Arc<ExecutionContext>,
        orders: Arc<dyn OrderRepository>,
        executor: Arc<OrderExecutor>,
        events: Arc<dyn EventEmitter>,
    ) -> Self {
        Dispatcher {
            context,
            orders,
            executor,
            events,
        }
    }

    /// Dispatches one webhook signal. Fails fast (no side effects) on a bad
    /// token, unknown group, or a normalization error; once fan-out starts,
    /// every account's and every order's outcome is independent and
    /// reported back rather than aborting the whole webhook.
    pub async fn dispatch(&self, signal: &WebhookSignal) -> EngineResult<DispatchOutcome> {
        let pool = self.context.pool();

        let strategy = StrategyRepository::get_by_group_name(pool, &signal.group_name)
            .await?
            .ok_or_else(|| EngineError::UnknownStrategy(signal.group_name.clone()))?;

        if strategy.webhook_token != signal.token {
            return Err(EngineError::BadToken);
        }

        let strategy_accounts = StrategyAccountRepository::list_active_for_strategy(pool, strategy.id).await?;
        if strategy_accounts.is_empty() {
            return Err(EngineError::NotFound(format!(
                "no active accounts for strategy group '{}'",
                strategy.group_name
            )));
        }

        let orders = normalize_signal(signal)?;
        let webhook_received_at = Utc::now();

        let futures = strategy_accounts.iter().map(|sa| {
            let orders = orders.clone();
            async move {
                self.dispatch_to_account(sa.id, &orders, webhook_received_at)
                    .await
            }
        });
        let accounts: Vec<AccountDispatchResult> = join_all(futures).await;

        let mut summary = DispatchSummary::default();
        for account in &accounts {
            for order in &account.orders {
                summary.total += 1;
                if order.success {
                    summary.successful += 1;
                } else {
                    summary.failed += 1;
                }
            }
        }

        Ok(DispatchOutcome { accounts, summary })
    }

    /// Runs every order against one account, sequentially, so queue and
    /// rate-limit ordering stays deterministic within the account (§4.1).
    async fn dispatch_to_account(
        &self,
        strategy_account_id: StrategyAccountId,
        orders: &[NormalizedOrder],
        webhook_received_at: DateTime<Utc>,
    ) -> AccountDispatchResult {
        let resolved = match self.context.resolve(strategy_account_id).await {
            Ok(resolved) => resolved,
            Err(err) => {
                return AccountDispatchResult {
                    strategy_account_id,
                    orders: orders
                        .iter()
                        .map(|o| OrderDispatchResult::failed(o, err.to_string()))
                        .collect(),
                }
            }
        };

        let mut results = Vec::with_capacity(orders.len());
        for order in orders {
            let result = if order.order_type == OrderType::CancelAllOrder {
                self.cancel_all(&resolved, &order.symbol).await
            } else {
                match self
                    .executor
                    .execute(&resolved, order, webhook_received_at)
                    .await
                {
                    Ok(_) => OrderDispatchResult::success(order),
                    Err(err) => OrderDispatchResult::failed(order, err.to_string()),
                }
            };
            results.push(result);
        }

        AccountDispatchResult {
            strategy_account_id,
            orders: results,
        }
    }

    /// `CANCEL_ALL_ORDER` pass-through (§4.5.1 Open Question resolved): it
    /// never enters a bucket or the PendingOrder store. Cancels every live
    /// order and drops every parked order for the `(account, symbol)` pair
    /// directly against the ExchangePort/OrderStore.
    async fn cancel_all(&self, resolved: &ResolvedAccount, symbol: &str) -> OrderDispatchResult {
        let fake_order = NormalizedOrder {
            symbol: symbol.to_string(),
            side: Side::Buy,
            order_type: OrderType::CancelAllOrder,
            price: None,
            stop_price: None,
            quantity: normalize::QuantitySpec::Absolute(Default::default()),
        };

        let open_orders = match self
            .orders
            .list_open_for_symbol(resolved.strategy_account.id, symbol)
            .await
        {
            Ok(o) => o,
            Err(err) => return OrderDispatchResult::failed(&fake_order, err.to_string()),
        };

        let mut cancel_failures = Vec::new();
        for order in &open_orders {
            if let Err(err) = crate::executor::cancel_with_retry(
                resolved.exchange.as_ref(),
                resolved.market_type,
                symbol,
                &order.exchange_order_id,
            )
            .await
            {
                tracing::warn!(order_id = order.id, error = %err, "cancel_all: cancel failed, order stays live");
                cancel_failures.push(order.id);
                continue;
            }

            if let Err(err) = self.orders.delete_open_order(order.id).await {
                tracing::error!(order_id = order.id, error = %err, "cancel_all: failed to delete cancelled order");
                continue;
            }

            emit_best_effort(
                self.events.as_ref(),
                EngineEvent::OrderCancelled {
                    order_id: order.id,
                    strategy_account_id: resolved.strategy_account.id,
                    symbol: symbol.to_string(),
                },
            )
            .await;
        }

        let pending_orders = match self
            .orders
            .list_pending_for_symbol(resolved.strategy_account.id, symbol)
            .await
        {
            Ok(p) => p,
            Err(err) => return OrderDispatchResult::failed(&fake_order, err.to_string()),
        };
        for pending in &pending_orders {
            if let Err(err) = self.orders.delete_pending_order(pending.id).await {
                tracing::error!(order_id = pending.id, error = %err, "cancel_all: failed to drop pending order");
                continue;
            }
            emit_best_effort(
                self.events.as_ref(),
                EngineEvent::PendingOrderChanged {
                    order_id: pending.id,
                    strategy_account_id: resolved.strategy_account.id,
                    symbol: symbol.to_string(),
                },
            )
            .await;
        }

        if cancel_failures.is_empty() {
            OrderDispatchResult::success(&fake_order)
        } else {
            OrderDispatchResult::failed(
                &fake_order,
                format!("{} order(s) could not be cancelled", cancel_failures.len()),
            )
        }
    }
}
