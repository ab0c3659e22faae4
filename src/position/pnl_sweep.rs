//! Unrealized-PnL sweep: marks every open position to the latest price on
//! a fixed interval (§4.7, supplemented).
//!
//! Grounded in `original_source/position_service.py`'s periodic
//! `update_unrealized_pnl` pass, reimplemented with the batched
//! `fetch_price_quotes` call `executor/batch.rs` already uses for order
//! submission — one ticker round-trip per account, not one per symbol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;

use super::capital::StrategyCapitalRepository;
use super::repository::PositionRepository;

pub struct UnrealizedPnlSweep {
    positions: Arc<dyn PositionRepository>,
    capital: Arc<dyn StrategyCapitalRepository>,
    context: Arc<ExecutionContext>,
    tick: StdDuration,
}

impl UnrealizedPnlSweep {
    pub fn new(
        positions: Arc<dyn PositionRepository>,
        capital: Arc<dyn StrategyCapitalRepository>,
        context: Arc<ExecutionContext>,
        tick: StdDuration,
    ) -> Self {
        UnrealizedPnlSweep {
            positions,
            capital,
            context,
            tick,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep_once().await,
                _ = cancel.cancelled() => {
                    tracing::info!("unrealized pnl sweep shutting down");
                    break;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        let positions = match self.positions.list_all_nonzero().await {
            Ok(positions) => positions,
            Err(err) => {
                tracing::error!(error = %err, "failed to list non-zero positions for pnl sweep");
                return;
            }
        };

        let mut by_account: HashMap<_, Vec<_>> = HashMap::new();
        for position in positions {
            by_account.entry(position.strategy_account_id).or_default().push(position);
        }

        for (strategy_account_id, positions) in by_account {
            if let Err(err) = self.sweep_account(strategy_account_id, &positions).await {
                tracing::error!(strategy_account_id, error = %err, "unrealized pnl sweep failed for account");
            }
        }
    }

    async fn sweep_account(
        &self,
        strategy_account_id: crate::core_types::StrategyAccountId,
        positions: &[super::StrategyPosition],
    ) -> crate::error::EngineResult<()> {
        let resolved = self.context.resolve(strategy_account_id).await?;

        let symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        let quotes = resolved
            .exchange
            .fetch_price_quotes(resolved.market_type, &symbols)
            .await
            .map_err(|e| crate::error::EngineError::ExchangeTemporary {
                exchange: resolved.account.exchange.clone(),
                message: e.to_string(),
            })?;

        let mark_prices: HashMap<String, Decimal> = quotes
            .into_iter()
            .map(|q| (q.symbol, (q.bid + q.ask) / Decimal::TWO))
            .collect();

        let mut total_unrealized = Decimal::ZERO;
        for position in positions {
            let Some(mark_price) = mark_prices.get(&position.symbol) else {
                tracing::warn!(strategy_account_id, symbol = %position.symbol, "no price quote for open position, skipping in pnl sweep");
                continue;
            };
            total_unrealized += position.quantity * (*mark_price - position.entry_price);
        }

        self.capital
            .upsert_unrealized_pnl(strategy_account_id, total_unrealized)
            .await
    }
}
