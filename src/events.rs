//! EventEmitter port: typed domain events emitted after a DB commit (§4.8).
//!
//! The core never talks to a transport (SSE, websocket, etc.) directly —
//! it emits through this port, and a concrete sink lives at the gateway
//! edge. Grounded in the teacher's port-trait convention (`ExchangePort`-
//! style abstraction over an I/O boundary) applied to the Python original's
//! SSE event catalogue (`order_created`, `order_cancelled`, ...).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::core_types::{OrderDbId, OrderType, Side, StrategyAccountId};

#[derive(Debug, Clone)]
pub enum EngineEvent {
    OrderCreated {
        order_id: OrderDbId,
        strategy_account_id: StrategyAccountId,
        symbol: String,
        side: Side,
        order_type: OrderType,
    },
    OrderCancelled {
        order_id: OrderDbId,
        strategy_account_id: StrategyAccountId,
        symbol: String,
    },
    OrderFilled {
        order_id: OrderDbId,
        strategy_account_id: StrategyAccountId,
        symbol: String,
        filled_quantity: Decimal,
        filled_at: DateTime<Utc>,
    },
    /// A full snapshot refresh for the order-list UI/SSE stream.
    OrderListUpdate {
        strategy_account_id: StrategyAccountId,
        symbol: String,
    },
    PendingOrderChanged {
        order_id: OrderDbId,
        strategy_account_id: StrategyAccountId,
        symbol: String,
    },
    PositionUpdated {
        strategy_account_id: StrategyAccountId,
        symbol: String,
        quantity: Decimal,
        realized_pnl_delta: Decimal,
    },
    /// Aggregated per-webhook, per-order_type toast summary, delivered once
    /// at webhook response time rather than streamed continuously.
    BatchSummary {
        strategy_account_id: StrategyAccountId,
        order_type: OrderType,
        succeeded: u32,
        failed: u32,
    },
}

#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(&self, event: EngineEvent);
}

/// Logs every event at debug and otherwise drops it — the default sink when
/// no transport is wired up (unit tests, one-off admin commands).
pub struct NullEventEmitter;

#[async_trait]
impl EventEmitter for NullEventEmitter {
    async fn emit(&self, event: EngineEvent) {
        tracing::debug!(?event, "event emitted with no sink attached");
    }
}

/// Thin wrapper kept as the single call site the rest of the engine uses
/// to emit — the named place a future fallible sink's error would be
/// caught and logged instead of propagated, per §4.8's non-fatal contract.
pub async fn emit_best_effort<E: EventEmitter + ?Sized>(emitter: &E, event: EngineEvent) {
    emitter.emit(event).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingEmitter {
        events: Mutex<Vec<EngineEvent>>,
    }

    #[async_trait]
    impl EventEmitter for RecordingEmitter {
        async fn emit(&self, event: EngineEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn records_emitted_events() {
        let emitter = RecordingEmitter {
            events: Mutex::new(Vec::new()),
        };
        emit_best_effort(
            &emitter,
            EngineEvent::OrderCreated {
                order_id: 1,
                strategy_account_id: 1,
                symbol: "BTC/USDT".into(),
                side: Side::Buy,
                order_type: OrderType::Limit,
            },
        )
        .await;
        assert_eq!(emitter.events.lock().unwrap().len(), 1);
    }
}
