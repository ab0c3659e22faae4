//! Webhook request/response DTOs and the admin surface's wire types (§6).
//!
//! `WebhookSignal`/`RawOrderItem` are the raw, loosely-typed shape the
//! webhook body deserializes into; `dispatcher::normalize` turns them into
//! `NormalizedOrder`s. Keeping deserialization this loose (almost every
//! field `Option`) mirrors the original's dict-based payload and lets
//! `normalize` own every validation decision instead of splitting it across
//! serde attributes and business logic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{OrderType, Side};
use crate::dispatcher::{AccountDispatchResult, DispatchOutcome, OrderDispatchResult};

/// One order inside a batch (`orders: [...]`). Every field is independent
/// of the top-level signal except `symbol`, which may fall back (§4.1).
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderItem {
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub order_type: Option<String>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub qty_per: Option<Decimal>,
}

/// The webhook body, deserialized as-is (§6). `orders` present and
/// non-empty means batch mode; otherwise the top-level fields describe a
/// single order.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSignal {
    pub group_name: String,
    pub token: String,
    pub symbol: Option<String>,
    pub side: Option<String>,
    pub order_type: Option<String>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub qty: Option<Decimal>,
    pub qty_per: Option<Decimal>,
    pub orders: Option<Vec<RawOrderItem>>,
}

/// One order's outcome in the response body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResultDto {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&OrderDispatchResult> for OrderResultDto {
    fn from(r: &OrderDispatchResult) -> Self {
        OrderResultDto {
            symbol: r.symbol.clone(),
            side: r.side,
            order_type: r.order_type,
            success: r.success,
            message: r.message.clone(),
        }
    }
}

/// One StrategyAccount's slice of the response, keyed by its id.
#[derive(Debug, Clone, Serialize)]
pub struct AccountResultDto {
    pub strategy_account_id: i64,
    pub orders: Vec<OrderResultDto>,
}

impl From<&AccountDispatchResult> for AccountResultDto {
    fn from(r: &AccountDispatchResult) -> Self {
        AccountResultDto {
            strategy_account_id: r.strategy_account_id,
            orders: r.orders.iter().map(OrderResultDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DispatchSummaryDto {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// `{success, results[], summary}` per §6. `success` is true iff every
/// order on every account succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub results: Vec<AccountResultDto>,
    pub summary: DispatchSummaryDto,
}

impl From<&DispatchOutcome> for WebhookResponse {
    fn from(outcome: &DispatchOutcome) -> Self {
        WebhookResponse {
            success: outcome.summary.failed == 0,
            results: outcome.accounts.iter().map(AccountResultDto::from).collect(),
            summary: DispatchSummaryDto {
                total: outcome.summary.total,
                successful: outcome.summary.successful,
                failed: outcome.summary.failed,
            },
        }
    }
}

/// Uniform error body for 400/401/404/5xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorResponse {
            error: message.into(),
        }
    }
}

/// `POST /admin/rebalance/{account_id}/{symbol}` response body: the diff
/// the out-of-band rebalance pass produced (§4.10).
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceResultDto {
    pub cancelled: usize,
    pub promoted: usize,
    pub duration_ms: u128,
}

/// `GET /admin/queue/depth` response body element.
#[derive(Debug, Clone, Serialize)]
pub struct QueueDepthEntryDto {
    pub strategy_account_id: i64,
    pub symbol: String,
    pub pending_count: usize,
}

/// `GET /admin/metrics/rebalance` response body.
#[derive(Debug, Clone, Serialize)]
pub struct RebalanceMetricsDto {
    pub rebalance_count: u64,
    pub total_cancelled: u64,
    pub total_promoted: u64,
    pub last_duration_ms: u128,
}

/// `GET /healthz` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
