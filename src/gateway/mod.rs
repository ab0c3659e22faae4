//! The HTTP gateway: the webhook ingestion endpoint plus the admin surface
//! for manual rebalance, cache control, and queue/metrics inspection (§6,
//! §4.10).

pub mod openapi;
pub mod state;
pub mod types;

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::EngineError;

use state::AppState;
use types::{
    ErrorResponse, HealthResponse, QueueDepthEntryDto, RebalanceMetricsDto, RebalanceResultDto,
    WebhookResponse, WebhookSignal,
};

/// Dispatch-specific status mapping (§4.1): `UnknownStrategy` and
/// `BadToken` diverge from `EngineError::kind()`'s coarser `Auth` bucket
/// because the spec assigns them different codes (404 vs 401).
impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::BadToken => StatusCode::UNAUTHORIZED,
            EngineError::UnknownStrategy(_) => StatusCode::NOT_FOUND,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::ExchangeTemporary { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::ExchangePermanent { .. } => StatusCode::BAD_GATEWAY,
            EngineError::CacheMissOnOrderPath { .. }
            | EngineError::MarketTypeMismatch { .. }
            | EngineError::RetryExhausted { .. }
            | EngineError::Internal(_)
            | EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// `POST /webhook`: the single ingestion point for trading signals (§6).
/// A 207 is returned iff the webhook produced a mix of successful and
/// failed order dispatches across its accounts; a clean success is 200,
/// and a signal-level failure (bad token, unknown group, bad payload)
/// never reaches the dispatcher's per-account fan-out at all.
#[utoipa::path(
    post,
    path = "/webhook",
    responses(
        (status = 200, description = "every order dispatched successfully"),
        (status = 207, description = "partial dispatch: some orders failed"),
        (status = 400, description = "validation error"),
        (status = 401, description = "bad webhook token"),
        (status = 404, description = "unknown strategy group"),
    ),
    tag = "Webhook"
)]
pub(crate) async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(signal): Json<WebhookSignal>,
) -> Response {
    match state.dispatcher.dispatch(&signal).await {
        Ok(outcome) => {
            let status = if outcome.is_partial() {
                StatusCode::MULTI_STATUS
            } else {
                StatusCode::OK
            };
            (status, Json(WebhookResponse::from(&outcome))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

/// `POST /admin/rebalance/{account_id}/{symbol}` (§4.10).
#[utoipa::path(
    post,
    path = "/admin/rebalance/{account_id}/{symbol}",
    responses((status = 200, description = "rebalance pass result")),
    tag = "Admin"
)]
pub(crate) async fn admin_rebalance(
    State(state): State<Arc<AppState>>,
    Path((account_id, symbol)): Path<(i64, String)>,
) -> Response {
    let resolved = match state.context.resolve(account_id).await {
        Ok(resolved) => resolved,
        Err(err) => return err.into_response(),
    };

    match state
        .queue
        .rebalance_symbol(
            account_id,
            &symbol,
            resolved.exchange.as_ref(),
            resolved.market_type,
            resolved.native_batch,
            true,
        )
        .await
    {
        Ok(outcome) => Json(RebalanceResultDto {
            cancelled: outcome.cancelled,
            promoted: outcome.promoted,
            duration_ms: outcome.duration.as_millis(),
        })
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `POST /admin/cache/warm` (§4.10). Evicts every cached entry, relying on
/// the order path's cache-miss fallback and the background refresher to
/// repopulate it; a full eager re-warm needs the live account list, which
/// only `main`'s bootstrap holds (see DESIGN.md).
#[utoipa::path(
    post,
    path = "/admin/cache/warm",
    responses((status = 202, description = "eviction accepted")),
    tag = "Admin"
)]
pub(crate) async fn admin_cache_warm(State(state): State<Arc<AppState>>) -> Response {
    state.market_caches.clear_all();
    StatusCode::ACCEPTED.into_response()
}

/// `POST /admin/cache/clear` (§4.10).
#[utoipa::path(
    post,
    path = "/admin/cache/clear",
    responses((status = 202, description = "cache cleared")),
    tag = "Admin"
)]
pub(crate) async fn admin_cache_clear(State(state): State<Arc<AppState>>) -> Response {
    state.market_caches.clear_all();
    StatusCode::ACCEPTED.into_response()
}

/// `GET /admin/queue/depth` (§4.10).
#[utoipa::path(
    get,
    path = "/admin/queue/depth",
    responses((status = 200, description = "per-(account, symbol) pending counts")),
    tag = "Admin"
)]
pub(crate) async fn admin_queue_depth(State(state): State<Arc<AppState>>) -> Response {
    match state.queue.queue_depth().await {
        Ok(depths) => Json(
            depths
                .into_iter()
                .map(|(strategy_account_id, symbol, pending_count)| QueueDepthEntryDto {
                    strategy_account_id,
                    symbol,
                    pending_count,
                })
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /admin/metrics/rebalance` (§4.10).
#[utoipa::path(
    get,
    path = "/admin/metrics/rebalance",
    responses((status = 200, description = "cumulative rebalance counters")),
    tag = "Admin"
)]
pub(crate) async fn admin_rebalance_metrics(State(state): State<Arc<AppState>>) -> Json<RebalanceMetricsDto> {
    let metrics = state.queue.metrics();
    Json(RebalanceMetricsDto {
        rebalance_count: metrics.rebalance_count,
        total_cancelled: metrics.total_cancelled,
        total_promoted: metrics.total_promoted,
        last_duration_ms: metrics.last_duration.as_millis(),
    })
}

#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "always ok once the process is serving traffic")),
    tag = "System"
)]
pub(crate) async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/admin/rebalance/{account_id}/{symbol}", post(admin_rebalance))
        .route("/admin/cache/warm", post(admin_cache_warm))
        .route("/admin/cache/clear", post(admin_cache_clear))
        .route("/admin/queue/depth", get(admin_queue_depth))
        .route("/admin/metrics/rebalance", get(admin_rebalance_metrics))
        .route("/healthz", get(health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .with_state(Arc::new(state))
}

/// Binds and serves the gateway until `cancel` fires, then lets in-flight
/// requests drain (axum's graceful shutdown).
pub async fn serve(
    state: AppState,
    bind_addr: &str,
    port: u16,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(format!("{bind_addr}:{port}")).await?;
    tracing::info!(%bind_addr, port, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            tracing::info!("gateway shutting down");
        })
        .await?;
    Ok(())
}
