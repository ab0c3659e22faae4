//! CancelQueueRepository: persistence for the orphan-cancel mop-up queue (§4.9).
//!
//! Follows the same trait-plus-Postgres-impl shape as
//! `orders::repository::OrderRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::core_types::OrderDbId;
use crate::error::{EngineError, EngineResult};
use crate::orders::models::{CancelQueueEntry, CancelQueueStatus};

#[async_trait]
pub trait CancelQueueRepository: Send + Sync {
    /// Adds `order_id` to the queue, unless a PENDING or PROCESSING entry
    /// for it already exists — duplicate requests (e.g. two rebalance
    /// passes racing on the same orphan) are suppressed rather than queued
    /// twice.
    async fn add_to_queue(&self, order_id: OrderDbId) -> EngineResult<Option<i64>>;

    /// PENDING entries whose `next_retry_at` has elapsed, oldest first.
    async fn get_pending_cancels(&self, limit: i64) -> EngineResult<Vec<CancelQueueEntry>>;

    async fn mark_success(&self, id: i64) -> EngineResult<()>;

    /// Bumps `retry_count` and schedules `next_retry_at`, returning the new
    /// count so the caller can decide whether to give up.
    async fn bump_retry(&self, id: i64, next_retry_at: DateTime<Utc>) -> EngineResult<u32>;

    async fn mark_failed(&self, id: i64) -> EngineResult<()>;
}

pub struct PgCancelQueueRepository {
    pool: PgPool,
}

impl PgCancelQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn status_str(status: CancelQueueStatus) -> &'static str {
    match status {
        CancelQueueStatus::Pending => "PENDING",
        CancelQueueStatus::Processing => "PROCESSING",
        CancelQueueStatus::Success => "SUCCESS",
        CancelQueueStatus::Failed => "FAILED",
    }
}

fn parse_status(s: &str) -> EngineResult<CancelQueueStatus> {
    match s {
        "PENDING" => Ok(CancelQueueStatus::Pending),
        "PROCESSING" => Ok(CancelQueueStatus::Processing),
        "SUCCESS" => Ok(CancelQueueStatus::Success),
        "FAILED" => Ok(CancelQueueStatus::Failed),
        other => Err(EngineError::Internal(format!(
            "unknown cancel_queue status: {other}"
        ))),
    }
}

#[async_trait]
impl CancelQueueRepository for PgCancelQueueRepository {
    async fn add_to_queue(&self, order_id: OrderDbId) -> EngineResult<Option<i64>> {
        let existing = sqlx::query!(
            r#"SELECT id FROM cancel_queue
               WHERE order_id = $1 AND status IN ('PENDING','PROCESSING')"#,
            order_id,
        )
        .fetch_optional(&self.pool)
        .await?;

        if existing.is_some() {
            tracing::warn!(order_id, "order already in cancel queue, skipping duplicate");
            return Ok(None);
        }

        let row = sqlx::query!(
            r#"INSERT INTO cancel_queue (order_id, status, retry_count, requested_at)
               VALUES ($1, 'PENDING', 0, $2)
               RETURNING id"#,
            order_id,
            Utc::now(),
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(row.id))
    }

    async fn get_pending_cancels(&self, limit: i64) -> EngineResult<Vec<CancelQueueEntry>> {
        let rows = sqlx::query!(
            r#"SELECT id, order_id, status, retry_count, next_retry_at
               FROM cancel_queue
               WHERE status = 'PENDING' AND (next_retry_at <= $1 OR next_retry_at IS NULL)
               ORDER BY requested_at ASC
               LIMIT $2"#,
            Utc::now(),
            limit,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(CancelQueueEntry {
                    id: r.id,
                    order_id: r.order_id,
                    status: parse_status(&r.status)?,
                    retry_count: r.retry_count as u32,
                    next_retry_at: r.next_retry_at.unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    async fn mark_success(&self, id: i64) -> EngineResult<()> {
        sqlx::query!(
            "UPDATE cancel_queue SET status = $1 WHERE id = $2",
            status_str(CancelQueueStatus::Success),
            id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bump_retry(&self, id: i64, next_retry_at: DateTime<Utc>) -> EngineResult<u32> {
        let row = sqlx::query!(
            r#"UPDATE cancel_queue SET retry_count = retry_count + 1, next_retry_at = $1
               WHERE id = $2 RETURNING retry_count"#,
            next_retry_at,
            id,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.retry_count as u32)
    }

    async fn mark_failed(&self, id: i64) -> EngineResult<()> {
        sqlx::query!(
            "UPDATE cancel_queue SET status = $1 WHERE id = $2",
            status_str(CancelQueueStatus::Failed),
            id,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
