//! Notification queue repository for database operations
//!
//! Durable state behind the notification engine. Eligible items are ordered
//! by `COALESCE(next_retry_time, created_at)` so retry-due items preempt a
//! backlog of fresh ones.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    ChannelType, NotificationQueueItem, NotificationStatus, TemplateType,
};
use crate::{Error, Result};

/// Notification queue repository
#[derive(Clone, Debug)]
pub struct NotificationQueueRepository {
    pool: PgPool,
}

impl NotificationQueueRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const COLUMNS: &'static str = "id, channel_type, template_type, payload, status, \
         retry_count, next_retry_time, error_message, created_at, updated_at";

    /// Persist a fresh pending item
    pub async fn create(
        &self,
        channel_type: ChannelType,
        template_type: TemplateType,
        payload: &serde_json::Value,
    ) -> Result<NotificationQueueItem> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r"
            INSERT INTO notification_queue (id, channel_type, template_type, payload, status,
                retry_count, next_retry_time, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 0, NULL, NULL, $6, $6)
            RETURNING {}
            ",
            Self::COLUMNS
        ))
        .bind(id)
        .bind(channel_type.to_string())
        .bind(template_type.to_string())
        .bind(payload)
        .bind(NotificationStatus::Pending.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_item(row)
    }

    /// Get item by ID
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<NotificationQueueItem>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM notification_queue WHERE id = $1",
            Self::COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_item).transpose()
    }

    /// All pending items ordered by due time, due-first. Used by the
    /// boot-time bulk loader and the recovery path.
    pub async fn list_pending(&self) -> Result<Vec<NotificationQueueItem>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {} FROM notification_queue
            WHERE status = $1
            ORDER BY COALESCE(next_retry_time, created_at) ASC
            ",
            Self::COLUMNS
        ))
        .bind(NotificationStatus::Pending.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_item).collect()
    }

    /// pending → processing. Guarded on the current status so a stale
    /// consumer cannot double-claim an item.
    pub async fn mark_processing(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE notification_queue
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = $3
            ",
        )
        .bind(id)
        .bind(NotificationStatus::Processing.to_string())
        .bind(NotificationStatus::Pending.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// processing → sent
    pub async fn mark_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_queue
            SET status = $2, error_message = NULL, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(NotificationStatus::Sent.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// processing → pending with a bumped retry counter and a due time
    pub async fn reschedule(
        &self,
        id: Uuid,
        next_retry_time: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_queue
            SET status = $2, retry_count = retry_count + 1, next_retry_time = $3,
                error_message = $4, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(NotificationStatus::Pending.to_string())
        .bind(next_retry_time)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// processing → failed, terminal
    pub async fn mark_failed(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            r"
            UPDATE notification_queue
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(NotificationStatus::Failed.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Purge sent items older than the cutoff
    pub async fn purge_sent_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM notification_queue WHERE status = $1 AND updated_at < $2",
        )
        .bind(NotificationStatus::Sent.to_string())
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_item(row: sqlx::postgres::PgRow) -> Result<NotificationQueueItem> {
    let channel_type: String = row.try_get("channel_type")?;
    let template_type: String = row.try_get("template_type")?;
    let status: String = row.try_get("status")?;

    Ok(NotificationQueueItem {
        id: row.try_get("id")?,
        channel_type: channel_type
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid channel type: {e}")))?,
        template_type: template_type
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid template type: {e}")))?,
        payload: row.try_get("payload")?,
        status: status
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid notification status: {e}")))?,
        retry_count: row.try_get("retry_count")?,
        next_retry_time: row.try_get("next_retry_time")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
