//! Task log repository for database operations
//!
//! Counters are only ever increased through the additive partial-update
//! path; the row's status field is the authoritative terminal state.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::{
    CounterDelta, FileProcessingStats, PageParams, StatsRange, TaskId, TaskLog, TaskLogId,
    TaskStatus,
};
use crate::{Error, Result};

/// Task log repository
#[derive(Clone, Debug)]
pub struct TaskLogRepository {
    pool: PgPool,
}

impl TaskLogRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const COLUMNS: &'static str = "id, task_id, status, message, start_time, end_time, duration, \
         total_file, generated_file, skip_file, overwrite_file, metadata_count, subtitle_count, \
         metadata_downloaded, subtitle_downloaded, failed_count, created_at, updated_at";

    /// Create a running log row with zeroed counters
    pub async fn create(&self, task_id: &TaskId) -> Result<TaskLog> {
        let id = TaskLogId::new();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r"
            INSERT INTO task_logs (id, task_id, status, message, start_time, end_time, duration,
                total_file, generated_file, skip_file, overwrite_file, metadata_count,
                subtitle_count, metadata_downloaded, subtitle_downloaded, failed_count,
                created_at, updated_at)
            VALUES ($1, $2, $3, '', $4, NULL, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, $4, $4)
            RETURNING {}
            ",
            Self::COLUMNS
        ))
        .bind(&id)
        .bind(task_id)
        .bind(TaskStatus::Running.to_string())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_task_log(row)
    }

    /// Apply an additive counter delta
    pub async fn apply_delta(&self, id: &TaskLogId, delta: &CounterDelta) -> Result<()> {
        if delta.is_zero() {
            return Ok(());
        }

        sqlx::query(
            r"
            UPDATE task_logs
            SET total_file = total_file + $2,
                generated_file = generated_file + $3,
                skip_file = skip_file + $4,
                overwrite_file = overwrite_file + $5,
                metadata_count = metadata_count + $6,
                subtitle_count = subtitle_count + $7,
                metadata_downloaded = metadata_downloaded + $8,
                subtitle_downloaded = subtitle_downloaded + $9,
                failed_count = failed_count + $10,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(delta.total_file)
        .bind(delta.generated_file)
        .bind(delta.skip_file)
        .bind(delta.overwrite_file)
        .bind(delta.metadata_count)
        .bind(delta.subtitle_count)
        .bind(delta.metadata_downloaded)
        .bind(delta.subtitle_downloaded)
        .bind(delta.failed_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Set the terminal status and message
    pub async fn set_status(
        &self,
        id: &TaskLogId,
        status: TaskStatus,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE task_logs SET status = $2, message = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status.to_string())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record the end time and duration (seconds)
    pub async fn update_end_time(
        &self,
        id: &TaskLogId,
        end_time: DateTime<Utc>,
        duration: i64,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE task_logs
            SET end_time = $2, duration = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(end_time)
        .bind(duration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get log by ID
    pub async fn get_by_id(&self, id: &TaskLogId) -> Result<Option<TaskLog>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM task_logs WHERE id = $1",
            Self::COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_task_log).transpose()
    }

    /// List logs for a task, newest first
    pub async fn list_by_task_id(
        &self,
        task_id: &TaskId,
        params: &PageParams,
    ) -> Result<Vec<TaskLog>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {} FROM task_logs
            WHERE task_id = $1
            ORDER BY start_time DESC
            LIMIT $2 OFFSET $3
            ",
            Self::COLUMNS
        ))
        .bind(task_id)
        .bind(params.page_size())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_task_log).collect()
    }

    /// Most recent `n` logs for a task
    pub async fn latest_by_task_id(&self, task_id: &TaskId, n: i64) -> Result<Vec<TaskLog>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {} FROM task_logs
            WHERE task_id = $1
            ORDER BY start_time DESC
            LIMIT $2
            ",
            Self::COLUMNS
        ))
        .bind(task_id)
        .bind(n)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_task_log).collect()
    }

    /// The currently running log row for a task, if any
    pub async fn get_running_by_task_id(&self, task_id: &TaskId) -> Result<Option<TaskLog>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {} FROM task_logs
            WHERE task_id = $1 AND status = $2
            ORDER BY start_time DESC
            LIMIT 1
            ",
            Self::COLUMNS
        ))
        .bind(task_id)
        .bind(TaskStatus::Running.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_task_log).transpose()
    }

    /// Delete all logs belonging to a task
    pub async fn delete_by_task_id(&self, task_id: &TaskId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM task_logs WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Completed executions within the range
    pub async fn success_count(&self, range: StatsRange) -> Result<i64> {
        self.count_by_status(TaskStatus::Completed, range).await
    }

    /// Failed executions within the range
    pub async fn failed_count(&self, range: StatsRange) -> Result<i64> {
        self.count_by_status(TaskStatus::Failed, range).await
    }

    async fn count_by_status(&self, status: TaskStatus, range: StatsRange) -> Result<i64> {
        let since = range.since(Utc::now());
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM task_logs WHERE status = $1 AND start_time >= $2",
        )
        .bind(status.to_string())
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Counter sums within the range
    pub async fn file_processing_stats(&self, range: StatsRange) -> Result<FileProcessingStats> {
        let since = range.since(Utc::now());
        let row = sqlx::query(
            r"
            SELECT COALESCE(SUM(total_file), 0)::BIGINT AS total_file,
                   COALESCE(SUM(generated_file), 0)::BIGINT AS generated_file,
                   COALESCE(SUM(skip_file), 0)::BIGINT AS skip_file,
                   COALESCE(SUM(metadata_downloaded), 0)::BIGINT AS metadata_downloaded,
                   COALESCE(SUM(subtitle_downloaded), 0)::BIGINT AS subtitle_downloaded,
                   COALESCE(SUM(failed_count), 0)::BIGINT AS failed_count
            FROM task_logs
            WHERE start_time >= $1
            ",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(FileProcessingStats {
            total_file: row.try_get("total_file")?,
            generated_file: row.try_get("generated_file")?,
            skip_file: row.try_get("skip_file")?,
            metadata_downloaded: row.try_get("metadata_downloaded")?,
            subtitle_downloaded: row.try_get("subtitle_downloaded")?,
            failed_count: row.try_get("failed_count")?,
        })
    }
}

fn row_to_task_log(row: sqlx::postgres::PgRow) -> Result<TaskLog> {
    let status: String = row.try_get("status")?;

    Ok(TaskLog {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        status: status
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid task status: {e}")))?,
        message: row.try_get("message")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        duration: row.try_get("duration")?,
        total_file: row.try_get("total_file")?,
        generated_file: row.try_get("generated_file")?,
        skip_file: row.try_get("skip_file")?,
        overwrite_file: row.try_get("overwrite_file")?,
        metadata_count: row.try_get("metadata_count")?,
        subtitle_count: row.try_get("subtitle_count")?,
        metadata_downloaded: row.try_get("metadata_downloaded")?,
        subtitle_downloaded: row.try_get("subtitle_downloaded")?,
        failed_count: row.try_get("failed_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
