//! Task repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::models::{CreateTaskRequest, Task, TaskId};
use crate::{Error, Result};

/// Task repository
#[derive(Clone, Debug)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const COLUMNS: &'static str = "id, name, media_type, source_path, target_path, config_type, \
         file_suffix, metadata_extensions, subtitle_extensions, download_metadata, \
         download_subtitle, overwrite, enabled, cron, running, last_run_at, created_at, updated_at";

    /// Create a new task
    pub async fn create(&self, req: &CreateTaskRequest) -> Result<Task> {
        let id = TaskId::new();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r"
            INSERT INTO tasks (id, name, media_type, source_path, target_path, config_type,
                file_suffix, metadata_extensions, subtitle_extensions, download_metadata,
                download_subtitle, overwrite, enabled, cron, running, last_run_at,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                FALSE, NULL, $15, $15)
            RETURNING {}
            ",
            Self::COLUMNS
        ))
        .bind(&id)
        .bind(&req.name)
        .bind(req.media_type.to_string())
        .bind(&req.source_path)
        .bind(&req.target_path)
        .bind(req.config_type.to_string())
        .bind(&req.file_suffix)
        .bind(&req.metadata_extensions)
        .bind(&req.subtitle_extensions)
        .bind(req.download_metadata)
        .bind(req.download_subtitle)
        .bind(req.overwrite)
        .bind(req.enabled)
        .bind(&req.cron)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_task(row)
    }

    /// Replace a task's mutable fields
    pub async fn update(&self, task: &Task) -> Result<Task> {
        let row = sqlx::query(&format!(
            r"
            UPDATE tasks
            SET name = $2, media_type = $3, source_path = $4, target_path = $5,
                config_type = $6, file_suffix = $7, metadata_extensions = $8,
                subtitle_extensions = $9, download_metadata = $10, download_subtitle = $11,
                overwrite = $12, enabled = $13, cron = $14, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            ",
            Self::COLUMNS
        ))
        .bind(&task.id)
        .bind(&task.name)
        .bind(task.media_type.to_string())
        .bind(&task.source_path)
        .bind(&task.target_path)
        .bind(task.config_type.to_string())
        .bind(&task.file_suffix)
        .bind(&task.metadata_extensions)
        .bind(&task.subtitle_extensions)
        .bind(task.download_metadata)
        .bind(task.download_subtitle)
        .bind(task.overwrite)
        .bind(task.enabled)
        .bind(&task.cron)
        .fetch_one(&self.pool)
        .await?;

        row_to_task(row)
    }

    /// Get task by ID
    pub async fn get_by_id(&self, id: &TaskId) -> Result<Option<Task>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE id = $1",
            Self::COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_task).transpose()
    }

    /// List all tasks ordered by creation time
    pub async fn list_all(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks ORDER BY created_at",
            Self::COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_task).collect()
    }

    /// Tasks eligible for scheduling at boot
    pub async fn list_enabled_with_cron(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE enabled = TRUE AND cron <> '' ORDER BY created_at",
            Self::COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_task).collect()
    }

    /// Flip the live-execution flag
    pub async fn set_running(&self, id: &TaskId, running: bool) -> Result<()> {
        sqlx::query("UPDATE tasks SET running = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(running)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Reset every task's running flag. Called once at process start; the
    /// flag is only meaningful while the owning process is alive.
    pub async fn reset_running_flags(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE tasks SET running = FALSE WHERE running = TRUE")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Record the completion time of the latest execution
    pub async fn update_last_run(&self, id: &TaskId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE tasks SET last_run_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a task
    pub async fn delete(&self, id: &TaskId) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Task not found".to_string()));
        }
        Ok(())
    }
}

fn row_to_task(row: sqlx::postgres::PgRow) -> Result<Task> {
    let media_type: String = row.try_get("media_type")?;
    let config_type: String = row.try_get("config_type")?;

    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        media_type: media_type
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid media type: {e}")))?,
        source_path: row.try_get("source_path")?,
        target_path: row.try_get("target_path")?,
        config_type: config_type
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid config type: {e}")))?,
        file_suffix: row.try_get("file_suffix")?,
        metadata_extensions: row.try_get("metadata_extensions")?,
        subtitle_extensions: row.try_get("subtitle_extensions")?,
        download_metadata: row.try_get("download_metadata")?,
        download_subtitle: row.try_get("download_subtitle")?,
        overwrite: row.try_get("overwrite")?,
        enabled: row.try_get("enabled")?,
        cron: row.try_get("cron")?,
        running: row.try_get("running")?,
        last_run_at: row.try_get("last_run_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
