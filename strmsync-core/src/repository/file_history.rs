//! File history repository for database operations
//!
//! The lookup-then-update discipline lives in `upsert`: a record found by
//! hash (preferred) or by the attribute composite is updated in place, so
//! re-running a task never inserts duplicates.

use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::models::{
    FileHistory, FileHistoryId, FileType, NewFileHistory, Page, PageParams, TaskId,
    ValidationSummary,
};
use crate::{Error, Result};

/// File history repository
#[derive(Clone, Debug)]
pub struct FileHistoryRepository {
    pool: PgPool,
}

impl FileHistoryRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    const COLUMNS: &'static str = "id, task_id, task_log_id, file_name, source_path, \
         target_file_path, file_size, file_type, file_suffix, is_main_file, main_file_id, \
         hash, modified_at, created_at, updated_at";

    /// Insert a new record
    pub async fn create(&self, new: &NewFileHistory) -> Result<FileHistory> {
        let id = FileHistoryId::new();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            r"
            INSERT INTO file_histories (id, task_id, task_log_id, file_name, source_path,
                target_file_path, file_size, file_type, file_suffix, is_main_file,
                main_file_id, hash, modified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
            RETURNING {}
            ",
            Self::COLUMNS
        ))
        .bind(&id)
        .bind(&new.task_id)
        .bind(&new.task_log_id)
        .bind(&new.file_name)
        .bind(&new.source_path)
        .bind(&new.target_file_path)
        .bind(new.file_size)
        .bind(new.file_type.to_string())
        .bind(&new.file_suffix)
        .bind(new.is_main_file)
        .bind(&new.main_file_id)
        .bind(&new.hash)
        .bind(new.modified_at)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row_to_file_history(row)
    }

    /// Refresh an existing record in place
    pub async fn update_by_id(&self, id: &FileHistoryId, new: &NewFileHistory) -> Result<()> {
        sqlx::query(
            r"
            UPDATE file_histories
            SET task_id = $2, task_log_id = $3, file_name = $4, source_path = $5,
                target_file_path = $6, file_size = $7, file_type = $8, file_suffix = $9,
                is_main_file = $10, main_file_id = $11, hash = $12, modified_at = $13,
                updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id)
        .bind(&new.task_id)
        .bind(&new.task_log_id)
        .bind(&new.file_name)
        .bind(&new.source_path)
        .bind(&new.target_file_path)
        .bind(new.file_size)
        .bind(new.file_type.to_string())
        .bind(&new.file_suffix)
        .bind(new.is_main_file)
        .bind(&new.main_file_id)
        .bind(&new.hash)
        .bind(new.modified_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lookup by content hash
    pub async fn get_by_hash(&self, hash: &str) -> Result<Option<FileHistory>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM file_histories WHERE hash = $1 LIMIT 1",
            Self::COLUMNS
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_file_history).transpose()
    }

    /// Lookup by the attribute composite
    pub async fn get_by_attributes(
        &self,
        source_path: &str,
        file_name: &str,
        file_size: i64,
        file_type: FileType,
    ) -> Result<Option<FileHistory>> {
        let row = sqlx::query(&format!(
            r"
            SELECT {} FROM file_histories
            WHERE source_path = $1 AND file_name = $2 AND file_size = $3 AND file_type = $4
            LIMIT 1
            ",
            Self::COLUMNS
        ))
        .bind(source_path)
        .bind(file_name)
        .bind(file_size)
        .bind(file_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_file_history).transpose()
    }

    /// Lookup-then-update: the hash is authoritative when present, else the
    /// attribute composite. Returns the record's identity either way.
    pub async fn upsert(&self, new: &NewFileHistory) -> Result<FileHistoryId> {
        let existing = match &new.hash {
            Some(hash) => self.get_by_hash(hash).await?,
            None => None,
        };
        let existing = match existing {
            Some(found) => Some(found),
            None => {
                self.get_by_attributes(
                    &new.source_path,
                    &new.file_name,
                    new.file_size,
                    new.file_type,
                )
                .await?
            }
        };

        match existing {
            Some(found) => {
                self.update_by_id(&found.id, new).await?;
                Ok(found.id)
            }
            None => Ok(self.create(new).await?.id),
        }
    }

    /// Page of main files, newest first
    pub async fn list_main_files(&self, params: &PageParams) -> Result<Page<FileHistory>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM file_histories WHERE is_main_file = TRUE",
        )
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r"
            SELECT {} FROM file_histories
            WHERE is_main_file = TRUE
            ORDER BY updated_at DESC
            LIMIT $1 OFFSET $2
            ",
            Self::COLUMNS
        ))
        .bind(params.page_size())
        .bind(params.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(row_to_file_history)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total,
            page: params.page(),
            page_size: params.page_size(),
        })
    }

    /// Main-file records living in one source directory. Used to link
    /// companion records to their main file.
    pub async fn list_main_by_source_path(&self, source_path: &str) -> Result<Vec<FileHistory>> {
        let rows = sqlx::query(&format!(
            r"
            SELECT {} FROM file_histories
            WHERE source_path = $1 AND is_main_file = TRUE
            ORDER BY file_name
            ",
            Self::COLUMNS
        ))
        .bind(source_path)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_file_history).collect()
    }

    /// Companion records of a main file
    pub async fn get_related_by_main_id(
        &self,
        main_file_id: &FileHistoryId,
    ) -> Result<Vec<FileHistory>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM file_histories WHERE main_file_id = $1 ORDER BY file_name",
            Self::COLUMNS
        ))
        .bind(main_file_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_file_history).collect()
    }

    /// Per-type record counts
    pub async fn validation_summary(&self) -> Result<ValidationSummary> {
        let rows = sqlx::query(
            "SELECT file_type, COUNT(*)::BIGINT AS count FROM file_histories GROUP BY file_type",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut summary = ValidationSummary::default();
        for row in rows {
            let file_type: String = row.try_get("file_type")?;
            let count: i64 = row.try_get("count")?;
            summary.total += count;
            match file_type.parse::<FileType>() {
                Ok(FileType::Media) => summary.media += count,
                Ok(FileType::Metadata) => summary.metadata += count,
                Ok(FileType::Subtitle) => summary.subtitle += count,
                Ok(FileType::Other) | Err(_) => summary.other += count,
            }
        }
        Ok(summary)
    }

    /// Delete all records belonging to a task
    pub async fn delete_by_task_id(&self, task_id: &TaskId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM file_histories WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_file_history(row: sqlx::postgres::PgRow) -> Result<FileHistory> {
    let file_type: String = row.try_get("file_type")?;

    Ok(FileHistory {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        task_log_id: row.try_get("task_log_id")?,
        file_name: row.try_get("file_name")?,
        source_path: row.try_get("source_path")?,
        target_file_path: row.try_get("target_file_path")?,
        file_size: row.try_get("file_size")?,
        file_type: file_type
            .parse()
            .map_err(|e| Error::Internal(format!("Invalid file type: {e}")))?,
        file_suffix: row.try_get("file_suffix")?,
        is_main_file: row.try_get("is_main_file")?,
        main_file_id: row.try_get("main_file_id")?,
        hash: row.try_get("hash")?,
        modified_at: row.try_get("modified_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
