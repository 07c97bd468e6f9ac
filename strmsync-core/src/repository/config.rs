//! Config repository for database operations

use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::ConfigEntry;
use crate::Result;

/// Config repository
#[derive(Clone, Debug)]
pub struct ConfigRepository {
    pool: PgPool,
}

impl ConfigRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get all config records
    pub async fn get_all(&self) -> Result<Vec<ConfigEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, code, name, value, created_at, updated_at
            FROM configs
            ORDER BY code
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_config).collect()
    }

    /// Get a single record by its unique code
    pub async fn get_by_code(&self, code: &str) -> Result<Option<ConfigEntry>> {
        let row = sqlx::query(
            r"
            SELECT id, code, name, value, created_at, updated_at
            FROM configs
            WHERE code = $1
            ",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_config).transpose()
    }

    /// Insert a record, or leave an existing one untouched. Used to seed
    /// defaults for known codes at boot.
    pub async fn insert_if_absent(
        &self,
        code: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r"
            INSERT INTO configs (id, code, name, value, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update a record's value by code
    pub async fn update_value(&self, code: &str, value: &str) -> Result<ConfigEntry> {
        let row = sqlx::query(
            r"
            UPDATE configs
            SET value = $1, updated_at = NOW()
            WHERE code = $2
            RETURNING id, code, name, value, created_at, updated_at
            ",
        )
        .bind(value)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        row_to_config(row)
    }
}

fn row_to_config(row: sqlx::postgres::PgRow) -> Result<ConfigEntry> {
    Ok(ConfigEntry {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        value: row.try_get("value")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
