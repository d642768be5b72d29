//! Run registry
//!
//! Keeps every submitted run's configuration and last known outcome in the
//! `ingestion_runs` table. Status queries read from here, and runs still
//! marked `RUNNING` at startup are re-dispatched from here.

use chrono::{DateTime, Utc};
use ferry_common::protocol::{ChunkingMode, FileType};
use ferry_common::{FerryError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use super::progress::db_error;
use super::run::{RunConfig, RunStatus, RunSummary};

/// A run as stored in the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub config: RunConfig,
    pub status: RunStatus,
    pub chunks_sent: u64,
    pub records_sent: u64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RunRegistry {
    pool: SqlitePool,
}

impl RunRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a run, or reset an existing row with the same id to `RUNNING`
    pub async fn register(&self, config: &RunConfig) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO ingestion_runs (
                ingestion_id, file_id, source_path, file_type, callback_url,
                chunking_mode, chunking_value, status, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'RUNNING', ?8, ?8)
            ON CONFLICT(ingestion_id) DO UPDATE SET
                source_path = excluded.source_path,
                file_type = excluded.file_type,
                callback_url = excluded.callback_url,
                chunking_mode = excluded.chunking_mode,
                chunking_value = excluded.chunking_value,
                status = 'RUNNING',
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config.ingestion_id)
        .bind(&config.file_id)
        .bind(&config.source)
        .bind(config.file_type.as_str())
        .bind(&config.callback_url)
        .bind(config.chunking.kind())
        .bind(config.chunking.value() as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    /// Record how a run ended
    pub async fn finish(
        &self,
        ingestion_id: &str,
        status: RunStatus,
        summary: &RunSummary,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE ingestion_runs
            SET status = ?2, chunks_sent = chunks_sent + ?3, records_sent = ?4,
                last_error = ?5, updated_at = ?6
            WHERE ingestion_id = ?1
            "#,
        )
        .bind(ingestion_id)
        .bind(status.as_str())
        .bind(summary.chunks_sent as i64)
        .bind(summary.total_records as i64)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    pub async fn get(&self, ingestion_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT ingestion_id, file_id, source_path, file_type, callback_url,
                   chunking_mode, chunking_value, status, chunks_sent, records_sent,
                   last_error, created_at, updated_at
            FROM ingestion_runs WHERE ingestion_id = ?1
            "#,
        )
        .bind(ingestion_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|row| run_from_row(&row)).transpose()
    }

    /// Runs left `RUNNING`, oldest first
    pub async fn list_running(&self) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ingestion_id, file_id, source_path, file_type, callback_url,
                   chunking_mode, chunking_value, status, chunks_sent, records_sent,
                   last_error, created_at, updated_at
            FROM ingestion_runs WHERE status = 'RUNNING'
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter().map(run_from_row).collect()
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FerryError::Database(format!("Invalid timestamp {}: {}", value, e)))
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let file_type: String = row.get("file_type");
    let mode: String = row.get("chunking_mode");
    let value: i64 = row.get("chunking_value");

    let config = RunConfig {
        ingestion_id: row.get("ingestion_id"),
        file_id: row.get("file_id"),
        source: row.get("source_path"),
        file_type: file_type.parse::<FileType>()?,
        callback_url: row.get("callback_url"),
        chunking: ChunkingMode::from_parts(&mode, value.max(0) as u64)?,
    };

    Ok(RunRecord {
        config,
        status: RunStatus::from(row.get::<String, _>("status")),
        chunks_sent: row.get::<i64, _>("chunks_sent").max(0) as u64,
        records_sent: row.get::<i64, _>("records_sent").max(0) as u64,
        last_error: row.get("last_error"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
    })
}
