//! Progress store
//!
//! Durable record of the highest acknowledged chunk per ingestion run. The
//! engine reads it once when a run starts and writes it after every positive
//! acknowledgement, so an interrupted run resumes right after the last chunk
//! the consumer confirmed.
//!
//! The store is shared by concurrent runs and must be safe under concurrent
//! writers for distinct ids. A write never moves `last_chunk` backwards.
//!
//! Chunk numbers depend on the chunk boundaries, so the cursor also keeps the
//! [`ChunkingMode`] of the first acknowledgement it saw.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use ferry_common::protocol::ChunkingMode;
use ferry_common::{FerryError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

/// Persisted progress status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProgressStatus::InProgress => "IN_PROGRESS",
            ProgressStatus::Completed => "COMPLETED",
        }
    }
}

impl From<String> for ProgressStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "COMPLETED" => ProgressStatus::Completed,
            _ => ProgressStatus::InProgress,
        }
    }
}

/// Where a run stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCursor {
    /// Highest acknowledged chunk, `-1` when none
    pub last_chunk: i64,
    pub total_records: u64,
    pub status: ProgressStatus,
    /// Boundaries `last_chunk` was counted under, `None` before any ack
    #[serde(default)]
    pub chunking: Option<ChunkingMode>,
}

impl ProgressCursor {
    /// Whether this cursor can be applied to a run chunked by `mode`
    pub fn matches(&self, mode: &ChunkingMode) -> bool {
        self.last_chunk < 0 || self.chunking.as_ref().map_or(true, |stored| stored == mode)
    }
}

impl Default for ProgressCursor {
    fn default() -> Self {
        Self {
            last_chunk: -1,
            total_records: 0,
            status: ProgressStatus::InProgress,
            chunking: None,
        }
    }
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Cursor for `ingestion_id`, or `None` if nothing was ever recorded
    async fn load(&self, ingestion_id: &str) -> Result<Option<ProgressCursor>>;

    /// Record an acknowledged chunk. Ignored when `chunk_number` is not
    /// greater than the stored `last_chunk`. The first recorded `chunking`
    /// sticks.
    async fn record_ack(
        &self,
        ingestion_id: &str,
        chunking: &ChunkingMode,
        chunk_number: i64,
        total_records: u64,
    ) -> Result<()>;

    /// Mark the run completed with its final record count
    async fn mark_completed(&self, ingestion_id: &str, total_records: u64) -> Result<()>;
}

pub(crate) fn db_error(e: sqlx::Error) -> FerryError {
    FerryError::Database(e.to_string())
}

/// Open (creating if needed) and migrate the sqlite database at `url`
pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(db_error)?
        .create_if_missing(true);

    // Every in-memory connection is its own database; pin a single one.
    let pool = if url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
    } else {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
    }
    .map_err(db_error)?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| FerryError::Database(format!("Migration failed: {}", e)))?;

    Ok(pool)
}

/// sqlite-backed store over the `ingestion_state` table
#[derive(Debug, Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn load(&self, ingestion_id: &str) -> Result<Option<ProgressCursor>> {
        let row = sqlx::query(
            r#"
            SELECT last_chunk, total_records, status, chunking_mode, chunking_value
            FROM ingestion_state WHERE ingestion_id = ?1
            "#,
        )
        .bind(ingestion_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mode: Option<String> = row.get("chunking_mode");
        let value: Option<i64> = row.get("chunking_value");
        let chunking = match (mode, value) {
            (Some(mode), Some(value)) => Some(ChunkingMode::from_parts(&mode, value.max(0) as u64)?),
            _ => None,
        };

        Ok(Some(ProgressCursor {
            last_chunk: row.get("last_chunk"),
            total_records: row.get::<i64, _>("total_records").max(0) as u64,
            status: ProgressStatus::from(row.get::<String, _>("status")),
            chunking,
        }))
    }

    async fn record_ack(
        &self,
        ingestion_id: &str,
        chunking: &ChunkingMode,
        chunk_number: i64,
        total_records: u64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_state
                (ingestion_id, last_chunk, total_records, status, chunking_mode, chunking_value)
            VALUES (?1, ?2, ?3, 'IN_PROGRESS', ?4, ?5)
            ON CONFLICT(ingestion_id) DO UPDATE SET
                last_chunk = excluded.last_chunk,
                total_records = excluded.total_records,
                chunking_mode = COALESCE(ingestion_state.chunking_mode, excluded.chunking_mode),
                chunking_value = COALESCE(ingestion_state.chunking_value, excluded.chunking_value)
            WHERE excluded.last_chunk > ingestion_state.last_chunk
            "#,
        )
        .bind(ingestion_id)
        .bind(chunk_number)
        .bind(total_records as i64)
        .bind(chunking.kind())
        .bind(chunking.value() as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn mark_completed(&self, ingestion_id: &str, total_records: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_state (ingestion_id, total_records, status)
            VALUES (?1, ?2, 'COMPLETED')
            ON CONFLICT(ingestion_id) DO UPDATE SET
                total_records = excluded.total_records,
                status = 'COMPLETED'
            "#,
        )
        .bind(ingestion_id)
        .bind(total_records as i64)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }
}

/// In-process store for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    cursors: Mutex<HashMap<String, ProgressCursor>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a cursor, as if an earlier run had progressed this far
    pub fn seed(&self, ingestion_id: &str, cursor: ProgressCursor) {
        self.lock().insert(ingestion_id.to_string(), cursor);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProgressCursor>> {
        self.cursors.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn load(&self, ingestion_id: &str) -> Result<Option<ProgressCursor>> {
        Ok(self.lock().get(ingestion_id).cloned())
    }

    async fn record_ack(
        &self,
        ingestion_id: &str,
        chunking: &ChunkingMode,
        chunk_number: i64,
        total_records: u64,
    ) -> Result<()> {
        let mut cursors = self.lock();
        let cursor = cursors.entry(ingestion_id.to_string()).or_default();
        if chunk_number > cursor.last_chunk {
            cursor.last_chunk = chunk_number;
            cursor.total_records = total_records;
            cursor.chunking.get_or_insert(*chunking);
        }
        Ok(())
    }

    async fn mark_completed(&self, ingestion_id: &str, total_records: u64) -> Result<()> {
        let mut cursors = self.lock();
        let cursor = cursors.entry(ingestion_id.to_string()).or_default();
        cursor.total_records = total_records;
        cursor.status = ProgressStatus::Completed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODE: ChunkingMode = ChunkingMode::Records(25);

    async fn sqlite_store() -> SqliteProgressStore {
        SqliteProgressStore::new(connect("sqlite::memory:", 1).await.unwrap())
    }

    async fn exercise_store(store: &dyn ProgressStore) {
        assert_eq!(store.load("run-a").await.unwrap(), None);

        store.record_ack("run-a", &MODE, 0, 25).await.unwrap();
        store.record_ack("run-a", &MODE, 1, 50).await.unwrap();
        let cursor = store.load("run-a").await.unwrap().unwrap();
        assert_eq!(cursor.last_chunk, 1);
        assert_eq!(cursor.total_records, 50);
        assert_eq!(cursor.status, ProgressStatus::InProgress);
        assert_eq!(cursor.chunking, Some(MODE));

        // A stale write never rolls the cursor back
        store.record_ack("run-a", &MODE, 0, 25).await.unwrap();
        assert_eq!(store.load("run-a").await.unwrap().unwrap().last_chunk, 1);

        store.mark_completed("run-a", 60).await.unwrap();
        let cursor = store.load("run-a").await.unwrap().unwrap();
        assert_eq!(cursor.status, ProgressStatus::Completed);
        assert_eq!(cursor.total_records, 60);
        assert_eq!(cursor.last_chunk, 1);

        // Ids are independent
        assert_eq!(store.load("run-b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store() {
        exercise_store(&sqlite_store().await).await;
    }

    #[tokio::test]
    async fn test_memory_store() {
        exercise_store(&MemoryProgressStore::new()).await;
    }

    #[tokio::test]
    async fn test_completing_unknown_run_creates_row() {
        let store = sqlite_store().await;
        store.mark_completed("empty-run", 0).await.unwrap();

        let cursor = store.load("empty-run").await.unwrap().unwrap();
        assert_eq!(cursor.last_chunk, -1);
        assert_eq!(cursor.status, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());

        {
            let store = SqliteProgressStore::new(connect(&url, 2).await.unwrap());
            store.record_ack("run", &MODE, 3, 100).await.unwrap();
        }

        let store = SqliteProgressStore::new(connect(&url, 2).await.unwrap());
        let cursor = store.load("run").await.unwrap().unwrap();
        assert_eq!(cursor.last_chunk, 3);
        assert_eq!(cursor.total_records, 100);
        assert_eq!(cursor.chunking, Some(MODE));
    }

    async fn exercise_chunking_sticks(store: &dyn ProgressStore) {
        store.record_ack("run", &ChunkingMode::Records(10), 2, 30).await.unwrap();
        store.record_ack("run", &ChunkingMode::Records(25), 3, 100).await.unwrap();

        let cursor = store.load("run").await.unwrap().unwrap();
        assert_eq!(cursor.last_chunk, 3);
        assert_eq!(cursor.chunking, Some(ChunkingMode::Records(10)));
        assert!(cursor.matches(&ChunkingMode::Records(10)));
        assert!(!cursor.matches(&ChunkingMode::Records(25)));
        assert!(!cursor.matches(&ChunkingMode::Bytes(10)));
    }

    #[tokio::test]
    async fn test_first_chunking_mode_sticks() {
        exercise_chunking_sticks(&sqlite_store().await).await;
        exercise_chunking_sticks(&MemoryProgressStore::new()).await;
    }

    #[test]
    fn test_empty_cursor_matches_any_mode() {
        let cursor = ProgressCursor::default();
        assert!(cursor.matches(&ChunkingMode::Bytes(1)));

        // Completed with nothing acknowledged
        let cursor = ProgressCursor {
            status: ProgressStatus::Completed,
            ..Default::default()
        };
        assert!(cursor.matches(&ChunkingMode::Records(1)));
    }

    #[tokio::test]
    async fn test_concurrent_writers_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("state.db").display());
        let store = std::sync::Arc::new(SqliteProgressStore::new(connect(&url, 4).await.unwrap()));

        let mut tasks = Vec::new();
        for run in 0..4 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let id = format!("run-{}", run);
                for chunk in 0..10 {
                    store.record_ack(&id, &MODE, chunk, (chunk as u64 + 1) * 10).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for run in 0..4 {
            let cursor = store.load(&format!("run-{}", run)).await.unwrap().unwrap();
            assert_eq!(cursor.last_chunk, 9);
            assert_eq!(cursor.total_records, 100);
        }
    }
}
