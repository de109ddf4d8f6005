//! SQLite store.
//!
//! One table, `memory_records`, keyed by the content-derived record id.
//! Metadata filters run as a SQL `WHERE` clause; the surviving rows are
//! then ranked by cosine similarity in process.

use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use threadmind_core::error::StoreError;
use threadmind_core::store::{
    LongTermStore, MemoryRecord, MetadataFilter, RecordMetadata, UpsertOutcome,
};
use threadmind_core::turn::TurnRole;
use tracing::{debug, info};

/// A persistent SQLite-backed long-term store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a store from a SQLite URL or path.
    ///
    /// The database and schema are created automatically.
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Backend(format!("Invalid SQLite path: {e}")))?;
        // Every connection to ":memory:" is a separate database.
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        Self::connect(options, max_connections).await
    }

    /// Open (or create) the database file at `path`, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        Self::connect(SqliteConnectOptions::new().filename(path), 4).await
    }

    async fn connect(options: SqliteConnectOptions, max_connections: u32) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("open", e))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite long-term store initialized");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_records (
                id          TEXT PRIMARY KEY NOT NULL,
                session_id  TEXT NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                dimensions  INTEGER NOT NULL,
                embedding   BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("memory_records table", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_memory_records_session ON memory_records(session_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("session index", e))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Width of the stored vectors, fixed by the first record written.
    pub async fn dimensions(&self) -> Result<Option<usize>, StoreError> {
        let row = sqlx::query("SELECT dimensions FROM memory_records LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("dimensions", e))?;

        row.map(|r| {
            r.try_get::<i64, _>("dimensions")
                .map(|d| d as usize)
                .map_err(|e| StoreError::Backend(format!("dimensions column: {e}")))
        })
        .transpose()
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryRecord, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::Backend(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let session_id: String = row.try_get("session_id").map_err(|e| column("session_id", e))?;
        let role: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let blob: Vec<u8> = row.try_get("embedding").map_err(|e| column("embedding", e))?;

        let role = TurnRole::from_str(&role).map_err(StoreError::InvalidRecord)?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(MemoryRecord {
            id,
            vector: blob_to_embedding(&blob),
            metadata: RecordMetadata {
                session_id,
                role,
                content,
                timestamp,
            },
            score: 0.0,
        })
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Classify a sqlx failure: contention and I/O are transient, the rest terminal.
fn map_sqlx_error(context: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(format!("{context}: {e}"))
        }
        sqlx::Error::Database(db) => {
            let message = db.message().to_ascii_lowercase();
            // SQLITE_BUSY = 5, SQLITE_LOCKED = 6
            let busy = matches!(db.code().as_deref(), Some("5") | Some("6"))
                || message.contains("locked")
                || message.contains("busy");
            if busy {
                StoreError::Unavailable(format!("{context}: {e}"))
            } else {
                StoreError::Backend(format!("{context}: {e}"))
            }
        }
        _ => StoreError::Backend(format!("{context}: {e}")),
    }
}

const FILTER_CLAUSE: &str = "(?1 IS NULL OR session_id = ?1) AND (?2 IS NULL OR role = ?2)";

#[async_trait]
impl LongTermStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, record: MemoryRecord) -> Result<UpsertOutcome, StoreError> {
        if record.id.is_empty() {
            return Err(StoreError::InvalidRecord("record id is empty".into()));
        }
        if record.vector.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "record {} has an empty vector",
                record.id
            )));
        }
        if let Some(expected) = self.dimensions().await?
            && expected != record.vector.len()
        {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: record.vector.len(),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO memory_records (id, session_id, role, content, created_at, dimensions, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                role = excluded.role,
                created_at = excluded.created_at,
                dimensions = excluded.dimensions,
                embedding = excluded.embedding
            "#,
        )
        .bind(&record.id)
        .bind(&record.metadata.session_id)
        .bind(record.metadata.role.as_str())
        .bind(&record.metadata.content)
        .bind(record.metadata.timestamp.to_rfc3339())
        .bind(record.vector.len() as i64)
        .bind(embedding_to_blob(&record.vector))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert", e))?;

        debug!(id = %record.id, session_id = %record.metadata.session_id, "Upserted record");
        Ok(UpsertOutcome { upserted: 1 })
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let Some(expected) = self.dimensions().await? else {
            return Ok(Vec::new());
        };
        if expected != vector.len() {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let sql = format!(
            "SELECT id, session_id, role, content, created_at, embedding \
             FROM memory_records WHERE {FILTER_CLAUSE}"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.session_id.as_deref())
            .bind(filter.role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("query", e))?;

        let records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vector::rank_by_similarity(records, vector, top_k))
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        let sql = format!("DELETE FROM memory_records WHERE {FILTER_CLAUSE}");
        let result = sqlx::query(&sql)
            .bind(filter.session_id.as_deref())
            .bind(filter.role.map(|r| r.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete", e))?;
        Ok(result.rows_affected() as usize)
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        let sql = format!("SELECT COUNT(*) AS n FROM memory_records WHERE {FILTER_CLAUSE}");
        let row = sqlx::query(&sql)
            .bind(filter.session_id.as_deref())
            .bind(filter.role.map(|r| r.as_str()))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("count", e))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| StoreError::Backend(format!("count column: {e}")))?;
        Ok(n as usize)
    }
}
