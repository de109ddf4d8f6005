//! Long-term store contract: persistent, similarity-searchable memory.
//!
//! Records are content-addressed: the id is a stable hash of
//! `(session_id, content)`, so re-writing identical content for the same
//! session upserts instead of duplicating. Session isolation is enforced
//! at this layer by an exact-match [`MetadataFilter`] applied *before*
//! similarity ranking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::turn::{Turn, TurnRole};

/// Derive the deterministic record id for a piece of session content.
pub fn record_id(session_id: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
    hasher.update([0x1f]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted, embedded turn or summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Content-derived stable id (see [`record_id`])
    pub id: String,

    /// The embedding vector
    pub vector: Vec<f32>,

    pub metadata: RecordMetadata,

    /// Similarity score (set by query operations)
    #[serde(default)]
    pub score: f32,
}

impl MemoryRecord {
    /// Build a record for `turn` in `session_id`, deriving its id.
    pub fn from_turn(session_id: &str, turn: &Turn, vector: Vec<f32>) -> Self {
        Self {
            id: record_id(session_id, &turn.content),
            vector,
            metadata: RecordMetadata {
                session_id: session_id.to_string(),
                role: turn.role,
                content: turn.content.clone(),
                timestamp: turn.created_at,
            },
            score: 0.0,
        }
    }
}

/// Exact-match predicate over record metadata. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<TurnRole>,
}

impl MetadataFilter {
    /// Filter to one session.
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            role: None,
        }
    }

    pub fn with_role(mut self, role: TurnRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.role.is_none()
    }

    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        self.session_id
            .as_deref()
            .is_none_or(|id| id == metadata.session_id)
            && self.role.is_none_or(|role| role == metadata.role)
    }
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub upserted: usize,
}

/// The long-term store the memory manager depends on.
///
/// Implementations: SQLite, in-memory (for testing), none (no-op).
#[async_trait]
pub trait LongTermStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory", "none").
    fn name(&self) -> &str;

    /// Insert or replace a record, keyed by `record.id`.
    ///
    /// Fails with [`StoreError::DimensionMismatch`] (terminal) when the
    /// vector length disagrees with the index, and with
    /// [`StoreError::Unavailable`] (transient) on contention or outage.
    async fn upsert(&self, record: MemoryRecord) -> Result<UpsertOutcome, StoreError>;

    /// Return at most `top_k` records matching `filter`, most similar first.
    ///
    /// The filter is applied before ranking; returning a record that does
    /// not satisfy it is a contract violation.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError>;

    /// Delete every record matching `filter`. Returns how many were removed;
    /// zero matches is not an error.
    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, StoreError>;

    /// Count records matching `filter`.
    async fn count(&self, filter: &MetadataFilter) -> Result<usize, StoreError>;
}
