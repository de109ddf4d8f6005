//! In-memory store, useful for testing and ephemeral deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use threadmind_core::error::StoreError;
use threadmind_core::store::{LongTermStore, MemoryRecord, MetadataFilter, UpsertOutcome};
use tokio::sync::RwLock;

use crate::vector::rank_by_similarity;

#[derive(Default)]
struct Index {
    records: HashMap<String, MemoryRecord>,
    /// Vector width fixed by the first upsert.
    dimensions: Option<usize>,
}

/// A store that keeps records in a map keyed by record id.
/// Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    index: Arc<RwLock<Index>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose vector width is fixed up front.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            index: Arc::new(RwLock::new(Index {
                records: HashMap::new(),
                dimensions: Some(dimensions),
            })),
        }
    }

    /// The pinned vector width, if any record has been written.
    pub async fn dimensions(&self) -> Option<usize> {
        self.index.read().await.dimensions
    }
}

#[async_trait]
impl LongTermStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
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

        let mut index = self.index.write().await;
        match index.dimensions {
            Some(expected) if expected != record.vector.len() => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: record.vector.len(),
                });
            }
            Some(_) => {}
            None => index.dimensions = Some(record.vector.len()),
        }

        index.records.insert(record.id.clone(), record);
        Ok(UpsertOutcome { upserted: 1 })
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let index = self.index.read().await;
        let Some(expected) = index.dimensions else {
            return Ok(Vec::new());
        };
        if expected != vector.len() {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let candidates = index
            .records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .cloned();
        Ok(rank_by_similarity(candidates, vector, top_k))
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        let mut index = self.index.write().await;
        let before = index.records.len();
        index.records.retain(|_, r| !filter.matches(&r.metadata));
        Ok(before - index.records.len())
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        let index = self.index.read().await;
        Ok(index
            .records
            .values()
            .filter(|r| filter.matches(&r.metadata))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadmind_core::turn::{Turn, TurnRole};

    fn record(session: &str, content: &str, vector: Vec<f32>) -> MemoryRecord {
        MemoryRecord::from_turn(session, &Turn::new(TurnRole::User, content), vector)
    }

    #[tokio::test]
    async fn upsert_and_query() {
        let store = InMemoryStore::new();
        store.upsert(record("s1", "likes tea", vec![1.0, 0.0])).await.unwrap();
        store.upsert(record("s1", "likes trains", vec![0.0, 1.0])).await.unwrap();

        let results = store
            .query(&[1.0, 0.1], 1, &MetadataFilter::session("s1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.content, "likes tea");
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn identical_content_upserts_once() {
        let store = InMemoryStore::new();
        store.upsert(record("s1", "same", vec![1.0, 0.0])).await.unwrap();
        store.upsert(record("s1", "same", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.count(&MetadataFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn filter_applies_before_ranking() {
        let store = InMemoryStore::new();
        store.upsert(record("s1", "mine", vec![0.0, 1.0])).await.unwrap();
        // Perfect match, wrong session.
        store.upsert(record("s2", "theirs", vec![1.0, 0.0])).await.unwrap();

        let results = store
            .query(&[1.0, 0.0], 5, &MetadataFilter::session("s1"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.session_id, "s1");
    }

    #[tokio::test]
    async fn dimension_is_pinned_by_first_write() {
        let store = InMemoryStore::new();
        store.upsert(record("s1", "a", vec![1.0, 0.0])).await.unwrap();
        assert_eq!(store.dimensions().await, Some(2));

        let err = store.upsert(record("s1", "b", vec![1.0, 0.0, 0.0])).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { expected: 2, actual: 3 }
        ));

        let err = store
            .query(&[1.0], 3, &MetadataFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn empty_vector_is_rejected() {
        let store = InMemoryStore::with_dimensions(4);
        let err = store.upsert(record("s1", "a", vec![])).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn query_on_empty_store_returns_nothing() {
        let store = InMemoryStore::new();
        let results = store
            .query(&[1.0, 2.0], 5, &MetadataFilter::session("s1"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn delete_by_session() {
        let store = InMemoryStore::new();
        store.upsert(record("s1", "a", vec![1.0])).await.unwrap();
        store.upsert(record("s1", "b", vec![1.0])).await.unwrap();
        store.upsert(record("s2", "c", vec![1.0])).await.unwrap();

        assert_eq!(store.delete(&MetadataFilter::session("s1")).await.unwrap(), 2);
        assert_eq!(store.delete(&MetadataFilter::session("s1")).await.unwrap(), 0);
        assert_eq!(store.count(&MetadataFilter::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn store_name() {
        assert_eq!(InMemoryStore::new().name(), "in_memory");
    }
}
