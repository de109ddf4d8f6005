//! No-op store: disables long-term memory entirely.

use async_trait::async_trait;
use threadmind_core::error::StoreError;
use threadmind_core::store::{LongTermStore, MemoryRecord, MetadataFilter, UpsertOutcome};

/// A store that accepts every write and recalls nothing.
pub struct NoopStore;

#[async_trait]
impl LongTermStore for NoopStore {
    fn name(&self) -> &str {
        "none"
    }

    async fn upsert(&self, _record: MemoryRecord) -> Result<UpsertOutcome, StoreError> {
        Ok(UpsertOutcome { upserted: 0 })
    }

    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _filter: &MetadataFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _filter: &MetadataFilter) -> Result<usize, StoreError> {
        Ok(0)
    }

    async fn count(&self, _filter: &MetadataFilter) -> Result<usize, StoreError> {
        Ok(0)
    }
}
