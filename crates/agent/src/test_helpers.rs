//! Shared test doubles for memory-manager and chat tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use threadmind_core::error::{ProviderError, StoreError};
use threadmind_core::message::Message;
use threadmind_core::provider::{
    Provider, ProviderRequest, ProviderResponse, StreamChunk, StreamReceiver,
};
use threadmind_core::store::{LongTermStore, MemoryRecord, MetadataFilter, UpsertOutcome};
use threadmind_memory::InMemoryStore;

/// Returns scripted replies in order and records every request.
pub struct ScriptedProvider {
    responses: Mutex<Vec<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_text(&self, request: ProviderRequest) -> Result<String, ProviderError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("script exhausted at call {index}")))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let text = self.next_text(request)?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model,
        })
    }

    /// Streams the scripted reply one word at a time.
    async fn stream(&self, request: ProviderRequest) -> Result<StreamReceiver, ProviderError> {
        let text = self.next_text(request)?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            for piece in text.split_inclusive(' ') {
                let _ = tx
                    .send(Ok(StreamChunk {
                        content: Some(piece.to_string()),
                        done: false,
                        usage: None,
                    }))
                    .await;
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    content: None,
                    done: true,
                    usage: None,
                }))
                .await;
        });
        Ok(rx)
    }
}

/// Always fails with the configured error.
pub struct FailingProvider {
    error: ProviderError,
}

impl FailingProvider {
    pub fn terminal() -> Self {
        Self {
            error: ProviderError::AuthenticationFailed("bad key".into()),
        }
    }

    pub fn transient() -> Self {
        Self {
            error: ProviderError::Network("connection reset".into()),
        }
    }
}

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(self.error.clone())
    }
}

/// An in-memory store that can be told to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    upsert_failures: AtomicUsize,
    queries_down: AtomicBool,
    deletes_down: AtomicBool,
    pub upsert_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` upserts with a transient error.
    pub fn fail_next_upserts(&self, n: usize) {
        self.upsert_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_queries_down(&self, down: bool) {
        self.queries_down.store(down, Ordering::SeqCst);
    }

    pub fn set_deletes_down(&self, down: bool) {
        self.deletes_down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl LongTermStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn upsert(&self, record: MemoryRecord) -> Result<UpsertOutcome, StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.upsert_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.upsert_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.inner.upsert(record).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        if self.queries_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.inner.query(vector, top_k, filter).await
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        if self.deletes_down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.inner.delete(filter).await
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, StoreError> {
        self.inner.count(filter).await
    }
}
