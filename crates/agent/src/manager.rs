//! Memory manager: the one component callers talk to.
//!
//! Combines the session registry, the summarizer, and the long-term store.
//! Every mutation of a session runs under that session's mutex, held across
//! the whole operation including store I/O. The registry map lock is only
//! held for lookups.
//!
//! Window and store are kept consistent at-least-once: a turn lands in the
//! window first, then sits in the session's pending queue until its record
//! is upserted. Record ids are content hashes, so replays never duplicate.

use serde::Serialize;
use std::sync::Arc;
use threadmind_config::AppConfig;
use threadmind_core::embedding::Embedder;
use threadmind_core::error::MemoryError;
use threadmind_core::provider::Provider;
use threadmind_core::store::{LongTermStore, MemoryRecord, MetadataFilter};
use threadmind_core::tokenizer::Tokenizer;
use threadmind_core::turn::{SessionId, Turn, TurnRole};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::registry::{Session, SessionHandle, SessionRegistry, WindowSettings};
use crate::retry::RetryPolicy;
use crate::summarizer::Summarizer;

/// Tunables for a [`MemoryManager`].
#[derive(Debug, Clone)]
pub struct MemorySettings {
    /// Model id used for token counting and summaries.
    pub chat_model: String,
    pub embedding_model: String,
    pub max_sliding_tokens: usize,
    pub summary_trigger_tokens: usize,
    pub keep_recent_turns: usize,
    pub summary_max_tokens: u32,
    pub top_k: usize,
}

impl MemorySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chat_model: config.provider.chat_model.clone(),
            embedding_model: config.provider.embedding_model.clone(),
            max_sliding_tokens: config.memory.max_sliding_tokens,
            summary_trigger_tokens: config.memory.summary_trigger_tokens,
            keep_recent_turns: config.memory.keep_recent_turns,
            summary_max_tokens: config.memory.summary_max_tokens,
            top_k: config.memory.top_k,
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Result of a successful [`MemoryManager::record_turn`].
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub turn: Turn,

    /// Store writes that landed during this call, including replays of
    /// turns left pending by earlier failures.
    pub flushed: usize,
}

/// What the caller should send along with a turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssembledContext {
    /// The session window, oldest first.
    pub recent: Vec<Turn>,

    /// Stored content most similar to the query, most similar first.
    pub retrieved: Vec<String>,

    /// True when recall failed and `retrieved` is empty because of it.
    pub recall_degraded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    /// Records deleted from the store, or `None` when the prune failed.
    pub pruned: Option<usize>,
}

pub struct MemoryManager {
    registry: SessionRegistry,
    summarizer: Summarizer,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn LongTermStore>,
    settings: MemorySettings,
    retry: RetryPolicy,
}

impl MemoryManager {
    pub fn new(
        settings: MemorySettings,
        tokenizer: Arc<dyn Tokenizer>,
        provider: Arc<dyn Provider>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn LongTermStore>,
    ) -> Self {
        let registry = SessionRegistry::new(WindowSettings {
            tokenizer,
            model: settings.chat_model.clone(),
            max_sliding_tokens: settings.max_sliding_tokens,
        });
        let summarizer = Summarizer::new(
            provider,
            settings.chat_model.clone(),
            settings.summary_max_tokens,
            settings.summary_trigger_tokens,
        );

        Self {
            registry,
            summarizer,
            embedder,
            store,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy for embedding, store, and summary calls.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.summarizer = self.summarizer.with_retry(retry.clone());
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &MemorySettings {
        &self.settings
    }

    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Return the session for `session_id`, creating it if unseen.
    pub async fn get_or_create(&self, session_id: &SessionId) -> SessionHandle {
        self.registry.get_or_create(session_id).await
    }

    /// Append a turn to the window, then embed and upsert it.
    ///
    /// The window is updated even when this returns `Err`; the failed write
    /// stays queued (if transient) and is replayed by the next
    /// `record_turn` or [`flush_pending`](Self::flush_pending).
    pub async fn record_turn(
        &self,
        session_id: &SessionId,
        role: TurnRole,
        content: impl Into<String>,
    ) -> Result<RecordOutcome, MemoryError> {
        let mut session = self.lock_live(session_id).await;

        let turn = session.window.append(role, content);
        session.pending.push_back(turn.clone());

        let flushed = self.flush_locked(session_id, &mut session).await?;
        debug!(session_id = %session_id, role = %role, flushed, "Recorded turn");
        Ok(RecordOutcome { turn, flushed })
    }

    /// Retry store writes left pending by earlier failures. Never touches the window.
    pub async fn flush_pending(&self, session_id: &SessionId) -> Result<usize, MemoryError> {
        let mut session = self
            .lock_existing(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;
        self.flush_locked(session_id, &mut session).await
    }

    /// Lock the live session for `session_id`, creating it if unseen.
    ///
    /// A handle that was cleared while we waited on its lock is closed and
    /// no longer registered, so the id is resolved again.
    async fn lock_live(&self, session_id: &SessionId) -> OwnedMutexGuard<Session> {
        loop {
            let session = self.registry.get_or_create(session_id).await.lock_owned().await;
            if !session.closed {
                return session;
            }
            debug!(session_id = %session_id, "Session cleared while waiting; resolving again");
        }
    }

    /// Like [`lock_live`](Self::lock_live) but never creates a session.
    async fn lock_existing(&self, session_id: &SessionId) -> Option<OwnedMutexGuard<Session>> {
        loop {
            let session = self.registry.get(session_id).await?.lock_owned().await;
            if !session.closed {
                return Some(session);
            }
        }
    }

    /// Persist pending turns oldest first, stopping at the first failure.
    ///
    /// A turn is removed from the queue only after its upsert succeeds or
    /// fails terminally, so a cancelled call leaves it queued.
    async fn flush_locked(
        &self,
        session_id: &SessionId,
        session: &mut Session,
    ) -> Result<usize, MemoryError> {
        let mut flushed = 0;
        while let Some(turn) = session.pending.front().cloned() {
            match self.persist(session_id, &turn).await {
                Ok(()) => {
                    session.pending.pop_front();
                    flushed += 1;
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        session_id = %session_id,
                        pending = session.pending.len(),
                        error = %e,
                        "Store write failed; turn kept for retry"
                    );
                    return Err(e);
                }
                Err(e) => {
                    session.pending.pop_front();
                    warn!(
                        session_id = %session_id,
                        error = %e,
                        "Store write failed terminally; turn will not be retried"
                    );
                    return Err(e);
                }
            }
        }
        Ok(flushed)
    }

    /// Embed a turn and upsert it as a memory record.
    async fn persist(&self, session_id: &SessionId, turn: &Turn) -> Result<(), MemoryError> {
        let model = self.settings.embedding_model.as_str();
        let vector = self
            .retry
            .run("embed", move || self.embedder.embed(&turn.content, model))
            .await
            .map_err(MemoryError::Embedding)?;

        let record = MemoryRecord::from_turn(session_id.as_str(), turn, vector);
        self.retry
            .run("upsert", move || self.store.upsert(record.clone()))
            .await?;
        Ok(())
    }

    /// True when the session's window is over the summary trigger.
    pub async fn needs_summary(&self, session_id: &SessionId) -> bool {
        match self.registry.get(session_id).await {
            Some(handle) => self.summarizer.needs_summary(&handle.lock().await.window),
            None => false,
        }
    }

    /// Summarize and truncate the window if it is over the trigger.
    ///
    /// On success the summary is persisted with role `summary`, appended to
    /// the window, and the window is cut to its last `keep_recent_turns`.
    /// Any failure leaves the window untouched and returns
    /// [`MemoryError::CompactionSkipped`].
    pub async fn maybe_compact(&self, session_id: &SessionId) -> Result<Option<String>, MemoryError> {
        let Some(mut session) = self.lock_existing(session_id).await else {
            return Ok(None);
        };

        if !self.summarizer.needs_summary(&session.window) {
            return Ok(None);
        }

        let summary = match self.summarizer.summarize(&session.window).await {
            Ok(Some(summary)) => summary,
            Ok(None) => return Ok(None),
            Err(e) => return Err(compaction_skipped(session_id, e)),
        };

        let turn = Turn::new(TurnRole::Summary, summary.clone());
        if let Err(e) = self.persist(session_id, &turn).await {
            return Err(compaction_skipped(session_id, e));
        }

        session.window.push(turn);
        let dropped = session.window.truncate_to(self.settings.keep_recent_turns);
        info!(
            session_id = %session_id,
            dropped,
            remaining = session.window.len(),
            "Compacted session window"
        );
        Ok(Some(summary))
    }

    /// Gather the window plus similar stored content for `query_text`.
    ///
    /// Never fails: a recall error yields an empty `retrieved` with
    /// `recall_degraded` set. `top_k` defaults to the configured value.
    pub async fn assemble_context(
        &self,
        session_id: &SessionId,
        query_text: &str,
        top_k: Option<usize>,
    ) -> AssembledContext {
        let recent = self.recent(session_id).await;
        let top_k = top_k.unwrap_or(self.settings.top_k);

        if query_text.trim().is_empty() || top_k == 0 {
            return AssembledContext {
                recent,
                ..Default::default()
            };
        }

        match self.recall(session_id, query_text, top_k).await {
            Ok(retrieved) => AssembledContext {
                recent,
                retrieved,
                recall_degraded: false,
            },
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Recall failed; continuing on window only");
                AssembledContext {
                    recent,
                    retrieved: Vec::new(),
                    recall_degraded: true,
                }
            }
        }
    }

    async fn recall(
        &self,
        session_id: &SessionId,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<String>, MemoryError> {
        let model = self.settings.embedding_model.as_str();
        let vector = self
            .retry
            .run("embed", move || self.embedder.embed(query_text, model))
            .await
            .map_err(MemoryError::Embedding)?;

        let filter = MetadataFilter::session(session_id.as_str());
        let (vector, filter) = (&vector, &filter);
        let records = self
            .retry
            .run("query", move || self.store.query(vector, top_k, filter))
            .await?;

        Ok(records
            .into_iter()
            // A store that ignores the filter must not leak other sessions.
            .filter(|r| r.metadata.session_id == session_id.as_str())
            .map(|r| r.metadata.content)
            .collect())
    }

    /// Discard the session's window and prune its stored records.
    ///
    /// Fails with [`MemoryError::SessionNotFound`] for an unknown id. A
    /// failed prune is logged and reported as `pruned: None`.
    ///
    /// The session lock is held across the prune and the registry removal,
    /// so a turn arriving meanwhile lands in a fresh session after the
    /// delete and its record survives.
    pub async fn clear_session(&self, session_id: &SessionId) -> Result<ClearOutcome, MemoryError> {
        let mut session = self
            .lock_existing(session_id)
            .await
            .ok_or_else(|| MemoryError::SessionNotFound(session_id.to_string()))?;

        session.window.clear();
        session.pending.clear();

        let pruned = match self
            .store
            .delete(&MetadataFilter::session(session_id.as_str()))
            .await
        {
            Ok(n) => Some(n),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Failed to prune stored records");
                None
            }
        };

        session.closed = true;
        self.registry.remove(session_id).await;
        drop(session);

        info!(session_id = %session_id, pruned = ?pruned, "Cleared session");
        Ok(ClearOutcome { pruned })
    }

    /// The session's window, oldest first. Empty for unknown sessions.
    pub async fn recent(&self, session_id: &SessionId) -> Vec<Turn> {
        match self.registry.get(session_id).await {
            Some(handle) => handle.lock().await.window.recent(),
            None => Vec::new(),
        }
    }

    pub async fn total_tokens(&self, session_id: &SessionId) -> usize {
        match self.registry.get(session_id).await {
            Some(handle) => handle.lock().await.window.total_tokens(),
            None => 0,
        }
    }

    pub async fn pending_writes(&self, session_id: &SessionId) -> usize {
        match self.registry.get(session_id).await {
            Some(handle) => handle.lock().await.pending_writes(),
            None => 0,
        }
    }

    pub async fn has_session(&self, session_id: &SessionId) -> bool {
        self.registry.contains(session_id).await
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }
}

fn compaction_skipped(session_id: &SessionId, source: MemoryError) -> MemoryError {
    warn!(session_id = %session_id, error = %source, "Compaction skipped");
    MemoryError::CompactionSkipped {
        session_id: session_id.to_string(),
        source: Box::new(source),
    }
}
