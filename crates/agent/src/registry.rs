//! Session registry: an explicit map from session id to per-session state.
//!
//! The map lock is held only for lookup, insertion, and removal. All I/O
//! happens under the per-session mutex, so different sessions never wait
//! on each other.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use threadmind_core::tokenizer::Tokenizer;
use threadmind_core::turn::{SessionId, Turn};
use tokio::sync::{Mutex, RwLock};

use crate::window::SessionWindow;

/// Everything one session owns in process.
pub struct Session {
    pub window: SessionWindow,

    /// Turns whose long-term write has not succeeded yet, oldest first.
    pub(crate) pending: VecDeque<Turn>,

    /// Set once the session has been cleared and dropped from the registry.
    /// A holder of a stale handle must resolve the id again.
    pub(crate) closed: bool,
}

impl Session {
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Settings copied into every window at creation.
#[derive(Clone)]
pub struct WindowSettings {
    pub tokenizer: Arc<dyn Tokenizer>,
    pub model: String,
    pub max_sliding_tokens: usize,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    settings: WindowSettings,
}

impl SessionRegistry {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Return the session for `id`, creating an empty one if it is unseen.
    pub async fn get_or_create(&self, id: &SessionId) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(id) {
            return handle.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(|| {
                tracing::debug!(session_id = %id, model = %self.settings.model, "Creating session");
                Arc::new(Mutex::new(Session {
                    window: SessionWindow::new(
                        self.settings.tokenizer.clone(),
                        self.settings.model.clone(),
                        self.settings.max_sliding_tokens,
                    ),
                    pending: VecDeque::new(),
                    closed: false,
                }))
            })
            .clone()
    }

    /// Look up a session without creating it.
    pub async fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, returning its handle if it existed.
    pub async fn remove(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadmind_core::tokenizer::WhitespaceTokenizer;
    use threadmind_core::turn::TurnRole;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(WindowSettings {
            tokenizer: Arc::new(WhitespaceTokenizer),
            model: "m".into(),
            max_sliding_tokens: 100,
        })
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let registry = registry();
        let id = SessionId::from("s1");

        let a = registry.get_or_create(&id).await;
        a.lock().await.window.append(TurnRole::User, "hello");
        let b = registry.get_or_create(&id).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.lock().await.window.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn get_does_not_create() {
        let registry = registry();
        assert!(registry.get(&SessionId::from("ghost")).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn remove_then_recreate_starts_empty() {
        let registry = registry();
        let id = SessionId::from("s1");
        registry
            .get_or_create(&id)
            .await
            .lock()
            .await
            .window
            .append(TurnRole::User, "x");

        assert!(registry.remove(&id).await.is_some());
        assert!(registry.remove(&id).await.is_none());
        assert!(!registry.contains(&id).await);

        let fresh = registry.get_or_create(&id).await;
        assert!(fresh.lock().await.window.is_empty());
    }

    #[tokio::test]
    async fn sessions_lock_independently() {
        let registry = registry();
        let a = registry.get_or_create(&SessionId::from("a")).await;
        let b = registry.get_or_create(&SessionId::from("b")).await;

        let _held = a.lock().await;
        // b is not blocked by a's guard
        assert!(b.try_lock().is_ok());
    }
}
