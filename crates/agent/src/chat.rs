//! Chat agent: one conversational turn on top of the memory manager.
//!
//! Records the user turn, assembles context, asks the provider for a reply,
//! records the reply, and compacts the window when it has grown too large.
//! Memory failures become warnings on the reply; only generation failures
//! are errors.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use threadmind_config::AppConfig;
use threadmind_core::error::{Error, ProviderError};
use threadmind_core::message::Message;
use threadmind_core::provider::{Provider, ProviderRequest};
use threadmind_core::turn::{SessionId, TurnRole};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::manager::{AssembledContext, MemoryManager};
use crate::retry::RetryPolicy;

pub const DEFAULT_PERSONA: &str = "You are a helpful assistant. \
Use what you remember about the user from earlier in the conversation when it is relevant.";

/// Heading placed above recalled memories in the system message.
pub const MEMORY_HEADER: &str = "Relevant memories from earlier in this conversation:";

const SUMMARY_HEADER: &str = "Summary of the conversation so far:";

/// Receiving half of a streamed reply. Yields text fragments in order.
pub type ReplyStream = mpsc::Receiver<Result<String, ProviderError>>;

/// A reply in flight.
pub struct StreamedReply {
    pub fragments: ReplyStream,

    /// Resolves with the full reply, summary, and warnings once the turn
    /// is recorded. Closed without a value if the stream fails midway.
    pub done: oneshot::Receiver<ChatReply>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,

    /// Set when this turn triggered a compaction.
    pub summary: Option<String>,

    /// Non-fatal memory problems encountered during the turn.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub max_reply_tokens: u32,
    pub persona: String,
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.provider.chat_model.clone(),
            temperature: config.provider.temperature,
            max_reply_tokens: config.provider.max_reply_tokens,
            persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

pub struct ChatAgent {
    memory: Arc<MemoryManager>,
    provider: Arc<dyn Provider>,
    settings: ChatSettings,
    retry: RetryPolicy,
}

impl ChatAgent {
    pub fn new(memory: Arc<MemoryManager>, provider: Arc<dyn Provider>, settings: ChatSettings) -> Self {
        Self {
            memory,
            provider,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.settings.persona = persona.into();
        self
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn request(&self, messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest::new(self.settings.model.clone(), messages)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_reply_tokens)
    }

    /// Record the user turn and build the prompt for the reply.
    async fn prepare(
        &self,
        session_id: &SessionId,
        user_text: &str,
        warnings: &mut Vec<String>,
    ) -> Vec<Message> {
        if let Err(e) = self
            .memory
            .record_turn(session_id, TurnRole::User, user_text)
            .await
        {
            warnings.push(format!("user turn not persisted: {e}"));
        }

        let context = self.memory.assemble_context(session_id, user_text, None).await;
        if context.recall_degraded {
            warnings.push("long-term recall unavailable; replying from recent turns only".into());
        }
        debug!(
            session_id = %session_id,
            recent = context.recent.len(),
            retrieved = context.retrieved.len(),
            "Assembled context"
        );

        build_prompt(&self.settings.persona, &context)
    }

    /// Generate a whole reply for `user_text`.
    pub async fn reply(&self, session_id: &SessionId, user_text: &str) -> Result<ChatReply, Error> {
        info!(session_id = %session_id, provider = self.provider.name(), "Processing chat turn");

        let mut warnings = Vec::new();
        let messages = self.prepare(session_id, user_text, &mut warnings).await;

        let response = self
            .retry
            .run("chat", move || self.provider.complete(self.request(messages.clone())))
            .await?;

        let reply = response.message.content;
        let summary = finish_turn(&self.memory, session_id, &reply, &mut warnings).await;
        Ok(ChatReply {
            reply,
            summary,
            warnings,
        })
    }

    /// Stream a reply for `user_text`.
    ///
    /// Fragments are forwarded as they arrive. Once the provider stream
    /// ends, the concatenated reply is recorded and compaction runs, even if
    /// the receiver was dropped early. A stream that fails midway forwards
    /// the error and records nothing.
    pub async fn reply_stream(&self, session_id: &SessionId, user_text: &str) -> Result<StreamedReply, Error> {
        info!(session_id = %session_id, provider = self.provider.name(), "Processing streamed chat turn");

        let mut warnings = Vec::new();
        let messages = self.prepare(session_id, user_text, &mut warnings).await;

        let mut upstream = self
            .retry
            .run("chat stream", move || {
                let mut request = self.request(messages.clone());
                request.stream = true;
                self.provider.stream(request)
            })
            .await?;

        let (tx, rx) = mpsc::channel(64);
        let (done_tx, done_rx) = oneshot::channel();
        let memory = self.memory.clone();
        let session_id = session_id.clone();

        tokio::spawn(async move {
            let mut full = String::new();
            let mut forwarding = true;

            while let Some(item) = upstream.recv().await {
                match item {
                    Ok(chunk) => {
                        if let Some(text) = chunk.content
                            && !text.is_empty()
                        {
                            full.push_str(&text);
                            if forwarding && tx.send(Ok(text)).await.is_err() {
                                debug!(session_id = %session_id, "Stream receiver dropped; draining");
                                forwarding = false;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Reply stream failed; reply not recorded");
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let summary = finish_turn(&memory, &session_id, &full, &mut warnings).await;
            for warning in &warnings {
                warn!(session_id = %session_id, warning = %warning, "Streamed turn finished with warning");
            }
            let _ = done_tx.send(ChatReply {
                reply: full,
                summary,
                warnings,
            });
        });

        Ok(StreamedReply {
            fragments: rx,
            done: done_rx,
        })
    }
}

/// Record the assistant reply and compact if due. Returns the summary, if any.
async fn finish_turn(
    memory: &MemoryManager,
    session_id: &SessionId,
    reply: &str,
    warnings: &mut Vec<String>,
) -> Option<String> {
    if reply.trim().is_empty() {
        warn!(session_id = %session_id, "Provider returned an empty reply");
        warnings.push("provider returned an empty reply; not recorded".into());
    } else if let Err(e) = memory
        .record_turn(session_id, TurnRole::Assistant, reply)
        .await
    {
        warnings.push(format!("assistant turn not persisted: {e}"));
    }

    match memory.maybe_compact(session_id).await {
        Ok(summary) => summary,
        Err(e) => {
            warnings.push(e.to_string());
            None
        }
    }
}

/// Turn assembled context into provider messages.
///
/// The system message carries the persona, recalled memories not already
/// in the window, and any summary turns. User and assistant turns follow in
/// order.
pub fn build_prompt(persona: &str, context: &AssembledContext) -> Vec<Message> {
    let mut system = persona.to_string();

    let in_window: HashSet<&str> = context.recent.iter().map(|t| t.content.as_str()).collect();
    let memories: Vec<&str> = context
        .retrieved
        .iter()
        .map(String::as_str)
        .filter(|content| !in_window.contains(content))
        .collect();
    if !memories.is_empty() {
        system.push_str("\n\n");
        system.push_str(MEMORY_HEADER);
        for memory in memories {
            system.push_str("\n- ");
            system.push_str(memory);
        }
    }

    let summaries: Vec<&str> = context
        .recent
        .iter()
        .filter(|t| t.role == TurnRole::Summary)
        .map(|t| t.content.as_str())
        .collect();
    if !summaries.is_empty() {
        system.push_str("\n\n");
        system.push_str(SUMMARY_HEADER);
        for summary in summaries {
            system.push('\n');
            system.push_str(summary);
        }
    }

    let mut messages = vec![Message::system(system)];
    for turn in &context.recent {
        match turn.role {
            TurnRole::User => messages.push(Message::user(turn.content.clone())),
            TurnRole::Assistant => messages.push(Message::assistant(turn.content.clone())),
            TurnRole::Summary => {}
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::MemorySettings;
    use crate::test_helpers::{FailingProvider, FlakyStore, ScriptedProvider};
    use std::time::Duration;
    use threadmind_core::embedding::HashEmbedder;
    use threadmind_core::message::Role;
    use threadmind_core::tokenizer::WhitespaceTokenizer;
    use threadmind_core::turn::Turn;

    fn memory_settings(max_sliding_tokens: usize, summary_trigger_tokens: usize) -> MemorySettings {
        MemorySettings {
            chat_model: "test-model".into(),
            embedding_model: "test-embed".into(),
            max_sliding_tokens,
            summary_trigger_tokens,
            keep_recent_turns: 2,
            summary_max_tokens: 64,
            top_k: 5,
        }
    }

    fn agent(
        provider: Arc<dyn Provider>,
        store: Arc<FlakyStore>,
        settings: MemorySettings,
    ) -> ChatAgent {
        let memory = MemoryManager::new(
            settings,
            Arc::new(WhitespaceTokenizer),
            provider.clone(),
            Arc::new(HashEmbedder::new(64)),
            store,
        )
        .with_retry(RetryPolicy::no_retry());

        ChatAgent::new(
            Arc::new(memory),
            provider,
            ChatSettings {
                model: "test-model".into(),
                temperature: 0.2,
                max_reply_tokens: 128,
                persona: "You are a test assistant.".into(),
            },
        )
        .with_retry(RetryPolicy::no_retry())
    }

    #[test]
    fn prompt_folds_summaries_and_skips_duplicate_memories() {
        let context = AssembledContext {
            recent: vec![
                Turn::new(TurnRole::Summary, "User lives in Lisbon."),
                Turn::new(TurnRole::User, "what tea do I like"),
            ],
            retrieved: vec!["I like green tea".into(), "what tea do I like".into()],
            recall_degraded: false,
        };

        let messages = build_prompt("Persona.", &context);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let system = &messages[0].content;
        assert!(system.starts_with("Persona."));
        assert!(system.contains(MEMORY_HEADER));
        assert!(system.contains("- I like green tea"));
        assert!(!system.contains("- what tea do I like"));
        assert!(system.contains("User lives in Lisbon."));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "what tea do I like");
    }

    #[test]
    fn prompt_without_memories_is_just_persona_and_turns() {
        let context = AssembledContext {
            recent: vec![Turn::new(TurnRole::User, "hi"), Turn::new(TurnRole::Assistant, "hello")],
            ..Default::default()
        };
        let messages = build_prompt("Persona.", &context);
        assert_eq!(messages[0].content, "Persona.");
        assert_eq!(messages[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn reply_records_both_turns() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Hello! How can I help?"]));
        let agent = agent(provider.clone(), Arc::new(FlakyStore::new()), memory_settings(1000, 1000));
        let s1 = SessionId::from("s1");

        let reply = agent.reply(&s1, "hi there").await.unwrap();
        assert_eq!(reply.reply, "Hello! How can I help?");
        assert!(reply.summary.is_none());
        assert!(reply.warnings.is_empty());

        let recent = agent.memory().recent(&s1).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].role, TurnRole::Assistant);

        let request = provider.last_request().unwrap();
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.messages.last().unwrap().content, "hi there");
    }

    #[tokio::test]
    async fn evicted_turns_come_back_through_recall() {
        let provider = Arc::new(ScriptedProvider::new(vec!["noted", "Rex"]));
        let agent = agent(provider.clone(), Arc::new(FlakyStore::new()), memory_settings(8, 1000));
        let s1 = SessionId::from("s1");

        agent.reply(&s1, "my dog is called Rex").await.unwrap();
        agent.reply(&s1, "what is my dog called").await.unwrap();

        let system = provider.last_request().unwrap().messages[0].content.clone();
        assert!(system.contains(MEMORY_HEADER));
        assert!(system.contains("my dog is called Rex"));
    }

    #[tokio::test]
    async fn generation_failure_is_an_error_but_user_turn_stays() {
        let agent = agent(
            Arc::new(FailingProvider::terminal()),
            Arc::new(FlakyStore::new()),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        let err = agent.reply(&s1, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Provider(ProviderError::AuthenticationFailed(_))));
        assert_eq!(agent.memory().recent(&s1).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_is_not_recorded() {
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["  "])),
            Arc::new(FlakyStore::new()),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        let reply = agent.reply(&s1, "hello").await.unwrap();
        assert_eq!(reply.warnings.len(), 1);
        assert_eq!(agent.memory().recent(&s1).await.len(), 1);
    }

    #[tokio::test]
    async fn reply_reports_compaction_summary() {
        let store = Arc::new(FlakyStore::new());
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["Hi there", "User greeted the assistant."])),
            store.clone(),
            memory_settings(1000, 4),
        );
        let s1 = SessionId::from("s1");

        let reply = agent.reply(&s1, "hello hello hello").await.unwrap();
        assert_eq!(reply.summary.as_deref(), Some("User greeted the assistant."));
        let recent = agent.memory().recent(&s1).await;
        assert!(recent.len() <= 2);
        assert_eq!(recent.last().unwrap().role, TurnRole::Summary);
    }

    #[tokio::test]
    async fn memory_failures_become_warnings() {
        let store = Arc::new(FlakyStore::new());
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["sure"])),
            store.clone(),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        store.fail_next_upserts(1);
        store.set_queries_down(true);
        let reply = agent.reply(&s1, "remember this").await.unwrap();
        assert_eq!(reply.reply, "sure");
        assert_eq!(reply.warnings.len(), 2);
        // the pending user turn is flushed along with the reply
        assert_eq!(agent.memory().pending_writes(&s1).await, 0);
    }

    #[tokio::test]
    async fn stream_forwards_fragments_then_records_reply() {
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["hello there friend"])),
            Arc::new(FlakyStore::new()),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        let mut rx = agent.reply_stream(&s1, "hi").await.unwrap().fragments;
        let mut pieces = Vec::new();
        while let Some(piece) = rx.recv().await {
            pieces.push(piece.unwrap());
        }
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces.concat(), "hello there friend");

        let recent = agent.memory().recent(&s1).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "hello there friend");
    }

    #[tokio::test]
    async fn stream_records_reply_even_if_receiver_is_dropped() {
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["a long reply nobody reads"])),
            Arc::new(FlakyStore::new()),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        drop(agent.reply_stream(&s1, "hi").await.unwrap());

        for _ in 0..100 {
            if agent.memory().recent(&s1).await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let recent = agent.memory().recent(&s1).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, "a long reply nobody reads");
    }

    #[tokio::test]
    async fn stream_reports_memory_warnings_when_done() {
        let store = Arc::new(FlakyStore::new());
        let agent = agent(
            Arc::new(ScriptedProvider::new(vec!["noted"])),
            store.clone(),
            memory_settings(1000, 1000),
        );
        let s1 = SessionId::from("s1");

        store.fail_next_upserts(1);
        store.set_queries_down(true);
        let streamed = agent.reply_stream(&s1, "remember this").await.unwrap();
        drop(streamed.fragments);

        let done = streamed.done.await.unwrap();
        assert_eq!(done.reply, "noted");
        assert!(done.summary.is_none());
        assert_eq!(done.warnings.len(), 2);
        assert!(done.warnings[0].contains("user turn not persisted"));
    }
}
