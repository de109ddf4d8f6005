//! Summarizer: decides when a window is due for compaction and compresses
//! it into a short memory note.
//!
//! Neither method mutates the window or the store; the memory manager
//! persists the summary and truncates the window.

use std::sync::Arc;
use threadmind_core::error::MemoryError;
use threadmind_core::message::Message;
use threadmind_core::provider::{Provider, ProviderRequest};
use threadmind_core::ProviderError;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::window::SessionWindow;

/// System instruction sent with every summarization request.
pub const SUMMARY_INSTRUCTION: &str = "Summarize the following conversation into a short memory note. \
Capture the facts, preferences, and commitments the assistant should remember about the user. \
Reply with the summary only.";

pub struct Summarizer {
    provider: Arc<dyn Provider>,
    model: String,
    max_tokens: u32,
    trigger_tokens: usize,
    retry: RetryPolicy,
}

impl Summarizer {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        max_tokens: u32,
        trigger_tokens: usize,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            trigger_tokens,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn trigger_tokens(&self) -> usize {
        self.trigger_tokens
    }

    /// True when the window's token total is strictly above the trigger.
    pub fn needs_summary(&self, window: &SessionWindow) -> bool {
        window.total_tokens() > self.trigger_tokens
    }

    /// Generate a summary of the whole window.
    ///
    /// Returns `Ok(None)` only for an empty window. A failed or empty
    /// generation is a [`MemoryError::Generation`].
    pub async fn summarize(&self, window: &SessionWindow) -> Result<Option<String>, MemoryError> {
        if window.is_empty() {
            return Ok(None);
        }

        let transcript = window.transcript();
        debug!(turns = window.len(), model = %self.model, "Requesting summary");

        let response = self
            .retry
            .run("summarize", move || {
                let request = ProviderRequest::new(
                    self.model.clone(),
                    vec![
                        Message::system(SUMMARY_INSTRUCTION),
                        Message::user(transcript.clone()),
                    ],
                )
                .with_max_tokens(self.max_tokens)
                .with_temperature(0.0);
                self.provider.complete(request)
            })
            .await
            .map_err(MemoryError::Generation)?;

        let summary = response.message.content.trim().to_string();
        if summary.is_empty() {
            return Err(MemoryError::Generation(ProviderError::InvalidResponse(
                "summary was empty".into(),
            )));
        }
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, ScriptedProvider};
    use threadmind_core::tokenizer::WhitespaceTokenizer;
    use threadmind_core::turn::TurnRole;

    fn window() -> SessionWindow {
        SessionWindow::new(Arc::new(WhitespaceTokenizer), "m", 100)
    }

    #[test]
    fn trigger_is_strictly_greater_than() {
        let summarizer = Summarizer::new(Arc::new(ScriptedProvider::new(vec![])), "m", 50, 4);
        let mut w = window();
        w.append(TurnRole::User, "one two three four");
        assert!(!summarizer.needs_summary(&w));
        w.append(TurnRole::Assistant, "five");
        assert!(summarizer.needs_summary(&w));
    }

    #[tokio::test]
    async fn empty_window_yields_none() {
        let provider = Arc::new(ScriptedProvider::new(vec!["unused"]));
        let summarizer = Summarizer::new(provider.clone(), "m", 50, 4);
        assert_eq!(summarizer.summarize(&window()).await.unwrap(), None);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn sends_transcript_and_trims_output() {
        let provider = Arc::new(ScriptedProvider::new(vec!["  User lives in Lisbon.\n"]));
        let summarizer = Summarizer::new(provider.clone(), "m", 50, 4);

        let mut w = window();
        w.append(TurnRole::User, "I live in Lisbon");
        w.append(TurnRole::Assistant, "Lovely city");

        let summary = summarizer.summarize(&w).await.unwrap();
        assert_eq!(summary.as_deref(), Some("User lives in Lisbon."));

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages[0].content, SUMMARY_INSTRUCTION);
        assert_eq!(
            request.messages[1].content,
            "user: I live in Lisbon\nassistant: Lovely city"
        );
        assert_eq!(request.max_tokens, Some(50));
        // window untouched
        assert_eq!(w.len(), 2);
    }

    #[tokio::test]
    async fn generation_failure_is_an_error() {
        let summarizer = Summarizer::new(
            Arc::new(FailingProvider::terminal()),
            "m",
            50,
            4,
        );
        let mut w = window();
        w.append(TurnRole::User, "hello");
        let err = summarizer.summarize(&w).await.unwrap_err();
        assert!(matches!(err, MemoryError::Generation(_)));
    }

    #[tokio::test]
    async fn blank_generation_is_an_error() {
        let summarizer = Summarizer::new(Arc::new(ScriptedProvider::new(vec!["   "])), "m", 50, 4);
        let mut w = window();
        w.append(TurnRole::User, "hello");
        assert!(summarizer.summarize(&w).await.is_err());
    }
}
