//! Session window: the bounded, ordered turn buffer of one conversation.
//!
//! Eviction is budget-aware and strictly oldest-first. The window always
//! keeps its newest turn, even when that turn alone exceeds the budget.

use std::collections::VecDeque;
use std::sync::Arc;
use threadmind_core::tokenizer::Tokenizer;
use threadmind_core::turn::{Turn, TurnRole};

/// Turn buffer with a token budget.
///
/// The tokenizer and model id are fixed when the window is created, so
/// every count over the session's lifetime uses the same pairing.
pub struct SessionWindow {
    turns: VecDeque<Turn>,
    tokenizer: Arc<dyn Tokenizer>,
    model: String,
    max_tokens: usize,
}

impl SessionWindow {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, model: impl Into<String>, max_tokens: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            tokenizer,
            model: model.into(),
            max_tokens,
        }
    }

    /// Append a new turn stamped now, then evict. Returns the new turn.
    pub fn append(&mut self, role: TurnRole, content: impl Into<String>) -> Turn {
        let turn = Turn::new(role, content);
        self.push(turn.clone());
        turn
    }

    /// Append an existing turn, then evict. Returns the evicted turns, oldest first.
    pub fn push(&mut self, turn: Turn) -> Vec<Turn> {
        self.turns.push_back(turn);
        self.evict()
    }

    /// Drop oldest turns while over budget, never below one turn.
    fn evict(&mut self) -> Vec<Turn> {
        let mut total = self.total_tokens();
        let mut evicted = Vec::new();

        while total > self.max_tokens && self.turns.len() > 1 {
            let Some(oldest) = self.turns.pop_front() else {
                break;
            };
            total = total.saturating_sub(self.count(&oldest));
            evicted.push(oldest);
        }

        if !evicted.is_empty() {
            tracing::debug!(
                evicted = evicted.len(),
                remaining = self.turns.len(),
                total,
                "Evicted turns from session window"
            );
        }
        evicted
    }

    fn count(&self, turn: &Turn) -> usize {
        self.tokenizer.count_tokens(&turn.content, &self.model)
    }

    /// Token total of the current window, recounted on every call.
    pub fn total_tokens(&self) -> usize {
        self.turns.iter().map(|t| self.count(t)).sum()
    }

    /// Keep only the last `keep` turns. Returns how many were dropped.
    pub fn truncate_to(&mut self, keep: usize) -> usize {
        let excess = self.turns.len().saturating_sub(keep);
        self.turns.drain(..excess);
        excess
    }

    /// Snapshot of the window, oldest first.
    pub fn recent(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// The model id token counts are computed for.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// `role: content` lines, oldest first.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(Turn::transcript_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
