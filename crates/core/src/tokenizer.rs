//! Token counting.
//!
//! The session window budgets by token count, so every session pins one
//! tokenizer/model pairing for its lifetime. Counting must be deterministic
//! for a given `(text, model)`.

/// Converts text to a model token count.
pub trait Tokenizer: Send + Sync {
    /// A short identifier (e.g., "heuristic", "whitespace", "hf").
    fn name(&self) -> &str;

    /// Count the tokens `text` occupies for `model`.
    fn count_tokens(&self, text: &str, model: &str) -> usize;
}

/// Character-based estimate: ~4 characters per token, rounded up.
///
/// Accurate within ~10% for BPE tokenizers on English text and needs no
/// vocabulary files. The model id is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenizer;

impl Tokenizer for HeuristicTokenizer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn count_tokens(&self, text: &str, _model: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        text.len().div_ceil(4)
    }
}

/// One token per whitespace-separated word.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenizer;

impl Tokenizer for WhitespaceTokenizer {
    fn name(&self) -> &str {
        "whitespace"
    }

    fn count_tokens(&self, text: &str, _model: &str) -> usize {
        text.split_whitespace().count()
    }
}
