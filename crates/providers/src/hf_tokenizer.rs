//! Exact token counts from a HuggingFace `tokenizer.json`.

use std::path::Path;
use threadmind_core::error::Error;
use threadmind_core::tokenizer::{HeuristicTokenizer, Tokenizer};
use tracing::{info, warn};

/// A [`Tokenizer`] backed by the `tokenizers` crate.
///
/// The vocabulary file is loaded once; the model argument to
/// [`Tokenizer::count_tokens`] is ignored because the file already pins it.
pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| Error::Config {
            message: format!("Failed to load tokenizer from {}: {e}", path.display()),
        })?;
        info!(path = %path.display(), "Loaded HuggingFace tokenizer");
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        "hf"
    }

    fn count_tokens(&self, text: &str, model: &str) -> usize {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.len(),
            Err(e) => {
                warn!(error = %e, "Tokenizer failed to encode, falling back to estimate");
                HeuristicTokenizer.count_tokens(text, model)
            }
        }
    }
}
