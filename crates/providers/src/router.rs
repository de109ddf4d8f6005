//! Capability wiring: builds the provider, embedder, and tokenizer named
//! in configuration.

use std::sync::Arc;
use std::time::Duration;
use threadmind_config::AppConfig;
use threadmind_core::embedding::{Embedder, HashEmbedder, ProviderEmbedder};
use threadmind_core::error::Error;
use threadmind_core::provider::Provider;
use threadmind_core::tokenizer::{HeuristicTokenizer, Tokenizer, WhitespaceTokenizer};
use tracing::warn;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the text-generation provider from configuration.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let provider_config = &config.provider;
    let name = provider_config.name.as_str();

    let api_key = provider_config.api_key.clone().unwrap_or_else(|| {
        if name != "ollama" {
            warn!(provider = name, "No API key configured; requests will likely be rejected");
        }
        String::new()
    });
    let base_url = provider_config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(name));

    Arc::new(OpenAiCompatProvider::with_timeout(
        name,
        base_url,
        api_key,
        Duration::from_secs(provider_config.timeout_secs),
    ))
}

/// Build the embedder named by `memory.embedder`.
pub fn build_embedder(config: &AppConfig, provider: Arc<dyn Provider>) -> Arc<dyn Embedder> {
    match config.memory.embedder.as_str() {
        "hash" => Arc::new(HashEmbedder::new(config.memory.hash_dimensions)),
        _ => Arc::new(ProviderEmbedder::new(provider)),
    }
}

/// Build the tokenizer named by `memory.tokenizer`.
///
/// `hf:<path>` loads a HuggingFace `tokenizer.json` (requires the `local` feature).
pub fn build_tokenizer(config: &AppConfig) -> Result<Arc<dyn Tokenizer>, Error> {
    let kind = config.memory.tokenizer.as_str();
    match kind {
        "heuristic" => Ok(Arc::new(HeuristicTokenizer)),
        "whitespace" => Ok(Arc::new(WhitespaceTokenizer)),
        #[cfg(feature = "local")]
        other if other.starts_with("hf:") => {
            let path = &other["hf:".len()..];
            let tokenizer = crate::hf_tokenizer::HfTokenizer::from_file(path)?;
            Ok(Arc::new(tokenizer))
        }
        other => Err(Error::Config {
            message: format!("unsupported tokenizer '{other}'"),
        }),
    }
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "https://api.openai.com/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn embedder_selection() {
        let mut config = AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(build_embedder(&config, provider.clone()).name(), "openai");

        config.memory.embedder = "hash".into();
        assert_eq!(build_embedder(&config, provider).name(), "hash");
    }

    #[test]
    fn tokenizer_selection() {
        let mut config = AppConfig::default();
        assert_eq!(build_tokenizer(&config).unwrap().name(), "heuristic");

        config.memory.tokenizer = "whitespace".into();
        assert_eq!(build_tokenizer(&config).unwrap().name(), "whitespace");

        config.memory.tokenizer = "tiktoken".into();
        assert!(build_tokenizer(&config).is_err());
    }
}
