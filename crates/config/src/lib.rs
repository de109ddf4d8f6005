//! Configuration loading, validation, and management for Threadmind.
//!
//! Loads configuration from `~/.threadmind/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.threadmind/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session window, compaction, and long-term store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider name ("openai", "openrouter", "ollama", or a custom label)
    #[serde(default = "default_provider")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Override the base URL (OpenAI-compatible endpoint)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Model used for replies and summaries; also pins the tokenizer
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per assistant reply
    #[serde(default = "default_max_reply_tokens")]
    pub max_reply_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_reply_tokens() -> u32 {
    256
}
fn default_timeout_secs() -> u64 {
    120
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("chat_model", &self.chat_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_reply_tokens", &self.max_reply_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_provider(),
            api_key: None,
            api_url: None,
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_reply_tokens: default_max_reply_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget of the sliding window
    #[serde(default = "default_max_sliding_tokens")]
    pub max_sliding_tokens: usize,

    /// Window total above which compaction runs
    #[serde(default = "default_summary_trigger_tokens")]
    pub summary_trigger_tokens: usize,

    /// Turns kept in the window after a successful compaction
    #[serde(default = "default_keep_recent_turns")]
    pub keep_recent_turns: usize,

    /// Max tokens the summarizer may generate
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,

    /// Records recalled from the long-term store per turn
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// "heuristic", "whitespace", or "hf:<path to tokenizer.json>"
    #[serde(default = "default_tokenizer")]
    pub tokenizer: String,

    /// "provider" (embedding endpoint) or "hash" (offline)
    #[serde(default = "default_embedder")]
    pub embedder: String,

    /// Vector width for the hash embedder
    #[serde(default = "default_hash_dimensions")]
    pub hash_dimensions: usize,

    /// "sqlite", "in_memory", or "none"
    #[serde(default = "default_store")]
    pub store: String,

    /// SQLite database path (defaults to ~/.threadmind/memory.sqlite)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_max_sliding_tokens() -> usize {
    2048
}
fn default_summary_trigger_tokens() -> usize {
    1536
}
fn default_keep_recent_turns() -> usize {
    2
}
fn default_summary_max_tokens() -> u32 {
    200
}
fn default_top_k() -> usize {
    5
}
fn default_tokenizer() -> String {
    "heuristic".into()
}
fn default_embedder() -> String {
    "provider".into()
}
fn default_hash_dimensions() -> usize {
    256
}
fn default_store() -> String {
    "sqlite".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_sliding_tokens: default_max_sliding_tokens(),
            summary_trigger_tokens: default_summary_trigger_tokens(),
            keep_recent_turns: default_keep_recent_turns(),
            summary_max_tokens: default_summary_max_tokens(),
            top_k: default_top_k(),
            tokenizer: default_tokenizer(),
            embedder: default_embedder(),
            hash_dimensions: default_hash_dimensions(),
            store: default_store(),
            database_path: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff settings for transient store/embedding failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    200
}
fn default_max_delay_ms() -> u64 {
    5_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// CORS origins; empty = same-origin only
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.threadmind/config.toml).
    ///
    /// Environment overrides:
    /// - `THREADMIND_API_KEY` then `OPENAI_API_KEY` (when no key is configured)
    /// - `THREADMIND_MODEL`: chat model
    /// - `THREADMIND_DB`: SQLite database path
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("THREADMIND_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("THREADMIND_MODEL") {
            self.provider.chat_model = model;
        }

        if let Ok(db) = std::env::var("THREADMIND_DB") {
            self.memory.database_path = Some(db);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".threadmind")
    }

    /// Resolved SQLite path for the long-term store.
    pub fn database_path(&self) -> PathBuf {
        self.memory
            .database_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| Self::config_dir().join("memory.sqlite"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let memory = &self.memory;
        if memory.max_sliding_tokens == 0 || memory.summary_trigger_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_sliding_tokens and memory.summary_trigger_tokens must be > 0".into(),
            ));
        }
        if memory.keep_recent_turns == 0 {
            return Err(ConfigError::ValidationError(
                "memory.keep_recent_turns must be > 0".into(),
            ));
        }
        if memory.top_k == 0 {
            return Err(ConfigError::ValidationError("memory.top_k must be > 0".into()));
        }
        if memory.hash_dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "memory.hash_dimensions must be > 0".into(),
            ));
        }
        if memory.retry.max_attempts == 0 || memory.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "memory.retry needs max_attempts >= 1 and backoff_multiplier >= 1.0".into(),
            ));
        }

        if !memory.tokenizer.starts_with("hf:")
            && !["heuristic", "whitespace"].contains(&memory.tokenizer.as_str())
        {
            return Err(ConfigError::ValidationError(format!(
                "memory.tokenizer must be heuristic, whitespace, or hf:<path>, got '{}'",
                memory.tokenizer
            )));
        }

        for (field, value, allowed) in [
            ("memory.embedder", &memory.embedder, &["provider", "hash"][..]),
            ("memory.store", &memory.store, &["sqlite", "in_memory", "none"][..]),
        ] {
            if !allowed.contains(&value.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "{field} must be one of {allowed:?}, got '{value}'"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
