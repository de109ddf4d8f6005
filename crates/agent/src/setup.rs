//! Wiring from [`AppConfig`] to a ready [`ChatAgent`].

use std::sync::Arc;
use threadmind_config::AppConfig;
use threadmind_core::error::{Error, MemoryError};
use threadmind_core::store::LongTermStore;
use threadmind_memory::{InMemoryStore, NoopStore, SqliteStore};
use threadmind_providers::{build_embedder, build_from_config, build_tokenizer};
use tracing::info;

use crate::chat::{ChatAgent, ChatSettings};
use crate::manager::{MemoryManager, MemorySettings};
use crate::retry::RetryPolicy;

/// Open the long-term store named by `memory.store`.
pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn LongTermStore>, Error> {
    match config.memory.store.as_str() {
        "sqlite" => {
            let path = config.database_path();
            let store = SqliteStore::open(&path).await.map_err(MemoryError::from)?;
            info!(path = %path.display(), "Opened SQLite memory store");
            Ok(Arc::new(store))
        }
        "in_memory" => Ok(Arc::new(InMemoryStore::new())),
        "none" => Ok(Arc::new(NoopStore)),
        other => Err(Error::Config {
            message: format!("Unknown memory store '{other}'"),
        }),
    }
}

/// Build a memory manager from config around an existing provider.
pub async fn build_memory_manager(
    config: &AppConfig,
    provider: Arc<dyn threadmind_core::provider::Provider>,
) -> Result<MemoryManager, Error> {
    let tokenizer = build_tokenizer(config)?;
    let embedder = build_embedder(config, provider.clone());
    let store = build_store(config).await?;

    info!(
        tokenizer = tokenizer.name(),
        embedder = embedder.name(),
        store = store.name(),
        "Memory manager configured"
    );

    Ok(MemoryManager::new(
        MemorySettings::from_config(config),
        tokenizer,
        provider,
        embedder,
        store,
    )
    .with_retry(RetryPolicy::from(&config.memory.retry)))
}

/// Build the full chat stack: provider, memory manager, and agent.
pub async fn build_chat_agent(config: &AppConfig) -> Result<ChatAgent, Error> {
    config
        .validate()
        .map_err(|e| Error::Config { message: e.to_string() })?;

    let provider = build_from_config(config);
    let memory = build_memory_manager(config, provider.clone()).await?;

    Ok(
        ChatAgent::new(Arc::new(memory), provider, ChatSettings::from_config(config))
            .with_retry(RetryPolicy::from(&config.memory.retry)),
    )
}
