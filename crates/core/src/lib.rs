//! # Threadmind Core
//!
//! Domain types, capability traits, and error definitions for the Threadmind
//! conversation memory manager. This crate has **no framework dependencies**;
//! it defines the model every other crate implements against.
//!
//! ## Capabilities
//!
//! The memory manager consumes four external capabilities, each defined as a
//! trait here and implemented elsewhere:
//! - [`Tokenizer`]: text → token count for a model
//! - [`Embedder`]: text → fixed-dimension vector
//! - [`LongTermStore`]: filterable nearest-neighbour index of [`MemoryRecord`]s
//! - [`Provider`]: chat completion (whole-response or streaming) and embeddings

pub mod error;
pub mod message;
pub mod turn;
pub mod provider;
pub mod tokenizer;
pub mod embedding;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, FailureClass, MemoryError, ProviderError, Result, StoreError};
pub use message::{Message, Role};
pub use turn::{SessionId, Turn, TurnRole};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use tokenizer::{HeuristicTokenizer, Tokenizer, WhitespaceTokenizer};
pub use embedding::{Embedder, HashEmbedder, ProviderEmbedder};
pub use store::{LongTermStore, MemoryRecord, MetadataFilter, RecordMetadata, UpsertOutcome};
