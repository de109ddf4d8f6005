//! Provider implementations for Threadmind.
//!
//! All chat backends implement the `threadmind_core::Provider` trait.
//! The router builds the provider, embedder, and tokenizer selected by
//! configuration.

#[cfg(feature = "local")]
pub mod hf_tokenizer;
pub mod openai_compat;
pub mod router;

#[cfg(feature = "local")]
pub use hf_tokenizer::HfTokenizer;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{build_embedder, build_from_config, build_tokenizer};
