//! Embedding capability: text to fixed-dimension vectors.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::ProviderError;
use crate::provider::{EmbeddingRequest, Provider};

/// Converts text to a numeric vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// A short identifier for logs.
    fn name(&self) -> &str;

    /// Embed a single text with the given model.
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Embeds through a [`Provider`]'s embedding endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>, ProviderError> {
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: model.to_string(),
                inputs: vec![text.to_string()],
            })
            .await?;

        response
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("embedding response had no vectors".into()))
    }
}

/// Deterministic feature-hashing embedder.
///
/// Lowercased alphanumeric words are hashed with SHA-256 into one of
/// `dimensions` buckets with a ±1 sign, then the vector is L2-normalised.
/// Texts sharing vocabulary land close together; no network is needed.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_text(text))
    }
}
