//! Embedding function boundary.
//!
//! The embedding model itself is an external collaborator; this module only
//! fixes its contract: [`Embedder`] maps text to a fixed-length vector tagged
//! with a version, deterministically for identical `(text, version)`.
//!
//! [`HashEmbedder`] is the bundled implementation: a hashed bag-of-tokens
//! projection. It needs no model weights, is fully deterministic, and gives
//! lexically overlapping texts a positive similarity, which is enough for
//! tests, the administrative CLI, and model-less single-process deployments.

use async_trait::async_trait;
use rustc_hash::FxHasher;
use std::hash::Hasher;
use thiserror::Error;

use crate::types::EmbeddingVersion;
use crate::vector::Embedding;

/// Errors from the external embedding function.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The embedding service is unreachable or timed out.
    #[error("embedding function unavailable: {0}")]
    Unavailable(String),
}

/// Text → fixed-length vector, tagged with the producing model version.
///
/// Implementations must be deterministic for identical input and version;
/// the indexer relies on that for idempotent re-runs.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Version tag attached to produced vectors.
    fn version(&self) -> EmbeddingVersion;

    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError>;
}

/// Deterministic hashed bag-of-tokens embedder.
///
/// Each lowercased alphanumeric token is hashed into one of `dimension`
/// buckets with a sign bit, weighted by its length so function words
/// ("is", "a", "the") cannot outweigh content-word overlap; the accumulated
/// vector is L2-normalized. Texts sharing content tokens therefore score
/// positive cosine similarity, while the whole mapping stays byte-stable
/// across runs.
#[derive(Clone, Debug)]
pub struct HashEmbedder {
    dimension: usize,
    version: EmbeddingVersion,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;
    pub const DEFAULT_VERSION: &'static str = "hash-v1";

    pub fn new(dimension: usize, version: EmbeddingVersion) -> Self {
        Self {
            dimension: dimension.max(1),
            version,
        }
    }

    fn project(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let weight = token.chars().count() as f32;
            let mut hasher = FxHasher::default();
            hasher.write(token.as_bytes());
            let hash = hasher.finish();
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign * weight;
        }
        let norm = vector.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            for v in &mut vector {
                *v = (f64::from(*v) / norm) as f32;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_DIMENSION,
            EmbeddingVersion::new(Self::DEFAULT_VERSION),
        )
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn version(&self) -> EmbeddingVersion {
        self.version.clone()
    }

    async fn embed(&self, text: &str) -> Result<Embedding, EmbedError> {
        Ok(Embedding::new(self.project(text), self.version.clone()))
    }
}
