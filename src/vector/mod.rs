//! Vector index storage for document embeddings.
//!
//! This module provides the unified [`VectorStore`] trait that abstracts over
//! storage backends, plus the document/embedding types the indexer writes and
//! the retriever reads. The indexer is the only writer; the retriever only
//! queries; that read/write separation is the consistency boundary between
//! the content corpus and live retrieval.
//!
//! # Supported backends
//!
//! - [`memory::InMemoryVectorStore`]: process-local map with cosine ranking,
//!   suitable for single-node deployments and tests. Remote backends plug in
//!   behind the same trait and surface outages as
//!   [`VectorStoreError::Unavailable`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EmbeddingVersion, SourceType};

pub use memory::InMemoryVectorStore;

/// A unit of indexed text content.
///
/// Immutable once embedded; re-indexing replaces the document wholesale.
/// At most one live document exists per `(source_type, source_id, chunk)`;
/// the indexer derives `id` deterministically from those parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_type: SourceType,
    pub source_id: String,
    pub text: String,
    pub embedding_version: EmbeddingVersion,
    pub updated_at: DateTime<Utc>,
}

/// A fixed-length vector attached 1:1 to a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub version: EmbeddingVersion,
}

impl Embedding {
    pub fn new(vector: Vec<f32>, version: EmbeddingVersion) -> Self {
        Self { vector, version }
    }

    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// One ranked retrieval match.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievalHit {
    pub document: Document,
    pub score: f32,
}

/// Ranked retrieval matches, best first, length ≤ the requested `k`.
pub type RetrievalResult = Vec<RetrievalHit>;

/// Errors surfaced by vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// The supplied vector's length does not match the store's dimension.
    /// This is a programmer/configuration error and fails fast.
    #[error("embedding dimension mismatch: store expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The supplied vector was produced under a different embedding version;
    /// vectors of mismatched versions are never compared.
    #[error("embedding version mismatch: store expects {expected}, got {actual}")]
    VersionMismatch {
        expected: EmbeddingVersion,
        actual: EmbeddingVersion,
    },

    /// The backing storage is unreachable. Callers must propagate this rather
    /// than treat it as an empty result.
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent nearest-neighbor index over document embeddings.
///
/// `query` ranks by cosine similarity; ties break by most recent
/// `updated_at` first, then ascending `document_id`, so results are
/// deterministic. `upsert` of an existing id is atomic: readers never
/// observe a partially written vector.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or fully replace the entry for `document.id`.
    async fn upsert(
        &self,
        document: Document,
        embedding: Embedding,
    ) -> Result<(), VectorStoreError>;

    /// Remove a single document. Returns whether it existed.
    async fn delete(&self, document_id: &str) -> Result<bool, VectorStoreError>;

    /// Remove every chunk document derived from one source object.
    ///
    /// Returns the number of documents removed. Keeps a re-chunked source
    /// from stranding stale chunks in the index.
    async fn delete_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<usize, VectorStoreError>;

    /// Rank the `k` nearest documents to `embedding`.
    ///
    /// An empty result is a valid outcome, distinct from
    /// [`VectorStoreError::Unavailable`].
    async fn query(&self, embedding: &Embedding, k: usize)
    -> Result<RetrievalResult, VectorStoreError>;

    /// Remove every entry. Destructive; callers confirm explicitly.
    async fn clear(&self) -> Result<(), VectorStoreError>;

    /// Number of live entries.
    async fn count(&self) -> Result<usize, VectorStoreError>;
}
