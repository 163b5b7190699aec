//! Query-side retrieval over the vector index.
//!
//! The [`Retriever`] embeds a query with the same embedder the indexer used
//! and delegates ranking to the store. An empty corpus or empty result set is
//! a valid outcome, distinct from a store failure.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::ChatConfig;
use crate::embeddings::{EmbedError, Embedder};
use crate::vector::{RetrievalResult, VectorStore, VectorStoreError};

#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error(transparent)]
    Embed(#[from] EmbedError),
    #[error(transparent)]
    Store(#[from] VectorStoreError),
}

/// Top-K semantic lookup over indexed documents.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    max_results: usize,
    similarity_floor: Option<f32>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            max_results: config.max_results,
            similarity_floor: config.similarity_floor,
        }
    }

    /// Retrieve up to `k` documents relevant to `query`.
    ///
    /// `k` is clamped to the configured maximum to bound downstream prompt
    /// size; hits below the similarity floor (when configured) are dropped.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, RetrieveError> {
        let k = k.min(self.max_results);
        if k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query).await?;
        let mut hits = self.store.query(&embedding, k).await?;
        if let Some(floor) = self.similarity_floor {
            hits.retain(|hit| hit.score >= floor);
        }
        debug!(k, hits = hits.len(), "retrieval complete");
        Ok(hits)
    }
}
