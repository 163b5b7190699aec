//! Content indexing: source enumeration → chunking → embedding → upsert.
//!
//! The [`Indexer`] is the only writer to the vector store. It runs either
//! from the administrative command or a scheduled job, converts published
//! source objects into chunk documents, embeds them, and upserts the result.
//! A failure to embed one object never aborts the run; it is collected into
//! the [`IndexReport`] while successes still commit.

pub mod chunk;
pub mod source;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ChatConfig;
use crate::embeddings::Embedder;
use crate::types::{IndexScope, SourceType};
use crate::vector::{Document, VectorStore, VectorStoreError};

pub use chunk::chunk_text;
pub use source::{ContentSource, JsonContentSource, SourceError, SourceRecord};

/// Fatal indexing errors that abort the run.
///
/// Per-object embedding failures are not here; those land in
/// [`IndexReport::failures`] while the run continues.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("content source failed: {0}")]
    Source(#[from] SourceError),
    #[error("vector store failed: {0}")]
    Store(#[from] VectorStoreError),
}

/// One source object that failed to index.
#[derive(Clone, Debug)]
pub struct IndexFailure {
    pub source_type: SourceType,
    pub source_id: String,
    pub reason: String,
}

/// Summary of one indexing run.
#[derive(Clone, Debug)]
pub struct IndexReport {
    pub scope: IndexScope,
    pub cleared: bool,
    pub started_at: DateTime<Utc>,
    /// Documents (chunks) upserted, per source type, in [`SourceType::ALL`] order.
    pub indexed_by_type: Vec<(SourceType, usize)>,
    /// Stale chunk documents removed before re-upserting their sources.
    pub removed: usize,
    pub failures: Vec<IndexFailure>,
}

impl IndexReport {
    pub fn indexed_total(&self) -> usize {
        self.indexed_by_type.iter().map(|(_, n)| n).sum()
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "indexed {} documents (scope: {}, cleared: {})",
            self.indexed_total(),
            self.scope,
            self.cleared
        )?;
        for (ty, count) in &self.indexed_by_type {
            writeln!(f, "  {}: {count}", ty.plural())?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "  failures: {}", self.failures.len())?;
            for failure in &self.failures {
                writeln!(
                    f,
                    "    {} {}: {}",
                    failure.source_type, failure.source_id, failure.reason
                )?;
            }
        }
        Ok(())
    }
}

/// Converts source content into embedded chunk documents in the vector store.
pub struct Indexer {
    source: Arc<dyn ContentSource>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunk_max_chars: usize,
    chunk_overlap_chars: usize,
}

impl Indexer {
    pub fn new(
        source: Arc<dyn ContentSource>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            source,
            embedder,
            store,
            chunk_max_chars: config.chunk_max_chars,
            chunk_overlap_chars: config.chunk_overlap_chars,
        }
    }

    /// Deterministic id for one chunk of one source object.
    fn document_id(source_type: SourceType, source_id: &str, chunk_index: usize) -> String {
        format!("{source_type}:{source_id}:{chunk_index}")
    }

    /// Index published content for `scope`.
    ///
    /// `clear` wipes the whole store first, a destructive opt-in, never a
    /// default. Re-running against unchanged content is idempotent: chunk
    /// bodies are byte-identical, so embeddings come out unchanged.
    pub async fn index_content(
        &self,
        scope: IndexScope,
        clear: bool,
    ) -> Result<IndexReport, IndexError> {
        let started_at = Utc::now();
        if clear {
            warn!(%scope, "clearing vector store before indexing");
            self.store.clear().await?;
        }

        let mut indexed_by_type = Vec::new();
        let mut removed = 0usize;
        let mut failures = Vec::new();

        for &source_type in scope.source_types() {
            let records = self.source.list_published(source_type).await?;
            let mut indexed = 0usize;
            for record in records {
                match self.index_record(source_type, &record).await {
                    Ok((upserted, stale_removed)) => {
                        indexed += upserted;
                        removed += stale_removed;
                    }
                    Err(RecordError::Skipped(reason)) => {
                        warn!(%source_type, source_id = %record.id, %reason, "skipping source object");
                        failures.push(IndexFailure {
                            source_type,
                            source_id: record.id.clone(),
                            reason,
                        });
                    }
                    Err(RecordError::Fatal(err)) => return Err(err),
                }
            }
            info!(%source_type, indexed, "indexed source type");
            indexed_by_type.push((source_type, indexed));
        }

        Ok(IndexReport {
            scope,
            cleared: clear,
            started_at,
            indexed_by_type,
            removed,
            failures,
        })
    }

    /// Chunk, embed, and upsert one source object.
    ///
    /// Returns `(chunks upserted, stale chunks removed)`.
    async fn index_record(
        &self,
        source_type: SourceType,
        record: &SourceRecord,
    ) -> Result<(usize, usize), RecordError> {
        let chunks = chunk_text(&record.text, self.chunk_max_chars, self.chunk_overlap_chars);
        if chunks.is_empty() {
            return Err(RecordError::Skipped("empty text".into()));
        }

        // Embed everything before touching the store so an embedding failure
        // leaves the previous version of the source intact.
        let mut embedded = Vec::with_capacity(chunks.len());
        for (chunk_index, text) in chunks.into_iter().enumerate() {
            let embedding = self
                .embedder
                .embed(&text)
                .await
                .map_err(|err| RecordError::Skipped(err.to_string()))?;
            embedded.push((chunk_index, text, embedding));
        }

        let stale_removed = self
            .store
            .delete_source(source_type, &record.id)
            .await
            .map_err(|err| RecordError::Fatal(err.into()))?;

        let upserted = embedded.len();
        for (chunk_index, text, embedding) in embedded {
            let document = Document {
                id: Self::document_id(source_type, &record.id, chunk_index),
                source_type,
                source_id: record.id.clone(),
                text,
                embedding_version: embedding.version.clone(),
                updated_at: record.updated_at,
            };
            self.store
                .upsert(document, embedding)
                .await
                .map_err(|err| RecordError::Fatal(err.into()))?;
        }
        Ok((upserted, stale_removed))
    }
}

enum RecordError {
    /// Per-object failure; recorded and the run continues.
    Skipped(String),
    /// Store-level failure; aborts the run.
    Fatal(IndexError),
}
