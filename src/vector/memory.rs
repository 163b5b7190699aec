//! Process-local vector store with cosine ranking.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{Document, Embedding, RetrievalHit, RetrievalResult, VectorStore, VectorStoreError};
use crate::types::{EmbeddingVersion, SourceType};

struct StoredEntry {
    document: Document,
    vector: Vec<f32>,
}

/// In-memory [`VectorStore`] backend.
///
/// Entries live in a single map behind an `RwLock`, which makes `upsert`
/// naturally atomic: a reader either sees the previous entry or the fully
/// replaced one. Suitable for single-process deployments; horizontally
/// scaled deployments substitute a shared backend behind the same trait.
pub struct InMemoryVectorStore {
    dimension: usize,
    version: EmbeddingVersion,
    entries: RwLock<FxHashMap<String, StoredEntry>>,
}

impl InMemoryVectorStore {
    /// Create a store for vectors of `dimension` produced under `version`.
    pub fn new(dimension: usize, version: EmbeddingVersion) -> Self {
        Self {
            dimension,
            version,
            entries: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embedding_version(&self) -> &EmbeddingVersion {
        &self.version
    }

    fn check_embedding(&self, embedding: &Embedding) -> Result<(), VectorStoreError> {
        if embedding.version != self.version {
            return Err(VectorStoreError::VersionMismatch {
                expected: self.version.clone(),
                actual: embedding.version.clone(),
            });
        }
        if embedding.dimension() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert(
        &self,
        document: Document,
        embedding: Embedding,
    ) -> Result<(), VectorStoreError> {
        self.check_embedding(&embedding)?;
        if document.embedding_version != embedding.version {
            return Err(VectorStoreError::VersionMismatch {
                expected: embedding.version.clone(),
                actual: document.embedding_version.clone(),
            });
        }
        let mut entries = self.entries.write();
        entries.insert(
            document.id.clone(),
            StoredEntry {
                document,
                vector: embedding.vector,
            },
        );
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, VectorStoreError> {
        Ok(self.entries.write().remove(document_id).is_some())
    }

    async fn delete_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<usize, VectorStoreError> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| {
            !(entry.document.source_type == source_type && entry.document.source_id == source_id)
        });
        Ok(before - entries.len())
    }

    async fn query(
        &self,
        embedding: &Embedding,
        k: usize,
    ) -> Result<RetrievalResult, VectorStoreError> {
        self.check_embedding(embedding)?;
        let entries = self.entries.read();
        let mut hits: Vec<RetrievalHit> = entries
            .values()
            .filter_map(|entry| {
                cosine_similarity(&entry.vector, &embedding.vector).map(|score| RetrievalHit {
                    document: entry.document.clone(),
                    score,
                })
            })
            .collect();
        drop(entries);

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.document.updated_at.cmp(&a.document.updated_at))
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn clear(&self) -> Result<(), VectorStoreError> {
        self.entries.write().clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.entries.read().len())
    }
}

/// Cosine similarity in f64, or `None` when either vector has zero norm.
fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let x64 = f64::from(x);
        let y64 = f64::from(y);
        dot += x64 * y64;
        norm_a += x64 * x64;
        norm_b += y64 * y64;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return None;
    }
    Some((dot / denom) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str, updated_secs: i64) -> Document {
        Document {
            id: id.into(),
            source_type: SourceType::Lesson,
            source_id: id.into(),
            text: format!("text for {id}"),
            embedding_version: EmbeddingVersion::new("test-v1"),
            updated_at: chrono::DateTime::from_timestamp(updated_secs, 0).unwrap_or_else(Utc::now),
        }
    }

    fn emb(vector: Vec<f32>) -> Embedding {
        Embedding::new(vector, EmbeddingVersion::new("test-v1"))
    }

    #[tokio::test]
    async fn query_reflects_latest_write() {
        let store = InMemoryVectorStore::new(2, EmbeddingVersion::new("test-v1"));
        store.upsert(doc("a", 10), emb(vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("b", 20), emb(vec![0.0, 1.0])).await.unwrap();

        let hits = store.query(&emb(vec![1.0, 0.0]), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "a");

        // Replacing the vector moves "a" strictly away from the query, so
        // the ranking flips immediately.
        store.upsert(doc("a", 30), emb(vec![-1.0, 0.0])).await.unwrap();
        let hits = store.query(&emb(vec![1.0, 0.0]), 1).await.unwrap();
        assert_eq!(hits[0].document.id, "b");
    }

    #[tokio::test]
    async fn ties_break_by_recency_then_id() {
        let store = InMemoryVectorStore::new(2, EmbeddingVersion::new("test-v1"));
        store.upsert(doc("old", 10), emb(vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("new", 20), emb(vec![1.0, 0.0])).await.unwrap();
        store.upsert(doc("also-new", 20), emb(vec![1.0, 0.0])).await.unwrap();

        let hits = store.query(&emb(vec![1.0, 0.0]), 3).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["also-new", "new", "old"]);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_fast() {
        let store = InMemoryVectorStore::new(3, EmbeddingVersion::new("test-v1"));
        let err = store.query(&emb(vec![1.0, 0.0]), 5).await.unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let store = InMemoryVectorStore::new(2, EmbeddingVersion::new("test-v2"));
        let err = store.query(&emb(vec![1.0, 0.0]), 5).await.unwrap_err();
        assert!(matches!(err, VectorStoreError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn delete_source_removes_all_chunks() {
        let store = InMemoryVectorStore::new(2, EmbeddingVersion::new("test-v1"));
        let mut chunk0 = doc("lesson:7:0", 10);
        chunk0.source_id = "7".into();
        let mut chunk1 = doc("lesson:7:1", 10);
        chunk1.source_id = "7".into();
        store.upsert(chunk0, emb(vec![1.0, 0.0])).await.unwrap();
        store.upsert(chunk1, emb(vec![0.0, 1.0])).await.unwrap();

        let removed = store.delete_source(SourceType::Lesson, "7").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
