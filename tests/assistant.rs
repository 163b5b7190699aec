mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;

use common::{
    FailingGenerator, FlakyGenerator, StubGenerator, assistant_over, indexed_rag, sample_corpus,
};
use coursechat::assistant::{AssistantEngine, AssistantError};
use coursechat::config::{ChatConfig, ContextPolicy};
use coursechat::embeddings::{EmbedError, Embedder, HashEmbedder};
use coursechat::retriever::Retriever;
use coursechat::types::{EmbeddingVersion, SessionId};
use coursechat::vector::{Embedding, InMemoryVectorStore};

fn fast_retries() -> ChatConfig {
    ChatConfig::default()
        .with_generation_attempts(2)
        .with_generation_backoff(Duration::from_millis(1))
}

#[tokio::test]
async fn answer_carries_citations_from_retrieval() {
    let config = fast_retries();
    let engine = assistant_over(&sample_corpus(), Arc::new(StubGenerator), &config).await;

    let answer = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap();
    assert!(!answer.context_missing);
    assert!(!answer.citations.is_empty());
    assert_eq!(answer.citations[0].source_id, "lesson-photo");
    assert!(!answer.body.is_empty());
}

#[tokio::test]
async fn empty_corpus_still_answers_without_flagging() {
    let config = fast_retries();
    let engine = assistant_over(&[], Arc::new(StubGenerator), &config).await;

    // Retrieval succeeded with zero hits; that is not a degraded answer.
    let answer = engine
        .answer(&SessionId::new("s1"), "anything at all")
        .await
        .unwrap();
    assert!(!answer.context_missing);
    assert!(answer.citations.is_empty());
}

/// Embedder whose queries always fail, simulating a dead embedding service.
struct DeadEmbedder {
    inner: HashEmbedder,
}

#[async_trait]
impl Embedder for DeadEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn version(&self) -> EmbeddingVersion {
        self.inner.version()
    }

    async fn embed(&self, _text: &str) -> Result<Embedding, EmbedError> {
        Err(EmbedError::Unavailable("embedding service down".into()))
    }
}

fn engine_with_dead_retrieval(config: &ChatConfig) -> AssistantEngine {
    let embedder = Arc::new(DeadEmbedder {
        inner: HashEmbedder::default(),
    });
    let store = Arc::new(InMemoryVectorStore::new(
        embedder.dimension(),
        embedder.version(),
    ));
    let retriever = Arc::new(Retriever::new(embedder, store, config));
    AssistantEngine::new(retriever, Arc::new(StubGenerator), config.clone())
}

#[tokio::test]
async fn degrade_policy_answers_without_context_and_flags_it() {
    let config = fast_retries().with_context_policy(ContextPolicy::Degrade);
    let engine = engine_with_dead_retrieval(&config);

    let answer = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap();
    assert!(answer.context_missing);
    assert!(answer.citations.is_empty());
}

#[tokio::test]
async fn fail_policy_surfaces_the_retrieval_error() {
    let config = fast_retries().with_context_policy(ContextPolicy::Fail);
    let engine = engine_with_dead_retrieval(&config);

    let err = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap_err();
    assert!(matches!(err, AssistantError::Retrieval(_)));
}

#[tokio::test]
async fn generation_retries_once_then_succeeds() {
    let config = fast_retries();
    let generator = Arc::new(FlakyGenerator::failing_first(1));
    let engine = assistant_over(&sample_corpus(), generator.clone(), &config).await;

    let answer = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap();
    assert_eq!(answer.body, "Recovered answer.");
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn generation_gives_up_after_bounded_attempts() {
    let config = fast_retries().with_generation_attempts(3);
    let engine = assistant_over(&sample_corpus(), Arc::new(FailingGenerator), &config).await;

    let err = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap_err();
    match err {
        AssistantError::GenerationUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected GenerationUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_generation_times_out_per_attempt() {
    struct SlowGenerator;

    #[async_trait]
    impl coursechat::assistant::GenerationClient for SlowGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _context: &str,
        ) -> Result<String, coursechat::assistant::GenerationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    let config = fast_retries()
        .with_generation_attempts(2)
        .with_generation_timeout(Duration::from_millis(20));
    let engine = assistant_over(&sample_corpus(), Arc::new(SlowGenerator), &config).await;

    let err = engine
        .answer(&SessionId::new("s1"), "what is photosynthesis")
        .await
        .unwrap_err();
    match err {
        AssistantError::GenerationUnavailable { attempts, reason } => {
            assert_eq!(attempts, 2);
            assert!(reason.contains("timed out"));
        }
        other => panic!("expected GenerationUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn context_budget_limits_cited_documents() {
    // Budget so small only the top document fits.
    let config = fast_retries().with_context_budget_chars(90);
    let rag = indexed_rag(&sample_corpus(), &config).await;
    let engine = AssistantEngine::new(rag.retriever, Arc::new(StubGenerator), config);

    let answer = engine
        .answer(&SessionId::new("s1"), "photosynthesis light energy cells")
        .await
        .unwrap();
    assert_eq!(answer.citations.len(), 1);
}
