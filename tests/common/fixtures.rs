#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use coursechat::assistant::{AssistantEngine, GenerationClient, GenerationError};
use coursechat::config::ChatConfig;
use coursechat::embeddings::{Embedder, HashEmbedder};
use coursechat::gateway::{ConnectionGateway, OpenAccess};
use coursechat::history::InMemoryMessageStore;
use coursechat::indexing::{ContentSource, Indexer, SourceError, SourceRecord};
use coursechat::registry::SessionRegistry;
use coursechat::retriever::Retriever;
use coursechat::router::MessageRouter;
use coursechat::types::{IndexScope, SourceType};
use coursechat::vector::InMemoryVectorStore;

/// Fixed in-memory content corpus keyed by source type.
pub struct StaticContentSource {
    records: Vec<(SourceType, SourceRecord)>,
}

impl StaticContentSource {
    pub fn new(entries: &[(SourceType, &str, &str)]) -> Self {
        let now = chrono::Utc::now();
        Self {
            records: entries
                .iter()
                .map(|(ty, id, text)| {
                    (
                        *ty,
                        SourceRecord {
                            id: (*id).to_string(),
                            text: (*text).to_string(),
                            updated_at: now,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ContentSource for StaticContentSource {
    async fn list_published(&self, kind: SourceType) -> Result<Vec<SourceRecord>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|(ty, _)| *ty == kind)
            .map(|(_, record)| record.clone())
            .collect())
    }
}

/// Generation stub that always answers.
pub struct StubGenerator;

#[async_trait]
impl GenerationClient for StubGenerator {
    async fn generate(&self, _prompt: &str, context: &str) -> Result<String, GenerationError> {
        if context.is_empty() {
            Ok("I could not find course material for that.".to_string())
        } else {
            Ok("According to the course material, here is the answer.".to_string())
        }
    }
}

/// Generation stub that always fails.
pub struct FailingGenerator;

#[async_trait]
impl GenerationClient for FailingGenerator {
    async fn generate(&self, _prompt: &str, _context: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable("connection refused".into()))
    }
}

/// Fails the first `n` calls, then succeeds. Tracks total call count.
pub struct FlakyGenerator {
    failures_left: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakyGenerator {
    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(n),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl GenerationClient for FlakyGenerator {
    async fn generate(&self, _prompt: &str, _context: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            Err(GenerationError::Unavailable("transient failure".into()))
        } else {
            Ok("Recovered answer.".to_string())
        }
    }
}

/// Generator with a runtime on/off switch, for outage-and-recovery tests.
pub struct SwitchableGenerator {
    up: AtomicBool,
}

impl SwitchableGenerator {
    pub fn down() -> Arc<Self> {
        Arc::new(Self {
            up: AtomicBool::new(false),
        })
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl GenerationClient for SwitchableGenerator {
    async fn generate(&self, _prompt: &str, _context: &str) -> Result<String, GenerationError> {
        if self.up.load(Ordering::SeqCst) {
            Ok("Service restored, here is the answer.".to_string())
        } else {
            Err(GenerationError::Unavailable("service down".into()))
        }
    }
}

/// An indexed retrieval stack over a fixed corpus.
pub struct RagStack {
    pub embedder: Arc<HashEmbedder>,
    pub store: Arc<InMemoryVectorStore>,
    pub retriever: Arc<Retriever>,
}

/// Index `entries` into a fresh in-memory store and hand back the pieces.
pub async fn indexed_rag(entries: &[(SourceType, &str, &str)], config: &ChatConfig) -> RagStack {
    let embedder = Arc::new(HashEmbedder::default());
    let store = Arc::new(InMemoryVectorStore::new(
        embedder.dimension(),
        embedder.version(),
    ));
    let indexer = Indexer::new(
        Arc::new(StaticContentSource::new(entries)),
        embedder.clone(),
        store.clone(),
        config,
    );
    let report = indexer
        .index_content(IndexScope::All, false)
        .await
        .expect("indexing fixture corpus");
    assert!(report.is_clean(), "fixture corpus should index cleanly");
    let retriever = Arc::new(Retriever::new(embedder.clone(), store.clone(), config));
    RagStack {
        embedder,
        store,
        retriever,
    }
}

/// A full chat service wired together.
pub struct ChatStack {
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<InMemoryMessageStore>,
    pub router: Arc<MessageRouter>,
    pub gateway: Arc<ConnectionGateway>,
}

/// Wire up registry, router, and gateway, optionally with an assistant.
pub fn chat_stack(config: &ChatConfig, assistant: Option<Arc<AssistantEngine>>) -> ChatStack {
    let registry = Arc::new(SessionRegistry::new(config));
    let store = Arc::new(InMemoryMessageStore::new());
    let mut router = MessageRouter::new(registry.clone(), store.clone(), config);
    if let Some(engine) = assistant {
        router = router.with_assistant(engine);
    }
    let router = Arc::new(router);
    let gateway = Arc::new(ConnectionGateway::new(
        registry.clone(),
        router.clone(),
        Arc::new(OpenAccess),
        config,
    ));
    ChatStack {
        registry,
        store,
        router,
        gateway,
    }
}

/// Assistant engine over the given corpus with the given generator.
pub async fn assistant_over(
    entries: &[(SourceType, &str, &str)],
    generator: Arc<dyn GenerationClient>,
    config: &ChatConfig,
) -> Arc<AssistantEngine> {
    let rag = indexed_rag(entries, config).await;
    Arc::new(AssistantEngine::new(rag.retriever, generator, config.clone()))
}

/// A small biology-flavored corpus most tests retrieve against.
pub fn sample_corpus() -> Vec<(SourceType, &'static str, &'static str)> {
    vec![
        (
            SourceType::Lesson,
            "lesson-photo",
            "Photosynthesis converts light energy into chemical energy in plant cells.",
        ),
        (
            SourceType::Lesson,
            "lesson-cells",
            "Cell membranes regulate what enters and leaves the cell.",
        ),
        (
            SourceType::Faq,
            "faq-grading",
            "Grading is based on weekly quizzes and a final project.",
        ),
    ]
}
