//! Retrieval-augmented answering for the AI assistant participant.
//!
//! [`AssistantEngine::answer`] retrieves relevant documents, assembles a
//! bounded context (most relevant first), and invokes the external
//! generation service. The generation call is a black box behind
//! [`GenerationClient`]; retries are bounded and every failure is observable.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{ChatConfig, ContextPolicy};
use crate::message::Citation;
use crate::retriever::Retriever;
use crate::types::SessionId;
use crate::vector::RetrievalHit;

/// System framing handed to the generation service alongside each question.
const SYSTEM_PROMPT: &str = "You are the course platform's helpful assistant. \
Answer the learner's question using the provided course material when it is \
relevant, and say so plainly when it is not.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation service failed: {0}")]
    Unavailable(String),
}

/// External text-completion service boundary.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(&self, prompt: &str, context: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Error)]
pub enum AssistantError {
    /// Retrieval failed and the configured policy is [`ContextPolicy::Fail`].
    #[error("retrieval failed while answering: {0}")]
    Retrieval(String),
    /// The generation service failed or timed out on every bounded attempt.
    #[error("generation unavailable after {attempts} attempts: {reason}")]
    GenerationUnavailable { attempts: u32, reason: String },
}

/// A generated answer awaiting persistence as an assistant message.
#[derive(Clone, Debug, PartialEq)]
pub struct AssistantAnswer {
    pub body: String,
    /// Documents whose text actually made it into the context.
    pub citations: Vec<Citation>,
    /// True when the answer was produced without retrieved context.
    pub context_missing: bool,
}

/// Composes retrieval and generation into cited answers.
pub struct AssistantEngine {
    retriever: Arc<Retriever>,
    generator: Arc<dyn GenerationClient>,
    config: ChatConfig,
}

impl AssistantEngine {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn GenerationClient>,
        config: ChatConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            config,
        }
    }

    /// Answer `question` for `session_id`.
    ///
    /// Retrieval is bounded by `retrieval_timeout`; on failure the configured
    /// [`ContextPolicy`] either degrades (no context, flagged on the answer)
    /// or fails the whole call. Generation is bounded per attempt and retried
    /// at most `generation_attempts` times with fixed backoff.
    pub async fn answer(
        &self,
        session_id: &SessionId,
        question: &str,
    ) -> Result<AssistantAnswer, AssistantError> {
        let (hits, context_missing) = match timeout(
            self.config.retrieval_timeout,
            self.retriever.retrieve(question, self.config.max_results),
        )
        .await
        {
            Ok(Ok(hits)) => (hits, false),
            Ok(Err(err)) => self.degrade(session_id, err.to_string())?,
            Err(_) => self.degrade(session_id, "retrieval timed out".to_string())?,
        };

        let (context, cited) = build_context(&hits, self.config.context_budget_chars);
        let prompt = format!("{SYSTEM_PROMPT}\n\nQuestion: {question}");

        let body = self.generate_bounded(&prompt, &context).await?;
        debug!(%session_id, citations = cited.len(), context_missing, "assistant answer ready");
        Ok(AssistantAnswer {
            body,
            citations: cited,
            context_missing,
        })
    }

    /// Apply the retrieval-failure policy: degrade to an empty context or
    /// surface the error, consistently per configuration.
    fn degrade(
        &self,
        session_id: &SessionId,
        reason: String,
    ) -> Result<(Vec<RetrievalHit>, bool), AssistantError> {
        match self.config.context_policy {
            ContextPolicy::Degrade => {
                warn!(%session_id, %reason, "retrieval failed; answering without context");
                Ok((Vec::new(), true))
            }
            ContextPolicy::Fail => Err(AssistantError::Retrieval(reason)),
        }
    }

    async fn generate_bounded(&self, prompt: &str, context: &str) -> Result<String, AssistantError> {
        let attempts = self.config.generation_attempts.max(1);
        let mut last_reason = String::new();
        for attempt in 1..=attempts {
            match timeout(
                self.config.generation_timeout,
                self.generator.generate(prompt, context),
            )
            .await
            {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(err)) => last_reason = err.to_string(),
                Err(_) => last_reason = "generation timed out".to_string(),
            }
            if attempt < attempts {
                warn!(attempt, %last_reason, "generation attempt failed; backing off");
                tokio::time::sleep(self.config.generation_backoff).await;
            }
        }
        Err(AssistantError::GenerationUnavailable {
            attempts,
            reason: last_reason,
        })
    }
}

/// Concatenate retrieved documents, most relevant first, under `budget`
/// characters. Returns the context and citations for the documents that were
/// actually included (a truncated document still counts as included).
fn build_context(hits: &[RetrievalHit], budget: usize) -> (String, Vec<Citation>) {
    let mut context = String::new();
    let mut citations = Vec::new();
    for hit in hits {
        if context.chars().count() >= budget {
            break;
        }
        let separator = if context.is_empty() { "" } else { "\n\n" };
        let header = format!(
            "[{} {}] ",
            hit.document.source_type, hit.document.source_id
        );
        let remaining = budget.saturating_sub(context.chars().count());
        let overhead = separator.len() + header.chars().count();
        if remaining <= overhead {
            break;
        }
        let body: String = hit.document.text.chars().take(remaining - overhead).collect();
        if body.is_empty() {
            break;
        }
        context.push_str(separator);
        context.push_str(&header);
        context.push_str(&body);
        citations.push(Citation {
            document_id: hit.document.id.clone(),
            source_type: hit.document.source_type,
            source_id: hit.document.source_id.clone(),
            score: hit.score,
        });
    }
    (context, citations)
}
