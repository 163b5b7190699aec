//! Chat messages, citations, and drafts awaiting id assignment.
//!
//! A [`ChatMessage`] is immutable once created and append-only per session:
//! its `id` is assigned by the message store, strictly increasing within a
//! session, and doubles as the ordering and resume cursor on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ParticipantId, SessionId, SourceType};

/// A source document referenced by an assistant reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Id of the indexed document the answer drew on.
    pub document_id: String,
    /// Kind of source content the document came from.
    pub source_type: SourceType,
    /// Id of the underlying source object (course id, lesson id, ...).
    pub source_id: String,
    /// Similarity score the document was retrieved with.
    pub score: f32,
}

/// A persisted chat message.
///
/// # Examples
///
/// ```
/// use coursechat::message::MessageDraft;
///
/// let draft = MessageDraft::new("user-1", "hello");
/// assert_eq!(draft.body, "hello");
/// assert!(draft.citations.is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Monotonic, per-session message id (the delivery/resume cursor).
    pub id: u64,
    pub session_id: SessionId,
    pub sender: ParticipantId,
    pub body: String,
    /// Source documents cited by an assistant reply; empty for user messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    /// Set on assistant replies produced without retrieved context
    /// (degraded mode after a retrieval failure).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub context_missing: bool,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        self.sender.is_assistant()
    }
}

/// A message awaiting persistence; the store assigns `id` and `sent_at`.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageDraft {
    pub sender: ParticipantId,
    pub body: String,
    pub citations: Vec<Citation>,
    pub context_missing: bool,
}

impl MessageDraft {
    pub fn new(sender: impl Into<ParticipantId>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            body: body.into(),
            citations: Vec::new(),
            context_missing: false,
        }
    }

    /// Draft an assistant reply carrying its citations.
    pub fn assistant_reply(body: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            sender: ParticipantId::Assistant,
            body: body.into(),
            citations,
            context_missing: false,
        }
    }

    #[must_use]
    pub fn with_context_missing(mut self, missing: bool) -> Self {
        self.context_missing = missing;
        self
    }
}
