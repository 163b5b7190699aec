//! Core identifier types shared across the chat and retrieval components.
//!
//! These are deliberately small newtypes/enums rather than raw strings so the
//! compiler keeps sessions, participants, and connections from being mixed up
//! at call sites, and so wire serialization stays stable.
//!
//! # Key Types
//!
//! - [`SessionId`]: identifies a chat room and its ordered message history
//! - [`ParticipantId`]: a human user or the singleton AI assistant
//! - [`ConnectionId`]: one open real-time channel (ephemeral, never persisted)
//! - [`SourceType`]: the kind of indexed course content a document came from
//! - [`EmbeddingVersion`]: tags vectors so mismatched models are never compared

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies a chat session (room).
///
/// Sessions group participants and an append-only, strictly ordered message
/// history. The id is caller-supplied and treated as opaque.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A chat participant: either a human user reference or the AI assistant.
///
/// The assistant is a singleton identity; a session contains at most one
/// assistant participant and assistant-authored messages never re-trigger it.
///
/// Serializes as a plain string, with [`ParticipantId::ASSISTANT`] reserved
/// for the assistant:
///
/// ```
/// use coursechat::types::ParticipantId;
///
/// let user: ParticipantId = "user-7".into();
/// let bot = ParticipantId::Assistant;
/// assert_eq!(serde_json::to_string(&bot).unwrap(), "\"assistant\"");
/// assert_ne!(user, bot);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParticipantId {
    /// A human user, identified by an opaque external id.
    User(String),
    /// The singleton AI assistant identity.
    Assistant,
}

impl ParticipantId {
    /// Reserved wire identity for the assistant participant.
    pub const ASSISTANT: &'static str = "assistant";

    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::User(id) => id,
            Self::Assistant => Self::ASSISTANT,
        }
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        if value == Self::ASSISTANT {
            Self::Assistant
        } else {
            Self::User(value)
        }
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ParticipantId> for String {
    fn from(value: ParticipantId) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one open real-time connection.
///
/// Connections are ephemeral: they live only in the session registry and are
/// never persisted or exposed on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The kind of source content an indexed document was derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Course,
    Lesson,
    Faq,
    Announcement,
}

impl SourceType {
    /// All source types, in indexing order.
    pub const ALL: [SourceType; 4] = [
        SourceType::Course,
        SourceType::Lesson,
        SourceType::Faq,
        SourceType::Announcement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Course => "course",
            SourceType::Lesson => "lesson",
            SourceType::Faq => "faq",
            SourceType::Announcement => "announcement",
        }
    }

    /// Plural label used by the administrative CLI and run reports.
    pub fn plural(&self) -> &'static str {
        match self {
            SourceType::Course => "courses",
            SourceType::Lesson => "lessons",
            SourceType::Faq => "faqs",
            SourceType::Announcement => "announcements",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which content types an indexing run covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexScope {
    /// Index every source type.
    All,
    /// Index a single source type.
    Only(SourceType),
}

impl IndexScope {
    /// The concrete source types this scope expands to.
    pub fn source_types(&self) -> &[SourceType] {
        match self {
            IndexScope::All => &SourceType::ALL,
            IndexScope::Only(ty) => std::slice::from_ref(ty),
        }
    }
}

impl fmt::Display for IndexScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexScope::All => f.write_str("all"),
            IndexScope::Only(ty) => f.write_str(ty.plural()),
        }
    }
}

/// Version tag for an embedding model.
///
/// Vectors carry the version they were produced under; stores and retrievers
/// refuse to compare vectors across versions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingVersion(String);

impl EmbeddingVersion {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbeddingVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
