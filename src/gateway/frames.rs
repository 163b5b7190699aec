//! Wire frames for the real-time protocol.
//!
//! Frames are tagged JSON objects; the `type` discriminator keeps the
//! dispatch table explicit on both sides of the connection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::ChatMessage;
use crate::types::{ParticipantId, SessionId};

/// Client → server frames.
///
/// `join` and `resume` establish a connection; once established, a
/// connection only sends `message` and `heartbeat`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Join {
        session_id: SessionId,
    },
    Message {
        body: String,
    },
    Resume {
        session_id: SessionId,
        last_seen_message_id: u64,
    },
    Heartbeat,
}

/// Server → client frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Delivered {
        message: ChatMessage,
    },
    MemberUpdate {
        members: Vec<ParticipantId>,
    },
    Error {
        kind: ErrorKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl ServerFrame {
    pub fn error(kind: ErrorKind) -> Self {
        Self::Error { kind, detail: None }
    }

    pub fn error_with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Error {
            kind,
            detail: Some(detail.into()),
        }
    }
}

/// Error kinds surfaced to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Sender is not an active member of the session.
    NotAMember,
    /// The message store is unreachable; the message was not persisted.
    StoreUnavailable,
    /// The assistant could not answer; the exchange is flagged, not queued.
    AssistantUnavailable,
    /// A join/resume frame arrived on an already-established connection.
    AlreadyJoined,
    /// The connection's outbound queue overflowed; reconnect with resume.
    Overloaded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotAMember => "not_a_member",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::AssistantUnavailable => "assistant_unavailable",
            ErrorKind::AlreadyJoined => "already_joined",
            ErrorKind::Overloaded => "overloaded",
        };
        f.write_str(label)
    }
}
