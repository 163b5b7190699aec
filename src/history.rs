//! Durable message history and the append contract.
//!
//! Message storage is shared between the router (writer) and read-side
//! consumers (history fetch, reconnect backfill). The contract that matters
//! here: [`MessageStore::append`] atomically assigns the next per-session
//! `message_id`, so two concurrent submissions can never share an id, and
//! ids are strictly increasing with no silent gaps.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::message::{ChatMessage, MessageDraft};
use crate::types::SessionId;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// The backing store is unreachable; the write was not applied.
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// Append-only, per-session message log.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist `draft`, assigning the next monotonic id for the session.
    async fn append(
        &self,
        session: &SessionId,
        draft: MessageDraft,
    ) -> Result<ChatMessage, HistoryError>;

    /// Messages with `after < id <= up_to` in ascending id order.
    /// `up_to = None` means "to the end".
    async fn since(
        &self,
        session: &SessionId,
        after: u64,
        up_to: Option<u64>,
    ) -> Result<Vec<ChatMessage>, HistoryError>;

    /// Highest assigned id for the session, 0 when empty.
    async fn latest_id(&self, session: &SessionId) -> Result<u64, HistoryError>;
}

#[derive(Default)]
struct SessionLog {
    next_id: u64,
    messages: Vec<ChatMessage>,
}

/// In-process [`MessageStore`].
///
/// A single lock over the per-session logs makes id assignment atomic; the
/// per-session sequence starts at 1.
#[derive(Default)]
pub struct InMemoryMessageStore {
    inner: Mutex<FxHashMap<SessionId, SessionLog>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(
        &self,
        session: &SessionId,
        draft: MessageDraft,
    ) -> Result<ChatMessage, HistoryError> {
        let mut inner = self.inner.lock();
        let log = inner.entry(session.clone()).or_default();
        log.next_id += 1;
        let message = ChatMessage {
            id: log.next_id,
            session_id: session.clone(),
            sender: draft.sender,
            body: draft.body,
            citations: draft.citations,
            context_missing: draft.context_missing,
            sent_at: Utc::now(),
        };
        log.messages.push(message.clone());
        Ok(message)
    }

    async fn since(
        &self,
        session: &SessionId,
        after: u64,
        up_to: Option<u64>,
    ) -> Result<Vec<ChatMessage>, HistoryError> {
        let inner = self.inner.lock();
        let Some(log) = inner.get(session) else {
            return Ok(Vec::new());
        };
        let ceiling = up_to.unwrap_or(u64::MAX);
        Ok(log
            .messages
            .iter()
            .filter(|m| m.id > after && m.id <= ceiling)
            .cloned()
            .collect())
    }

    async fn latest_id(&self, session: &SessionId) -> Result<u64, HistoryError> {
        let inner = self.inner.lock();
        Ok(inner.get(session).map(|log| log.next_id).unwrap_or(0))
    }
}
