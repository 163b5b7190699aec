//! Message routing: validation, ordered persistence, and session fan-out.
//!
//! Each session gets a broadcast channel; [`MessageRouter::submit`] appends
//! to the store and publishes the persisted message while holding the
//! session's submit lock, so the live stream is ordered by `message_id` at
//! the source. Subscribing under that same lock yields a snapshot id that
//! cleanly splits backfill from live tail: the handoff can neither drop nor
//! duplicate a message.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tracing::{debug, error, info, warn};

use crate::assistant::AssistantEngine;
use crate::config::ChatConfig;
use crate::history::{HistoryError, MessageStore};
use crate::message::{ChatMessage, MessageDraft};
use crate::registry::SessionRegistry;
use crate::types::{ParticipantId, SessionId};

/// Events fanned out to a session's subscribers.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// A message was persisted and is being delivered.
    Delivered(ChatMessage),
    /// The session's membership changed.
    MemberUpdate(Vec<ParticipantId>),
    /// The assistant could not produce a reply to the given message.
    /// No reply is persisted; clients may retry by re-asking.
    AssistantUnavailable { in_reply_to: u64 },
}

#[derive(Debug, Error)]
pub enum RouterError {
    /// The sender is not an active member of the session.
    #[error("{participant} is not a member of session {session}")]
    NotAMember {
        participant: ParticipantId,
        session: SessionId,
    },
    /// The message store rejected the write; nothing was persisted and the
    /// failure is reported, never silently skipped.
    #[error(transparent)]
    Store(#[from] HistoryError),
}

struct SessionChannel {
    events: broadcast::Sender<SessionEvent>,
    /// Serializes append + publish so fan-out order matches id order.
    submit_lock: Arc<AsyncMutex<()>>,
}

/// Routes inbound messages: membership check, persist, fan out, and,
/// for sessions with the assistant, trigger an answer.
pub struct MessageRouter {
    registry: Arc<SessionRegistry>,
    store: Arc<dyn MessageStore>,
    assistant: Option<Arc<AssistantEngine>>,
    channels: parking_lot::Mutex<rustc_hash::FxHashMap<SessionId, SessionChannel>>,
    event_buffer_capacity: usize,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            registry,
            store,
            assistant: None,
            channels: parking_lot::Mutex::new(rustc_hash::FxHashMap::default()),
            event_buffer_capacity: config.event_buffer_capacity,
        }
    }

    #[must_use]
    pub fn with_assistant(mut self, engine: Arc<AssistantEngine>) -> Self {
        self.assistant = Some(engine);
        self
    }

    fn channel(&self, session: &SessionId) -> (broadcast::Sender<SessionEvent>, Arc<AsyncMutex<()>>) {
        let mut channels = self.channels.lock();
        let entry = channels.entry(session.clone()).or_insert_with(|| {
            let (events, _) = broadcast::channel(self.event_buffer_capacity);
            SessionChannel {
                events,
                submit_lock: Arc::new(AsyncMutex::new(())),
            }
        });
        (entry.events.clone(), Arc::clone(&entry.submit_lock))
    }

    /// Submit a plain message body from `sender`.
    pub async fn submit(
        &self,
        session: &SessionId,
        sender: &ParticipantId,
        body: impl Into<String>,
    ) -> Result<ChatMessage, RouterError> {
        self.submit_draft(session, MessageDraft::new(sender.clone(), body))
            .await
    }

    /// Submit a prepared draft (used for assistant replies, which carry
    /// citations and the context flag).
    pub async fn submit_draft(
        &self,
        session: &SessionId,
        draft: MessageDraft,
    ) -> Result<ChatMessage, RouterError> {
        let sender = draft.sender.clone();
        let members = self.registry.members_of(session);
        if !members.contains(&sender) {
            return Err(RouterError::NotAMember {
                participant: sender,
                session: session.clone(),
            });
        }

        let (events, submit_lock) = self.channel(session);
        let message = publish_message(
            &self.store,
            &self.registry,
            &events,
            &submit_lock,
            session,
            draft,
        )
        .await?;
        debug!(%session, id = message.id, sender = %message.sender, "message routed");

        // Assistant-authored messages never re-trigger the assistant.
        if !message.sender.is_assistant() && self.registry.assistant_enabled(session) {
            self.trigger_assistant(session.clone(), message.clone());
        }
        Ok(message)
    }

    /// Subscribe to a session's live stream.
    ///
    /// Returns the receiver and the highest persisted id at subscribe time:
    /// the receiver will observe exactly the messages with greater ids, so a
    /// backfill up to (and including) the snapshot joins the live tail with
    /// no gap and no duplicate.
    pub async fn subscribe(
        &self,
        session: &SessionId,
    ) -> Result<(broadcast::Receiver<SessionEvent>, u64), RouterError> {
        let (events, submit_lock) = self.channel(session);
        let _guard = submit_lock.lock().await;
        let receiver = events.subscribe();
        let snapshot = self.store.latest_id(session).await?;
        Ok((receiver, snapshot))
    }

    /// Fetch persisted history for backfill, `after < id <= up_to`.
    pub async fn history(
        &self,
        session: &SessionId,
        after: u64,
        up_to: Option<u64>,
    ) -> Result<Vec<ChatMessage>, RouterError> {
        Ok(self.store.since(session, after, up_to).await?)
    }

    /// Broadcast the session's current membership to subscribers.
    ///
    /// A no-op for sessions without a channel, so a straggling teardown
    /// cannot resurrect one that [`drop_session`](Self::drop_session)
    /// already released.
    pub fn publish_member_update(&self, session: &SessionId) {
        let events = {
            let channels = self.channels.lock();
            channels.get(session).map(|c| c.events.clone())
        };
        if let Some(events) = events {
            let _ = events.send(SessionEvent::MemberUpdate(self.registry.members_of(session)));
        }
    }

    /// Release a reaped session's fan-out channel and submit lock.
    ///
    /// Dropping the broadcast sender closes any remaining subscribers, so
    /// their connection tasks wind down on their own.
    pub fn drop_session(&self, session: &SessionId) {
        if self.channels.lock().remove(session).is_some() {
            debug!(%session, "fan-out channel dropped");
        }
    }

    /// Whether the router currently holds a fan-out channel for `session`.
    pub fn tracks_session(&self, session: &SessionId) -> bool {
        self.channels.lock().contains_key(session)
    }

    /// Answer `user_message` asynchronously and publish the reply as the
    /// assistant. Runs detached: a client disconnecting mid-answer does not
    /// cancel the generation; the reply is persisted as history and delivered
    /// on reconnect via backfill.
    fn trigger_assistant(&self, session: SessionId, user_message: ChatMessage) {
        let Some(engine) = self.assistant.clone() else {
            return;
        };
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let (events, submit_lock) = self.channel(&session);
        tokio::spawn(async move {
            match engine.answer(&session, &user_message.body).await {
                Ok(answer) => {
                    let draft = MessageDraft::assistant_reply(answer.body, answer.citations)
                        .with_context_missing(answer.context_missing);
                    match publish_message(&store, &registry, &events, &submit_lock, &session, draft)
                        .await
                    {
                        Ok(reply) => {
                            info!(%session, in_reply_to = user_message.id, reply = reply.id, "assistant replied");
                        }
                        Err(err) => {
                            error!(%session, in_reply_to = user_message.id, %err, "failed to persist assistant reply");
                            let _ = events.send(SessionEvent::AssistantUnavailable {
                                in_reply_to: user_message.id,
                            });
                        }
                    }
                }
                Err(err) => {
                    warn!(%session, in_reply_to = user_message.id, %err, "assistant unavailable");
                    let _ = events.send(SessionEvent::AssistantUnavailable {
                        in_reply_to: user_message.id,
                    });
                }
            }
        });
    }
}

/// Append and fan out one message under the session's submit lock, keeping
/// broadcast order identical to id order.
async fn publish_message(
    store: &Arc<dyn MessageStore>,
    registry: &SessionRegistry,
    events: &broadcast::Sender<SessionEvent>,
    submit_lock: &AsyncMutex<()>,
    session: &SessionId,
    draft: MessageDraft,
) -> Result<ChatMessage, HistoryError> {
    let _guard = submit_lock.lock().await;
    let message = store.append(session, draft).await?;
    registry.touch(session);
    // No receivers is fine; backfill covers late subscribers.
    let _ = events.send(SessionEvent::Delivered(message.clone()));
    Ok(message)
}
