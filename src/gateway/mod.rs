//! Protocol-facing gateway terminating real-time connections.
//!
//! The gateway checks a resolved participant identity against a session
//! (authorization itself is delegated via [`SessionAccess`]), registers the
//! connection, and then runs one task per connection that translates inbound
//! [`ClientFrame`]s into router calls and session events into outbound
//! [`ServerFrame`]s.
//!
//! # Resumable reconnection
//!
//! `connect` subscribes to the live stream first and snapshots the highest
//! persisted id under the router's submit lock, then backfills everything
//! after the client's `last_seen_message_id` up to that snapshot. The live
//! tail starts exactly past the snapshot, so the handoff neither drops nor
//! duplicates a message; a last-delivered watermark additionally drops any
//! regression.
//!
//! # Backpressure
//!
//! Outbound frames go through a bounded queue. Backfill is client-paced
//! (awaited sends); live delivery never blocks the fan-out stream. When the
//! queue is full the connection is dropped, forcing a
//! reconnect-with-backfill rather than unbounded buffering or silent loss.

pub mod frames;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::message::ChatMessage;
use crate::registry::{RegistryError, SessionRegistry};
use crate::router::{MessageRouter, RouterError, SessionEvent};
use crate::types::{ConnectionId, ParticipantId, SessionId};

pub use frames::{ClientFrame, ErrorKind, ServerFrame};

/// Session-access decision, delegated to an external collaborator.
///
/// The gateway already holds a resolved participant identity; this trait
/// only answers whether that identity may join a given session.
#[async_trait]
pub trait SessionAccess: Send + Sync {
    async fn allow(&self, participant: &ParticipantId, session: &SessionId) -> bool;
}

/// Permits every join. For single-process setups and tests.
pub struct OpenAccess;

#[async_trait]
impl SessionAccess for OpenAccess {
    async fn allow(&self, _participant: &ParticipantId, _session: &SessionId) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{participant} may not join session {session}")]
    AccessDenied {
        participant: ParticipantId,
        session: SessionId,
    },
    #[error(transparent)]
    Router(#[from] RouterError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// The transport half handed back to the caller for one connection.
///
/// The caller (a websocket adapter, a test) feeds decoded frames into
/// `inbound` and drains `outbound`; dropping the channel closes the
/// connection.
pub struct ClientChannel {
    pub connection_id: ConnectionId,
    inbound: flume::Sender<ClientFrame>,
    outbound: flume::Receiver<ServerFrame>,
}

impl ClientChannel {
    /// Feed one decoded frame to the gateway.
    pub fn send(&self, frame: ClientFrame) -> Result<(), flume::SendError<ClientFrame>> {
        self.inbound.send(frame)
    }

    /// Next outbound frame, or `None` once the connection is closed and
    /// drained.
    pub async fn recv(&self) -> Option<ServerFrame> {
        self.outbound.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<ServerFrame> {
        self.outbound.try_recv().ok()
    }
}

impl fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientChannel")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

/// Terminates real-time connections and bridges them to the router.
pub struct ConnectionGateway {
    registry: Arc<SessionRegistry>,
    router: Arc<MessageRouter>,
    access: Arc<dyn SessionAccess>,
    heartbeat_timeout: Duration,
    outbound_queue_bound: usize,
}

impl ConnectionGateway {
    pub fn new(
        registry: Arc<SessionRegistry>,
        router: Arc<MessageRouter>,
        access: Arc<dyn SessionAccess>,
        config: &ChatConfig,
    ) -> Self {
        Self {
            registry,
            router,
            access,
            heartbeat_timeout: config.heartbeat_timeout,
            outbound_queue_bound: config.outbound_queue_bound,
        }
    }

    /// Establish a connection for `participant` in `session`.
    ///
    /// `resume_after` is the client's `last_seen_message_id`; pass `None`
    /// for a fresh join (backfills the whole history). On success the
    /// connection is open, membership has been announced, and a per-
    /// connection task is running.
    pub async fn connect(
        &self,
        participant: ParticipantId,
        session: SessionId,
        resume_after: Option<u64>,
    ) -> Result<ClientChannel, GatewayError> {
        if !self.access.allow(&participant, &session).await {
            return Err(GatewayError::AccessDenied {
                participant,
                session,
            });
        }

        let connection_id = self.registry.join(&session, &participant);
        let setup = async {
            let (events, snapshot) = self.router.subscribe(&session).await?;
            let after = resume_after.unwrap_or(0).min(snapshot);
            let backfill = self.router.history(&session, after, Some(snapshot)).await?;
            self.registry.open(connection_id)?;
            Ok::<_, GatewayError>((events, after, backfill))
        };
        let (events, watermark, backfill) = match setup.await {
            Ok(parts) => parts,
            Err(err) => {
                let _ = self.registry.leave(connection_id);
                return Err(err);
            }
        };
        self.router.publish_member_update(&session);
        info!(%session, %participant, %connection_id, backfill = backfill.len(), "connection established");

        let (outbound_tx, outbound_rx) = flume::bounded(self.outbound_queue_bound);
        let (inbound_tx, inbound_rx) = flume::unbounded();

        let task = ConnectionTask {
            registry: Arc::clone(&self.registry),
            router: Arc::clone(&self.router),
            heartbeat_timeout: self.heartbeat_timeout,
            connection_id,
            participant,
            session,
        };
        tokio::spawn(task.run(events, watermark, backfill, inbound_rx, outbound_tx));

        Ok(ClientChannel {
            connection_id,
            inbound: inbound_tx,
            outbound: outbound_rx,
        })
    }

    /// Close connections silent past the heartbeat timeout, announce the
    /// membership changes, and reap idle sessions along with their fan-out
    /// channels. Intended for a periodic sweep. Returns the number of
    /// connections closed.
    pub fn sweep_idle(&self, now: chrono::DateTime<chrono::Utc>) -> usize {
        let expired = self.registry.expire_idle(now);
        for (_, session) in &expired {
            self.router.publish_member_update(session);
        }
        for session in self.registry.reap_idle_sessions(now) {
            self.router.drop_session(&session);
        }
        expired.len()
    }
}

/// State owned by one connection's task.
struct ConnectionTask {
    registry: Arc<SessionRegistry>,
    router: Arc<MessageRouter>,
    heartbeat_timeout: Duration,
    connection_id: ConnectionId,
    participant: ParticipantId,
    session: SessionId,
}

impl ConnectionTask {
    async fn run(
        self,
        mut events: broadcast::Receiver<SessionEvent>,
        mut last_delivered: u64,
        backfill: Vec<ChatMessage>,
        inbound: flume::Receiver<ClientFrame>,
        outbound: flume::Sender<ServerFrame>,
    ) {
        // Backfill is client-paced: awaited sends flow-control against the
        // bounded queue instead of overflowing it.
        for message in backfill {
            if message.id <= last_delivered {
                continue;
            }
            last_delivered = message.id;
            if outbound
                .send_async(ServerFrame::Delivered { message })
                .await
                .is_err()
            {
                self.teardown();
                return;
            }
        }

        let mut deadline = Instant::now() + self.heartbeat_timeout;
        loop {
            tokio::select! {
                frame = inbound.recv_async() => {
                    match frame {
                        Ok(frame) => {
                            // Any inbound frame is liveness, not just heartbeats.
                            deadline = Instant::now() + self.heartbeat_timeout;
                            let _ = self.registry.heartbeat(self.connection_id);
                            if !self.handle_frame(frame, &outbound).await {
                                break;
                            }
                        }
                        // Transport dropped its sender: protocol-level close.
                        Err(_) => break,
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(SessionEvent::Delivered(message)) => {
                            if message.id <= last_delivered {
                                continue;
                            }
                            last_delivered = message.id;
                            if !push(&outbound, ServerFrame::Delivered { message }) {
                                warn!(connection_id = %self.connection_id, "outbound queue overflow; dropping connection");
                                break;
                            }
                        }
                        Ok(SessionEvent::MemberUpdate(members)) => {
                            if !push(&outbound, ServerFrame::MemberUpdate { members }) {
                                warn!(connection_id = %self.connection_id, "outbound queue overflow; dropping connection");
                                break;
                            }
                        }
                        Ok(SessionEvent::AssistantUnavailable { in_reply_to }) => {
                            let frame = ServerFrame::error_with_detail(
                                ErrorKind::AssistantUnavailable,
                                format!("no reply to message {in_reply_to}"),
                            );
                            if !push(&outbound, frame) {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(connection_id = %self.connection_id, missed, "fan-out lag; dropping connection");
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    debug!(connection_id = %self.connection_id, "missed heartbeat; closing");
                    break;
                }
            }
        }
        self.teardown();
    }

    /// Returns `false` when the connection must close.
    async fn handle_frame(&self, frame: ClientFrame, outbound: &flume::Sender<ServerFrame>) -> bool {
        match frame {
            ClientFrame::Message { body } => {
                match self.router.submit(&self.session, &self.participant, body).await {
                    Ok(_) => true,
                    Err(RouterError::NotAMember { .. }) => {
                        push(outbound, ServerFrame::error(ErrorKind::NotAMember))
                    }
                    Err(RouterError::Store(err)) => push(
                        outbound,
                        ServerFrame::error_with_detail(ErrorKind::StoreUnavailable, err.to_string()),
                    ),
                }
            }
            // Presence was already recorded on receipt; nothing else to do.
            ClientFrame::Heartbeat => true,
            ClientFrame::Join { .. } | ClientFrame::Resume { .. } => {
                push(outbound, ServerFrame::error(ErrorKind::AlreadyJoined))
            }
        }
    }

    fn teardown(&self) {
        let _ = self.registry.leave(self.connection_id);
        self.router.publish_member_update(&self.session);
        debug!(connection_id = %self.connection_id, session = %self.session, "connection torn down");
    }
}

/// Non-blocking outbound push; `false` on overflow or disconnect.
fn push(outbound: &flume::Sender<ServerFrame>, frame: ServerFrame) -> bool {
    outbound.try_send(frame).is_ok()
}
