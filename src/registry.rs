//! Session registry: active connections, room membership, presence.
//!
//! The registry owns every [`ConnectionId`] and the per-session view derived
//! from them. All state lives behind one `RwLock`, so concurrent joins and
//! leaves are linearizable with respect to [`SessionRegistry::members_of`]:
//! no reader ever observes a half-applied membership change.
//!
//! A single-process deployment keeps this map in-process; horizontally
//! scaled gateways back the same interface with a shared concurrency-safe
//! store instead. That substitution is a deployment choice, not a code
//! branch here.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::ChatConfig;
use crate::types::{ConnectionId, ParticipantId, SessionId};

/// Lifecycle of one real-time connection.
///
/// `Connecting → Open → Closed`; a connection reaches `Closed` on explicit
/// leave, protocol-level close, or a missed-heartbeat timeout. The entry is
/// removed as part of closing, so state lookups after that return `None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("unknown session {0}")]
    UnknownSession(SessionId),
    #[error("invalid connection transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },
}

struct ConnectionEntry {
    participant: ParticipantId,
    session: SessionId,
    state: ConnectionState,
    last_seen: DateTime<Utc>,
}

struct SessionEntry {
    /// Participants in first-open order; pruned when their last open
    /// connection goes away.
    participants: Vec<ParticipantId>,
    connections: Vec<ConnectionId>,
    assistant_enabled: bool,
    created_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    connections: FxHashMap<ConnectionId, ConnectionEntry>,
    sessions: FxHashMap<SessionId, SessionEntry>,
}

/// Tracks active chat connections, room membership, and presence.
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
    assistant_by_default: bool,
    heartbeat_timeout: ChronoDuration,
    session_idle_timeout: ChronoDuration,
}

impl SessionRegistry {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            assistant_by_default: config.assistant_enabled,
            heartbeat_timeout: ChronoDuration::from_std(config.heartbeat_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(60)),
            session_idle_timeout: ChronoDuration::from_std(config.session_idle_timeout)
                .unwrap_or_else(|_| ChronoDuration::minutes(30)),
        }
    }

    /// Register a new connection for `participant` in `session`.
    ///
    /// Creates the session on first join (with the configured assistant
    /// default). The connection starts in [`ConnectionState::Connecting`] and
    /// does not count toward membership until [`open`](Self::open).
    pub fn join(&self, session: &SessionId, participant: &ParticipantId) -> ConnectionId {
        let now = Utc::now();
        let connection_id = ConnectionId::generate();
        let mut inner = self.inner.write();
        let entry = inner
            .sessions
            .entry(session.clone())
            .or_insert_with(|| SessionEntry {
                participants: Vec::new(),
                connections: Vec::new(),
                assistant_enabled: self.assistant_by_default,
                created_at: now,
                last_activity: now,
            });
        entry.connections.push(connection_id);
        entry.last_activity = now;
        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                participant: participant.clone(),
                session: session.clone(),
                state: ConnectionState::Connecting,
                last_seen: now,
            },
        );
        debug!(%session, %participant, %connection_id, "connection joining");
        connection_id
    }

    /// Transition a connection to `Open`, making its participant a member.
    pub fn open(&self, connection: ConnectionId) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .connections
            .get_mut(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;
        if entry.state != ConnectionState::Connecting {
            return Err(RegistryError::InvalidTransition {
                from: entry.state,
                to: ConnectionState::Open,
            });
        }
        entry.state = ConnectionState::Open;
        entry.last_seen = Utc::now();
        let participant = entry.participant.clone();
        let session = entry.session.clone();
        if let Some(session_entry) = inner.sessions.get_mut(&session) {
            if !session_entry.participants.contains(&participant) {
                session_entry.participants.push(participant.clone());
            }
            session_entry.last_activity = Utc::now();
        }
        info!(%session, %participant, %connection, "connection open");
        Ok(())
    }

    /// Close a connection, pruning membership when it was the participant's
    /// last open connection. The entry is removed, so closing it a second
    /// time reports `UnknownConnection`.
    pub fn leave(&self, connection: ConnectionId) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .connections
            .get_mut(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;
        entry.state = ConnectionState::Closed;
        let participant = entry.participant.clone();
        let session = entry.session.clone();

        let still_open = inner.connections.values().any(|c| {
            c.session == session && c.participant == participant && c.state == ConnectionState::Open
        });
        if let Some(session_entry) = inner.sessions.get_mut(&session) {
            session_entry.connections.retain(|id| *id != connection);
            if !still_open {
                session_entry.participants.retain(|p| *p != participant);
            }
            session_entry.last_activity = Utc::now();
        }
        inner.connections.remove(&connection);
        info!(%session, %participant, %connection, "connection closed");
        Ok(())
    }

    /// Current members: participants with ≥1 open connection, plus the
    /// assistant when enabled for the session.
    pub fn members_of(&self, session: &SessionId) -> Vec<ParticipantId> {
        let inner = self.inner.read();
        let Some(entry) = inner.sessions.get(session) else {
            return Vec::new();
        };
        let mut members = entry.participants.clone();
        if entry.assistant_enabled && !members.contains(&ParticipantId::Assistant) {
            members.push(ParticipantId::Assistant);
        }
        members
    }

    /// Whether `participant` has any open connection. The assistant is
    /// always online.
    pub fn is_online(&self, participant: &ParticipantId) -> bool {
        if participant.is_assistant() {
            return true;
        }
        let inner = self.inner.read();
        inner
            .connections
            .values()
            .any(|c| c.participant == *participant && c.state == ConnectionState::Open)
    }

    /// Record a heartbeat (or any inbound activity) for a connection.
    pub fn heartbeat(&self, connection: ConnectionId) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .connections
            .get_mut(&connection)
            .ok_or(RegistryError::UnknownConnection(connection))?;
        entry.last_seen = Utc::now();
        Ok(())
    }

    /// Bump a session's activity clock (called on message submission).
    pub fn touch(&self, session: &SessionId) {
        if let Some(entry) = self.inner.write().sessions.get_mut(session) {
            entry.last_activity = Utc::now();
        }
    }

    pub fn assistant_enabled(&self, session: &SessionId) -> bool {
        self.inner
            .read()
            .sessions
            .get(session)
            .map(|s| s.assistant_enabled)
            .unwrap_or(false)
    }

    /// Enable or disable the assistant participant for one session.
    pub fn set_assistant_enabled(&self, session: &SessionId, enabled: bool) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        let entry = inner
            .sessions
            .get_mut(session)
            .ok_or_else(|| RegistryError::UnknownSession(session.clone()))?;
        entry.assistant_enabled = enabled;
        Ok(())
    }

    pub fn connection_state(&self, connection: ConnectionId) -> Option<ConnectionState> {
        self.inner
            .read()
            .connections
            .get(&connection)
            .map(|c| c.state)
    }

    /// Close every open connection silent past the heartbeat timeout.
    ///
    /// Returns the closed connections so the gateway can tear down their
    /// tasks and publish membership updates.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> Vec<(ConnectionId, SessionId)> {
        let expired: Vec<(ConnectionId, SessionId)> = {
            let inner = self.inner.read();
            inner
                .connections
                .iter()
                .filter(|(_, c)| {
                    c.state == ConnectionState::Open
                        && now - c.last_seen > self.heartbeat_timeout
                })
                .map(|(id, c)| (*id, c.session.clone()))
                .collect()
        };
        for (connection, _) in &expired {
            let _ = self.leave(*connection);
        }
        expired
    }

    /// Drop sessions with zero open connections that have been idle past the
    /// configured timeout. Returns the reaped session ids.
    pub fn reap_idle_sessions(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let mut inner = self.inner.write();
        let mut reaped = Vec::new();
        inner.sessions.retain(|id, entry| {
            let idle = entry.participants.is_empty()
                && now - entry.last_activity > self.session_idle_timeout;
            if idle {
                reaped.push(id.clone());
            }
            !idle
        });
        for id in &reaped {
            info!(session = %id, "reaped idle session");
        }
        reaped
    }

    pub fn session_created_at(&self, session: &SessionId) -> Option<DateTime<Utc>> {
        self.inner.read().sessions.get(session).map(|s| s.created_at)
    }
}
