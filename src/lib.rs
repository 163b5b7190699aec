//! Real-time course chat with a retrieval-grounded assistant.
//!
//! The crate is organized as a pipeline of small components, each usable on
//! its own:
//!
//! - [`vector`]: embedding storage and cosine-ranked retrieval behind the
//!   [`vector::VectorStore`] trait.
//! - [`embeddings`]: the [`embeddings::Embedder`] trait plus a deterministic
//!   in-process implementation.
//! - [`indexing`]: chunks published course content and upserts it into the
//!   vector store, idempotently.
//! - [`retriever`]: query-time embedding and top-k lookup.
//! - [`assistant`]: retrieval-grounded answer generation with citations,
//!   bounded retries, and a degrade-or-fail context policy.
//! - [`registry`]: connections, session membership, presence.
//! - [`router`]: ordered persistence and per-session fan-out of messages.
//! - [`gateway`]: connection termination, resumable backfill, backpressure.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use coursechat::config::ChatConfig;
//! use coursechat::gateway::{ClientFrame, ConnectionGateway, OpenAccess};
//! use coursechat::history::InMemoryMessageStore;
//! use coursechat::registry::SessionRegistry;
//! use coursechat::router::MessageRouter;
//! use coursechat::types::ParticipantId;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ChatConfig::default();
//! let registry = Arc::new(SessionRegistry::new(&config));
//! let store = Arc::new(InMemoryMessageStore::new());
//! let router = Arc::new(MessageRouter::new(registry.clone(), store, &config));
//! let gateway = Arc::new(ConnectionGateway::new(
//!     registry,
//!     router,
//!     Arc::new(OpenAccess),
//!     &config,
//! ));
//!
//! let channel = gateway
//!     .connect(ParticipantId::user("alice"), "bio-101".into(), None)
//!     .await?;
//! channel.send(ClientFrame::Message { body: "hi".into() })?;
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod config;
pub mod embeddings;
pub mod gateway;
pub mod history;
pub mod indexing;
pub mod message;
pub mod registry;
pub mod retriever;
pub mod router;
pub mod telemetry;
pub mod types;
pub mod vector;

pub use config::{ChatConfig, ContextPolicy};
pub use message::{ChatMessage, Citation, MessageDraft};
pub use types::{ConnectionId, ParticipantId, SessionId, SourceType};
