//! Runtime configuration for the chat and retrieval pipeline.
//!
//! [`ChatConfig`] carries every tunable the components need: retrieval and
//! generation bounds for the assistant, delivery/backpressure limits for the
//! gateway, and chunking parameters for the indexer. Defaults are sensible
//! for a single-process deployment; override with the `with_*` builders.

use std::time::Duration;

/// Policy applied when retrieval fails while answering a question.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    /// Answer without retrieved context and flag the reply as context-less.
    #[default]
    Degrade,
    /// Fail the answer outright instead of degrading.
    Fail,
}

/// Tunables for the chat service and retrieval pipeline.
#[derive(Clone, Debug)]
pub struct ChatConfig {
    /// Hard cap on retrieval results (`k` is clamped to this).
    pub max_results: usize,
    /// Minimum similarity a hit must reach to be returned, if set.
    pub similarity_floor: Option<f32>,
    /// Bound on a single retrieval call.
    pub retrieval_timeout: Duration,
    /// Bound on a single generation attempt.
    pub generation_timeout: Duration,
    /// Maximum generation attempts before reporting unavailability.
    pub generation_attempts: u32,
    /// Fixed backoff between generation attempts.
    pub generation_backoff: Duration,
    /// Character budget for the retrieved context handed to generation.
    pub context_budget_chars: usize,
    /// What to do when retrieval fails mid-answer.
    pub context_policy: ContextPolicy,
    /// Silence threshold after which a connection is considered dead.
    pub heartbeat_timeout: Duration,
    /// Idle threshold after which a session with no open connections is reaped.
    pub session_idle_timeout: Duration,
    /// Per-connection outbound frame queue bound; overflow drops the connection.
    pub outbound_queue_bound: usize,
    /// Capacity of each session's fan-out channel.
    pub event_buffer_capacity: usize,
    /// Maximum characters per indexed document chunk.
    pub chunk_max_chars: usize,
    /// Character overlap between consecutive chunks.
    pub chunk_overlap_chars: usize,
    /// Whether new sessions get the assistant participant.
    pub assistant_enabled: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            similarity_floor: None,
            retrieval_timeout: Duration::from_secs(3),
            generation_timeout: Duration::from_secs(30),
            generation_attempts: 2,
            generation_backoff: Duration::from_millis(250),
            context_budget_chars: 4000,
            context_policy: ContextPolicy::default(),
            heartbeat_timeout: Duration::from_secs(60),
            session_idle_timeout: Duration::from_secs(30 * 60),
            outbound_queue_bound: 64,
            event_buffer_capacity: 1024,
            chunk_max_chars: 1200,
            chunk_overlap_chars: 120,
            assistant_enabled: true,
        }
    }
}

impl ChatConfig {
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    #[must_use]
    pub fn with_similarity_floor(mut self, floor: f32) -> Self {
        self.similarity_floor = Some(floor);
        self
    }

    #[must_use]
    pub fn with_retrieval_timeout(mut self, timeout: Duration) -> Self {
        self.retrieval_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_generation_attempts(mut self, attempts: u32) -> Self {
        self.generation_attempts = attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_generation_backoff(mut self, backoff: Duration) -> Self {
        self.generation_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_context_budget_chars(mut self, budget: usize) -> Self {
        self.context_budget_chars = budget;
        self
    }

    #[must_use]
    pub fn with_context_policy(mut self, policy: ContextPolicy) -> Self {
        self.context_policy = policy;
        self
    }

    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_outbound_queue_bound(mut self, bound: usize) -> Self {
        self.outbound_queue_bound = bound.max(1);
        self
    }

    #[must_use]
    pub fn with_event_buffer_capacity(mut self, capacity: usize) -> Self {
        self.event_buffer_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_chunking(mut self, max_chars: usize, overlap_chars: usize) -> Self {
        self.chunk_max_chars = max_chars.max(1);
        self.chunk_overlap_chars = overlap_chars.min(self.chunk_max_chars / 2);
        self
    }

    #[must_use]
    pub fn with_assistant_enabled(mut self, enabled: bool) -> Self {
        self.assistant_enabled = enabled;
        self
    }
}
