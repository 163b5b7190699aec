//! Tracing setup for binaries and tests.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! the embedder's choice. [`init`] wires up the conventional env-filtered fmt
//! subscriber (`RUST_LOG` controls verbosity, default `info`).

use tracing_subscriber::EnvFilter;

/// Install the default fmt subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
