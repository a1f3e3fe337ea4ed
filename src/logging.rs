//! Structured logging setup for embedders and tests.
//!
//! The core only emits `tracing` events; installing a subscriber is the
//! embedder's choice. This helper wires a sensible default: env-filtered,
//! compact, to stderr.

use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber filtered by `RUST_LOG`
/// (default `kuzu_memory=info`).
///
/// Safe to call more than once; only the first call installs.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("kuzu_memory=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
