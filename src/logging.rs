//! Optional subscriber setup for the engine's `tracing` output.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered through `RUST_LOG`.
///
/// Panics if a global subscriber is already set.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}
