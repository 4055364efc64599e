//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "prometheus_task_runtime=info";

/// Initialize tracing with [`DEFAULT_FILTER`]. Hosts may install their own
/// subscriber instead; this helper does nothing if one is already set.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_FILTER);
}

/// Initialize tracing, falling back to `default_directives` when `RUST_LOG`
/// is unset or invalid. Returns whether this call installed the subscriber.
pub fn init_tracing_with(default_directives: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
