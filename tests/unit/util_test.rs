//! Tests for utility functions

use prometheus_task_runtime::util::panic_message;
use prometheus_task_runtime::util::telemetry::{init_tracing_with, DEFAULT_FILTER};

#[test]
fn test_panic_message_from_caught_panic() {
    let payload = std::panic::catch_unwind(|| panic!("worker {} exploded", 3)).unwrap_err();
    assert_eq!(panic_message(payload.as_ref()), "worker 3 exploded");

    let payload = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
    assert!(!panic_message(payload.as_ref()).is_empty());
}

#[test]
fn test_init_tracing_installs_once() {
    assert!(DEFAULT_FILTER.starts_with("prometheus_task_runtime"));

    init_tracing_with("warn");
    // A subscriber is set now, so a second call leaves it in place.
    assert!(!init_tracing_with("debug"));
}
