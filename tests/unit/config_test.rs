//! Tests for configuration validation

use std::collections::HashMap;

use prometheus_task_runtime::config::{PoolConfig, RuntimeConfig, SchedulerConfig, WorkerConfig};

#[test]
fn test_pool_config_defaults() {
    let cfg = PoolConfig::default();
    assert_eq!(cfg.min_size, 0);
    assert!(cfg.max_size >= 1);
    assert_eq!(cfg.idle_timeout_ms, 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_max_size() {
    let invalid = PoolConfig::new().with_max_size(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_pool_config_min_exceeds_max() {
    let invalid = PoolConfig::new().with_min_size(4).with_max_size(2);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("min_size"));
}

#[test]
fn test_scheduler_config_invalid_parallelism() {
    let invalid = SchedulerConfig::new().with_max_parallel_tasks(0);
    assert!(invalid.validate().is_err());
    // An empty waiting queue is allowed: every submission is rejected.
    assert!(SchedulerConfig::new().with_max_queued_tasks(0).validate().is_ok());
}

#[test]
fn test_worker_config_requires_name_prefix() {
    let invalid = WorkerConfig::new().with_thread_name_prefix("  ");
    assert!(invalid.validate().is_err());
}

#[test]
fn test_runtime_config_from_json() {
    let json = r#"
    {
        "pool": { "min_size": 1, "max_size": 4, "idle_timeout_ms": 30000 },
        "scheduler": { "max_parallel_tasks": 2 },
        "worker": { "thread_name_prefix": "gpu" }
    }
    "#;

    let cfg = RuntimeConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pool.max_size, 4);
    assert_eq!(cfg.pool.idle_timeout().as_millis(), 30_000);
    assert_eq!(cfg.scheduler.max_parallel_tasks, 2);
    assert_eq!(cfg.scheduler.max_queued_tasks, SchedulerConfig::default().max_queued_tasks);
    assert_eq!(cfg.worker.thread_name_prefix, "gpu");
    assert_eq!(cfg.worker.task_timeout_ms, WorkerConfig::default().task_timeout_ms);
}

#[test]
fn test_runtime_config_from_json_invalid() {
    let parse_err = RuntimeConfig::from_json_str("{ not json").unwrap_err();
    assert!(parse_err.starts_with("parse error"));

    let invalid = RuntimeConfig::from_json_str(r#"{ "pool": { "min_size": 5, "max_size": 1 } }"#).unwrap_err();
    assert!(invalid.starts_with("pool invalid"));
}

#[test]
fn test_runtime_config_from_lookup() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("TASK_RUNTIME_POOL_MIN_SIZE", "1"),
        ("TASK_RUNTIME_POOL_MAX_SIZE", "8"),
        ("TASK_RUNTIME_POOL_IDLE_TIMEOUT_MS", "250"),
        ("TASK_RUNTIME_MAX_PARALLEL_TASKS", "3"),
        ("TASK_RUNTIME_THREAD_NAME_PREFIX", "llm"),
        ("TASK_RUNTIME_TASK_TIMEOUT_MS", ""),
    ]);

    let cfg = RuntimeConfig::from_lookup(|key| vars.get(key).map(ToString::to_string)).unwrap();
    assert_eq!(cfg.pool.min_size, 1);
    assert_eq!(cfg.pool.max_size, 8);
    assert_eq!(cfg.pool.idle_timeout_ms, 250);
    assert_eq!(cfg.scheduler.max_parallel_tasks, 3);
    assert_eq!(cfg.worker.thread_name_prefix, "llm");
    // Empty values keep the default.
    assert_eq!(cfg.worker.task_timeout_ms, WorkerConfig::default().task_timeout_ms);
}

#[test]
fn test_runtime_config_from_lookup_rejects_garbage() {
    let err = RuntimeConfig::from_lookup(|key| {
        (key == "TASK_RUNTIME_POOL_MAX_SIZE").then(|| "lots".to_string())
    })
    .unwrap_err();
    assert!(err.contains("TASK_RUNTIME_POOL_MAX_SIZE"));
}

#[test]
fn test_worker_config_task_uses_configured_deadline() {
    let cfg = WorkerConfig::new().with_task_timeout_ms(1_500);
    let task = cfg.task("prompt");
    assert_eq!(task.data, "prompt");
    assert_eq!(task.timeout, std::time::Duration::from_millis(1_500));

    let default_task = WorkerConfig::default().task(());
    assert_eq!(default_task.timeout.as_millis(), 30_000);
}
