//! Tests for error types

use std::error::Error as _;
use std::time::Duration;

use prometheus_task_runtime::core::{PoolError, QueueError, SchedulerError, WorkerError};

#[test]
fn test_queue_errors() {
    assert_eq!(
        QueueError::Full { capacity: 3 }.to_string(),
        "queue full: cannot enqueue more than 3 items"
    );
    assert_eq!(
        QueueError::Empty.to_string(),
        "cannot dequeue item from empty queue"
    );
}

#[test]
fn test_scheduler_errors() {
    assert_eq!(
        SchedulerError::AlreadyStarted.to_string(),
        "scheduler already started, cannot start it twice"
    );
    assert_eq!(
        SchedulerError::InvalidConfig("max_parallel_tasks must be greater than 0".into()).to_string(),
        "invalid configuration: max_parallel_tasks must be greater than 0"
    );
}

#[test]
fn test_worker_error_messages() {
    assert_eq!(
        WorkerError::Busy.to_string(),
        "worker busy, cannot execute multiple tasks in parallel"
    );
    assert_eq!(
        WorkerError::Disposed.to_string(),
        "cannot execute task on a disposed worker"
    );
    assert_eq!(
        WorkerError::Timeout { timeout: Duration::from_secs(2) }.to_string(),
        "worker execution timed out after 2000 ms"
    );
    assert_eq!(
        WorkerError::UnexpectedFailure("segfault".into()).to_string(),
        "worker failed with error: segfault"
    );
    assert_eq!(
        WorkerError::UnexpectedExit { code: 137 }.to_string(),
        "worker terminated with exit code 137"
    );
    assert_eq!(
        WorkerError::Termination("still running".into()).to_string(),
        "error while terminating worker: still running"
    );
}

#[test]
fn test_pool_errors() {
    assert_eq!(
        PoolError::Stopped.to_string(),
        "cannot acquire worker from stopped worker pool"
    );
    assert_eq!(
        PoolError::Exhausted { max_size: 4 }.to_string(),
        "no free workers available in worker pool of max-size 4"
    );
}

#[test]
fn test_pool_error_wraps_worker_error() {
    let err: PoolError = WorkerError::Busy.into();
    assert!(matches!(err, PoolError::Worker(WorkerError::Busy)));
    assert_eq!(err.to_string(), WorkerError::Busy.to_string());

    let err = PoolError::Disposal(WorkerError::Termination("boom".into()));
    assert!(err.source().is_some());
}
