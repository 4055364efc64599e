//! Error types for queue, scheduler, pool, and worker operations.

use std::time::Duration;

use thiserror::Error;

/// Errors produced by [`BoundedQueue`](crate::core::BoundedQueue).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue holds `capacity` items or more; nothing was inserted.
    #[error("queue full: cannot enqueue more than {capacity} items")]
    Full {
        /// Capacity at the time of the rejected insertion.
        capacity: usize,
    },
    /// Dequeue was attempted on an empty queue.
    #[error("cannot dequeue item from empty queue")]
    Empty,
}

/// Errors produced by the [`Scheduler`](crate::core::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue rejected the task (usually because it is full).
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// `start` was called on a scheduler that is already running.
    #[error("scheduler already started, cannot start it twice")]
    AlreadyStarted,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors produced by a single worker or by the executor behind it.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A task is already in flight on this worker.
    #[error("worker busy, cannot execute multiple tasks in parallel")]
    Busy,
    /// The worker has been disposed and accepts no more tasks.
    #[error("cannot execute task on a disposed worker")]
    Disposed,
    /// The task did not produce a result before its deadline.
    #[error("worker execution timed out after {} ms", .timeout.as_millis())]
    Timeout {
        /// Deadline the task was given.
        timeout: Duration,
    },
    /// The executor reported a failure while the task was in flight.
    #[error("executor failed: {0}")]
    ExecutorFailed(String),
    /// The executor exited before delivering the task result.
    #[error("worker terminated with code {code}")]
    ExecutorExited {
        /// Exit status reported by the executor.
        code: i32,
    },
    /// The executor failed outside of any task; reported on the error stream.
    #[error("worker failed with error: {0}")]
    UnexpectedFailure(String),
    /// The executor exited with a non-zero status outside of any task.
    #[error("worker terminated with exit code {code}")]
    UnexpectedExit {
        /// Exit status reported by the executor.
        code: i32,
    },
    /// The executor exited cleanly outside of any task, which is still an anomaly.
    #[error("worker terminated gracefully, which must not happen for an isolated worker")]
    GracefulExit,
    /// Forced termination of the executor failed.
    #[error("error while terminating worker: {0}")]
    Termination(String),
    /// A new executor could not be created.
    #[error("failed to spawn executor: {0}")]
    Spawn(String),
    /// Task input could not be handed to the executor.
    #[error("failed to send task to executor: {0}")]
    Send(String),
    /// The task body itself failed.
    #[error("task execution failed: {0}")]
    Execution(#[source] anyhow::Error),
}

/// Errors produced by the [`WorkerPool`](crate::core::WorkerPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// The pool was stopped; no more workers are handed out.
    #[error("cannot acquire worker from stopped worker pool")]
    Stopped,
    /// Every worker is busy and the pool is already at its maximum size.
    #[error("no free workers available in worker pool of max-size {max_size}")]
    Exhausted {
        /// Configured maximum pool size.
        max_size: usize,
    },
    /// The worker failed to execute the task.
    #[error(transparent)]
    Worker(#[from] WorkerError),
    /// Disposing a worker failed. Only ever reported on the error stream.
    #[error("error while disposing worker-pool worker: {0}")]
    Disposal(#[source] WorkerError),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
