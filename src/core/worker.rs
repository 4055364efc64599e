//! Worker capabilities consumed by the pool.
//!
//! Executing a task and disposing of a worker are two separate capabilities.
//! The pool requires both; anything that only executes tasks can still be
//! wrapped by other components.

use async_trait::async_trait;

use crate::core::WorkerError;

/// Executes one task at a time.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_runtime::core::{Worker, WorkerError};
///
/// struct Echo;
///
/// #[async_trait]
/// impl Worker for Echo {
///     type Task = String;
///     type Output = String;
///
///     async fn execute_task(&self, task: String) -> Result<String, WorkerError> {
///         Ok(format!("result: {task}"))
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Input handed to the worker.
    type Task: Send + 'static;
    /// Result produced by the worker.
    type Output: Send + 'static;

    /// Execute `task` and return its result.
    async fn execute_task(&self, task: Self::Task) -> Result<Self::Output, WorkerError>;
}

/// Releases whatever a worker holds (threads, processes, connections).
#[async_trait]
pub trait Dispose: Send + Sync + 'static {
    /// Dispose of the worker. The pool calls this at most once per worker.
    async fn dispose(&self) -> Result<(), WorkerError>;
}

/// Produces new worker instances for a pool.
pub trait WorkerFactory<W>: Send + Sync + 'static {
    /// Create a fresh worker.
    fn create_worker(&self) -> W;
}

impl<W, F> WorkerFactory<W> for F
where
    F: Fn() -> W + Send + Sync + 'static,
{
    fn create_worker(&self) -> W {
        (self)()
    }
}
