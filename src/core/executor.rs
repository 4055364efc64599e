//! Contract for the isolated execution unit behind an [`IsolatedWorker`](crate::core::IsolatedWorker).
//!
//! An executor is a long-lived unit (a thread, a process, a remote peer) that
//! accepts inputs and reports back through three event streams:
//!
//! - `message`: a result for the last input
//! - `failure`: the executor hit an error it could not recover from
//! - `exit`: the executor is gone, with its exit code
//!
//! Executors are expected to run until terminated. An exit is never a normal
//! outcome, even with code 0.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::notify::EventStream;
use crate::core::WorkerError;

/// Event streams every executor exposes.
pub struct ExecutorEvents<R> {
    /// Results, one per processed input.
    pub message: EventStream<R>,
    /// Failure descriptions.
    pub failure: EventStream<String>,
    /// Exit codes.
    pub exit: EventStream<i32>,
}

impl<R: Clone + Send + 'static> ExecutorEvents<R> {
    /// Create three empty streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            message: EventStream::new(),
            failure: EventStream::new(),
            exit: EventStream::new(),
        }
    }
}

impl<R: Clone + Send + 'static> Default for ExecutorEvents<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for ExecutorEvents<R> {
    fn clone(&self) -> Self {
        Self {
            message: self.message.clone(),
            failure: self.failure.clone(),
            exit: self.exit.clone(),
        }
    }
}

/// A running execution unit.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Input accepted by [`send`](Self::send).
    type Input: Send + 'static;
    /// Result published on the `message` stream.
    type Output: Clone + Send + 'static;

    /// Hand `data` to the executor.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Send`] when the executor can no longer accept input.
    fn send(&self, data: Self::Input) -> Result<(), WorkerError>;

    /// The executor's event streams.
    fn events(&self) -> &ExecutorEvents<Self::Output>;

    /// Force the executor down and return its exit code.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Termination`] when the executor could not be stopped.
    async fn terminate(&self) -> Result<i32, WorkerError>;
}

/// Creates executors on demand.
pub trait ExecutorFactory: Send + Sync + 'static {
    /// Executor type produced by this factory.
    type Executor: Executor;

    /// Start a fresh executor.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] when the executor could not be started.
    fn spawn(&self) -> Result<Self::Executor, WorkerError>;
}

/// Input for a single isolated execution, bounded by a deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTask<I> {
    /// Deadline for the result.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Payload handed to the executor.
    pub data: I,
}

impl<I> WorkerTask<I> {
    /// Create a task with a deadline.
    pub const fn new(data: I, timeout: Duration) -> Self {
        Self { timeout, data }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
