//! Concrete [`Executor`](crate::core::Executor) implementations.

pub mod thread;

pub use thread::{JobHandler, ThreadExecutor, ThreadExecutorFactory, ThreadWorker, CRASH_EXIT_CODE};
