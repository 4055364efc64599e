//! # Prometheus Task Runtime
//!
//! An in-process task-execution runtime with bounded admission, elastic
//! worker pools, and isolated per-task execution.
//!
//! The crate is made of three cooperating layers:
//!
//! - **Scheduler**: admits tasks into a bounded waiting queue and starts them
//!   in FIFO order while respecting a parallelism cap.
//! - **`WorkerPool`**: hands out reusable workers, growing up to `max_size` on
//!   demand and shrinking back to `min_size` after an idle timeout.
//! - **`IsolatedWorker`**: runs one task at a time on a lazily created
//!   executor (a dedicated thread by default), enforces a per-task deadline,
//!   and replaces the executor after a crash or a timeout.
//!
//! Every counter and lifecycle event is observable. Queue lengths, pool sizes
//! and worker availability are published as de-duplicated value streams;
//! task and worker lifecycle events as event streams.
//!
//! ## Scheduler
//!
//! ```rust,ignore
//! use prometheus_task_runtime::core::Scheduler;
//!
//! let scheduler = Scheduler::new(2, 100);
//! scheduler.submit(|| async { do_work().await })?;
//! scheduler.start()?;
//! scheduler.await_drained().await;
//! ```
//!
//! ## Pool of thread-backed workers
//!
//! ```rust,ignore
//! use prometheus_task_runtime::builders::build_thread_worker_pool;
//! use prometheus_task_runtime::config::RuntimeConfig;
//! use prometheus_task_runtime::runtime::TokioSpawner;
//!
//! let cfg = RuntimeConfig::from_env()?;
//! let pool = build_thread_worker_pool(
//!     &cfg,
//!     |prompt: String| Ok(prompt.len()),
//!     TokioSpawner::default(),
//! )?;
//!
//! // Deadline from TASK_RUNTIME_TASK_TIMEOUT_MS
//! let len = pool.execute_task(cfg.worker.task("hello".to_string())).await?;
//! pool.stop().await;
//! ```
//!
//! For complete examples, see the integration tests under `tests/`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: queues, scheduler, pools, workers.
pub mod core;
/// Configuration models for pools, schedulers, and workers.
pub mod config;
/// Builders to construct runtime components from configuration.
pub mod builders;
/// Infrastructure adapters: concrete executors.
pub mod infra;
/// Runtime adapters.
pub mod runtime;
/// Shared utilities.
pub mod util;
