//! Builders that assemble pools and schedulers from configuration.

pub mod pool_builder;

pub use pool_builder::{build_scheduler, build_thread_worker_pool, build_worker_pool};
