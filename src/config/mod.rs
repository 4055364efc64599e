//! Configuration models for pools, schedulers, and isolated workers.

pub mod pool;

pub use pool::{PoolConfig, RuntimeConfig, SchedulerConfig, WorkerConfig, ENV_PREFIX};
