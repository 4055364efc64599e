//! Builders to construct pools and schedulers from configuration.

use tracing::info;

use crate::config::{PoolConfig, SchedulerConfig};
use crate::core::{Dispose, PoolError, Scheduler, SchedulerError, Spawn, Task, WorkerFactory, WorkerPool};
#[cfg(not(target_arch = "wasm32"))]
use crate::{
    config::RuntimeConfig,
    core::IsolatedWorker,
    infra::executor::{JobHandler, ThreadExecutorFactory, ThreadWorker},
};

/// Build a worker pool from `cfg` using the provided worker factory.
///
/// # Errors
///
/// Returns [`PoolError::InvalidConfig`] if `cfg` is invalid.
pub fn build_worker_pool<W, F, S>(cfg: &PoolConfig, factory: F, spawner: S) -> Result<WorkerPool<W, S>, PoolError>
where
    W: Dispose,
    F: WorkerFactory<W>,
    S: Spawn,
{
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;
    WorkerPool::with_spawner(cfg.clone(), factory, spawner)
}

/// Build a stopped scheduler from `cfg`.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] if `cfg` is invalid.
pub fn build_scheduler<T, S>(cfg: &SchedulerConfig, spawner: S) -> Result<Scheduler<T, S>, SchedulerError>
where
    T: Task,
    S: Spawn,
{
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;
    info!(
        max_parallel_tasks = cfg.max_parallel_tasks,
        max_queued_tasks = cfg.max_queued_tasks,
        "scheduler built"
    );
    Ok(Scheduler::with_spawner(
        cfg.max_parallel_tasks,
        cfg.max_queued_tasks,
        spawner,
    ))
}

/// Build a pool of isolated workers, each running `handler` on its own
/// executor thread named after `cfg.worker.thread_name_prefix`.
///
/// Tasks built with [`WorkerConfig::task`](crate::config::WorkerConfig::task)
/// on `cfg.worker` carry the configured deadline.
///
/// # Errors
///
/// Returns [`PoolError::InvalidConfig`] if `cfg` is invalid.
#[cfg(not(target_arch = "wasm32"))]
pub fn build_thread_worker_pool<H, I, R, S>(
    cfg: &RuntimeConfig,
    handler: H,
    spawner: S,
) -> Result<WorkerPool<ThreadWorker<H, I, R>, S>, PoolError>
where
    H: JobHandler<I, R>,
    I: Send + 'static,
    R: Clone + Send + 'static,
    S: Spawn,
{
    cfg.validate()
        .map_err(|e| PoolError::InvalidConfig(format!("config invalid: {e}")))?;
    let executors = ThreadExecutorFactory::from_config(handler, &cfg.worker);
    WorkerPool::with_spawner(
        cfg.pool.clone(),
        move || IsolatedWorker::new(executors.clone()),
        spawner,
    )
}
