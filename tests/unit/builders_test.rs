//! Tests for builder modules

use async_trait::async_trait;
use prometheus_task_runtime::builders::{build_scheduler, build_worker_pool};
use prometheus_task_runtime::config::{PoolConfig, SchedulerConfig};
use prometheus_task_runtime::core::{Dispose, PoolError, SchedulerError, Task, Worker, WorkerError};
use prometheus_task_runtime::runtime::TokioSpawner;

struct Echo;

#[async_trait]
impl Worker for Echo {
    type Task = u32;
    type Output = u32;

    async fn execute_task(&self, task: u32) -> Result<u32, WorkerError> {
        Ok(task)
    }
}

#[async_trait]
impl Dispose for Echo {
    async fn dispose(&self) -> Result<(), WorkerError> {
        Ok(())
    }
}

struct Noop;

#[async_trait]
impl Task for Noop {
    async fn exec(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_build_worker_pool() {
    let cfg = PoolConfig::new().with_min_size(1).with_max_size(2);
    let pool = build_worker_pool(&cfg, || Echo, TokioSpawner::default()).unwrap();

    assert_eq!(pool.min_size(), 1);
    assert_eq!(pool.max_size(), 2);
    assert_eq!(pool.execute_task(7).await.unwrap(), 7);
    assert_eq!(pool.size(), 1);
}

#[test]
fn test_build_worker_pool_invalid_config() {
    let cfg = PoolConfig::new().with_max_size(0);
    let result = build_worker_pool(&cfg, || Echo, TokioSpawner::default());
    assert!(matches!(result, Err(PoolError::InvalidConfig(ref msg)) if msg.starts_with("config invalid")));
}

#[tokio::test]
async fn test_build_scheduler() {
    let cfg = SchedulerConfig::new()
        .with_max_parallel_tasks(2)
        .with_max_queued_tasks(8);
    let scheduler = build_scheduler::<Noop, _>(&cfg, TokioSpawner::default()).unwrap();

    let stats = scheduler.stats();
    assert!(!stats.started);
    assert_eq!(stats.max_parallel_tasks, 2);
    assert_eq!(stats.max_queued_tasks, 8);

    scheduler.submit(Noop).unwrap();
    scheduler.start().unwrap();
    scheduler.await_drained().await;
}

#[test]
fn test_build_scheduler_invalid_config() {
    let cfg = SchedulerConfig::new().with_max_parallel_tasks(0);
    let result = build_scheduler::<Noop, _>(&cfg, TokioSpawner::default());
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
