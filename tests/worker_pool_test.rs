//! Integration tests for WorkerPool
//!
//! These tests validate:
//! - Growing on demand and shrinking back to `min_size`
//! - Worker reuse and max-size exhaustion
//! - Disposal failures surfacing on the error stream
//! - Observable busy / idle / available counters
//! - Idle timeouts and graceful stop
//! - Release on cancellation

use async_trait::async_trait;
use futures::future::join_all;
use prometheus_task_runtime::config::PoolConfig;
use prometheus_task_runtime::core::{Dispose, PoolError, Spawn, Worker, WorkerError, WorkerPool};
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// TEST WORKER
// ============================================================================

/// Shared counters observed across every worker a factory creates.
#[derive(Clone, Default)]
struct Counters {
    created: Arc<AtomicUsize>,
    disposed: Arc<AtomicUsize>,
    fail_next_dispose: Arc<AtomicBool>,
}

impl Counters {
    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn disposed(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }
}

struct TestWorker {
    delay: Duration,
    counters: Counters,
}

#[async_trait]
impl Worker for TestWorker {
    type Task = String;
    type Output = String;

    async fn execute_task(&self, task: String) -> Result<String, WorkerError> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("result: {task}"))
    }
}

#[async_trait]
impl Dispose for TestWorker {
    async fn dispose(&self) -> Result<(), WorkerError> {
        self.counters.disposed.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_next_dispose.swap(false, Ordering::SeqCst) {
            return Err(WorkerError::Execution(anyhow::anyhow!("DisposeError")));
        }
        Ok(())
    }
}

fn pool_with_delay(
    min_size: usize,
    max_size: usize,
    idle_timeout_ms: u64,
    delay: Duration,
) -> (WorkerPool<TestWorker>, Counters) {
    let counters = Counters::default();
    let factory_counters = counters.clone();
    let pool = WorkerPool::new(
        PoolConfig::new()
            .with_min_size(min_size)
            .with_max_size(max_size)
            .with_idle_timeout_ms(idle_timeout_ms),
        move || {
            factory_counters.created.fetch_add(1, Ordering::SeqCst);
            TestWorker {
                delay,
                counters: factory_counters.clone(),
            }
        },
    )
    .unwrap();
    (pool, counters)
}

fn test_pool(min_size: usize, max_size: usize, idle_timeout_ms: u64) -> (WorkerPool<TestWorker>, Counters) {
    pool_with_delay(min_size, max_size, idle_timeout_ms, Duration::from_millis(10))
}

async fn run_tasks(pool: &WorkerPool<TestWorker>, count: usize) -> Vec<Result<String, PoolError>> {
    join_all((1..=count).map(|i| pool.execute_task(i.to_string()))).await
}

/// Starts every background future late, widening the gap between an idle
/// timer firing and the eviction it schedules.
#[derive(Clone)]
struct LaggingSpawner {
    lag: Duration,
}

impl Spawn for LaggingSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let lag = self.lag;
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            fut.await;
        });
    }
}

/// Give background disposals a chance to run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ============================================================================
// SIZING
// ============================================================================

#[tokio::test]
async fn test_new_pool_is_empty() {
    let (pool, counters) = test_pool(0, 5, 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(pool.available_workers(), 5);
    assert_eq!(counters.created(), 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let counters = Counters::default();
    let result = WorkerPool::new(
        PoolConfig::new().with_min_size(3).with_max_size(2),
        move || TestWorker {
            delay: Duration::ZERO,
            counters: counters.clone(),
        },
    );
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}

#[tokio::test]
async fn test_execute_task_grows_then_shrinks_to_zero() {
    let (pool, counters) = test_pool(0, 2, 0);
    let mut size = pool.size_changes();

    let results = run_tasks(&pool, 2).await;
    let results: Vec<String> = results.into_iter().map(Result::unwrap).collect();

    assert_eq!(results, vec!["result: 1", "result: 2"]);
    assert_eq!(pool.size(), 0);
    assert_eq!(size.drain(), vec![0, 1, 2, 1, 0]);

    settle().await;
    assert_eq!(counters.created(), 2);
    assert_eq!(counters.disposed(), 2);
}

#[tokio::test]
async fn test_pool_keeps_min_size_workers() {
    let (pool, counters) = test_pool(3, 5, 0);

    for result in run_tasks(&pool, 5).await {
        result.unwrap();
    }

    assert_eq!(pool.size(), 3);
    settle().await;
    assert_eq!(counters.created(), 5);
    assert_eq!(counters.disposed(), 2);
}

#[tokio::test]
async fn test_exhausted_pool_rejects() {
    let (pool, counters) = test_pool(0, 1, 0);

    let results = run_tasks(&pool, 2).await;
    assert_eq!(results[0].as_deref().unwrap(), "result: 1");

    let err = results[1].as_ref().unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { max_size: 1 }));
    assert_eq!(
        err.to_string(),
        "no free workers available in worker pool of max-size 1"
    );

    assert_eq!(pool.size(), 0);
    settle().await;
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.disposed(), 1);
}

#[tokio::test]
async fn test_workers_are_reused() {
    let (pool, counters) = test_pool(1, 1, 0);

    pool.execute_task("1".to_string()).await.unwrap();
    assert_eq!(pool.size(), 1);
    pool.execute_task("2".to_string()).await.unwrap();
    assert_eq!(pool.size(), 1);

    settle().await;
    assert_eq!(counters.created(), 1);
    assert_eq!(counters.disposed(), 0);
}

#[tokio::test]
async fn test_acquired_workers_are_distinct() {
    let (pool, _counters) = test_pool(0, 3, 0);

    let workers: Vec<_> = (0..3).map(|_| pool.acquire().unwrap()).collect();
    let ids: HashSet<_> = workers.iter().map(|w| w.id()).collect();
    assert_eq!(ids.len(), 3);
    assert!(matches!(pool.acquire(), Err(PoolError::Exhausted { max_size: 3 })));

    for worker in workers {
        pool.release(worker);
    }
    assert_eq!(pool.busy_workers(), 0);
}

#[tokio::test]
async fn test_double_release_is_ignored() {
    let (pool, _counters) = test_pool(1, 2, 0);

    let worker = pool.acquire().unwrap();
    pool.release(worker.clone());
    pool.release(worker);

    assert_eq!(pool.size(), 1);
    assert_eq!(pool.idle_workers(), 1);
    assert_eq!(pool.available_workers(), 2);
}

// ============================================================================
// ERRORS
// ============================================================================

#[tokio::test]
async fn test_disposal_failure_is_reported_on_error_stream() {
    let (pool, counters) = test_pool(0, 1, 0);
    let mut errors = pool.errors();
    counters.fail_next_dispose.store(true, Ordering::SeqCst);

    let result = pool.execute_task("1".to_string()).await;
    assert!(result.is_ok(), "disposal errors never reach the caller");

    settle().await;
    let err = errors.try_recv().expect("disposal error");
    assert!(matches!(*err, PoolError::Disposal(_)));
    assert!(err
        .to_string()
        .starts_with("error while disposing worker-pool worker: "));
    assert!(err.to_string().contains("DisposeError"));
}

#[tokio::test]
async fn test_stopped_pool_rejects_tasks() {
    let (pool, _counters) = test_pool(2, 5, 0);
    pool.stop().await;

    let err = pool.execute_task("1".to_string()).await.unwrap_err();
    assert!(matches!(err, PoolError::Stopped));
    assert_eq!(err.to_string(), "cannot acquire worker from stopped worker pool");
}

// ============================================================================
// STOP
// ============================================================================

#[tokio::test]
async fn test_stop_disposes_all_workers() {
    let (pool, counters) = test_pool(2, 5, 0);

    for result in run_tasks(&pool, 5).await {
        result.unwrap();
    }
    pool.stop().await;
    settle().await;

    assert!(pool.is_stopped());
    assert_eq!(pool.size(), 0);
    assert_eq!(counters.disposed(), 5);
}

#[tokio::test]
async fn test_stop_waits_for_busy_workers() {
    let (pool, counters) = pool_with_delay(0, 2, 1_000, Duration::from_millis(50));

    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.execute_task("slow".to_string()).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(pool.busy_workers(), 1);

    pool.stop().await;

    assert_eq!(running.await.unwrap().unwrap(), "result: slow");
    assert_eq!(pool.busy_workers(), 0);
    assert_eq!(pool.size(), 0);
    assert_eq!(counters.disposed(), 1);
}

// ============================================================================
// OBSERVABLES
// ============================================================================

#[tokio::test]
async fn test_busy_workers_history() {
    let (pool, _counters) = test_pool(2, 5, 0);
    let mut busy = pool.busy_workers_changes();

    run_tasks(&pool, 5).await;
    pool.execute_task("6".to_string()).await.unwrap();

    assert_eq!(busy.drain(), vec![0, 1, 2, 3, 4, 5, 4, 3, 2, 1, 0, 1, 0]);
}

#[tokio::test]
async fn test_idle_workers_history() {
    let (pool, _counters) = test_pool(2, 5, 0);
    let mut idle = pool.idle_workers_changes();

    run_tasks(&pool, 5).await;
    pool.execute_task("6".to_string()).await.unwrap();

    assert_eq!(idle.drain(), vec![0, 1, 2, 1, 2]);
}

#[tokio::test]
async fn test_available_workers_history() {
    let (pool, _counters) = test_pool(2, 5, 0);
    let mut available = pool.available_workers_changes();

    run_tasks(&pool, 5).await;
    pool.execute_task("6".to_string()).await.unwrap();

    assert_eq!(
        available.drain(),
        vec![5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 4, 5]
    );
}

#[tokio::test]
async fn test_available_workers_drop_to_zero_on_stop() {
    let (pool, _counters) = test_pool(2, 5, 0);
    let mut available = pool.available_workers_changes();

    pool.execute_task("1".to_string()).await.unwrap();
    pool.stop().await;

    assert_eq!(available.drain(), vec![5, 4, 5, 0]);
    assert_eq!(pool.available_workers(), 0);
    assert_eq!(pool.idle_workers(), 0);
    assert_eq!(pool.busy_workers(), 0);
}

#[tokio::test]
async fn test_counters_while_task_in_flight() {
    let (pool, _counters) = test_pool(2, 5, 0);
    assert_eq!(pool.available_workers(), 5);

    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.execute_task("1".to_string()).await }
    });
    tokio::task::yield_now().await;

    assert_eq!(pool.available_workers(), 4);
    assert_eq!(pool.busy_workers(), 1);
    assert_eq!(pool.idle_workers(), 0);

    running.await.unwrap().unwrap();

    assert_eq!(pool.available_workers(), 5);
    assert_eq!(pool.busy_workers(), 0);
    assert_eq!(pool.idle_workers(), 1);

    let stats = pool.stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.min_size, 2);
    assert_eq!(stats.max_size, 5);
    assert!(!stats.stopped);
}

#[tokio::test]
async fn test_cancelled_execution_releases_worker() {
    let (pool, counters) = pool_with_delay(0, 1, 0, Duration::from_secs(10));

    let running = tokio::spawn({
        let pool = pool.clone();
        async move { pool.execute_task("never".to_string()).await }
    });
    tokio::task::yield_now().await;
    assert_eq!(pool.busy_workers(), 1);

    running.abort();
    assert!(running.await.unwrap_err().is_cancelled());

    assert_eq!(pool.busy_workers(), 0);
    assert_eq!(pool.available_workers(), 1);
    settle().await;
    assert_eq!(counters.disposed(), 1);
}

// ============================================================================
// IDLE TIMEOUT
// ============================================================================

#[tokio::test]
async fn test_idle_timeout_keeps_workers_for_specified_time() {
    let (pool, counters) = test_pool(2, 5, 100);

    for result in run_tasks(&pool, 5).await {
        result.unwrap();
    }

    settle().await;
    assert_eq!(counters.disposed(), 0);
    assert_eq!(pool.size(), 5);
    assert_eq!(pool.idle_workers(), 5);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.size(), 2);
    assert_eq!(counters.disposed(), 3);
    assert_eq!(counters.created(), 5);

    // Evicted workers are gone: a burst reuses the two survivors and creates the rest anew.
    for result in run_tasks(&pool, 5).await {
        result.unwrap();
    }
    assert_eq!(counters.created(), 8);

    pool.stop().await;
    assert_eq!(pool.size(), 0);
    assert_eq!(counters.disposed(), 8);
}

#[tokio::test]
async fn test_idle_expiry_calls_factory_again() {
    let (pool, counters) = test_pool(0, 1, 50);

    pool.execute_task("1".to_string()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.size(), 0);
    assert_eq!(counters.disposed(), 1);

    pool.execute_task("2".to_string()).await.unwrap();
    assert_eq!(counters.created(), 2);
}

#[tokio::test]
async fn test_late_eviction_spares_reparked_worker() {
    let counters = Counters::default();
    let factory_counters = counters.clone();
    let pool = WorkerPool::with_spawner(
        PoolConfig::new()
            .with_min_size(0)
            .with_max_size(1)
            .with_idle_timeout_ms(100),
        move || {
            factory_counters.created.fetch_add(1, Ordering::SeqCst);
            TestWorker {
                delay: Duration::ZERO,
                counters: factory_counters.clone(),
            }
        },
        LaggingSpawner {
            lag: Duration::from_millis(50),
        },
    )
    .unwrap();

    let worker = pool.acquire().unwrap();
    pool.release(worker);

    // Timer fires at ~150ms; its eviction only runs at ~200ms.
    tokio::time::sleep(Duration::from_millis(170)).await;
    let worker = pool.acquire().unwrap();
    pool.release(worker);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(pool.idle_workers(), 1);
    assert_eq!(pool.size(), 1);
    assert_eq!(counters.disposed(), 0);
    assert_eq!(counters.created(), 1);
}

#[tokio::test]
async fn test_reacquired_idle_worker_is_not_evicted() {
    let (pool, counters) = test_pool(0, 1, 50);

    pool.execute_task("1".to_string()).await.unwrap();
    let worker = pool.acquire().unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.size(), 1);
    assert_eq!(counters.disposed(), 0);

    pool.release(worker);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pool.size(), 0);
    assert_eq!(counters.disposed(), 1);
}
