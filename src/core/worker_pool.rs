//! Elastic worker pool.
//!
//! The pool grows on demand up to `max_size`, hands each worker to at most one
//! caller at a time, and shrinks back towards `min_size` once workers are
//! released, either immediately (`idle_timeout == 0`) or after the worker sat
//! idle for `idle_timeout`.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_task_runtime::config::PoolConfig;
//! use prometheus_task_runtime::core::WorkerPool;
//!
//! let pool = WorkerPool::new(
//!     PoolConfig::new().with_min_size(1).with_max_size(4).with_idle_timeout_ms(30_000),
//!     || MyWorker::default(),
//! )?;
//!
//! let result = pool.execute_task(job).await?;
//! pool.stop().await;
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::core::notify::{EventStream, ObservableValue, Subscription};
use crate::core::{BoundedQueue, Dispose, IdleWorker, PoolError, Spawn, Worker, WorkerFactory};
use crate::runtime::TokioSpawner;

/// Pool-unique worker identifier.
pub type WorkerId = u64;

/// A worker owned by a pool.
///
/// Dereferences to the wrapped worker. Handles compare equal by id.
pub struct PooledWorker<W> {
    id: WorkerId,
    worker: Arc<W>,
}

impl<W> PooledWorker<W> {
    /// Id assigned when the pool created the worker.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }
}

impl<W> Clone for PooledWorker<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            worker: Arc::clone(&self.worker),
        }
    }
}

impl<W> PartialEq for PooledWorker<W> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<W> Eq for PooledWorker<W> {}

impl<W> Deref for PooledWorker<W> {
    type Target = W;

    fn deref(&self) -> &W {
        &self.worker
    }
}

impl<W> fmt::Debug for PooledWorker<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledWorker").field("id", &self.id).finish()
    }
}

/// Snapshot of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Idle plus busy workers.
    pub size: usize,
    /// Workers parked for reuse.
    pub idle_workers: usize,
    /// Workers currently handed out.
    pub busy_workers: usize,
    /// Workers that could still be handed out (0 once stopped).
    pub available_workers: usize,
    /// Size the pool never shrinks below while running.
    pub min_size: usize,
    /// Size the pool never grows above.
    pub max_size: usize,
    /// Whether the pool was stopped.
    pub stopped: bool,
}

/// One parking of an idle worker. A worker parked again gets a new token, so
/// an expiry scheduled for an earlier parking cannot evict it.
struct Parked<W> {
    token: u64,
    handle: IdleWorker<PooledWorker<W>>,
}

struct PoolState<W> {
    busy: BoundedQueue<PooledWorker<W>>,
    idle: BoundedQueue<Parked<W>>,
    stopped: bool,
    next_id: WorkerId,
    next_park: u64,
}

impl<W> PoolState<W> {
    fn size(&self) -> usize {
        self.busy.len() + self.idle.len()
    }

    fn park(&mut self, handle: IdleWorker<PooledWorker<W>>) {
        let token = self.next_park;
        self.next_park += 1;
        // The idle queue is unbounded.
        let _ = self.idle.enqueue(Parked { token, handle });
    }
}

struct PoolInner<W, S> {
    min_size: usize,
    max_size: usize,
    idle_timeout: Duration,
    factory: Box<dyn WorkerFactory<W>>,
    state: Mutex<PoolState<W>>,
    size: ObservableValue<usize>,
    available: ObservableValue<usize>,
    idle_count: ObservableValue<usize>,
    busy_count: ObservableValue<usize>,
    errors: EventStream<Arc<PoolError>>,
    spawner: S,
}

impl<W: Dispose, S: Spawn> PoolInner<W, S> {
    fn publish_size(&self, state: &PoolState<W>) {
        self.size.set(state.size());
    }

    fn publish_available(&self, state: &PoolState<W>) {
        let available = if state.stopped {
            0
        } else {
            self.max_size.saturating_sub(state.busy.len())
        };
        self.available.set(available);
    }

    fn acquire(&self) -> Result<PooledWorker<W>, PoolError> {
        let mut state = self.state.lock();
        if state.stopped {
            return Err(PoolError::Stopped);
        }

        if let Ok(parked) = state.idle.dequeue() {
            let worker = parked.handle.into_worker();
            // The busy queue is unbounded.
            let _ = state.busy.enqueue(worker.clone());
            // Reuse leaves the pool size unchanged.
            self.publish_available(&state);
            debug!(worker_id = worker.id, "reusing idle worker");
            return Ok(worker);
        }

        if state.size() < self.max_size {
            let worker = PooledWorker {
                id: state.next_id,
                worker: Arc::new(self.factory.create_worker()),
            };
            state.next_id += 1;
            let _ = state.busy.enqueue(worker.clone());
            self.publish_size(&state);
            self.publish_available(&state);
            debug!(worker_id = worker.id, size = state.size(), "created worker");
            return Ok(worker);
        }

        debug!(max_size = self.max_size, "no free workers available");
        Err(PoolError::Exhausted {
            max_size: self.max_size,
        })
    }

    fn release(self: &Arc<Self>, worker: PooledWorker<W>) {
        let mut state = self.state.lock();
        let current_size = state.size();
        if !state.busy.remove(&worker) {
            warn!(worker_id = worker.id, "released worker is not busy in this pool");
            return;
        }

        if self.idle_timeout.as_millis() < 1 {
            if current_size > self.min_size {
                debug!(worker_id = worker.id, "disposing released worker above minimum size");
                self.dispose_in_background(worker);
                self.publish_size(&state);
            } else {
                debug!(worker_id = worker.id, "parking released worker");
                state.park(IdleWorker::new(worker));
            }
        } else {
            let worker_id = worker.id;
            let token = state.next_park;
            let idle = IdleWorker::with_expiry(worker, self.idle_timeout, &self.spawner);
            let pool = Arc::downgrade(self);
            idle.add_teardown(move || {
                if let Some(pool) = pool.upgrade() {
                    // Evict off the timer path: the pool lock may be held here.
                    let evicting = Arc::clone(&pool);
                    pool.spawner.spawn(async move { evicting.evict_idle(worker_id, token) });
                }
            });
            debug!(worker_id, idle_timeout_ms = self.idle_timeout.as_millis(), "parking released worker");
            state.park(idle);
        }
        self.publish_available(&state);
    }

    /// Dispose the idle worker parked under `token` once its timeout expired,
    /// if the pool can still shrink. A worker reused since then is left alone.
    fn evict_idle(&self, worker_id: WorkerId, token: u64) {
        let mut state = self.state.lock();
        if state.stopped {
            debug!(worker_id, "idle timeout ignored on stopped pool");
            return;
        }
        if state.size() <= self.min_size {
            debug!(worker_id, "idle worker kept at minimum pool size");
            return;
        }
        let Some(parked) = state.idle.remove_by(|parked| parked.token == token) else {
            debug!(worker_id, "idle worker was reused before its eviction ran");
            return;
        };

        debug!(worker_id, "evicting idle worker");
        self.dispose_in_background(parked.handle.into_worker());
        self.publish_size(&state);
        self.publish_available(&state);
    }

    fn dispose_in_background(&self, worker: PooledWorker<W>) {
        let errors = self.errors.clone();
        self.spawner.spawn(dispose_worker(worker, errors));
    }
}

async fn dispose_worker<W: Dispose>(worker: PooledWorker<W>, errors: EventStream<Arc<PoolError>>) {
    if let Err(e) = worker.worker.dispose().await {
        warn!(worker_id = worker.id, error = %e, "worker disposal failed");
        errors.emit(Arc::new(PoolError::Disposal(e)));
    }
}

/// Releases a worker when the execution that borrowed it ends, however it ends.
struct ReleaseGuard<'a, W: Dispose, S: Spawn> {
    pool: &'a Arc<PoolInner<W, S>>,
    worker: Option<PooledWorker<W>>,
}

impl<W: Dispose, S: Spawn> Drop for ReleaseGuard<'_, W, S> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}

/// Elastic pool of reusable workers.
///
/// Cloning yields another handle to the same pool.
pub struct WorkerPool<W, S = TokioSpawner> {
    inner: Arc<PoolInner<W, S>>,
}

impl<W, S> Clone for WorkerPool<W, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Dispose> WorkerPool<W> {
    /// Create an empty pool that runs disposals and idle timers on the ambient tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the configuration is invalid.
    pub fn new<F>(config: PoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: WorkerFactory<W>,
    {
        Self::with_spawner(config, factory, TokioSpawner::default())
    }
}

impl<W: Dispose, S: Spawn> WorkerPool<W, S> {
    /// Create an empty pool that runs disposals and idle timers through `spawner`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the configuration is invalid.
    pub fn with_spawner<F>(config: PoolConfig, factory: F, spawner: S) -> Result<Self, PoolError>
    where
        F: WorkerFactory<W>,
    {
        config.validate().map_err(PoolError::InvalidConfig)?;

        let busy = BoundedQueue::unbounded();
        let idle = BoundedQueue::unbounded();
        let busy_count = busy.size().clone();
        let idle_count = idle.size().clone();

        info!(
            min_size = config.min_size,
            max_size = config.max_size,
            idle_timeout_ms = config.idle_timeout_ms,
            "worker pool initialized"
        );

        Ok(Self {
            inner: Arc::new(PoolInner {
                min_size: config.min_size,
                max_size: config.max_size,
                idle_timeout: config.idle_timeout(),
                factory: Box::new(factory),
                state: Mutex::new(PoolState {
                    busy,
                    idle,
                    stopped: false,
                    next_id: 0,
                    next_park: 0,
                }),
                size: ObservableValue::new(0),
                available: ObservableValue::new(config.max_size),
                idle_count,
                busy_count,
                errors: EventStream::new(),
                spawner,
            }),
        })
    }

    /// Hand out an idle worker, or create one while below `max_size`.
    ///
    /// # Errors
    ///
    /// - [`PoolError::Stopped`] once the pool was stopped
    /// - [`PoolError::Exhausted`] when every worker is busy at `max_size`
    pub fn acquire(&self) -> Result<PooledWorker<W>, PoolError> {
        self.inner.acquire()
    }

    /// Return a worker obtained from [`acquire`](Self::acquire).
    ///
    /// The worker is parked for reuse or disposed in the background; disposal
    /// failures are reported on [`errors`](Self::errors), never to the caller.
    pub fn release(&self, worker: PooledWorker<W>) {
        self.inner.release(worker);
    }

    /// Acquire a worker, run `task` on it and release it again.
    ///
    /// The worker is released whether the task succeeds, fails, or the
    /// returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// Acquisition errors, or [`PoolError::Worker`] when the task fails.
    pub async fn execute_task(&self, task: W::Task) -> Result<W::Output, PoolError>
    where
        W: Worker,
    {
        let worker = self.inner.acquire()?;
        let guard = ReleaseGuard {
            pool: &self.inner,
            worker: Some(worker.clone()),
        };
        let result = worker.execute_task(task).await;
        drop(guard);
        result.map_err(PoolError::from)
    }

    /// Stop handing out workers, wait for busy workers to be released, then
    /// dispose every remaining worker.
    ///
    /// Individual disposal failures are reported on [`errors`](Self::errors)
    /// and do not abort the other disposals.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            state.stopped = true;
            self.inner.publish_available(&state);
            info!(busy = state.busy.len(), idle = state.idle.len(), "stopping worker pool");
        }

        self.inner.busy_count.wait_for(|busy| *busy == 0).await;

        let drained = {
            let mut state = self.inner.state.lock();
            let drained = state.idle.clear();
            self.inner.publish_size(&state);
            self.inner.publish_available(&state);
            drained
        };

        let count = drained.len();
        join_all(
            drained
                .into_iter()
                .map(|parked| dispose_worker(parked.handle.into_worker(), self.inner.errors.clone())),
        )
        .await;
        info!(disposed = count, "worker pool stopped");
    }

    /// Whether [`stop`](Self::stop) was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// Idle plus busy workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size.get()
    }

    /// Workers that could still be handed out: `max_size - busy`, or 0 once stopped.
    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.inner.available.get()
    }

    /// Workers parked for reuse.
    #[must_use]
    pub fn idle_workers(&self) -> usize {
        self.inner.idle_count.get()
    }

    /// Workers currently handed out.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.inner.busy_count.get()
    }

    /// Configured minimum size.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.inner.min_size
    }

    /// Configured maximum size.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Configured idle timeout.
    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Snapshot of occupancy and limits.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            size: state.size(),
            idle_workers: state.idle.len(),
            busy_workers: state.busy.len(),
            available_workers: self.inner.available.get(),
            min_size: self.inner.min_size,
            max_size: self.inner.max_size,
            stopped: state.stopped,
        }
    }

    /// Transitions of [`size`](Self::size), starting with the current value.
    #[must_use]
    pub fn size_changes(&self) -> Subscription<usize> {
        self.inner.size.subscribe()
    }

    /// Transitions of [`available_workers`](Self::available_workers), starting with the current value.
    #[must_use]
    pub fn available_workers_changes(&self) -> Subscription<usize> {
        self.inner.available.subscribe()
    }

    /// Transitions of [`idle_workers`](Self::idle_workers), starting with the current value.
    #[must_use]
    pub fn idle_workers_changes(&self) -> Subscription<usize> {
        self.inner.idle_count.subscribe()
    }

    /// Transitions of [`busy_workers`](Self::busy_workers), starting with the current value.
    #[must_use]
    pub fn busy_workers_changes(&self) -> Subscription<usize> {
        self.inner.busy_count.subscribe()
    }

    /// Errors that have no waiting caller, such as disposal failures.
    #[must_use]
    pub fn errors(&self) -> Subscription<Arc<PoolError>> {
        self.inner.errors.subscribe()
    }
}
