//! Single-worker execution wrapper around an isolated [`Executor`].
//!
//! An [`IsolatedWorker`] owns at most one executor at a time and runs at most
//! one task on it. The executor is created lazily on the first task and is
//! thrown away as soon as it crashes, exits, or misses a deadline, so a dead
//! executor is never reused. The next task starts a fresh one.
//!
//! Errors that have no waiting caller (a crash between tasks, a failed forced
//! termination) are published on [`IsolatedWorker::errors`].

use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::executor::{Executor, ExecutorFactory, WorkerTask};
use crate::core::notify::{EventStream, RegistrationSet, Subscription};
use crate::core::{Dispose, Spawn, Worker, WorkerError};
use crate::runtime::TokioSpawner;

type Outcome<R> = Result<R, WorkerError>;
type OutcomeSlot<R> = Arc<Mutex<Option<oneshot::Sender<Outcome<R>>>>>;

struct Instance<X> {
    executor: Arc<X>,
    generation: u64,
    // Failure/exit handlers that live as long as the executor is current.
    standing: RegistrationSet,
}

struct IsolatedState<X> {
    instance: Option<Instance<X>>,
    working: bool,
    disposed: bool,
    next_generation: u64,
}

struct IsolatedInner<F: ExecutorFactory> {
    factory: F,
    state: Mutex<IsolatedState<F::Executor>>,
    errors: EventStream<Arc<WorkerError>>,
}

impl<F: ExecutorFactory> IsolatedInner<F> {
    fn report(&self, error: WorkerError) {
        warn!(error = %error, "isolated worker error");
        self.errors.emit(Arc::new(error));
    }

    /// Current executor and its generation, or a freshly spawned one.
    fn obtain_executor(
        self: &Arc<Self>,
        state: &mut IsolatedState<F::Executor>,
    ) -> Result<(Arc<F::Executor>, u64), WorkerError> {
        if let Some(instance) = &state.instance {
            return Ok((Arc::clone(&instance.executor), instance.generation));
        }

        let executor = Arc::new(self.factory.spawn()?);
        let generation = state.next_generation;
        state.next_generation += 1;

        let mut standing = RegistrationSet::new();
        let events = executor.events();

        let worker = Arc::downgrade(self);
        standing.push(events.failure.on(move |message: &String| {
            Self::on_unexpected(&worker, generation, WorkerError::UnexpectedFailure(message.clone()));
        }));

        let worker = Arc::downgrade(self);
        standing.push(events.exit.on(move |code: &i32| {
            let error = if *code == 0 {
                WorkerError::GracefulExit
            } else {
                WorkerError::UnexpectedExit { code: *code }
            };
            Self::on_unexpected(&worker, generation, error);
        }));

        debug!(generation, "spawned executor");
        state.instance = Some(Instance {
            executor: Arc::clone(&executor),
            generation,
            standing,
        });
        Ok((executor, generation))
    }

    /// Drop the executor of `generation` if it is still current and report `error`.
    fn on_unexpected(worker: &Weak<Self>, generation: u64, error: WorkerError) {
        let Some(worker) = worker.upgrade() else {
            return;
        };
        let discarded = {
            let mut state = worker.state.lock();
            let current = state
                .instance
                .as_ref()
                .is_some_and(|instance| instance.generation == generation);
            if current {
                state.instance.take()
            } else {
                None
            }
        };
        // A stale generation was already replaced or terminated on purpose.
        if let Some(instance) = discarded {
            debug!(generation = instance.generation, "discarded crashed executor");
            drop(instance);
            worker.report(error);
        }
    }

    async fn execute(
        self: &Arc<Self>,
        task: WorkerTask<<F::Executor as Executor>::Input>,
    ) -> Outcome<<F::Executor as Executor>::Output> {
        let (executor, generation) = {
            let mut state = self.state.lock();
            if state.working {
                return Err(WorkerError::Busy);
            }
            if state.disposed {
                return Err(WorkerError::Disposed);
            }
            let obtained = self.obtain_executor(&mut state)?;
            state.working = true;
            obtained
        };
        let mut in_flight = InFlight {
            worker: self,
            generation,
            settled: false,
        };

        let (tx, rx) = oneshot::channel();
        let slot: OutcomeSlot<<F::Executor as Executor>::Output> = Arc::new(Mutex::new(Some(tx)));
        let events = executor.events();
        let mut triggers = RegistrationSet::new();

        let on_message = Arc::clone(&slot);
        triggers.push(events.message.on(move |result| {
            resolve(&on_message, Ok(result.clone()));
        }));
        let on_failure = Arc::clone(&slot);
        triggers.push(events.failure.on(move |message: &String| {
            resolve(&on_failure, Err(WorkerError::ExecutorFailed(message.clone())));
        }));
        let on_exit = Arc::clone(&slot);
        triggers.push(events.exit.on(move |code: &i32| {
            resolve(&on_exit, Err(WorkerError::ExecutorExited { code: *code }));
        }));

        if let Err(e) = executor.send(task.data) {
            in_flight.settled = true;
            triggers.release_all();
            self.terminate_worker().await;
            return Err(e);
        }

        let outcome = tokio::time::timeout(task.timeout, rx).await;
        in_flight.settled = true;
        triggers.release_all();

        match outcome {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(WorkerError::ExecutorFailed(
                "executor dropped the pending task".to_string(),
            )),
            Err(_) => {
                self.report(WorkerError::Timeout {
                    timeout: task.timeout,
                });
                self.terminate_worker().await;
                Err(WorkerError::Timeout {
                    timeout: task.timeout,
                })
            }
        }
    }

    async fn terminate_worker(&self) {
        let instance = {
            let mut state = self.state.lock();
            state.instance.take()
        };
        if let Some(instance) = instance {
            self.terminate_instance(instance).await;
        }
    }

    /// Terminate an executor that was already detached from the worker.
    async fn terminate_instance(&self, mut instance: Instance<F::Executor>) {
        instance.standing.release_all();

        match instance.executor.terminate().await {
            Ok(code) => debug!(generation = instance.generation, code, "terminated executor"),
            Err(e) => {
                let error = match e {
                    WorkerError::Termination(_) => e,
                    other => WorkerError::Termination(other.to_string()),
                };
                self.report(error);
            }
        }
    }
}

fn resolve<R>(slot: &OutcomeSlot<R>, outcome: Outcome<R>) {
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(outcome);
    }
}

/// Clears the in-flight flag on every exit path.
///
/// When the execution is dropped before its outcome settled, the executor may
/// still be working on the abandoned input, so it is detached and terminated.
struct InFlight<'a, F: ExecutorFactory> {
    worker: &'a Arc<IsolatedInner<F>>,
    generation: u64,
    settled: bool,
}

impl<F: ExecutorFactory> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        let abandoned = {
            let mut state = self.worker.state.lock();
            state.working = false;
            let current = state
                .instance
                .as_ref()
                .is_some_and(|instance| instance.generation == self.generation);
            if current && !self.settled {
                state.instance.take()
            } else {
                None
            }
        };
        let Some(instance) = abandoned else {
            return;
        };

        debug!(generation = self.generation, "task abandoned, discarding its executor");
        match TokioSpawner::try_current() {
            Ok(spawner) => {
                let worker = Arc::clone(self.worker);
                spawner.spawn(async move { worker.terminate_instance(instance).await });
            }
            Err(e) => {
                warn!(generation = self.generation, error = %e, "no runtime to terminate abandoned executor");
            }
        }
    }
}

/// Runs tasks one at a time on a lazily created, isolated executor.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use prometheus_task_runtime::core::{IsolatedWorker, WorkerTask};
///
/// let worker = IsolatedWorker::new(factory);
/// let result = worker
///     .execute_task(WorkerTask::new(input, Duration::from_secs(5)))
///     .await?;
/// worker.dispose().await?;
/// ```
pub struct IsolatedWorker<F: ExecutorFactory> {
    inner: Arc<IsolatedInner<F>>,
}

impl<F: ExecutorFactory> Clone for IsolatedWorker<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: ExecutorFactory> fmt::Debug for IsolatedWorker<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("IsolatedWorker")
            .field("has_executor", &state.instance.is_some())
            .field("working", &state.working)
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<F: ExecutorFactory> IsolatedWorker<F> {
    /// Create a worker. No executor is started until the first task.
    pub fn new(factory: F) -> Self {
        Self {
            inner: Arc::new(IsolatedInner {
                factory,
                state: Mutex::new(IsolatedState {
                    instance: None,
                    working: false,
                    disposed: false,
                    next_generation: 0,
                }),
                errors: EventStream::new(),
            }),
        }
    }

    /// Send `task.data` to the executor and wait for its result.
    ///
    /// # Errors
    ///
    /// - [`WorkerError::Busy`] if another task is in flight
    /// - [`WorkerError::Disposed`] after [`dispose`](Self::dispose)
    /// - [`WorkerError::Spawn`] / [`WorkerError::Send`] if the executor could not be reached
    /// - [`WorkerError::ExecutorFailed`] / [`WorkerError::ExecutorExited`] if it died first
    /// - [`WorkerError::Timeout`] if no result arrived within `task.timeout`;
    ///   the executor is terminated and replaced on the next call
    pub async fn execute_task(
        &self,
        task: WorkerTask<<F::Executor as Executor>::Input>,
    ) -> Result<<F::Executor as Executor>::Output, WorkerError> {
        self.inner.execute(task).await
    }

    /// Refuse further tasks and terminate the current executor, if any.
    ///
    /// Termination failures go to [`errors`](Self::errors).
    pub async fn dispose(&self) {
        self.inner.state.lock().disposed = true;
        self.inner.terminate_worker().await;
    }

    /// Discard and terminate the current executor. No-op without one.
    pub async fn terminate_worker(&self) {
        self.inner.terminate_worker().await;
    }

    /// Errors that have no waiting caller.
    #[must_use]
    pub fn errors(&self) -> Subscription<Arc<WorkerError>> {
        self.inner.errors.subscribe()
    }

    /// Whether a task is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().working
    }

    /// Whether the worker was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Whether an executor is currently alive.
    #[must_use]
    pub fn has_executor(&self) -> bool {
        self.inner.state.lock().instance.is_some()
    }
}

#[async_trait]
impl<F: ExecutorFactory> Worker for IsolatedWorker<F> {
    type Task = WorkerTask<<F::Executor as Executor>::Input>;
    type Output = <F::Executor as Executor>::Output;

    async fn execute_task(&self, task: Self::Task) -> Result<Self::Output, WorkerError> {
        self.inner.execute(task).await
    }
}

#[async_trait]
impl<F: ExecutorFactory> Dispose for IsolatedWorker<F> {
    async fn dispose(&self) -> Result<(), WorkerError> {
        self.inner.state.lock().disposed = true;
        self.inner.terminate_worker().await;
        Ok(())
    }
}
