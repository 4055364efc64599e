//! Bounded admission and parallelism limiter.
//!
//! The scheduler keeps two bounded queues: tasks waiting for a slot and tasks
//! currently running. Once started, every submission and every completion
//! triggers a dispatch pass that moves tasks from the queued set to the running
//! set, strictly in submission order, while running slots are free.
//!
//! Admission is a hard bound: submitting to a full queue fails immediately
//! with [`QueueError::Full`](crate::core::QueueError::Full) instead of waiting.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::notify::{EventStream, ObservableValue, Subscription};
use crate::core::{BoundedQueue, SchedulerError, Spawn};
use crate::runtime::TokioSpawner;
use crate::util::panic_message;

/// Identifier assigned to each submitted task, increasing with submission order.
pub type TaskId = u64;

/// A unit of asynchronous work.
///
/// Closures returning a future are tasks too:
///
/// ```rust,ignore
/// scheduler.submit(|| async { Ok(()) })?;
/// ```
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Run the task body.
    async fn exec(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Task for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn exec(&self) -> anyhow::Result<()> {
        (self)().await
    }
}

/// A submitted task together with its id.
///
/// This is what the notification streams carry. Entries compare equal by id.
pub struct TaskEntry<T> {
    id: TaskId,
    task: Arc<T>,
}

impl<T> TaskEntry<T> {
    /// Id assigned at submission.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Shared handle to the task.
    #[must_use]
    pub const fn task(&self) -> &Arc<T> {
        &self.task
    }
}

impl<T> Clone for TaskEntry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            task: Arc::clone(&self.task),
        }
    }
}

impl<T> PartialEq for TaskEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for TaskEntry<T> {}

impl<T> Deref for TaskEntry<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.task
    }
}

impl<T> fmt::Debug for TaskEntry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEntry").field("id", &self.id).finish()
    }
}

/// A task that finished with an error.
pub struct TaskFailure<T> {
    /// The failed task.
    pub task: TaskEntry<T>,
    /// Error returned by the task body (panics are converted into errors).
    pub error: Arc<anyhow::Error>,
}

impl<T> Clone for TaskFailure<T> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
            error: Arc::clone(&self.error),
        }
    }
}

impl<T> fmt::Debug for TaskFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFailure")
            .field("task", &self.task)
            .field("error", &self.error)
            .finish()
    }
}

/// Snapshot of scheduler occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Whether the scheduler is dispatching tasks.
    pub started: bool,
    /// Tasks waiting for a running slot.
    pub queued_tasks: usize,
    /// Tasks currently executing.
    pub running_tasks: usize,
    /// Maximum number of waiting tasks.
    pub max_queued_tasks: usize,
    /// Maximum number of concurrently executing tasks.
    pub max_parallel_tasks: usize,
}

struct SchedulerState<T> {
    queued: BoundedQueue<TaskEntry<T>>,
    running: BoundedQueue<TaskEntry<T>>,
    started: bool,
    next_id: TaskId,
}

impl<T> SchedulerState<T> {
    fn size(&self) -> usize {
        self.queued.len() + self.running.len()
    }
}

struct SchedulerInner<T, S> {
    state: Mutex<SchedulerState<T>>,
    size: ObservableValue<usize>,
    queued_count: ObservableValue<usize>,
    running_count: ObservableValue<usize>,
    task_queued: EventStream<TaskEntry<T>>,
    task_starting: EventStream<TaskEntry<T>>,
    task_completed: EventStream<TaskEntry<T>>,
    task_error: EventStream<TaskFailure<T>>,
    spawner: S,
}

impl<T: Task, S: Spawn> SchedulerInner<T, S> {
    /// Move queued tasks into free running slots and start them.
    fn dispatch(self: &Arc<Self>) {
        let starting = {
            let mut state = self.state.lock();
            if !state.started {
                return;
            }

            let mut starting = Vec::new();
            while state.running.free_slots() > 0 && !state.queued.is_empty() {
                let Ok(entry) = state.queued.dequeue() else {
                    break;
                };
                if let Err(e) = state.running.enqueue(entry.clone()) {
                    // Unreachable while a free slot was observed under the lock.
                    warn!(task_id = entry.id, error = %e, "failed to move task into running set");
                    break;
                }
                // Moving between queues leaves the total size unchanged.
                self.task_starting.emit(entry.clone());
                starting.push(entry);
            }
            starting
        };

        for entry in starting {
            self.spawn_task(entry);
        }
    }

    fn spawn_task(self: &Arc<Self>, entry: TaskEntry<T>) {
        let inner = Arc::clone(self);
        self.spawner.spawn(async move {
            debug!(task_id = entry.id, "executing task");
            let result = match AssertUnwindSafe(entry.task.exec()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!(
                    "task panicked: {}",
                    panic_message(panic.as_ref())
                )),
            };
            inner.on_task_finished(entry, result);
        });
    }

    fn on_task_finished(self: &Arc<Self>, entry: TaskEntry<T>, result: anyhow::Result<()>) {
        {
            let mut state = self.state.lock();
            if let Err(error) = result {
                warn!(task_id = entry.id, error = %error, "task failed");
                self.task_error.emit(TaskFailure {
                    task: entry.clone(),
                    error: Arc::new(error),
                });
            }
            state.running.remove(&entry);
            self.size.set(state.size());
            debug!(task_id = entry.id, "task completed");
            self.task_completed.emit(entry);
        }
        self.dispatch();
    }
}

/// Admission-controlled task scheduler with a parallelism limit.
///
/// Cloning yields another handle to the same scheduler.
pub struct Scheduler<T, S = TokioSpawner> {
    inner: Arc<SchedulerInner<T, S>>,
}

impl<T, S> Clone for Scheduler<T, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Task> Scheduler<T> {
    /// Create a stopped scheduler running task bodies on the ambient tokio runtime.
    #[must_use]
    pub fn new(max_parallel_tasks: usize, max_queued_tasks: usize) -> Self {
        Self::with_spawner(max_parallel_tasks, max_queued_tasks, TokioSpawner::default())
    }
}

impl<T: Task, S: Spawn> Scheduler<T, S> {
    /// Create a stopped scheduler running task bodies through `spawner`.
    pub fn with_spawner(max_parallel_tasks: usize, max_queued_tasks: usize, spawner: S) -> Self {
        let queued = BoundedQueue::new(max_queued_tasks);
        let running = BoundedQueue::new(max_parallel_tasks);
        let queued_count = queued.size().clone();
        let running_count = running.size().clone();

        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(SchedulerState {
                    queued,
                    running,
                    started: false,
                    next_id: 0,
                }),
                size: ObservableValue::new(0),
                queued_count,
                running_count,
                task_queued: EventStream::new(),
                task_starting: EventStream::new(),
                task_completed: EventStream::new(),
                task_error: EventStream::new(),
                spawner,
            }),
        }
    }

    /// Queue a task. Dispatches immediately when the scheduler is started.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Queue`] when the waiting queue is full.
    pub fn submit(&self, task: T) -> Result<TaskEntry<T>, SchedulerError> {
        let (entry, started) = {
            let mut state = self.inner.state.lock();
            let entry = TaskEntry {
                id: state.next_id,
                task: Arc::new(task),
            };
            if let Err(e) = state.queued.enqueue(entry.clone()) {
                warn!(
                    queued = state.queued.len(),
                    capacity = state.queued.capacity(),
                    "task rejected: queue full"
                );
                return Err(e.into());
            }
            state.next_id += 1;
            self.inner.size.set(state.size());
            debug!(task_id = entry.id, "task queued");
            self.inner.task_queued.emit(entry.clone());
            (entry, state.started)
        };

        if started {
            self.inner.dispatch();
        }
        Ok(entry)
    }

    /// Begin dispatching queued tasks, now and after every submission or completion.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::AlreadyStarted`] when already started.
    pub fn start(&self) -> Result<(), SchedulerError> {
        {
            let mut state = self.inner.state.lock();
            if state.started {
                return Err(SchedulerError::AlreadyStarted);
            }
            state.started = true;
            info!(
                queued = state.queued.len(),
                max_parallel_tasks = state.running.capacity(),
                "scheduler started"
            );
        }
        self.inner.dispatch();
        Ok(())
    }

    /// Stop pulling queued tasks. Running tasks continue to completion.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if state.started {
            state.started = false;
            info!(
                queued = state.queued.len(),
                running = state.running.len(),
                "scheduler stopped"
            );
        }
    }

    /// Wait until no task is queued or running.
    pub async fn await_drained(&self) {
        self.inner.size.wait_for(|size| *size == 0).await;
    }

    /// Change the parallelism limit. Running tasks are never evicted.
    pub fn set_max_parallel_tasks(&self, count: usize) {
        self.inner.state.lock().running.set_capacity(count);
        self.inner.dispatch();
    }

    /// Change the waiting-queue limit. Queued tasks are never evicted.
    pub fn set_max_queued_tasks(&self, count: usize) {
        self.inner.state.lock().queued.set_capacity(count);
    }

    /// Whether the scheduler is dispatching tasks.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Queued plus running tasks.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size.get()
    }

    /// Tasks waiting for a running slot.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.queued_count.get()
    }

    /// Tasks currently executing.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.inner.running_count.get()
    }

    /// Snapshot of occupancy and limits.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.state.lock();
        SchedulerStats {
            started: state.started,
            queued_tasks: state.queued.len(),
            running_tasks: state.running.len(),
            max_queued_tasks: state.queued.capacity(),
            max_parallel_tasks: state.running.capacity(),
        }
    }

    /// Transitions of [`size`](Self::size), starting with the current value.
    #[must_use]
    pub fn size_changes(&self) -> Subscription<usize> {
        self.inner.size.subscribe()
    }

    /// Transitions of [`queued_count`](Self::queued_count), starting with the current value.
    #[must_use]
    pub fn queued_count_changes(&self) -> Subscription<usize> {
        self.inner.queued_count.subscribe()
    }

    /// Transitions of [`running_count`](Self::running_count), starting with the current value.
    #[must_use]
    pub fn running_count_changes(&self) -> Subscription<usize> {
        self.inner.running_count.subscribe()
    }

    /// Tasks accepted into the waiting queue.
    #[must_use]
    pub fn task_queued(&self) -> Subscription<TaskEntry<T>> {
        self.inner.task_queued.subscribe()
    }

    /// Tasks moved into a running slot, just before their body starts.
    #[must_use]
    pub fn task_starting(&self) -> Subscription<TaskEntry<T>> {
        self.inner.task_starting.subscribe()
    }

    /// Tasks that finished, successfully or not.
    #[must_use]
    pub fn task_completed(&self) -> Subscription<TaskEntry<T>> {
        self.inner.task_completed.subscribe()
    }

    /// Tasks whose body returned an error or panicked.
    #[must_use]
    pub fn task_error(&self) -> Subscription<TaskFailure<T>> {
        self.inner.task_error.subscribe()
    }
}
