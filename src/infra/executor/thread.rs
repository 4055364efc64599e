//! Executor backed by a dedicated OS thread.
//!
//! Each [`ThreadExecutor`] owns one named thread with its own single-threaded
//! tokio runtime, so blocking or CPU-heavy handlers never stall the caller's
//! runtime. Inputs arrive over a crossbeam channel; the thread sleeps in
//! `recv()` until work shows up.
//!
//! A handler error or panic is a crash: the thread publishes `failure`, then
//! `exit(1)`, and ends. Crash recovery is up to the owner (see
//! [`IsolatedWorker`](crate::core::IsolatedWorker)).

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::WorkerConfig;
use crate::core::{Executor, ExecutorEvents, ExecutorFactory, IsolatedWorker, WorkerError};
use crate::util::panic_message;

/// Exit code reported when the thread crashes or is terminated.
pub const CRASH_EXIT_CODE: i32 = 1;

/// Job logic run on executor threads.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_task_runtime::infra::executor::JobHandler;
///
/// struct Tokenize;
///
/// #[async_trait]
/// impl JobHandler<String, usize> for Tokenize {
///     async fn handle(&self, input: String) -> anyhow::Result<usize> {
///         Ok(input.split_whitespace().count())
///     }
/// }
/// ```
#[async_trait]
pub trait JobHandler<I, R>: Send + Sync + 'static {
    /// Process one input.
    async fn handle(&self, input: I) -> anyhow::Result<R>;
}

#[async_trait]
impl<I, R, F> JobHandler<I, R> for F
where
    F: Fn(I) -> anyhow::Result<R> + Send + Sync + 'static,
    I: Send + 'static,
    R: Send + 'static,
{
    async fn handle(&self, input: I) -> anyhow::Result<R> {
        (self)(input)
    }
}

/// An executor running a [`JobHandler`] on its own thread.
pub struct ThreadExecutor<I, R> {
    name: String,
    jobs: Mutex<Option<Sender<I>>>,
    terminated: Arc<AtomicBool>,
    events: ExecutorEvents<R>,
}

impl<I, R> ThreadExecutor<I, R>
where
    I: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Start the executor thread.
    ///
    /// A `stack_size` of 0 keeps the platform default.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Spawn`] if the OS refuses to create the thread.
    pub fn start<H>(name: String, stack_size: usize, handler: Arc<H>) -> Result<Self, WorkerError>
    where
        H: JobHandler<I, R>,
    {
        let (tx, rx) = unbounded::<I>();
        let events = ExecutorEvents::new();
        let terminated = Arc::new(AtomicBool::new(false));

        let mut builder = thread::Builder::new().name(name.clone());
        if stack_size > 0 {
            builder = builder.stack_size(stack_size);
        }

        let thread_events = events.clone();
        let thread_terminated = Arc::clone(&terminated);
        let thread_name = name.clone();
        // Detached: terminate() never joins, a stuck handler must not block the caller.
        builder
            .spawn(move || run_jobs(&thread_name, &rx, handler.as_ref(), &thread_events, &thread_terminated))
            .map_err(|e| WorkerError::Spawn(e.to_string()))?;

        debug!(thread = %name, "executor thread started");
        Ok(Self {
            name,
            jobs: Mutex::new(Some(tx)),
            terminated,
            events,
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether [`terminate`](Executor::terminate) was called.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

fn run_jobs<I, R, H>(
    name: &str,
    jobs: &Receiver<I>,
    handler: &H,
    events: &ExecutorEvents<R>,
    terminated: &AtomicBool,
) where
    R: Clone + Send + 'static,
    H: JobHandler<I, R>,
{
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(thread = %name, error = %e, "failed to create executor runtime");
            crash(events, &format!("failed to create executor runtime: {e}"));
            return;
        }
    };

    // Blocks until input arrives; ends once the sender is dropped.
    while let Ok(input) = jobs.recv() {
        if terminated.load(Ordering::Acquire) {
            break;
        }

        let outcome = rt.block_on(AssertUnwindSafe(handler.handle(input)).catch_unwind());

        // Results of a terminated executor are never published.
        if terminated.load(Ordering::Acquire) {
            break;
        }

        match outcome {
            Ok(Ok(result)) => events.message.emit(result),
            Ok(Err(e)) => {
                error!(thread = %name, error = %e, "job handler failed");
                crash(events, &format!("{e:#}"));
                return;
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(thread = %name, panic = %message, "job handler panicked");
                crash(events, &message);
                return;
            }
        }
    }

    debug!(thread = %name, "executor thread exiting");
}

fn crash<R: Clone + Send + 'static>(events: &ExecutorEvents<R>, message: &str) {
    events.failure.emit(message.to_string());
    events.exit.emit(CRASH_EXIT_CODE);
}

#[async_trait]
impl<I, R> Executor for ThreadExecutor<I, R>
where
    I: Send + 'static,
    R: Clone + Send + 'static,
{
    type Input = I;
    type Output = R;

    fn send(&self, data: I) -> Result<(), WorkerError> {
        let jobs = self.jobs.lock();
        let Some(tx) = jobs.as_ref() else {
            return Err(WorkerError::Send(format!("executor `{}` was terminated", self.name)));
        };
        tx.send(data).map_err(|e| WorkerError::Send(e.to_string()))
    }

    fn events(&self) -> &ExecutorEvents<R> {
        &self.events
    }

    async fn terminate(&self) -> Result<i32, WorkerError> {
        self.terminated.store(true, Ordering::Release);
        // Closing the channel ends the thread once its current job returns.
        drop(self.jobs.lock().take());
        debug!(thread = %self.name, "executor terminated");
        Ok(CRASH_EXIT_CODE)
    }
}

/// Spawns [`ThreadExecutor`]s sharing one handler.
///
/// Clones share the handler and the thread counter, so threads are named
/// `<prefix>-0`, `<prefix>-1`, ... across all clones.
pub struct ThreadExecutorFactory<H, I, R> {
    handler: Arc<H>,
    name_prefix: Arc<str>,
    stack_size: usize,
    spawned: Arc<AtomicUsize>,
    _io: PhantomData<fn(I) -> R>,
}

impl<H, I, R> Clone for ThreadExecutorFactory<H, I, R> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            name_prefix: Arc::clone(&self.name_prefix),
            stack_size: self.stack_size,
            spawned: Arc::clone(&self.spawned),
            _io: PhantomData,
        }
    }
}

impl<H, I, R> ThreadExecutorFactory<H, I, R>
where
    H: JobHandler<I, R>,
    I: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Factory using the default [`WorkerConfig`] thread settings.
    pub fn new(handler: H) -> Self {
        Self::from_config(handler, &WorkerConfig::default())
    }

    /// Factory using the thread settings of `config`.
    pub fn from_config(handler: H, config: &WorkerConfig) -> Self {
        Self {
            handler: Arc::new(handler),
            name_prefix: Arc::from(config.thread_name_prefix.as_str()),
            stack_size: config.thread_stack_size,
            spawned: Arc::new(AtomicUsize::new(0)),
            _io: PhantomData,
        }
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Arc::from(prefix.into());
        self
    }

    /// Set the thread stack size in bytes (0 keeps the platform default).
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Executors spawned so far by this factory and its clones.
    #[must_use]
    pub fn spawned_count(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

impl<H, I, R> ExecutorFactory for ThreadExecutorFactory<H, I, R>
where
    H: JobHandler<I, R>,
    I: Send + 'static,
    R: Clone + Send + 'static,
{
    type Executor = ThreadExecutor<I, R>;

    fn spawn(&self) -> Result<Self::Executor, WorkerError> {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        ThreadExecutor::start(
            format!("{}-{index}", self.name_prefix),
            self.stack_size,
            Arc::clone(&self.handler),
        )
    }
}

/// An isolated worker whose executor is a dedicated thread.
pub type ThreadWorker<H, I, R> = IsolatedWorker<ThreadExecutorFactory<H, I, R>>;
