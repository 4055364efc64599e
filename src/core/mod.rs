//! Core scheduling abstractions: queues, scheduler, worker pool, and isolated workers.

pub mod error;
pub mod executor;
pub mod idle;
pub mod isolated;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod spawn;
pub mod worker;
pub mod worker_pool;

pub use error::{AppResult, PoolError, QueueError, SchedulerError, WorkerError};
pub use executor::{Executor, ExecutorEvents, ExecutorFactory, WorkerTask};
pub use idle::{IdleWorker, Teardown};
pub use isolated::IsolatedWorker;
pub use notify::{EventStream, ObservableValue, Registration, RegistrationSet, Subscription};
pub use queue::BoundedQueue;
pub use scheduler::{Scheduler, SchedulerStats, Task, TaskEntry, TaskFailure, TaskId};
pub use spawn::Spawn;
pub use worker::{Dispose, Worker, WorkerFactory};
pub use worker_pool::{PoolStats, PooledWorker, WorkerId, WorkerPool};
