//! Pool, scheduler, and worker configuration structures.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::WorkerTask;

/// Prefix of every environment variable read by [`RuntimeConfig::from_env`].
pub const ENV_PREFIX: &str = "TASK_RUNTIME_";

fn default_max_size() -> usize {
    num_cpus::get().max(1)
}

fn default_max_queued_tasks() -> usize {
    1024
}

fn default_task_timeout_ms() -> u64 {
    30_000
}

fn default_thread_stack_size() -> usize {
    2 * 1024 * 1024
}

fn default_thread_name_prefix() -> String {
    "task-worker".to_string()
}

/// Worker pool sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Workers kept alive while idle.
    pub min_size: usize,
    /// Upper bound on idle plus busy workers.
    pub max_size: usize,
    /// Idle time before a worker above `min_size` is disposed.
    /// 0 disposes released workers above `min_size` immediately.
    pub idle_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: default_max_size(),
            idle_timeout_ms: 0,
        }
    }
}

impl PoolConfig {
    /// Configuration with defaults (`max_size` = number of CPUs).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `min_size`.
    #[must_use]
    pub const fn with_min_size(mut self, min_size: usize) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set `max_size`.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the idle timeout in milliseconds.
    #[must_use]
    pub const fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    /// Idle timeout as a duration.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Describes the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be greater than 0".into());
        }
        if self.min_size > self.max_size {
            return Err(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            ));
        }
        Ok(())
    }
}

/// Scheduler limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Tasks running at the same time.
    pub max_parallel_tasks: usize,
    /// Tasks waiting for a running slot before submissions are rejected.
    pub max_queued_tasks: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: default_max_size(),
            max_queued_tasks: default_max_queued_tasks(),
        }
    }
}

impl SchedulerConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `max_parallel_tasks`.
    #[must_use]
    pub const fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    /// Set `max_queued_tasks`.
    #[must_use]
    pub const fn with_max_queued_tasks(mut self, max_queued_tasks: usize) -> Self {
        self.max_queued_tasks = max_queued_tasks;
        self
    }

    /// Validate scheduler limits.
    ///
    /// # Errors
    ///
    /// Describes the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_parallel_tasks == 0 {
            return Err("max_parallel_tasks must be greater than 0".into());
        }
        Ok(())
    }
}

/// Settings of isolated workers and their executor threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Deadline of tasks built with [`WorkerConfig::task`].
    pub task_timeout_ms: u64,
    /// Stack size of executor threads in bytes (0 keeps the platform default).
    pub thread_stack_size: usize,
    /// Executor threads are named `<prefix>-<n>`.
    pub thread_name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: default_task_timeout_ms(),
            thread_stack_size: default_thread_stack_size(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl WorkerConfig {
    /// Configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-task deadline in milliseconds.
    #[must_use]
    pub const fn with_task_timeout_ms(mut self, task_timeout_ms: u64) -> Self {
        self.task_timeout_ms = task_timeout_ms;
        self
    }

    /// Set the executor thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, thread_stack_size: usize) -> Self {
        self.thread_stack_size = thread_stack_size;
        self
    }

    /// Set the executor thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Per-task deadline as a duration.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// Wrap `data` in a task carrying the configured deadline.
    #[must_use]
    pub const fn task<I>(&self, data: I) -> WorkerTask<I> {
        WorkerTask::new(data, self.task_timeout())
    }

    /// Validate worker settings.
    ///
    /// # Errors
    ///
    /// Describes the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker pool sizing.
    pub pool: PoolConfig,
    /// Scheduler limits.
    pub scheduler: SchedulerConfig,
    /// Isolated worker settings.
    pub worker: WorkerConfig,
}

impl RuntimeConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Names the section and the first invalid value in it.
    pub fn validate(&self) -> Result<(), String> {
        self.pool.validate().map_err(|e| format!("pool invalid: {e}"))?;
        self.scheduler
            .validate()
            .map_err(|e| format!("scheduler invalid: {e}"))?;
        self.worker
            .validate()
            .map_err(|e| format!("worker invalid: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate. Missing fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` if present, then read `TASK_RUNTIME_*` variables over the defaults.
    ///
    /// | variable | field |
    /// |---|---|
    /// | `TASK_RUNTIME_POOL_MIN_SIZE` | `pool.min_size` |
    /// | `TASK_RUNTIME_POOL_MAX_SIZE` | `pool.max_size` |
    /// | `TASK_RUNTIME_POOL_IDLE_TIMEOUT_MS` | `pool.idle_timeout_ms` |
    /// | `TASK_RUNTIME_MAX_PARALLEL_TASKS` | `scheduler.max_parallel_tasks` |
    /// | `TASK_RUNTIME_MAX_QUEUED_TASKS` | `scheduler.max_queued_tasks` |
    /// | `TASK_RUNTIME_TASK_TIMEOUT_MS` | `worker.task_timeout_ms` |
    /// | `TASK_RUNTIME_THREAD_STACK_SIZE` | `worker.thread_stack_size` |
    /// | `TASK_RUNTIME_THREAD_NAME_PREFIX` | `worker.thread_name_prefix` |
    ///
    /// # Errors
    ///
    /// Unparsable values or validation failure.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    ///
    /// `lookup` receives full variable names, prefix included. Empty values
    /// count as unset.
    ///
    /// # Errors
    ///
    /// Unparsable values or validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        override_parsed(&var, "POOL_MIN_SIZE", &mut cfg.pool.min_size)?;
        override_parsed(&var, "POOL_MAX_SIZE", &mut cfg.pool.max_size)?;
        override_parsed(&var, "POOL_IDLE_TIMEOUT_MS", &mut cfg.pool.idle_timeout_ms)?;
        override_parsed(&var, "MAX_PARALLEL_TASKS", &mut cfg.scheduler.max_parallel_tasks)?;
        override_parsed(&var, "MAX_QUEUED_TASKS", &mut cfg.scheduler.max_queued_tasks)?;
        override_parsed(&var, "TASK_TIMEOUT_MS", &mut cfg.worker.task_timeout_ms)?;
        override_parsed(&var, "THREAD_STACK_SIZE", &mut cfg.worker.thread_stack_size)?;
        if let Some(prefix) = var("THREAD_NAME_PREFIX") {
            cfg.worker.thread_name_prefix = prefix;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn override_parsed<T, V>(var: &V, name: &str, field: &mut T) -> Result<(), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    if let Some(raw) = var(name) {
        *field = raw
            .trim()
            .parse()
            .map_err(|e| format!("{ENV_PREFIX}{name}={raw}: {e}"))?;
    }
    Ok(())
}
