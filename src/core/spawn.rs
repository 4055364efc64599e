//! Runtime seam for background work.

use std::future::Future;

/// Abstraction for spawning task execution on a runtime.
///
/// Scheduler task bodies, worker disposals and idle-expiry timers are all
/// started through this trait, so hosts decide which runtime carries them.
pub trait Spawn: Send + Sync + 'static {
    /// Spawn an async task that runs to completion independently.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
