//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Handle, TryCurrentError};

use crate::core::Spawn;

/// Tokio-based spawner that executes tasks on a tokio runtime.
///
/// The default spawner uses whichever runtime is current when `spawn` is
/// called; [`TokioSpawner::new`] pins it to a specific runtime handle.
#[derive(Clone, Debug, Default)]
pub struct TokioSpawner {
    handle: Option<Arc<Handle>>,
}

impl TokioSpawner {
    /// Create a new `TokioSpawner` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self {
            handle: Some(Arc::new(handle)),
        }
    }

    /// Spawner pinned to the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Fails when called outside of a tokio runtime.
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }

    /// Handle of the runtime tasks are pinned to, if any.
    #[must_use]
    pub fn handle(&self) -> Option<&Handle> {
        self.handle.as_deref()
    }
}

impl Spawn for TokioSpawner {
    /// # Panics
    ///
    /// An unpinned spawner panics when used outside of a tokio runtime.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.handle {
            Some(handle) => {
                handle.spawn(fut);
            }
            None => {
                tokio::spawn(fut);
            }
        }
    }
}
