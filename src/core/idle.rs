//! Idle worker handle with a cancellable expiry timer.

use std::mem;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::core::Spawn;

/// Callback run when an idle worker expires.
pub type Teardown = Box<dyn FnOnce() + Send + 'static>;

enum ExpiryState {
    Pending(Vec<Teardown>),
    Fired,
    Cancelled,
}

struct Expiry {
    state: Mutex<ExpiryState>,
}

impl Expiry {
    fn fire(&self) {
        let teardowns = {
            let mut state = self.state.lock();
            match mem::replace(&mut *state, ExpiryState::Fired) {
                ExpiryState::Pending(teardowns) => teardowns,
                other => {
                    *state = other;
                    return;
                }
            }
        };
        for teardown in teardowns {
            teardown();
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(*state, ExpiryState::Pending(_)) {
            *state = ExpiryState::Cancelled;
        }
    }

    fn add(&self, teardown: Teardown) {
        let mut state = self.state.lock();
        match &mut *state {
            ExpiryState::Pending(teardowns) => teardowns.push(teardown),
            ExpiryState::Fired => {
                drop(state);
                teardown();
            }
            ExpiryState::Cancelled => {}
        }
    }

    fn is_fired(&self) -> bool {
        matches!(*self.state.lock(), ExpiryState::Fired)
    }
}

/// A worker parked for reuse, optionally evicted after an idle timeout.
///
/// When the timer fires, every registered teardown runs once. Cancelling the
/// timeout guarantees the teardowns never run; dropping the handle stops the timer.
pub struct IdleWorker<W> {
    worker: W,
    expiry: Option<Arc<Expiry>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl<W> IdleWorker<W> {
    /// Park `worker` without an expiry timer.
    pub const fn new(worker: W) -> Self {
        Self {
            worker,
            expiry: None,
            cancel: None,
        }
    }

    /// Park `worker` and start a timer that runs the teardowns after `timeout`.
    pub fn with_expiry<S: Spawn>(worker: W, timeout: Duration, spawner: &S) -> Self {
        let expiry = Arc::new(Expiry {
            state: Mutex::new(ExpiryState::Pending(Vec::new())),
        });
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        let timer = Arc::clone(&expiry);
        spawner.spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(timeout) => timer.fire(),
                // Resolves on explicit cancel and when the handle is dropped.
                _ = cancel_rx => {}
            }
        });

        Self {
            worker,
            expiry: Some(expiry),
            cancel: Some(cancel_tx),
        }
    }

    /// Register a callback for timer expiry.
    ///
    /// Runs immediately when the timer already fired; never runs when the
    /// handle has no timer or the timeout was cancelled.
    pub fn add_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(expiry) = &self.expiry {
            expiry.add(Box::new(teardown));
        }
    }

    /// Stop the expiry timer. Pending teardowns are discarded.
    pub fn cancel_idle_timeout(&mut self) {
        if let Some(expiry) = &self.expiry {
            expiry.cancel();
        }
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Whether this handle was created with an expiry timer.
    #[must_use]
    pub const fn has_expiry(&self) -> bool {
        self.expiry.is_some()
    }

    /// Whether the expiry timer has fired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiry.as_ref().is_some_and(|e| e.is_fired())
    }

    /// The parked worker.
    pub const fn worker(&self) -> &W {
        &self.worker
    }

    /// Take the worker back, cancelling the expiry timer.
    pub fn into_worker(mut self) -> W {
        self.cancel_idle_timeout();
        self.worker
    }
}
