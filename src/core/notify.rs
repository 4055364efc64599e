//! Push-based notification primitives.
//!
//! Every state transition in the scheduler and the pools is published through
//! these types. Delivery is synchronous: a value is handed to each subscriber
//! at the moment of the transition, so subscribers never observe values out of
//! order and never miss one.
//!
//! - [`EventStream`] broadcasts discrete events (task queued, worker error, ...).
//! - [`ObservableValue`] caches a current value and only publishes genuine
//!   transitions, suppressing consecutive duplicates.
//! - [`Registration`] and [`RegistrationSet`] release callback subscriptions
//!   when dropped, on every exit path.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

enum Sink<T> {
    Channel(UnboundedSender<T>),
    Callback {
        handler: Callback<T>,
        active: Arc<AtomicBool>,
    },
}

struct Subscriber<T> {
    id: u64,
    sink: Sink<T>,
}

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<Subscriber<T>>,
}

impl<T> Subscribers<T> {
    fn push(&mut self, sink: Sink<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Subscriber { id, sink });
        id
    }
}

/// Broadcast stream of discrete events.
///
/// Channel subscribers receive every emitted value in order. Callback
/// subscribers are invoked on the emitting thread, after channel delivery and
/// outside of the internal lock, in registration order.
pub struct EventStream<T> {
    inner: Arc<Mutex<Subscribers<T>>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventStream<T> {
    /// Create a stream without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Publish a value to every subscriber.
    pub fn emit(&self, value: T) {
        let callbacks: Vec<(Callback<T>, Arc<AtomicBool>)> = {
            let mut subscribers = self.inner.lock();
            subscribers.entries.retain(|s| match &s.sink {
                Sink::Channel(tx) => tx.send(value.clone()).is_ok(),
                Sink::Callback { .. } => true,
            });
            subscribers
                .entries
                .iter()
                .filter_map(|s| match &s.sink {
                    Sink::Callback { handler, active } => {
                        Some((Arc::clone(handler), Arc::clone(active)))
                    }
                    Sink::Channel(_) => None,
                })
                .collect()
        };

        for (handler, active) in callbacks {
            // An earlier handler may have unregistered this one.
            if active.load(Ordering::Acquire) {
                handler(&value);
            }
        }
    }

    /// Subscribe through a channel. Dropping the subscription unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().push(Sink::Channel(tx));
        Subscription { rx }
    }

    /// Register a callback invoked for every emitted value until the returned
    /// registration is released.
    #[must_use = "dropping the registration unregisters the handler immediately"]
    pub fn on<F>(&self, handler: F) -> Registration
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = self.inner.lock().push(Sink::Callback {
            handler: Arc::new(handler),
            active: Arc::clone(&active),
        });

        let subscribers = Arc::downgrade(&self.inner);
        Registration::new(move || {
            active.store(false, Ordering::Release);
            if let Some(subscribers) = subscribers.upgrade() {
                subscribers.lock().entries.retain(|s| s.id != id);
            }
        })
    }

    /// Number of live subscribers (closed channels excluded).
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|s| match &s.sink {
                Sink::Channel(tx) => !tx.is_closed(),
                Sink::Callback { .. } => true,
            })
            .count()
    }
}

struct ValueState<T> {
    value: T,
    subscribers: Vec<UnboundedSender<T>>,
}

/// A cached value that publishes every genuine transition.
///
/// Setting the value it already holds is a no-op, so subscribers only ever
/// see distinct consecutive values. A fresh subscription first yields the
/// current value.
pub struct ObservableValue<T> {
    inner: Arc<Mutex<ValueState<T>>>,
}

impl<T> Clone for ObservableValue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> ObservableValue<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Create an observable holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ValueState {
                value: initial,
                subscribers: Vec::new(),
            })),
        }
    }

    /// Current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Replace the value. Returns `true` when this was a transition.
    pub fn set(&self, value: T) -> bool {
        let mut state = self.inner.lock();
        if state.value == value {
            return false;
        }
        state.value = value;
        let current = state.value.clone();
        state
            .subscribers
            .retain(|tx| tx.send(current.clone()).is_ok());
        true
    }

    /// Subscribe to transitions, starting with the current value.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        // Cannot fail: the receiver is still in scope.
        let _ = tx.send(state.value.clone());
        state.subscribers.push(tx);
        Subscription { rx }
    }

    /// Suspend until the value satisfies `predicate` and return that value.
    /// Resolves immediately when the current value already matches.
    pub async fn wait_for<P>(&self, mut predicate: P) -> T
    where
        P: FnMut(&T) -> bool,
    {
        let mut changes = self.subscribe();
        while let Some(value) = changes.recv().await {
            if predicate(&value) {
                return value;
            }
        }
        self.get()
    }
}

/// Receiving end of a channel subscription.
///
/// Implements [`Stream`]; values are buffered, so a slow reader never loses
/// notifications.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    /// Wait for the next value.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next buffered value without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Take every value buffered so far.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::new();
        while let Ok(value) = self.rx.try_recv() {
            values.push(value);
        }
        values
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Guard for a single callback subscription.
///
/// Releasing is idempotent and also happens on drop.
pub struct Registration {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Stop receiving events. Further calls do nothing.
    pub fn unregister(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Whether the handler is still registered.
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        self.release.is_some()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unregister();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// A group of registrations released together.
#[derive(Debug, Default)]
pub struct RegistrationSet {
    registrations: Vec<Registration>,
}

impl RegistrationSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Add a registration to the set.
    pub fn push(&mut self, registration: Registration) {
        self.registrations.push(registration);
    }

    /// Release every registration. Further calls do nothing.
    pub fn release_all(&mut self) {
        for mut registration in self.registrations.drain(..) {
            registration.unregister();
        }
    }

    /// Number of registrations still held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether the set holds no registrations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
