//! Insertion-ordered queue with a hard capacity and an observable length.

use std::collections::VecDeque;

use crate::core::notify::{ObservableValue, Subscription};
use crate::core::QueueError;

/// FIFO queue that rejects insertions once `capacity` is reached.
///
/// The capacity is only checked on insertion: lowering it below the current
/// length keeps every item and merely reports the queue as full. Each
/// structural change publishes the new length exactly once.
pub struct BoundedQueue<T> {
    capacity: usize,
    items: VecDeque<T>,
    len: ObservableValue<usize>,
}

impl<T> BoundedQueue<T> {
    /// Create an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
            len: ObservableValue::new(0),
        }
    }

    /// Create an empty queue without a practical bound.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Append `item` at the back.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when no free slot is left.
    pub fn enqueue(&mut self, item: T) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }
        self.items.push_back(item);
        self.publish_len();
        Ok(())
    }

    /// Remove and return the earliest inserted item.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Empty`] when the queue holds nothing.
    pub fn dequeue(&mut self) -> Result<T, QueueError> {
        let item = self.items.pop_front().ok_or(QueueError::Empty)?;
        self.publish_len();
        Ok(item)
    }

    /// Remove the first item matching `predicate`.
    pub fn remove_by<F>(&mut self, predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let index = self.items.iter().position(predicate)?;
        let item = self.items.remove(index);
        self.publish_len();
        item
    }

    /// Remove the first item equal to `item`. Returns whether one was removed.
    pub fn remove(&mut self, item: &T) -> bool
    where
        T: PartialEq,
    {
        self.remove_by(|candidate| candidate == item).is_some()
    }

    /// Remove and return all items in insertion order.
    pub fn clear(&mut self) -> Vec<T> {
        let drained: Vec<T> = self.items.drain(..).collect();
        self.publish_len();
        drained
    }

    /// Change the capacity without touching existing items.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }

    /// Current capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Slots left before insertion is rejected, never negative.
    #[must_use]
    pub fn free_slots(&self) -> usize {
        self.capacity.saturating_sub(self.items.len())
    }

    /// Whether insertion would be rejected.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.free_slots() < 1
    }

    /// Iterate over items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Snapshot of the items in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.iter().cloned().collect()
    }

    /// Subscribe to length transitions, starting with the current length.
    #[must_use]
    pub fn len_changes(&self) -> Subscription<usize> {
        self.len.subscribe()
    }

    /// The observable length. Clones of it keep tracking this queue.
    #[must_use]
    pub const fn size(&self) -> &ObservableValue<usize> {
        &self.len
    }

    fn publish_len(&self) {
        self.len.set(self.items.len());
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity)
            .field("items", &self.items)
            .finish()
    }
}
