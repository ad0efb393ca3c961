//! Bounded index queue between the receiver and the reduction thread.

use crossbeam_queue::ArrayQueue;

/// Lock-free FIFO of slot indices.
///
/// A successful push happens-before the pop that returns the value, and a
/// pop happens-before the push that reuses its cell. The slot buffer relies
/// on both to hand packet memory across threads.
#[derive(Debug)]
pub struct HandoffQueue {
    inner: ArrayQueue<usize>,
}

impl HandoffQueue {
    /// Creates a queue holding up to `capacity` indices (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: ArrayQueue::new(capacity.max(1)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Appends `value`. Returns false, leaving the queue unchanged, when full.
    pub fn push(&self, value: usize) -> bool {
        self.inner.push(value).is_ok()
    }

    /// Removes the oldest value.
    pub fn pop(&self) -> Option<usize> {
        self.inner.pop()
    }

    /// Number of queued values; a snapshot when called concurrently.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }
}
