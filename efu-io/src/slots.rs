//! Fixed pool of packet buffers handed from the receiver to the reduction
//! thread.
//!
//! The receiver always writes into one slot (its cursor). Publishing pushes
//! the slot index on a [`HandoffQueue`] and moves the cursor to the next
//! slot. The queue holds at most `slot_count - 2` indices, so the cursor
//! slot is never queued and never the one the consumer is reading. When the
//! queue is full the packet is dropped: the cursor stays put and the next
//! packet overwrites it.

use crate::handoff::HandoffQueue;
use crate::{Error, Result};
use std::cell::UnsafeCell;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Slot {
    data: UnsafeCell<Box<[u8]>>,
    len: AtomicUsize,
}

struct Shared {
    slots: Box<[Slot]>,
    queue: HandoffQueue,
    slot_size: usize,
}

// SAFETY: a slot is written only by the single `SlotProducer` while it is
// the cursor, and read only by the single `SlotConsumer` after its index was
// popped. The queue orders a push before the pop returning it, and a pop
// before any push that needs the freed place; the capacity bound keeps the
// cursor distinct from every queued or borrowed slot.
#[allow(unsafe_code)]
unsafe impl Sync for Shared {}

/// Outcome of [`SlotProducer::publish`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The slot with this index was queued.
    Queued(usize),
    /// The queue was full; the slot with this index will be reused.
    Dropped(usize),
}

/// Creates a slot pool and its two endpoints.
///
/// # Errors
/// Returns an error if `slot_count < 3` or `slot_size == 0`.
pub fn slot_buffer(slot_count: usize, slot_size: usize) -> Result<(SlotProducer, SlotConsumer)> {
    if slot_count < 3 {
        return Err(Error::CoreError(efu_core::Error::ConfigError(format!(
            "slot_count must be at least 3, got {slot_count}"
        ))));
    }
    if slot_size == 0 {
        return Err(Error::CoreError(efu_core::Error::ConfigError(
            "slot_size must be positive".into(),
        )));
    }

    let slots = (0..slot_count)
        .map(|_| Slot {
            data: UnsafeCell::new(vec![0u8; slot_size].into_boxed_slice()),
            len: AtomicUsize::new(0),
        })
        .collect();
    let shared = Arc::new(Shared {
        slots,
        queue: HandoffQueue::new(slot_count - 2),
        slot_size,
    });

    Ok((
        SlotProducer {
            shared: Arc::clone(&shared),
            cursor: 0,
        },
        SlotConsumer { shared },
    ))
}

/// Writing end, owned by the receiver thread.
pub struct SlotProducer {
    shared: Arc<Shared>,
    cursor: usize,
}

impl SlotProducer {
    /// Index of the slot the next packet is written to.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn slot_size(&self) -> usize {
        self.shared.slot_size
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of published slots not yet taken by the consumer.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// The cursor slot, `slot_size` bytes long.
    #[allow(unsafe_code)]
    pub fn slot_mut(&mut self) -> &mut [u8] {
        // SAFETY: the cursor slot is neither queued nor borrowed by the
        // consumer, and `&mut self` rules out a second borrow here.
        unsafe { &mut *self.shared.slots[self.cursor].data.get() }
    }

    /// Hands the first `len` bytes of the cursor slot to the consumer.
    ///
    /// `len` is clamped to the slot size.
    pub fn publish(&mut self, len: usize) -> Publish {
        let index = self.cursor;
        let len = len.min(self.shared.slot_size);
        self.shared.slots[index].len.store(len, Ordering::Relaxed);
        if self.shared.queue.push(index) {
            self.cursor = (index + 1) % self.shared.slots.len();
            Publish::Queued(index)
        } else {
            Publish::Dropped(index)
        }
    }
}

/// Reading end, owned by the reduction thread.
pub struct SlotConsumer {
    shared: Arc<Shared>,
}

impl SlotConsumer {
    /// Takes the oldest published slot, if any.
    ///
    /// The slot stays reserved until the returned guard is dropped and the
    /// next slot is popped.
    pub fn pop(&mut self) -> Option<SlotRef<'_>> {
        let index = self.shared.queue.pop()?;
        let slot = &self.shared.slots[index];
        let len = slot.len.load(Ordering::Relaxed);
        // SAFETY: `index` was popped, so the producer finished writing it
        // before the push, and will not write it again before the consumer
        // pops a later index.
        #[allow(unsafe_code)]
        let data: &[u8] = unsafe { &*slot.data.get() };
        Some(SlotRef {
            index,
            data: &data[..len],
        })
    }

    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }
}

/// Borrowed view of a published packet.
#[derive(Debug)]
pub struct SlotRef<'a> {
    index: usize,
    data: &'a [u8],
}

impl SlotRef<'_> {
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for SlotRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}
