//! Receiver task: packets from a source into the slot buffer.

use crate::cancel::CancellationToken;
use crate::slots::{Publish, SlotProducer};
use crate::source::{PacketSource, Received};
use crate::Result;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Live receiver counters, shared with other threads.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    rx_packets: AtomicU64,
    rx_bytes: AtomicU64,
    fifo_push_errors: AtomicU64,
    rx_timeouts: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReceiverCounters {
    pub rx_packets: u64,
    pub rx_bytes: u64,
    /// Packets dropped because the handoff queue was full.
    pub fifo_push_errors: u64,
    pub rx_timeouts: u64,
}

impl ReceiverStats {
    #[must_use]
    pub fn snapshot(&self) -> ReceiverCounters {
        ReceiverCounters {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            rx_bytes: self.rx_bytes.load(Ordering::Relaxed),
            fifo_push_errors: self.fifo_push_errors.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Pulls packets until cancelled or the source is exhausted.
pub struct Receiver<S> {
    source: S,
    producer: SlotProducer,
    token: CancellationToken,
    stats: Arc<ReceiverStats>,
}

impl<S: PacketSource> Receiver<S> {
    #[must_use]
    pub fn new(source: S, producer: SlotProducer, token: CancellationToken) -> Self {
        Self {
            source,
            producer,
            token,
            stats: Arc::new(ReceiverStats::default()),
        }
    }

    /// Shared handle to the live counters.
    #[must_use]
    pub fn stats(&self) -> Arc<ReceiverStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the receive loop on the current thread.
    ///
    /// Empty packets are ignored. A packet that finds the queue full is
    /// counted in `fifo_push_errors` and its slot is reused.
    ///
    /// # Errors
    /// Returns an error if the source fails.
    pub fn run(mut self) -> Result<()> {
        info!(
            "receiver started: {} slots of {} bytes",
            self.producer.slot_count(),
            self.producer.slot_size()
        );
        while !self.token.is_cancelled() {
            match self.source.receive(self.producer.slot_mut()) {
                Ok(Received::Packet(0)) => {}
                Ok(Received::Packet(len)) => {
                    self.stats.rx_packets.fetch_add(1, Ordering::Relaxed);
                    self.stats.rx_bytes.fetch_add(len as u64, Ordering::Relaxed);
                    if let Publish::Dropped(slot) = self.producer.publish(len) {
                        self.stats.fifo_push_errors.fetch_add(1, Ordering::Relaxed);
                        debug!("handoff queue full, overwriting slot {slot}");
                    }
                }
                Ok(Received::Timeout) => {
                    self.stats.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Received::Exhausted) => {
                    info!("packet source exhausted");
                    break;
                }
                Err(e) => {
                    warn!("receive failed: {e}");
                    return Err(e.into());
                }
            }
        }
        let counters = self.stats.snapshot();
        info!(
            "receiver stopped: {} packets, {} bytes, {} dropped",
            counters.rx_packets, counters.rx_bytes, counters.fifo_push_errors
        );
        Ok(())
    }
}
