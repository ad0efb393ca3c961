//! Reduction task: slots to hits to events.

use crate::cancel::CancellationToken;
use crate::decoder::Decoder;
use crate::sink::EventSink;
use crate::slots::SlotConsumer;
use efu_algorithms::{ReductionConfig, ReductionEngine};
use efu_core::{Event, Hit, Result};
use log::{debug, info, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Live reduction counters, shared with other threads.
#[derive(Debug, Default)]
pub struct ReductionStats {
    rx_idle: AtomicU64,
    fifo_seq_errors: AtomicU64,
    packets: AtomicU64,
    readouts: AtomicU64,
    bad_bytes: AtomicU64,
    seq_errors: AtomicU64,
    plane_errors: AtomicU64,
    events: AtomicU64,
    coincidences: AtomicU64,
}

/// Point-in-time copy of [`ReductionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReductionCounters {
    /// Polls that found the queue empty.
    pub rx_idle: u64,
    /// Popped slots with no payload.
    pub fifo_seq_errors: u64,
    /// Packets decoded.
    pub packets: u64,
    pub readouts: u64,
    pub bad_bytes: u64,
    pub seq_errors: u64,
    /// Hits of planes outside the matched pair.
    pub plane_errors: u64,
    pub events: u64,
    /// Events with clusters on both planes.
    pub coincidences: u64,
}

impl ReductionStats {
    #[must_use]
    pub fn snapshot(&self) -> ReductionCounters {
        ReductionCounters {
            rx_idle: self.rx_idle.load(Ordering::Relaxed),
            fifo_seq_errors: self.fifo_seq_errors.load(Ordering::Relaxed),
            packets: self.packets.load(Ordering::Acquire),
            readouts: self.readouts.load(Ordering::Relaxed),
            bad_bytes: self.bad_bytes.load(Ordering::Relaxed),
            seq_errors: self.seq_errors.load(Ordering::Relaxed),
            plane_errors: self.plane_errors.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            coincidences: self.coincidences.load(Ordering::Relaxed),
        }
    }
}

/// Drains the slot buffer through a decoder and a [`ReductionEngine`].
pub struct ReductionTask<D, K> {
    consumer: SlotConsumer,
    decoder: D,
    engine: ReductionEngine,
    sink: K,
    token: CancellationToken,
    stats: Arc<ReductionStats>,
    idle_sleep: Duration,
    hits: Vec<Hit>,
}

impl<D: Decoder, K: EventSink> ReductionTask<D, K> {
    /// Creates the task.
    ///
    /// # Errors
    /// Returns an error if the reduction configuration is invalid.
    pub fn new(
        consumer: SlotConsumer,
        decoder: D,
        config: &ReductionConfig,
        sink: K,
        token: CancellationToken,
    ) -> Result<Self> {
        Ok(Self {
            consumer,
            decoder,
            engine: ReductionEngine::new(config)?,
            sink,
            token,
            stats: Arc::new(ReductionStats::default()),
            idle_sleep: Duration::from_micros(10),
            hits: Vec::new(),
        })
    }

    /// Sets the pause after an empty poll.
    #[must_use]
    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<ReductionStats> {
        Arc::clone(&self.stats)
    }

    /// Processes packets until cancelled, then flushes and returns the sink.
    ///
    /// Packets queued before cancellation are decoded before the flush, so
    /// cancel only once the producer has stopped publishing.
    pub fn run(mut self) -> K {
        info!("reduction started");
        while !self.token.is_cancelled() {
            if !self.poll() {
                self.stats.rx_idle.fetch_add(1, Ordering::Relaxed);
                thread::sleep(self.idle_sleep);
            }
        }
        let mut drained = 0_u64;
        while self.poll() {
            drained += 1;
        }
        if drained > 0 {
            debug!("drained {drained} queued packets after cancellation");
        }

        let events = self.engine.flush();
        self.emit(events);
        let counters = self.stats.snapshot();
        info!(
            "reduction stopped: {} packets, {} readouts, {} events ({} coincidences)",
            counters.packets, counters.readouts, counters.events, counters.coincidences
        );
        self.sink
    }

    /// Handles at most one slot. Returns false if the queue was empty.
    fn poll(&mut self) -> bool {
        let Some(slot) = self.consumer.pop() else {
            return false;
        };
        if slot.is_empty() {
            self.stats.fifo_seq_errors.fetch_add(1, Ordering::Relaxed);
            return true;
        }
        let decoded = self.decoder.decode(&slot, &mut self.hits);
        drop(slot);

        self.stats.readouts.fetch_add(decoded.readouts, Ordering::Relaxed);
        self.stats.bad_bytes.fetch_add(decoded.bad_bytes, Ordering::Relaxed);
        self.stats.seq_errors.fetch_add(decoded.seq_errors, Ordering::Relaxed);
        self.stats.packets.fetch_add(1, Ordering::Release);
        trace!("decoded {} hits", decoded.readouts);

        let events = self.engine.process(&self.hits, false);
        self.hits.clear();
        self.stats
            .plane_errors
            .store(self.engine.statistics().plane_errors, Ordering::Relaxed);
        self.emit(events);
        true
    }

    fn emit(&mut self, events: Vec<Event>) {
        for event in events {
            self.stats.events.fetch_add(1, Ordering::Relaxed);
            if event.both_planes() {
                self.stats.coincidences.fetch_add(1, Ordering::Relaxed);
            }
            self.sink.consume(event);
        }
    }
}
