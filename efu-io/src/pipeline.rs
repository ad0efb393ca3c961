//! Two-thread receive/reduce pipeline.

use crate::cancel::CancellationToken;
use crate::decoder::Decoder;
use crate::receiver::{Receiver, ReceiverCounters, ReceiverStats};
use crate::reduction::{ReductionCounters, ReductionStats, ReductionTask};
use crate::sink::EventSink;
use crate::slots::slot_buffer;
use crate::source::PacketSource;
use crate::{Error, Result};
use efu_algorithms::ReductionConfig;
use log::{info, warn};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Buffering and timing of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PipelineConfig {
    /// Number of packet slots; the queue holds two fewer.
    pub slot_count: usize,
    /// Bytes per slot, the largest packet accepted untruncated.
    pub slot_size: usize,
    /// Socket read timeout, so the receiver notices cancellation.
    pub receive_timeout: Duration,
    /// Reduction thread pause when no packet is queued.
    pub idle_sleep: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            slot_count: 1024,
            slot_size: 9000,
            receive_timeout: Duration::from_millis(100),
            idle_sleep: Duration::from_micros(10),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_slot_count(mut self, slot_count: usize) -> Self {
        self.slot_count = slot_count;
        self
    }

    #[must_use]
    pub fn with_slot_size(mut self, slot_size: usize) -> Self {
        self.slot_size = slot_size;
        self
    }

    #[must_use]
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    /// Checks the buffer geometry and timeouts.
    ///
    /// # Errors
    /// Returns a configuration error for fewer than 3 slots, zero-sized slots
    /// or a zero receive timeout.
    pub fn validate(&self) -> Result<()> {
        let problem = if self.slot_count < 3 {
            format!("slot_count must be at least 3, got {}", self.slot_count)
        } else if self.slot_size == 0 {
            "slot_size must be positive".to_string()
        } else if self.receive_timeout.is_zero() {
            "receive_timeout must be positive".to_string()
        } else {
            return Ok(());
        };
        Err(efu_core::Error::ConfigError(problem).into())
    }
}

/// A running receiver thread and reduction thread.
///
/// Shutdown runs in two phases: intake stops first, then the reduction thread
/// decodes whatever is still queued and flushes. Dropping the pipeline
/// without [`Pipeline::shutdown`] leaves the reduction thread running.
pub struct Pipeline<K> {
    intake: CancellationToken,
    reduction_token: CancellationToken,
    receiver: JoinHandle<Result<()>>,
    reduction: JoinHandle<K>,
    receiver_stats: Arc<ReceiverStats>,
    reduction_stats: Arc<ReductionStats>,
}

impl<K: EventSink + 'static> Pipeline<K> {
    /// Starts both threads.
    ///
    /// # Errors
    /// Returns an error for an invalid configuration or if a thread cannot
    /// be spawned.
    pub fn spawn<S, D>(
        config: &PipelineConfig,
        reduction: &ReductionConfig,
        source: S,
        decoder: D,
        sink: K,
    ) -> Result<Self>
    where
        S: PacketSource + 'static,
        D: Decoder + 'static,
    {
        config.validate()?;
        let intake = CancellationToken::new();
        let reduction_token = CancellationToken::new();
        let (producer, consumer) = slot_buffer(config.slot_count, config.slot_size)?;

        let task = ReductionTask::new(consumer, decoder, reduction, sink, reduction_token.clone())?
            .with_idle_sleep(config.idle_sleep);
        let receiver = Receiver::new(source, producer, intake.clone());
        let reduction_stats = task.stats();
        let receiver_stats = receiver.stats();

        let reduction = thread::Builder::new()
            .name("efu-reduction".into())
            .spawn(move || task.run())?;
        let receiver = match thread::Builder::new()
            .name("efu-receiver".into())
            .spawn(move || receiver.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                reduction_token.cancel();
                if let Err(payload) = reduction.join() {
                    warn!(
                        "reduction thread panicked while aborting spawn: {}",
                        panic_message(payload.as_ref())
                    );
                }
                return Err(e.into());
            }
        };
        info!(
            "pipeline running: {} slots of {} bytes",
            config.slot_count, config.slot_size
        );

        Ok(Self {
            intake,
            reduction_token,
            receiver,
            reduction,
            receiver_stats,
            reduction_stats,
        })
    }

    /// Token that stops packet intake when cancelled.
    ///
    /// The reduction thread keeps going until [`Pipeline::shutdown`].
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.intake.clone()
    }

    #[must_use]
    pub fn receiver_stats(&self) -> ReceiverCounters {
        self.receiver_stats.snapshot()
    }

    #[must_use]
    pub fn reduction_stats(&self) -> ReductionCounters {
        self.reduction_stats.snapshot()
    }

    /// True once the receiver has stopped, e.g. after replaying a capture.
    #[must_use]
    pub fn receiver_finished(&self) -> bool {
        self.receiver.is_finished()
    }

    /// Stops intake, waits for the receiver, then stops the reduction thread
    /// and returns the sink.
    ///
    /// Every packet the receiver queued is decoded and the engine is flushed
    /// before the reduction thread exits.
    ///
    /// # Errors
    /// Returns the receiver's error, or an error if a thread panicked.
    pub fn shutdown(self) -> Result<K> {
        self.intake.cancel();
        let received = self.receiver.join().map_err(|payload| {
            warn!("receiver thread panicked: {}", panic_message(payload.as_ref()));
            Error::ThreadPanicked("receiver")
        });
        self.reduction_token.cancel();
        let sink = self.reduction.join().map_err(|payload| {
            warn!("reduction thread panicked: {}", panic_message(payload.as_ref()));
            Error::ThreadPanicked("reduction")
        })?;
        received??;
        info!("pipeline stopped");
        Ok(sink)
    }
}

/// Text of a panic payload raised with a string message.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
