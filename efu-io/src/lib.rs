//! efu-io: Packet intake and the receive/reduce pipeline.
//!
//! This crate provides:
//! - **Slot buffer** - fixed packet buffers with a lock-free SPSC handoff queue
//! - **Packet sources** - UDP sockets and memory-mapped capture replay
//! - **Decoding** - readout payloads to hits
//! - **Pipeline** - a receiver thread and a reduction thread with two-phase shutdown
//!
//! # Example
//!
//! ```no_run
//! use efu_algorithms::ReductionConfig;
//! use efu_core::Event;
//! use efu_io::{CaptureReplay, Pipeline, PipelineConfig, RecordDecoder};
//!
//! # fn main() -> efu_io::Result<()> {
//! let source = CaptureReplay::open("run.cap")?;
//! let pipeline = Pipeline::spawn(
//!     &PipelineConfig::default(),
//!     &ReductionConfig::default(),
//!     source,
//!     RecordDecoder::new(),
//!     Vec::<Event>::new(),
//! )?;
//! while !pipeline.receiver_finished() {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//! // packets still queued are reduced before shutdown returns
//! let events = pipeline.shutdown()?;
//! println!("{} events", events.len());
//! # Ok(())
//! # }
//! ```

mod cancel;
mod capture;
mod decoder;
mod error;
mod handoff;
mod pipeline;
mod receiver;
mod reduction;
mod sink;
mod slots;
mod source;

pub use cancel::CancellationToken;
pub use capture::{CaptureWriter, CAPTURE_MAGIC};
pub use decoder::{encode_records, DecodeStats, Decoder, RecordDecoder, HEADER_SIZE, RECORD_SIZE};
pub use error::{Error, Result};
pub use handoff::HandoffQueue;
pub use pipeline::{Pipeline, PipelineConfig};
pub use receiver::{Receiver, ReceiverCounters, ReceiverStats};
pub use reduction::{ReductionCounters, ReductionStats, ReductionTask};
pub use sink::{EventSink, FnSink};
pub use slots::{slot_buffer, Publish, SlotConsumer, SlotProducer, SlotRef};
pub use source::{CaptureReplay, PacketSource, Received, UdpSource};
