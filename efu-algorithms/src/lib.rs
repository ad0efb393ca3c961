//! efu-algorithms: Readout reduction algorithms.
//!
//! This crate provides:
//! - **Gap clustering** - streaming per-plane grouping by time and coordinate gaps
//! - **Coincidence matching** - pairing clusters of two planes by gap, centroid, end time or overlap
//! - **Event building** - single-pass windowed wire/strip events for blade detectors
//! - **Reduction** - clustering plus matching for a whole detector, live or per frame
//!

mod clusterer;
mod event_builder;
pub mod matcher;
mod processing;

pub use clusterer::{Clusterer, GapClusterer, GapClustererConfig};
pub use event_builder::{BladePosition, EventBuilder, EventBuilderConfig, EventBuilderStatistics};
pub use matcher::{
    AnyMatcher, CenterMatcher, ClusterMatcher, EndMatcher, GapMatcher, MatchQueues,
    MatcherConfig, MatcherStatistics, MatcherStrategy, OverlapMatcher, PairingRule, TieBreak,
    TimeAlgorithm,
};
pub use processing::{reduce_frames, ReductionConfig, ReductionEngine, ReductionStatistics};
