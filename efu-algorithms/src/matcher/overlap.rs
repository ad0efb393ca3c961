//! Matching by overlapping time ranges.

use super::{ClusterMatcher, MatchQueues, PairingRule, TieBreak};
use efu_core::{Cluster, Result};

/// Pairs clusters whose time ranges share at least one tick; the largest
/// overlap wins.
#[derive(Debug, Clone)]
pub struct OverlapMatcher {
    queues: MatchQueues,
}

impl OverlapMatcher {
    /// Creates a matcher for `plane_a` and `plane_b`.
    ///
    /// # Errors
    /// Returns an error if the planes are equal or invalid.
    pub fn new(maximum_latency: u64, plane_a: u8, plane_b: u8) -> Result<Self> {
        Ok(Self {
            queues: MatchQueues::new(maximum_latency, plane_a, plane_b)?,
        })
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.queues.set_tie_break(tie_break);
        self
    }
}

struct OverlapRule;

impl PairingRule for OverlapRule {
    // larger overlap ranks nearer
    #[allow(clippy::cast_precision_loss)]
    fn distance(&self, pivot: &Cluster, candidate: &Cluster) -> Option<f64> {
        let overlap = pivot.time_overlap(candidate);
        (overlap > 0).then_some(-(overlap as f64))
    }

    fn out_of_reach(&self, pivot: &Cluster, candidate: &Cluster) -> bool {
        candidate.time_start() > pivot.time_end()
    }

    fn reach(&self) -> u64 {
        0
    }
}

impl ClusterMatcher for OverlapMatcher {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn queues(&self) -> &MatchQueues {
        &self.queues
    }

    fn queues_mut(&mut self) -> &mut MatchQueues {
        &mut self.queues
    }

    fn match_clusters(&mut self, flush: bool) {
        self.queues.run(&OverlapRule, flush);
    }
}
