//! Matching by time-range gap.

use super::{ClusterMatcher, MatchQueues, PairingRule, TieBreak};
use efu_core::{Cluster, Result};

/// Pairs clusters whose time ranges overlap or lie at most
/// `minimum_time_gap` ticks apart.
#[derive(Debug, Clone)]
pub struct GapMatcher {
    queues: MatchQueues,
    minimum_time_gap: u64,
}

impl GapMatcher {
    /// Creates a matcher for `plane_a` and `plane_b`.
    ///
    /// # Errors
    /// Returns an error if the planes are equal or invalid.
    pub fn new(maximum_latency: u64, plane_a: u8, plane_b: u8) -> Result<Self> {
        Ok(Self {
            queues: MatchQueues::new(maximum_latency, plane_a, plane_b)?,
            minimum_time_gap: 0,
        })
    }

    /// Sets the largest gap still counted as a coincidence.
    #[must_use]
    pub fn with_minimum_time_gap(mut self, gap: u64) -> Self {
        self.minimum_time_gap = gap;
        self
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.queues.set_tie_break(tie_break);
        self
    }

    #[must_use]
    pub fn minimum_time_gap(&self) -> u64 {
        self.minimum_time_gap
    }
}

struct GapRule(u64);

impl PairingRule for GapRule {
    #[allow(clippy::cast_precision_loss)]
    fn distance(&self, pivot: &Cluster, candidate: &Cluster) -> Option<f64> {
        let gap = pivot.time_gap(candidate);
        (gap <= self.0).then_some(gap as f64)
    }

    fn out_of_reach(&self, pivot: &Cluster, candidate: &Cluster) -> bool {
        candidate.time_start() > pivot.time_end().saturating_add(self.0)
    }

    fn reach(&self) -> u64 {
        self.0
    }
}

impl ClusterMatcher for GapMatcher {
    fn name(&self) -> &'static str {
        "gap"
    }

    fn queues(&self) -> &MatchQueues {
        &self.queues
    }

    fn queues_mut(&mut self) -> &mut MatchQueues {
        &mut self.queues
    }

    fn match_clusters(&mut self, flush: bool) {
        let rule = GapRule(self.minimum_time_gap);
        self.queues.run(&rule, flush);
    }
}
