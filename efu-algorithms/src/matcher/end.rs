//! Matching by end time.

use super::{ClusterMatcher, MatchQueues, PairingRule, TieBreak};
use efu_core::{Cluster, Result};

/// Pairs clusters whose latest hits are at most `max_delta_time` apart.
///
/// Suited to drift detectors where the last-arriving charge marks the
/// interaction point on both planes.
#[derive(Debug, Clone)]
pub struct EndMatcher {
    queues: MatchQueues,
    max_delta_time: u64,
}

impl EndMatcher {
    /// Creates a matcher for `plane_a` and `plane_b`.
    ///
    /// # Errors
    /// Returns an error if the planes are equal or invalid.
    pub fn new(maximum_latency: u64, plane_a: u8, plane_b: u8) -> Result<Self> {
        Ok(Self {
            queues: MatchQueues::new(maximum_latency, plane_a, plane_b)?,
            max_delta_time: 0,
        })
    }

    #[must_use]
    pub fn with_max_delta_time(mut self, delta: u64) -> Self {
        self.max_delta_time = delta;
        self
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.queues.set_tie_break(tie_break);
        self
    }

    #[must_use]
    pub fn max_delta_time(&self) -> u64 {
        self.max_delta_time
    }
}

struct EndRule(u64);

impl PairingRule for EndRule {
    #[allow(clippy::cast_precision_loss)]
    fn distance(&self, pivot: &Cluster, candidate: &Cluster) -> Option<f64> {
        let delta = pivot.time_end().abs_diff(candidate.time_end());
        (delta <= self.0).then_some(delta as f64)
    }

    fn out_of_reach(&self, pivot: &Cluster, candidate: &Cluster) -> bool {
        candidate.time_start() > pivot.time_end().saturating_add(self.0)
    }

    fn reach(&self) -> u64 {
        self.0
    }
}

impl ClusterMatcher for EndMatcher {
    fn name(&self) -> &'static str {
        "end"
    }

    fn queues(&self) -> &MatchQueues {
        &self.queues
    }

    fn queues_mut(&mut self) -> &mut MatchQueues {
        &mut self.queues
    }

    fn match_clusters(&mut self, flush: bool) {
        self.queues.run(&EndRule(self.max_delta_time), flush);
    }
}
