//! Matching by centroid time.

use super::{ClusterMatcher, MatchQueues, PairingRule, TieBreak, TimeAlgorithm};
use efu_core::{Cluster, Result};

/// Pairs clusters whose estimated times differ by at most `max_delta_time`.
#[derive(Debug, Clone)]
pub struct CenterMatcher {
    queues: MatchQueues,
    max_delta_time: u64,
    time_algorithm: TimeAlgorithm,
}

impl CenterMatcher {
    /// Creates a matcher for `plane_a` and `plane_b`.
    ///
    /// # Errors
    /// Returns an error if the planes are equal or invalid.
    pub fn new(maximum_latency: u64, plane_a: u8, plane_b: u8) -> Result<Self> {
        Ok(Self {
            queues: MatchQueues::new(maximum_latency, plane_a, plane_b)?,
            max_delta_time: 0,
            time_algorithm: TimeAlgorithm::default(),
        })
    }

    #[must_use]
    pub fn with_max_delta_time(mut self, delta: u64) -> Self {
        self.max_delta_time = delta;
        self
    }

    #[must_use]
    pub fn with_time_algorithm(mut self, algorithm: TimeAlgorithm) -> Self {
        self.time_algorithm = algorithm;
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

    #[must_use]
    pub fn time_algorithm(&self) -> TimeAlgorithm {
        self.time_algorithm
    }
}

struct CenterRule {
    max_delta_time: u64,
    algorithm: TimeAlgorithm,
}

impl PairingRule for CenterRule {
    #[allow(clippy::cast_precision_loss)]
    fn distance(&self, pivot: &Cluster, candidate: &Cluster) -> Option<f64> {
        let delta = (self.algorithm.time_of(pivot) - self.algorithm.time_of(candidate)).abs();
        (delta <= self.max_delta_time as f64).then_some(delta)
    }

    // estimated times never precede time_start
    #[allow(clippy::cast_precision_loss)]
    fn out_of_reach(&self, pivot: &Cluster, candidate: &Cluster) -> bool {
        candidate.time_start() as f64
            > self.algorithm.time_of(pivot) + self.max_delta_time as f64
    }

    fn reach(&self) -> u64 {
        self.max_delta_time
    }
}

impl ClusterMatcher for CenterMatcher {
    fn name(&self) -> &'static str {
        "center"
    }

    fn queues(&self) -> &MatchQueues {
        &self.queues
    }

    fn queues_mut(&mut self) -> &mut MatchQueues {
        &mut self.queues
    }

    fn match_clusters(&mut self, flush: bool) {
        let rule = CenterRule {
            max_delta_time: self.max_delta_time,
            algorithm: self.time_algorithm,
        };
        self.queues.run(&rule, flush);
    }
}
