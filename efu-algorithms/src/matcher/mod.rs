//! Cross-plane coincidence matching.
//!
//! A matcher collects completed clusters of two planes in per-plane queues
//! ordered by `time_start` and pairs them into [`Event`]s. The strategies
//! differ only in the pairing test:
//! - [`GapMatcher`]: time ranges at most `minimum_time_gap` apart
//! - [`CenterMatcher`]: centroid times at most `max_delta_time` apart
//! - [`EndMatcher`]: end times at most `max_delta_time` apart
//! - [`OverlapMatcher`]: time ranges sharing at least one tick
//!
//! # Matching loop
//!
//! The earliest queued cluster (plane A first on equal start) is the pivot.
//! Its candidates are the opposite-plane clusters that pass the pairing
//! test, except those claimed by a later same-plane cluster: one that starts
//! no later than the candidate and pairs with it at least as closely. The
//! nearest candidate wins, equal distances are resolved by [`TieBreak`].
//! Without a candidate the pivot becomes a single-plane event.
//!
//! Unless flushing, a cluster takes part only once it is *ready*: with
//! `horizon` the smaller of the latest `time_start` seen on either plane,
//! `horizon - time_end` must exceed `maximum_latency` plus the strategy's
//! pairing reach. Input is expected to be ordered up to `maximum_latency`,
//! so no cluster received later can pair with a ready one.

mod center;
mod end;
mod gap;
mod overlap;

pub use center::CenterMatcher;
pub use end::EndMatcher;
pub use gap::GapMatcher;
pub use overlap::OverlapMatcher;

use efu_core::{Cluster, ClusterContainer, Error, Event, Result, INVALID_PLANE};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Centroid time estimator used by the [`CenterMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TimeAlgorithm {
    /// Weight-averaged time.
    #[default]
    CenterOfMass,
    /// Time of the last fired hit, weighted with its neighbours.
    Utpc,
    /// Time averaged with squared weights.
    Charge2,
}

impl TimeAlgorithm {
    /// Estimates the time of a cluster.
    #[must_use]
    pub fn time_of(self, cluster: &Cluster) -> f64 {
        match self {
            Self::CenterOfMass => cluster.time_center(),
            Self::Utpc => cluster.time_utpc(true),
            Self::Charge2 => cluster.time_center2(),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CenterOfMass => "center-of-mass",
            Self::Utpc => "utpc",
            Self::Charge2 => "charge2",
        }
    }
}

impl fmt::Display for TimeAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "center-of-mass" => Ok(Self::CenterOfMass),
            "utpc" => Ok(Self::Utpc),
            "charge2" => Ok(Self::Charge2),
            other => Err(Error::UnknownTimeAlgorithm(other.to_string())),
        }
    }
}

/// How to choose between candidates at the same pairing distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum TieBreak {
    /// Earliest `time_start`, then earliest queued.
    #[default]
    EarlierStart,
    /// Largest weight sum, then earliest queued.
    HigherWeight,
}

impl TieBreak {
    /// True if `challenger` should replace `current` at equal distance.
    fn prefers(self, challenger: &Cluster, current: &Cluster) -> bool {
        match self {
            Self::EarlierStart => challenger.time_start() < current.time_start(),
            Self::HigherWeight => challenger.weight_sum() > current.weight_sum(),
        }
    }
}

/// Pairing test of a matching strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum MatcherStrategy {
    /// Pair clusters whose time ranges are at most this far apart.
    Gap { minimum_time_gap: u64 },
    /// Pair clusters whose centroid times are at most this far apart.
    Center {
        max_delta_time: u64,
        time_algorithm: TimeAlgorithm,
    },
    /// Pair clusters whose end times are at most this far apart.
    End { max_delta_time: u64 },
    /// Pair clusters whose time ranges overlap.
    Overlap,
}

/// Matcher configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatcherConfig {
    pub plane_a: u8,
    pub plane_b: u8,
    /// Largest expected disorder of incoming clusters, in clock ticks.
    pub maximum_latency: u64,
    pub tie_break: TieBreak,
    pub strategy: MatcherStrategy,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            plane_a: 0,
            plane_b: 1,
            maximum_latency: 1000,
            tie_break: TieBreak::default(),
            strategy: MatcherStrategy::Center {
                max_delta_time: 250,
                time_algorithm: TimeAlgorithm::CenterOfMass,
            },
        }
    }
}

impl MatcherConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the two matched planes.
    #[must_use]
    pub fn with_planes(mut self, plane_a: u8, plane_b: u8) -> Self {
        self.plane_a = plane_a;
        self.plane_b = plane_b;
        self
    }

    #[must_use]
    pub fn with_maximum_latency(mut self, latency: u64) -> Self {
        self.maximum_latency = latency;
        self
    }

    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: MatcherStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Checks the plane selection.
    ///
    /// # Errors
    /// Returns an error if a plane is [`INVALID_PLANE`] or both planes are equal.
    pub fn validate(&self) -> Result<()> {
        for plane in [self.plane_a, self.plane_b] {
            if plane == INVALID_PLANE {
                return Err(Error::InvalidPlane(plane));
            }
        }
        if self.plane_a == self.plane_b {
            return Err(Error::ConfigError(format!(
                "matcher planes must differ, both are {}",
                self.plane_a
            )));
        }
        Ok(())
    }
}

/// Matcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatcherStatistics {
    /// Events emitted.
    pub events: u64,
    /// Events with clusters on both planes.
    pub coincidences: u64,
    /// Events with a cluster on one plane only.
    pub singles: u64,
    /// Clusters discarded because their plane is not matched.
    pub rejected_clusters: u64,
    /// Clusters waiting on plane A.
    pub pending_a: usize,
    /// Clusters waiting on plane B.
    pub pending_b: usize,
}

/// Pairing test plugged into the shared matching loop.
pub trait PairingRule {
    /// Ranking distance of a pair, `None` if the pair fails the test.
    fn distance(&self, pivot: &Cluster, candidate: &Cluster) -> Option<f64>;

    /// True if `candidate`, and every cluster starting later, fails the test.
    fn out_of_reach(&self, pivot: &Cluster, candidate: &Cluster) -> bool;

    /// Largest time distance over which a pair can pass the test.
    fn reach(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

enum Selection {
    Pair(usize),
    Single,
    Wait,
}

/// Per-plane queues, readiness tracking and output shared by all strategies.
#[derive(Debug, Clone)]
pub struct MatchQueues {
    plane_a: u8,
    plane_b: u8,
    maximum_latency: u64,
    tie_break: TieBreak,
    queue_a: VecDeque<Cluster>,
    queue_b: VecDeque<Cluster>,
    latest_a: Option<u64>,
    latest_b: Option<u64>,
    matched_events: VecDeque<Event>,
    stats: MatcherStatistics,
}

impl MatchQueues {
    /// Creates empty queues for two distinct planes.
    ///
    /// # Errors
    /// Returns an error if the plane selection is invalid.
    pub fn new(maximum_latency: u64, plane_a: u8, plane_b: u8) -> Result<Self> {
        MatcherConfig::new()
            .with_planes(plane_a, plane_b)
            .validate()?;
        Ok(Self {
            plane_a,
            plane_b,
            maximum_latency,
            tie_break: TieBreak::default(),
            queue_a: VecDeque::new(),
            queue_b: VecDeque::new(),
            latest_a: None,
            latest_b: None,
            matched_events: VecDeque::new(),
            stats: MatcherStatistics::default(),
        })
    }

    #[must_use]
    pub fn plane_a(&self) -> u8 {
        self.plane_a
    }

    #[must_use]
    pub fn plane_b(&self) -> u8 {
        self.plane_b
    }

    #[must_use]
    pub fn maximum_latency(&self) -> u64 {
        self.maximum_latency
    }

    #[must_use]
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn set_tie_break(&mut self, tie_break: TieBreak) {
        self.tie_break = tie_break;
    }

    /// Latest `time_start` seen on plane A and plane B.
    #[must_use]
    pub fn latest(&self) -> (Option<u64>, Option<u64>) {
        (self.latest_a, self.latest_b)
    }

    /// Appends clusters of `plane`, keeping the queue ordered by `time_start`.
    ///
    /// Clusters of a plane that is not matched are dropped and counted.
    pub fn insert(&mut self, plane: u8, clusters: ClusterContainer) {
        let (queue, latest) = if plane == self.plane_a {
            (&mut self.queue_a, &mut self.latest_a)
        } else if plane == self.plane_b {
            (&mut self.queue_b, &mut self.latest_b)
        } else {
            self.stats.rejected_clusters += clusters.len() as u64;
            return;
        };

        for cluster in clusters.into_iter().filter(|c| !c.is_empty()) {
            let start = cluster.time_start();
            *latest = Some(latest.map_or(start, |seen| seen.max(start)));
            let pos = queue.partition_point(|queued| queued.time_start() <= start);
            queue.insert(pos, cluster);
        }
    }

    /// Clusters waiting on `plane`, empty for an unmatched plane.
    #[must_use]
    pub fn unmatched_clusters(&self, plane: u8) -> Vec<&Cluster> {
        if plane == self.plane_a {
            self.queue_a.iter().collect()
        } else if plane == self.plane_b {
            self.queue_b.iter().collect()
        } else {
            Vec::new()
        }
    }

    /// Number of clusters waiting on both planes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue_a.len() + self.queue_b.len()
    }

    #[must_use]
    pub fn matched_events(&self) -> &VecDeque<Event> {
        &self.matched_events
    }

    /// Drains the emitted events in emission order.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.matched_events.drain(..).collect()
    }

    #[must_use]
    pub fn statistics(&self) -> MatcherStatistics {
        MatcherStatistics {
            pending_a: self.queue_a.len(),
            pending_b: self.queue_b.len(),
            ..self.stats
        }
    }

    /// True if no data still to come can pair with `cluster`.
    #[must_use]
    pub fn is_ready(&self, cluster: &Cluster, reach: u64) -> bool {
        let (Some(latest_a), Some(latest_b)) = (self.latest_a, self.latest_b) else {
            return false;
        };
        let horizon = latest_a.min(latest_b);
        horizon > cluster.time_end()
            && horizon - cluster.time_end() > self.maximum_latency.saturating_add(reach)
    }

    /// Runs the matching loop with the given pairing rule.
    pub fn run<R: PairingRule>(&mut self, rule: &R, flush: bool) {
        let reach = rule.reach();
        while let Some(side) = self.pivot_side() {
            let (own, other) = match side {
                Side::A => (&self.queue_a, &self.queue_b),
                Side::B => (&self.queue_b, &self.queue_a),
            };
            let Some(pivot) = own.front() else { break };
            if !flush && !self.is_ready(pivot, reach) {
                break;
            }

            let selection = self.select(rule, own, other, flush);
            match selection {
                Selection::Pair(idx) => self.emit(side, Some(idx)),
                Selection::Single => self.emit(side, None),
                Selection::Wait => break,
            }
        }
    }

    fn pivot_side(&self) -> Option<Side> {
        match (self.queue_a.front(), self.queue_b.front()) {
            (Some(a), Some(b)) if b.time_start() < a.time_start() => Some(Side::B),
            (Some(_), _) => Some(Side::A),
            (None, Some(_)) => Some(Side::B),
            (None, None) => None,
        }
    }

    fn select<R: PairingRule>(
        &self,
        rule: &R,
        own: &VecDeque<Cluster>,
        candidates: &VecDeque<Cluster>,
        flush: bool,
    ) -> Selection {
        let Some(pivot) = own.front() else {
            return Selection::Single;
        };
        let mut best: Option<(usize, f64)> = None;
        for (idx, candidate) in candidates.iter().enumerate() {
            if rule.out_of_reach(pivot, candidate) {
                break;
            }
            let Some(distance) = rule.distance(pivot, candidate) else {
                continue;
            };
            if Self::claimed_by_later(rule, own, candidate, distance) {
                continue;
            }
            if !flush && !self.is_ready(candidate, rule.reach()) {
                return Selection::Wait;
            }
            best = match best {
                None => Some((idx, distance)),
                Some((best_idx, best_distance)) => match distance.total_cmp(&best_distance) {
                    Ordering::Less => Some((idx, distance)),
                    Ordering::Equal
                        if self.tie_break.prefers(candidate, &candidates[best_idx]) =>
                    {
                        Some((idx, distance))
                    }
                    _ => best,
                },
            };
        }
        best.map_or(Selection::Single, |(idx, _)| Selection::Pair(idx))
    }

    /// True if a same-plane cluster queued after the pivot starts no later
    /// than `candidate` and pairs with it within `distance`.
    fn claimed_by_later<R: PairingRule>(
        rule: &R,
        own: &VecDeque<Cluster>,
        candidate: &Cluster,
        distance: f64,
    ) -> bool {
        own.iter()
            .skip(1)
            .take_while(|later| later.time_start() <= candidate.time_start())
            .any(|later| rule.distance(later, candidate).is_some_and(|d| d <= distance))
    }

    fn emit(&mut self, side: Side, partner: Option<usize>) {
        let (own, other) = match side {
            Side::A => (&mut self.queue_a, &mut self.queue_b),
            Side::B => (&mut self.queue_b, &mut self.queue_a),
        };
        let pivot = own.pop_front().unwrap_or_default();
        let partner = partner.and_then(|idx| other.remove(idx)).unwrap_or_default();

        let mut event = Event::new(self.plane_a, self.plane_b);
        match side {
            Side::A => {
                event.cluster_a = pivot;
                event.cluster_b = partner;
            }
            Side::B => {
                event.cluster_a = partner;
                event.cluster_b = pivot;
            }
        }

        self.stats.events += 1;
        if event.both_planes() {
            self.stats.coincidences += 1;
        } else {
            self.stats.singles += 1;
        }
        self.matched_events.push_back(event);
    }
}

/// Strategy-agnostic matcher contract.
///
/// Implementors supply the queues and the matching step; everything else is
/// shared so instrument code never depends on the strategy.
pub trait ClusterMatcher {
    /// Returns the name of the strategy.
    fn name(&self) -> &'static str;

    fn queues(&self) -> &MatchQueues;

    fn queues_mut(&mut self) -> &mut MatchQueues;

    /// Pairs and emits whatever is safe to emit, or everything with `flush`.
    fn match_clusters(&mut self, flush: bool);

    /// Hands completed clusters of `plane` to the matcher.
    fn insert(&mut self, plane: u8, clusters: ClusterContainer) {
        self.queues_mut().insert(plane, clusters);
    }

    /// Hands one completed cluster over, routed by its own plane.
    fn insert_cluster(&mut self, cluster: Cluster) {
        let plane = cluster.plane();
        self.queues_mut().insert(plane, vec![cluster]);
    }

    fn matched_events(&self) -> &VecDeque<Event> {
        self.queues().matched_events()
    }

    fn take_events(&mut self) -> Vec<Event> {
        self.queues_mut().take_events()
    }

    fn unmatched_clusters(&self, plane: u8) -> Vec<&Cluster> {
        self.queues().unmatched_clusters(plane)
    }

    fn statistics(&self) -> MatcherStatistics {
        self.queues().statistics()
    }
}

/// A matcher of any strategy, selected at run time.
#[derive(Debug, Clone)]
pub enum AnyMatcher {
    Gap(GapMatcher),
    Center(CenterMatcher),
    End(EndMatcher),
    Overlap(OverlapMatcher),
}

impl AnyMatcher {
    /// Builds the matcher described by `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &MatcherConfig) -> Result<Self> {
        config.validate()?;
        log::debug!("building matcher: {config:?}");
        let matcher = match config.strategy {
            MatcherStrategy::Gap { minimum_time_gap } => Self::Gap(
                GapMatcher::new(config.maximum_latency, config.plane_a, config.plane_b)?
                    .with_minimum_time_gap(minimum_time_gap)
                    .with_tie_break(config.tie_break),
            ),
            MatcherStrategy::Center {
                max_delta_time,
                time_algorithm,
            } => Self::Center(
                CenterMatcher::new(config.maximum_latency, config.plane_a, config.plane_b)?
                    .with_max_delta_time(max_delta_time)
                    .with_time_algorithm(time_algorithm)
                    .with_tie_break(config.tie_break),
            ),
            MatcherStrategy::End { max_delta_time } => Self::End(
                EndMatcher::new(config.maximum_latency, config.plane_a, config.plane_b)?
                    .with_max_delta_time(max_delta_time)
                    .with_tie_break(config.tie_break),
            ),
            MatcherStrategy::Overlap => Self::Overlap(
                OverlapMatcher::new(config.maximum_latency, config.plane_a, config.plane_b)?
                    .with_tie_break(config.tie_break),
            ),
        };
        Ok(matcher)
    }
}

impl ClusterMatcher for AnyMatcher {
    fn name(&self) -> &'static str {
        match self {
            Self::Gap(m) => m.name(),
            Self::Center(m) => m.name(),
            Self::End(m) => m.name(),
            Self::Overlap(m) => m.name(),
        }
    }

    fn queues(&self) -> &MatchQueues {
        match self {
            Self::Gap(m) => m.queues(),
            Self::Center(m) => m.queues(),
            Self::End(m) => m.queues(),
            Self::Overlap(m) => m.queues(),
        }
    }

    fn queues_mut(&mut self) -> &mut MatchQueues {
        match self {
            Self::Gap(m) => m.queues_mut(),
            Self::Center(m) => m.queues_mut(),
            Self::End(m) => m.queues_mut(),
            Self::Overlap(m) => m.queues_mut(),
        }
    }

    fn match_clusters(&mut self, flush: bool) {
        match self {
            Self::Gap(m) => m.match_clusters(flush),
            Self::Center(m) => m.match_clusters(flush),
            Self::End(m) => m.match_clusters(flush),
            Self::Overlap(m) => m.match_clusters(flush),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::mock_cluster;
    use super::*;

    #[test]
    fn test_time_algorithm_parse() {
        assert_eq!(
            "center-of-mass".parse::<TimeAlgorithm>().unwrap(),
            TimeAlgorithm::CenterOfMass
        );
        assert_eq!("utpc".parse::<TimeAlgorithm>().unwrap(), TimeAlgorithm::Utpc);
        assert_eq!(
            "charge2".parse::<TimeAlgorithm>().unwrap(),
            TimeAlgorithm::Charge2
        );
        assert!(matches!(
            "median".parse::<TimeAlgorithm>(),
            Err(Error::UnknownTimeAlgorithm(name)) if name == "median"
        ));
        assert_eq!(TimeAlgorithm::Utpc.to_string(), "utpc");
    }

    #[test]
    fn test_config_validation() {
        assert!(MatcherConfig::new().validate().is_ok());
        assert!(MatcherConfig::new().with_planes(2, 2).validate().is_err());
        assert!(matches!(
            MatcherConfig::new()
                .with_planes(0, INVALID_PLANE)
                .validate(),
            Err(Error::InvalidPlane(INVALID_PLANE))
        ));
        assert!(MatchQueues::new(100, 1, 1).is_err());
    }

    #[test]
    fn test_insert_keeps_order_and_latest() {
        let mut queues = MatchQueues::new(100, 0, 1).unwrap();
        queues.insert(
            0,
            vec![
                mock_cluster(0, 300, 310),
                mock_cluster(0, 100, 110),
                mock_cluster(0, 200, 210),
            ],
        );
        let starts: Vec<u64> = queues
            .unmatched_clusters(0)
            .iter()
            .map(|c| c.time_start())
            .collect();
        assert_eq!(starts, vec![100, 200, 300]);
        assert_eq!(queues.latest(), (Some(300), None));
        assert_eq!(queues.pending(), 3);
    }

    #[test]
    fn test_insert_skips_empty_clusters() {
        let mut queues = MatchQueues::new(100, 0, 1).unwrap();
        queues.insert(1, vec![Cluster::new()]);
        assert_eq!(queues.pending(), 0);
        assert_eq!(queues.latest(), (None, None));
    }

    #[test]
    fn test_insert_rejects_unselected_plane() {
        let mut queues = MatchQueues::new(100, 0, 1).unwrap();
        queues.insert(2, vec![mock_cluster(2, 0, 1), mock_cluster(2, 5, 6)]);
        assert_eq!(queues.pending(), 0);
        assert_eq!(queues.statistics().rejected_clusters, 2);
    }

    #[test]
    fn test_ready() {
        let mut queues = MatchQueues::new(100, 0, 1).unwrap();
        let cluster = mock_cluster(0, 0, 0);
        assert!(!queues.is_ready(&cluster, 0));

        queues.insert(0, vec![mock_cluster(0, 100, 100)]);
        queues.insert(1, vec![mock_cluster(1, 100, 100)]);
        assert!(!queues.is_ready(&cluster, 0));

        queues.insert(0, vec![mock_cluster(0, 101, 101)]);
        assert!(!queues.is_ready(&cluster, 0));
        queues.insert(1, vec![mock_cluster(1, 101, 101)]);
        assert!(queues.is_ready(&cluster, 0));
        assert!(!queues.is_ready(&cluster, 1));
    }

    #[test]
    fn test_any_matcher_dispatch() {
        let gap = AnyMatcher::new(
            &MatcherConfig::new().with_strategy(MatcherStrategy::Gap {
                minimum_time_gap: 10,
            }),
        )
        .unwrap();
        assert_eq!(gap.name(), "gap");

        let center = AnyMatcher::new(&MatcherConfig::new()).unwrap();
        assert_eq!(center.name(), "center");

        let end = AnyMatcher::new(&MatcherConfig::new().with_strategy(MatcherStrategy::End {
            max_delta_time: 200,
        }))
        .unwrap();
        assert_eq!(end.name(), "end");

        let overlap =
            AnyMatcher::new(&MatcherConfig::new().with_strategy(MatcherStrategy::Overlap)).unwrap();
        assert_eq!(overlap.name(), "overlap");

        assert!(AnyMatcher::new(&MatcherConfig::new().with_planes(3, 3)).is_err());
    }
}
