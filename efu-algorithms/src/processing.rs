//! Per-plane clustering followed by coincidence matching.

use crate::clusterer::{Clusterer, GapClusterer, GapClustererConfig};
use crate::matcher::{AnyMatcher, ClusterMatcher, MatcherConfig, MatcherStatistics};
use efu_core::{sort_chronologically, Event, Hit, HitVector, Result};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration of a [`ReductionEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReductionConfig {
    /// Thresholds shared by both per-plane clusterers.
    pub clusterer: GapClustererConfig,
    pub matcher: MatcherConfig,
}

impl ReductionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clusterer(mut self, clusterer: GapClustererConfig) -> Self {
        self.clusterer = clusterer;
        self
    }

    #[must_use]
    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.matcher = matcher;
        self
    }
}

/// Reduction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReductionStatistics {
    /// Hits routed to a clusterer.
    pub hits: u64,
    /// Hits dropped because their plane is not matched.
    pub plane_errors: u64,
    pub clusters_a: u64,
    pub clusters_b: u64,
    pub matcher: MatcherStatistics,
}

/// Hits to events for one detector: a clusterer per plane and a matcher.
#[derive(Debug, Clone)]
pub struct ReductionEngine {
    plane_a: u8,
    plane_b: u8,
    clusterer_a: GapClusterer,
    clusterer_b: GapClusterer,
    matcher: AnyMatcher,
    hits_a: HitVector,
    hits_b: HitVector,
    hits: u64,
    plane_errors: u64,
}

impl ReductionEngine {
    /// Creates an engine.
    ///
    /// # Errors
    /// Returns an error if the matcher configuration is invalid.
    pub fn new(config: &ReductionConfig) -> Result<Self> {
        Ok(Self {
            plane_a: config.matcher.plane_a,
            plane_b: config.matcher.plane_b,
            clusterer_a: GapClusterer::new(config.clusterer),
            clusterer_b: GapClusterer::new(config.clusterer),
            matcher: AnyMatcher::new(&config.matcher)?,
            hits_a: Vec::new(),
            hits_b: Vec::new(),
            hits: 0,
            plane_errors: 0,
        })
    }

    /// Clusters and matches one batch of hits, returning the emitted events.
    ///
    /// With `flush` every open cluster is closed and every pending cluster is
    /// emitted. Hits need not be sorted; each plane is sorted per batch.
    pub fn process(&mut self, hits: &[Hit], flush: bool) -> Vec<Event> {
        for hit in hits {
            if hit.plane == self.plane_a {
                self.hits_a.push(*hit);
            } else if hit.plane == self.plane_b {
                self.hits_b.push(*hit);
            } else {
                self.plane_errors += 1;
                continue;
            }
            self.hits += 1;
        }

        Self::cluster_plane(
            self.plane_a,
            &mut self.hits_a,
            &mut self.clusterer_a,
            &mut self.matcher,
            flush,
        );
        Self::cluster_plane(
            self.plane_b,
            &mut self.hits_b,
            &mut self.clusterer_b,
            &mut self.matcher,
            flush,
        );

        self.matcher.match_clusters(flush);
        self.matcher.take_events()
    }

    /// Closes all open clusters and emits every pending cluster.
    pub fn flush(&mut self) -> Vec<Event> {
        self.process(&[], true)
    }

    #[must_use]
    pub fn matcher(&self) -> &AnyMatcher {
        &self.matcher
    }

    #[must_use]
    pub fn statistics(&self) -> ReductionStatistics {
        ReductionStatistics {
            hits: self.hits,
            plane_errors: self.plane_errors,
            clusters_a: self.clusterer_a.stats_cluster_count(),
            clusters_b: self.clusterer_b.stats_cluster_count(),
            matcher: self.matcher.statistics(),
        }
    }

    fn cluster_plane(
        plane: u8,
        hits: &mut HitVector,
        clusterer: &mut GapClusterer,
        matcher: &mut AnyMatcher,
        flush: bool,
    ) {
        if !hits.is_empty() {
            sort_chronologically(hits);
            clusterer.cluster(hits);
            hits.clear();
        }
        if flush {
            clusterer.flush();
        }
        if !clusterer.is_empty() {
            matcher.insert(plane, clusterer.take_clusters());
        }
    }
}

/// Reduces independent frames (e.g. pulse periods) in parallel.
///
/// Each frame runs through a fresh engine and is flushed at its end, so no
/// cluster spans two frames. Output order follows input order.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn reduce_frames(frames: &[HitVector], config: &ReductionConfig) -> Result<Vec<Vec<Event>>> {
    frames
        .par_iter()
        .map(|frame| {
            let mut engine = ReductionEngine::new(config)?;
            Ok(engine.process(frame, true))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatcherStrategy;

    fn config() -> ReductionConfig {
        ReductionConfig::new()
            .with_clusterer(
                GapClustererConfig::new()
                    .with_max_time_gap(10)
                    .with_max_coord_gap(1),
            )
            .with_matcher(
                MatcherConfig::new()
                    .with_maximum_latency(100)
                    .with_strategy(MatcherStrategy::Gap {
                        minimum_time_gap: 5,
                    }),
            )
    }

    fn neutron(time: u64, x: u16, y: u16) -> [Hit; 4] {
        [
            Hit::new(time, x, 100, 0),
            Hit::new(time + 2, x + 1, 80, 0),
            Hit::new(time + 1, y, 90, 1),
            Hit::new(time + 3, y + 1, 70, 1),
        ]
    }

    #[test]
    fn test_invalid_matcher_config() {
        let bad = config().with_matcher(MatcherConfig::new().with_planes(1, 1));
        assert!(ReductionEngine::new(&bad).is_err());
    }

    #[test]
    fn test_engine_pairs_planes() {
        let mut engine = ReductionEngine::new(&config()).unwrap();
        let mut hits = Vec::new();
        hits.extend(neutron(1000, 10, 20));
        hits.extend(neutron(2000, 30, 40));
        let events = engine.process(&hits, false);
        assert!(events.is_empty());

        let events = engine.flush();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(Event::both_planes));
        assert_eq!(events[0].time_start(), 1000);
        assert_eq!(events[1].cluster_a.hit_count(), 2);

        let stats = engine.statistics();
        assert_eq!(stats.hits, 8);
        assert_eq!(stats.clusters_a, 2);
        assert_eq!(stats.clusters_b, 2);
        assert_eq!(stats.matcher.coincidences, 2);
    }

    #[test]
    fn test_engine_emits_once_horizon_passes() {
        let mut engine = ReductionEngine::new(&config()).unwrap();
        assert!(engine.process(&neutron(1000, 10, 20), false).is_empty());
        assert!(engine.process(&neutron(1200, 10, 20), false).is_empty());
        // closing the 1200 clusters moves the horizon past 1003 + 100 + 5
        let events = engine.process(&neutron(1400, 10, 20), false);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time_start(), 1000);
        assert_eq!(engine.flush().len(), 2);
    }

    #[test]
    fn test_unknown_plane_counted() {
        let mut engine = ReductionEngine::new(&config()).unwrap();
        engine.process(&[Hit::new(5, 1, 1, 7)], true);
        assert_eq!(engine.statistics().plane_errors, 1);
        assert_eq!(engine.statistics().hits, 0);
    }

    #[test]
    fn test_reduce_frames_keeps_order() {
        let frames: Vec<HitVector> = (0..16u64)
            .map(|i| neutron(i * 10_000, 5, 6).to_vec())
            .collect();
        let reduced = reduce_frames(&frames, &config()).unwrap();
        assert_eq!(reduced.len(), 16);
        for (i, events) in reduced.iter().enumerate() {
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].time_start(), i as u64 * 10_000);
        }
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_config_from_json() {
        use crate::matcher::{TieBreak, TimeAlgorithm};

        let json = r#"{
            "clusterer": { "max_time_gap": 500, "max_coord_gap": 1 },
            "matcher": {
                "plane_a": 0,
                "plane_b": 1,
                "maximum_latency": 5000,
                "tie_break": "higher-weight",
                "strategy": { "center": { "max_delta_time": 300, "time_algorithm": "utpc" } }
            }
        }"#;
        let config: ReductionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.clusterer.max_time_gap, 500);
        assert_eq!(config.matcher.tie_break, TieBreak::HigherWeight);
        assert_eq!(
            config.matcher.strategy,
            MatcherStrategy::Center {
                max_delta_time: 300,
                time_algorithm: TimeAlgorithm::Utpc,
            }
        );
        assert!(ReductionEngine::new(&config).is_ok());
    }
}
