//! Gap-based streaming clusterer.
//!
//! Hits of one plane arrive in non-decreasing time order, possibly spread
//! over many readout packets. At most one cluster is open at any time; it
//! stays open across calls to [`Clusterer::cluster`] so that a detection
//! straddling a packet boundary is not split. [`Clusterer::flush`] closes it.

use efu_core::{Cluster, ClusterContainer, Hit};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Common contract of per-plane clusterers.
pub trait Clusterer {
    /// Returns the name of the algorithm.
    fn name(&self) -> &'static str;

    /// Feeds a time-sorted batch of hits.
    fn cluster(&mut self, hits: &[Hit]);

    /// Closes the open cluster, if any.
    fn flush(&mut self);

    /// Completed clusters not yet taken.
    fn clusters(&self) -> &[Cluster];

    /// Drains the completed clusters.
    fn take_clusters(&mut self) -> ClusterContainer;

    /// True when no completed cluster is waiting.
    fn is_empty(&self) -> bool {
        self.clusters().is_empty()
    }

    /// Total number of clusters completed so far.
    fn stats_cluster_count(&self) -> u64;
}

/// Thresholds of the gap clusterer.
///
/// Zero is a valid value for both: a zero time gap groups only hits with
/// identical time, a zero coordinate gap only hits on the same coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GapClustererConfig {
    /// Largest allowed time distance to the open cluster's latest hit.
    pub max_time_gap: u64,
    /// Largest allowed coordinate distance to the open cluster's span.
    pub max_coord_gap: u16,
}

impl Default for GapClustererConfig {
    fn default() -> Self {
        Self {
            max_time_gap: 200,
            max_coord_gap: 2,
        }
    }
}

impl GapClustererConfig {
    /// Creates a configuration with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum time gap.
    #[must_use]
    pub fn with_max_time_gap(mut self, gap: u64) -> Self {
        self.max_time_gap = gap;
        self
    }

    /// Sets the maximum coordinate gap.
    #[must_use]
    pub fn with_max_coord_gap(mut self, gap: u16) -> Self {
        self.max_coord_gap = gap;
        self
    }
}

/// Streaming gap clusterer for one plane.
#[derive(Debug, Clone, Default)]
pub struct GapClusterer {
    config: GapClustererConfig,
    open: Cluster,
    clusters: ClusterContainer,
    stats_cluster_count: u64,
}

impl GapClusterer {
    /// Creates a clusterer with the given thresholds.
    #[must_use]
    pub fn new(config: GapClustererConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &GapClustererConfig {
        &self.config
    }

    /// True while a cluster is waiting for more hits.
    #[must_use]
    pub fn has_open_cluster(&self) -> bool {
        !self.open.is_empty()
    }

    /// Distance from `coordinate` to the open cluster's coordinate span.
    fn coord_distance(&self, coordinate: u16) -> u16 {
        if coordinate < self.open.coord_start() {
            self.open.coord_start() - coordinate
        } else {
            coordinate.saturating_sub(self.open.coord_end())
        }
    }

    fn accepts(&self, hit: &Hit) -> bool {
        // out-of-order hits count as gap 0
        let time_gap = hit.time.saturating_sub(self.open.time_end());
        time_gap <= self.config.max_time_gap
            && self.coord_distance(hit.coordinate) <= self.config.max_coord_gap
    }

    fn stash_open(&mut self) {
        if self.open.is_empty() {
            return;
        }
        self.clusters.push(std::mem::take(&mut self.open));
        self.stats_cluster_count += 1;
    }
}

impl Clusterer for GapClusterer {
    fn name(&self) -> &'static str {
        "gap"
    }

    fn cluster(&mut self, hits: &[Hit]) {
        for hit in hits {
            if !self.open.is_empty() && !self.accepts(hit) {
                self.stash_open();
            }
            self.open.insert(*hit);
        }
    }

    fn flush(&mut self) {
        self.stash_open();
    }

    fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    fn take_clusters(&mut self) -> ClusterContainer {
        std::mem::take(&mut self.clusters)
    }

    fn stats_cluster_count(&self) -> u64 {
        self.stats_cluster_count
    }
}
