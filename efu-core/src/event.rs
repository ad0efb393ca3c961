//! Coincidence events.

use crate::cluster::{gap, overlap, Cluster};
use crate::hit::Hit;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A pair of clusters, one per matched plane. Either side may be empty.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    plane_a: u8,
    plane_b: u8,
    /// Cluster on the first plane.
    pub cluster_a: Cluster,
    /// Cluster on the second plane.
    pub cluster_b: Cluster,
}

impl Default for Event {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

impl Event {
    /// Creates an empty event collecting hits of `plane_a` and `plane_b`.
    #[must_use]
    pub fn new(plane_a: u8, plane_b: u8) -> Self {
        Self {
            plane_a,
            plane_b,
            cluster_a: Cluster::new(),
            cluster_b: Cluster::new(),
        }
    }

    #[must_use]
    pub fn plane_a(&self) -> u8 {
        self.plane_a
    }

    #[must_use]
    pub fn plane_b(&self) -> u8 {
        self.plane_b
    }

    /// Adds a hit to the cluster of its plane. Hits of other planes are ignored.
    pub fn insert(&mut self, hit: Hit) {
        if hit.plane == self.plane_a {
            self.cluster_a.insert(hit);
        } else if hit.plane == self.plane_b {
            self.cluster_b.insert(hit);
        }
    }

    /// Merges a cluster into the side matching its plane, leaving it empty.
    ///
    /// Clusters of other planes are left untouched.
    pub fn merge(&mut self, cluster: &mut Cluster) {
        if cluster.plane() == self.plane_a {
            self.cluster_a.merge(cluster);
        } else if cluster.plane() == self.plane_b {
            self.cluster_b.merge(cluster);
        }
    }

    #[must_use]
    pub fn total_hit_count(&self) -> usize {
        self.cluster_a.hit_count() + self.cluster_b.hit_count()
    }

    pub fn clear(&mut self) {
        self.cluster_a.clear();
        self.cluster_b.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cluster_a.is_empty() && self.cluster_b.is_empty()
    }

    /// True if both planes contributed hits.
    #[must_use]
    pub fn both_planes(&self) -> bool {
        !self.cluster_a.is_empty() && !self.cluster_b.is_empty()
    }

    /// Earliest hit time over both clusters (0 for an empty event).
    #[must_use]
    pub fn time_start(&self) -> u64 {
        self.time_extent().map_or(0, |(start, _)| start)
    }

    /// Latest hit time over both clusters (0 for an empty event).
    #[must_use]
    pub fn time_end(&self) -> u64 {
        self.time_extent().map_or(0, |(_, end)| end)
    }

    #[must_use]
    pub fn time_span(&self) -> u64 {
        self.time_extent()
            .map_or(0, |(start, end)| (end - start).saturating_add(1))
    }

    /// Inclusive overlap between this event's time range and a cluster's.
    #[must_use]
    pub fn time_overlap(&self, other: &Cluster) -> u64 {
        overlap(self.time_extent(), other.time_extent())
    }

    /// Gap between this event's time range and a cluster's.
    #[must_use]
    pub fn time_gap(&self, other: &Cluster) -> u64 {
        gap(self.time_extent(), other.time_extent())
    }

    fn time_extent(&self) -> Option<(u64, u64)> {
        match (self.cluster_a.time_extent(), self.cluster_b.time_extent()) {
            (Some((a_start, a_end)), Some((b_start, b_end))) => {
                Some((a_start.min(b_start), a_end.max(b_end)))
            }
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(plane: u8, start: u64, end: u64) -> Cluster {
        [Hit::new(start, 1, 1, plane), Hit::new(end, 2, 1, plane)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_empty_event() {
        let event = Event::new(0, 1);
        assert!(event.is_empty());
        assert!(!event.both_planes());
        assert_eq!(event.total_hit_count(), 0);
        assert_eq!(event.time_start(), 0);
        assert_eq!(event.time_end(), 0);
        assert_eq!(event.time_span(), 0);
        assert_eq!(event.time_gap(&cluster(0, 1, 2)), u64::MAX);
    }

    #[test]
    fn test_insert_routes_by_plane() {
        let mut event = Event::new(3, 7);
        event.insert(Hit::new(1, 1, 1, 3));
        event.insert(Hit::new(2, 1, 1, 7));
        event.insert(Hit::new(3, 1, 1, 7));
        event.insert(Hit::new(4, 1, 1, 9));
        assert_eq!(event.cluster_a.hit_count(), 1);
        assert_eq!(event.cluster_b.hit_count(), 2);
        assert_eq!(event.total_hit_count(), 3);
        assert!(event.both_planes());
    }

    #[test]
    fn test_merge_routes_by_plane() {
        let mut event = Event::new(0, 1);
        let mut a = cluster(0, 10, 20);
        let mut b = cluster(1, 15, 40);
        let mut other = cluster(2, 0, 1);
        event.merge(&mut a);
        event.merge(&mut b);
        event.merge(&mut other);
        assert!(a.is_empty());
        assert!(b.is_empty());
        assert_eq!(other.hit_count(), 2);
        assert_eq!(event.time_start(), 10);
        assert_eq!(event.time_end(), 40);
        assert_eq!(event.time_span(), 31);
    }

    #[test]
    fn test_single_side_times() {
        let mut event = Event::new(0, 1);
        event.merge(&mut cluster(1, 100, 200));
        assert_eq!(event.time_start(), 100);
        assert_eq!(event.time_end(), 200);
        assert_eq!(event.time_overlap(&cluster(0, 200, 300)), 1);
        assert_eq!(event.time_gap(&cluster(0, 250, 300)), 50);
    }

    #[test]
    fn test_clear() {
        let mut event = Event::new(0, 1);
        event.merge(&mut cluster(0, 1, 2));
        event.clear();
        assert!(event.is_empty());
    }
}
