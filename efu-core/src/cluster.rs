//! Incrementally aggregated clusters of same-plane hits.
//!
//! Every aggregate is updated on insert and merge, so the derived
//! quantities (centers, spans, gaps) are O(1) regardless of cluster size.

use crate::hit::{Hit, HitVector, INVALID_PLANE};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Completed clusters of one plane, in the order they were closed.
pub type ClusterContainer = Vec<Cluster>;

/// A group of hits considered part of one physical detection.
///
/// The plane is taken from the first hit. Inserting or merging a hit from
/// another plane is allowed but sets the plane to [`INVALID_PLANE`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    hits: HitVector,
    plane: u8,

    coord_start: u16,
    coord_end: u16,
    time_start: u64,
    time_end: u64,

    weight_sum: f64,
    weight2_sum: f64,
    coord_mass: f64,
    coord_mass2: f64,
    time_mass: f64,
    time_mass2: f64,

    /// Index of the (first) hit with the earliest time.
    earliest_idx: usize,
    /// First and last index among the hits sharing the latest time.
    latest_first_idx: usize,
    latest_last_idx: usize,
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            hits: Vec::new(),
            plane: INVALID_PLANE,
            coord_start: 0,
            coord_end: 0,
            time_start: 0,
            time_end: 0,
            weight_sum: 0.0,
            weight2_sum: 0.0,
            coord_mass: 0.0,
            coord_mass2: 0.0,
            time_mass: 0.0,
            time_mass2: 0.0,
            earliest_idx: 0,
            latest_first_idx: 0,
            latest_last_idx: 0,
        }
    }
}

impl FromIterator<Hit> for Cluster {
    fn from_iter<I: IntoIterator<Item = Hit>>(iter: I) -> Self {
        let mut cluster = Self::new();
        for hit in iter {
            cluster.insert(hit);
        }
        cluster
    }
}

impl Cluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hit, updating all aggregates.
    #[allow(clippy::cast_precision_loss)]
    pub fn insert(&mut self, hit: Hit) {
        let idx = self.hits.len();
        if self.hits.is_empty() {
            self.plane = hit.plane;
            self.coord_start = hit.coordinate;
            self.coord_end = hit.coordinate;
            self.time_start = hit.time;
            self.time_end = hit.time;
        } else {
            if hit.plane != self.plane {
                self.plane = INVALID_PLANE;
            }
            self.coord_start = self.coord_start.min(hit.coordinate);
            self.coord_end = self.coord_end.max(hit.coordinate);
            if hit.time < self.time_start {
                self.time_start = hit.time;
                self.earliest_idx = idx;
            }
            if hit.time == self.time_end {
                self.latest_last_idx = idx;
            } else if hit.time > self.time_end {
                self.time_end = hit.time;
                self.latest_first_idx = idx;
                self.latest_last_idx = idx;
            }
        }

        let w = f64::from(hit.weight);
        let w2 = w * w;
        let coord = f64::from(hit.coordinate);
        let time = hit.time as f64;
        self.weight_sum += w;
        self.weight2_sum += w2;
        self.coord_mass += w * coord;
        self.coord_mass2 += w2 * coord;
        self.time_mass += w * time;
        self.time_mass2 += w2 * time;

        self.hits.push(hit);
    }

    /// Moves all hits of `other` into this cluster, leaving `other` empty.
    pub fn merge(&mut self, other: &mut Cluster) {
        if other.hits.is_empty() {
            return;
        }
        if self.hits.is_empty() {
            *self = std::mem::take(other);
            return;
        }

        let offset = self.hits.len();
        if other.plane != self.plane {
            self.plane = INVALID_PLANE;
        }
        self.coord_start = self.coord_start.min(other.coord_start);
        self.coord_end = self.coord_end.max(other.coord_end);
        if other.time_start < self.time_start {
            self.time_start = other.time_start;
            self.earliest_idx = other.earliest_idx + offset;
        }
        match other.time_end.cmp(&self.time_end) {
            std::cmp::Ordering::Greater => {
                self.time_end = other.time_end;
                self.latest_first_idx = other.latest_first_idx + offset;
                self.latest_last_idx = other.latest_last_idx + offset;
            }
            std::cmp::Ordering::Equal => {
                self.latest_last_idx = other.latest_last_idx + offset;
            }
            std::cmp::Ordering::Less => {}
        }

        self.weight_sum += other.weight_sum;
        self.weight2_sum += other.weight2_sum;
        self.coord_mass += other.coord_mass;
        self.coord_mass2 += other.coord_mass2;
        self.time_mass += other.time_mass;
        self.time_mass2 += other.time_mass2;

        self.hits.append(&mut other.hits);
        other.clear();
    }

    /// Removes all hits and resets the aggregates.
    pub fn clear(&mut self) {
        let mut hits = std::mem::take(&mut self.hits);
        hits.clear();
        *self = Self {
            hits,
            ..Self::default()
        };
    }

    /// Plane of the hits, [`INVALID_PLANE`] if empty or mixed.
    #[must_use]
    pub fn plane(&self) -> u8 {
        self.plane
    }

    /// Hits in insertion order.
    #[must_use]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    #[must_use]
    pub fn weight2_sum(&self) -> f64 {
        self.weight2_sum
    }

    #[must_use]
    pub fn coord_mass(&self) -> f64 {
        self.coord_mass
    }

    #[must_use]
    pub fn coord_mass2(&self) -> f64 {
        self.coord_mass2
    }

    #[must_use]
    pub fn time_mass(&self) -> f64 {
        self.time_mass
    }

    #[must_use]
    pub fn time_mass2(&self) -> f64 {
        self.time_mass2
    }

    #[must_use]
    pub fn coord_start(&self) -> u16 {
        self.coord_start
    }

    #[must_use]
    pub fn coord_end(&self) -> u16 {
        self.coord_end
    }

    /// Earliest hit time (0 for an empty cluster).
    #[must_use]
    pub fn time_start(&self) -> u64 {
        self.time_start
    }

    /// Latest hit time (0 for an empty cluster).
    #[must_use]
    pub fn time_end(&self) -> u64 {
        self.time_end
    }

    /// Hit with the earliest time, if any.
    #[must_use]
    pub fn earliest_hit(&self) -> Option<&Hit> {
        self.hits.get(self.earliest_idx)
    }

    /// First inserted hit with the latest time, if any.
    #[must_use]
    pub fn latest_hit(&self) -> Option<&Hit> {
        self.hits.get(self.latest_first_idx)
    }

    /// Number of coordinates covered, inclusive.
    #[must_use]
    pub fn coord_span(&self) -> u32 {
        if self.hits.is_empty() {
            return 0;
        }
        u32::from(self.coord_end) - u32::from(self.coord_start) + 1
    }

    /// Number of clock ticks covered, inclusive.
    #[must_use]
    pub fn time_span(&self) -> u64 {
        if self.hits.is_empty() {
            return 0;
        }
        (self.time_end - self.time_start).saturating_add(1)
    }

    /// True if the covered coordinates leave more than `max_gap` holes.
    #[must_use]
    pub fn has_gap(&self, max_gap: u16) -> bool {
        (self.hits.len() as u64) + u64::from(max_gap) < u64::from(self.coord_span())
    }

    /// Weighted mean coordinate.
    ///
    /// Falls back to the middle of the coordinate span when all weights are
    /// zero, and is `0.0` for an empty cluster.
    #[must_use]
    pub fn coord_center(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.coord_mass / self.weight_sum
        } else {
            self.coord_midpoint()
        }
    }

    /// Mean coordinate weighted by the squared weights.
    #[must_use]
    pub fn coord_center2(&self) -> f64 {
        if self.weight2_sum > 0.0 {
            self.coord_mass2 / self.weight2_sum
        } else {
            self.coord_midpoint()
        }
    }

    /// Weighted mean time.
    #[must_use]
    pub fn time_center(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.time_mass / self.weight_sum
        } else {
            self.time_midpoint()
        }
    }

    /// Mean time weighted by the squared weights.
    #[must_use]
    pub fn time_center2(&self) -> f64 {
        if self.weight2_sum > 0.0 {
            self.time_mass2 / self.weight2_sum
        } else {
            self.time_midpoint()
        }
    }

    /// Coordinate of the "last fired" hit.
    ///
    /// With `weighted` the coordinate is averaged with its two neighbours in
    /// insertion order using squared weights.
    #[must_use]
    pub fn coord_utpc(&self, weighted: bool) -> f64 {
        self.utpc_estimate(weighted, |hit| f64::from(hit.coordinate))
    }

    /// Time of the "last fired" hit, see [`Cluster::coord_utpc`].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_utpc(&self, weighted: bool) -> f64 {
        self.utpc_estimate(weighted, |hit| hit.time as f64)
    }

    /// Length of the inclusive intersection of both time ranges.
    #[must_use]
    pub fn time_overlap(&self, other: &Cluster) -> u64 {
        overlap(self.time_extent(), other.time_extent())
    }

    /// Distance between the closest ends of both time ranges.
    ///
    /// Zero when the ranges overlap, `u64::MAX` when either cluster is empty.
    #[must_use]
    pub fn time_gap(&self, other: &Cluster) -> u64 {
        gap(self.time_extent(), other.time_extent())
    }

    /// Inclusive `(time_start, time_end)` or `None` when empty.
    #[must_use]
    pub fn time_extent(&self) -> Option<(u64, u64)> {
        (!self.hits.is_empty()).then_some((self.time_start, self.time_end))
    }

    fn coord_midpoint(&self) -> f64 {
        if self.hits.is_empty() {
            return 0.0;
        }
        (f64::from(self.coord_start) + f64::from(self.coord_end)) / 2.0
    }

    #[allow(clippy::cast_precision_loss)]
    fn time_midpoint(&self) -> f64 {
        if self.hits.is_empty() {
            return 0.0;
        }
        self.time_start as f64 + (self.time_end - self.time_start) as f64 / 2.0
    }

    /// Picks the latest-time hit closest to either end of the sequence.
    fn utpc_index(&self) -> usize {
        let first = self.latest_first_idx;
        let last = self.latest_last_idx;
        if first == last {
            return last;
        }
        let from_front = first;
        let from_back = self.hits.len() - 1 - last;
        match from_front.cmp(&from_back) {
            std::cmp::Ordering::Less => first,
            std::cmp::Ordering::Greater => last,
            std::cmp::Ordering::Equal => {
                if self.hits[first].weight > self.hits[last].weight {
                    first
                } else {
                    last
                }
            }
        }
    }

    fn utpc_estimate(&self, weighted: bool, value: impl Fn(&Hit) -> f64) -> f64 {
        if self.hits.is_empty() {
            return 0.0;
        }
        let idx = self.utpc_index();
        if !weighted {
            return value(&self.hits[idx]);
        }

        let lo = idx.saturating_sub(1);
        let hi = (idx + 1).min(self.hits.len() - 1);
        let (mass, norm) = self.hits[lo..=hi]
            .iter()
            .fold((0.0, 0.0), |(mass, norm), hit| {
                let w2 = f64::from(hit.weight) * f64::from(hit.weight);
                (mass + w2 * value(hit), norm + w2)
            });
        if norm > 0.0 {
            mass / norm
        } else {
            value(&self.hits[idx])
        }
    }
}

/// Inclusive overlap of two optional time ranges.
pub(crate) fn overlap(a: Option<(u64, u64)>, b: Option<(u64, u64)>) -> u64 {
    let (Some((a_start, a_end)), Some((b_start, b_end))) = (a, b) else {
        return 0;
    };
    let latest_start = a_start.max(b_start);
    let earliest_end = a_end.min(b_end);
    if latest_start > earliest_end {
        0
    } else {
        (earliest_end - latest_start).saturating_add(1)
    }
}

/// Gap between two optional time ranges.
pub(crate) fn gap(a: Option<(u64, u64)>, b: Option<(u64, u64)>) -> u64 {
    let (Some((a_start, a_end)), Some((b_start, b_end))) = (a, b) else {
        return u64::MAX;
    };
    let latest_start = a_start.max(b_start);
    let earliest_end = a_end.min(b_end);
    latest_start.saturating_sub(earliest_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cluster_of(plane: u8, hits: &[(u64, u16, u16)]) -> Cluster {
        hits.iter()
            .map(|&(time, coordinate, weight)| Hit::new(time, coordinate, weight, plane))
            .collect()
    }

    #[test]
    fn test_default_is_empty() {
        let cluster = Cluster::new();
        assert!(cluster.is_empty());
        assert_eq!(cluster.plane(), INVALID_PLANE);
        assert_eq!(cluster.coord_span(), 0);
        assert_eq!(cluster.time_span(), 0);
        assert_relative_eq!(cluster.coord_center(), 0.0);
        assert_relative_eq!(cluster.time_center(), 0.0);
        assert_relative_eq!(cluster.coord_utpc(true), 0.0);
    }

    #[test]
    fn test_insert_updates_aggregates() {
        let cluster = cluster_of(0, &[(10, 3, 2), (12, 5, 4)]);
        assert_eq!(cluster.plane(), 0);
        assert_eq!(cluster.hit_count(), 2);
        assert_eq!(cluster.coord_start(), 3);
        assert_eq!(cluster.coord_end(), 5);
        assert_eq!(cluster.time_start(), 10);
        assert_eq!(cluster.time_end(), 12);
        assert_eq!(cluster.coord_span(), 3);
        assert_eq!(cluster.time_span(), 3);
        assert_relative_eq!(cluster.weight_sum(), 6.0);
        assert_relative_eq!(cluster.weight2_sum(), 20.0);
        assert_relative_eq!(cluster.coord_mass(), 26.0);
        assert_relative_eq!(cluster.coord_mass2(), 92.0);
        assert_relative_eq!(cluster.time_mass(), 68.0);
        assert_relative_eq!(cluster.time_mass2(), 232.0);
        assert_relative_eq!(cluster.coord_center(), 26.0 / 6.0);
        assert_relative_eq!(cluster.coord_center2(), 92.0 / 20.0);
        assert_relative_eq!(cluster.time_center(), 68.0 / 6.0);
        assert_relative_eq!(cluster.time_center2(), 232.0 / 20.0);
    }

    #[test]
    fn test_mixed_planes_invalidate() {
        let mut cluster = cluster_of(0, &[(1, 1, 1)]);
        cluster.insert(Hit::new(2, 2, 1, 1));
        assert_eq!(cluster.plane(), INVALID_PLANE);
        assert_eq!(cluster.hit_count(), 2);
    }

    #[test]
    fn test_zero_weight_center_falls_back_to_midpoint() {
        let cluster = cluster_of(0, &[(10, 2, 0), (30, 6, 0)]);
        assert_relative_eq!(cluster.coord_center(), 4.0);
        assert_relative_eq!(cluster.time_center(), 20.0);
    }

    #[test]
    fn test_has_gap() {
        let contiguous = cluster_of(0, &[(1, 1, 1), (1, 2, 1), (1, 3, 1)]);
        assert!(!contiguous.has_gap(0));

        let holed = cluster_of(0, &[(1, 1, 1), (1, 3, 1), (1, 5, 1)]);
        assert!(holed.has_gap(0));
        assert!(holed.has_gap(1));
        assert!(!holed.has_gap(2));
    }

    #[test]
    fn test_merge_moves_hits() {
        let mut a = cluster_of(0, &[(10, 1, 1), (20, 2, 1)]);
        let mut b = cluster_of(0, &[(5, 7, 3), (25, 8, 3)]);
        a.merge(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.hit_count(), 4);
        assert_eq!(a.time_start(), 5);
        assert_eq!(a.time_end(), 25);
        assert_eq!(a.coord_start(), 1);
        assert_eq!(a.coord_end(), 8);
        assert_relative_eq!(a.weight_sum(), 8.0);
        assert_eq!(a.earliest_hit().map(|h| h.coordinate), Some(7));
        assert_eq!(a.latest_hit().map(|h| h.coordinate), Some(8));
        assert_eq!(a.plane(), 0);
    }

    #[test]
    fn test_merge_into_empty_adopts() {
        let mut a = Cluster::new();
        let mut b = cluster_of(1, &[(5, 7, 3)]);
        let expected = b.clone();
        a.merge(&mut b);
        assert_eq!(a, expected);
        assert!(b.is_empty());
    }

    #[test]
    fn test_merge_empty_is_noop() {
        let mut a = cluster_of(1, &[(5, 7, 3)]);
        let before = a.clone();
        a.merge(&mut Cluster::new());
        assert_eq!(a, before);
    }

    #[test]
    fn test_clear_resets_plane() {
        let mut cluster = cluster_of(1, &[(5, 7, 3)]);
        cluster.clear();
        assert!(cluster.is_empty());
        assert_eq!(cluster.plane(), INVALID_PLANE);
        assert_relative_eq!(cluster.weight_sum(), 0.0);
    }

    #[test]
    fn test_time_overlap_and_gap() {
        let a = cluster_of(0, &[(0, 1, 1), (200, 1, 1)]);
        let b = cluster_of(1, &[(200, 1, 1), (400, 1, 1)]);
        let c = cluster_of(1, &[(401, 1, 1), (500, 1, 1)]);
        assert_eq!(a.time_overlap(&b), 1);
        assert_eq!(a.time_gap(&b), 0);
        assert_eq!(a.time_overlap(&c), 0);
        assert_eq!(a.time_gap(&c), 201);
        assert_eq!(c.time_gap(&a), 201);
        assert_eq!(a.time_gap(&Cluster::new()), u64::MAX);
        assert_eq!(a.time_overlap(&Cluster::new()), 0);
    }

    #[test]
    fn test_utpc_single_latest() {
        let cluster = cluster_of(0, &[(1, 10, 5), (3, 11, 5), (2, 12, 5)]);
        assert_relative_eq!(cluster.coord_utpc(false), 11.0);
        assert_relative_eq!(cluster.time_utpc(false), 3.0);
        // neighbours 10 and 12 share the weight, centre stays at 11
        assert_relative_eq!(cluster.coord_utpc(true), 11.0);
    }

    #[test]
    fn test_utpc_prefers_edge() {
        // latest time shared by indices 1 and 3; index 3 is closer to the end
        let cluster = cluster_of(0, &[(1, 10, 1), (5, 11, 1), (2, 12, 1), (5, 13, 1)]);
        assert_relative_eq!(cluster.coord_utpc(false), 13.0);
    }

    #[test]
    fn test_utpc_tie_uses_weight() {
        let cluster = cluster_of(0, &[(5, 10, 9), (1, 11, 1), (5, 12, 2)]);
        assert_relative_eq!(cluster.coord_utpc(false), 10.0);
    }

    #[test]
    fn test_utpc_weighted_neighbours() {
        let cluster = cluster_of(0, &[(1, 10, 1), (2, 11, 2), (3, 12, 1)]);
        // latest hit is last: neighbours 11 (w=2) and 12 (w=1)
        assert_relative_eq!(cluster.coord_utpc(true), (4.0 * 11.0 + 12.0) / 5.0);
    }
}
