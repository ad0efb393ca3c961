//! Hit type.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Plane id of a cluster holding hits from more than one plane.
pub const INVALID_PLANE: u8 = u8::MAX;

/// A single timestamped, plane-tagged, weighted detector sample.
///
/// Hits are produced by an instrument decoder and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Timestamp in clock ticks.
    pub time: u64,
    /// Channel / strip / wire coordinate within the plane.
    pub coordinate: u16,
    /// Signal amplitude.
    pub weight: u16,
    /// Detection plane.
    pub plane: u8,
}

impl Hit {
    /// Creates a new hit.
    #[must_use]
    pub const fn new(time: u64, coordinate: u16, weight: u16, plane: u8) -> Self {
        Self {
            time,
            coordinate,
            weight,
            plane,
        }
    }
}

/// Hits of one readout batch.
pub type HitVector = Vec<Hit>;

/// Sorts hits by time, keeping the arrival order of hits with equal time.
pub fn sort_chronologically(hits: &mut [Hit]) {
    hits.sort_by_key(|hit| hit.time);
}
