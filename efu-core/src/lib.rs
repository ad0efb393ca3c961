//! efu-core: Core types for neutron detector readout reduction.
//!
//! This crate provides the data model shared by the clustering and
//! matching algorithms and the receive/reduce pipeline:
//! - [`Hit`]: one timestamped, plane-tagged, weighted detector sample
//! - [`Cluster`]: an incrementally aggregated group of same-plane hits
//! - [`Event`]: a pair of clusters, one per matched plane
//!

pub mod cluster;
pub mod error;
pub mod event;
pub mod hit;

pub use cluster::{Cluster, ClusterContainer};
pub use error::{Error, Result};
pub use event::Event;
pub use hit::{sort_chronologically, Hit, HitVector, INVALID_PLANE};
