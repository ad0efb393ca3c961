//! Error types for efu-core.

use thiserror::Error;

/// Result type alias for efu operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types.
///
/// Only construction-time failures are reported as errors. Conditions met
/// while processing data (drops, rejects, gaps) are counted instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Plane id that cannot be used for matching.
    #[error("invalid plane: {0}")]
    InvalidPlane(u8),

    /// Unrecognised time estimator name.
    #[error("unknown time algorithm: {0:?} (expected center-of-mass, utpc or charge2)")]
    UnknownTimeAlgorithm(String),
}
