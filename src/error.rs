//! Error types for megha-slam.
//!
//! # Error Recovery Strategies
//!
//! - **`BadMeasurementType`**: a measurement was handed to a sensor routine
//!   that cannot process its kind. Fatal to that operation; the caller
//!   decides whether to drop the measurement or abort.
//!
//! - **`NoMatch`**: scan registration rejected a candidate pair (too few
//!   points, no convergence, fitness above threshold). Non-fatal during
//!   neighbor linking: the mapper logs the rejection at debug level and
//!   simply does not add the edge.
//!
//! - **`BadVertex`**: a graph lookup referenced a vertex that does not
//!   exist. Graph invariants guarantee this cannot happen through the
//!   public mapper API; seeing it indicates a bug.
//!
//! - **`OdometryUnavailable`**: the odometry source has no pose for the
//!   requested time. The mapper skips the odometry-dependent steps of that
//!   insertion.
//!
//! - **`NoSolver`**: `optimize()` was called without a solver attached.
//!   Attach one and retry.

use thiserror::Error;

/// Errors that can occur in the SLAM frontend.
///
/// See module-level documentation for recovery strategies.
#[derive(Error, Debug)]
pub enum Error {
    #[error("sensor '{sensor}' cannot handle a '{kind}' measurement")]
    BadMeasurementType {
        sensor: String,
        kind: &'static str,
    },

    #[error("registration rejected: {0}")]
    NoMatch(String),

    #[error("vertex {0} does not exist in the graph")]
    BadVertex(u64),

    #[error("odometry has no pose for timestamp {0}")]
    OdometryUnavailable(u64),

    #[error("no solver attached to the mapper")]
    NoSolver,
}

pub type Result<T> = std::result::Result<T, Error>;
