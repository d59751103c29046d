//! Rigid-body transform and covariance types.
//!
//! All poses live in a single map frame unless a function explicitly says
//! "sensor frame". Composition is right-multiplicative: `a * b` applies `b`
//! in the frame established by `a`.

use nalgebra::{Isometry3, Matrix6};

/// A 3D rigid-body transform (rotation + translation), SE(3).
///
/// Rotation is stored as a unit quaternion, so chained compositions stay
/// orthonormal without an explicit re-orthogonalization step.
pub type Transform = Isometry3<f64>;

/// 6x6 covariance over a pose: translation block first, rotation block second.
pub type Covariance6 = Matrix6<f64>;

/// A relative transform together with its uncertainty.
///
/// Produced by scan registration and consumed as an edge payload: applying
/// `transform` to the source pose yields the target pose, within
/// `covariance`.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub transform: Transform,
    pub covariance: Covariance6,
}

/// Identity covariance scaled by `s`.
pub fn scaled_covariance(s: f64) -> Covariance6 {
    Covariance6::identity() * s
}

/// Invert a covariance into an information matrix.
///
/// Used at the solver boundary only. A singular covariance falls back to
/// identity information so a single degenerate edge cannot take down a
/// whole optimization run.
pub fn to_information(covariance: &Covariance6) -> Covariance6 {
    match covariance.try_inverse() {
        Some(inv) => inv,
        None => {
            log::warn!("singular covariance, using identity information");
            Covariance6::identity()
        }
    }
}
