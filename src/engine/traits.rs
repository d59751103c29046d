//! Collaborator contracts of the mapper: sensors, odometry and the
//! optimization backend.
//!
//! All three are injected into the [`Mapper`](crate::engine::Mapper) and
//! must outlive it. The mapper never implements any of them itself.

use crate::core::types::{Constraint, Covariance6, Measurement, Transform};
use crate::engine::graph::{VertexId, VertexObject};
use crate::error::Result;

/// A sensor that can register its own measurements against each other.
pub trait Sensor {
    /// Unique sensor name; measurements carry it for dispatch.
    fn name(&self) -> &str;

    /// Fixed transform from the robot frame to this sensor's frame.
    fn sensor_pose(&self) -> Transform;

    /// Estimate the relative transform from `source` to `target`, starting
    /// from the odometric guess (robot frame).
    ///
    /// `is_loop` requests a coarse pre-alignment for candidates whose
    /// initial guess may be far off.
    ///
    /// Fails with `BadMeasurementType` when a measurement does not belong
    /// to this sensor's kind, and `NoMatch` when registration rejects the
    /// pair.
    fn create_constraint(
        &self,
        source: &Measurement,
        target: &Measurement,
        odom_guess: &Transform,
        is_loop: bool,
    ) -> Result<Constraint>;

    /// Accumulate the given vertices into a single measurement expressed
    /// relative to `pose`, for map assembly.
    fn create_combined_measurement(
        &self,
        vertices: &[&VertexObject],
        pose: &Transform,
    ) -> Result<Measurement>;
}

/// An external odometry source.
pub trait Odometry {
    /// The odometric pose at the given time.
    ///
    /// Fails with `OdometryUnavailable` when no pose can be produced for
    /// that timestamp.
    fn pose_at(&self, timestamp_us: u64) -> Result<Transform>;
}

/// An external pose-graph optimization backend.
///
/// The mapper streams the whole graph through this interface on every
/// `optimize()` call; implementations must treat `add_vertex` with a known
/// id as a pose update, not an error.
pub trait Solver {
    /// Declare a vertex with its current pose estimate.
    fn add_vertex(&mut self, id: VertexId, pose: &Transform);

    /// Declare a relative constraint between two vertices. `information`
    /// is the inverse of the edge covariance.
    fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        transform: &Transform,
        information: &Covariance6,
    );

    /// Pin a vertex during optimization. The mapper fixes the first
    /// vertex, anchoring the map frame.
    fn add_fixed(&mut self, id: VertexId);

    /// Run the optimization. `false` signals numerical failure; the
    /// mapper then leaves all poses untouched.
    fn compute(&mut self) -> bool;

    /// The optimized pose of a vertex after a successful `compute`.
    fn vertex_pose(&self, id: VertexId) -> Option<Transform>;
}
