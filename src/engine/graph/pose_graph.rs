//! Pose graph data structure for the SLAM frontend.
//!
//! A directed multigraph: vertices hold measurement poses, edges hold
//! relative SE(3) constraints with uncertainties. Vertices and edges are
//! stored in arenas and referenced by stable integer ids, so cycles from
//! loop closures need no shared ownership between payloads.

use std::collections::HashMap;

use log::info;
use uuid::Uuid;

use crate::core::types::{Covariance6, Measurement, Transform};
use crate::error::{Error, Result};

/// Stable vertex identifier. Dense and monotonically increasing in
/// insertion order, starting at 1.
pub type VertexId = u64;

/// A vertex of the pose graph: one measurement and its current pose
/// estimate in the map frame.
#[derive(Debug, Clone)]
pub struct VertexObject {
    /// Dense id, `[1, N]` in insertion order.
    pub id: VertexId,

    /// Unique id, identical to the measurement's.
    pub uuid: Uuid,

    /// The measurement taken at this pose. Owned by the graph.
    pub measurement: Measurement,

    /// Best current estimate of the pose in the map frame. Written by the
    /// mapper on insertion and after optimization.
    pub corrected_pose: Transform,
}

/// A directed edge of the pose graph: applying `transform` to the source
/// pose yields the target pose, within `covariance`.
#[derive(Debug, Clone)]
pub struct EdgeObject {
    pub source: VertexId,
    pub target: VertexId,
    pub transform: Transform,
    pub covariance: Covariance6,

    /// Name of the sensor (or odometry) that produced the constraint.
    pub sensor: String,

    /// Constraint origin: `"odom"`, `"seq"` or `"match"`.
    pub label: String,
}

/// The pose graph store.
#[derive(Debug, Default)]
pub struct PoseGraph {
    vertices: Vec<VertexObject>,
    edges: Vec<EdgeObject>,
    uuid_index: HashMap<Uuid, VertexId>,
}

impl PoseGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a measurement as a new vertex at the given pose.
    ///
    /// Id assignment and the uuid index update happen in the same step.
    pub fn add_vertex(&mut self, measurement: Measurement, corrected_pose: Transform) -> VertexId {
        let id = self.vertices.len() as VertexId + 1;
        let uuid = measurement.uuid();
        info!(
            "created vertex {} (from {}:{})",
            id,
            measurement.robot_name(),
            measurement.sensor_name()
        );
        self.uuid_index.insert(uuid, id);
        self.vertices.push(VertexObject {
            id,
            uuid,
            measurement,
            corrected_pose,
        });
        id
    }

    /// Insert an edge between two existing vertices.
    ///
    /// Fails with `BadVertex` when either endpoint does not exist.
    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        transform: Transform,
        covariance: Covariance6,
        sensor: &str,
        label: &str,
    ) -> Result<()> {
        self.vertex(source)?;
        self.vertex(target)?;
        info!(
            "created '{}' edge from vertex {} to vertex {} (from {})",
            label, source, target, sensor
        );
        self.edges.push(EdgeObject {
            source,
            target,
            transform,
            covariance,
            sensor: sensor.to_owned(),
            label: label.to_owned(),
        });
        Ok(())
    }

    /// Look up a vertex by id.
    pub fn vertex(&self, id: VertexId) -> Result<&VertexObject> {
        if id == 0 {
            return Err(Error::BadVertex(id));
        }
        self.vertices
            .get(id as usize - 1)
            .ok_or(Error::BadVertex(id))
    }

    /// Mutable vertex access, for the mapper only.
    pub(crate) fn vertex_mut(&mut self, id: VertexId) -> Result<&mut VertexObject> {
        if id == 0 {
            return Err(Error::BadVertex(id));
        }
        self.vertices
            .get_mut(id as usize - 1)
            .ok_or(Error::BadVertex(id))
    }

    /// Look up a vertex by the unique id of its measurement.
    pub fn vertex_by_uuid(&self, uuid: &Uuid) -> Option<&VertexObject> {
        self.uuid_index
            .get(uuid)
            .and_then(|&id| self.vertex(id).ok())
    }

    /// All vertices whose measurement came from the named sensor.
    pub fn vertices_from_sensor(&self, sensor: &str) -> Vec<&VertexObject> {
        self.vertices
            .iter()
            .filter(|v| v.measurement.sensor_name() == sensor)
            .collect()
    }

    /// All edges attributed to the named sensor.
    pub fn edges_from_sensor(&self, sensor: &str) -> Vec<&EdgeObject> {
        self.edges.iter().filter(|e| e.sensor == sensor).collect()
    }

    /// Edges incident to a vertex, in either direction.
    pub fn edges_of(&self, id: VertexId) -> impl Iterator<Item = &EdgeObject> {
        self.edges
            .iter()
            .filter(move |e| e.source == id || e.target == id)
    }

    /// All vertices, in insertion order.
    pub fn vertices(&self) -> &[VertexObject] {
        &self.vertices
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[EdgeObject] {
        &self.edges
    }

    /// The anchor of the map frame: the earliest inserted vertex.
    pub fn first_vertex(&self) -> Option<&VertexObject> {
        self.vertices.first()
    }

    /// Number of vertices.
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no vertices.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}
