//! Spatial neighbor index over vertex poses.
//!
//! A kd-tree over the corrected translations of one sensor's vertices,
//! used to propose loop-closure candidates. The tree is keyed by dense
//! slots, so a side table maps slots back to vertex ids.
//!
//! The index is a snapshot: insertions and pose updates do **not**
//! invalidate it automatically. The mapper rebuilds it before each
//! neighbor query that follows an insertion, and marks it stale after
//! optimization rewrites poses.

use kiddo::{KdTree, SquaredEuclidean};

use crate::core::types::Transform;
use crate::engine::graph::{PoseGraph, VertexId};

/// Rebuildable kd-tree over the corrected poses of one sensor.
pub struct NeighborIndex {
    tree: KdTree<f32, 3>,
    slots: Vec<VertexId>,
    sensor: Option<String>,
    stale: bool,
}

impl Default for NeighborIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NeighborIndex {
    /// Create an empty, unbuilt index.
    pub fn new() -> Self {
        Self {
            tree: KdTree::new(),
            slots: Vec::new(),
            sensor: None,
            stale: false,
        }
    }

    /// Snapshot the corrected translations of all vertices of `sensor`
    /// into a fresh kd-tree.
    pub fn build(&mut self, graph: &PoseGraph, sensor: &str) {
        self.tree = KdTree::new();
        self.slots.clear();

        for vertex in graph.vertices_from_sensor(sensor) {
            let t = vertex.corrected_pose.translation.vector;
            let slot = self.slots.len() as u64;
            self.tree
                .add(&[t.x as f32, t.y as f32, t.z as f32], slot);
            self.slots.push(vertex.id);
        }

        self.sensor = Some(sensor.to_owned());
        self.stale = false;
    }

    /// Vertices whose snapshotted translation lies within `radius` meters
    /// of the query pose's translation. Order is unspecified.
    pub fn query(&self, tf: &Transform, radius: f64) -> Vec<VertexId> {
        let t = tf.translation.vector;
        let query = [t.x as f32, t.y as f32, t.z as f32];
        let radius = radius as f32;

        self.tree
            .within_unsorted::<SquaredEuclidean>(&query, radius * radius)
            .into_iter()
            .map(|n| self.slots[n.item as usize])
            .collect()
    }

    /// Sensor the current snapshot was built for, if any.
    pub fn sensor(&self) -> Option<&str> {
        self.sensor.as_deref()
    }

    /// Flag the snapshot as out of date with respect to the graph.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Whether the snapshot is known to be out of date.
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}
