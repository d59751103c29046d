//! Pose graph store and its spatial neighbor index.

mod neighbor_index;
mod pose_graph;

pub use neighbor_index::NeighborIndex;
pub use pose_graph::{EdgeObject, PoseGraph, VertexId, VertexObject};
