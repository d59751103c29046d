//! MeghaSLAM - Graph-based SLAM frontend for 3D point-cloud sensors
//!
//! # Architecture
//!
//! The crate is organized into 4 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │        (pose graph, neighbor index, mapper)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │                (GICP, NDT registration)             │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor processing
//! │          (preprocessing, point-cloud sensor)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! A measurement enters the [`Mapper`]. The mapper consults the odometry
//! for an initial guess, rejects readings below the minimum-distance gate,
//! inserts a vertex into the pose graph, links it to the previous vertex
//! (odometry edge and/or sequential registration), and queries the spatial
//! neighbor index for loop-closure candidates, each of which is verified
//! by scan registration before becoming an edge. [`Mapper::optimize`]
//! streams the graph through a pluggable [`Solver`] backend and writes
//! the refined poses back into the vertices.
//!
//! The mapper is single-threaded and not reentrant; callers serialize
//! access. Registration calls may block for hundreds of milliseconds.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor processing (depends on core)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Algorithms (depends on core, sensors)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Engine (depends on all layers)
// ============================================================================
pub mod engine;

mod error;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

pub use error::{Error, Result};

// Core types
pub use core::types::{
    scaled_covariance, to_information, Constraint, Covariance6, Measurement, MeasurementInfo,
    OrientationPrior, Point3D, PointCloud3D, PointCloudMeasurement, Transform,
};

// Sensors
pub use sensors::pointcloud::{PointCloudSensor, PointCloudSensorConfig};
pub use sensors::preprocessing::{RadiusOutlierFilter, VoxelFilter};

// Algorithms
pub use algorithms::registration::{Algorithm, RegistrationConfig};

// Engine
pub use engine::graph::{EdgeObject, NeighborIndex, PoseGraph, VertexId, VertexObject};
pub use engine::mapper::{Mapper, MapperConfig};
pub use engine::traits::{Odometry, Sensor, Solver};
