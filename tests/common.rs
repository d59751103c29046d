//! Shared fixtures for integration tests: synthetic room clouds, scripted
//! odometry, and a translation-relaxation solver.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use megha_slam::{
    Covariance6, Error, Measurement, Odometry, Point3D, PointCloud3D, PointCloudMeasurement,
    Result, Solver, Transform, VertexId,
};

/// Randomly sampled points on the four walls of a room enclosing the test
/// trajectories. The jitter keeps kd-tree input non-degenerate; the 2D
/// spread on each wall gives registration proper planar support.
pub fn room_cloud(seed: u64) -> PointCloud3D {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut cloud = PointCloud3D::new();
    let (x_min, x_max) = (-2.0f32, 5.0f32);
    let (y_min, y_max) = (-2.0f32, 4.0f32);

    for _ in 0..200 {
        let x = rng.gen_range(x_min..x_max);
        let y = rng.gen_range(y_min..y_max);
        let za = rng.gen_range(0.0..2.5f32);
        let zb = rng.gen_range(0.0..2.5f32);
        let mut j = || rng.gen_range(-0.01..0.01f32);
        cloud.push(Point3D::new(x, y_min + j(), za));
        cloud.push(Point3D::new(x, y_max + j(), zb));
        cloud.push(Point3D::new(x_min + j(), y, za));
        cloud.push(Point3D::new(x_max + j(), y, zb));
    }
    cloud
}

/// A cloud too sparse for registration (below the 100-point minimum).
pub fn sparse_cloud() -> PointCloud3D {
    PointCloud3D::from_points(
        (0..10)
            .map(|i| Point3D::new(i as f32 * 0.3, 0.0, 1.0))
            .collect(),
    )
}

/// The given world cloud as observed by a robot at `pose` (sensor mounted
/// at the robot origin).
pub fn observed_from(world: &PointCloud3D, pose: &Transform) -> PointCloud3D {
    world.transformed(&pose.inverse())
}

/// Wrap a cloud into a measurement of the named sensor.
pub fn cloud_reading(cloud: PointCloud3D, sensor: &str, timestamp_us: u64) -> Measurement {
    Measurement::PointCloud(PointCloudMeasurement::new(
        cloud,
        "robot",
        sensor,
        Transform::identity(),
        timestamp_us,
    ))
}

/// Odometry source backed by a fixed timestamp -> pose table.
pub struct ScriptedOdometry {
    poses: HashMap<u64, Transform>,
}

impl ScriptedOdometry {
    pub fn new(poses: impl IntoIterator<Item = (u64, Transform)>) -> Self {
        Self {
            poses: poses.into_iter().collect(),
        }
    }
}

impl Odometry for ScriptedOdometry {
    fn pose_at(&self, timestamp_us: u64) -> Result<Transform> {
        self.poses
            .get(&timestamp_us)
            .copied()
            .ok_or(Error::OdometryUnavailable(timestamp_us))
    }
}

/// Solver that never succeeds, for failure-path tests.
#[derive(Default)]
pub struct FailingSolver;

impl Solver for FailingSolver {
    fn add_vertex(&mut self, _id: VertexId, _pose: &Transform) {}
    fn add_edge(
        &mut self,
        _source: VertexId,
        _target: VertexId,
        _transform: &Transform,
        _information: &Covariance6,
    ) {
    }
    fn add_fixed(&mut self, _id: VertexId) {}
    fn compute(&mut self) -> bool {
        false
    }
    fn vertex_pose(&self, _id: VertexId) -> Option<Transform> {
        None
    }
}

/// Gauss-Seidel relaxation over vertex translations.
///
/// Each sweep moves every free vertex to the mean position suggested by
/// its incident edges, which monotonically decreases the summed squared
/// translation residual for rotation-free graphs. Rotations are left
/// untouched. Intended for a single `optimize()` call per instance.
pub struct RelaxationSolver {
    poses: HashMap<VertexId, Transform>,
    edges: Vec<(VertexId, VertexId, Transform)>,
    fixed: HashSet<VertexId>,
    sweeps: usize,
}

impl RelaxationSolver {
    pub fn new(sweeps: usize) -> Self {
        Self {
            poses: HashMap::new(),
            edges: Vec::new(),
            fixed: HashSet::new(),
            sweeps,
        }
    }
}

impl Solver for RelaxationSolver {
    fn add_vertex(&mut self, id: VertexId, pose: &Transform) {
        self.poses.insert(id, *pose);
    }

    fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        transform: &Transform,
        _information: &Covariance6,
    ) {
        self.edges.push((source, target, *transform));
    }

    fn add_fixed(&mut self, id: VertexId) {
        self.fixed.insert(id);
    }

    fn compute(&mut self) -> bool {
        let mut ids: Vec<VertexId> = self.poses.keys().copied().collect();
        ids.sort_unstable();

        for _ in 0..self.sweeps.max(1) {
            for &id in &ids {
                if self.fixed.contains(&id) {
                    continue;
                }
                let mut sum = Vector3::zeros();
                let mut count = 0usize;
                for (source, target, transform) in &self.edges {
                    if *target == id {
                        if let Some(s) = self.poses.get(source) {
                            sum += (s * transform).translation.vector;
                            count += 1;
                        }
                    } else if *source == id {
                        if let Some(t) = self.poses.get(target) {
                            sum += (t * transform.inverse()).translation.vector;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    if let Some(pose) = self.poses.get_mut(&id) {
                        pose.translation.vector = sum / count as f64;
                    }
                }
            }
        }
        true
    }

    fn vertex_pose(&self, id: VertexId) -> Option<Transform> {
        self.poses.get(&id).copied()
    }
}
