//! Point and point-cloud types for 3D SLAM.
//!
//! Points are stored in `f32` like the sensor delivers them; the pose
//! algebra around them stays in `f64`.

use crate::core::types::Transform;
use serde::{Deserialize, Serialize};

/// A 3D point in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
    /// Z coordinate in meters
    pub z: f32,
}

impl Point3D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Coordinates as an array, for kd-tree queries.
    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Squared distance to another point (avoids sqrt).
    #[inline]
    pub fn distance_squared(&self, other: &Point3D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point3D) -> f32 {
        self.distance_squared(other).sqrt()
    }
}

/// An owned 3D point cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud3D {
    /// The points of the cloud, in no particular order.
    pub points: Vec<Point3D>,
}

impl PointCloud3D {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
        }
    }

    /// Create a cloud from a list of points.
    pub fn from_points(points: Vec<Point3D>) -> Self {
        Self { points }
    }

    /// Number of points in the cloud.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the cloud has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point.
    pub fn push(&mut self, point: Point3D) {
        self.points.push(point);
    }

    /// Append all points of another cloud.
    pub fn extend_from(&mut self, other: &PointCloud3D) {
        self.points.extend_from_slice(&other.points);
    }

    /// Apply a rigid transform to every point, returning a new cloud.
    pub fn transformed(&self, tf: &Transform) -> PointCloud3D {
        let iso = tf.cast::<f32>();
        let points = self
            .points
            .iter()
            .map(|p| {
                let q = iso * nalgebra::Point3::new(p.x, p.y, p.z);
                Point3D::new(q.x, q.y, q.z)
            })
            .collect();
        PointCloud3D { points }
    }
}
