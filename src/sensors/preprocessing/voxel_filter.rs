//! Voxel-grid downsampling for 3D point clouds.
//!
//! Reduces point count while preserving cloud structure: every non-empty
//! cubic voxel is represented by the centroid of the points it contains.

use std::collections::HashMap;

use crate::core::types::{Point3D, PointCloud3D};

/// Voxel-grid downsampling filter.
///
/// Points are binned into cubic voxels of side `leaf_size`; each occupied
/// voxel contributes one output point, the centroid of its members.
/// Centroids are accumulated in `f64` so large coordinates do not lose
/// precision against small leaf sizes.
#[derive(Debug, Clone, Copy)]
pub struct VoxelFilter {
    leaf_size: f32,
}

impl VoxelFilter {
    /// Create a filter with the given cubic voxel side length (meters).
    pub fn new(leaf_size: f32) -> Self {
        Self { leaf_size }
    }

    /// The configured voxel side length.
    pub fn leaf_size(&self) -> f32 {
        self.leaf_size
    }

    /// Downsample a cloud. Empty input yields empty output; a
    /// non-positive leaf size passes the cloud through unchanged.
    pub fn apply(&self, cloud: &PointCloud3D) -> PointCloud3D {
        if cloud.is_empty() || self.leaf_size <= 0.0 {
            return cloud.clone();
        }

        struct Voxel {
            sum: [f64; 3],
            count: usize,
        }

        let inv_leaf = 1.0 / self.leaf_size;
        let mut grid: HashMap<(i32, i32, i32), Voxel> = HashMap::new();

        for p in &cloud.points {
            let key = (
                (p.x * inv_leaf).floor() as i32,
                (p.y * inv_leaf).floor() as i32,
                (p.z * inv_leaf).floor() as i32,
            );
            let voxel = grid.entry(key).or_insert(Voxel {
                sum: [0.0; 3],
                count: 0,
            });
            voxel.sum[0] += p.x as f64;
            voxel.sum[1] += p.y as f64;
            voxel.sum[2] += p.z as f64;
            voxel.count += 1;
        }

        let mut out = PointCloud3D::with_capacity(grid.len());
        for voxel in grid.values() {
            let inv_count = 1.0 / voxel.count as f64;
            out.push(Point3D::new(
                (voxel.sum[0] * inv_count) as f32,
                (voxel.sum[1] * inv_count) as f32,
                (voxel.sum[2] * inv_count) as f32,
            ));
        }
        out
    }
}
