//! Radius outlier removal for 3D point clouds.
//!
//! Drops isolated points: a point survives only if enough other points lie
//! within a given search radius. Effective against dust returns, multipath
//! spikes and stray reflections before map assembly.

use kiddo::{KdTree, SquaredEuclidean};

use crate::core::types::PointCloud3D;

/// Radius outlier removal filter.
#[derive(Debug, Clone, Copy)]
pub struct RadiusOutlierFilter {
    radius: f32,
    min_neighbors: usize,
}

impl RadiusOutlierFilter {
    /// Create a filter that keeps points with at least `min_neighbors`
    /// other points inside `radius` (meters).
    pub fn new(radius: f32, min_neighbors: usize) -> Self {
        Self {
            radius,
            min_neighbors,
        }
    }

    /// Apply the filter, returning the surviving points.
    ///
    /// Empty input yields empty output.
    pub fn apply(&self, cloud: &PointCloud3D) -> PointCloud3D {
        if cloud.is_empty() || self.min_neighbors == 0 {
            return cloud.clone();
        }

        let mut tree: KdTree<f32, 3> = KdTree::new();
        for (i, p) in cloud.points.iter().enumerate() {
            tree.add(&p.to_array(), i as u64);
        }

        let radius_sq = self.radius * self.radius;
        let mut out = PointCloud3D::with_capacity(cloud.len());

        for p in &cloud.points {
            let found = tree.within_unsorted::<SquaredEuclidean>(&p.to_array(), radius_sq);
            // The query point itself is in the tree, so require one extra hit
            if found.len() > self.min_neighbors {
                out.push(*p);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point3D;

    fn cluster_with_stray() -> PointCloud3D {
        let mut points: Vec<Point3D> = (0..20)
            .map(|i| Point3D::new(0.01 * i as f32, 0.003 * i as f32, 0.0))
            .collect();
        points.push(Point3D::new(10.0, 10.0, 10.0));
        PointCloud3D::from_points(points)
    }

    #[test]
    fn test_empty_input() {
        let filter = RadiusOutlierFilter::new(0.5, 2);
        assert!(filter.apply(&PointCloud3D::new()).is_empty());
    }

    #[test]
    fn test_removes_stray_point() {
        let cloud = cluster_with_stray();
        let filter = RadiusOutlierFilter::new(0.5, 2);
        let result = filter.apply(&cloud);

        assert_eq!(result.len(), 20);
        assert!(!result.points.iter().any(|p| p.x > 5.0));
    }

    #[test]
    fn test_keeps_dense_cluster() {
        let cloud = cluster_with_stray();
        let filter = RadiusOutlierFilter::new(0.5, 2);
        let result = filter.apply(&cloud);

        assert!(result.points.iter().all(|p| p.x < 1.0));
    }

    #[test]
    fn test_zero_min_neighbors_keeps_everything() {
        let cloud = cluster_with_stray();
        let filter = RadiusOutlierFilter::new(0.5, 0);
        assert_eq!(filter.apply(&cloud).len(), cloud.len());
    }

    #[test]
    fn test_strict_filter_removes_everything() {
        let cloud = PointCloud3D::from_points(vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(5.0, 0.0, 0.0),
        ]);
        let filter = RadiusOutlierFilter::new(0.1, 1);
        assert!(filter.apply(&cloud).is_empty());
    }

    #[test]
    fn test_single_point_is_outlier() {
        let cloud = PointCloud3D::from_points(vec![Point3D::new(1.0, 2.0, 3.0)]);
        let filter = RadiusOutlierFilter::new(1.0, 1);
        assert!(filter.apply(&cloud).is_empty());
    }
}
