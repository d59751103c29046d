//! Scan registration: align two point clouds into a relative transform.
//!
//! Two algorithms are provided behind a common driver:
//!
//! - [`Algorithm::Gicp`]: Generalized ICP with per-point surface
//!   covariances (plane-to-plane metric)
//! - [`Algorithm::Ndt`]: Normal Distributions Transform against a voxelized
//!   Gaussian model of the fixed cloud
//!
//! The driver owns the shared contract: optional voxel downsampling, a
//! minimum point count, the convergence/fitness acceptance gate, and the
//! `f32`-internal / `f64`-boundary numerics. The returned transform maps
//! the *moving* cloud onto the *fixed* cloud.

mod gicp;
mod ndt;

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Isometry3;
use serde::{Deserialize, Serialize};

use crate::core::types::{PointCloud3D, Transform};
use crate::error::{Error, Result};
use crate::sensors::preprocessing::VoxelFilter;

/// Registration needs enough structure to estimate 6 degrees of freedom;
/// below this the result is noise.
const MIN_ALIGNMENT_POINTS: usize = 100;

/// Registration algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    Gicp,
    Ndt,
}

/// Parameters for a single registration pass.
///
/// Sensors typically hold two of these: a coarse one for loop closures
/// (wide search, heavy downsampling) and a fine one for refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Which algorithm to run.
    pub algorithm: Algorithm,

    /// Voxel leaf size applied to both clouds before alignment (meters).
    /// 0 disables downsampling.
    pub point_cloud_density: f32,

    /// Correspondences farther apart than this are ignored (meters).
    pub max_correspondence_distance: f32,

    /// Outer iteration bound.
    pub maximum_iterations: u32,

    /// Acceptance threshold on the fitness score; higher is more
    /// permissive.
    pub max_fitness_score: f32,

    /// Convergence threshold on the incremental transform.
    pub transformation_epsilon: f32,

    /// Convergence threshold on the change in mean squared residual.
    pub euclidean_fitness_epsilon: f32,

    /// GICP: neighbors used to estimate each point's surface covariance.
    pub correspondence_randomness: usize,

    /// GICP: inner optimizer iterations per correspondence set.
    pub maximum_optimizer_iterations: u32,

    /// GICP: convergence threshold on the incremental rotation (radians).
    pub rotation_epsilon: f32,

    /// NDT: expected fraction of points without a matching surface.
    pub outlier_ratio: f32,

    /// NDT: maximum Newton step length per iteration (meters).
    pub step_size: f32,

    /// NDT: voxel side length of the Gaussian model (meters).
    pub resolution: f32,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Gicp,
            point_cloud_density: 0.2,
            max_correspondence_distance: 2.5,
            maximum_iterations: 50,
            max_fitness_score: 2.0,
            transformation_epsilon: 1e-5,
            euclidean_fitness_epsilon: 1.0,
            correspondence_randomness: 20,
            maximum_optimizer_iterations: 20,
            rotation_epsilon: 2e-3,
            outlier_ratio: 0.55,
            step_size: 0.1,
            resolution: 1.0,
        }
    }
}

impl RegistrationConfig {
    /// A coarse variant for loop-closure candidates: heavier downsampling
    /// and a wider correspondence search to survive a bad initial guess.
    pub fn coarse() -> Self {
        Self {
            point_cloud_density: 0.4,
            max_correspondence_distance: 5.0,
            maximum_iterations: 20,
            max_fitness_score: 10.0,
            ..Self::default()
        }
    }
}

/// Raw algorithm output before the acceptance gate.
#[derive(Debug, Clone)]
pub(crate) struct Alignment {
    /// Refined transform mapping the moving cloud onto the fixed cloud.
    pub transform: Isometry3<f32>,
    /// Whether a convergence criterion was met within the iteration bound.
    pub converged: bool,
    /// Outer iterations performed.
    pub iterations: u32,
}

/// Align `moving` onto `fixed`, starting from `guess`.
///
/// Returns the refined transform, or `NoMatch` when the clouds are too
/// sparse, the algorithm does not converge, or the fitness score exceeds
/// `cfg.max_fitness_score`.
pub fn align(
    moving: &PointCloud3D,
    fixed: &PointCloud3D,
    guess: &Transform,
    cfg: &RegistrationConfig,
) -> Result<Transform> {
    let downsampled = (cfg.point_cloud_density > 0.0).then(|| {
        let filter = VoxelFilter::new(cfg.point_cloud_density);
        (filter.apply(moving), filter.apply(fixed))
    });
    let (moving, fixed) = match &downsampled {
        Some((m, f)) => (m, f),
        None => (moving, fixed),
    };

    if moving.len() < MIN_ALIGNMENT_POINTS || fixed.len() < MIN_ALIGNMENT_POINTS {
        return Err(Error::NoMatch(format!(
            "too few points ({} / {}, need {})",
            moving.len(),
            fixed.len(),
            MIN_ALIGNMENT_POINTS
        )));
    }

    let guess32 = guess.cast::<f32>();
    let alignment = match cfg.algorithm {
        Algorithm::Gicp => gicp::align(moving, fixed, guess32, cfg),
        Algorithm::Ndt => ndt::align(moving, fixed, guess32, cfg),
    };

    if !alignment.converged {
        return Err(Error::NoMatch(format!(
            "no convergence after {} iterations",
            alignment.iterations
        )));
    }

    let fitness = fitness_score(moving, fixed, &alignment.transform, cfg)
        .ok_or_else(|| Error::NoMatch("aligned clouds do not overlap".into()))?;
    if fitness > cfg.max_fitness_score {
        return Err(Error::NoMatch(format!(
            "fitness score {fitness} above threshold {}",
            cfg.max_fitness_score
        )));
    }

    Ok(alignment.transform.cast::<f64>())
}

/// Mean squared distance between transformed moving points and their
/// nearest fixed points, over inliers within the correspondence distance.
///
/// `None` when not a single pair falls inside the distance bound.
fn fitness_score(
    moving: &PointCloud3D,
    fixed: &PointCloud3D,
    transform: &Isometry3<f32>,
    cfg: &RegistrationConfig,
) -> Option<f32> {
    let mut tree: KdTree<f32, 3> = KdTree::new();
    for (i, p) in fixed.points.iter().enumerate() {
        tree.add(&p.to_array(), i as u64);
    }

    let max_dist_sq = cfg.max_correspondence_distance * cfg.max_correspondence_distance;
    let mut sum_sq = 0.0f32;
    let mut inliers = 0usize;

    for p in &moving.points {
        let tp = transform * nalgebra::Point3::new(p.x, p.y, p.z);
        let nearest = tree.nearest_one::<SquaredEuclidean>(&[tp.x, tp.y, tp.z]);
        if nearest.distance <= max_dist_sq {
            sum_sq += nearest.distance;
            inliers += 1;
        }
    }

    (inliers > 0).then(|| sum_sq / inliers as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point3D;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Randomly sampled points on the four walls of a box. The jitter
    /// keeps the kd-tree away from degenerate input, and the 2D spread on
    /// each wall gives the surface covariances proper planar support.
    fn box_cloud(seed: u64) -> PointCloud3D {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cloud = PointCloud3D::new();
        for _ in 0..200 {
            let x = rng.gen_range(0.0..4.0f32);
            let y = rng.gen_range(0.0..3.0f32);
            let za = rng.gen_range(0.0..2.0f32);
            let zb = rng.gen_range(0.0..2.0f32);
            let mut j = || rng.gen_range(-0.01..0.01f32);
            cloud.push(Point3D::new(x, 0.0 + j(), za));
            cloud.push(Point3D::new(x, 3.0 + j(), zb));
            cloud.push(Point3D::new(0.0 + j(), y, za));
            cloud.push(Point3D::new(4.0 + j(), y, zb));
        }
        cloud
    }

    fn test_config(algorithm: Algorithm) -> RegistrationConfig {
        RegistrationConfig {
            algorithm,
            point_cloud_density: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_too_few_points() {
        let sparse = PointCloud3D::from_points(vec![Point3D::new(0.0, 0.0, 0.0); 10]);
        let result = align(
            &sparse,
            &sparse,
            &Transform::identity(),
            &test_config(Algorithm::Gicp),
        );
        assert!(matches!(result, Err(Error::NoMatch(_))));
    }

    #[test]
    fn test_downsampling_can_starve_alignment() {
        // Dense cloud collapses to a handful of voxels at a huge leaf size
        let cloud = box_cloud(7);
        let cfg = RegistrationConfig {
            point_cloud_density: 10.0,
            ..test_config(Algorithm::Gicp)
        };
        let result = align(&cloud, &cloud, &Transform::identity(), &cfg);
        assert!(matches!(result, Err(Error::NoMatch(_))));
    }

    #[test]
    fn test_gicp_recovers_translation() {
        let fixed = box_cloud(1);
        let offset = Transform::translation(0.3, -0.2, 0.1);
        let moving = fixed.transformed(&offset.inverse());

        let result = align(
            &moving,
            &fixed,
            &Transform::identity(),
            &test_config(Algorithm::Gicp),
        )
        .unwrap();

        assert_relative_eq!(result.translation.vector.x, 0.3, epsilon = 0.05);
        assert_relative_eq!(result.translation.vector.y, -0.2, epsilon = 0.05);
        assert_relative_eq!(result.translation.vector.z, 0.1, epsilon = 0.05);
    }

    #[test]
    fn test_gicp_recovers_small_rotation() {
        let fixed = box_cloud(2);
        let offset = Transform::rotation(nalgebra::Vector3::new(0.0, 0.0, 0.05));
        let moving = fixed.transformed(&offset.inverse());

        let result = align(
            &moving,
            &fixed,
            &Transform::identity(),
            &test_config(Algorithm::Gicp),
        )
        .unwrap();

        assert_relative_eq!(result.rotation.angle(), 0.05, epsilon = 0.02);
    }

    #[test]
    fn test_gicp_good_guess_stays_put() {
        let fixed = box_cloud(3);
        let offset = Transform::translation(0.5, 0.0, 0.0);
        let moving = fixed.transformed(&offset.inverse());

        let result = align(&moving, &fixed, &offset, &test_config(Algorithm::Gicp)).unwrap();

        assert_relative_eq!(result.translation.vector.x, 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_ndt_recovers_translation() {
        let fixed = box_cloud(4);
        let offset = Transform::translation(0.15, 0.1, 0.0);
        let moving = fixed.transformed(&offset.inverse());

        let cfg = RegistrationConfig {
            resolution: 1.0,
            maximum_iterations: 60,
            ..test_config(Algorithm::Ndt)
        };
        let result = align(&moving, &fixed, &Transform::identity(), &cfg).unwrap();

        assert_relative_eq!(result.translation.vector.x, 0.15, epsilon = 0.08);
        assert_relative_eq!(result.translation.vector.y, 0.1, epsilon = 0.08);
    }

    #[test]
    fn test_disjoint_clouds_rejected() {
        let fixed = box_cloud(5);
        let far = fixed.transformed(&Transform::translation(100.0, 0.0, 0.0));

        let result = align(&far, &fixed, &Transform::identity(), &test_config(Algorithm::Gicp));
        assert!(result.is_err());
    }
}
