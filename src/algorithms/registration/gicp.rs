//! Generalized Iterative Closest Point (plane-to-plane metric).
//!
//! Each point carries a covariance estimated from its local neighborhood,
//! flattened along the surface normal. The outer loop recomputes nearest
//! neighbor correspondences; the inner Gauss-Newton loop minimizes the
//! Mahalanobis distance of the residuals under the combined covariance of
//! each pair.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{
    Isometry3, Matrix3, Matrix3x6, Matrix6, Point3, SymmetricEigen, Translation3, UnitQuaternion,
    Vector3, Vector6,
};

use super::{Alignment, RegistrationConfig};
use crate::core::types::{Point3D, PointCloud3D};

/// Smallest eigenvalue of a regularized surface covariance. Keeps the
/// plane-to-plane metric well conditioned on flat patches.
const PLANE_EPSILON: f32 = 1e-3;

/// Fewer correspondences than this cannot constrain 6 degrees of freedom.
const MIN_CORRESPONDENCES: usize = 10;

/// Damping added to the normal equations before factorization.
const DAMPING: f32 = 1e-6;

fn build_tree(points: &[Point3D]) -> KdTree<f32, 3> {
    let mut tree: KdTree<f32, 3> = KdTree::new();
    for (i, p) in points.iter().enumerate() {
        tree.add(&p.to_array(), i as u64);
    }
    tree
}

/// Replace the eigenvalues of a neighborhood scatter matrix with
/// `(1, 1, PLANE_EPSILON)`, flattening along the estimated surface normal.
fn regularize(scatter: Matrix3<f32>) -> Matrix3<f32> {
    let eigen = SymmetricEigen::new(scatter);
    let mut min_idx = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let mut values = Vector3::from_element(1.0f32);
    values[min_idx] = PLANE_EPSILON;
    eigen.eigenvectors * Matrix3::from_diagonal(&values) * eigen.eigenvectors.transpose()
}

/// Per-point surface covariances from the `k` nearest neighbors.
fn surface_covariances(cloud: &PointCloud3D, tree: &KdTree<f32, 3>, k: usize) -> Vec<Matrix3<f32>> {
    let k = k.max(4).min(cloud.len());
    cloud
        .points
        .iter()
        .map(|p| {
            let neighbors = tree.nearest_n::<SquaredEuclidean>(&p.to_array(), k);
            let n = neighbors.len() as f32;

            let mut mean = Vector3::zeros();
            for nb in &neighbors {
                let q = &cloud.points[nb.item as usize];
                mean += Vector3::new(q.x, q.y, q.z);
            }
            mean /= n;

            let mut scatter = Matrix3::zeros();
            for nb in &neighbors {
                let q = &cloud.points[nb.item as usize];
                let d = Vector3::new(q.x, q.y, q.z) - mean;
                scatter += d * d.transpose();
            }
            regularize(scatter / n)
        })
        .collect()
}

pub(super) fn align(
    moving: &PointCloud3D,
    fixed: &PointCloud3D,
    guess: Isometry3<f32>,
    cfg: &RegistrationConfig,
) -> Alignment {
    let fixed_tree = build_tree(&fixed.points);
    let moving_tree = build_tree(&moving.points);
    let moving_covs = surface_covariances(moving, &moving_tree, cfg.correspondence_randomness);
    let fixed_covs = surface_covariances(fixed, &fixed_tree, cfg.correspondence_randomness);

    let max_dist_sq = cfg.max_correspondence_distance * cfg.max_correspondence_distance;
    let mut estimate = guess;
    let mut converged = false;
    let mut iterations = 0;
    let mut prev_mse = f32::INFINITY;

    for _ in 0..cfg.maximum_iterations {
        iterations += 1;

        // Correspondences under the current estimate
        let mut pairs = Vec::with_capacity(moving.len());
        let mut sum_sq = 0.0f32;
        for (i, p) in moving.points.iter().enumerate() {
            let tp = estimate * Point3::new(p.x, p.y, p.z);
            let nearest = fixed_tree.nearest_one::<SquaredEuclidean>(&[tp.x, tp.y, tp.z]);
            if nearest.distance <= max_dist_sq {
                pairs.push((i, nearest.item as usize));
                sum_sq += nearest.distance;
            }
        }
        if pairs.len() < MIN_CORRESPONDENCES {
            converged = false;
            break;
        }
        let mse = sum_sq / pairs.len() as f32;

        // Inner Gauss-Newton on the fixed correspondence set
        let previous = estimate;
        for _ in 0..cfg.maximum_optimizer_iterations {
            let rot = *estimate.rotation.to_rotation_matrix().matrix();
            let mut h = Matrix6::<f32>::zeros();
            let mut g = Vector6::<f32>::zeros();

            for &(i, j) in &pairs {
                let p = &moving.points[i];
                let q = &fixed.points[j];
                let tp = estimate * Point3::new(p.x, p.y, p.z);
                let residual = Vector3::new(q.x - tp.x, q.y - tp.y, q.z - tp.z);

                let combined = fixed_covs[j] + rot * moving_covs[i] * rot.transpose();
                let weight = combined.try_inverse().unwrap_or_else(Matrix3::identity);

                // Left perturbation T' = exp([t, w]) T of the residual
                // r = q - T p: dr/dt = -I, dr/dw = [T p]_x
                let mut jac = Matrix3x6::<f32>::zeros();
                jac.fixed_view_mut::<3, 3>(0, 0)
                    .copy_from(&(-Matrix3::identity()));
                jac.fixed_view_mut::<3, 3>(0, 3)
                    .copy_from(&tp.coords.cross_matrix());

                h += jac.transpose() * weight * jac;
                g += jac.transpose() * weight * residual;
            }

            let Some(chol) = (h + Matrix6::identity() * DAMPING).cholesky() else {
                break;
            };
            let step = chol.solve(&-g);
            let delta = Isometry3::from_parts(
                Translation3::from(Vector3::new(step[0], step[1], step[2])),
                UnitQuaternion::from_scaled_axis(Vector3::new(step[3], step[4], step[5])),
            );
            estimate = delta * estimate;

            if step.norm() < cfg.transformation_epsilon {
                break;
            }
        }

        // Outer convergence on the incremental transform and the residual
        let incremental = previous.inverse() * estimate;
        if incremental.translation.vector.norm() < cfg.transformation_epsilon
            && incremental.rotation.angle() < cfg.rotation_epsilon
        {
            converged = true;
            break;
        }
        if (prev_mse - mse).abs() < cfg.euclidean_fitness_epsilon {
            converged = true;
            break;
        }
        prev_mse = mse;
    }

    Alignment {
        transform: estimate,
        converged,
        iterations,
    }
}
