//! Normal Distributions Transform.
//!
//! The fixed cloud is voxelized into per-cell Gaussians; moving points are
//! scored against the Gaussians of their surrounding cells with the
//! Magnusson outlier mixture, and the pose is refined with damped Newton
//! steps clamped to the configured step size.

use std::collections::HashMap;

use nalgebra::{
    Isometry3, Matrix3, Matrix3x6, Matrix6, Point3, SymmetricEigen, Translation3, UnitQuaternion,
    Vector3, Vector6,
};

use super::{Alignment, RegistrationConfig};
use crate::core::types::PointCloud3D;

/// Cells with fewer points cannot support a covariance estimate.
const MIN_POINTS_PER_CELL: usize = 6;

/// Eigenvalue floor relative to the largest eigenvalue of a cell.
const EIGENVALUE_FLOOR: f32 = 0.01;

/// Damping added to the normal equations before factorization.
const DAMPING: f32 = 1e-6;

/// One voxel Gaussian of the fixed-cloud model.
struct NdtCell {
    mean: Vector3<f32>,
    information: Matrix3<f32>,
}

/// Voxelized Gaussian model of a point cloud.
struct NdtGrid {
    resolution: f32,
    cells: HashMap<(i32, i32, i32), NdtCell>,
}

impl NdtGrid {
    fn build(cloud: &PointCloud3D, resolution: f32) -> Self {
        struct Accumulator {
            sum: Vector3<f64>,
            outer: Matrix3<f64>,
            count: usize,
        }

        let inv_res = 1.0 / resolution;
        let mut accumulators: HashMap<(i32, i32, i32), Accumulator> = HashMap::new();

        for p in &cloud.points {
            let key = (
                (p.x * inv_res).floor() as i32,
                (p.y * inv_res).floor() as i32,
                (p.z * inv_res).floor() as i32,
            );
            let v = Vector3::new(p.x as f64, p.y as f64, p.z as f64);
            let acc = accumulators.entry(key).or_insert(Accumulator {
                sum: Vector3::zeros(),
                outer: Matrix3::zeros(),
                count: 0,
            });
            acc.sum += v;
            acc.outer += v * v.transpose();
            acc.count += 1;
        }

        let mut cells = HashMap::new();
        for (key, acc) in accumulators {
            if acc.count < MIN_POINTS_PER_CELL {
                continue;
            }
            let n = acc.count as f64;
            let mean = acc.sum / n;
            let covariance = (acc.outer - mean * acc.sum.transpose()) / (n - 1.0);
            if let Some(cell) = make_cell(mean.cast::<f32>(), covariance.cast::<f32>()) {
                cells.insert(key, cell);
            }
        }

        Self { resolution, cells }
    }

    fn key_of(&self, p: &Vector3<f32>) -> (i32, i32, i32) {
        let inv_res = 1.0 / self.resolution;
        (
            (p.x * inv_res).floor() as i32,
            (p.y * inv_res).floor() as i32,
            (p.z * inv_res).floor() as i32,
        )
    }

    /// The cells of the 3x3x3 neighborhood around a point.
    fn neighborhood<'a>(&'a self, p: &Vector3<f32>) -> impl Iterator<Item = &'a NdtCell> {
        let (cx, cy, cz) = self.key_of(p);
        (-1..=1).flat_map(move |dx| {
            (-1..=1).flat_map(move |dy| {
                (-1..=1).filter_map(move |dz| self.cells.get(&(cx + dx, cy + dy, cz + dz)))
            })
        })
    }
}

/// Invert a cell covariance with eigenvalue flooring, per Magnusson.
fn make_cell(mean: Vector3<f32>, covariance: Matrix3<f32>) -> Option<NdtCell> {
    let eigen = SymmetricEigen::new(covariance);
    let max_val = eigen.eigenvalues.max();
    if !max_val.is_finite() || max_val <= 0.0 {
        return None;
    }
    let floor = EIGENVALUE_FLOOR * max_val;
    let inv_values = eigen.eigenvalues.map(|v| 1.0 / v.max(floor));
    let information =
        eigen.eigenvectors * Matrix3::from_diagonal(&inv_values) * eigen.eigenvectors.transpose();
    Some(NdtCell { mean, information })
}

pub(super) fn align(
    moving: &PointCloud3D,
    fixed: &PointCloud3D,
    guess: Isometry3<f32>,
    cfg: &RegistrationConfig,
) -> Alignment {
    let grid = NdtGrid::build(fixed, cfg.resolution);
    if grid.cells.is_empty() {
        return Alignment {
            transform: guess,
            converged: false,
            iterations: 0,
        };
    }

    // Magnusson 2009 mixture constants; d1 is negative, the weight below
    // flips it back to a positive IRLS weight.
    let gauss_c1 = 10.0 * (1.0 - cfg.outlier_ratio);
    let gauss_c2 = cfg.outlier_ratio / cfg.resolution.powi(3);
    let gauss_d3 = -gauss_c2.ln();
    let gauss_d1 = -(gauss_c1 + gauss_c2).ln() - gauss_d3;
    let gauss_d2 =
        -2.0 * ((-(gauss_c1 * (-0.5f32).exp() + gauss_c2).ln() - gauss_d3) / gauss_d1).ln();

    let mut estimate = guess;
    let mut converged = false;
    let mut iterations = 0;
    let mut prev_score = f32::INFINITY;

    for _ in 0..cfg.maximum_iterations {
        iterations += 1;

        let mut h = Matrix6::<f32>::zeros();
        let mut g = Vector6::<f32>::zeros();
        let mut score = 0.0f32;
        let mut matched = 0usize;

        for p in &moving.points {
            let tp = estimate * Point3::new(p.x, p.y, p.z);
            for cell in grid.neighborhood(&tp.coords) {
                let residual = tp.coords - cell.mean;
                let mahalanobis = (residual.transpose() * cell.information * residual)[(0, 0)];
                score += -gauss_d1 * (-0.5 * gauss_d2 * mahalanobis).exp();
                let weight = -gauss_d1 * gauss_d2 * (-0.5 * gauss_d2 * mahalanobis).exp();
                if !weight.is_finite() || weight <= 0.0 {
                    continue;
                }

                // Left perturbation of r = T p - mean:
                // dr/dt = I, dr/dw = -[T p]_x
                let mut jac = Matrix3x6::<f32>::zeros();
                jac.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
                jac.fixed_view_mut::<3, 3>(0, 3)
                    .copy_from(&(-tp.coords.cross_matrix()));

                h += weight * jac.transpose() * cell.information * jac;
                g += weight * jac.transpose() * cell.information * residual;
                matched += 1;
            }
        }

        if matched == 0 {
            converged = false;
            break;
        }

        let Some(chol) = (h + Matrix6::identity() * DAMPING).cholesky() else {
            converged = false;
            break;
        };
        let mut step = chol.solve(&-g);

        // Newton step capped at the configured length, in place of a full
        // line search
        let norm = step.norm();
        if norm > cfg.step_size {
            step *= cfg.step_size / norm;
        }

        let delta = Isometry3::from_parts(
            Translation3::from(Vector3::new(step[0], step[1], step[2])),
            UnitQuaternion::from_scaled_axis(Vector3::new(step[3], step[4], step[5])),
        );
        estimate = delta * estimate;

        if norm < cfg.transformation_epsilon {
            converged = true;
            break;
        }
        if (prev_score - score).abs() < cfg.euclidean_fitness_epsilon {
            converged = true;
            break;
        }
        prev_score = score;
    }

    Alignment {
        transform: estimate,
        converged,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point3D;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn block_cloud(n: usize) -> PointCloud3D {
        let mut rng = StdRng::seed_from_u64(11);
        let points = (0..n)
            .map(|_| {
                Point3D::new(
                    rng.gen_range(0.0..2.0),
                    rng.gen_range(0.0..2.0),
                    rng.gen_range(0.0..2.0),
                )
            })
            .collect();
        PointCloud3D::from_points(points)
    }

    #[test]
    fn test_grid_builds_cells() {
        let grid = NdtGrid::build(&block_cloud(400), 1.0);
        assert!(!grid.cells.is_empty());
        assert!(grid.cells.len() <= 8);
    }

    #[test]
    fn test_sparse_cells_are_dropped() {
        // 4 points in one voxel is below the minimum
        let cloud = PointCloud3D::from_points(vec![
            Point3D::new(0.1, 0.1, 0.1),
            Point3D::new(0.2, 0.2, 0.2),
            Point3D::new(0.3, 0.1, 0.2),
            Point3D::new(0.1, 0.3, 0.3),
        ]);
        let grid = NdtGrid::build(&cloud, 1.0);
        assert!(grid.cells.is_empty());
    }

    #[test]
    fn test_cell_information_is_finite() {
        let grid = NdtGrid::build(&block_cloud(400), 1.0);
        for cell in grid.cells.values() {
            assert!(cell.information.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_mixture_constants_positive_weight() {
        let cfg = RegistrationConfig::default();
        let gauss_c1 = 10.0 * (1.0 - cfg.outlier_ratio);
        let gauss_c2 = cfg.outlier_ratio / cfg.resolution.powi(3);
        let gauss_d3 = -gauss_c2.ln();
        let gauss_d1 = -(gauss_c1 + gauss_c2).ln() - gauss_d3;
        let gauss_d2 =
            -2.0 * ((-(gauss_c1 * (-0.5f32).exp() + gauss_c2).ln() - gauss_d3) / gauss_d1).ln();

        assert!(gauss_d1 < 0.0);
        assert!(gauss_d2 > 0.0);
        assert_relative_eq!(gauss_d3, -gauss_c2.ln());
    }
}
