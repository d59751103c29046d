//! Point-cloud sensor: registration-backed constraint creation and map
//! assembly.

use serde::{Deserialize, Serialize};

use crate::algorithms::registration::{self, RegistrationConfig};
use crate::core::types::{
    scaled_covariance, Constraint, Measurement, PointCloud3D, PointCloudMeasurement, Transform,
};
use crate::engine::graph::VertexObject;
use crate::engine::traits::Sensor;
use crate::error::Result;
use crate::sensors::preprocessing::{RadiusOutlierFilter, VoxelFilter};

/// Configuration of a point-cloud sensor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointCloudSensorConfig {
    /// Registration parameters for sequential matches and loop refinement.
    pub fine: RegistrationConfig,

    /// Registration parameters for the coarse pass on loop candidates.
    pub coarse: RegistrationConfig,

    /// Scale of the identity covariance attached to accepted constraints.
    pub covariance_scale: f64,

    /// Voxel leaf size of the assembled map (meters).
    pub map_resolution: f32,

    /// Outlier-removal search radius during map assembly (meters).
    pub map_outlier_radius: f32,

    /// Minimum neighbors inside the outlier-removal radius.
    pub map_outlier_neighbors: usize,
}

impl Default for PointCloudSensorConfig {
    fn default() -> Self {
        Self {
            fine: RegistrationConfig::default(),
            coarse: RegistrationConfig::coarse(),
            covariance_scale: 1.0,
            map_resolution: 0.1,
            map_outlier_radius: 0.2,
            map_outlier_neighbors: 2,
        }
    }
}

/// A sensor producing dense 3D point clouds.
pub struct PointCloudSensor {
    name: String,
    sensor_pose: Transform,
    config: PointCloudSensorConfig,
}

impl PointCloudSensor {
    /// Create a sensor with the given name and mounting pose.
    pub fn new(name: &str, sensor_pose: Transform, config: PointCloudSensorConfig) -> Self {
        Self {
            name: name.to_owned(),
            sensor_pose,
            config,
        }
    }

    /// The sensor configuration.
    pub fn config(&self) -> &PointCloudSensorConfig {
        &self.config
    }

    /// Transform each vertex's cloud into the map frame and concatenate.
    ///
    /// Iterates latest-to-oldest so that later voxel filtering keeps the
    /// newest points of a revisited area. Fails with `BadMeasurementType`
    /// when a vertex does not carry a cloud.
    pub fn accumulate(&self, vertices: &[&VertexObject]) -> Result<PointCloud3D> {
        let mut accumulated = PointCloud3D::new();
        for vertex in vertices.iter().rev() {
            let measurement = vertex.measurement.as_point_cloud()?;
            let to_map = vertex.corrected_pose * *vertex.measurement.sensor_pose();
            accumulated.extend_from(&measurement.cloud.transformed(&to_map));
        }
        Ok(accumulated)
    }

    /// Assemble a map from the given vertices: accumulate, remove
    /// isolated points, downsample.
    pub fn build_map(&self, vertices: &[&VertexObject]) -> Result<PointCloud3D> {
        let accumulated = self.accumulate(vertices)?;
        let cleaned = RadiusOutlierFilter::new(
            self.config.map_outlier_radius,
            self.config.map_outlier_neighbors,
        )
        .apply(&accumulated);
        Ok(VoxelFilter::new(self.config.map_resolution).apply(&cleaned))
    }
}

impl Sensor for PointCloudSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn sensor_pose(&self) -> Transform {
        self.sensor_pose
    }

    fn create_constraint(
        &self,
        source: &Measurement,
        target: &Measurement,
        odom_guess: &Transform,
        is_loop: bool,
    ) -> Result<Constraint> {
        let source_cloud = source.as_point_cloud()?;
        let target_cloud = target.as_point_cloud()?;

        let source_pose = *source.sensor_pose();
        let target_pose = *target.sensor_pose();

        // Guess in the sensor frame: where the target cloud sits relative
        // to the source cloud.
        let mut guess = source_pose.inverse() * odom_guess * target_pose;

        // The graph edge goes source -> target, but registration returns
        // the transform that maps its moving input onto its fixed input.
        // Passing the target cloud as the moving input makes the refined
        // transform map source onto target.
        if is_loop {
            guess = registration::align(
                &target_cloud.cloud,
                &source_cloud.cloud,
                &guess,
                &self.config.coarse,
            )?;
        }
        let refined = registration::align(
            &target_cloud.cloud,
            &source_cloud.cloud,
            &guess,
            &self.config.fine,
        )?;

        // Back to the robot frame.
        let transform = source_pose * refined * target_pose.inverse();

        Ok(Constraint {
            transform,
            covariance: scaled_covariance(self.config.covariance_scale),
        })
    }

    fn create_combined_measurement(
        &self,
        vertices: &[&VertexObject],
        pose: &Transform,
    ) -> Result<Measurement> {
        let accumulated = self.accumulate(vertices)?;
        log::debug!("combined cloud has {} points", accumulated.len());
        let shifted = accumulated.transformed(&pose.inverse());
        let timestamp_us = vertices
            .iter()
            .map(|v| v.measurement.timestamp_us())
            .max()
            .unwrap_or(0);
        Ok(Measurement::CombinedCloud(PointCloudMeasurement::new(
            shifted,
            "accumulated",
            &self.name,
            Transform::identity(),
            timestamp_us,
        )))
    }
}
