//! Measurement types attached to pose-graph vertices.
//!
//! A measurement is a tagged variant over the known sensor payloads, with
//! shared metadata (unique id, robot, sensor, mounting pose, timestamp).
//! Sensor-specific routines pattern-match on the tag through typed
//! accessors instead of downcasting.

use std::sync::Arc;

use nalgebra::UnitQuaternion;
use uuid::Uuid;

use crate::core::types::{PointCloud3D, Transform};
use crate::error::{Error, Result};

/// Metadata shared by every measurement kind.
#[derive(Debug, Clone)]
pub struct MeasurementInfo {
    /// Unique id, assigned at construction and never reused.
    pub uuid: Uuid,

    /// Name of the robot that produced the measurement.
    pub robot_name: String,

    /// Name of the sensor that produced the measurement.
    pub sensor_name: String,

    /// Fixed transform from the robot frame to the sensor frame.
    pub sensor_pose: Transform,

    /// Acquisition time in microseconds.
    pub timestamp_us: u64,
}

impl MeasurementInfo {
    /// Create metadata with a freshly assigned unique id.
    pub fn new(robot_name: &str, sensor_name: &str, sensor_pose: Transform, timestamp_us: u64) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            robot_name: robot_name.to_owned(),
            sensor_name: sensor_name.to_owned(),
            sensor_pose,
            timestamp_us,
        }
    }
}

/// A dense 3D point cloud in the sensor frame.
#[derive(Debug, Clone)]
pub struct PointCloudMeasurement {
    pub info: MeasurementInfo,

    /// The captured points. Shared-immutable: accessors hand out the same
    /// buffer, downstream transformations allocate fresh ones.
    pub cloud: Arc<PointCloud3D>,
}

impl PointCloudMeasurement {
    /// Create a point-cloud measurement with a fresh unique id.
    pub fn new(
        cloud: PointCloud3D,
        robot_name: &str,
        sensor_name: &str,
        sensor_pose: Transform,
        timestamp_us: u64,
    ) -> Self {
        Self {
            info: MeasurementInfo::new(robot_name, sensor_name, sensor_pose, timestamp_us),
            cloud: Arc::new(cloud),
        }
    }
}

/// An absolute orientation prior, e.g. from an IMU gravity estimate.
#[derive(Debug, Clone)]
pub struct OrientationPrior {
    pub info: MeasurementInfo,

    /// Orientation of the sensor frame in the map frame.
    pub orientation: UnitQuaternion<f64>,
}

impl OrientationPrior {
    /// Create an orientation prior with a fresh unique id.
    pub fn new(
        orientation: UnitQuaternion<f64>,
        robot_name: &str,
        sensor_name: &str,
        sensor_pose: Transform,
        timestamp_us: u64,
    ) -> Self {
        Self {
            info: MeasurementInfo::new(robot_name, sensor_name, sensor_pose, timestamp_us),
            orientation,
        }
    }
}

/// A sensor measurement attached to a pose-graph vertex.
#[derive(Debug, Clone)]
pub enum Measurement {
    /// A single captured point cloud.
    PointCloud(PointCloudMeasurement),

    /// An absolute orientation prior.
    OrientationPrior(OrientationPrior),

    /// A cloud accumulated from several vertices (a map patch).
    CombinedCloud(PointCloudMeasurement),
}

impl Measurement {
    /// Shared metadata of this measurement.
    pub fn info(&self) -> &MeasurementInfo {
        match self {
            Measurement::PointCloud(m) | Measurement::CombinedCloud(m) => &m.info,
            Measurement::OrientationPrior(m) => &m.info,
        }
    }

    /// Kind tag, for logging and error reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::PointCloud(_) => "pointcloud",
            Measurement::OrientationPrior(_) => "orientation_prior",
            Measurement::CombinedCloud(_) => "combined_cloud",
        }
    }

    /// Unique id of this measurement.
    pub fn uuid(&self) -> Uuid {
        self.info().uuid
    }

    /// Name of the producing sensor.
    pub fn sensor_name(&self) -> &str {
        &self.info().sensor_name
    }

    /// Name of the producing robot.
    pub fn robot_name(&self) -> &str {
        &self.info().robot_name
    }

    /// Fixed robot-to-sensor transform.
    pub fn sensor_pose(&self) -> &Transform {
        &self.info().sensor_pose
    }

    /// Acquisition time in microseconds.
    pub fn timestamp_us(&self) -> u64 {
        self.info().timestamp_us
    }

    /// The cloud-bearing payload, or `BadMeasurementType`.
    ///
    /// Accepts both captured and accumulated clouds.
    pub fn as_point_cloud(&self) -> Result<&PointCloudMeasurement> {
        match self {
            Measurement::PointCloud(m) | Measurement::CombinedCloud(m) => Ok(m),
            Measurement::OrientationPrior(_) => Err(Error::BadMeasurementType {
                sensor: self.sensor_name().to_owned(),
                kind: self.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point3D;

    fn cloud_measurement() -> Measurement {
        let cloud = PointCloud3D::from_points(vec![Point3D::new(1.0, 2.0, 3.0)]);
        Measurement::PointCloud(PointCloudMeasurement::new(
            cloud,
            "robot",
            "velodyne",
            Transform::identity(),
            1000,
        ))
    }

    #[test]
    fn test_uuid_unique_per_measurement() {
        let a = cloud_measurement();
        let b = cloud_measurement();
        assert_ne!(a.uuid(), b.uuid());
    }

    #[test]
    fn test_metadata_accessors() {
        let m = cloud_measurement();
        assert_eq!(m.sensor_name(), "velodyne");
        assert_eq!(m.robot_name(), "robot");
        assert_eq!(m.timestamp_us(), 1000);
        assert_eq!(m.kind(), "pointcloud");
    }

    #[test]
    fn test_as_point_cloud_accepts_clouds() {
        let m = cloud_measurement();
        assert!(m.as_point_cloud().is_ok());
    }

    #[test]
    fn test_as_point_cloud_rejects_prior() {
        let m = Measurement::OrientationPrior(OrientationPrior::new(
            UnitQuaternion::identity(),
            "robot",
            "imu",
            Transform::identity(),
            0,
        ));
        assert!(matches!(
            m.as_point_cloud(),
            Err(Error::BadMeasurementType { .. })
        ));
    }

    #[test]
    fn test_clone_keeps_uuid() {
        let m = cloud_measurement();
        let c = m.clone();
        assert_eq!(m.uuid(), c.uuid());
    }
}
