//! Sensor processing: preprocessing filters and concrete sensors.

pub mod pointcloud;
pub mod preprocessing;

pub use pointcloud::{PointCloudSensor, PointCloudSensorConfig};
