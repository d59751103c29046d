//! Core data types shared across the crate.

mod cloud;
mod measurement;
mod transform;

pub use cloud::{Point3D, PointCloud3D};
pub use measurement::{
    Measurement, MeasurementInfo, OrientationPrior, PointCloudMeasurement,
};
pub use transform::{scaled_covariance, to_information, Constraint, Covariance6, Transform};
