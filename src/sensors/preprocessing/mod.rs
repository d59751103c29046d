//! Point-cloud preprocessing filters.
//!
//! - [`VoxelFilter`]: centroid voxel-grid downsampling
//! - [`RadiusOutlierFilter`]: isolated-point removal

mod outlier;
mod voxel_filter;

pub use outlier::RadiusOutlierFilter;
pub use voxel_filter::VoxelFilter;
