//! Mathematical helpers for SE(3) poses.

use crate::core::types::Transform;

/// Rotation angle of a transform in radians, in `[0, π]`.
#[inline]
pub fn rotation_angle(tf: &Transform) -> f64 {
    tf.rotation.angle()
}

/// Euclidean norm of the translation component in meters.
#[inline]
pub fn translation_norm(tf: &Transform) -> f64 {
    tf.translation.vector.norm()
}

/// Whether a relative transform moves less than the given thresholds in
/// both translation and rotation.
#[inline]
pub fn is_below_motion(tf: &Transform, min_translation: f64, min_rotation: f64) -> bool {
    translation_norm(tf) < min_translation && rotation_angle(tf) < min_rotation
}
