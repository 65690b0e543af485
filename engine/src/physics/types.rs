//! Physics type re-exports from glam
//!
//! This module provides the core mathematical types used throughout
//! the movement system, re-exported from the glam library, together with
//! the axis conventions and tolerances shared by every module.
//!
//! # Conventions
//!
//! - World up is +Y, the horizontal plane is XZ
//! - Actor-local forward is +X
//! - Capsules are modelled along their local +Y axis

pub use glam::{Quat, Vec3};

/// World up axis.
pub const UP: Vec3 = Vec3::Y;

/// Actor-local forward axis.
pub const FORWARD: Vec3 = Vec3::X;

/// Tolerance for "nearly zero" checks on distances and dot products.
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// Tolerance for squared-length checks.
pub const SMALL_NUMBER: f32 = 1.0e-8;

/// Projects a vector onto the horizontal plane without normalizing it.
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Horizontal unit direction of `v`, or zero when `v` has no horizontal extent.
#[inline]
pub fn safe_normal_2d(v: Vec3) -> Vec3 {
    let flat = horizontal(v);
    let len_sq = flat.length_squared();
    if len_sq < SMALL_NUMBER {
        Vec3::ZERO
    } else {
        flat / len_sq.sqrt()
    }
}

/// True when every component of `v` is within `tolerance` of zero.
#[inline]
pub fn is_nearly_zero(v: Vec3, tolerance: f32) -> bool {
    v.x.abs() <= tolerance && v.y.abs() <= tolerance && v.z.abs() <= tolerance
}

/// Rotation about the world up axis.
#[inline]
pub fn yaw_rotation(yaw: f32) -> Quat {
    Quat::from_rotation_y(yaw)
}

/// Wrap an angle in radians to (-PI, PI].
pub fn wrap_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(std::f32::consts::TAU);
    if wrapped > std::f32::consts::PI {
        wrapped - std::f32::consts::TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_normal_2d_drops_vertical() {
        let n = safe_normal_2d(Vec3::new(3.0, 10.0, 4.0));
        assert!((n - Vec3::new(0.6, 0.0, 0.8)).length() < 1e-6);
        assert_eq!(safe_normal_2d(Vec3::new(0.0, 5.0, 0.0)), Vec3::ZERO);
    }

    #[test]
    fn test_yaw_rotation_turns_forward_in_plane() {
        let turned = yaw_rotation(std::f32::consts::FRAC_PI_2) * FORWARD;
        assert!(turned.y.abs() < 1e-6);
        assert!((turned.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wrap_angle() {
        let half_pi = std::f32::consts::FRAC_PI_2;
        assert!((wrap_angle(3.0 * half_pi) + half_pi).abs() < 1e-5);
        assert!((wrap_angle(-0.5) + 0.5).abs() < 1e-6);
    }
}
