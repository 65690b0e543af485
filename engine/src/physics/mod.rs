//! Physics module
//!
//! Geometry the movement extension consumes but does not own.
//!
//! # Unit System
//!
//! Distances are world units. Defaults elsewhere in the crate use the
//! centimetre scale of the game they were tuned for (a standing capsule
//! half-height of 88, radius 34).
//!
//! # Submodules
//!
//! - [`types`] - Core mathematical types (Vec3, Quat) re-exported from glam, axis conventions
//! - [`collision`] - The collision query contract, capsule body and swept move
//! - [`plane_world`] - Analytic half-space world implementing the contract

pub mod collision;
pub mod plane_world;
pub mod types;

// Re-export commonly used types at the physics module level
pub use collision::{
    CapsuleBody, CapsuleShape, CollisionQuery, HitResult, PENETRATION_PULLBACK, move_component,
    pull_back_hit, should_ignore_start_penetration,
};
pub use plane_world::{CONTACT_TOLERANCE, HalfSpace, PlaneWorld};
pub use types::{
    FORWARD, KINDA_SMALL_NUMBER, Quat, SMALL_NUMBER, UP, Vec3, horizontal, is_nearly_zero, safe_normal_2d, wrap_angle,
    yaw_rotation,
};
