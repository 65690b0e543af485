//! Collision query contract
//!
//! The movement extension never implements narrow-phase collision itself.
//! Everything it needs from the world goes through [`CollisionQuery`]:
//! capsule sweeps that report every contact, blocking overlap tests, and a
//! minimum-translation adjustment for penetrating contacts.
//!
//! # Example
//!
//! ```ignore
//! use stance_movement::physics::{CapsuleBody, PlaneWorld, HalfSpace, move_component};
//! use glam::Vec3;
//!
//! let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
//! let mut body = CapsuleBody::new(Vec3::new(0.0, 88.0, 0.0), 34.0, 88.0);
//!
//! let (moved, hit) = move_component(&world, &mut body, Vec3::new(0.0, -10.0, 0.0), body.rotation, true);
//! assert!(moved && hit.blocking);
//! ```

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::types::{SMALL_NUMBER, UP};

/// Distance added to penetration depth when computing an MTD so the shape
/// ends up slightly clear of the surface.
pub const PENETRATION_PULLBACK: f32 = 0.125;

/// Capsule collision shape.
///
/// `half_height` covers half of the full height including the hemispherical
/// cap, so a valid capsule always has `half_height >= radius`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapsuleShape {
    /// Cap and cylinder radius
    pub radius: f32,
    /// Half of the total height, caps included
    pub half_height: f32,
}

impl CapsuleShape {
    /// Create a capsule, lifting the half-height to the radius if needed.
    pub fn new(radius: f32, half_height: f32) -> Self {
        Self {
            radius,
            half_height: half_height.max(radius),
        }
    }

    /// Grow both dimensions by `amount`.
    pub fn inflated(self, amount: f32) -> Self {
        Self::new(self.radius + amount, self.half_height + amount)
    }

    /// Half-length of the segment joining the two hemisphere centres.
    pub fn segment_half_length(&self) -> f32 {
        (self.half_height - self.radius).max(0.0)
    }

    /// Distance from the centre to the surface along `direction`, for a
    /// capsule whose axis has been rotated by `rotation`.
    pub fn support_distance(&self, rotation: Quat, direction: Vec3) -> f32 {
        let axis = rotation * Vec3::Y;
        self.radius + self.segment_half_length() * axis.dot(direction).abs()
    }
}

/// Result of a sweep or move.
///
/// `time` is the fraction of the attempted motion completed before contact
/// (1.0 when nothing was hit).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HitResult {
    /// Contact blocks movement
    pub blocking: bool,
    /// The shape was already overlapping at the start of the sweep
    pub start_penetrating: bool,
    /// Fraction of the sweep travelled before contact
    pub time: f32,
    /// Distance travelled before contact
    pub distance: f32,
    /// Shape centre at the time of contact
    pub location: Vec3,
    /// Surface normal as seen by the swept shape
    pub normal: Vec3,
    /// Normal of the surface that was hit
    pub impact_normal: Vec3,
    /// Sweep start location
    pub trace_start: Vec3,
    /// Sweep end location
    pub trace_end: Vec3,
    /// Overlap depth when `start_penetrating` is set
    pub penetration_depth: f32,
}

impl HitResult {
    /// An unobstructed sweep from `start` to `end`.
    pub fn no_hit(start: Vec3, end: Vec3) -> Self {
        Self {
            time: 1.0,
            distance: (end - start).length(),
            location: end,
            trace_start: start,
            trace_end: end,
            ..Self::default()
        }
    }

    /// Blocking contact that was not already overlapping.
    pub fn is_valid_blocking_hit(&self) -> bool {
        self.blocking && !self.start_penetrating
    }
}

/// Read-only geometry queries the movement code consumes.
pub trait CollisionQuery {
    /// Sweep `shape` from `start` to `end` at a fixed `rotation`, returning
    /// every contact sorted by time.
    fn sweep(&self, shape: CapsuleShape, start: Vec3, end: Vec3, rotation: Quat) -> Vec<HitResult>;

    /// True when `shape` placed at `location` overlaps blocking geometry.
    fn overlap_blocking(&self, location: Vec3, rotation: Quat, shape: CapsuleShape) -> bool;

    /// Minimum translation that moves a penetrating shape out of the surface
    /// reported by `hit`.
    fn penetration_adjustment(&self, hit: &HitResult) -> Vec3 {
        if !hit.start_penetrating {
            return Vec3::ZERO;
        }
        hit.normal * (hit.penetration_depth + PENETRATION_PULLBACK)
    }

    /// First blocking contact of a sweep, or an unobstructed result.
    fn sweep_single(&self, shape: CapsuleShape, start: Vec3, end: Vec3, rotation: Quat) -> HitResult {
        self.sweep(shape, start, end, rotation)
            .into_iter()
            .find(|hit| hit.blocking)
            .unwrap_or_else(|| HitResult::no_hit(start, end))
    }
}

/// Moves a contact's time back along a sweep of length `dist` so the shape
/// stops just short of the surface.
pub fn pull_back_hit(hit: &mut HitResult, dist: f32) {
    if dist > SMALL_NUMBER.sqrt() {
        let desired_time_back = 0.1_f32.clamp(0.1 / dist, 1.0 / dist) + 0.001;
        hit.time = (hit.time - desired_time_back).clamp(0.0, 1.0);
    }
}

/// True when a start-penetrating contact should be skipped because the move
/// is leaving the surface it overlaps.
pub fn should_ignore_start_penetration(
    hit: &HitResult,
    move_direction: Vec3,
    initial_overlap_tolerance: f32,
) -> bool {
    hit.start_penetrating && move_direction.dot(hit.impact_normal) > initial_overlap_tolerance
}

/// The primary collision capsule of a character.
///
/// `radius` and `half_height` are unscaled; [`CapsuleBody::shape`] applies
/// `scale` for queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapsuleBody {
    /// World location of the capsule centre
    pub location: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Unscaled radius
    pub radius: f32,
    /// Unscaled half-height
    pub half_height: f32,
    /// Uniform component scale
    pub scale: f32,
}

impl CapsuleBody {
    /// Create an unrotated, unscaled capsule.
    pub fn new(location: Vec3, radius: f32, half_height: f32) -> Self {
        Self {
            location,
            rotation: Quat::IDENTITY,
            radius,
            half_height: half_height.max(radius),
            scale: 1.0,
        }
    }

    /// Radius after scale.
    pub fn scaled_radius(&self) -> f32 {
        self.radius * self.scale
    }

    /// Half-height after scale.
    pub fn scaled_half_height(&self) -> f32 {
        self.half_height * self.scale
    }

    /// Scaled collision shape.
    pub fn shape(&self) -> CapsuleShape {
        CapsuleShape::new(self.scaled_radius(), self.scaled_half_height())
    }

    /// Resize the capsule (unscaled values).
    pub fn set_size(&mut self, radius: f32, half_height: f32) {
        self.radius = radius;
        self.half_height = half_height.max(radius);
    }

    /// Lowest point of the capsule along world up.
    pub fn base_height(&self) -> f32 {
        self.location.dot(UP) - self.scaled_half_height()
    }
}

/// Move the primary capsule by `delta`, optionally sweeping.
///
/// A blocking contact stops the capsule at the pulled-back contact time.
/// Start-penetrating contacts the move is leaving are skipped. Returns
/// whether the capsule moved at all, plus the blocking contact if any.
pub fn move_component(
    world: &dyn CollisionQuery,
    body: &mut CapsuleBody,
    delta: Vec3,
    rotation: Quat,
    sweep: bool,
) -> (bool, HitResult) {
    let start = body.location;
    let end = start + delta;

    if !sweep || delta.length_squared() < SMALL_NUMBER {
        body.location = end;
        body.rotation = rotation;
        return (true, HitResult::no_hit(start, end));
    }

    let direction = delta.normalize_or_zero();
    let blocking = world
        .sweep(body.shape(), start, end, rotation)
        .into_iter()
        .filter(|hit| hit.blocking)
        .find(|hit| !should_ignore_start_penetration(hit, direction, 0.0));

    match blocking {
        Some(mut hit) if hit.start_penetrating => {
            hit.time = 0.0;
            (false, hit)
        }
        Some(mut hit) => {
            pull_back_hit(&mut hit, delta.length());
            body.location = start + delta * hit.time;
            body.rotation = rotation;
            (true, hit)
        }
        None => {
            body.location = end;
            body.rotation = rotation;
            (true, HitResult::no_hit(start, end))
        }
    }
}
