//! Half-space collision world
//!
//! An analytic [`CollisionQuery`] implementation built from infinite planes.
//! Each [`HalfSpace`] is solid on the side opposite its normal, which is
//! enough to describe floors, ceilings, walls, ramps and crawl spaces for
//! deterministic movement tests and tools.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::collision::{CapsuleShape, CollisionQuery, HitResult};
use super::types::UP;

/// Separation below which a shape counts as overlapping a plane.
pub const CONTACT_TOLERANCE: f32 = 0.01;

/// Solid half-space: every point `p` with `normal.dot(p) < offset` is inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HalfSpace {
    /// Unit normal pointing out of the solid
    pub normal: Vec3,
    /// Plane offset along the normal
    pub offset: f32,
}

impl HalfSpace {
    /// Plane through `point` with the given outward normal.
    pub fn new(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            offset: normal.dot(point),
        }
    }

    /// Horizontal floor at `height`.
    pub fn floor(height: f32) -> Self {
        Self::new(UP, UP * height)
    }

    /// Horizontal ceiling at `height`, solid above.
    pub fn ceiling(height: f32) -> Self {
        Self::new(-UP, UP * height)
    }

    /// Signed distance from `point` to the plane (positive outside).
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) - self.offset
    }

    /// Separation between a capsule at `center` and the plane.
    fn separation(&self, center: Vec3, shape: CapsuleShape, rotation: Quat) -> f32 {
        self.distance(center) - shape.support_distance(rotation, self.normal)
    }
}

/// Collection of solid half-spaces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaneWorld {
    planes: Vec<HalfSpace>,
}

impl PlaneWorld {
    /// Empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style plane insertion.
    pub fn with_plane(mut self, plane: HalfSpace) -> Self {
        self.planes.push(plane);
        self
    }

    /// Add a plane.
    pub fn add(&mut self, plane: HalfSpace) {
        self.planes.push(plane);
    }

    /// Remove every plane.
    pub fn clear(&mut self) {
        self.planes.clear();
    }

    /// Planes in insertion order.
    pub fn planes(&self) -> &[HalfSpace] {
        &self.planes
    }
}

impl CollisionQuery for PlaneWorld {
    fn sweep(&self, shape: CapsuleShape, start: Vec3, end: Vec3, rotation: Quat) -> Vec<HitResult> {
        let delta = end - start;
        let length = delta.length();
        let mut hits = Vec::new();

        for plane in &self.planes {
            let start_separation = plane.separation(start, shape, rotation);

            if start_separation < -CONTACT_TOLERANCE {
                hits.push(HitResult {
                    blocking: true,
                    start_penetrating: true,
                    time: 0.0,
                    distance: 0.0,
                    location: start,
                    normal: plane.normal,
                    impact_normal: plane.normal,
                    trace_start: start,
                    trace_end: end,
                    penetration_depth: -start_separation,
                });
                continue;
            }

            let approach = plane.normal.dot(delta);
            if approach >= 0.0 {
                continue;
            }

            let time = start_separation.max(0.0) / -approach;
            if time > 1.0 {
                continue;
            }

            hits.push(HitResult {
                blocking: true,
                start_penetrating: false,
                time,
                distance: length * time,
                location: start + delta * time,
                normal: plane.normal,
                impact_normal: plane.normal,
                trace_start: start,
                trace_end: end,
                penetration_depth: 0.0,
            });
        }

        hits.sort_by(|a, b| a.time.total_cmp(&b.time));
        hits
    }

    fn overlap_blocking(&self, location: Vec3, rotation: Quat, shape: CapsuleShape) -> bool {
        self.planes
            .iter()
            .any(|plane| plane.separation(location, shape, rotation) < -CONTACT_TOLERANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upright() -> CapsuleShape {
        CapsuleShape::new(34.0, 88.0)
    }

    #[test]
    fn test_sweep_down_hits_floor() {
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let hits = world.sweep(upright(), Vec3::new(0.0, 100.0, 0.0), Vec3::new(0.0, 50.0, 0.0), Quat::IDENTITY);
        assert_eq!(hits.len(), 1);
        assert!(!hits[0].start_penetrating);
        // contact when centre reaches 88: 12 of 50 units
        assert!((hits[0].time - 0.24).abs() < 1e-5);
        assert_eq!(hits[0].impact_normal, Vec3::Y);
    }

    #[test]
    fn test_sweep_away_from_floor_is_clear() {
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let hits = world.sweep(upright(), Vec3::new(0.0, 88.0, 0.0), Vec3::new(0.0, 120.0, 0.0), Quat::IDENTITY);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_start_penetrating_reports_depth() {
        let world = PlaneWorld::new().with_plane(HalfSpace::ceiling(150.0));
        let hits = world.sweep(upright(), Vec3::new(0.0, 88.0, 0.0), Vec3::new(10.0, 88.0, 0.0), Quat::IDENTITY);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].start_penetrating);
        assert!((hits[0].penetration_depth - 26.0).abs() < 1e-4);
        assert_eq!(hits[0].normal, -Vec3::Y);
    }

    #[test]
    fn test_overlap_respects_tolerance() {
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        assert!(!world.overlap_blocking(Vec3::new(0.0, 88.0, 0.0), Quat::IDENTITY, upright()));
        assert!(!world.overlap_blocking(Vec3::new(0.0, 88.0, 0.0), Quat::IDENTITY, upright().inflated(0.001)));
        assert!(world.overlap_blocking(Vec3::new(0.0, 80.0, 0.0), Quat::IDENTITY, upright()));
    }

    #[test]
    fn test_hits_sorted_by_time() {
        let world = PlaneWorld::new()
            .with_plane(HalfSpace::new(-Vec3::X, Vec3::new(200.0, 0.0, 0.0)))
            .with_plane(HalfSpace::new(-Vec3::X, Vec3::new(100.0, 0.0, 0.0)));
        let hits = world.sweep(upright(), Vec3::new(0.0, 88.0, 0.0), Vec3::new(300.0, 88.0, 0.0), Quat::IDENTITY);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].time < hits[1].time);
    }
}
