//! Auxiliary Volume Mover (Prone)
//!
//! While prone the character's footprint is a capsule lying along its
//! forward axis, much longer than the upright primary capsule. Every prone
//! move sweeps that [`ProneVolume`] instead of the primary capsule, then
//! drags the primary capsule (without sweeping) to where the volume ended up.
//!
//! The routines mirror the standard walking primitives:
//!
//! | Walking                 | Prone                                      |
//! |-------------------------|--------------------------------------------|
//! | `move_component`        | [`ProneMover::move_volume`]                |
//! | safe move + depenetrate | [`ProneMover::safe_move`]                  |
//! | `slide_along_surface`   | [`ProneMover::slide_along_surface_prone`]  |
//! | `move_along_floor`      | [`ProneMover::move_along_floor_prone`]     |
//! | `phys_walking`          | [`ProneMover::phys_prone`]                 |

use std::f32::consts::FRAC_PI_2;

use glam::{EulerRot, Quat, Vec3};

use crate::physics::{
    CapsuleBody, CapsuleShape, CollisionQuery, HitResult, KINDA_SMALL_NUMBER, UP, horizontal, is_nearly_zero,
    move_component, pull_back_hit, should_ignore_start_penetration, wrap_angle, yaw_rotation,
};

use super::config::{CollisionTolerances, MovementConfig};
use super::ground::{
    BaseMovement, KinematicState, MAX_FLOOR_DIST, StepDownResult, WalkParams, adjust_floor_height,
    compute_ground_movement_delta, compute_slide_vector, constrain_slide_normal, is_walkable, simulation_time_step,
    two_wall_adjust,
};

/// Yaw differences below this (radians) count as already facing the target.
const ANGLE_TOLERANCE: f32 = 1.0e-3_f32 * (std::f32::consts::PI / 180.0);

// ============================================================================
// VOLUME
// ============================================================================

/// Secondary capsule that represents the prone footprint.
///
/// Lies along the primary capsule's forward axis with its front cap at the
/// primary capsule's front and its lowest point at the primary capsule's base.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProneVolume {
    /// Scaled collision shape
    pub shape: CapsuleShape,
    /// World location of the volume centre
    pub location: Vec3,
    /// World rotation
    pub rotation: Quat,
    /// Offset from the primary capsule centre, in its local frame
    pub relative_location: Vec3,
    /// Rotation relative to the primary capsule
    pub relative_rotation: Quat,
}

impl ProneVolume {
    /// Attach a volume sized like `body` at its current size.
    pub fn attach(body: &CapsuleBody) -> Self {
        let mut volume = Self {
            shape: body.shape(),
            location: body.location,
            rotation: body.rotation,
            relative_location: Vec3::ZERO,
            relative_rotation: Quat::from_rotation_z(-FRAC_PI_2),
        };
        volume.follow(body);
        volume
    }

    /// Offset of the volume centre for a primary capsule of `body`'s size.
    pub fn offset_for(&self, body: &CapsuleBody) -> Vec3 {
        let radius = self.shape.radius;
        Vec3::new(radius - self.shape.half_height, radius - body.scaled_half_height(), 0.0)
    }

    /// Snap the volume back to its attachment on `body`.
    pub fn follow(&mut self, body: &CapsuleBody) {
        self.relative_location = self.offset_for(body);
        self.location = body.location + body.rotation * self.relative_location;
        self.rotation = body.rotation * self.relative_rotation;
    }
}

// ============================================================================
// MOVER
// ============================================================================

/// Sweep-and-resolve mover for the prone volume.
#[derive(Debug, Clone, PartialEq)]
pub struct ProneMover {
    volume: ProneVolume,
    tolerances: CollisionTolerances,
    walkable_floor_y: f32,
}

impl ProneMover {
    /// Mover with a volume attached to `body`.
    pub fn new(body: &CapsuleBody, config: &MovementConfig) -> Self {
        Self {
            volume: ProneVolume::attach(body),
            tolerances: config.tolerances,
            walkable_floor_y: config.walkable_floor_y,
        }
    }

    pub fn volume(&self) -> &ProneVolume {
        &self.volume
    }

    pub fn tolerances(&self) -> &CollisionTolerances {
        &self.tolerances
    }

    /// Re-attach after the primary capsule moved or changed size.
    pub fn sync(&mut self, body: &CapsuleBody) {
        self.volume.follow(body);
    }

    /// Sweep the volume along the path the primary capsule would take for
    /// `delta` and `rotation`. Returns the blocking contact, if any.
    ///
    /// Among contacts at time zero the one most opposed to the move wins.
    /// Otherwise the first blocking contact does. Start-penetrating contacts
    /// the move is leaving are skipped unless `never_ignore_overlaps` is set.
    pub fn simulate_volume(
        &self,
        world: &dyn CollisionQuery,
        body: &CapsuleBody,
        delta: Vec3,
        rotation: Quat,
        never_ignore_overlaps: bool,
    ) -> Option<HitResult> {
        let delta_quat = rotation * body.rotation.inverse();
        let new_rotation = delta_quat * self.volume.rotation;
        let trace_start = self.volume.location;
        let orbit = delta_quat * (trace_start - body.location);
        let trace_end = body.location + orbit + delta;

        let mut hits = world.sweep(self.volume.shape, trace_start, trace_end, new_rotation);
        let delta_size = delta.length();
        for hit in &mut hits {
            pull_back_hit(hit, delta_size);
        }

        let direction = delta.normalize_or_zero();
        let mut blocking: Option<(usize, f32)> = None;
        for (index, hit) in hits.iter().enumerate() {
            if !hit.blocking {
                continue;
            }
            if !never_ignore_overlaps
                && should_ignore_start_penetration(hit, direction, self.tolerances.initial_overlap_tolerance)
            {
                continue;
            }
            if hit.time == 0.0 {
                let normal_dot_delta = hit.impact_normal.dot(delta);
                if blocking.is_none_or(|(_, best)| normal_dot_delta < best) {
                    blocking = Some((index, normal_dot_delta));
                }
            } else if blocking.is_none() {
                blocking = Some((index, f32::MAX));
                break;
            }
        }

        if let Some((index, dot)) = blocking {
            log::trace!(
                "prone sweep: {} contacts, blocking on {:?} (normal . delta = {dot:.3})",
                hits.len(),
                hits[index].impact_normal
            );
        }
        blocking.map(|(index, _)| hits[index])
    }

    /// Move the primary capsule by `delta` to `rotation`, sweeping only the
    /// volume. A blocked sweep moves as far as the contact allows and turns
    /// the same fraction of the way. Returns whether the move was unblocked.
    pub fn move_volume(
        &mut self,
        world: &dyn CollisionQuery,
        body: &mut CapsuleBody,
        delta: Vec3,
        rotation: Quat,
        sweep: bool,
        never_ignore_overlaps: bool,
    ) -> (bool, HitResult) {
        let start = body.location;
        let blocking = if sweep {
            self.simulate_volume(world, body, delta, rotation, never_ignore_overlaps)
        } else {
            None
        };

        let (moved, hit, delta, rotation) = match blocking {
            Some(hit) => (false, hit, delta * hit.time, body.rotation.slerp(rotation, hit.time)),
            None => (true, HitResult::no_hit(start, start + delta), delta, rotation),
        };

        move_component(world, body, delta, rotation, false);
        self.volume.follow(body);
        (moved, hit)
    }

    /// Guarded move: when the sweep starts inside geometry, push out along
    /// the penetration adjustment and retry once.
    pub fn safe_move(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        delta: Vec3,
        rotation: Quat,
        sweep: bool,
    ) -> (bool, HitResult) {
        let never_ignore = !self.tolerances.move_ignore_first_blocking_overlap;
        let (mut moved, mut hit) = self.move_volume(world, &mut state.body, delta, rotation, sweep, never_ignore);

        if hit.start_penetrating {
            let adjustment = world.penetration_adjustment(&hit);
            if self.resolve_penetration(world, state, adjustment, &hit, rotation) {
                (moved, hit) = self.move_volume(world, &mut state.body, delta, rotation, sweep, false);
            }
        }

        (moved, hit)
    }

    /// Try to push the volume out of the geometry in `hit`.
    ///
    /// Returns whether this call moved the volume. Any successful adjustment
    /// also marks the step as teleported so velocity is not recomputed from
    /// the displacement; an earlier teleport in the same step is kept.
    pub fn resolve_penetration(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        adjustment: Vec3,
        hit: &HitResult,
        rotation: Quat,
    ) -> bool {
        let resolved = self.resolve_penetration_impl(world, &mut state.body, adjustment, hit, rotation);
        state.just_teleported |= resolved;
        resolved
    }

    fn resolve_penetration_impl(
        &mut self,
        world: &dyn CollisionQuery,
        body: &mut CapsuleBody,
        adjustment: Vec3,
        hit: &HitResult,
        rotation: Quat,
    ) -> bool {
        if adjustment == Vec3::ZERO {
            return false;
        }

        let inflated = self.volume.shape.inflated(self.tolerances.penetration_overlap_check_inflation);
        if !world.overlap_blocking(hit.trace_start + adjustment, self.volume.rotation, inflated) {
            self.move_volume(world, body, adjustment, rotation, false, false);
            log::trace!("prone depenetration: teleport by {adjustment:?}");
            return true;
        }

        let (mut moved, sweep_hit) = self.move_volume(world, body, adjustment, rotation, true, false);
        log::trace!("prone depenetration: sweep by {adjustment:?} (moved = {moved})");

        if !moved && sweep_hit.start_penetrating {
            // Two surfaces: combine both pushes
            let second = world.penetration_adjustment(&sweep_hit);
            let combined = adjustment + second;
            if second != adjustment && combined != Vec3::ZERO {
                moved = self.move_volume(world, body, combined, rotation, true, false).0;
                log::trace!("prone depenetration: combined sweep by {combined:?} (moved = {moved})");
            }
        }

        if !moved {
            let move_delta = hit.trace_end - hit.trace_start;
            if move_delta != Vec3::ZERO {
                let attempt = adjustment + move_delta;
                moved = self.move_volume(world, body, attempt, rotation, true, false).0;
                log::trace!("prone depenetration: sweep by {attempt:?} (moved = {moved})");
            }
        }

        if !moved {
            log::warn!("prone volume stuck in geometry at {:?}", self.volume.location);
        }
        moved
    }

    /// Two-stage slide of the volume along the surface in `hit`.
    ///
    /// Returns the fraction of `delta` actually covered.
    #[allow(clippy::too_many_arguments)]
    pub fn slide_along_surface_prone(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        base: &mut dyn BaseMovement,
        delta: Vec3,
        time: f32,
        normal: Vec3,
        hit: &mut HitResult,
        handle_impact: bool,
    ) -> f32 {
        if !hit.blocking {
            return 0.0;
        }

        let grounded = state.is_moving_on_ground();
        let normal = constrain_slide_normal(normal, hit, grounded, &state.floor, delta, self.walkable_floor_y);
        let mut slide = compute_slide_vector(delta, time, normal);
        if slide.dot(delta) <= 0.0 {
            return 0.0;
        }

        let rotation = state.body.rotation;
        (_, *hit) = self.safe_move(world, state, slide, rotation, true);
        let first_percent = hit.time;
        let mut percent_applied = first_percent;

        if hit.is_valid_blocking_hit() {
            if handle_impact {
                base.handle_impact(hit, first_percent * time, slide);
            }

            let ground = grounded.then_some(&state.floor);
            slide = two_wall_adjust(slide, hit, normal, ground, self.walkable_floor_y);

            if !is_nearly_zero(slide, 1.0e-3) && slide.dot(delta) > 0.0 {
                (_, *hit) = self.safe_move(world, state, slide, rotation, true);
                let second_percent = hit.time * (1.0 - first_percent);
                percent_applied += second_percent;

                if handle_impact && hit.blocking {
                    base.handle_impact(hit, second_percent * time, slide);
                }
            }
        }

        percent_applied.clamp(0.0, 1.0)
    }

    /// Move along the current floor for `dt` at the current velocity.
    ///
    /// Returns the floor found by a successful step-up.
    pub fn move_along_floor_prone(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        base: &mut dyn BaseMovement,
        dt: f32,
    ) -> Option<StepDownResult> {
        if !state.floor.is_walkable_floor() {
            return None;
        }

        let delta = horizontal(state.velocity) * dt;
        let rotation = state.body.rotation;
        let mut ramp = compute_ground_movement_delta(delta, &state.floor.hit, state.floor.line_trace, self.walkable_floor_y);
        let (_, mut hit) = self.safe_move(world, state, ramp, rotation, true);
        let mut last_move_time_slice = dt;

        if hit.start_penetrating {
            // Deflect off it rather than hitch for the rest of the update
            base.handle_impact(&hit, 0.0, Vec3::ZERO);
            let normal = hit.normal;
            self.slide_along_surface_prone(world, state, base, delta, 1.0, normal, &mut hit, true);
            if hit.start_penetrating {
                base.on_stuck_in_geometry(&hit);
            }
            return None;
        }

        if !hit.is_valid_blocking_hit() {
            return None;
        }

        let mut percent_applied = hit.time;
        if hit.time > 0.0 && hit.normal.y > KINDA_SMALL_NUMBER && is_walkable(&hit, self.walkable_floor_y) {
            // Another walkable ramp
            let remaining = 1.0 - percent_applied;
            ramp = compute_ground_movement_delta(delta * remaining, &hit, false, self.walkable_floor_y);
            last_move_time_slice *= remaining;
            (_, hit) = self.safe_move(world, state, ramp, rotation, true);
            percent_applied = (percent_applied + hit.time * remaining).clamp(0.0, 1.0);
        }

        if !hit.is_valid_blocking_hit() {
            return None;
        }

        if base.can_step_up(&hit) {
            if let Some(step) = base.step_up(world, state, delta * (1.0 - percent_applied), &hit) {
                log::trace!("prone step up onto {:?}", hit.impact_normal);
                self.volume.follow(&state.body);
                return Some(step);
            }
            log::trace!("prone step up failed against {:?}", hit.impact_normal);
        }

        base.handle_impact(&hit, last_move_time_slice, ramp);
        let normal = hit.normal;
        self.slide_along_surface_prone(world, state, base, delta, 1.0 - percent_applied, normal, &mut hit, true);
        None
    }

    /// Prone ground movement for one tick, in bounded sub-steps.
    ///
    /// Leaves the state in `MovementMode::Falling` when the floor is
    /// lost; the caller hands the remaining time to the falling physics.
    pub fn phys_prone(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        base: &mut dyn BaseMovement,
        params: &WalkParams,
        dt: f32,
        mut iterations: u32,
    ) {
        if dt < params.min_tick_time {
            return;
        }

        state.just_teleported = false;
        let mut remaining = dt;

        while remaining >= params.min_tick_time && iterations < params.max_iterations {
            iterations += 1;
            state.just_teleported = false;
            let time_tick = simulation_time_step(remaining, iterations, params);
            remaining -= time_tick;

            let old_location = state.body.location;
            state.velocity = horizontal(state.velocity);
            state.acceleration.y = 0.0;
            state.velocity = base.calc_velocity(state.velocity, state.acceleration, time_tick, params);

            let delta = state.velocity * time_tick;
            let zero_delta = is_nearly_zero(delta, KINDA_SMALL_NUMBER);
            let mut step_down = None;

            if zero_delta {
                remaining = 0.0;
            } else {
                step_down = self.move_along_floor_prone(world, state, base, time_tick);
                if !state.is_moving_on_ground() {
                    return;
                }
            }

            state.floor = match step_down {
                Some(step) if step.computed_floor => step.floor,
                _ => base.find_floor(world, &state.body),
            };

            if state.floor.is_walkable_floor() {
                adjust_floor_height(world, state);
                self.volume.follow(&state.body);
            } else if state.floor.hit.start_penetrating && remaining <= 0.0 {
                // The floor probe started inside the floor: pop out upwards
                let mut hit = state.floor.hit;
                hit.trace_end = hit.trace_start + UP * MAX_FLOOR_DIST;
                let adjustment = world.penetration_adjustment(&hit);
                let rotation = state.body.rotation;
                move_component(world, &mut state.body, adjustment, rotation, false);
                self.volume.follow(&state.body);
                state.just_teleported = true;
            }

            if !state.floor.is_walkable_floor() && !state.floor.hit.start_penetrating {
                base.start_falling(state);
                return;
            }

            if state.is_moving_on_ground() && !state.just_teleported && time_tick >= params.min_tick_time {
                state.velocity = (state.body.location - old_location) / time_tick;
            }

            if state.body.location == old_location {
                break;
            }
        }

        if remaining >= params.min_tick_time && iterations >= params.max_iterations {
            log::trace!("prone sub-step budget spent with {remaining:.4}s left");
        }
        if state.is_moving_on_ground() {
            state.velocity = horizontal(state.velocity);
        }
    }

    /// Turn in place to `rotation`, sweeping the volume through the turn.
    ///
    /// Returns the fraction of the turn that was applied.
    pub fn rotate(&mut self, world: &dyn CollisionQuery, state: &mut KinematicState, rotation: Quat) -> f32 {
        let (_, hit) = self.safe_move(world, state, Vec3::ZERO, rotation, true);
        if hit.blocking { hit.time } else { 1.0 }
    }

    /// Turn towards `desired_yaw` (radians) by at most `max_step`.
    ///
    /// Returns the yaw actually reached, which the owner feeds back into its
    /// view rotation so the view does not turn while the body is stuck.
    pub fn physics_rotation(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        desired_yaw: f32,
        max_step: f32,
    ) -> f32 {
        let current_yaw = state.body.rotation.to_euler(EulerRot::YXZ).0;
        let diff = wrap_angle(desired_yaw - current_yaw);
        if diff.abs() <= ANGLE_TOLERANCE {
            return current_yaw;
        }

        let step = diff.clamp(-max_step.abs(), max_step.abs());
        let fraction = self.rotate(world, state, yaw_rotation(current_yaw + step));
        if fraction >= 1.0 {
            return current_yaw + step;
        }
        // Blocked: only turn the view as far as the body got
        let body_yaw = state.body.rotation.to_euler(EulerRot::YXZ).0;
        current_yaw + wrap_angle(body_yaw - current_yaw) * fraction
    }
}
