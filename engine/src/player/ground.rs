//! Ground Movement
//!
//! The walking behaviour the stance extension sits on top of. The extension
//! only needs a handful of hooks from it (floor queries, step-up, impact
//! notification, velocity integration), expressed by [`BaseMovement`]. The
//! ramp, slide and two-wall helpers here are shared by the standard walk
//! path and the prone mover so both respond to surfaces the same way.
//!
//! [`SimpleGroundMovement`] is a compact reference implementation: floor
//! probing by a downward capsule sweep, friction and braking, ramp-following
//! moves and surface sliding. It cannot step up ledges.

use glam::Vec3;

use crate::physics::{
    CapsuleBody, CollisionQuery, HitResult, KINDA_SMALL_NUMBER, UP, move_component,
};
use crate::physics::types::{horizontal, is_nearly_zero, safe_normal_2d};

use super::state::MovementMode;

/// Lower bound of the hover gap kept between capsule and floor.
pub const MIN_FLOOR_DIST: f32 = 1.9;

/// Upper bound of the hover gap kept between capsule and floor.
pub const MAX_FLOOR_DIST: f32 = 2.4;

/// Tallest ledge the floor probe will follow downwards.
pub const MAX_STEP_HEIGHT: f32 = 45.0;

/// Longest time slice a single sub-step may take.
pub const MAX_SIMULATION_TIME_STEP: f32 = 0.05;

/// How far below the capsule the floor probe sweeps.
const FLOOR_PROBE_DISTANCE: f32 = MAX_FLOOR_DIST + MAX_STEP_HEIGHT;

/// Tolerance for "floor normal is straight up".
const VERTICAL_NORMAL_DELTA: f32 = 1.0e-5;

// ============================================================================
// STATE
// ============================================================================

/// Floor under the capsule, as found by the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FloorResult {
    /// The probe hit something
    pub blocking_hit: bool,
    /// The surface hit is walkable
    pub walkable_floor: bool,
    /// The result came from a line trace rather than a shape sweep
    pub line_trace: bool,
    /// Gap between capsule base and floor
    pub floor_dist: f32,
    /// The probe contact
    pub hit: HitResult,
}

impl FloorResult {
    /// A blocking, walkable floor.
    pub fn is_walkable_floor(&self) -> bool {
        self.blocking_hit && self.walkable_floor
    }
}

/// Floor computed as a side effect of stepping up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepDownResult {
    /// `floor` is valid
    pub computed_floor: bool,
    /// Floor found after the step
    pub floor: FloorResult,
}

/// Mutable kinematic state that every locomotion handler works on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicState {
    /// Primary collision capsule
    pub body: CapsuleBody,
    /// Current velocity
    pub velocity: Vec3,
    /// Requested acceleration for this tick
    pub acceleration: Vec3,
    /// Last known floor
    pub floor: FloorResult,
    /// Physics mode
    pub mode: MovementMode,
    /// The capsule was moved by something other than velocity this step
    pub just_teleported: bool,
}

impl KinematicState {
    /// Walking at rest on an unknown floor.
    pub fn new(body: CapsuleBody) -> Self {
        Self {
            body,
            velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            floor: FloorResult::default(),
            mode: MovementMode::Walking,
            just_teleported: false,
        }
    }

    /// Walking mode.
    pub fn is_moving_on_ground(&self) -> bool {
        self.mode.is_moving_on_ground()
    }
}

/// Per-tick limits for ground movement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkParams {
    pub max_speed: f32,
    pub max_acceleration: f32,
    pub ground_friction: f32,
    pub braking_deceleration: f32,
    pub max_iterations: u32,
    pub min_tick_time: f32,
    pub walkable_floor_y: f32,
}

// ============================================================================
// SURFACE HELPERS
// ============================================================================

/// Valid blocking contact with a surface flat enough to stand on.
pub fn is_walkable(hit: &HitResult, walkable_floor_y: f32) -> bool {
    if !hit.is_valid_blocking_hit() {
        return false;
    }
    hit.impact_normal.y >= KINDA_SMALL_NUMBER && hit.impact_normal.y >= walkable_floor_y
}

/// Re-aims a horizontal move along a walkable ramp, keeping its horizontal
/// component unchanged.
pub fn compute_ground_movement_delta(
    delta: Vec3,
    ramp_hit: &HitResult,
    line_trace: bool,
    walkable_floor_y: f32,
) -> Vec3 {
    let floor_normal = ramp_hit.impact_normal;
    let contact_normal = ramp_hit.normal;

    if floor_normal.y < 1.0 - KINDA_SMALL_NUMBER
        && floor_normal.y > KINDA_SMALL_NUMBER
        && contact_normal.y > KINDA_SMALL_NUMBER
        && !line_trace
        && is_walkable(ramp_hit, walkable_floor_y)
    {
        let floor_dot_delta = floor_normal.dot(delta);
        return Vec3::new(delta.x, -floor_dot_delta / floor_normal.y, delta.z);
    }

    delta
}

/// Portion of `delta * time` that lies along the surface with `normal`.
pub fn compute_slide_vector(delta: Vec3, time: f32, normal: Vec3) -> Vec3 {
    (delta - normal * delta.dot(normal)) * time
}

/// Adjusts a slide after it ran into a second surface.
///
/// `ground` is the current floor while walking, which keeps the result from
/// climbing unwalkable surfaces or pushing into the floor.
pub fn two_wall_adjust(
    delta: Vec3,
    hit: &HitResult,
    old_hit_normal: Vec3,
    ground: Option<&FloorResult>,
    walkable_floor_y: f32,
) -> Vec3 {
    let hit_normal = hit.normal;
    let mut adjusted;

    if old_hit_normal.dot(hit_normal) <= 0.0 {
        // 90 degree or sharper corner: move along the crease
        let crease = hit_normal.cross(old_hit_normal).normalize_or_zero();
        adjusted = crease * delta.dot(crease) * (1.0 - hit.time);
        if delta.dot(adjusted) < 0.0 {
            adjusted = -adjusted;
        }
    } else {
        adjusted = compute_slide_vector(delta, 1.0 - hit.time, hit_normal);
        if adjusted.dot(delta) <= 0.0 {
            adjusted = Vec3::ZERO;
        } else if (hit_normal.dot(old_hit_normal) - 1.0).abs() < KINDA_SMALL_NUMBER {
            // Same wall twice: nudge away so the next sweep does not start on it
            adjusted += hit_normal * 0.01;
        }
    }

    if let Some(floor) = ground {
        if adjusted.y > 0.0 {
            let walkable = hit.normal.y >= walkable_floor_y || is_walkable(hit, walkable_floor_y);
            if !(walkable && hit.normal.y > KINDA_SMALL_NUMBER) {
                adjusted.y = 0.0;
            }
        } else if adjusted.y < 0.0 && floor.blocking_hit && floor.floor_dist < MIN_FLOOR_DIST {
            adjusted.y = 0.0;
        }
    }

    adjusted
}

/// Slide normal used while grounded.
///
/// Upward normals of unwalkable surfaces are flattened so the character is not
/// pushed up them. Downward normals close to the floor are flattened (or
/// replaced by an opposing floor normal) so the character is not pushed into
/// the floor.
pub fn constrain_slide_normal(
    normal: Vec3,
    hit: &HitResult,
    grounded: bool,
    floor: &FloorResult,
    delta: Vec3,
    walkable_floor_y: f32,
) -> Vec3 {
    if !grounded {
        return normal;
    }

    if normal.y > 0.0 {
        if !is_walkable(hit, walkable_floor_y) {
            return safe_normal_2d(normal);
        }
    } else if normal.y < -KINDA_SMALL_NUMBER && floor.floor_dist < MIN_FLOOR_DIST && floor.blocking_hit {
        let floor_normal = floor.hit.normal;
        let floor_opposed = delta.dot(floor_normal) < 0.0 && floor_normal.y < 1.0 - VERTICAL_NORMAL_DELTA;
        let chosen = if floor_opposed { floor_normal } else { normal };
        return safe_normal_2d(chosen);
    }

    normal
}

/// Length of the next sub-step.
pub fn simulation_time_step(remaining: f32, iterations: u32, params: &WalkParams) -> f32 {
    let mut step = remaining;
    if step > MAX_SIMULATION_TIME_STEP && iterations < params.max_iterations {
        step = MAX_SIMULATION_TIME_STEP.min(step * 0.5);
    }
    step.max(params.min_tick_time)
}

/// Integrates horizontal velocity with friction, braking and the speed cap.
pub fn calc_velocity(velocity: Vec3, acceleration: Vec3, dt: f32, params: &WalkParams) -> Vec3 {
    let max_speed = params.max_speed.max(0.0);
    let acceleration = acceleration.clamp_length_max(params.max_acceleration.max(0.0));
    let mut velocity = velocity;

    if acceleration.length_squared() < crate::physics::SMALL_NUMBER {
        let old = velocity;
        let friction = params.ground_friction.max(0.0);
        let braking = params.braking_deceleration.max(0.0);
        let reverse = -friction * velocity - braking * velocity.normalize_or_zero();
        velocity += reverse * dt;
        // Braking never reverses direction
        if velocity.dot(old) <= 0.0 || velocity.length_squared() < KINDA_SMALL_NUMBER {
            velocity = Vec3::ZERO;
        }
    } else {
        // Friction turns velocity towards the acceleration direction
        let direction = acceleration.normalize_or_zero();
        let speed = velocity.length();
        velocity -= (velocity - direction * speed) * (dt * params.ground_friction).min(1.0);
        velocity += acceleration * dt;
    }

    velocity.clamp_length_max(max_speed)
}

// ============================================================================
// BASE MOVEMENT
// ============================================================================

/// Hooks into the underlying character movement loop.
pub trait BaseMovement {
    /// Probe for the floor under `body`.
    fn find_floor(&self, world: &dyn CollisionQuery, body: &CapsuleBody) -> FloorResult;

    /// Whether the blocking `hit` is something the character may step onto.
    fn can_step_up(&self, hit: &HitResult) -> bool {
        hit.is_valid_blocking_hit()
    }

    /// Try to step over the obstacle in `hit`. `None` when the step failed.
    fn step_up(
        &mut self,
        _world: &dyn CollisionQuery,
        _state: &mut KinematicState,
        _delta: Vec3,
        _hit: &HitResult,
    ) -> Option<StepDownResult> {
        None
    }

    /// Notification that a move was blocked.
    fn handle_impact(&mut self, _hit: &HitResult, _time_slice: f32, _move_delta: Vec3) {}

    /// Notification that the character could not get out of geometry.
    fn on_stuck_in_geometry(&mut self, hit: &HitResult) {
        log::debug!("stuck in geometry at {:?}, normal {:?}", hit.location, hit.normal);
    }

    /// Velocity integration for one sub-step.
    fn calc_velocity(&self, velocity: Vec3, acceleration: Vec3, dt: f32, params: &WalkParams) -> Vec3 {
        calc_velocity(velocity, acceleration, dt, params)
    }

    /// Leave the ground.
    fn start_falling(&mut self, state: &mut KinematicState) {
        state.mode = MovementMode::Falling;
    }

    /// Standard walking for one tick.
    fn phys_walking(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        params: &WalkParams,
        dt: f32,
        iterations: u32,
    );
}

/// Reference ground movement without step-up support.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleGroundMovement {
    /// Minimum normal Y component of a walkable surface
    pub walkable_floor_y: f32,
}

impl Default for SimpleGroundMovement {
    fn default() -> Self {
        Self { walkable_floor_y: 0.71 }
    }
}

impl SimpleGroundMovement {
    pub fn new(walkable_floor_y: f32) -> Self {
        Self { walkable_floor_y }
    }

    fn move_along_floor(&mut self, world: &dyn CollisionQuery, state: &mut KinematicState, dt: f32) {
        if !state.floor.is_walkable_floor() {
            return;
        }

        let delta = horizontal(state.velocity) * dt;
        let rotation = state.body.rotation;
        let ramp = compute_ground_movement_delta(delta, &state.floor.hit, state.floor.line_trace, self.walkable_floor_y);
        let (_, mut hit) = move_component(world, &mut state.body, ramp, rotation, true);

        if hit.start_penetrating {
            let adjustment = world.penetration_adjustment(&hit);
            move_component(world, &mut state.body, adjustment, rotation, false);
            state.just_teleported = true;
            let (_, retry) = move_component(world, &mut state.body, ramp, rotation, true);
            if retry.start_penetrating {
                self.on_stuck_in_geometry(&retry);
            }
            return;
        }

        if hit.is_valid_blocking_hit() {
            let mut percent_applied = hit.time;
            if hit.time > 0.0 && hit.normal.y > KINDA_SMALL_NUMBER && is_walkable(&hit, self.walkable_floor_y) {
                let remaining = 1.0 - percent_applied;
                let ramp = compute_ground_movement_delta(delta * remaining, &hit, false, self.walkable_floor_y);
                let (_, second) = move_component(world, &mut state.body, ramp, rotation, true);
                hit = second;
                percent_applied = (percent_applied + hit.time * remaining).clamp(0.0, 1.0);
            }
            if hit.is_valid_blocking_hit() {
                self.handle_impact(&hit, dt, ramp);
                slide_along_surface(world, state, delta, 1.0 - percent_applied, hit.normal, &mut hit, self.walkable_floor_y);
            }
        }
    }
}

/// Keeps the capsule hovering between [`MIN_FLOOR_DIST`] and [`MAX_FLOOR_DIST`].
pub fn adjust_floor_height(world: &dyn CollisionQuery, state: &mut KinematicState) {
    let floor_dist = state.floor.floor_dist;
    if !state.floor.is_walkable_floor() || (MIN_FLOOR_DIST..=MAX_FLOOR_DIST).contains(&floor_dist) {
        return;
    }

    let target = 0.5 * (MIN_FLOOR_DIST + MAX_FLOOR_DIST);
    let before = state.body.location;
    let rotation = state.body.rotation;
    move_component(world, &mut state.body, UP * (target - floor_dist), rotation, true);
    state.floor.floor_dist += (state.body.location - before).dot(UP);
}

/// Two-stage slide of the primary capsule along a blocking surface.
///
/// Returns the fraction of `delta` actually covered.
pub fn slide_along_surface(
    world: &dyn CollisionQuery,
    state: &mut KinematicState,
    delta: Vec3,
    time: f32,
    normal: Vec3,
    hit: &mut HitResult,
    walkable_floor_y: f32,
) -> f32 {
    if !hit.blocking {
        return 0.0;
    }

    let grounded = state.is_moving_on_ground();
    let normal = constrain_slide_normal(normal, hit, grounded, &state.floor, delta, walkable_floor_y);
    let mut slide = compute_slide_vector(delta, time, normal);
    if slide.dot(delta) <= 0.0 {
        return 0.0;
    }

    let rotation = state.body.rotation;
    let (_, first) = move_component(world, &mut state.body, slide, rotation, true);
    *hit = first;
    let first_percent = hit.time;
    let mut percent_applied = first_percent;

    if hit.is_valid_blocking_hit() {
        let ground = grounded.then_some(&state.floor);
        slide = two_wall_adjust(slide, hit, normal, ground, walkable_floor_y);
        if !is_nearly_zero(slide, 1.0e-3) && slide.dot(delta) > 0.0 {
            let (_, second) = move_component(world, &mut state.body, slide, rotation, true);
            *hit = second;
            percent_applied += hit.time * (1.0 - first_percent);
        }
    }

    percent_applied.clamp(0.0, 1.0)
}

impl BaseMovement for SimpleGroundMovement {
    fn find_floor(&self, world: &dyn CollisionQuery, body: &CapsuleBody) -> FloorResult {
        let start = body.location;
        let end = start - UP * FLOOR_PROBE_DISTANCE;
        let hit = world.sweep_single(body.shape(), start, end, body.rotation);

        if !hit.blocking {
            return FloorResult::default();
        }
        if hit.start_penetrating {
            return FloorResult {
                blocking_hit: true,
                walkable_floor: false,
                line_trace: false,
                floor_dist: 0.0,
                hit,
            };
        }

        FloorResult {
            blocking_hit: true,
            walkable_floor: is_walkable(&hit, self.walkable_floor_y),
            line_trace: false,
            floor_dist: hit.time * FLOOR_PROBE_DISTANCE,
            hit,
        }
    }

    fn phys_walking(
        &mut self,
        world: &dyn CollisionQuery,
        state: &mut KinematicState,
        params: &WalkParams,
        dt: f32,
        mut iterations: u32,
    ) {
        if dt < params.min_tick_time {
            return;
        }

        let mut remaining = dt;
        while remaining >= params.min_tick_time && iterations < params.max_iterations {
            iterations += 1;
            state.just_teleported = false;
            let time_tick = simulation_time_step(remaining, iterations, params);
            remaining -= time_tick;

            let old_location = state.body.location;
            state.velocity = horizontal(state.velocity);
            state.acceleration.y = 0.0;
            state.velocity = self.calc_velocity(state.velocity, state.acceleration, time_tick, params);

            let delta = state.velocity * time_tick;
            if is_nearly_zero(delta, KINDA_SMALL_NUMBER) {
                remaining = 0.0;
            } else {
                self.move_along_floor(world, state, time_tick);
            }

            state.floor = self.find_floor(world, &state.body);
            if state.floor.is_walkable_floor() {
                adjust_floor_height(world, state);
            } else if !state.floor.hit.start_penetrating {
                self.start_falling(state);
                return;
            }

            if !state.just_teleported {
                state.velocity = (state.body.location - old_location) / time_tick;
            }

            if state.body.location == old_location {
                break;
            }
        }

        if remaining >= params.min_tick_time && iterations >= params.max_iterations {
            log::trace!("walking sub-step budget spent with {remaining:.4}s left");
        }
        state.velocity = horizontal(state.velocity);
    }
}
