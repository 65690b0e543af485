//! Height Transition Engine
//!
//! Drives the character's collision half-height between the standing,
//! crouched and prone targets at a bounded rate without ever pushing the
//! capsule into blocking geometry.
//!
//! # Commit Policies
//!
//! - [`HeightCommitPolicy::Discrete`]: the tracked half-height interpolates on
//!   its own (eye height follows it) and the capsule is resized once. Shrinks
//!   are applied when the transition completes; growth is applied, after an
//!   overlap test, when it starts.
//! - [`HeightCommitPolicy::Continuous`]: the capsule is resized to the
//!   interpolated height every tick. Growth that would overlap leaves the
//!   capsule where it is and retries next tick.
//!
//! # Usage
//!
//! ```rust,ignore
//! use stance_movement::player::{HeightContext, HeightTransitionEngine, MovementConfig};
//!
//! let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
//! // Each tick, with the current collision world and capsule:
//! engine.crouch(&mut ctx, false, delta_time);
//! let eye_height = engine.base_eye_height();
//! ```

use glam::Vec3;

use crate::physics::{CollisionQuery, KINDA_SMALL_NUMBER, SMALL_NUMBER, UP, move_component};

use super::config::{HeightCommitPolicy, MovementConfig};
use super::ground::{KinematicState, MIN_FLOOR_DIST};
use super::state::{MovementIntent, NetRole, Posture, TransitionState};

/// Extra height used by the growth overlap test.
pub const SWEEP_INFLATION: f32 = 1.0e-3;

/// Closest a growing capsule may be lowered towards the floor.
const EXPAND_FLOOR_CLEARANCE: f32 = 1.0e-3;

/// Moves `current` towards `target` by at most `speed * dt`, landing on the
/// target exactly when the remaining distance fits in the step.
pub fn interp_constant_to(current: f32, target: f32, dt: f32, speed: f32) -> f32 {
    let dist = target - current;
    if dist * dist < SMALL_NUMBER || speed <= 0.0 || !speed.is_finite() {
        return target;
    }
    if dt <= 0.0 {
        return current;
    }
    let step = speed * dt;
    if dist.abs() <= step + KINDA_SMALL_NUMBER {
        return target;
    }
    current + dist.clamp(-step, step)
}

/// Callbacks into the character that owns the movement component.
pub trait CharacterOwner {
    /// A lowering transition progressed or completed. Deltas are measured
    /// from the standing half-height.
    fn on_start_crouch(&mut self, _half_height_adjust: f32, _scaled_half_height_adjust: f32) {}

    /// A raising transition progressed or completed. Deltas are measured
    /// from the standing half-height.
    fn on_end_crouch(&mut self, _half_height_adjust: f32, _scaled_half_height_adjust: f32) {}

    /// The collision capsule changed size. Deltas are measured from the
    /// standing half-height.
    fn on_capsule_adjusted(&mut self, _half_height_adjust: f32, _scaled_half_height_adjust: f32) {}

    /// The base eye height changed.
    fn on_eye_height_changed(&mut self, _eye_height: f32) {}
}

/// Owner that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOwner;

impl CharacterOwner for NullOwner {}

/// Everything a height operation touches outside the engine itself.
pub struct HeightContext<'a> {
    pub world: &'a dyn CollisionQuery,
    pub kinematics: &'a mut KinematicState,
    pub intent: &'a mut MovementIntent,
    pub owner: &'a mut dyn CharacterOwner,
    pub role: NetRole,
    /// Crouching is currently allowed (grounded, enabled, ...)
    pub can_crouch_now: bool,
    /// Prone is currently allowed
    pub can_prone_now: bool,
}

impl HeightContext<'_> {
    fn allows(&self, target: Posture) -> bool {
        match target {
            Posture::Standing => true,
            Posture::Crouched => self.can_crouch_now,
            Posture::Prone => self.can_prone_now,
        }
    }
}

/// Owns the tracked half-height and the transition state machine.
#[derive(Debug, Clone)]
pub struct HeightTransitionEngine {
    config: MovementConfig,

    /// Tracked half-height, the value replicated and saved with moves
    current_half_height: f32,

    /// In-progress change, `None` when settled
    transition: TransitionState,

    /// Last settled posture
    posture: Posture,

    /// A replicated transition is waiting to be simulated
    check_crouch: bool,

    /// An observer's capsule was resized from replication
    shrink_proxy_capsule: bool,

    /// Floor must be re-queried after the capsule moved
    force_next_floor_check: bool,

    /// Eye height above the capsule centre
    base_eye_height: f32,

    /// Visual offset of the mesh from the capsule on observers
    mesh_translation_offset: Vec3,
}

impl HeightTransitionEngine {
    /// Standing engine for `config`.
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            config: config.clone(),
            current_half_height: config.standing_half_height,
            transition: TransitionState::None,
            posture: Posture::Standing,
            check_crouch: false,
            shrink_proxy_capsule: false,
            force_next_floor_check: false,
            base_eye_height: config.standing_eye_height,
            mesh_translation_offset: Vec3::ZERO,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn current_half_height(&self) -> f32 {
        self.current_half_height
    }

    pub fn transition(&self) -> TransitionState {
        self.transition
    }

    pub fn posture(&self) -> Posture {
        self.posture
    }

    /// Settled in the crouched posture.
    pub fn is_crouched(&self) -> bool {
        self.posture == Posture::Crouched
    }

    /// Settled in the prone posture.
    pub fn is_prone(&self) -> bool {
        self.posture == Posture::Prone
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition != TransitionState::None
    }

    pub fn check_crouch(&self) -> bool {
        self.check_crouch
    }

    /// Mark a remote transition as pending (or clear it).
    pub fn set_check_crouch(&mut self, pending: bool) {
        self.check_crouch = pending;
    }

    pub fn shrink_proxy_capsule(&self) -> bool {
        self.shrink_proxy_capsule
    }

    /// Read and clear the observer capsule correction flag.
    pub fn take_shrink_proxy_capsule(&mut self) -> bool {
        std::mem::take(&mut self.shrink_proxy_capsule)
    }

    /// Read and clear the floor re-query request.
    pub fn take_force_floor_check(&mut self) -> bool {
        std::mem::take(&mut self.force_next_floor_check)
    }

    pub fn base_eye_height(&self) -> f32 {
        self.base_eye_height
    }

    pub fn mesh_translation_offset(&self) -> Vec3 {
        self.mesh_translation_offset
    }

    pub fn set_mesh_translation_offset(&mut self, offset: Vec3) {
        self.mesh_translation_offset = offset;
    }

    /// Overwrite the tracked state from a saved move or a server correction.
    pub fn restore(&mut self, transition: TransitionState, current_half_height: f32) {
        self.transition = transition;
        self.current_half_height = current_half_height;
        self.base_eye_height = self.config.eye_height_for_half_height(current_half_height);
    }

    /// Overwrite the tracked half-height with a replicated value.
    pub fn set_replicated_half_height(&mut self, half_height: f32) {
        self.current_half_height = half_height;
    }

    /// Overwrite the transition with a replicated value.
    pub fn set_replicated_transition(&mut self, transition: TransitionState) {
        self.transition = transition;
    }

    /// Overwrite the settled posture with a replicated value.
    pub fn set_replicated_posture(&mut self, posture: Posture) {
        self.posture = posture;
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Advance towards the crouched height.
    pub fn crouch(&mut self, ctx: &mut HeightContext<'_>, client_simulation: bool, dt: f32) {
        self.transition_to(Posture::Crouched, ctx, client_simulation, dt);
    }

    /// Advance towards the standing height.
    pub fn uncrouch(&mut self, ctx: &mut HeightContext<'_>, client_simulation: bool, dt: f32) {
        self.transition_to(Posture::Standing, ctx, client_simulation, dt);
    }

    /// Advance towards the prone height.
    pub fn prone(&mut self, ctx: &mut HeightContext<'_>, client_simulation: bool, dt: f32) {
        self.transition_to(Posture::Prone, ctx, client_simulation, dt);
    }

    fn transition_to(
        &mut self,
        target: Posture,
        ctx: &mut HeightContext<'_>,
        client_simulation: bool,
        dt: f32,
    ) {
        if !client_simulation && !ctx.allows(target) {
            return;
        }
        if client_simulation && !self.check_crouch {
            return;
        }

        let target_half_height = self.config.half_height_for(target);
        let body_half_height = ctx.kinematics.body.half_height;

        if self.transition == TransitionState::None
            && self.current_half_height == target_half_height
            && body_half_height == target_half_height
        {
            self.posture = target;
            self.check_crouch = false;
            if target == Posture::Standing {
                ctx.owner.on_end_crouch(0.0, 0.0);
            } else {
                ctx.owner.on_start_crouch(0.0, 0.0);
            }
            return;
        }

        let lowering = if self.current_half_height != target_half_height {
            target_half_height < self.current_half_height
        } else {
            target_half_height < body_half_height
        };

        let desired = TransitionState::towards(target, lowering);
        if self.transition != desired {
            log::debug!(
                "height transition {:?} -> {:?} from {:.2}",
                self.transition,
                desired,
                self.current_half_height
            );
            self.transition = desired;
            if !client_simulation && target != Posture::Standing {
                ctx.intent.wants_to_sprint = false;
            }
        }

        let discrete = self.config.commit_policy == HeightCommitPolicy::Discrete;

        if discrete && lowering && client_simulation && ctx.role == NetRole::SimulatedProxy {
            // Observers keep the full capsule until the shrink is committed
            let radius = ctx.kinematics.body.radius;
            ctx.kinematics.body.set_size(radius, self.config.standing_half_height);
            self.shrink_proxy_capsule = true;
        }

        let radius = ctx.kinematics.body.radius;
        let next = if client_simulation && !discrete {
            self.current_half_height
        } else {
            let rate = self.config.transition_rate(self.transition, self.current_half_height);
            interp_constant_to(self.current_half_height, target_half_height, dt, rate)
        };
        let next = next.max(radius).max(0.0);

        if discrete {
            self.advance_discrete(target, target_half_height, next, lowering, ctx, client_simulation);
        } else {
            self.advance_continuous(target, target_half_height, next, lowering, ctx, client_simulation);
        }
    }

    fn advance_discrete(
        &mut self,
        target: Posture,
        target_half_height: f32,
        next: f32,
        lowering: bool,
        ctx: &mut HeightContext<'_>,
        client_simulation: bool,
    ) {
        if !lowering && ctx.kinematics.body.half_height < target_half_height {
            if !self.expand_capsule(ctx, target_half_height, client_simulation) {
                if !client_simulation {
                    log::warn!(
                        "uncrouch blocked: no room to grow from {:.2} to {:.2}",
                        ctx.kinematics.body.half_height,
                        target_half_height
                    );
                }
                return;
            }
            self.posture = target;
        }

        self.current_half_height = next;
        self.update_eye_height(ctx);

        if next == target_half_height {
            if lowering {
                self.shrink_capsule(ctx, target_half_height, client_simulation);
                self.posture = target;
            }
            self.complete(target, ctx);
        }
    }

    fn advance_continuous(
        &mut self,
        target: Posture,
        target_half_height: f32,
        next: f32,
        lowering: bool,
        ctx: &mut HeightContext<'_>,
        client_simulation: bool,
    ) {
        let body_half_height = ctx.kinematics.body.half_height;
        if next != body_half_height {
            let resized = if next < body_half_height {
                self.shrink_capsule(ctx, next, client_simulation)
            } else {
                self.expand_capsule(ctx, next, client_simulation)
            };
            if !resized {
                log::debug!("height growth blocked at {:.2} (wanted {:.2})", body_half_height, next);
                return;
            }
        }

        self.current_half_height = next;
        self.update_eye_height(ctx);

        let adjust = self.config.standing_half_height - next;
        let scaled = adjust * ctx.kinematics.body.scale;
        if lowering {
            ctx.owner.on_start_crouch(adjust, scaled);
        } else {
            ctx.owner.on_end_crouch(adjust, scaled);
        }

        if next == target_half_height {
            self.posture = target;
            self.transition = TransitionState::None;
            self.check_crouch = false;
            log::debug!("height transition complete at {:.2} ({:?})", next, target);
        }
    }

    fn complete(&mut self, target: Posture, ctx: &mut HeightContext<'_>) {
        self.transition = TransitionState::None;
        self.check_crouch = false;
        let adjust = self.config.standing_half_height - self.current_half_height;
        let scaled = adjust * ctx.kinematics.body.scale;
        if target == Posture::Standing {
            ctx.owner.on_end_crouch(adjust, scaled);
        } else {
            ctx.owner.on_start_crouch(adjust, scaled);
        }
        log::debug!("height transition complete at {:.2} ({:?})", self.current_half_height, target);
    }

    fn update_eye_height(&mut self, ctx: &mut HeightContext<'_>) {
        let eye = self.config.eye_height_for_half_height(self.current_half_height);
        if eye != self.base_eye_height {
            self.base_eye_height = eye;
            ctx.owner.on_eye_height_changed(eye);
        }
    }

    // ------------------------------------------------------------------
    // Capsule resizing
    // ------------------------------------------------------------------

    /// Shrink the capsule to `new_half_height` (unscaled).
    ///
    /// Shrinking always fits. Called with a larger height it logs the misuse
    /// and only applies the growth if the larger capsule fits.
    pub fn shrink_capsule(
        &mut self,
        ctx: &mut HeightContext<'_>,
        new_half_height: f32,
        client_simulation: bool,
    ) -> bool {
        let body = &mut ctx.kinematics.body;
        let scale = body.scale;
        let old_half_height = body.half_height;
        let radius = body.radius;

        body.set_size(radius, new_half_height);
        let scaled_adjust = (old_half_height - body.half_height) * scale;

        if !client_simulation {
            if new_half_height > old_half_height {
                log::error!("shrink_capsule called with a growth target; use expand_capsule");
                let test_location = body.location - UP * scaled_adjust;
                if ctx.world.overlap_blocking(test_location, body.rotation, body.shape()) {
                    body.set_size(radius, old_half_height);
                    return false;
                }
            }

            if self.config.crouch_maintains_base_location {
                let rotation = body.rotation;
                move_component(ctx.world, body, -UP * scaled_adjust, rotation, true);
            }
        }

        self.force_next_floor_check = true;
        self.after_resize(ctx, -scaled_adjust, client_simulation);
        true
    }

    /// Grow the capsule to `new_half_height` (unscaled) if it fits.
    ///
    /// With a base-preserving crouch the capsule is raised by the growth and,
    /// if that overlaps, lowered towards the floor before giving up.
    /// Without it the capsule grows in place, then tries again from the base
    /// found by a short downward sweep. Called with a smaller height it logs
    /// the misuse and resizes anyway.
    pub fn expand_capsule(
        &mut self,
        ctx: &mut HeightContext<'_>,
        new_half_height: f32,
        client_simulation: bool,
    ) -> bool {
        let world = ctx.world;
        let grounded = ctx.kinematics.is_moving_on_ground();
        let floor = ctx.kinematics.floor;
        let body = &mut ctx.kinematics.body;

        let scale = body.scale;
        let current_scaled_half_height = body.scaled_half_height();
        let scaled_adjust = (new_half_height - body.half_height) * scale;
        let pawn_location = body.location;

        if !client_simulation {
            if new_half_height < body.half_height {
                log::error!("expand_capsule called with a shrink target; use shrink_capsule");
            }

            let mut standing_shape = body.shape();
            standing_shape.half_height = current_scaled_half_height + SWEEP_INFLATION + scaled_adjust;
            let rotation = body.rotation;

            let encroached = if !self.config.crouch_maintains_base_location {
                let mut encroached = world.overlap_blocking(pawn_location, rotation, standing_shape);
                if encroached && scaled_adjust > 0.0 {
                    // Sweep a short capsule down to the base and stand up from there
                    let radius = body.scaled_radius();
                    let short_half_height = current_scaled_half_height - radius;
                    let trace_dist = current_scaled_half_height - short_half_height;
                    let mut short_shape = body.shape();
                    short_shape.half_height = short_half_height.max(short_shape.radius);
                    let hit = world.sweep_single(short_shape, pawn_location, pawn_location - UP * trace_dist, rotation);
                    if !hit.start_penetrating {
                        let distance_to_base = hit.time * trace_dist + short_shape.half_height;
                        let new_location = pawn_location
                            - UP * (distance_to_base
                                - standing_shape.half_height
                                - SWEEP_INFLATION
                                - MIN_FLOOR_DIST / 2.0);
                        encroached = world.overlap_blocking(new_location, rotation, standing_shape);
                        if !encroached {
                            move_component(world, body, new_location - pawn_location, rotation, false);
                        }
                    }
                }
                encroached
            } else {
                let mut standing_location =
                    pawn_location + UP * (standing_shape.half_height - current_scaled_half_height);
                let mut encroached = world.overlap_blocking(standing_location, rotation, standing_shape);

                if encroached && grounded && floor.blocking_hit && floor.floor_dist > EXPAND_FLOOR_CLEARANCE {
                    // Something may be just overhead: get closer to the floor
                    standing_location -= UP * (floor.floor_dist - EXPAND_FLOOR_CLEARANCE);
                    encroached = world.overlap_blocking(standing_location, rotation, standing_shape);
                }

                if !encroached {
                    move_component(world, body, standing_location - pawn_location, rotation, false);
                    self.force_next_floor_check = true;
                }
                encroached
            };

            if encroached {
                return false;
            }
        } else {
            self.shrink_proxy_capsule = true;
        }

        let radius = body.radius;
        body.set_size(radius, new_half_height);
        self.after_resize(ctx, scaled_adjust, client_simulation);
        true
    }

    fn after_resize(&mut self, ctx: &mut HeightContext<'_>, scaled_change: f32, client_simulation: bool) {
        let body = &ctx.kinematics.body;
        let adjust = self.config.standing_half_height - body.half_height;
        ctx.owner.on_capsule_adjusted(adjust, adjust * body.scale);

        // Observers must not smooth the jump in mesh position
        if client_simulation && ctx.role == NetRole::SimulatedProxy && self.mesh_translation_offset.y != 0.0 {
            self.mesh_translation_offset.y += scaled_change;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{CapsuleBody, HalfSpace, PlaneWorld};

    const EPSILON: f32 = 0.001;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[derive(Default)]
    struct Recorder {
        start_crouch: Vec<(f32, f32)>,
        end_crouch: Vec<(f32, f32)>,
        adjusted: Vec<(f32, f32)>,
    }

    impl CharacterOwner for Recorder {
        fn on_start_crouch(&mut self, adjust: f32, scaled: f32) {
            self.start_crouch.push((adjust, scaled));
        }
        fn on_end_crouch(&mut self, adjust: f32, scaled: f32) {
            self.end_crouch.push((adjust, scaled));
        }
        fn on_capsule_adjusted(&mut self, adjust: f32, scaled: f32) {
            self.adjusted.push((adjust, scaled));
        }
    }

    fn standing_state() -> KinematicState {
        KinematicState::new(CapsuleBody::new(Vec3::new(0.0, 90.15, 0.0), 34.0, 88.0))
    }

    fn run(
        engine: &mut HeightTransitionEngine,
        world: &PlaneWorld,
        state: &mut KinematicState,
        owner: &mut Recorder,
        f: impl FnOnce(&mut HeightTransitionEngine, &mut HeightContext<'_>),
    ) {
        let mut intent = MovementIntent::default();
        let mut ctx = HeightContext {
            world,
            kinematics: state,
            intent: &mut intent,
            owner,
            role: NetRole::Authority,
            can_crouch_now: true,
            can_prone_now: true,
        };
        f(engine, &mut ctx);
    }

    #[test]
    fn test_interp_constant_to_lands_exactly() {
        let mut h = 88.0;
        for _ in 0..19 {
            h = interp_constant_to(h, 60.0, 0.1, 14.0);
            assert!(h > 60.0);
        }
        h = interp_constant_to(h, 60.0, 0.1, 14.0);
        assert_eq!(h, 60.0);
        assert_eq!(interp_constant_to(70.0, 60.0, 0.0, 14.0), 70.0);
        assert_eq!(interp_constant_to(70.0, 60.0, 0.1, 0.0), 60.0);
    }

    #[test]
    fn test_discrete_crouch_commits_at_completion() {
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = standing_state();
        let mut owner = Recorder::default();

        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.crouch(ctx, false, 1.0));
        assert_eq!(engine.transition(), TransitionState::StandToCrouch);
        assert!(approx_eq(engine.current_half_height(), 74.0));
        assert!(approx_eq(state.body.half_height, 88.0), "capsule untouched mid-transition");
        assert!(approx_eq(engine.base_eye_height(), 57.0));

        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.crouch(ctx, false, 1.0));
        assert_eq!(engine.transition(), TransitionState::None);
        assert!(engine.is_crouched());
        assert_eq!(state.body.half_height, 60.0);
        assert!(approx_eq(state.body.location.y, 62.15), "base stays on the floor");
        assert_eq!(owner.adjusted.len(), 1);
        assert!(approx_eq(owner.adjusted[0].0, 28.0));
        assert_eq!(owner.start_crouch.len(), 1);
    }

    #[test]
    fn test_crouch_rejected_when_environment_forbids() {
        let world = PlaneWorld::new();
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = standing_state();
        let mut intent = MovementIntent::default();
        let mut owner = Recorder::default();
        let mut ctx = HeightContext {
            world: &world,
            kinematics: &mut state,
            intent: &mut intent,
            owner: &mut owner,
            role: NetRole::Authority,
            can_crouch_now: false,
            can_prone_now: false,
        };
        engine.crouch(&mut ctx, false, 0.5);
        engine.prone(&mut ctx, false, 0.5);
        assert_eq!(engine.transition(), TransitionState::None);
        assert_eq!(engine.current_half_height(), 88.0);
    }

    #[test]
    fn test_remote_call_without_pending_transition_is_ignored() {
        let world = PlaneWorld::new();
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = standing_state();
        let mut owner = Recorder::default();
        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.crouch(ctx, true, 0.5));
        assert_eq!(engine.transition(), TransitionState::None);
        assert!(owner.start_crouch.is_empty());
    }

    #[test]
    fn test_crouch_clears_sprint_intent() {
        let world = PlaneWorld::new();
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = standing_state();
        let mut intent = MovementIntent {
            wants_to_sprint: true,
            ..MovementIntent::default()
        };
        let mut owner = Recorder::default();
        let mut ctx = HeightContext {
            world: &world,
            kinematics: &mut state,
            intent: &mut intent,
            owner: &mut owner,
            role: NetRole::Authority,
            can_crouch_now: true,
            can_prone_now: true,
        };
        engine.crouch(&mut ctx, false, 0.1);
        assert!(!intent.wants_to_sprint);
    }

    #[test]
    fn test_discrete_uncrouch_expands_first() {
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = standing_state();
        let mut owner = Recorder::default();
        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.crouch(ctx, false, 2.0));
        assert!(engine.is_crouched());

        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.uncrouch(ctx, false, 1.0));
        assert_eq!(state.body.half_height, 88.0, "growth committed when it starts");
        assert_eq!(engine.transition(), TransitionState::CrouchToStand);
        assert!(approx_eq(engine.current_half_height(), 74.0));
        assert_eq!(engine.posture(), Posture::Standing);

        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.uncrouch(ctx, false, 1.0));
        assert_eq!(engine.transition(), TransitionState::None);
        assert_eq!(engine.current_half_height(), 88.0);
        assert!((state.body.base_height() - 2.15).abs() < 0.01);
    }

    #[test]
    fn test_continuous_resizes_every_tick() {
        let config = MovementConfig {
            commit_policy: HeightCommitPolicy::Continuous,
            ..MovementConfig::default()
        };
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let mut engine = HeightTransitionEngine::new(&config);
        let mut state = standing_state();
        let mut owner = Recorder::default();

        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.crouch(ctx, false, 0.5));
        assert!(approx_eq(state.body.half_height, 81.0));
        assert!(approx_eq(state.body.base_height(), 2.15));
        assert_eq!(owner.start_crouch.len(), 1);
        assert!(approx_eq(owner.start_crouch[0].0, 7.0));
        assert!(!engine.is_crouched());
    }

    #[test]
    fn test_continuous_growth_blocked_by_ceiling() {
        let config = MovementConfig {
            commit_policy: HeightCommitPolicy::Continuous,
            ..MovementConfig::default()
        };
        let world = PlaneWorld::new()
            .with_plane(HalfSpace::floor(0.0))
            .with_plane(HalfSpace::ceiling(125.0));
        let mut engine = HeightTransitionEngine::new(&config);
        let mut state = KinematicState::new(CapsuleBody::new(Vec3::new(0.0, 62.15, 0.0), 34.0, 60.0));
        engine.restore(TransitionState::None, 60.0);
        engine.set_replicated_posture(Posture::Crouched);
        let mut owner = Recorder::default();

        for _ in 0..40 {
            run(&mut engine, &world, &mut state, &mut owner, |e, ctx| e.uncrouch(ctx, false, 0.1));
        }
        // Room for 62.5 at most: base 2.15 + 2 * h <= 125
        assert!(state.body.half_height < 62.5);
        assert!(engine.current_half_height() < 62.5);
        assert!(engine.is_crouched());
        assert_eq!(engine.transition(), TransitionState::CrouchToStand);
    }

    #[test]
    fn test_shrink_with_growth_target_falls_back() {
        let world = PlaneWorld::new().with_plane(HalfSpace::ceiling(130.0));
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = KinematicState::new(CapsuleBody::new(Vec3::new(0.0, 62.0, 0.0), 34.0, 60.0));
        let mut owner = Recorder::default();

        let mut grown = true;
        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| grown = e.shrink_capsule(ctx, 88.0, false));
        assert!(!grown, "larger capsule would hit the ceiling");
        assert_eq!(state.body.half_height, 60.0);

        let open = PlaneWorld::new();
        run(&mut engine, &open, &mut state, &mut owner, |e, ctx| grown = e.shrink_capsule(ctx, 88.0, false));
        assert!(grown);
        assert_eq!(state.body.half_height, 88.0);
    }

    #[test]
    fn test_expand_without_base_location_stands_from_floor() {
        let config = MovementConfig {
            crouch_maintains_base_location: false,
            ..MovementConfig::default()
        };
        let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
        let mut engine = HeightTransitionEngine::new(&config);
        // Crouched capsule resting near the floor: growing in place would dig in
        let mut state = KinematicState::new(CapsuleBody::new(Vec3::new(0.0, 61.0, 0.0), 34.0, 60.0));
        let mut owner = Recorder::default();
        let mut grown = false;
        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| grown = e.expand_capsule(ctx, 88.0, false));
        assert!(grown);
        assert_eq!(state.body.half_height, 88.0);
        assert!(state.body.base_height() >= 0.0);
    }

    #[test]
    fn test_proxy_expand_sets_correction_flag() {
        let world = PlaneWorld::new();
        let mut engine = HeightTransitionEngine::new(&MovementConfig::default());
        let mut state = KinematicState::new(CapsuleBody::new(Vec3::ZERO, 34.0, 60.0));
        let mut owner = Recorder::default();
        let mut grown = false;
        run(&mut engine, &world, &mut state, &mut owner, |e, ctx| grown = e.expand_capsule(ctx, 88.0, true));
        assert!(grown);
        assert!(engine.take_shrink_proxy_capsule());
        assert!(!engine.shrink_proxy_capsule());
    }
}
