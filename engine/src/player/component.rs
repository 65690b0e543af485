//! Character Movement Component
//!
//! [`CharacterMovement`] owns one character's movement state and runs the
//! per-tick pipeline:
//!
//! 1. **Acceleration**: input direction scaled by the current acceleration limit
//! 2. **Resolve**: [`LocomotionResolver`] settles sprint and requests a height change
//! 3. **Height**: [`HeightTransitionEngine`] advances the requested transition
//! 4. **Physics**: the [`MovementModeHandler`](super::modes::MovementModeHandler) for the current mode moves the body
//!
//! Simulated proxies skip all of that. They only replay replicated height
//! transitions through [`CharacterMovement::on_movement_updated`].
//!
//! # Example
//!
//! ```ignore
//! use stance_movement::physics::{HalfSpace, PlaneWorld};
//! use stance_movement::player::{CharacterMovement, MovementConfig, NetRole, NullOwner, TickInput};
//! use glam::Vec3;
//!
//! let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
//! let mut movement = CharacterMovement::new(MovementConfig::default(), Vec3::new(0.0, 90.15, 0.0), NetRole::Authority)?;
//! movement.intent_mut().wants_to_crouch = true;
//!
//! let input = TickInput { move_input: Vec3::X, facing: Vec3::X, ..TickInput::default() };
//! movement.tick(&world, &mut NullOwner, &input, 1.0 / 60.0);
//! ```

use glam::Vec3;

use crate::physics::{CapsuleBody, CollisionQuery};

use super::config::{ConfigError, MovementConfig};
use super::ground::{BaseMovement, KinematicState, SimpleGroundMovement, WalkParams};
use super::height::{CharacterOwner, HeightContext, HeightTransitionEngine};
use super::modes::{ModeContext, select_handler};
use super::prone::ProneMover;
use super::replication::{
    CompressedFlags, ReplicatedField, ReplicatedProperty, ReplicatedState, ReplicatedStateWire, ReplicationCondition,
    ReplicationTarget, SavedMove, SyncEnv, WireError, apply_replicated,
};
use super::resolver::{
    HeightRequest, LocomotionResolver, ResolveInput, ResolveOutcome, max_acceleration, max_speed, sprint_acceleration,
};
use super::state::{MovementIntent, MovementMode, NetRole, Posture, TransitionState};

/// Per-tick input from the owning character.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInput {
    /// Desired movement direction, length up to 1
    pub move_input: Vec3,
    /// Direction the character faces
    pub facing: Vec3,
    /// Jump was pressed this tick
    pub jump_pressed: bool,
    /// Yaw (radians) the body should turn towards
    pub desired_yaw: Option<f32>,
}

/// Movement extension state for one character.
pub struct CharacterMovement {
    config: MovementConfig,
    role: NetRole,
    intent: MovementIntent,
    kinematics: KinematicState,
    engine: HeightTransitionEngine,
    resolver: LocomotionResolver,
    sprinting: bool,
    prone: Option<ProneMover>,
    base: Box<dyn BaseMovement>,
}

impl CharacterMovement {
    /// Standing character centred at `location`, using
    /// [`SimpleGroundMovement`] as the base movement.
    pub fn new(config: MovementConfig, location: Vec3, role: NetRole) -> Result<Self, ConfigError> {
        let base = Box::new(SimpleGroundMovement::new(config.walkable_floor_y));
        Self::with_base(config, location, role, base)
    }

    /// Standing character driven by a custom base movement.
    pub fn with_base(
        config: MovementConfig,
        location: Vec3,
        role: NetRole,
        base: Box<dyn BaseMovement>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let body = CapsuleBody::new(location, config.capsule_radius, config.standing_half_height);
        let prone = config.can_ever_prone.then(|| ProneMover::new(&body, &config));

        Ok(Self {
            engine: HeightTransitionEngine::new(&config),
            resolver: LocomotionResolver::new(&config),
            config,
            role,
            intent: MovementIntent::default(),
            kinematics: KinematicState::new(body),
            sprinting: false,
            prone,
            base,
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &MovementConfig {
        &self.config
    }

    pub fn role(&self) -> NetRole {
        self.role
    }

    pub fn set_role(&mut self, role: NetRole) {
        self.role = role;
    }

    pub fn intent(&self) -> &MovementIntent {
        &self.intent
    }

    pub fn intent_mut(&mut self) -> &mut MovementIntent {
        &mut self.intent
    }

    pub fn kinematics(&self) -> &KinematicState {
        &self.kinematics
    }

    pub fn kinematics_mut(&mut self) -> &mut KinematicState {
        &mut self.kinematics
    }

    pub fn height(&self) -> &HeightTransitionEngine {
        &self.engine
    }

    pub fn is_sprinting(&self) -> bool {
        self.sprinting
    }

    pub fn prone_mover(&self) -> Option<&ProneMover> {
        self.prone.as_ref()
    }

    /// Crouching is allowed in the current physics mode.
    pub fn can_crouch_in_current_state(&self) -> bool {
        self.config.can_crouch && matches!(self.kinematics.mode, MovementMode::Walking | MovementMode::Falling)
    }

    /// Prone is allowed: enabled, grounded and the volume exists.
    pub fn can_prone_in_current_state(&self) -> bool {
        self.config.can_ever_prone && self.kinematics.is_moving_on_ground() && self.prone.is_some()
    }

    /// Top speed for the current sub-mode.
    pub fn max_speed(&self) -> f32 {
        max_speed(&self.config, self.sprinting, self.engine.posture())
    }

    /// Acceleration limit for the current sub-mode and speed.
    pub fn max_acceleration(&self) -> f32 {
        max_acceleration(&self.config, self.sprinting, self.kinematics.velocity.length(), self.max_speed())
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Run one simulation step.
    ///
    /// Simulated proxies only replay pending height transitions.
    pub fn tick(
        &mut self,
        world: &dyn CollisionQuery,
        owner: &mut dyn CharacterOwner,
        input: &TickInput,
        dt: f32,
    ) -> ResolveOutcome {
        if dt <= 0.0 {
            return ResolveOutcome::default();
        }
        if self.role == NetRole::SimulatedProxy {
            self.on_movement_updated(world, owner, dt);
            return ResolveOutcome::default();
        }

        if self.kinematics.is_moving_on_ground() && !self.kinematics.floor.blocking_hit {
            self.kinematics.floor = self.base.find_floor(world, &self.kinematics.body);
        }

        let move_input = input.move_input.clamp_length_max(1.0);
        self.kinematics.acceleration = move_input * self.max_acceleration();

        let can_crouch_now = self.can_crouch_in_current_state();
        let can_prone_now = self.can_prone_in_current_state();
        let outcome = {
            let mut ctx = HeightContext {
                world,
                kinematics: &mut self.kinematics,
                intent: &mut self.intent,
                owner,
                role: self.role,
                can_crouch_now,
                can_prone_now,
            };
            let resolve_input = ResolveInput {
                facing: input.facing,
                jump_pressed: input.jump_pressed,
            };
            self.resolver
                .resolve(&resolve_input, &mut self.sprinting, &mut self.engine, &mut ctx, dt)
        };

        if self.engine.take_force_floor_check() {
            self.kinematics.floor = self.base.find_floor(world, &self.kinematics.body);
        }

        let max_accel = self.max_acceleration();
        self.kinematics.acceleration = if self.sprinting {
            sprint_acceleration(input.facing, max_accel)
        } else {
            move_input * max_accel
        };

        self.simulate(world, input.desired_yaw, dt);
        outcome
    }

    fn walk_params(&self) -> WalkParams {
        WalkParams {
            max_speed: self.max_speed(),
            max_acceleration: self.max_acceleration(),
            ground_friction: self.config.ground_friction,
            braking_deceleration: self.config.braking_deceleration_walking,
            max_iterations: self.config.max_simulation_iterations,
            min_tick_time: self.config.min_tick_time,
            walkable_floor_y: self.config.walkable_floor_y,
        }
    }

    fn simulate(&mut self, world: &dyn CollisionQuery, desired_yaw: Option<f32>, dt: f32) {
        let prone = self.engine.is_prone();
        if !prone {
            if let Some(mover) = self.prone.as_mut() {
                mover.sync(&self.kinematics.body);
            }
        }

        let Some(handler) = select_handler(self.kinematics.mode, prone, self.prone.is_some()) else {
            log::trace!("{:?} is simulated by the base movement loop", self.kinematics.mode);
            return;
        };

        let params = self.walk_params();
        let max_turn = self.config.rotation_rate_yaw.to_radians() * dt;
        let mut ctx = ModeContext {
            world,
            state: &mut self.kinematics,
            base: self.base.as_mut(),
            prone: self.prone.as_mut(),
            params,
        };
        handler.simulate(&mut ctx, dt, 0);
        if let Some(yaw) = desired_yaw {
            handler.physics_rotation(&mut ctx, yaw, max_turn);
        }
    }

    // ------------------------------------------------------------------
    // Prediction
    // ------------------------------------------------------------------

    /// Snapshot for the move about to be sent.
    pub fn save_move(&self) -> SavedMove {
        SavedMove::capture(&self.intent, &self.engine)
    }

    /// Restore `saved` and simulate it again.
    pub fn replay_move(
        &mut self,
        saved: &SavedMove,
        world: &dyn CollisionQuery,
        owner: &mut dyn CharacterOwner,
        input: &TickInput,
        dt: f32,
    ) -> ResolveOutcome {
        saved.restore(&mut self.intent, &mut self.engine);
        self.tick(world, owner, input, dt)
    }

    /// Server side: take sprint and prone intent from a client's flag byte.
    pub fn apply_client_flags(&mut self, flags: CompressedFlags) {
        flags.apply_to(&mut self.intent);
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    /// Apply an authoritative update. Returns the fields that changed.
    pub fn apply_replicated_state(
        &mut self,
        incoming: &ReplicatedState,
        world: &dyn CollisionQuery,
        owner: &mut dyn CharacterOwner,
    ) -> Vec<ReplicatedField> {
        let mut env = SyncEnv { world, owner };
        let role = self.role;
        apply_replicated(self, incoming, role, &mut env)
    }

    /// Decode and apply an authoritative update.
    pub fn apply_replicated_bytes(
        &mut self,
        bytes: &[u8],
        world: &dyn CollisionQuery,
        owner: &mut dyn CharacterOwner,
    ) -> Result<Vec<ReplicatedField>, WireError> {
        let incoming = ReplicatedStateWire::from_bytes(bytes).and_then(|wire| ReplicatedState::from_wire(&wire));
        match incoming {
            Ok(state) => Ok(self.apply_replicated_state(&state, world, owner)),
            Err(err) => {
                log::warn!("dropping replicated movement update: {err}");
                Err(err)
            }
        }
    }

    /// Observer per-tick hook: keep replaying a pending remote transition.
    pub fn on_movement_updated(&mut self, world: &dyn CollisionQuery, owner: &mut dyn CharacterOwner, dt: f32) {
        if self.role != NetRole::SimulatedProxy {
            return;
        }

        if self.engine.check_crouch() {
            let request = if self.intent.wants_to_prone {
                HeightRequest::Prone
            } else if self.intent.wants_to_crouch {
                HeightRequest::Crouch
            } else {
                HeightRequest::Uncrouch
            };
            self.run_remote_transition(world, owner, request, dt);
        }

        let resized = self.engine.take_shrink_proxy_capsule();
        if self.engine.take_force_floor_check() || resized {
            self.kinematics.floor = self.base.find_floor(world, &self.kinematics.body);
        }
        if let Some(mover) = self.prone.as_mut() {
            mover.sync(&self.kinematics.body);
        }
    }

    fn run_remote_transition(
        &mut self,
        world: &dyn CollisionQuery,
        owner: &mut dyn CharacterOwner,
        request: HeightRequest,
        dt: f32,
    ) {
        let mut ctx = HeightContext {
            world,
            kinematics: &mut self.kinematics,
            intent: &mut self.intent,
            owner,
            role: self.role,
            can_crouch_now: true,
            can_prone_now: true,
        };
        match request {
            HeightRequest::Crouch => self.engine.crouch(&mut ctx, true, dt),
            HeightRequest::Uncrouch => self.engine.uncrouch(&mut ctx, true, dt),
            HeightRequest::Prone => self.engine.prone(&mut ctx, true, dt),
        }
    }
}

// ============================================================================
// PROPERTY TABLE
// ============================================================================

/// Replicated half-height changed: replay the transition it belongs to.
fn half_height_changed(movement: &mut CharacterMovement, env: &mut SyncEnv<'_>) {
    let request = match movement.engine.transition() {
        TransitionState::StandToCrouch if !movement.engine.is_crouched() => {
            movement.intent.wants_to_crouch = true;
            HeightRequest::Crouch
        }
        TransitionState::CrouchToStand => {
            movement.intent.wants_to_crouch = false;
            HeightRequest::Uncrouch
        }
        TransitionState::ToProne => {
            movement.intent.wants_to_prone = true;
            HeightRequest::Prone
        }
        TransitionState::ProneToCrouch => {
            movement.intent.wants_to_prone = false;
            movement.intent.wants_to_crouch = true;
            HeightRequest::Crouch
        }
        _ => {
            // Settled on the server; finish locally on the next update
            movement.engine.set_check_crouch(true);
            return;
        }
    };
    movement.engine.set_check_crouch(true);
    movement.run_remote_transition(env.world, &mut *env.owner, request, 0.0);
}

/// Replicated crouched or prone flag changed.
fn posture_flag_changed(movement: &mut CharacterMovement, _env: &mut SyncEnv<'_>) {
    movement.engine.set_check_crouch(true);
}

static PROPERTY_TABLE: [ReplicatedProperty<CharacterMovement>; 5] = [
    ReplicatedProperty {
        field: ReplicatedField::Sprinting,
        condition: ReplicationCondition::SimulatedOnly,
        on_change: None,
    },
    ReplicatedProperty {
        field: ReplicatedField::Transition,
        condition: ReplicationCondition::SimulatedOnly,
        on_change: None,
    },
    ReplicatedProperty {
        field: ReplicatedField::CurrentHalfHeight,
        condition: ReplicationCondition::SimulatedOnly,
        on_change: Some(half_height_changed),
    },
    ReplicatedProperty {
        field: ReplicatedField::Prone,
        condition: ReplicationCondition::SimulatedOnly,
        on_change: Some(posture_flag_changed),
    },
    ReplicatedProperty {
        field: ReplicatedField::Crouched,
        condition: ReplicationCondition::SimulatedOnly,
        on_change: Some(posture_flag_changed),
    },
];

impl ReplicationTarget for CharacterMovement {
    fn replicated_state(&self) -> ReplicatedState {
        ReplicatedState {
            sprinting: self.sprinting,
            transition: self.engine.transition(),
            current_half_height: self.engine.current_half_height(),
            prone: self.engine.is_prone(),
            crouched: self.engine.posture() == Posture::Crouched,
        }
    }

    /// Posture flags land in the intent; the settled posture follows once
    /// the replayed transition completes.
    fn write_field(&mut self, field: ReplicatedField, incoming: &ReplicatedState) {
        match field {
            ReplicatedField::Sprinting => self.sprinting = incoming.sprinting,
            ReplicatedField::Transition => self.engine.set_replicated_transition(incoming.transition),
            ReplicatedField::CurrentHalfHeight => self.engine.set_replicated_half_height(incoming.current_half_height),
            ReplicatedField::Prone => self.intent.wants_to_prone = incoming.prone,
            ReplicatedField::Crouched => self.intent.wants_to_crouch = incoming.crouched,
        }
    }

    fn property_table(&self) -> &'static [ReplicatedProperty<Self>] {
        &PROPERTY_TABLE
    }
}
