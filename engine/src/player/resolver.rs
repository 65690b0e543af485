//! Locomotion Mode Resolver
//!
//! Runs once per tick before movement. Reconciles the player's intent with
//! what the character can do right now: starts and stops sprinting, cancels
//! conflicting intent and asks the [`HeightTransitionEngine`] to crouch,
//! stand or go prone.

use glam::Vec3;

use crate::physics::safe_normal_2d;

use super::config::{MovementConfig, SprintAlignment};
use super::height::{HeightContext, HeightTransitionEngine};
use super::state::{Posture, TransitionState};

/// Per-tick input to the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveInput {
    /// Direction the player is looking, only the horizontal part is used
    pub facing: Vec3,
    /// Jump was pressed this tick
    pub jump_pressed: bool,
}

/// Height operation the resolver asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeightRequest {
    Crouch,
    Uncrouch,
    Prone,
}

/// What the resolver decided this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// The pending jump was cancelled to stand up first
    pub jump_suppressed: bool,
    /// Height operation that was run, if any
    pub height_request: Option<HeightRequest>,
}

/// Decides the locomotion sub-mode each tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocomotionResolver {
    pub alignment: SprintAlignment,
    pub can_sprint: bool,
}

impl LocomotionResolver {
    pub fn new(config: &MovementConfig) -> Self {
        Self {
            alignment: config.sprint_alignment,
            can_sprint: config.can_sprint,
        }
    }

    /// Cosine between the horizontal facing and the horizontal acceleration.
    pub fn forward_cosine(facing: Vec3, acceleration: Vec3) -> f32 {
        safe_normal_2d(facing).dot(safe_normal_2d(acceleration))
    }

    /// Acceleration points close enough to the facing direction to sprint.
    pub fn is_moving_forward(&self, facing: Vec3, acceleration: Vec3) -> bool {
        self.alignment.is_aligned(Self::forward_cosine(facing, acceleration))
    }

    /// Update sprint state and intent, then run the height operation the
    /// result calls for.
    pub fn resolve(
        &self,
        input: &ResolveInput,
        sprinting: &mut bool,
        engine: &mut HeightTransitionEngine,
        ctx: &mut HeightContext<'_>,
        dt: f32,
    ) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();
        let transition = engine.transition();
        let lowered = engine.posture() != Posture::Standing;
        let grounded = ctx.kinematics.is_moving_on_ground();

        if input.jump_pressed && (transition != TransitionState::None || lowered) {
            outcome.jump_suppressed = true;
            ctx.intent.wants_to_crouch = false;
            ctx.intent.wants_to_prone = false;
            engine.set_check_crouch(true);
        }

        let forward = self.is_moving_forward(input.facing, ctx.kinematics.acceleration);
        let intent = &mut *ctx.intent;
        if *sprinting
            && (!intent.wants_to_sprint
                || !grounded
                || !forward
                || !self.can_sprint
                || intent.wants_to_crouch
                || intent.wants_to_prone)
        {
            *sprinting = false;
            log::trace!("sprint stopped");
            if intent.wants_to_crouch || intent.wants_to_prone {
                intent.wants_to_sprint = false;
            }
        } else if forward && intent.wants_to_sprint && grounded && self.can_sprint {
            intent.wants_to_crouch = false;
            intent.wants_to_prone = false;
            if transition == TransitionState::None && !lowered && !*sprinting {
                *sprinting = true;
                log::trace!("sprint started");
            }
        }

        let request = Self::height_request(engine, ctx);
        match request {
            Some(HeightRequest::Crouch) => engine.crouch(ctx, false, dt),
            Some(HeightRequest::Uncrouch) => engine.uncrouch(ctx, false, dt),
            Some(HeightRequest::Prone) => engine.prone(ctx, false, dt),
            None => {}
        }
        outcome.height_request = request;
        outcome
    }

    fn height_request(engine: &HeightTransitionEngine, ctx: &HeightContext<'_>) -> Option<HeightRequest> {
        let intent = &*ctx.intent;
        let transition = engine.transition();
        let settled = transition == TransitionState::None;
        let prone_related = engine.is_prone() || transition == TransitionState::ToProne;

        if ctx.can_prone_now && intent.wants_to_prone && !(engine.is_prone() && settled) {
            return Some(HeightRequest::Prone);
        }

        if prone_related && !intent.wants_to_prone {
            // Leave prone through the crouched height when crouch is held
            if ctx.can_crouch_now && intent.wants_to_crouch {
                return Some(HeightRequest::Crouch);
            }
            return Some(HeightRequest::Uncrouch);
        }

        if ctx.can_crouch_now && intent.wants_to_crouch && !(engine.is_crouched() && settled) {
            Some(HeightRequest::Crouch)
        } else if !ctx.can_crouch_now
            || intent.wants_to_sprint
            || (!intent.wants_to_crouch && (engine.is_crouched() || !settled))
        {
            Some(HeightRequest::Uncrouch)
        } else {
            None
        }
    }
}

/// Top speed for the current locomotion sub-mode.
pub fn max_speed(config: &MovementConfig, sprinting: bool, posture: Posture) -> f32 {
    if sprinting {
        return config.max_sprint_speed;
    }
    match posture {
        Posture::Standing => config.max_walk_speed,
        Posture::Crouched => config.max_walk_speed_crouched,
        Posture::Prone => config.max_walk_speed_prone,
    }
}

/// Acceleration limit, scaled by the sprint curve while sprinting.
pub fn max_acceleration(config: &MovementConfig, sprinting: bool, speed: f32, max_speed: f32) -> f32 {
    if !sprinting || max_speed <= 0.0 {
        return config.max_acceleration;
    }
    config.max_acceleration * config.sprint_acceleration_curve.evaluate(speed / max_speed)
}

/// Acceleration while sprinting: full strength straight ahead.
pub fn sprint_acceleration(facing: Vec3, max_acceleration: f32) -> Vec3 {
    safe_normal_2d(facing) * max_acceleration
}
