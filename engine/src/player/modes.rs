//! Locomotion mode handlers.
//!
//! Each physics mode the extension drives is a [`MovementModeHandler`]. The
//! component picks one per tick with [`select_handler`]; standard walking is
//! just another handler delegating to the [`BaseMovement`] collaborator.

use crate::physics::{CollisionQuery, wrap_angle, yaw_rotation};

use super::ground::{BaseMovement, KinematicState, WalkParams};
use super::prone::ProneMover;
use super::state::MovementMode;

/// Everything a handler may touch during one physics step.
pub struct ModeContext<'a> {
    pub world: &'a dyn CollisionQuery,
    pub state: &'a mut KinematicState,
    pub base: &'a mut dyn BaseMovement,
    pub prone: Option<&'a mut ProneMover>,
    pub params: WalkParams,
}

/// Physics for one locomotion mode.
pub trait MovementModeHandler {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Advance the character by `dt`, starting at sub-step `iterations`.
    fn simulate(&self, ctx: &mut ModeContext<'_>, dt: f32, iterations: u32);

    /// Turn towards `desired_yaw` (radians) by at most `max_step`. Returns
    /// the yaw reached.
    fn physics_rotation(&self, ctx: &mut ModeContext<'_>, desired_yaw: f32, max_step: f32) -> f32 {
        let current = ctx.state.body.rotation.to_euler(glam::EulerRot::YXZ).0;
        let yaw = current + wrap_angle(desired_yaw - current).clamp(-max_step.abs(), max_step.abs());
        ctx.state.body.rotation = yaw_rotation(yaw);
        yaw
    }
}

/// Standard ground movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalkingHandler;

impl MovementModeHandler for WalkingHandler {
    fn name(&self) -> &'static str {
        "walking"
    }

    fn simulate(&self, ctx: &mut ModeContext<'_>, dt: f32, iterations: u32) {
        ctx.base.phys_walking(ctx.world, ctx.state, &ctx.params, dt, iterations);
    }
}

/// Ground movement that sweeps the prone volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProneHandler;

impl MovementModeHandler for ProneHandler {
    fn name(&self) -> &'static str {
        "prone"
    }

    fn simulate(&self, ctx: &mut ModeContext<'_>, dt: f32, iterations: u32) {
        match ctx.prone.as_deref_mut() {
            Some(mover) => mover.phys_prone(ctx.world, ctx.state, ctx.base, &ctx.params, dt, iterations),
            None => WalkingHandler.simulate(ctx, dt, iterations),
        }
    }

    fn physics_rotation(&self, ctx: &mut ModeContext<'_>, desired_yaw: f32, max_step: f32) -> f32 {
        match ctx.prone.as_deref_mut() {
            Some(mover) => mover.physics_rotation(ctx.world, ctx.state, desired_yaw, max_step),
            None => WalkingHandler.physics_rotation(ctx, desired_yaw, max_step),
        }
    }
}

static WALKING: WalkingHandler = WalkingHandler;
static PRONE: ProneHandler = ProneHandler;

/// Handler for the current physics mode, or `None` when the mode is left to
/// the underlying movement loop (falling, swimming, ...).
pub fn select_handler(mode: MovementMode, prone: bool, has_volume: bool) -> Option<&'static dyn MovementModeHandler> {
    match mode {
        MovementMode::Walking if prone && has_volume => Some(&PRONE),
        MovementMode::Walking => Some(&WALKING),
        _ => None,
    }
}
