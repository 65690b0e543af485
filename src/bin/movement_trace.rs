//! Movement Trace - Height Transition Diagnostics
//!
//! Runs a character through a scripted stance sequence on a flat floor and
//! prints the tracked half-height, capsule size and eye height every tick.
//!
//! Run with: `cargo run --bin movement_trace [config.json]`
//!
//! Sequence:
//! - 0.0s - 2.0s: crouch
//! - 2.0s - 3.0s: stand back up
//! - 3.0s - 4.0s: sprint forward
//!
//! Set `RUST_LOG=debug` to see transition begin/complete events.

use std::process::ExitCode;

use glam::Vec3;

use stance_movement::physics::{HalfSpace, PlaneWorld};
use stance_movement::player::{CharacterMovement, CharacterOwner, MovementConfig, NetRole, TickInput};

const TICK: f32 = 0.1;
const TICKS: u32 = 40;

/// Prints owner callbacks as they arrive.
struct TraceOwner;

impl CharacterOwner for TraceOwner {
    fn on_start_crouch(&mut self, adjust: f32, scaled_adjust: f32) {
        println!("    start crouch: adjust {adjust:.2} (scaled {scaled_adjust:.2})");
    }

    fn on_end_crouch(&mut self, adjust: f32, scaled_adjust: f32) {
        println!("    end crouch:   adjust {adjust:.2} (scaled {scaled_adjust:.2})");
    }
}

fn load_config() -> Result<MovementConfig, String> {
    match std::env::args().nth(1) {
        Some(path) => MovementConfig::load(&path).map_err(|err| format!("{path}: {err}")),
        None => Ok(MovementConfig::default()),
    }
}

fn main() -> ExitCode {
    env_logger::init();

    let config = match load_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!("===========================================");
    println!("   Movement Trace");
    println!("===========================================");
    println!(
        "standing {:.1} / crouched {:.1} / prone {:.1}, policy {:?}",
        config.standing_half_height, config.crouched_half_height, config.prone_half_height, config.commit_policy
    );
    println!();

    let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
    let start = Vec3::new(0.0, config.standing_half_height + 2.15, 0.0);
    let mut movement = match CharacterMovement::new(config, start, NetRole::Authority) {
        Ok(movement) => movement,
        Err(err) => {
            eprintln!("invalid config: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut owner = TraceOwner;

    println!("tick  time  stance    transition      tracked  capsule  eye     x");
    for tick in 0..TICKS {
        let time = tick as f32 * TICK;
        let intent = movement.intent_mut();
        intent.wants_to_crouch = time < 2.0;
        intent.wants_to_sprint = time >= 3.0;

        let input = TickInput {
            move_input: if time >= 3.0 { Vec3::X } else { Vec3::ZERO },
            facing: Vec3::X,
            ..TickInput::default()
        };
        movement.tick(&world, &mut owner, &input, TICK);

        let height = movement.height();
        let body = &movement.kinematics().body;
        println!(
            "{:>4}  {:>4.1}  {:<8}  {:<14}  {:>7.2}  {:>7.2}  {:>5.1}  {:>6.1}{}",
            tick + 1,
            time + TICK,
            format!("{:?}", height.posture()),
            format!("{:?}", height.transition()),
            height.current_half_height(),
            body.half_height,
            height.base_eye_height(),
            body.location.x,
            if movement.is_sprinting() { "  sprint" } else { "" },
        );
    }

    ExitCode::SUCCESS
}
