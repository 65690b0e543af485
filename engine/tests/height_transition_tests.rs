//! Height Transition Tests - Convergence, Idempotence and Blocked Growth
//!
//! Drives the height transition engine directly against analytic worlds and
//! checks the tracked half-height, the capsule and the owner callbacks.

use glam::{Quat, Vec3};
use stance_movement::physics::{CapsuleBody, CapsuleShape, CollisionQuery, HalfSpace, HitResult, PlaneWorld};
use stance_movement::player::{
    CharacterOwner, HeightCommitPolicy, HeightContext, HeightTransitionEngine, KinematicState, MovementConfig,
    MovementIntent, NetRole, Posture, SavedMove, TransitionState,
};

const EPSILON: f32 = 0.001;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

#[derive(Default)]
struct Recorder {
    start_crouch: Vec<(f32, f32)>,
    end_crouch: Vec<(f32, f32)>,
    eye_heights: Vec<f32>,
}

impl CharacterOwner for Recorder {
    fn on_start_crouch(&mut self, adjust: f32, scaled_adjust: f32) {
        self.start_crouch.push((adjust, scaled_adjust));
    }

    fn on_end_crouch(&mut self, adjust: f32, scaled_adjust: f32) {
        self.end_crouch.push((adjust, scaled_adjust));
    }

    fn on_eye_height_changed(&mut self, eye_height: f32) {
        self.eye_heights.push(eye_height);
    }
}

/// Floor for sweeps, but every overlap test reports encroachment.
struct AlwaysEncroached {
    floor: PlaneWorld,
}

impl CollisionQuery for AlwaysEncroached {
    fn sweep(&self, shape: CapsuleShape, start: Vec3, end: Vec3, rotation: Quat) -> Vec<HitResult> {
        self.floor.sweep(shape, start, end, rotation)
    }

    fn overlap_blocking(&self, _location: Vec3, _rotation: Quat, _shape: CapsuleShape) -> bool {
        true
    }
}

struct Character {
    engine: HeightTransitionEngine,
    state: KinematicState,
    intent: MovementIntent,
    owner: Recorder,
}

impl Character {
    fn standing(config: &MovementConfig) -> Self {
        let body = CapsuleBody::new(Vec3::new(0.0, config.standing_half_height + 2.15, 0.0), 34.0, 88.0);
        Self {
            engine: HeightTransitionEngine::new(config),
            state: KinematicState::new(body),
            intent: MovementIntent::default(),
            owner: Recorder::default(),
        }
    }

    fn step(&mut self, world: &dyn CollisionQuery, target: Posture, dt: f32) {
        let mut ctx = HeightContext {
            world,
            kinematics: &mut self.state,
            intent: &mut self.intent,
            owner: &mut self.owner,
            role: NetRole::Authority,
            can_crouch_now: true,
            can_prone_now: true,
        };
        match target {
            Posture::Standing => self.engine.uncrouch(&mut ctx, false, dt),
            Posture::Crouched => self.engine.crouch(&mut ctx, false, dt),
            Posture::Prone => self.engine.prone(&mut ctx, false, dt),
        }
    }
}

fn config_with(policy: HeightCommitPolicy) -> MovementConfig {
    MovementConfig {
        commit_policy: policy,
        ..MovementConfig::default()
    }
}

fn floor() -> PlaneWorld {
    PlaneWorld::new().with_plane(HalfSpace::floor(0.0))
}

// ============================================================================
// Crouch Scenario (88 -> 60 over 2s at 0.1s ticks)
// ============================================================================

#[test]
fn test_crouch_scenario_twenty_steps() {
    for policy in [HeightCommitPolicy::Discrete, HeightCommitPolicy::Continuous] {
        let world = floor();
        let mut character = Character::standing(&config_with(policy));
        let mut previous = character.engine.current_half_height();

        for step in 1..=20 {
            character.step(&world, Posture::Crouched, 0.1);
            let height = character.engine.current_half_height();
            assert!(height < previous, "{policy:?} step {step}: {height} not below {previous}");
            previous = height;

            if step < 20 {
                assert_eq!(
                    character.engine.transition(),
                    TransitionState::StandToCrouch,
                    "{policy:?} step {step}"
                );
            }
        }

        assert_eq!(character.engine.current_half_height(), 60.0, "{policy:?}");
        assert_eq!(character.engine.transition(), TransitionState::None, "{policy:?}");
        assert_eq!(character.engine.posture(), Posture::Crouched);
        assert!(approx_eq(character.state.body.half_height, 60.0));
    }
}

#[test]
fn test_discrete_capsule_holds_until_completion() {
    let world = floor();
    let mut character = Character::standing(&config_with(HeightCommitPolicy::Discrete));
    for _ in 0..19 {
        character.step(&world, Posture::Crouched, 0.1);
        assert_eq!(character.state.body.half_height, 88.0);
    }
    character.step(&world, Posture::Crouched, 0.1);
    assert_eq!(character.state.body.half_height, 60.0);
    // Base stays on the floor
    assert!(approx_eq(character.state.body.base_height(), 2.15));
}

#[test]
fn test_eye_height_follows_tracked_height() {
    let world = floor();
    let config = config_with(HeightCommitPolicy::Discrete);
    let mut character = Character::standing(&config);
    for _ in 0..20 {
        character.step(&world, Posture::Crouched, 0.1);
    }
    assert_eq!(character.owner.eye_heights.len(), 20);
    assert!(character.owner.eye_heights.windows(2).all(|pair| pair[1] < pair[0]));
    assert!(approx_eq(character.engine.base_eye_height(), config.crouched_eye_height));
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn test_small_and_large_steps_converge() {
    for policy in [HeightCommitPolicy::Discrete, HeightCommitPolicy::Continuous] {
        let world = floor();
        let config = config_with(policy);

        let mut fine = Character::standing(&config);
        for _ in 0..3000 {
            fine.step(&world, Posture::Crouched, 0.001);
        }

        let mut coarse = Character::standing(&config);
        coarse.step(&world, Posture::Crouched, 5.0);

        assert_eq!(fine.engine.current_half_height(), 60.0, "{policy:?}");
        assert_eq!(coarse.engine.current_half_height(), 60.0, "{policy:?}");
        assert_eq!(fine.engine.transition(), TransitionState::None);
        assert_eq!(coarse.engine.transition(), TransitionState::None);
    }
}

#[test]
fn test_prone_and_back_to_crouch() {
    let world = floor();
    let config = config_with(HeightCommitPolicy::Continuous);
    let mut character = Character::standing(&config);

    character.step(&world, Posture::Prone, 0.1);
    assert_eq!(character.engine.transition(), TransitionState::ToProne);
    for _ in 0..30 {
        character.step(&world, Posture::Prone, 0.1);
    }
    assert_eq!(character.engine.posture(), Posture::Prone);
    assert_eq!(character.engine.current_half_height(), config.prone_half_height);

    character.step(&world, Posture::Crouched, 0.1);
    assert_eq!(character.engine.transition(), TransitionState::ProneToCrouch);
    for _ in 0..30 {
        character.step(&world, Posture::Crouched, 0.1);
    }
    assert_eq!(character.engine.posture(), Posture::Crouched);
    assert_eq!(character.engine.current_half_height(), config.crouched_half_height);
}

// ============================================================================
// Idempotence
// ============================================================================

#[test]
fn test_crouch_when_crouched_is_idempotent() {
    for policy in [HeightCommitPolicy::Discrete, HeightCommitPolicy::Continuous] {
        let world = floor();
        let mut character = Character::standing(&config_with(policy));
        character.step(&world, Posture::Crouched, 5.0);
        assert_eq!(character.engine.transition(), TransitionState::None);

        character.owner = Recorder::default();
        let body_before = character.state.body;
        character.step(&world, Posture::Crouched, 0.1);

        assert_eq!(character.state.body, body_before, "{policy:?}: no geometry change");
        assert_eq!(character.owner.start_crouch, vec![(0.0, 0.0)], "{policy:?}");
        assert!(character.owner.end_crouch.is_empty());
        assert_eq!(character.engine.current_half_height(), 60.0);
    }
}

// ============================================================================
// Restored Moves
// ============================================================================

#[test]
fn test_restored_move_ignores_prior_history() {
    for policy in [HeightCommitPolicy::Discrete, HeightCommitPolicy::Continuous] {
        let world = floor();
        let config = config_with(policy);
        let snapshot = SavedMove {
            wants_to_sprint: false,
            wants_to_prone: false,
            transition: TransitionState::CrouchToStand,
            current_half_height: 50.0,
        };

        let mut from_prone = Character::standing(&config);
        from_prone.step(&world, Posture::Prone, 5.0);
        assert_eq!(from_prone.engine.posture(), Posture::Prone);

        let mut from_crouch = Character::standing(&config);
        from_crouch.step(&world, Posture::Crouched, 5.0);
        assert_eq!(from_crouch.engine.posture(), Posture::Crouched);

        for character in [&mut from_prone, &mut from_crouch] {
            snapshot.restore(&mut character.intent, &mut character.engine);
            character.step(&world, Posture::Standing, 0.1);
        }

        let height = from_prone.engine.current_half_height();
        assert_eq!(height, from_crouch.engine.current_half_height(), "{policy:?}");
        // Below the crouched height the prone leg rate (27/s) applies
        assert!(approx_eq(height, 52.7), "{policy:?}: {height}");
        assert_eq!(from_prone.engine.transition(), from_crouch.engine.transition());
    }
}

// ============================================================================
// Blocked Growth
// ============================================================================

#[test]
fn test_blocked_uncrouch_never_completes() {
    for policy in [HeightCommitPolicy::Discrete, HeightCommitPolicy::Continuous] {
        let world = AlwaysEncroached { floor: floor() };
        let mut character = Character::standing(&config_with(policy));
        character.step(&world, Posture::Crouched, 5.0);
        assert_eq!(character.engine.posture(), Posture::Crouched);

        for _ in 0..50 {
            character.step(&world, Posture::Standing, 0.1);
            assert!(character.engine.current_half_height() <= 60.0, "{policy:?}");
            assert_eq!(character.state.body.half_height, 60.0, "{policy:?}");
            assert!(character.engine.is_crouched(), "{policy:?}");
        }
        assert_eq!(character.engine.transition(), TransitionState::CrouchToStand);
        assert!(character.owner.end_crouch.is_empty());
    }
}

#[test]
fn test_ceiling_stops_continuous_growth_partway() {
    // Room for a half-height of about 72 above the floor
    let world = PlaneWorld::new()
        .with_plane(HalfSpace::floor(0.0))
        .with_plane(HalfSpace::ceiling(146.5));
    let mut character = Character::standing(&config_with(HeightCommitPolicy::Continuous));
    character.step(&world, Posture::Crouched, 5.0);

    for _ in 0..40 {
        character.step(&world, Posture::Standing, 0.1);
    }
    let height = character.engine.current_half_height();
    assert!(height > 60.0 && height < 74.0, "stopped at {height}");
    assert_eq!(character.engine.transition(), TransitionState::CrouchToStand);
    assert!(!world.overlap_blocking(character.state.body.location, Quat::IDENTITY, character.state.body.shape()));
}
