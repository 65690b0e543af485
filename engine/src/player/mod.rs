//! Player Module
//!
//! Sprint, crouch and prone on top of a base character movement loop.
//!
//! # Components
//!
//! - [`CharacterMovement`] - Per-character state and the tick pipeline
//! - [`LocomotionResolver`] - Sprint rules and height change requests
//! - [`HeightTransitionEngine`] - Rate-limited capsule height changes
//!   - Discrete or continuous commit to the collision capsule
//! - [`ProneMover`] - Sweeps the lying prone volume instead of the capsule
//! - [`SavedMove`] / [`CompressedFlags`] - Client prediction snapshots
//! - [`apply_replicated`] - Property-table driven state replication
//! - [`MovementConfig`] - Every tunable, loadable from JSON

pub mod component;
pub mod config;
pub mod ground;
pub mod height;
pub mod modes;
pub mod prone;
pub mod replication;
pub mod resolver;
pub mod state;

pub use component::{CharacterMovement, TickInput};
pub use config::{
    CollisionTolerances, ConfigError, HeightCommitPolicy, LOOSE_SPRINT_COSINE, MovementConfig, STRICT_SPRINT_COSINE,
    SpeedCurve, SprintAlignment,
};
pub use ground::{
    BaseMovement, FloorResult, KinematicState, MAX_FLOOR_DIST, MIN_FLOOR_DIST, SimpleGroundMovement, StepDownResult,
    WalkParams,
};
pub use height::{CharacterOwner, HeightContext, HeightTransitionEngine, NullOwner, interp_constant_to};
pub use modes::{ModeContext, MovementModeHandler, ProneHandler, WalkingHandler, select_handler};
pub use prone::{ProneMover, ProneVolume};
pub use replication::{
    CompressedFlags, ReplicatedField, ReplicatedProperty, ReplicatedState, ReplicatedStateWire, ReplicationCondition,
    ReplicationTarget, SavedMove, SavedMoveWire, SyncEnv, WireError, apply_replicated,
};
pub use resolver::{
    HeightRequest, LocomotionResolver, ResolveInput, ResolveOutcome, max_acceleration, max_speed, sprint_acceleration,
};
pub use state::{MovementIntent, MovementMode, NetRole, Posture, TransitionState};
