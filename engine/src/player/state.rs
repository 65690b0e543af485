//! Movement state shared by the resolver, the height engine and the
//! replication bridge.

use serde::{Deserialize, Serialize};

/// Player intent, written by input handling and adjusted by the resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementIntent {
    /// Crouch was requested
    pub wants_to_crouch: bool,
    /// Sprint was requested
    pub wants_to_sprint: bool,
    /// Prone was requested
    pub wants_to_prone: bool,
}

/// Settled posture at the end of a height transition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Posture {
    /// Full-height capsule
    #[default]
    Standing,
    /// Crouched capsule
    Crouched,
    /// Prone capsule plus the auxiliary prone volume
    Prone,
}

/// In-progress height change.
///
/// Discriminants are the replicated wire values. `None` through
/// `CrouchToStand` are the base set; the prone legs extend it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransitionState {
    /// No height change pending
    #[default]
    None = 0,
    /// Lowering to the crouched height
    StandToCrouch = 1,
    /// Raising to the standing height
    CrouchToStand = 2,
    /// Lowering to the prone height
    ToProne = 3,
    /// Raising from prone to the crouched height
    ProneToCrouch = 4,
}

impl TransitionState {
    /// Wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Posture this transition ends in.
    pub fn target(self) -> Option<Posture> {
        match self {
            TransitionState::None => None,
            TransitionState::StandToCrouch | TransitionState::ProneToCrouch => Some(Posture::Crouched),
            TransitionState::CrouchToStand => Some(Posture::Standing),
            TransitionState::ToProne => Some(Posture::Prone),
        }
    }

    /// True for transitions that shrink the capsule.
    pub fn is_lowering(self) -> bool {
        matches!(self, TransitionState::StandToCrouch | TransitionState::ToProne)
    }

    /// Transition that moves towards `target` from a height above or below it.
    pub fn towards(target: Posture, lowering: bool) -> Self {
        match (target, lowering) {
            (Posture::Standing, _) => TransitionState::CrouchToStand,
            (Posture::Crouched, true) => TransitionState::StandToCrouch,
            (Posture::Crouched, false) => TransitionState::ProneToCrouch,
            (Posture::Prone, _) => TransitionState::ToProne,
        }
    }
}

/// Network role of the simulating instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetRole {
    /// Server, or standalone
    #[default]
    Authority,
    /// Owning client running prediction
    AutonomousProxy,
    /// Non-owning observer of a remote character
    SimulatedProxy,
}

/// Physics mode of the underlying movement loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementMode {
    /// Not simulating
    None,
    /// On a walkable floor
    #[default]
    Walking,
    /// Airborne
    Falling,
    /// In a fluid volume
    Swimming,
    /// Free flight
    Flying,
}

impl MovementMode {
    /// Grounded modes.
    pub fn is_moving_on_ground(self) -> bool {
        self == MovementMode::Walking
    }
}
