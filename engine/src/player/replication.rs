//! Prediction / Replication Bridge
//!
//! Two halves:
//!
//! - **Prediction**: [`SavedMove`] snapshots the state a replayed move needs
//!   (sprint and prone intent, transition, tracked half-height). Intent bits
//!   travel in the move's [`CompressedFlags`] byte.
//! - **Replication**: the server pushes [`ReplicatedState`] to simulated
//!   observers. Each target type declares a table of
//!   [`ReplicatedProperty`] entries (field, condition, change hook), and
//!   [`apply_replicated`] writes the fields the receiving role accepts, then
//!   runs the hooks of the fields that changed.
//!
//! Both records have fixed 8-byte wire forms ([`SavedMoveWire`],
//! [`ReplicatedStateWire`]) cast with bytemuck.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::physics::CollisionQuery;

use super::height::{CharacterOwner, HeightTransitionEngine};
use super::state::{MovementIntent, NetRole, TransitionState};

// ============================================================================
// COMPRESSED FLAGS
// ============================================================================

/// Per-move flag byte sent with every client move.
///
/// Bits 0 to 3 belong to the base movement (jump, crouch and two reserved
/// bits) and are carried through untouched. Bits 4 and 5 carry sprint and
/// prone intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompressedFlags(pub u8);

impl CompressedFlags {
    /// No flags.
    pub const NONE: Self = Self(0);

    /// Jump pressed (base movement).
    pub const JUMP: Self = Self(1 << 0);

    /// Crouch wanted (base movement).
    pub const CROUCH: Self = Self(1 << 1);

    /// Reserved for the base movement.
    pub const RESERVED_1: Self = Self(1 << 2);

    /// Reserved for the base movement.
    pub const RESERVED_2: Self = Self(1 << 3);

    /// Sprint wanted.
    pub const SPRINT: Self = Self(1 << 4);

    /// Prone wanted.
    pub const PRONE: Self = Self(1 << 5);

    /// Every bit this extension owns.
    pub const CUSTOM_MASK: Self = Self(Self::SPRINT.0 | Self::PRONE.0);

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// OR the intent bits into `self`, leaving every other bit as it was.
    pub fn pack(self, wants_to_sprint: bool, wants_to_prone: bool) -> Self {
        let mut flags = self;
        if wants_to_sprint {
            flags = flags.union(Self::SPRINT);
        }
        if wants_to_prone {
            flags = flags.union(Self::PRONE);
        }
        flags
    }

    /// Sprint and prone intent, reading only their own bits.
    pub fn unpack(self) -> (bool, bool) {
        (self.contains(Self::SPRINT), self.contains(Self::PRONE))
    }

    /// Apply the intent bits to `intent` on the receiving side.
    pub fn apply_to(self, intent: &mut MovementIntent) {
        let (sprint, prone) = self.unpack();
        intent.wants_to_sprint = sprint;
        intent.wants_to_prone = prone;
    }
}

impl std::ops::BitOr for CompressedFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitAnd for CompressedFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ============================================================================
// WIRE ERRORS
// ============================================================================

/// Errors decoding a wire record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// The transition byte is not a known transition.
    UnknownTransition(u8),
    /// The buffer is not the size of the record.
    BadLength { expected: usize, actual: usize },
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::UnknownTransition(value) => write!(f, "unknown transition value: {value}"),
            WireError::BadLength { expected, actual } => {
                write!(f, "bad record length: expected {expected} bytes, got {actual}")
            }
        }
    }
}

impl std::error::Error for WireError {}

impl TryFrom<u8> for TransitionState {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TransitionState::None),
            1 => Ok(TransitionState::StandToCrouch),
            2 => Ok(TransitionState::CrouchToStand),
            3 => Ok(TransitionState::ToProne),
            4 => Ok(TransitionState::ProneToCrouch),
            other => Err(WireError::UnknownTransition(other)),
        }
    }
}

fn read_record<T: Pod>(bytes: &[u8]) -> Result<T, WireError> {
    let expected = std::mem::size_of::<T>();
    if bytes.len() != expected {
        return Err(WireError::BadLength {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(bytemuck::pod_read_unaligned(bytes))
}

// ============================================================================
// SAVED MOVE
// ============================================================================

/// State a client move needs to be replayed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SavedMove {
    pub wants_to_sprint: bool,
    pub wants_to_prone: bool,
    pub transition: TransitionState,
    pub current_half_height: f32,
}

impl SavedMove {
    /// Snapshot live state before the move is sent.
    pub fn capture(intent: &MovementIntent, engine: &HeightTransitionEngine) -> Self {
        Self {
            wants_to_sprint: intent.wants_to_sprint,
            wants_to_prone: intent.wants_to_prone,
            transition: engine.transition(),
            current_half_height: engine.current_half_height(),
        }
    }

    /// Write the snapshot back before the move is replayed.
    pub fn restore(&self, intent: &mut MovementIntent, engine: &mut HeightTransitionEngine) {
        intent.wants_to_sprint = self.wants_to_sprint;
        intent.wants_to_prone = self.wants_to_prone;
        engine.restore(self.transition, self.current_half_height);
    }

    /// Two moves may be merged only when every field matches exactly.
    pub fn can_combine_with(&self, other: &SavedMove) -> bool {
        self.wants_to_sprint == other.wants_to_sprint
            && self.wants_to_prone == other.wants_to_prone
            && self.transition == other.transition
            && self.current_half_height.to_bits() == other.current_half_height.to_bits()
    }

    /// Flag byte for this move on top of the base movement's bits.
    pub fn compressed_flags(&self, base: CompressedFlags) -> CompressedFlags {
        base.pack(self.wants_to_sprint, self.wants_to_prone)
    }

    pub fn to_wire(&self, base: CompressedFlags) -> SavedMoveWire {
        SavedMoveWire {
            flags: self.compressed_flags(base).0,
            transition: self.transition.as_u8(),
            _reserved: [0; 2],
            current_half_height: self.current_half_height,
        }
    }

    /// Decode a move and the full flag byte it was sent with.
    pub fn from_wire(wire: &SavedMoveWire) -> Result<(Self, CompressedFlags), WireError> {
        let flags = CompressedFlags(wire.flags);
        let (wants_to_sprint, wants_to_prone) = flags.unpack();
        let saved = Self {
            wants_to_sprint,
            wants_to_prone,
            transition: TransitionState::try_from(wire.transition)?,
            current_half_height: wire.current_half_height,
        };
        Ok((saved, flags))
    }
}

/// Wire form of a [`SavedMove`].
///
/// - `flags` (1) + `transition` (1) + `_reserved` (2) + `current_half_height` (4) = 8.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SavedMoveWire {
    pub flags: u8,
    pub transition: u8,
    pub _reserved: [u8; 2],
    pub current_half_height: f32,
}

static_assertions::assert_eq_size!(SavedMoveWire, [u8; 8]);

impl SavedMoveWire {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        read_record(bytes)
    }
}

// ============================================================================
// REPLICATED STATE
// ============================================================================

/// Authoritative state pushed to simulated observers.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReplicatedState {
    pub sprinting: bool,
    pub transition: TransitionState,
    pub current_half_height: f32,
    pub prone: bool,
    pub crouched: bool,
}

impl ReplicatedState {
    pub fn to_wire(&self) -> ReplicatedStateWire {
        ReplicatedStateWire {
            sprinting: u8::from(self.sprinting),
            transition: self.transition.as_u8(),
            prone: u8::from(self.prone),
            crouched: u8::from(self.crouched),
            current_half_height: self.current_half_height,
        }
    }

    pub fn from_wire(wire: &ReplicatedStateWire) -> Result<Self, WireError> {
        Ok(Self {
            sprinting: wire.sprinting != 0,
            transition: TransitionState::try_from(wire.transition)?,
            current_half_height: wire.current_half_height,
            prone: wire.prone != 0,
            crouched: wire.crouched != 0,
        })
    }
}

/// Wire form of a [`ReplicatedState`].
///
/// - `sprinting` (1) + `transition` (1) + `prone` (1) + `crouched` (1) + `current_half_height` (4) = 8.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ReplicatedStateWire {
    pub sprinting: u8,
    pub transition: u8,
    pub prone: u8,
    pub crouched: u8,
    pub current_half_height: f32,
}

static_assertions::assert_eq_size!(ReplicatedStateWire, [u8; 8]);

impl ReplicatedStateWire {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        read_record(bytes)
    }
}

// ============================================================================
// PROPERTY TABLE
// ============================================================================

/// One replicated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicatedField {
    Sprinting,
    Transition,
    CurrentHalfHeight,
    Prone,
    Crouched,
}

impl ReplicatedField {
    /// The field holds different values in `a` and `b`.
    pub fn differs(self, a: &ReplicatedState, b: &ReplicatedState) -> bool {
        match self {
            ReplicatedField::Sprinting => a.sprinting != b.sprinting,
            ReplicatedField::Transition => a.transition != b.transition,
            ReplicatedField::CurrentHalfHeight => a.current_half_height.to_bits() != b.current_half_height.to_bits(),
            ReplicatedField::Prone => a.prone != b.prone,
            ReplicatedField::Crouched => a.crouched != b.crouched,
        }
    }
}

/// Which receivers accept a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationCondition {
    /// Every remote instance
    Always,
    /// Only non-owning simulated observers; owner and server compute it locally
    #[default]
    SimulatedOnly,
}

impl ReplicationCondition {
    pub fn accepts(self, role: NetRole) -> bool {
        match self {
            ReplicationCondition::Always => role != NetRole::Authority,
            ReplicationCondition::SimulatedOnly => role == NetRole::SimulatedProxy,
        }
    }
}

/// Collaborators a change hook may need.
pub struct SyncEnv<'a> {
    pub world: &'a dyn CollisionQuery,
    pub owner: &'a mut dyn CharacterOwner,
}

/// Change hook run after a replicated update wrote its field.
pub type ChangeHook<T> = fn(&mut T, &mut SyncEnv<'_>);

/// Table entry: a field, who receives it and what runs when it changes.
pub struct ReplicatedProperty<T> {
    pub field: ReplicatedField,
    pub condition: ReplicationCondition,
    pub on_change: Option<ChangeHook<T>>,
}

/// A type whose state is replicated through a property table.
pub trait ReplicationTarget: Sized + 'static {
    /// Current values of every replicated field.
    fn replicated_state(&self) -> ReplicatedState;

    /// Overwrite one field from `incoming`.
    fn write_field(&mut self, field: ReplicatedField, incoming: &ReplicatedState);

    /// Replicated fields, in the order their hooks run.
    fn property_table(&self) -> &'static [ReplicatedProperty<Self>];
}

/// Write every accepted field of `incoming` that differs from `target`, then
/// run the change hooks of the written fields. Returns the written fields.
pub fn apply_replicated<T: ReplicationTarget>(
    target: &mut T,
    incoming: &ReplicatedState,
    role: NetRole,
    env: &mut SyncEnv<'_>,
) -> Vec<ReplicatedField> {
    let table = target.property_table();
    let current = target.replicated_state();
    let mut changed = Vec::new();

    for property in table {
        if !property.condition.accepts(role) || !property.field.differs(&current, incoming) {
            continue;
        }
        target.write_field(property.field, incoming);
        changed.push(property.field);
    }

    for property in table {
        if !changed.contains(&property.field) {
            continue;
        }
        if let Some(hook) = property.on_change {
            hook(target, env);
        }
    }

    if !changed.is_empty() {
        log::trace!("replicated fields changed: {changed:?}");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::PlaneWorld;
    use crate::player::config::MovementConfig;
    use crate::player::height::NullOwner;

    #[test]
    fn test_pack_keeps_base_bits() {
        let base = CompressedFlags::JUMP | CompressedFlags::RESERVED_2;
        let packed = base.pack(true, false);
        assert_eq!(packed.0, 0b0001_1001);
        assert_eq!(packed.unpack(), (true, false));
    }

    #[test]
    fn test_unpack_masks_other_bits() {
        assert_eq!(CompressedFlags(0b1100_1111).unpack(), (false, false));
        assert_eq!(CompressedFlags(0b0010_0000).unpack(), (false, true));
        let mut intent = MovementIntent {
            wants_to_crouch: true,
            ..MovementIntent::default()
        };
        CompressedFlags(0b0011_0000).apply_to(&mut intent);
        assert!(intent.wants_to_sprint && intent.wants_to_prone && intent.wants_to_crouch);
    }

    #[test]
    fn test_transition_try_from() {
        assert_eq!(TransitionState::try_from(2), Ok(TransitionState::CrouchToStand));
        assert_eq!(TransitionState::try_from(9), Err(WireError::UnknownTransition(9)));
    }

    #[test]
    fn test_capture_and_restore() {
        let config = MovementConfig::default();
        let mut engine = HeightTransitionEngine::new(&config);
        engine.restore(TransitionState::StandToCrouch, 72.5);
        let intent = MovementIntent {
            wants_to_sprint: false,
            wants_to_prone: true,
            wants_to_crouch: true,
        };
        let saved = SavedMove::capture(&intent, &engine);

        let mut other_engine = HeightTransitionEngine::new(&config);
        let mut other_intent = MovementIntent {
            wants_to_sprint: true,
            ..MovementIntent::default()
        };
        saved.restore(&mut other_intent, &mut other_engine);
        assert_eq!(other_engine.transition(), TransitionState::StandToCrouch);
        assert_eq!(other_engine.current_half_height(), 72.5);
        assert!(!other_intent.wants_to_sprint);
        assert!(other_intent.wants_to_prone);
    }

    #[test]
    fn test_saved_move_wire() {
        let saved = SavedMove {
            wants_to_sprint: true,
            wants_to_prone: false,
            transition: TransitionState::ToProne,
            current_half_height: 41.25,
        };
        let wire = saved.to_wire(CompressedFlags::CROUCH);
        assert_eq!(wire.as_bytes().len(), 8);
        let decoded = SavedMoveWire::from_bytes(wire.as_bytes()).and_then(|w| SavedMove::from_wire(&w));
        let (decoded, flags) = decoded.unwrap();
        assert_eq!(decoded, saved);
        assert!(flags.contains(CompressedFlags::CROUCH));
        assert_eq!(
            SavedMoveWire::from_bytes(&[0; 5]),
            Err(WireError::BadLength { expected: 8, actual: 5 })
        );
    }

    #[test]
    fn test_replicated_wire_rejects_unknown_transition() {
        let mut wire = ReplicatedState::default().to_wire();
        wire.transition = 7;
        assert_eq!(ReplicatedState::from_wire(&wire), Err(WireError::UnknownTransition(7)));
    }

    #[test]
    fn test_condition_accepts() {
        assert!(ReplicationCondition::SimulatedOnly.accepts(NetRole::SimulatedProxy));
        assert!(!ReplicationCondition::SimulatedOnly.accepts(NetRole::AutonomousProxy));
        assert!(!ReplicationCondition::Always.accepts(NetRole::Authority));
    }

    #[derive(Default)]
    struct Mirror {
        state: ReplicatedState,
        hook_calls: u32,
        transition_seen_by_hook: Option<TransitionState>,
    }

    fn mirror_half_height_changed(mirror: &mut Mirror, _env: &mut SyncEnv<'_>) {
        mirror.hook_calls += 1;
        mirror.transition_seen_by_hook = Some(mirror.state.transition);
    }

    static MIRROR_TABLE: [ReplicatedProperty<Mirror>; 2] = [
        ReplicatedProperty {
            field: ReplicatedField::Transition,
            condition: ReplicationCondition::SimulatedOnly,
            on_change: None,
        },
        ReplicatedProperty {
            field: ReplicatedField::CurrentHalfHeight,
            condition: ReplicationCondition::SimulatedOnly,
            on_change: Some(mirror_half_height_changed),
        },
    ];

    impl ReplicationTarget for Mirror {
        fn replicated_state(&self) -> ReplicatedState {
            self.state
        }

        fn write_field(&mut self, field: ReplicatedField, incoming: &ReplicatedState) {
            match field {
                ReplicatedField::Transition => self.state.transition = incoming.transition,
                ReplicatedField::CurrentHalfHeight => self.state.current_half_height = incoming.current_half_height,
                _ => {}
            }
        }

        fn property_table(&self) -> &'static [ReplicatedProperty<Self>] {
            &MIRROR_TABLE
        }
    }

    #[test]
    fn test_apply_replicated_runs_hooks_after_writes() {
        let world = PlaneWorld::new();
        let mut owner = NullOwner;
        let mut env = SyncEnv {
            world: &world,
            owner: &mut owner,
        };
        let mut mirror = Mirror::default();
        let incoming = ReplicatedState {
            sprinting: true,
            transition: TransitionState::StandToCrouch,
            current_half_height: 80.0,
            ..ReplicatedState::default()
        };

        let changed = apply_replicated(&mut mirror, &incoming, NetRole::SimulatedProxy, &mut env);
        assert_eq!(changed, vec![ReplicatedField::Transition, ReplicatedField::CurrentHalfHeight]);
        assert_eq!(mirror.hook_calls, 1);
        assert_eq!(mirror.transition_seen_by_hook, Some(TransitionState::StandToCrouch));
        assert!(!mirror.state.sprinting, "field not in the table");

        let again = apply_replicated(&mut mirror, &incoming, NetRole::SimulatedProxy, &mut env);
        assert!(again.is_empty());
        assert_eq!(mirror.hook_calls, 1);

        let mut owner_mirror = Mirror::default();
        assert!(apply_replicated(&mut owner_mirror, &incoming, NetRole::AutonomousProxy, &mut env).is_empty());
    }
}
