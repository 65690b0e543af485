//! Stance Movement Library
//!
//! Sprint, smooth-height crouch and prone for a networked character
//! movement loop. The library never owns the world: all geometry goes
//! through [`physics::CollisionQuery`], and the walking loop it extends
//! comes in through [`player::BaseMovement`].
//!
//! # Modules
//!
//! - [`physics`] - Collision query contract, capsule body, half-space test world
//! - [`player`] - Locomotion resolver, height transitions, prone mover, replication
//!
//! # Example
//!
//! ```ignore
//! use stance_movement::physics::{HalfSpace, PlaneWorld};
//! use stance_movement::player::{CharacterMovement, MovementConfig, NetRole, NullOwner, TickInput};
//! use glam::Vec3;
//!
//! let world = PlaneWorld::new().with_plane(HalfSpace::floor(0.0));
//! let config = MovementConfig::load("movement.json")?;
//! let mut movement = CharacterMovement::new(config, Vec3::new(0.0, 90.15, 0.0), NetRole::Authority)?;
//!
//! // Hold crouch for a second
//! movement.intent_mut().wants_to_crouch = true;
//! for _ in 0..60 {
//!     movement.tick(&world, &mut NullOwner, &TickInput::default(), 1.0 / 60.0);
//! }
//! let eye_height = movement.height().base_eye_height();
//!
//! // Send the move and the replicated state
//! let saved = movement.save_move();
//! ```

pub mod physics;
pub mod player;

// Re-export the main entry points at crate level for convenience
pub use physics::{CollisionQuery, HalfSpace, PlaneWorld};
pub use player::{CharacterMovement, MovementConfig, TickInput};
