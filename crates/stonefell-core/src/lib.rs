//! Stonefell core: server-authoritative movement validation and
//! region-scoped state synchronization for a tile-based online world.
//!
//! Clients drive their own movement and report it; this crate owns the
//! truth. It validates every report against the map, the entity's derived
//! stats and its timing history, partitions the world into regions so state
//! only fans out to the clients that can see it, and scores the anomalies it
//! absorbs instead of disconnecting over them.
//!
//! # Architecture
//!
//! - [`world::World`] — the single-threaded tick loop owning all state
//! - [`movement::MovementValidator`] — the start/step/stop state machine
//! - [`region::RegionIndex`] — tile-to-region mapping, occupants, observers
//! - [`stats::StatAggregator`] — pure derivation of speed, attack rate and
//!   combat totals from equipment and effects
//! - [`cheat::CheatTracker`] — monotonic per-entity anomaly scoring
//! - [`sync`] — packet types, the transport contract, region fan-out
//! - [`contracts`] — map and persistence collaborator interfaces
//!
//! # Determinism
//!
//! The engine never reads a clock; the host passes server time into
//! [`world::World::tick`]. Collections iterate in key order. Replaying the
//! same message sequence against the same map reproduces the same state.
//!
//! # Example
//!
//! ```
//! use glam::IVec2;
//! use stonefell_core::config::WorldConfig;
//! use stonefell_core::contracts::{DoorDescriptor, MapQuery, PlayerRecord};
//! use stonefell_core::entity::ClientId;
//! use stonefell_core::world::{ClientMessage, World};
//!
//! struct OpenField;
//!
//! impl MapQuery for OpenField {
//!     fn is_colliding(&self, _: IVec2) -> bool { false }
//!     fn is_door(&self, _: IVec2) -> bool { false }
//!     fn door_at(&self, _: IVec2) -> Option<DoorDescriptor> { None }
//! }
//!
//! let mut world = World::new(WorldConfig::default(), OpenField);
//! let record = PlayerRecord::new("ash", IVec2::new(50, 50));
//! let instance = world.connect(ClientId::new(1), record, 0).unwrap();
//! world.ready(instance).unwrap();
//!
//! world
//!     .enqueue(instance, ClientMessage::MovementStep { position: IVec2::new(51, 50), timestamp: 250 })
//!     .unwrap();
//! world.tick(250);
//!
//! assert_eq!(world.player(instance).unwrap().position(), IVec2::new(51, 50));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cheat;
pub mod config;
pub mod contracts;
pub mod entity;
pub mod error;
pub mod movement;
pub mod region;
pub mod stats;
pub mod sync;
pub mod world;

#[cfg(test)]
mod tests;

pub use cheat::{CheatAlert, CheatReason, CheatTracker};
pub use config::WorldConfig;
pub use contracts::{DoorDescriptor, MapQuery, PlayerRecord};
pub use entity::{ClientId, InstanceId, Orientation, Player};
pub use error::SessionError;
pub use movement::{MovementEvent, MovementValidator};
pub use region::{RegionId, RegionIndex};
pub use stats::{DerivedStats, EffectFlags, Equipment, EquipmentSlot, Item, StatAggregator};
pub use sync::{Packet, PacketSink, QueueSink, SyncBroadcaster};
pub use world::{ClientMessage, World, WorldEvent};
