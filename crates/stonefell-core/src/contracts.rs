//! Contracts with external collaborators.
//!
//! The engine owns movement, regions and session state; everything else is
//! behind an interface. Map data arrives through [`MapQuery`], persistence
//! exchanges [`PlayerRecord`] values at session boundaries, and the transport
//! contract ([`crate::sync::PacketSink`]) lives next to the packet types.

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::entity::Orientation;
use crate::stats::{EquipmentSlot, Item};

/// A door tile and where it leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorDescriptor {
    /// Tile the door occupies.
    pub position: IVec2,
    /// Tile the door teleports to.
    pub destination: IVec2,
    /// Facing applied after passing through.
    pub orientation: Orientation,
}

/// Read-only map queries the validator depends on.
///
/// Implementations are expected to be cheap; the validator calls these on
/// every step. The engine never mutates map data.
pub trait MapQuery {
    /// Whether `position` is blocked for normal movement.
    fn is_colliding(&self, position: IVec2) -> bool;

    /// Whether `position` is a door tile.
    fn is_door(&self, position: IVec2) -> bool;

    /// The door at `position`, if any.
    fn door_at(&self, position: IVec2) -> Option<DoorDescriptor>;
}

/// Persisted player state, exchanged with the persistence collaborator.
///
/// [`crate::world::World::connect`] consumes one of these;
/// [`crate::world::World::disconnect`] produces the snapshot to save.
/// Volatile session state (cheat score, region membership, movement
/// timestamps) is deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Account name.
    pub username: String,
    /// Last saved tile position.
    pub position: IVec2,
    /// Last saved facing.
    pub orientation: Orientation,
    /// Worn equipment by slot.
    pub equipment: Vec<(EquipmentSlot, Item)>,
    /// Server timestamp at which an active ban expires; 0 when unbanned.
    pub ban_until_ms: u64,
    /// Total accumulated experience.
    pub experience: u64,
    /// Current mana.
    pub mana: u32,
    /// Mana ceiling.
    pub max_mana: u32,
}

impl PlayerRecord {
    /// Creates a fresh record for a new account at the given position.
    #[must_use]
    pub fn new(username: impl Into<String>, position: IVec2) -> Self {
        Self {
            username: username.into(),
            position,
            orientation: Orientation::default(),
            equipment: Vec::new(),
            ban_until_ms: 0,
            experience: 0,
            mana: 100,
            max_mana: 100,
        }
    }
}
