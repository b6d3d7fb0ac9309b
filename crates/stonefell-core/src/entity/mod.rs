//! Entity identity and shared spatial state.
//!
//! This module provides the identifier and orientation types used throughout
//! the engine:
//! - [`InstanceId`]: Unique identifier for an entity living in the world
//! - [`ClientId`]: Identifier for a connected client endpoint
//! - [`Orientation`]: Four-way facing direction
//! - [`INVALID_POSITION`]: Sentinel for a not-yet-validated previous position
//!
//! # Ordering
//!
//! Both id types are ordered by their numeric value. All world collections are
//! keyed on them with `BTreeMap`/`BTreeSet`, which keeps iteration order
//! deterministic across ticks and platforms.
//!
//! # Example
//!
//! ```
//! use stonefell_core::entity::{InstanceId, ClientId, Orientation};
//!
//! let instance = InstanceId::new(7);
//! let client = ClientId::new(7);
//!
//! assert_eq!(instance.as_u64(), client.as_u64());
//! assert_eq!(Orientation::default(), Orientation::Down);
//! ```

pub mod player;

use glam::IVec2;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use player::{Player, SummaryFlags};

/// Sentinel marking a previous position that has never been validated.
///
/// A freshly connected or freshly teleported entity has no accepted movement
/// history, so collision resolution cannot roll it back; it is sent to the
/// spawn point instead.
pub const INVALID_POSITION: IVec2 = IVec2::new(-1, -1);

/// Unique identifier for an entity in the world.
///
/// `InstanceId` is a newtype wrapper around `u64`. Instance ids are assigned
/// by the world when an entity enters it and are never reused within a world's
/// lifetime. Players, ground items and any future server-driven actors all
/// share the same id space.
///
/// # Example
///
/// ```
/// use stonefell_core::entity::InstanceId;
///
/// let id1 = InstanceId::new(1);
/// let id2 = InstanceId::new(2);
///
/// assert!(id1 < id2);
/// assert_eq!(id1.as_u64(), 1);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Creates a new `InstanceId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for InstanceId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<InstanceId> for u64 {
    fn from(id: InstanceId) -> Self {
        id.0
    }
}

/// Identifier for a connected client endpoint.
///
/// Kept distinct from [`InstanceId`] so that transport-facing code (observer
/// sets, packet queues) cannot be confused with world-facing code (occupant
/// sets, entity lookups). A player session owns exactly one of each.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(u64);

impl ClientId {
    /// Creates a new `ClientId` from a raw `u64` value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw `u64` value of this identifier.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ClientId {
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

impl From<ClientId> for u64 {
    fn from(id: ClientId) -> Self {
        id.0
    }
}

/// Four-way facing direction of an entity on the tile grid.
///
/// Orientation is reported by the client on movement stop and applied
/// unconditionally, even when the stop position itself is rolled back.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    /// Facing negative y.
    Up,
    /// Facing positive y. The default for a freshly spawned entity.
    #[default]
    Down,
    /// Facing negative x.
    Left,
    /// Facing positive x.
    Right,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "Up"),
            Self::Down => write!(f, "Down"),
            Self::Left => write!(f, "Left"),
            Self::Right => write!(f, "Right"),
        }
    }
}
