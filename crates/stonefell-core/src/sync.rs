//! Outbound packets and region-scoped fan-out.
//!
//! Packets are plain serde values; the transport layer owns framing and
//! delivery and sees them through the [`PacketSink`] contract. The world
//! writes into a [`QueueSink`] so packet production never blocks the tick;
//! the host drains each client's queue after the tick completes.
//!
//! [`SyncBroadcaster`] is the fan-out path: it resolves a region to the set
//! of clients observing it (deduplicated, so a client receives each packet
//! exactly once however its window overlaps) and delivers to every member.

use std::collections::{BTreeMap, VecDeque};

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::entity::{ClientId, InstanceId, Orientation};
use crate::region::{RegionId, RegionIndex};
use crate::stats::EquipmentSlot;

// =============================================================================
// Packets
// =============================================================================

/// Movement packet opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementOpcode {
    /// The entity advanced to a tile.
    Move,
    /// The entity's path ended.
    Stop,
}

/// Spawn payload describing one entity to a client.
///
/// The optional blocks are gated by [`crate::entity::SummaryFlags`] and
/// omitted from the wire entirely when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    /// World identity.
    pub instance: InstanceId,
    /// Display name.
    pub username: String,
    /// Tile position.
    pub position: IVec2,
    /// Facing direction.
    pub orientation: Orientation,
    /// Milliseconds per tile, so the client can animate at the right pace.
    pub movement_speed: u32,
    /// Worn equipment keys by slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<Vec<(EquipmentSlot, String)>>,
    /// Total experience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<u64>,
    /// Current and maximum mana.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mana: Option<(u32, u32)>,
}

/// An outbound packet.
///
/// The engine never inspects these after production; they are opaque to
/// everything past the [`PacketSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    /// An entity moved or stopped. `forced` marks a server-corrected
    /// position the client must apply even mid-path.
    Movement {
        /// Move or stop.
        opcode: MovementOpcode,
        /// Entity that moved.
        instance: InstanceId,
        /// Tile the entity now occupies.
        position: IVec2,
        /// Server override flag.
        forced: bool,
    },
    /// An entity was placed without a path (spawn correction, door, respawn).
    Teleport {
        /// Entity that was placed.
        instance: InstanceId,
        /// Destination tile.
        position: IVec2,
        /// Play the teleport animation.
        with_animation: bool,
    },
    /// An entity's movement speed changed; clients re-pace its animation.
    EffectSpeed {
        /// Entity whose speed changed.
        instance: InstanceId,
        /// New speed in milliseconds per tile.
        movement_speed: u32,
    },
    /// The client should discard cached state for these regions.
    RegionFlush {
        /// Regions to discard.
        regions: Vec<RegionId>,
    },
    /// Entities present in one region, sent when a client's window grows.
    EntityList {
        /// The region being populated.
        region: RegionId,
        /// Entities standing in it.
        entities: Vec<InstanceId>,
    },
    /// Full state for one entity entering the client's view.
    Spawn(EntitySummary),
    /// An entity left the world or the client's view.
    Despawn {
        /// Entity to remove.
        instance: InstanceId,
    },
    /// Human-readable notice for the client's chat log.
    Notification {
        /// Message text.
        message: String,
    },
}

// =============================================================================
// Transport contract
// =============================================================================

/// Transport-side packet consumer.
///
/// Implementations must not block: the world calls this inside the tick.
pub trait PacketSink {
    /// Delivers one packet to one client.
    fn deliver(&mut self, client: ClientId, packet: &Packet);
}

/// Per-client packet queues, the engine's bundled [`PacketSink`].
///
/// The world writes here during the tick; the host drains each connected
/// client afterwards and hands the packets to the real transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSink {
    queues: BTreeMap<ClientId, VecDeque<Packet>>,
}

impl QueueSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every packet queued for `client`, oldest first.
    pub fn drain(&mut self, client: ClientId) -> Vec<Packet> {
        self.queues
            .remove(&client)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Number of packets queued for `client`.
    #[must_use]
    pub fn queued(&self, client: ClientId) -> usize {
        self.queues.get(&client).map_or(0, VecDeque::len)
    }

    /// Drops the queue for a disconnected client.
    pub fn forget(&mut self, client: ClientId) {
        self.queues.remove(&client);
    }
}

impl PacketSink for QueueSink {
    fn deliver(&mut self, client: ClientId, packet: &Packet) {
        self.queues.entry(client).or_default().push_back(packet.clone());
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Region-scoped packet fan-out over a [`PacketSink`].
///
/// Borrows the region index and the sink for the duration of one burst of
/// sends; construct it fresh wherever fan-out is needed.
pub struct SyncBroadcaster<'a, S: PacketSink> {
    regions: &'a RegionIndex,
    sink: &'a mut S,
}

impl<'a, S: PacketSink> SyncBroadcaster<'a, S> {
    /// Creates a broadcaster over `regions` writing into `sink`.
    pub fn new(regions: &'a RegionIndex, sink: &'a mut S) -> Self {
        Self { regions, sink }
    }

    /// Delivers to a single client.
    pub fn send(&mut self, client: ClientId, packet: &Packet) {
        self.sink.deliver(client, packet);
    }

    /// Delivers once to every client whose observation window covers
    /// `region`.
    ///
    /// The observer set is a `BTreeSet`, so a client is reached exactly once
    /// no matter how its window overlaps the sender's surroundings.
    /// `exclude` suppresses delivery to the originating client.
    pub fn send_to_observers(
        &mut self,
        region: RegionId,
        packet: &Packet,
        exclude: Option<ClientId>,
    ) {
        for client in self.regions.observers_of(&[region]) {
            if Some(client) == exclude {
                continue;
            }
            self.sink.deliver(client, packet);
        }
    }

    /// Delivers once to every observer of the listed regions. Used for
    /// despawn teardown over an entity's recently-vacated regions.
    pub fn send_to_regions(&mut self, regions: &[RegionId], packet: &Packet) {
        for client in self.regions.observers_of(regions) {
            self.sink.deliver(client, packet);
        }
    }
}
