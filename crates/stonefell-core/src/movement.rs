//! Server-side movement validation.
//!
//! Clients drive their own movement and report it as a start / step / stop
//! stream; the server never pathfinds for them. Every report runs through
//! [`MovementValidator`], which checks it against the map, the entity's
//! derived speed and its timing history, then either applies it, applies it
//! while raising a cheat flag, or corrects the entity's position outright.
//!
//! The validator is stateless: it borrows the map contract and the config,
//! mutates the [`Player`] it is handed, and describes everything that
//! happened as [`MovementEvent`]s for the world loop to act on. Nothing in
//! here touches the region index or the packet queues.

use glam::IVec2;
use tracing::{debug, warn};

use crate::cheat::{CheatAlert, CheatReason};
use crate::config::WorldConfig;
use crate::contracts::{DoorDescriptor, MapQuery};
use crate::entity::{InstanceId, Orientation, Player};

/// What a validated movement report did.
///
/// Typed results instead of callbacks: the world loop matches on these to
/// update regions and fan out packets.
#[derive(Debug, Clone, PartialEq)]
pub enum MovementEvent {
    /// The position was accepted mid-path.
    Moved {
        /// The accepted tile.
        position: IVec2,
    },
    /// The position was accepted as the end of a path.
    Stopped {
        /// The accepted tile.
        position: IVec2,
    },
    /// Collision resolution restored the last accepted position. Clients
    /// must apply this even mid-path.
    RolledBack {
        /// The restored tile.
        position: IVec2,
    },
    /// Collision resolution had no usable history and forced a spawn
    /// placement.
    SentToSpawn {
        /// The spawn tile.
        position: IVec2,
    },
    /// User-visible notice for the offending client.
    Notice {
        /// Message text.
        message: String,
    },
    /// A cheat flag was raised and scored.
    Cheat(CheatAlert),
    /// Movement interrupts any in-progress skill action.
    SkillCancelled,
    /// Movement without a combat target disengages combat.
    CombatCancelled,
    /// The path ended on a door tile; the door collaborator takes over.
    DoorEntered {
        /// The door and its destination.
        door: DoorDescriptor,
    },
    /// The path ended on a ground item.
    ItemCollected {
        /// The item's world identity.
        item: InstanceId,
    },
}

/// What is standing on the tile a path ended on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileOccupant {
    /// A ground item; stopping on it collects it.
    Item(InstanceId),
    /// Another player; does not block doors.
    Player(InstanceId),
    /// A non-player character; blocks doors.
    Npc(InstanceId),
}

/// Stateless movement checks over one player.
pub struct MovementValidator<'a, M: MapQuery + ?Sized> {
    map: &'a M,
    config: &'a WorldConfig,
}

impl<'a, M: MapQuery + ?Sized> MovementValidator<'a, M> {
    /// Creates a validator over `map` with `config`.
    pub fn new(map: &'a M, config: &'a WorldConfig) -> Self {
        Self { map, config }
    }

    // =========================================================================
    // Report handlers
    // =========================================================================

    /// Pre-checks a path request before the client starts walking it.
    ///
    /// Silently dropped when the destination is a door, when a target is
    /// being followed (combat steering owns that path), or mid-combat. A
    /// reported origin drifting more than one tile from the server-side
    /// position raises the invalid-movement count and tells the client.
    pub fn handle_move_request(
        &self,
        player: &mut Player,
        origin: IVec2,
        destination: IVec2,
        target: Option<InstanceId>,
        following: bool,
    ) -> Vec<MovementEvent> {
        if self.map.is_door(destination) || (target.is_some() && following) {
            return Vec::new();
        }
        if player.combat_active {
            return Vec::new();
        }

        let drift = (origin - player.position()).abs().max_element();
        if drift > 1 {
            player.invalid_movement += 1;
            warn!(
                instance = %player.instance(),
                ?origin,
                actual = ?player.position(),
                count = player.invalid_movement,
                "movement request origin drifted"
            );
            return vec![MovementEvent::Notice {
                message: "Invalid movement detected.".to_owned(),
            }];
        }
        Vec::new()
    }

    /// Handles the start of a client-driven path.
    ///
    /// Records the start time and marks the entity as moving. A reported
    /// speed that disagrees with the server's derived value is scored as a
    /// cheat flag; the movement itself still proceeds at the server's pace.
    /// Starting to move always interrupts skills, and disengages combat when
    /// no target is held.
    pub fn handle_started(
        &self,
        player: &mut Player,
        position: IVec2,
        reported_speed: u32,
        target: Option<InstanceId>,
        now_ms: u64,
    ) -> Vec<MovementEvent> {
        let mut events = Vec::new();
        player.movement_start = now_ms;
        debug!(instance = %player.instance(), ?position, "movement started");

        let expected = player.movement_speed(self.config);
        if reported_speed != expected {
            if let Some(alert) = player.flag_cheat(
                CheatReason::SpeedMismatch { reported: reported_speed, expected },
                1,
            ) {
                events.push(MovementEvent::Cheat(alert));
            }
        }

        events.push(MovementEvent::SkillCancelled);
        if target.is_none() {
            events.push(MovementEvent::CombatCancelled);
        }

        player.moving = true;
        events
    }

    /// Handles one step along a path.
    ///
    /// Ignored entirely while stunned or frozen by accumulated drift flags.
    /// A timing violation raises a cheat flag but the position is still
    /// applied; silently refusing it would desynchronize an honest client
    /// behind a bad clock.
    pub fn handle_step(
        &self,
        player: &mut Player,
        position: IVec2,
        client_timestamp: u64,
        now_ms: u64,
    ) -> Vec<MovementEvent> {
        if player.stunned || player.is_frozen(self.config) {
            return Vec::new();
        }

        let mut events = Vec::new();
        if let Some(reason) = self.check_step_timing(player, position, client_timestamp, now_ms) {
            if let Some(alert) = player.flag_cheat(reason, 1) {
                events.push(MovementEvent::Cheat(alert));
            }
        }

        events.extend(self.apply_position(player, position));
        player.last_step = now_ms;
        events
    }

    /// Handles the end of a path.
    ///
    /// A stop with no preceding start is a protocol violation and scored.
    /// Orientation applies unconditionally, even when the stop position is
    /// rolled back. Stopping on an item collects it; stopping on a door with
    /// no blocking occupant hands over to the door collaborator.
    pub fn handle_stop(
        &self,
        player: &mut Player,
        position: IVec2,
        occupant: Option<TileOccupant>,
        orientation: Orientation,
        now_ms: u64,
    ) -> Vec<MovementEvent> {
        let mut events = Vec::new();

        if !player.moving {
            if let Some(alert) = player.flag_cheat(CheatReason::StopWithoutStart, 1) {
                events.push(MovementEvent::Cheat(alert));
            }
        }

        player.orientation = orientation;

        if let Some(TileOccupant::Item(item)) = occupant {
            events.push(MovementEvent::ItemCollected { item });
        }

        if !player.is_frozen(self.config) {
            for event in self.apply_position(player, position) {
                match event {
                    MovementEvent::Moved { position } => {
                        // an accepted stop clears the drift count
                        player.invalid_movement = 0;
                        events.push(MovementEvent::Stopped { position });
                    }
                    other => events.push(other),
                }
            }
        }

        let door_blocked = matches!(occupant, Some(TileOccupant::Npc(_) | TileOccupant::Item(_)));
        if !door_blocked && player.position() == position {
            if let Some(door) = self.map.door_at(position) {
                events.push(MovementEvent::DoorEntered { door });
            }
        }

        player.moving = false;
        player.last_movement = now_ms;
        events
    }

    // =========================================================================
    // Checks
    // =========================================================================

    /// Applies a reported position, resolving collisions.
    ///
    /// Dead entities are left untouched. A collision with no usable position
    /// history (sentinel, or previous equal to current) forces a spawn
    /// placement; with history, the entity rolls back and the client is
    /// told. Acceptance is the only path that advances the history.
    pub fn apply_position(&self, player: &mut Player, position: IVec2) -> Vec<MovementEvent> {
        if player.dead {
            return Vec::new();
        }

        if self.map.is_colliding(position) && !player.noclip {
            warn!(
                instance = %player.instance(),
                ?position,
                previous = ?player.previous_position(),
                "collision at reported position"
            );
            if player.history_degenerate() {
                let spawn = self.config.session.spawn_point;
                player.force_position(spawn);
                return vec![MovementEvent::SentToSpawn { position: spawn }];
            }
            let restored = player.rollback_position();
            return vec![
                MovementEvent::Notice {
                    message: "Noclip detected, your position has been reverted.".to_owned(),
                },
                MovementEvent::RolledBack { position: restored },
            ];
        }

        player.accept_position(position);
        vec![MovementEvent::Moved { position }]
    }

    /// Step-timing check. Returns the violation, or `None` when the step is
    /// plausible.
    ///
    /// The observed interval gets a latency margin before comparison against
    /// the derived speed. Three exemptions apply, in order: the asymmetric
    /// double-delivery tolerance (client timestamp far behind the server
    /// while the interval is tiny means a duplicated packet, not speed), the
    /// region-change grace window, and door tiles (door traversal teleports,
    /// which legitimately breaks the cadence).
    fn check_step_timing(
        &self,
        player: &mut Player,
        position: IVec2,
        client_timestamp: u64,
        now_ms: u64,
    ) -> Option<CheatReason> {
        let movement = &self.config.movement;
        let expected = u64::from(player.movement_speed(self.config));
        let interval = now_ms.saturating_sub(player.last_step) + movement.step_margin_ms;
        let skew = now_ms.saturating_sub(client_timestamp);

        if skew > movement.double_delivery_ms && interval < movement.double_delivery_ms {
            debug!(instance = %player.instance(), skew, interval, "duplicate step tolerated");
            return None;
        }
        if interval >= expected {
            return None;
        }
        if now_ms.saturating_sub(player.last_region_change) < movement.region_grace_ms {
            return None;
        }
        if self.map.is_door(position) {
            return None;
        }
        Some(CheatReason::StepTooFast { interval_ms: interval, expected_ms: expected })
    }
}
