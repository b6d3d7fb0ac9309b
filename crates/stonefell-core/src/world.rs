//! The world simulation loop.
//!
//! A [`World`] owns every player session, the region index, the ground
//! items and the outbound packet queues. All mutation happens inside
//! [`World::tick`] or through the explicit mutators; the host calls them
//! from a single thread and passes the server clock in as `now_ms`, so a
//! given message sequence always produces the same state.
//!
//! Inbound client messages are buffered per connection and drained in
//! instance order at the tick boundary. Handlers run to completion; nothing
//! in the engine suspends mid-message.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use glam::IVec2;
use tracing::{debug, info, warn};

use crate::cheat::CheatAlert;
use crate::config::WorldConfig;
use crate::contracts::{DoorDescriptor, MapQuery, PlayerRecord};
use crate::entity::{ClientId, InstanceId, Orientation, Player, SummaryFlags};
use crate::error::SessionError;
use crate::movement::{MovementEvent, MovementValidator, TileOccupant};
use crate::region::{RegionId, RegionIndex};
use crate::stats::{EffectFlags, EquipmentSlot, Item};
use crate::sync::{MovementOpcode, Packet, PacketSink, QueueSink, SyncBroadcaster};

/// One buffered message from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// The client finished loading and is ready to play.
    Ready,
    /// The client wants to walk a path.
    MoveRequest {
        /// Where the client believes it currently stands.
        origin: IVec2,
        /// Requested destination tile.
        destination: IVec2,
        /// Entity being targeted, if any.
        target: Option<InstanceId>,
        /// Whether the path follows the target.
        following: bool,
    },
    /// The client started walking.
    MovementStarted {
        /// First tile of the path.
        position: IVec2,
        /// Movement speed the client claims, in milliseconds per tile.
        speed: u32,
        /// Entity being targeted, if any.
        target: Option<InstanceId>,
    },
    /// The client advanced one tile.
    MovementStep {
        /// The tile stepped onto.
        position: IVec2,
        /// Client-side timestamp of the step.
        timestamp: u64,
    },
    /// The client's path ended.
    MovementStop {
        /// Final tile.
        position: IVec2,
        /// Entity being targeted, if any.
        target: Option<InstanceId>,
        /// Facing at the end of the path.
        orientation: Orientation,
    },
}

/// Typed notifications for the collaborators outside this engine.
///
/// Drained by the host after each tick; the engine never calls out.
#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    /// An entity stopped on a door; the door collaborator decides where it
    /// goes (usually back through [`World::teleport`]).
    DoorEntered {
        /// Entity that entered.
        instance: InstanceId,
        /// The door and its destination.
        door: DoorDescriptor,
    },
    /// An entity collected a ground item.
    ItemCollected {
        /// Entity that collected.
        instance: InstanceId,
        /// The collected item.
        item: InstanceId,
    },
    /// Movement interrupted an in-progress skill action.
    SkillCancelled {
        /// Entity whose skill was interrupted.
        instance: InstanceId,
    },
    /// Movement without a target disengaged combat.
    CombatCancelled {
        /// Entity that disengaged.
        instance: InstanceId,
    },
    /// A cheat flag was scored; moderation tooling inspects these.
    Cheat(CheatAlert),
    /// An entity crossed a region boundary.
    RegionChanged {
        /// Entity that moved.
        instance: InstanceId,
        /// Region it left, if any.
        from: Option<RegionId>,
        /// Region it now occupies.
        to: RegionId,
    },
    /// A session was terminated by the engine.
    SessionClosed {
        /// The affected client.
        client: ClientId,
        /// Why it was closed.
        reason: SessionError,
    },
}

/// The authoritative world state.
///
/// Generic over the map contract only; packets always go through the
/// bundled [`QueueSink`], which the host drains per client after the tick.
pub struct World<M: MapQuery> {
    config: WorldConfig,
    map: M,
    regions: RegionIndex,
    players: BTreeMap<InstanceId, Player>,
    clients: BTreeMap<ClientId, InstanceId>,
    items: BTreeMap<InstanceId, IVec2>,
    inboxes: BTreeMap<InstanceId, VecDeque<ClientMessage>>,
    outbox: QueueSink,
    events: Vec<WorldEvent>,
    next_instance: u64,
    now_ms: u64,
}

impl<M: MapQuery> World<M> {
    /// Creates an empty world over `map`.
    #[must_use]
    pub fn new(config: WorldConfig, map: M) -> Self {
        let regions = RegionIndex::new(&config.region);
        Self {
            config,
            map,
            regions,
            players: BTreeMap::new(),
            clients: BTreeMap::new(),
            items: BTreeMap::new(),
            inboxes: BTreeMap::new(),
            outbox: QueueSink::new(),
            events: Vec::new(),
            next_instance: 1,
            now_ms: 0,
        }
    }

    /// The configuration this world runs with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Server time of the last tick.
    #[must_use]
    pub const fn now_ms(&self) -> u64 {
        self.now_ms
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Admits a loaded player into the world.
    ///
    /// Rejects banned accounts and already-bound clients. On success the
    /// entity occupies its persisted position (spawn, if that position is
    /// off the grid), observes its window, and must acknowledge readiness
    /// before the login deadline or the session is closed at a later tick.
    ///
    /// # Errors
    ///
    /// [`SessionError::Banned`] when the record carries an active ban,
    /// [`SessionError::AlreadyConnected`] when `client` is already bound.
    pub fn connect(
        &mut self,
        client: ClientId,
        record: PlayerRecord,
        now_ms: u64,
    ) -> Result<InstanceId, SessionError> {
        if self.clients.contains_key(&client) {
            return Err(SessionError::AlreadyConnected(client));
        }
        if record.ban_until_ms > now_ms {
            warn!(%client, username = %record.username, until = record.ban_until_ms, "banned account refused");
            return Err(SessionError::Banned { until_ms: record.ban_until_ms });
        }

        self.now_ms = self.now_ms.max(now_ms);
        let instance = InstanceId::new(self.next_instance);
        self.next_instance += 1;

        let mut player = Player::from_record(instance, client, record);
        player.ready_deadline = now_ms + self.config.session.login_timeout_ms;
        if self.regions.region_at(player.position()).is_none() {
            warn!(%instance, position = ?player.position(), "persisted position off the grid, sent to spawn");
            player.force_position(self.config.session.spawn_point);
        }
        info!(%instance, %client, username = %player.username(), "player connected");

        self.update_region(&mut player);
        self.players.insert(instance, player);
        self.clients.insert(client, instance);
        self.inboxes.insert(instance, VecDeque::new());
        Ok(instance)
    }

    /// Records the client's readiness acknowledgement.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn ready(&mut self, instance: InstanceId) -> Result<(), SessionError> {
        let player = self
            .players
            .get_mut(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        player.ready = true;
        Ok(())
    }

    /// Buffers a client message for the next tick.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn enqueue(
        &mut self,
        instance: InstanceId,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        self.inboxes
            .get_mut(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?
            .push_back(message);
        Ok(())
    }

    /// Removes a player, returning the record to persist.
    ///
    /// The entity leaves every occupant and observer set; observers that
    /// could still see it (current window plus recently-vacated regions)
    /// receive a despawn.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn disconnect(&mut self, instance: InstanceId) -> Result<PlayerRecord, SessionError> {
        let player = self
            .players
            .remove(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        info!(%instance, username = %player.username(), "player disconnected");

        self.teardown(&player);
        self.regions.remove_client(player.client());
        self.clients.remove(&player.client());
        self.inboxes.remove(&instance);
        self.outbox.forget(player.client());
        Ok(player.to_record())
    }

    /// Advances the world to `now_ms`, enforcing login deadlines and
    /// draining every inbox in instance order.
    pub fn tick(&mut self, now_ms: u64) {
        self.now_ms = now_ms;

        let expired: Vec<InstanceId> = self
            .players
            .values()
            .filter(|player| !player.ready && player.ready_deadline <= now_ms)
            .map(Player::instance)
            .collect();
        for instance in expired {
            let Some(client) = self.players.get(&instance).map(Player::client) else {
                continue;
            };
            if let Ok(record) = self.disconnect(instance) {
                debug!(%instance, username = %record.username, "login deadline missed");
                self.events.push(WorldEvent::SessionClosed {
                    client,
                    reason: SessionError::LoginTimeout,
                });
            }
        }

        let instances: Vec<InstanceId> = self.inboxes.keys().copied().collect();
        for instance in instances {
            let Some(queue) = self.inboxes.get_mut(&instance) else {
                continue;
            };
            let messages = std::mem::take(queue);
            for message in messages {
                self.dispatch(instance, message);
            }
        }
    }

    // =========================================================================
    // Mutators for the host and collaborators
    // =========================================================================

    /// Equips an item, invalidating the stat cache. When the derived
    /// movement speed changes, every observer (the wearer included) is told
    /// to re-pace the entity's animation.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn equip(
        &mut self,
        instance: InstanceId,
        slot: EquipmentSlot,
        item: Item,
    ) -> Result<Option<Item>, SessionError> {
        self.with_stat_change(instance, |player| player.equip(slot, item))
    }

    /// Removes the item in `slot`, with the same speed propagation as
    /// [`World::equip`].
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn unequip(
        &mut self,
        instance: InstanceId,
        slot: EquipmentSlot,
    ) -> Result<Option<Item>, SessionError> {
        self.with_stat_change(instance, |player| player.unequip(slot))
    }

    /// Toggles a status effect. Returns whether anything changed; speed
    /// changes propagate as in [`World::equip`].
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn set_effect(
        &mut self,
        instance: InstanceId,
        effect: EffectFlags,
        active: bool,
    ) -> Result<bool, SessionError> {
        self.with_stat_change(instance, |player| player.set_effect(effect, active))
    }

    /// Places an entity somewhere else without a walked path.
    ///
    /// Used by the door collaborator and administrative tooling. The
    /// destination still goes through collision resolution; teleporting
    /// disengages combat.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn teleport(
        &mut self,
        instance: InstanceId,
        position: IVec2,
        with_animation: bool,
    ) -> Result<(), SessionError> {
        let mut player = self
            .players
            .remove(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        player.combat_active = false;

        let validator = MovementValidator::new(&self.map, &self.config);
        let events = validator.apply_position(&mut player, position);
        for event in events {
            match event {
                MovementEvent::Moved { position } => {
                    self.update_region(&mut player);
                    self.broadcast_surrounding(
                        &player,
                        &Packet::Teleport { instance, position, with_animation },
                        None,
                    );
                }
                other => self.apply_event(&mut player, other),
            }
        }
        self.players.insert(instance, player);
        Ok(())
    }

    /// Marks an entity dead and removes it from view. The session stays
    /// alive awaiting [`World::respawn`].
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn kill(&mut self, instance: InstanceId) -> Result<(), SessionError> {
        let mut player = self
            .players
            .remove(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        player.dead = true;
        player.moving = false;
        player.combat_active = false;
        self.teardown(&player);
        // the window re-forms on respawn
        self.regions.remove_client(player.client());
        player.clear_regions();
        self.players.insert(instance, player);
        Ok(())
    }

    /// Revives a dead entity at the spawn point and re-enters it into the
    /// region system.
    ///
    /// # Errors
    ///
    /// [`SessionError::UnknownInstance`] when `instance` is not a live player.
    pub fn respawn(&mut self, instance: InstanceId) -> Result<(), SessionError> {
        let mut player = self
            .players
            .remove(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        if !player.dead {
            warn!(%instance, "respawn requested while alive");
            self.players.insert(instance, player);
            return Ok(());
        }
        player.dead = false;
        player.mana = player.max_mana;
        player.force_position(self.config.session.spawn_point);
        self.update_region(&mut player);
        let position = player.position();
        self.send_to(
            player.client(),
            &Packet::Teleport { instance, position, with_animation: true },
        );
        self.players.insert(instance, player);
        Ok(())
    }

    /// Drops a ground item into the world.
    ///
    /// Observers of the item's region learn about it through an incremental
    /// entity list for that region.
    pub fn spawn_item(&mut self, position: IVec2) -> Option<InstanceId> {
        let region = self.regions.region_at(position)?;
        let instance = InstanceId::new(self.next_instance);
        self.next_instance += 1;
        self.items.insert(instance, position);
        self.regions.insert_occupant(instance, region);

        let packet = Packet::EntityList { region, entities: vec![instance] };
        let mut broadcaster = SyncBroadcaster::new(&self.regions, &mut self.outbox);
        broadcaster.send_to_observers(region, &packet, None);
        Some(instance)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// A live player, if `instance` names one.
    #[must_use]
    pub fn player(&self, instance: InstanceId) -> Option<&Player> {
        self.players.get(&instance)
    }

    /// Mutable access to a live player, for the host's own collaborators
    /// (combat, status effects, moderation).
    pub fn player_mut(&mut self, instance: InstanceId) -> Option<&mut Player> {
        self.players.get_mut(&instance)
    }

    /// The region index, for read-only inspection.
    #[must_use]
    pub const fn regions(&self) -> &RegionIndex {
        &self.regions
    }

    /// Ground item positions.
    #[must_use]
    pub fn item(&self, instance: InstanceId) -> Option<IVec2> {
        self.items.get(&instance).copied()
    }

    /// Takes every packet queued for `client`, oldest first.
    pub fn drain_packets(&mut self, client: ClientId) -> Vec<Packet> {
        self.outbox.drain(client)
    }

    /// Takes the events accumulated since the last drain.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Message dispatch
    // =========================================================================

    fn dispatch(&mut self, instance: InstanceId, message: ClientMessage) {
        if message == ClientMessage::Ready {
            if let Some(player) = self.players.get_mut(&instance) {
                player.ready = true;
            }
            return;
        }

        let occupant = match &message {
            ClientMessage::MovementStop { position, target, .. } => {
                self.occupant_at(*position, *target, instance)
            }
            _ => None,
        };

        let Some(mut player) = self.players.remove(&instance) else {
            return;
        };
        let validator = MovementValidator::new(&self.map, &self.config);
        let events = match message {
            ClientMessage::Ready => Vec::new(),
            ClientMessage::MoveRequest { origin, destination, target, following } => {
                validator.handle_move_request(&mut player, origin, destination, target, following)
            }
            ClientMessage::MovementStarted { position, speed, target } => {
                validator.handle_started(&mut player, position, speed, target, self.now_ms)
            }
            ClientMessage::MovementStep { position, timestamp } => {
                validator.handle_step(&mut player, position, timestamp, self.now_ms)
            }
            ClientMessage::MovementStop { position, target: _, orientation } => {
                validator.handle_stop(&mut player, position, occupant, orientation, self.now_ms)
            }
        };

        for event in events {
            self.apply_event(&mut player, event);
        }
        self.players.insert(instance, player);
    }

    /// Resolves what stands on a stop tile: ground items win, then the
    /// reported target (a live player does not block doors, anything else
    /// does).
    fn occupant_at(
        &self,
        position: IVec2,
        target: Option<InstanceId>,
        except: InstanceId,
    ) -> Option<TileOccupant> {
        for (item, item_position) in &self.items {
            if *item_position == position {
                return Some(TileOccupant::Item(*item));
            }
        }
        let target = target.filter(|target| *target != except)?;
        if self.players.contains_key(&target) {
            Some(TileOccupant::Player(target))
        } else {
            Some(TileOccupant::Npc(target))
        }
    }

    fn apply_event(&mut self, player: &mut Player, event: MovementEvent) {
        let instance = player.instance();
        match event {
            MovementEvent::Moved { position } => {
                self.update_region(player);
                self.broadcast_surrounding(
                    player,
                    &Packet::Movement {
                        opcode: MovementOpcode::Move,
                        instance,
                        position,
                        forced: false,
                    },
                    Some(player.client()),
                );
            }
            MovementEvent::Stopped { position } => {
                self.update_region(player);
                self.broadcast_surrounding(
                    player,
                    &Packet::Movement {
                        opcode: MovementOpcode::Stop,
                        instance,
                        position,
                        forced: false,
                    },
                    Some(player.client()),
                );
            }
            MovementEvent::RolledBack { position } => {
                self.update_region(player);
                // the offender must apply the correction too
                self.broadcast_surrounding(
                    player,
                    &Packet::Movement {
                        opcode: MovementOpcode::Move,
                        instance,
                        position,
                        forced: true,
                    },
                    None,
                );
            }
            MovementEvent::SentToSpawn { position } => {
                self.update_region(player);
                self.broadcast_surrounding(
                    player,
                    &Packet::Teleport { instance, position, with_animation: false },
                    None,
                );
            }
            MovementEvent::Notice { message } => {
                self.send_to(player.client(), &Packet::Notification { message });
            }
            MovementEvent::Cheat(alert) => {
                self.events.push(WorldEvent::Cheat(alert));
            }
            MovementEvent::SkillCancelled => {
                self.events.push(WorldEvent::SkillCancelled { instance });
            }
            MovementEvent::CombatCancelled => {
                player.combat_active = false;
                self.events.push(WorldEvent::CombatCancelled { instance });
            }
            MovementEvent::DoorEntered { door } => {
                self.events.push(WorldEvent::DoorEntered { instance, door });
            }
            MovementEvent::ItemCollected { item } => {
                self.collect_item(player, item);
            }
        }
    }

    fn collect_item(&mut self, player: &Player, item: InstanceId) {
        let Some(position) = self.items.remove(&item) else {
            return;
        };
        self.regions.remove_instance(item);
        if let Some(region) = self.regions.region_at(position) {
            let packet = Packet::Despawn { instance: item };
            let mut broadcaster = SyncBroadcaster::new(&self.regions, &mut self.outbox);
            broadcaster.send_to_observers(region, &packet, None);
        }
        self.events.push(WorldEvent::ItemCollected { instance: player.instance(), item });
    }

    // =========================================================================
    // Region bookkeeping
    // =========================================================================

    /// Re-derives the entity's region from its position and, when it
    /// changed, shifts occupancy, re-aims the client's observation window,
    /// and exchanges spawn/despawn state with the observers gained and lost.
    fn update_region(&mut self, player: &mut Player) {
        let Some(to) = self.regions.region_at(player.position()) else {
            return;
        };
        let from = player.region();
        if from == Some(to) {
            return;
        }

        let instance = player.instance();
        let client = player.client();
        let old_observers = match from {
            Some(from) => self.regions.observers_of(&[from]),
            None => BTreeSet::new(),
        };

        let shift = self.regions.shift(instance, from, to);
        for region in &shift.vacated {
            self.regions.unobserve(client, *region);
        }
        for region in &shift.entered {
            self.regions.observe(client, *region);
        }
        player.set_region(to, &shift.vacated, self.config.region.recent_regions_cap);
        player.last_region_change = self.now_ms;
        debug!(%instance, ?from, %to, "region changed");

        // the client discards what it cached for regions it no longer sees,
        // then learns who stands in the regions it gained
        if !shift.vacated.is_empty() {
            self.send_to(client, &Packet::RegionFlush { regions: shift.vacated.clone() });
        }
        for region in &shift.entered {
            let entities: Vec<InstanceId> = self
                .regions
                .occupants_of(*region)
                .into_iter()
                .filter(|occupant| *occupant != instance)
                .collect();
            if !entities.is_empty() {
                self.send_to(client, &Packet::EntityList { region: *region, entities });
            }
        }

        // observers gained see a spawn, observers lost see a despawn
        let new_observers = self.regions.observers_of(&[to]);
        let summary = player.summarize(
            SummaryFlags { equipment: true, experience: false, mana: false },
            &self.config,
        );
        let spawn = Packet::Spawn(summary);
        for observer in new_observers.difference(&old_observers) {
            if *observer != client {
                self.outbox.deliver(*observer, &spawn);
            }
        }
        let despawn = Packet::Despawn { instance };
        for observer in old_observers.difference(&new_observers) {
            if *observer != client {
                self.outbox.deliver(*observer, &despawn);
            }
        }

        self.events.push(WorldEvent::RegionChanged { instance, from, to });
    }

    /// Despawns an entity from everyone who could still see it: the current
    /// window plus the recently-vacated regions.
    fn teardown(&mut self, player: &Player) {
        self.regions.remove_instance(player.instance());
        let mut targets = player.recent_regions();
        if let Some(region) = player.region() {
            targets.push(region);
        }
        let packet = Packet::Despawn { instance: player.instance() };
        let mut broadcaster = SyncBroadcaster::new(&self.regions, &mut self.outbox);
        broadcaster.send_to_regions(&targets, &packet);
    }

    // =========================================================================
    // Packet helpers
    // =========================================================================

    fn send_to(&mut self, client: ClientId, packet: &Packet) {
        self.outbox.deliver(client, packet);
    }

    fn broadcast_surrounding(
        &mut self,
        player: &Player,
        packet: &Packet,
        exclude: Option<ClientId>,
    ) {
        let Some(region) = player.region() else {
            return;
        };
        let mut broadcaster = SyncBroadcaster::new(&self.regions, &mut self.outbox);
        broadcaster.send_to_observers(region, packet, exclude);
    }

    /// Runs a stat-affecting mutation and, when the derived movement speed
    /// changed, broadcasts the new pace to every observer including the
    /// entity's own client.
    fn with_stat_change<T>(
        &mut self,
        instance: InstanceId,
        mutate: impl FnOnce(&mut Player) -> T,
    ) -> Result<T, SessionError> {
        let mut player = self
            .players
            .remove(&instance)
            .ok_or(SessionError::UnknownInstance(instance))?;
        let before = player.movement_speed(&self.config);
        let result = mutate(&mut player);
        let after = player.movement_speed(&self.config);
        if before != after {
            self.broadcast_surrounding(
                &player,
                &Packet::EffectSpeed { instance, movement_speed: after },
                None,
            );
        }
        self.players.insert(instance, player);
        Ok(result)
    }
}
