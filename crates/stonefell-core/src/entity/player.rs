//! Per-session player state.
//!
//! [`Player`] is the authoritative record for one connected session: where
//! the entity is, what it wears, what effects it carries, and the movement
//! bookkeeping the validator reads and writes. Fields whose updates carry an
//! invariant (position history, equipment, effects, region membership) are
//! private behind methods; plain flags and timestamps are public.
//!
//! # Position history
//!
//! `previous_position` advances only when a position is *accepted*. A
//! rollback restores the current position from it without touching it, and a
//! forced placement (spawn, teleport) sets both to the same tile so a
//! degenerate history can never ping-pong.

use std::collections::VecDeque;

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::cheat::{CheatAlert, CheatReason, CheatTracker};
use crate::config::WorldConfig;
use crate::contracts::PlayerRecord;
use crate::entity::{ClientId, InstanceId, Orientation, INVALID_POSITION};
use crate::region::RegionId;
use crate::stats::{
    DerivedStats, EffectFlags, Equipment, EquipmentSlot, Item, StatAggregator,
};
use crate::sync::EntitySummary;

/// Which optional blocks a serialized entity summary carries.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SummaryFlags {
    /// Include worn equipment keys.
    pub equipment: bool,
    /// Include total experience.
    pub experience: bool,
    /// Include current and maximum mana.
    pub mana: bool,
}

/// Authoritative state for one player session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    instance: InstanceId,
    client: ClientId,
    username: String,

    position: IVec2,
    previous_position: IVec2,
    /// Facing direction, applied unconditionally on movement stop.
    pub orientation: Orientation,

    region: Option<RegionId>,
    recent_regions: VecDeque<RegionId>,

    equipment: Equipment,
    effects: EffectFlags,
    #[serde(skip)]
    derived: Option<DerivedStats>,

    cheat: CheatTracker,
    /// Count of no-clip drift flags; past the configured threshold the
    /// entity's steps are ignored.
    pub invalid_movement: u32,

    /// A movement-start has been received without a matching stop.
    pub moving: bool,
    /// Movement input is suppressed entirely.
    pub stunned: bool,
    /// Awaiting respawn; all movement is ignored.
    pub dead: bool,
    /// Collision checks are bypassed (administrative).
    pub noclip: bool,
    /// In active combat; cheat flags are swallowed.
    pub combat_active: bool,

    /// Server timestamp of the last movement-start.
    pub movement_start: u64,
    /// Server timestamp of the last movement step.
    pub last_step: u64,
    /// Server timestamp of the last movement stop.
    pub last_movement: u64,
    /// Server timestamp of the last region change.
    pub last_region_change: u64,

    /// Client has acknowledged readiness.
    pub ready: bool,
    /// Server timestamp by which readiness must arrive.
    pub ready_deadline: u64,
    ban_until: u64,

    /// Total accumulated experience.
    pub experience: u64,
    /// Current mana.
    pub mana: u32,
    /// Mana ceiling.
    pub max_mana: u32,
}

impl Player {
    /// Builds session state from a persisted record.
    ///
    /// The previous position starts at the invalid sentinel: the loaded
    /// position has no accepted movement history, so the first collision
    /// anomaly resolves to spawn rather than a rollback.
    #[must_use]
    pub fn from_record(instance: InstanceId, client: ClientId, record: PlayerRecord) -> Self {
        let mut equipment = Equipment::new();
        for (slot, item) in record.equipment {
            equipment.equip(slot, item);
        }
        Self {
            instance,
            client,
            username: record.username,
            position: record.position,
            previous_position: INVALID_POSITION,
            orientation: record.orientation,
            region: None,
            recent_regions: VecDeque::new(),
            equipment,
            effects: EffectFlags::empty(),
            derived: None,
            cheat: CheatTracker::new(),
            invalid_movement: 0,
            moving: false,
            stunned: false,
            dead: false,
            noclip: false,
            combat_active: false,
            movement_start: 0,
            last_step: 0,
            last_movement: 0,
            last_region_change: 0,
            ready: false,
            ready_deadline: 0,
            ban_until: record.ban_until_ms,
            experience: record.experience,
            mana: record.mana,
            max_mana: record.max_mana,
        }
    }

    /// Snapshot for the persistence collaborator.
    #[must_use]
    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            username: self.username.clone(),
            position: self.position,
            orientation: self.orientation,
            equipment: self
                .equipment
                .iter()
                .map(|(slot, item)| (slot, item.clone()))
                .collect(),
            ban_until_ms: self.ban_until,
            experience: self.experience,
            mana: self.mana,
            max_mana: self.max_mana,
        }
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// World-side identity.
    #[must_use]
    pub const fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Transport-side identity.
    #[must_use]
    pub const fn client(&self) -> ClientId {
        self.client
    }

    /// Account name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the account carries a ban active at `now_ms`.
    #[must_use]
    pub const fn is_banned(&self, now_ms: u64) -> bool {
        self.ban_until > now_ms
    }

    // =========================================================================
    // Position history
    // =========================================================================

    /// Current tile position.
    #[must_use]
    pub const fn position(&self) -> IVec2 {
        self.position
    }

    /// Last accepted position, or the invalid sentinel.
    #[must_use]
    pub const fn previous_position(&self) -> IVec2 {
        self.previous_position
    }

    /// Accepts a validated position: the history advances.
    pub fn accept_position(&mut self, position: IVec2) {
        self.previous_position = self.position;
        self.position = position;
    }

    /// Restores the current position from the last accepted one. The history
    /// itself does not move.
    pub fn rollback_position(&mut self) -> IVec2 {
        self.position = self.previous_position;
        self.position
    }

    /// Places the entity without history: both current and previous position
    /// point at `position`. Used for spawn placement and teleports.
    pub fn force_position(&mut self, position: IVec2) {
        self.position = position;
        self.previous_position = position;
    }

    /// Whether the position history is unusable for a rollback.
    #[must_use]
    pub fn history_degenerate(&self) -> bool {
        self.previous_position == INVALID_POSITION || self.previous_position == self.position
    }

    // =========================================================================
    // Region membership
    // =========================================================================

    /// Region the entity currently occupies.
    #[must_use]
    pub const fn region(&self) -> Option<RegionId> {
        self.region
    }

    /// Records a region change, pushing the freshly vacated regions onto the
    /// bounded most-recent-first list.
    pub fn set_region(&mut self, region: RegionId, vacated: &[RegionId], cap: usize) {
        self.region = Some(region);
        for vacated in vacated {
            self.recent_regions.retain(|r| r != vacated);
            self.recent_regions.push_front(*vacated);
        }
        self.recent_regions.truncate(cap);
    }

    /// Regions recently dropped from this entity's window, most recent first.
    #[must_use]
    pub fn recent_regions(&self) -> Vec<RegionId> {
        self.recent_regions.iter().copied().collect()
    }

    /// Clears all region bookkeeping. Used on despawn.
    pub fn clear_regions(&mut self) {
        self.region = None;
        self.recent_regions.clear();
    }

    // =========================================================================
    // Equipment, effects, derived stats
    // =========================================================================

    /// Worn equipment.
    #[must_use]
    pub const fn equipment(&self) -> &Equipment {
        &self.equipment
    }

    /// Active status effects.
    #[must_use]
    pub const fn effects(&self) -> EffectFlags {
        self.effects
    }

    /// Equips `item`, invalidating the stat cache. Returns the replaced item.
    pub fn equip(&mut self, slot: EquipmentSlot, item: Item) -> Option<Item> {
        self.derived = None;
        self.equipment.equip(slot, item)
    }

    /// Unequips `slot`, invalidating the stat cache.
    pub fn unequip(&mut self, slot: EquipmentSlot) -> Option<Item> {
        self.derived = None;
        self.equipment.unequip(slot)
    }

    /// Toggles an effect. Returns whether anything changed; the stat cache is
    /// only invalidated when it did.
    pub fn set_effect(&mut self, effect: EffectFlags, active: bool) -> bool {
        if self.effects.contains(effect) == active {
            return false;
        }
        self.effects.set(effect, active);
        self.derived = None;
        true
    }

    /// Derived stat snapshot, computed on first use after an invalidation.
    pub fn derived(&mut self, config: &WorldConfig) -> DerivedStats {
        if let Some(derived) = self.derived {
            return derived;
        }
        let derived = StatAggregator::derive(&self.equipment, self.effects, &config.stats);
        self.derived = Some(derived);
        derived
    }

    /// Current movement speed in milliseconds per tile.
    pub fn movement_speed(&mut self, config: &WorldConfig) -> u32 {
        self.derived(config).movement_speed
    }

    // =========================================================================
    // Cheat score
    // =========================================================================

    /// Raises a cheat flag. Swallowed while in active combat.
    pub fn flag_cheat(&mut self, reason: CheatReason, amount: u32) -> Option<CheatAlert> {
        self.cheat.flag(self.instance, reason, amount, self.combat_active)
    }

    /// Current cheat score.
    #[must_use]
    pub const fn cheat_score(&self) -> u32 {
        self.cheat.score()
    }

    /// Administrative cheat-score reset.
    pub fn reset_cheat_score(&mut self) {
        self.cheat.reset();
    }

    /// Whether steps are ignored due to accumulated drift flags.
    #[must_use]
    pub fn is_frozen(&self, config: &WorldConfig) -> bool {
        self.invalid_movement >= config.movement.invalid_movement_threshold
    }

    // =========================================================================
    // Serialization for other clients
    // =========================================================================

    /// Builds the spawn summary other clients receive, with optional blocks
    /// gated by `flags`.
    pub fn summarize(&mut self, flags: SummaryFlags, config: &WorldConfig) -> EntitySummary {
        let movement_speed = self.movement_speed(config);
        EntitySummary {
            instance: self.instance,
            username: self.username.clone(),
            position: self.position,
            orientation: self.orientation,
            movement_speed,
            equipment: flags.equipment.then(|| {
                self.equipment
                    .iter()
                    .map(|(slot, item)| (slot, item.key.clone()))
                    .collect()
            }),
            experience: flags.experience.then_some(self.experience),
            mana: flags.mana.then_some((self.mana, self.max_mana)),
        }
    }
}
