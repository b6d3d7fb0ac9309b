//! Equipment, status effects, and derived stat aggregation.
//!
//! The aggregator is a pure function of worn equipment, active effects and
//! [`StatConfig`]: same inputs, same outputs, no entity state read or
//! written. Callers cache the result as a [`DerivedStats`] snapshot and
//! invalidate it on equipment or effect changes; the aggregator itself never
//! caches.
//!
//! # Modifier layering
//!
//! Movement speed layers multiplicatively with integer truncation at every
//! stage, in a fixed order: base constant, armour modifier, boots modifier,
//! running. The order matters because of the truncation; armour always
//! applies before boots.
//!
//! ```
//! use stonefell_core::config::StatConfig;
//! use stonefell_core::stats::{Equipment, EquipmentSlot, EffectFlags, Item, StatAggregator};
//!
//! let mut equipment = Equipment::default();
//! equipment.equip(EquipmentSlot::Boots, Item::new("swiftboots").with_movement_modifier(0.95));
//!
//! let speed = StatAggregator::movement_speed(
//!     &equipment,
//!     EffectFlags::RUNNING,
//!     &StatConfig::default(),
//! );
//! // floor(floor(250 * 0.95) * 0.9) = floor(237 * 0.9) = 213
//! assert_eq!(speed, 213);
//! ```

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::config::StatConfig;

// =============================================================================
// Stat blocks
// =============================================================================

/// Field-wise combat stats carried by an item, for attack or defense.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Crush damage or resistance.
    pub crush: i32,
    /// Slash damage or resistance.
    pub slash: i32,
    /// Stab damage or resistance.
    pub stab: i32,
    /// Ranged damage or resistance.
    pub archery: i32,
    /// Magic damage or resistance.
    pub magic: i32,
}

impl Add for Stats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            crush: self.crush + other.crush,
            slash: self.slash + other.slash,
            stab: self.stab + other.stab,
            archery: self.archery + other.archery,
            magic: self.magic + other.magic,
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Field-wise combat bonuses carried by an item.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bonuses {
    /// Hit-chance bonus.
    pub accuracy: i32,
    /// Melee damage bonus.
    pub strength: i32,
    /// Ranged damage bonus.
    pub archery: i32,
    /// Magic damage bonus.
    pub magic: i32,
}

impl Add for Bonuses {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            accuracy: self.accuracy + other.accuracy,
            strength: self.strength + other.strength,
            archery: self.archery + other.archery,
            magic: self.magic + other.magic,
        }
    }
}

impl AddAssign for Bonuses {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

// =============================================================================
// Equipment
// =============================================================================

/// Fixed equipment slots.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum EquipmentSlot {
    /// Main-hand weapon. Provides the attack rate.
    Weapon,
    /// Body armour. May carry a movement modifier.
    Armour,
    /// Neck slot.
    Pendant,
    /// Finger slot.
    Ring,
    /// Feet slot. May carry a movement modifier.
    Boots,
    /// Ammunition.
    Arrows,
}

impl EquipmentSlot {
    /// All slots, in aggregation order.
    pub const ALL: [Self; 6] = [
        Self::Weapon,
        Self::Armour,
        Self::Pendant,
        Self::Ring,
        Self::Boots,
        Self::Arrows,
    ];
}

/// An equippable item.
///
/// Only the fields the aggregator reads are modeled; cosmetic and economic
/// item data stays in the host's item tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Item key, matching the host's item table.
    pub key: String,
    /// Attack stats granted while worn.
    pub attack: Stats,
    /// Defense stats granted while worn.
    pub defense: Stats,
    /// Combat bonuses granted while worn.
    pub bonuses: Bonuses,
    /// Movement speed multiplier, if the item has one. Below 1.0 is faster.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movement_modifier: Option<f32>,
    /// Attack rate in milliseconds, for weapons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_rate: Option<u32>,
}

impl Item {
    /// Creates an item with the given key and no stats.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Sets the movement speed multiplier.
    #[must_use]
    pub fn with_movement_modifier(mut self, modifier: f32) -> Self {
        self.movement_modifier = Some(modifier);
        self
    }

    /// Sets the weapon attack rate in milliseconds.
    #[must_use]
    pub fn with_attack_rate(mut self, rate: u32) -> Self {
        self.attack_rate = Some(rate);
        self
    }

    /// Sets the attack stats.
    #[must_use]
    pub fn with_attack(mut self, attack: Stats) -> Self {
        self.attack = attack;
        self
    }

    /// Sets the defense stats.
    #[must_use]
    pub fn with_defense(mut self, defense: Stats) -> Self {
        self.defense = defense;
        self
    }

    /// Sets the combat bonuses.
    #[must_use]
    pub fn with_bonuses(mut self, bonuses: Bonuses) -> Self {
        self.bonuses = bonuses;
        self
    }
}

/// The set of items an entity currently wears.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    slots: BTreeMap<EquipmentSlot, Item>,
}

impl Equipment {
    /// Creates empty equipment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Equips `item` into `slot`, returning the item it replaced.
    pub fn equip(&mut self, slot: EquipmentSlot, item: Item) -> Option<Item> {
        self.slots.insert(slot, item)
    }

    /// Removes and returns the item in `slot`.
    pub fn unequip(&mut self, slot: EquipmentSlot) -> Option<Item> {
        self.slots.remove(&slot)
    }

    /// Returns the item worn in `slot`.
    #[must_use]
    pub fn get(&self, slot: EquipmentSlot) -> Option<&Item> {
        self.slots.get(&slot)
    }

    /// Iterates worn items in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EquipmentSlot, &Item)> {
        self.slots.iter().map(|(slot, item)| (*slot, item))
    }
}

bitflags! {
    /// Named status effects that feed into stat derivation.
    #[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct EffectFlags: u8 {
        /// Entity is running; movement speed scaled by the running modifier.
        const RUNNING = 1 << 0;
        /// Dualists-mark; attack rate bonus, clamped to the minimum rate.
        const DUALISTS_MARK = 1 << 1;
        /// Thick-skin; incoming damage scaled down.
        const THICK_SKIN = 1 << 2;
    }
}

// =============================================================================
// Derived stats
// =============================================================================

/// Snapshot of every derived stat for one entity.
///
/// Produced by [`StatAggregator::derive`] and cached on the entity; any
/// equipment or effect change invalidates the cache.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    /// Milliseconds per tile.
    pub movement_speed: u32,
    /// Milliseconds between attacks.
    pub attack_rate: u32,
    /// Summed attack stats over all worn items.
    pub attack: Stats,
    /// Summed defense stats over all worn items.
    pub defense: Stats,
    /// Summed combat bonuses over all worn items.
    pub bonuses: Bonuses,
    /// Incoming damage multiplier, 1.0 when unmodified.
    pub damage_reduction: f32,
}

/// Pure stat derivation over equipment, effects, and config.
///
/// All functions are deterministic and read-only; calling them twice with
/// the same inputs yields identical results.
pub struct StatAggregator;

impl StatAggregator {
    /// Derives the movement speed in milliseconds per tile.
    ///
    /// Layering order: base constant, armour modifier, boots modifier,
    /// running modifier. Every multiplication truncates to an integer before
    /// the next layer applies.
    #[must_use]
    pub fn movement_speed(equipment: &Equipment, effects: EffectFlags, config: &StatConfig) -> u32 {
        let mut speed = config.base_movement_speed;
        for slot in [EquipmentSlot::Armour, EquipmentSlot::Boots] {
            if let Some(modifier) = equipment.get(slot).and_then(|item| item.movement_modifier) {
                speed = apply_modifier(speed, modifier);
            }
        }
        if effects.contains(EffectFlags::RUNNING) {
            speed = apply_modifier(speed, config.running_modifier);
        }
        speed
    }

    /// Derives the attack rate in milliseconds between attacks.
    ///
    /// The weapon's rate (or the configured base when unarmed) is reduced by
    /// the dualists-mark bonus when active, clamped so the result never goes
    /// below `min_attack_rate`.
    #[must_use]
    pub fn attack_rate(equipment: &Equipment, effects: EffectFlags, config: &StatConfig) -> u32 {
        let mut rate = equipment
            .get(EquipmentSlot::Weapon)
            .and_then(|weapon| weapon.attack_rate)
            .unwrap_or(config.base_attack_rate);
        if effects.contains(EffectFlags::DUALISTS_MARK) {
            rate = rate.saturating_sub(config.dualists_mark_bonus_ms);
        }
        rate.max(config.min_attack_rate)
    }

    /// Sums attack stats, defense stats and bonuses over all worn items.
    #[must_use]
    pub fn combat_totals(equipment: &Equipment) -> (Stats, Stats, Bonuses) {
        let mut attack = Stats::default();
        let mut defense = Stats::default();
        let mut bonuses = Bonuses::default();
        for (_, item) in equipment.iter() {
            attack += item.attack;
            defense += item.defense;
            bonuses += item.bonuses;
        }
        (attack, defense, bonuses)
    }

    /// Derives the incoming damage multiplier.
    ///
    /// A multiplier, not a summed bonus: 1.0 unmodified, scaled down by
    /// thick-skin.
    #[must_use]
    pub fn damage_reduction(effects: EffectFlags, config: &StatConfig) -> f32 {
        if effects.contains(EffectFlags::THICK_SKIN) {
            config.thick_skin_modifier
        } else {
            1.0
        }
    }

    /// Derives the complete stat snapshot.
    #[must_use]
    pub fn derive(equipment: &Equipment, effects: EffectFlags, config: &StatConfig) -> DerivedStats {
        let (attack, defense, bonuses) = Self::combat_totals(equipment);
        DerivedStats {
            movement_speed: Self::movement_speed(equipment, effects, config),
            attack_rate: Self::attack_rate(equipment, effects, config),
            attack,
            defense,
            bonuses,
            damage_reduction: Self::damage_reduction(effects, config),
        }
    }
}

/// Applies a multiplicative modifier with truncation toward zero.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn apply_modifier(value: u32, modifier: f32) -> u32 {
    (value as f32 * modifier).floor() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boots(modifier: f32) -> Item {
        Item::new("boots").with_movement_modifier(modifier)
    }

    fn armour(modifier: f32) -> Item {
        Item::new("armour").with_movement_modifier(modifier)
    }

    mod movement_speed_tests {
        use super::*;

        #[test]
        fn unmodified_speed_is_base() {
            let speed = StatAggregator::movement_speed(
                &Equipment::default(),
                EffectFlags::empty(),
                &StatConfig::default(),
            );
            assert_eq!(speed, 250);
        }

        #[test]
        fn boots_and_running_truncate_at_each_layer() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Boots, boots(0.95));

            let speed = StatAggregator::movement_speed(
                &equipment,
                EffectFlags::RUNNING,
                &StatConfig::default(),
            );
            // floor(floor(250 * 0.95) * 0.9) = floor(237 * 0.9) = 213,
            // not floor(250 * 0.95 * 0.9) = 213.75 -> 213 by coincidence;
            // with 0.93 boots the layering is observable.
            assert_eq!(speed, 213);

            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Boots, boots(0.93));
            let speed = StatAggregator::movement_speed(
                &equipment,
                EffectFlags::RUNNING,
                &StatConfig::default(),
            );
            // floor(floor(250 * 0.93) * 0.9) = floor(232 * 0.9) = 208
            assert_eq!(speed, 208);
        }

        #[test]
        fn armour_applies_before_boots() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Armour, armour(0.9));
            equipment.equip(EquipmentSlot::Boots, boots(0.95));

            let speed = StatAggregator::movement_speed(
                &equipment,
                EffectFlags::empty(),
                &StatConfig::default(),
            );
            // floor(floor(250 * 0.9) * 0.95) = floor(225 * 0.95) = 213
            assert_eq!(speed, 213);
        }

        #[test]
        fn modifier_on_non_movement_slot_is_ignored() {
            let mut equipment = Equipment::default();
            equipment.equip(
                EquipmentSlot::Ring,
                Item::new("ring").with_movement_modifier(0.5),
            );

            let speed = StatAggregator::movement_speed(
                &equipment,
                EffectFlags::empty(),
                &StatConfig::default(),
            );
            assert_eq!(speed, 250);
        }

        #[test]
        fn derivation_is_idempotent() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Boots, boots(0.95));
            let config = StatConfig::default();

            let first = StatAggregator::movement_speed(&equipment, EffectFlags::RUNNING, &config);
            let second = StatAggregator::movement_speed(&equipment, EffectFlags::RUNNING, &config);
            assert_eq!(first, second);
        }
    }

    mod attack_rate_tests {
        use super::*;

        #[test]
        fn unarmed_uses_base_rate() {
            let rate = StatAggregator::attack_rate(
                &Equipment::default(),
                EffectFlags::empty(),
                &StatConfig::default(),
            );
            assert_eq!(rate, 1000);
        }

        #[test]
        fn dualists_mark_reduces_weapon_rate() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Weapon, Item::new("sword").with_attack_rate(900));

            let rate = StatAggregator::attack_rate(
                &equipment,
                EffectFlags::DUALISTS_MARK,
                &StatConfig::default(),
            );
            assert_eq!(rate, 700);
        }

        #[test]
        fn rate_is_clamped_to_floor() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Weapon, Item::new("dagger").with_attack_rate(450));

            let rate = StatAggregator::attack_rate(
                &equipment,
                EffectFlags::DUALISTS_MARK,
                &StatConfig::default(),
            );
            assert_eq!(rate, 400);
        }
    }

    mod combat_totals_tests {
        use super::*;

        #[test]
        fn totals_sum_field_wise() {
            let mut equipment = Equipment::default();
            equipment.equip(
                EquipmentSlot::Weapon,
                Item::new("sword")
                    .with_attack(Stats { slash: 10, ..Stats::default() })
                    .with_bonuses(Bonuses { strength: 3, ..Bonuses::default() }),
            );
            equipment.equip(
                EquipmentSlot::Armour,
                Item::new("mail")
                    .with_defense(Stats { crush: 5, slash: 7, ..Stats::default() })
                    .with_bonuses(Bonuses { strength: 1, ..Bonuses::default() }),
            );

            let (attack, defense, bonuses) = StatAggregator::combat_totals(&equipment);
            assert_eq!(attack.slash, 10);
            assert_eq!(defense.crush, 5);
            assert_eq!(defense.slash, 7);
            assert_eq!(bonuses.strength, 4);
        }
    }

    mod damage_reduction_tests {
        use super::*;

        #[test]
        fn thick_skin_scales_down() {
            let config = StatConfig::default();
            let unmodified = StatAggregator::damage_reduction(EffectFlags::empty(), &config);
            let reduced = StatAggregator::damage_reduction(EffectFlags::THICK_SKIN, &config);
            assert!((unmodified - 1.0).abs() < f32::EPSILON);
            assert!((reduced - 0.8).abs() < f32::EPSILON);
        }
    }

    mod equipment_tests {
        use super::*;

        #[test]
        fn equip_returns_replaced_item() {
            let mut equipment = Equipment::default();
            assert!(equipment.equip(EquipmentSlot::Weapon, Item::new("sword")).is_none());
            let replaced = equipment.equip(EquipmentSlot::Weapon, Item::new("axe"));
            assert_eq!(replaced.unwrap().key, "sword");
            assert_eq!(equipment.get(EquipmentSlot::Weapon).unwrap().key, "axe");
        }

        #[test]
        fn unequip_empties_the_slot() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Boots, boots(0.95));
            assert!(equipment.unequip(EquipmentSlot::Boots).is_some());
            assert!(equipment.get(EquipmentSlot::Boots).is_none());
            assert!(equipment.unequip(EquipmentSlot::Boots).is_none());
        }

        #[test]
        fn serialization_roundtrip() {
            let mut equipment = Equipment::default();
            equipment.equip(EquipmentSlot::Weapon, Item::new("sword").with_attack_rate(800));
            let json = serde_json::to_string(&equipment).unwrap();
            let deserialized: Equipment = serde_json::from_str(&json).unwrap();
            assert_eq!(equipment, deserialized);
        }
    }
}
