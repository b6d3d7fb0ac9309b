//! Region partitioning and interest management.
//!
//! The world is cut into fixed-size square regions. Every entity occupies
//! exactly one region at a time, and every client observes the 3x3 window of
//! regions centred on its own, clipped at the map border. Occupancy (who is
//! standing where) and observation (who is watching where) are independent
//! sets: a client keeps observing a region it just left until its window
//! shifts away from it.
//!
//! All sets are `BTreeSet` and the region table is a `BTreeMap`, so iteration
//! over occupants and observers is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use glam::IVec2;
use serde::{Deserialize, Serialize};

use crate::config::RegionConfig;
use crate::entity::{ClientId, InstanceId};

/// Identifier of one region in the grid.
///
/// Computed from region coordinates as `rx + ry * width_in_regions`; the
/// numeric ordering therefore walks the grid row by row.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(u32);

impl RegionId {
    /// Creates a new `RegionId` from a raw `u32` value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` value of this identifier.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({})", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One region's occupant and observer sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Entities standing in this region.
    occupants: BTreeSet<InstanceId>,
    /// Clients whose observation window covers this region.
    observers: BTreeSet<ClientId>,
}

impl Region {
    /// Entities standing in this region.
    #[must_use]
    pub const fn occupants(&self) -> &BTreeSet<InstanceId> {
        &self.occupants
    }

    /// Clients observing this region.
    #[must_use]
    pub const fn observers(&self) -> &BTreeSet<ClientId> {
        &self.observers
    }

    fn is_empty(&self) -> bool {
        self.occupants.is_empty() && self.observers.is_empty()
    }
}

/// Result of moving an entity's region membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionShift {
    /// Region the entity left, if it had one.
    pub from: Option<RegionId>,
    /// Region the entity now occupies.
    pub to: RegionId,
    /// Regions newly covered by the 3x3 window, ascending.
    pub entered: Vec<RegionId>,
    /// Regions the window no longer covers, ascending.
    pub vacated: Vec<RegionId>,
}

/// Tile-to-region mapping plus per-region occupant and observer bookkeeping.
///
/// Owned by the world and passed by reference to the components that need
/// it; nothing in the engine holds a long-lived borrow of it.
///
/// # Example
///
/// ```
/// use glam::IVec2;
/// use stonefell_core::config::RegionConfig;
/// use stonefell_core::region::RegionIndex;
///
/// let index = RegionIndex::new(&RegionConfig::default());
/// let region = index.region_at(IVec2::new(20, 5)).unwrap();
/// // region coordinates (1, 0) in a 48-wide grid
/// assert_eq!(region.as_u32(), 1);
/// assert!(index.region_at(IVec2::new(-1, -1)).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionIndex {
    size: i32,
    width: u32,
    height: u32,
    regions: BTreeMap<RegionId, Region>,
}

impl RegionIndex {
    /// Creates an empty index over the configured grid.
    #[must_use]
    pub fn new(config: &RegionConfig) -> Self {
        Self {
            size: config.region_size,
            width: config.width_in_regions,
            height: config.height_in_regions,
            regions: BTreeMap::new(),
        }
    }

    /// Maps a tile position to its region.
    ///
    /// Returns `None` for positions outside the grid, including the
    /// not-yet-validated sentinel.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn region_at(&self, position: IVec2) -> Option<RegionId> {
        if position.x < 0 || position.y < 0 {
            return None;
        }
        let rx = (position.x / self.size) as u32;
        let ry = (position.y / self.size) as u32;
        if rx >= self.width || ry >= self.height {
            return None;
        }
        Some(RegionId::new(rx + ry * self.width))
    }

    /// Returns the 3x3 observation window centred on `region`, clipped at
    /// the map border, in ascending id order.
    #[must_use]
    pub fn window(&self, region: RegionId) -> Vec<RegionId> {
        let rx = i64::from(region.as_u32() % self.width);
        let ry = i64::from(region.as_u32() / self.width);
        let mut window = Vec::with_capacity(9);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (nx, ny) = (rx + dx, ry + dy);
                if nx >= 0 && ny >= 0 && nx < i64::from(self.width) && ny < i64::from(self.height)
                {
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    window.push(RegionId::new(nx as u32 + ny as u32 * self.width));
                }
            }
        }
        window.sort_unstable();
        window
    }

    /// Moves `instance` from `from` to `to` and computes the window delta.
    ///
    /// `entered` regions are those covered by the new window but not the old
    /// one; `vacated` the reverse. When `from` is `None` (a fresh spawn) the
    /// whole new window counts as entered.
    pub fn shift(
        &mut self,
        instance: InstanceId,
        from: Option<RegionId>,
        to: RegionId,
    ) -> RegionShift {
        let old_window: BTreeSet<RegionId> = match from {
            Some(from) => self.window(from).into_iter().collect(),
            None => BTreeSet::new(),
        };
        let new_window: BTreeSet<RegionId> = self.window(to).into_iter().collect();

        if let Some(from) = from {
            self.remove_occupant(instance, from);
        }
        self.insert_occupant(instance, to);

        RegionShift {
            from,
            to,
            entered: new_window.difference(&old_window).copied().collect(),
            vacated: old_window.difference(&new_window).copied().collect(),
        }
    }

    /// Adds `instance` to a region's occupant set.
    pub fn insert_occupant(&mut self, instance: InstanceId, region: RegionId) {
        self.regions.entry(region).or_default().occupants.insert(instance);
    }

    /// Removes `instance` from a region's occupant set.
    pub fn remove_occupant(&mut self, instance: InstanceId, region: RegionId) {
        if let Some(entry) = self.regions.get_mut(&region) {
            entry.occupants.remove(&instance);
            if entry.is_empty() {
                self.regions.remove(&region);
            }
        }
    }

    /// Adds `client` to a region's observer set.
    pub fn observe(&mut self, client: ClientId, region: RegionId) {
        self.regions.entry(region).or_default().observers.insert(client);
    }

    /// Removes `client` from a region's observer set.
    pub fn unobserve(&mut self, client: ClientId, region: RegionId) {
        if let Some(entry) = self.regions.get_mut(&region) {
            entry.observers.remove(&client);
            if entry.is_empty() {
                self.regions.remove(&region);
            }
        }
    }

    /// Entities standing in `region`.
    #[must_use]
    pub fn occupants_of(&self, region: RegionId) -> BTreeSet<InstanceId> {
        self.regions
            .get(&region)
            .map(|entry| entry.occupants.clone())
            .unwrap_or_default()
    }

    /// Union of observers over the listed regions, deduplicated.
    #[must_use]
    pub fn observers_of(&self, regions: &[RegionId]) -> BTreeSet<ClientId> {
        let mut observers = BTreeSet::new();
        for region in regions {
            if let Some(entry) = self.regions.get(region) {
                observers.extend(entry.observers.iter().copied());
            }
        }
        observers
    }

    /// Strips `instance` from every occupant set. Used on despawn.
    pub fn remove_instance(&mut self, instance: InstanceId) {
        self.regions.retain(|_, entry| {
            entry.occupants.remove(&instance);
            !entry.is_empty()
        });
    }

    /// Strips `client` from every observer set. Used on disconnect.
    pub fn remove_client(&mut self, client: ClientId) {
        self.regions.retain(|_, entry| {
            entry.observers.remove(&client);
            !entry.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RegionIndex {
        RegionIndex::new(&RegionConfig::default())
    }

    fn small_index() -> RegionIndex {
        RegionIndex::new(&RegionConfig {
            region_size: 16,
            width_in_regions: 4,
            height_in_regions: 4,
            recent_regions_cap: 25,
        })
    }

    mod region_at_tests {
        use super::*;

        #[test]
        fn maps_tiles_row_major() {
            let index = index();
            assert_eq!(index.region_at(IVec2::new(0, 0)), Some(RegionId::new(0)));
            assert_eq!(index.region_at(IVec2::new(15, 15)), Some(RegionId::new(0)));
            assert_eq!(index.region_at(IVec2::new(16, 0)), Some(RegionId::new(1)));
            assert_eq!(index.region_at(IVec2::new(0, 16)), Some(RegionId::new(48)));
            assert_eq!(index.region_at(IVec2::new(20, 37)), Some(RegionId::new(97)));
        }

        #[test]
        fn rejects_out_of_bounds() {
            let index = index();
            assert_eq!(index.region_at(IVec2::new(-1, 5)), None);
            assert_eq!(index.region_at(IVec2::new(5, -1)), None);
            assert_eq!(index.region_at(IVec2::new(48 * 16, 0)), None);
            assert_eq!(index.region_at(crate::entity::INVALID_POSITION), None);
        }
    }

    mod window_tests {
        use super::*;

        #[test]
        fn interior_window_has_nine_regions() {
            let index = small_index();
            // region (1, 1) in a 4x4 grid
            let window = index.window(RegionId::new(5));
            let expected: Vec<RegionId> =
                [0, 1, 2, 4, 5, 6, 8, 9, 10].map(RegionId::new).to_vec();
            assert_eq!(window, expected);
        }

        #[test]
        fn corner_window_is_clipped_to_four() {
            let index = small_index();
            let window = index.window(RegionId::new(0));
            let expected: Vec<RegionId> = [0, 1, 4, 5].map(RegionId::new).to_vec();
            assert_eq!(window, expected);
        }

        #[test]
        fn edge_window_is_clipped_to_six() {
            let index = small_index();
            // region (0, 1): left edge
            let window = index.window(RegionId::new(4));
            let expected: Vec<RegionId> = [0, 1, 4, 5, 8, 9].map(RegionId::new).to_vec();
            assert_eq!(window, expected);
        }
    }

    mod shift_tests {
        use super::*;

        #[test]
        fn fresh_spawn_enters_whole_window() {
            let mut index = small_index();
            let shift = index.shift(InstanceId::new(1), None, RegionId::new(5));
            assert_eq!(shift.entered.len(), 9);
            assert!(shift.vacated.is_empty());
            assert!(index.occupants_of(RegionId::new(5)).contains(&InstanceId::new(1)));
        }

        #[test]
        fn adjacent_shift_enters_and_vacates_one_column() {
            let mut index = small_index();
            let instance = InstanceId::new(1);
            index.shift(instance, None, RegionId::new(5));

            // (1,1) -> (2,1): columns 0 vacated, 3 entered
            let shift = index.shift(instance, Some(RegionId::new(5)), RegionId::new(6));
            let entered: Vec<RegionId> = [3, 7, 11].map(RegionId::new).to_vec();
            let vacated: Vec<RegionId> = [0, 4, 8].map(RegionId::new).to_vec();
            assert_eq!(shift.entered, entered);
            assert_eq!(shift.vacated, vacated);

            assert!(!index.occupants_of(RegionId::new(5)).contains(&instance));
            assert!(index.occupants_of(RegionId::new(6)).contains(&instance));
        }
    }

    mod observer_tests {
        use super::*;

        #[test]
        fn occupants_and_observers_are_independent() {
            let mut index = small_index();
            let region = RegionId::new(5);
            index.insert_occupant(InstanceId::new(1), region);
            index.observe(ClientId::new(9), region);

            index.remove_occupant(InstanceId::new(1), region);
            assert!(index.observers_of(&[region]).contains(&ClientId::new(9)));

            index.unobserve(ClientId::new(9), region);
            assert!(index.observers_of(&[region]).is_empty());
        }

        #[test]
        fn multi_region_observers_are_deduplicated() {
            let mut index = small_index();
            let client = ClientId::new(9);
            index.observe(client, RegionId::new(4));
            index.observe(client, RegionId::new(5));

            let observers = index.observers_of(&[RegionId::new(4), RegionId::new(5)]);
            assert_eq!(observers.len(), 1);
            assert!(observers.contains(&client));
        }

        #[test]
        fn remove_client_strips_every_observer_set() {
            let mut index = small_index();
            let client = ClientId::new(9);
            for id in [0, 1, 4, 5] {
                index.observe(client, RegionId::new(id));
            }
            index.remove_client(client);
            let window: Vec<RegionId> = [0, 1, 4, 5].map(RegionId::new).to_vec();
            assert!(index.observers_of(&window).is_empty());
        }

        #[test]
        fn remove_instance_strips_every_occupant_set() {
            let mut index = small_index();
            let instance = InstanceId::new(1);
            index.insert_occupant(instance, RegionId::new(0));
            index.insert_occupant(instance, RegionId::new(3));
            index.remove_instance(instance);
            assert!(index.occupants_of(RegionId::new(0)).is_empty());
            assert!(index.occupants_of(RegionId::new(3)).is_empty());
        }
    }
}
