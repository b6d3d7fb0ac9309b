//! World configuration.
//!
//! All gameplay tunables live in [`WorldConfig`], a plain serde struct that
//! hosts can deserialize from TOML or JSON. The `Default` impl holds the
//! production constants; tests override individual fields where a scenario
//! needs tighter or looser limits.

use glam::IVec2;
use serde::{Deserialize, Serialize};

/// Stat derivation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatConfig {
    /// Base movement speed in milliseconds per tile, before equipment and
    /// effect modifiers. Lower is faster.
    pub base_movement_speed: u32,
    /// Attack rate used when no weapon is equipped, in milliseconds.
    pub base_attack_rate: u32,
    /// Floor for the derived attack rate. Effect bonuses can never push the
    /// rate below this value.
    pub min_attack_rate: u32,
    /// Milliseconds subtracted from the weapon attack rate while the
    /// dualists-mark effect is active.
    pub dualists_mark_bonus_ms: u32,
    /// Movement speed multiplier applied while running.
    pub running_modifier: f32,
    /// Incoming damage multiplier applied while thick-skin is active.
    pub thick_skin_modifier: f32,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            base_movement_speed: 250,
            base_attack_rate: 1000,
            min_attack_rate: 400,
            dualists_mark_bonus_ms: 200,
            running_modifier: 0.9,
            thick_skin_modifier: 0.8,
        }
    }
}

/// Movement validation tunables.
///
/// The margins control how strict the step-timing check is. Raising
/// `step_margin_ms` or `double_delivery_ms` tolerates worse client clocks at
/// the cost of admitting slightly faster-than-allowed movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Latency margin in milliseconds added to the observed step interval
    /// before comparing it against the movement speed.
    pub step_margin_ms: u64,
    /// Grace period after a region change during which step timing is not
    /// checked. Region transitions legitimately batch packets.
    pub region_grace_ms: u64,
    /// Threshold for the double-delivery tolerance: a step whose client
    /// timestamp lags the server clock by more than this, while the observed
    /// interval is under it, is treated as a benign duplicate.
    pub double_delivery_ms: u64,
    /// Number of invalid-movement flags after which an entity's steps are
    /// ignored until the next accepted stop resets the count.
    pub invalid_movement_threshold: u32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            step_margin_ms: 7,
            region_grace_ms: 1500,
            double_delivery_ms: 35,
            invalid_movement_threshold: 5,
        }
    }
}

/// Region grid geometry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    /// Side length of a square region, in tiles.
    pub region_size: i32,
    /// Number of regions along the x axis.
    pub width_in_regions: u32,
    /// Number of regions along the y axis.
    pub height_in_regions: u32,
    /// Maximum number of recently-vacated regions remembered per entity for
    /// despawn teardown.
    pub recent_regions_cap: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            region_size: 16,
            width_in_regions: 48,
            height_in_regions: 48,
            recent_regions_cap: 25,
        }
    }
}

/// Session lifecycle tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Milliseconds a freshly connected client has to acknowledge readiness
    /// before the session is terminated.
    pub login_timeout_ms: u64,
    /// Spawn point tile. Also the forced destination when collision
    /// resolution has no valid previous position to roll back to.
    pub spawn_point: IVec2,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_timeout_ms: 10_000,
            spawn_point: IVec2::new(50, 50),
        }
    }
}

/// Complete world configuration.
///
/// # Example
///
/// ```
/// use stonefell_core::config::WorldConfig;
///
/// let config = WorldConfig::default();
/// assert_eq!(config.stats.base_movement_speed, 250);
/// assert_eq!(config.region.region_size, 16);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Stat derivation tunables.
    pub stats: StatConfig,
    /// Movement validation tunables.
    pub movement: MovementConfig,
    /// Region grid geometry.
    pub region: RegionConfig,
    /// Session lifecycle tunables.
    pub session: SessionConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_hold_documented_constants() {
        let config = WorldConfig::default();
        assert_eq!(config.stats.base_movement_speed, 250);
        assert_eq!(config.stats.min_attack_rate, 400);
        assert_eq!(config.movement.step_margin_ms, 7);
        assert_eq!(config.movement.region_grace_ms, 1500);
        assert_eq!(config.movement.double_delivery_ms, 35);
        assert_eq!(config.region.region_size, 16);
        assert_eq!(config.session.login_timeout_ms, 10_000);
    }

    #[test]
    fn partial_deserialization_fills_defaults() {
        let config: WorldConfig =
            serde_json::from_str(r#"{"movement": {"step_margin_ms": 12}}"#).unwrap();
        assert_eq!(config.movement.step_margin_ms, 12);
        assert_eq!(config.movement.region_grace_ms, 1500);
        assert_eq!(config.stats.base_movement_speed, 250);
    }

    #[test]
    fn serialization_roundtrip() {
        let config = WorldConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: WorldConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
