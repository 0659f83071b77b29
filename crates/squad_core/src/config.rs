//! Simulation tunables.
//!
//! Every field has a default, so a RON file only needs the values it
//! changes. Time is measured in simulation ticks; the defaults assume 20
//! ticks per second.

use serde::{Deserialize, Serialize};

use crate::enemy::WaveSettings;
use crate::error::{Result, SquadError};
use crate::math::{fixed_serde, Fixed};
use crate::unit::{MovementTiming, UnitStats};

/// Simulation configuration.
///
/// # Example RON
///
/// ```ron
/// SimConfig(
///     move_delay_ticks: 10,
///     squad_size: 3,
///     default_formation: "horizontal",
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Nominal tick rate, used only to convert times for display.
    pub ticks_per_second: u32,
    /// Tile side length in world units.
    #[serde(with = "fixed_serde")]
    pub tile_size: Fixed,
    /// Ticks spent preparing to move.
    pub move_delay_ticks: u32,
    /// Ticks spent preparing to engage.
    pub engage_delay_ticks: u32,
    /// Waypoint snap tolerance in world units.
    #[serde(with = "fixed_serde")]
    pub snap_distance: Fixed,
    /// Maximum number of squad units on the board.
    pub squad_size: usize,
    /// Base stats, adjusted per unit kind.
    pub unit: UnitStats,
    /// Enemy starting hit points.
    pub enemy_hp: u32,
    /// Enemy path distance per tick.
    #[serde(with = "fixed_serde")]
    pub enemy_speed: Fixed,
    /// Ticks between enemy spawns; zero disables spawning.
    pub enemy_spawn_interval_ticks: u32,
    /// Enemy pool size.
    pub max_enemies: usize,
    /// Base damage from one escaped enemy.
    pub enemy_escape_damage: u32,
    /// Projectile/enemy contact radius.
    #[serde(with = "fixed_serde")]
    pub hit_radius: Fixed,
    /// Home base hit points.
    pub base_hp: u32,
    /// Formation active at start.
    pub default_formation: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: 20,
            tile_size: Fixed::from_num(32),
            move_delay_ticks: 40,
            engage_delay_ticks: 40,
            snap_distance: Fixed::from_num(2),
            squad_size: 5,
            unit: UnitStats::default(),
            enemy_hp: 1000,
            enemy_speed: Fixed::from_num(464) / Fixed::from_num(100),
            enemy_spawn_interval_ticks: 20,
            max_enemies: 32,
            enemy_escape_damage: 1,
            hit_radius: Fixed::from_num(10),
            base_hp: 20,
            default_formation: "auto".into(),
        }
    }
}

impl SimConfig {
    /// Parse a configuration from RON and validate it.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| SquadError::DataParseError {
            path: "<sim config>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(SquadError::InvalidState(format!("config: {what}")));
        if self.tile_size <= Fixed::ZERO {
            return invalid("tile_size must be positive");
        }
        if self.unit.speed <= Fixed::ZERO {
            return invalid("unit speed must be positive");
        }
        if self.snap_distance < Fixed::ZERO {
            return invalid("snap_distance must not be negative");
        }
        if self.unit.fire_range < Fixed::ZERO || self.hit_radius < Fixed::ZERO {
            return invalid("ranges must not be negative");
        }
        if self.squad_size == 0 {
            return invalid("squad_size must be at least one");
        }
        Ok(())
    }

    /// Per-unit delays and tolerances.
    #[must_use]
    pub const fn timing(&self) -> MovementTiming {
        MovementTiming {
            move_delay_ticks: self.move_delay_ticks,
            engage_delay_ticks: self.engage_delay_ticks,
            snap_distance: self.snap_distance,
        }
    }

    /// Enemy pool settings.
    #[must_use]
    pub const fn waves(&self) -> WaveSettings {
        WaveSettings {
            hp: self.enemy_hp,
            speed: self.enemy_speed,
            spawn_interval_ticks: self.enemy_spawn_interval_ticks,
            max_enemies: self.max_enemies,
        }
    }

    /// Convert ticks to seconds for display.
    #[must_use]
    pub fn ticks_to_seconds(&self, ticks: u64) -> f64 {
        ticks as f64 / f64::from(self.ticks_per_second.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config = SimConfig::from_ron_str("(move_delay_ticks: 10, squad_size: 3)").unwrap();
        assert_eq!(config.move_delay_ticks, 10);
        assert_eq!(config.squad_size, 3);
        assert_eq!(config.engage_delay_ticks, 40);
        assert_eq!(config.default_formation, "auto");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(SimConfig::from_ron_str("(squad_size: 0)").is_err());
        assert!(matches!(SimConfig::from_ron_str("(hit_radius: -1)"), Err(SquadError::InvalidState(_))));
        assert!(matches!(
            SimConfig::from_ron_str("(squad_size: \"five\")"),
            Err(SquadError::DataParseError { .. })
        ));
    }

    #[test]
    fn test_default_pacing() {
        let config = SimConfig::default();
        // 2 s spin-up at 20 ticks per second.
        assert!((config.ticks_to_seconds(u64::from(config.move_delay_ticks)) - 2.0).abs() < 1e-9);
        // 100 px/s.
        assert_eq!(config.unit.speed * Fixed::from_num(config.ticks_per_second), Fixed::from_num(100));
    }
}
