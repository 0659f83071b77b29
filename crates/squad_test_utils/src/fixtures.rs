//! Test fixtures and helpers.
//!
//! Small boards drawn as ASCII, quiet configurations and pre-populated
//! simulations for consistent testing.

use fixed::types::I32F32;
use squad_core::config::SimConfig;
use squad_core::enemy::EnemyPath;
use squad_core::formation::FormationCatalog;
use squad_core::grid::{OccupancyGrid, TileCode, TileCoord};
use squad_core::math::Vec2Fixed;
use squad_core::simulation::Simulation;
use squad_core::unit::{UnitId, UnitKind};

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Build a grid from rows of tile glyphs with 32-unit tiles.
///
/// Glyphs follow [`TileCode::glyph`]: `.` free, `U` occupied, `#` blocked,
/// `+` crossing, `~` enemy lane. Whitespace around each row is ignored.
///
/// # Panics
///
/// Panics on an unknown glyph or ragged rows.
#[must_use]
pub fn grid_from_ascii(rows: &[&str]) -> OccupancyGrid {
    let codes: Vec<Vec<TileCode>> = rows
        .iter()
        .map(|row| {
            row.trim()
                .chars()
                .map(|c| TileCode::from_glyph(c).unwrap_or_else(|| panic!("unknown glyph {c:?}")))
                .collect()
        })
        .collect();
    OccupancyGrid::from_rows(&codes, fixed(32)).expect("rows must be non-empty and equal length")
}

/// Configuration with short delays and no enemy waves.
#[must_use]
pub fn quiet_config() -> SimConfig {
    SimConfig {
        move_delay_ticks: 4,
        engage_delay_ticks: 3,
        enemy_spawn_interval_ticks: 0,
        ..SimConfig::default()
    }
}

/// Enemy path well off any test board.
#[must_use]
pub fn offboard_path() -> EnemyPath {
    EnemyPath::new(vec![Vec2Fixed::from_ints(-500, -500), Vec2Fixed::from_ints(-500, -400)])
        .expect("two distinct points")
}

/// Simulation over an ASCII board with no enemies.
///
/// Tiles drawn as `U` are turned back to free and a tank is placed on
/// each, in row-major order, so unit ids follow reading order.
///
/// # Panics
///
/// Panics if the board is malformed or holds more units than the squad size.
#[must_use]
pub fn quiet_sim(rows: &[&str]) -> Simulation {
    quiet_sim_with(quiet_config(), rows)
}

/// Like [`quiet_sim`] with a custom configuration.
///
/// # Panics
///
/// Panics if the board is malformed or holds more units than the squad size.
#[must_use]
pub fn quiet_sim_with(config: SimConfig, rows: &[&str]) -> Simulation {
    let mut grid = grid_from_ascii(rows);
    let starts: Vec<TileCoord> = grid.coords().filter(|&t| grid.is_occupied(t)).collect();
    for &tile in &starts {
        grid.set_code(tile, TileCode::Free);
    }

    let mut sim = Simulation::from_parts(config, grid, offboard_path(), FormationCatalog::default())
        .expect("valid test configuration");
    for tile in starts {
        sim.place_unit(tile, UnitKind::Tank).expect("room for every drawn unit");
    }
    sim
}

/// Select `units` in the given order.
///
/// # Panics
///
/// Panics if a unit does not exist.
pub fn select_all(sim: &mut Simulation, units: &[UnitId]) {
    sim.clear_selection();
    for &unit in units {
        sim.add_to_selection(unit).expect("unit exists");
    }
}

/// Tick `n` times, discarding events.
pub fn run_ticks(sim: &mut Simulation, n: u64) {
    for _ in 0..n {
        sim.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_board_places_units_in_reading_order() {
        let sim = quiet_sim(&[".U.", "U#."]);
        assert_eq!(sim.unit_at(TileCoord::new(0, 1)), Some(UnitId(0)));
        assert_eq!(sim.unit_at(TileCoord::new(1, 0)), Some(UnitId(1)));
        assert_eq!(sim.grid().code(TileCoord::new(1, 1)), Some(TileCode::Blocked));
        assert!(sim.occupancy_consistent());
    }

    #[test]
    fn test_fixed_helpers() {
        assert_eq!(fixed(3) * fixed(2), fixed(6));
        assert_eq!(fixed_f(0.5) + fixed_f(0.5), fixed(1));
    }
}
