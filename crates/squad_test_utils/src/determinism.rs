//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation
//! produces identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! Scripted scenarios, replays and the headless runner all assume the
//! simulation is a pure function of its inputs. Sources of non-determinism
//! include:
//!
//! - **Floating-point math**: positions, speeds and ranges use
//!   [`squad_core::math::Fixed`] throughout.
//!
//! - **HashMap iteration order**: units live in a `BTreeMap` and are always
//!   visited in id order.
//!
//! - **Wall-clock timers**: preparation delays count ticks, never time.
//!
//! - **Asynchronous path results**: outcomes are drained at a fixed point
//!   in the tick and stale ones are dropped by generation.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use squad_core::simulation::Simulation;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a simulation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run the simulation
/// * `ticks` - Number of ticks to simulate per run
/// * `setup` - Function to create initial simulation state
/// * `step` - Function to advance simulation by one tick; receives the
///   tick index so scripted commands can be issued on schedule
/// * `hash` - Function to compute state hash
///
/// # Example
///
/// ```ignore
/// use squad_test_utils::determinism::verify_determinism;
///
/// let result = verify_determinism(
///     5,   // Run 5 times
///     100, // 100 ticks each
///     || setup_defense_scenario(),
///     |sim, _tick| { sim.tick(); },
///     |sim| sim.state_hash(),
/// );
/// result.assert_deterministic();
/// ```
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S, u64),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for tick in 0..ticks {
            step(&mut state, tick);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Simplified determinism verification for [`Simulation`].
///
/// Runs the simulation twice with identical setup and verifies the final
/// state hashes match exactly.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64) -> bool
where
    F: Fn() -> Simulation,
{
    let result = verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim, _| {
            sim.tick();
        },
        Simulation::state_hash,
    );
    result.is_deterministic
}

/// Compare two simulation runs tick-by-tick, finding first divergence.
///
/// Useful for debugging non-determinism by finding exactly when
/// simulations start to differ.
///
/// # Returns
///
/// `None` if simulations are deterministic, `Some(tick)` if they diverge
/// at that tick.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick();
        sim2.tick();

        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for squad tests.
///
/// These strategies generate random but reproducible boards, formation
/// shapes and positions for property-based testing.
pub mod strategies {
    use proptest::prelude::*;
    use squad_core::formation::{FormationOffset, FormationShape};
    use squad_core::grid::{OccupancyGrid, TileCode, TileCoord};
    use squad_core::math::{Fixed, Vec2Fixed};

    /// Generate a fixed-point number in a board-sized range.
    ///
    /// Range: -1000 to 1000
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-1000i32..1000i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D vector for positions.
    pub fn arb_vec2_position() -> impl Strategy<Value = Vec2Fixed> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| Vec2Fixed::new(x, y))
    }

    /// Generate a fixed-point speed.
    ///
    /// Range: 0 to 20 (units per tick)
    pub fn arb_fixed_speed() -> impl Strategy<Value = Fixed> {
        (0i32..20i32).prop_map(Fixed::from_num)
    }

    /// Generate a fire range.
    pub fn arb_fire_range() -> impl Strategy<Value = Fixed> {
        (1i32..300i32).prop_map(Fixed::from_num)
    }

    /// Generate any tile code other than `Occupied`.
    pub fn arb_terrain_code() -> impl Strategy<Value = TileCode> {
        prop_oneof![
            4 => Just(TileCode::Free),
            1 => Just(TileCode::Blocked),
            1 => Just(TileCode::Crossing),
            1 => Just(TileCode::EnemyLane),
        ]
    }

    /// Generate a board of 1-8 rows by 1-8 columns with mixed terrain.
    pub fn arb_grid() -> impl Strategy<Value = OccupancyGrid> {
        (1usize..=8, 1usize..=8)
            .prop_flat_map(|(rows, cols)| {
                proptest::collection::vec(proptest::collection::vec(arb_terrain_code(), cols), rows)
            })
            .prop_map(|rows| {
                OccupancyGrid::from_rows(&rows, Fixed::from_num(32)).expect("generated rows are rectangular")
            })
    }

    /// Generate a tile coordinate within `rows` x `cols`, or one step outside it.
    pub fn arb_tile_near(rows: u32, cols: u32) -> impl Strategy<Value = TileCoord> {
        (-1..=rows as i32, -1..=cols as i32).prop_map(|(row, col)| TileCoord::new(row, col))
    }

    /// Generate a formation shape with 1-11 distinct offsets within 3 tiles,
    /// in random declaration order.
    pub fn arb_shape() -> impl Strategy<Value = FormationShape> {
        proptest::collection::btree_set((-3i32..=3, -3i32..=3), 1..12)
            .prop_map(|set| {
                set.into_iter()
                    .map(|(row, col)| FormationOffset::new(row, col))
                    .collect::<Vec<_>>()
            })
            .prop_shuffle()
            .prop_map(|offsets| {
                FormationShape::new("generated", offsets).expect("offsets are distinct and non-empty")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{quiet_sim, select_all};
    use squad_core::grid::TileCoord;
    use squad_core::unit::UnitId;

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n, _| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_detects_divergence() {
        let counter = std::cell::Cell::new(0u64);
        let result = verify_determinism(
            2,
            1,
            || {
                counter.set(counter.get() + 1);
                counter.get()
            },
            |_, _| {},
            |n| *n,
        );
        assert!(!result.is_deterministic);
        assert_eq!(result.unique_hashes().len(), 2);
    }

    #[test]
    fn test_scripted_move_is_deterministic() {
        let result = verify_determinism(
            3,
            80,
            || quiet_sim(&["U....", ".U...", ".....", "....."]),
            |sim: &mut Simulation, tick| {
                if tick == 5 {
                    select_all(sim, &[UnitId(0), UnitId(1)]);
                    let _ = sim.command_move(TileCoord::new(3, 3));
                }
                sim.tick();
            },
            Simulation::state_hash,
        );
        result.assert_deterministic();
    }

    #[test]
    fn test_no_divergence_on_quiet_board() {
        assert_eq!(find_first_divergence(|| quiet_sim(&["U.", ".."]), 50), None);
        assert!(verify_simulation_determinism(|| quiet_sim(&["U.", ".."]), 50));
    }

    #[test]
    fn test_compute_hash_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
    }
}
