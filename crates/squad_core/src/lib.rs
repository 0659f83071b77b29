//! # Squad Core
//!
//! Deterministic squad movement simulation for a tile-based tower defense.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No wall-clock timers (every delay counts simulation ticks)
//! - No floating-point state (uses fixed-point)
//!
//! This separation enables:
//! - Headless runs and scripted scenarios
//! - Determinism testing
//! - Hosting the same rules under any renderer
//!
//! ## Crate Structure
//!
//! - [`grid`] - Occupancy grid and tile codes
//! - [`formation`] - Formation shapes and greedy tile assignment
//! - [`state_machine`] - Per-unit movement state machine
//! - [`pathfinding`] - Path planning adapter over a grid search
//! - [`squad`] - Selection and move coordination
//! - [`targeting`] - Target selection and lead prediction
//! - [`simulation`] - Core simulation loop

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod config;
pub mod enemy;
pub mod error;
pub mod formation;
pub mod grid;
pub mod input;
pub mod level;
pub mod math;
pub mod pathfinding;
pub mod simulation;
pub mod squad;
pub mod state_machine;
pub mod targeting;
pub mod unit;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{Hit, Projectile, ProjectileId};
    pub use crate::config::SimConfig;
    pub use crate::enemy::{Enemy, EnemyId, EnemyPath, HomeBase};
    pub use crate::error::{CommandRejection, Result, SquadError};
    pub use crate::formation::{assign_formation, FormationCatalog, FormationShape};
    pub use crate::grid::{OccupancyGrid, TileCode, TileCoord, TileSet};
    pub use crate::input::{InputAction, InputEvent, Key, Modifiers, PointerButton};
    pub use crate::level::LevelLayout;
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::pathfinding::{GridSearch, PathPlanner, TilePath};
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::squad::{FormationPreview, MoveOrder, SquadCoordinator};
    pub use crate::state_machine::{MovementEvent, MovementState};
    pub use crate::targeting::{AimSolution, PredictPosition};
    pub use crate::unit::{Unit, UnitId, UnitKind, UnitStats};
}
