//! Scenario loading and configuration.
//!
//! A scenario is a level, the tunables to run it with and a script of
//! actions keyed by tick. Scripts drive the same entry points a player
//! would, so a scenario replays exactly like a recorded session.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use squad_core::config::SimConfig;
use squad_core::error::SquadError;
use squad_core::grid::TileCoord;
use squad_core::input::InputEvent;
use squad_core::level::LevelLayout;
use squad_core::simulation::Simulation;
use squad_core::unit::{UnitId, UnitKind};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// The level or configuration was rejected by the simulation.
    #[error("Invalid scenario: {0}")]
    Invalid(#[from] SquadError),
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptedAction {
    /// Feed a raw input event through the decoder.
    Input(InputEvent),
    /// Place a unit.
    Place {
        /// Tile to place on.
        tile: TileCoord,
        /// Unit kind.
        #[serde(default)]
        kind: UnitKind,
    },
    /// Replace the selection.
    Select(Vec<UnitId>),
    /// Move the selection in formation around a tile.
    Move(TileCoord),
    /// Switch to a named formation.
    Formation(String),
    /// Cycle to the next formation.
    RotateFormation,
    /// Take a unit off the board.
    Remove(UnitId),
}

/// An action and the tick before which it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedEvent {
    /// Tick counter value when the action is applied.
    pub tick: u64,
    /// What to do.
    pub action: ScriptedAction,
}

/// A complete scenario configuration.
///
/// # Example RON
///
/// ```ron
/// Scenario(
///     name: "Hold the bend",
///     ticks: 400,
///     config: (move_delay_ticks: 20),
///     events: [
///         (tick: 0, action: Select([UnitId(0), UnitId(1)])),
///         (tick: 0, action: Move((row: 7, col: 9))),
///     ],
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Ticks to run when no override is given.
    #[serde(default = "default_ticks")]
    pub ticks: u64,
    /// Simulation tunables.
    #[serde(default)]
    pub config: SimConfig,
    /// Board layout.
    #[serde(default)]
    pub level: LevelLayout,
    /// Scripted actions, in any order.
    #[serde(default)]
    pub events: Vec<ScriptedEvent>,
}

fn default_ticks() -> u64 {
    600
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            description: "Default level, no script".to_string(),
            ticks: default_ticks(),
            config: SimConfig::default(),
            level: LevelLayout::default(),
            events: Vec::new(),
        }
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Load from an optional path, falling back to [`Scenario::default`].
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ScenarioError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Build a fresh simulation for this scenario.
    pub fn build(&self) -> Result<Simulation, ScenarioError> {
        Ok(Simulation::new(self.config.clone(), &self.level)?)
    }

    /// Actions scheduled for `tick`, in declaration order.
    pub fn actions_at(&self, tick: u64) -> impl Iterator<Item = &ScriptedAction> {
        self.events
            .iter()
            .filter(move |e| e.tick == tick)
            .map(|e| &e.action)
    }
}

/// Apply one scripted action.
///
/// Failures are logged and reported back; a script keeps running past a
/// rejected action the same way a player keeps playing.
pub fn apply_action(sim: &mut Simulation, action: &ScriptedAction) -> Result<(), String> {
    let result = match action {
        ScriptedAction::Input(event) => {
            sim.handle_input(*event);
            Ok(())
        }
        ScriptedAction::Place { tile, kind } => sim.place_unit(*tile, *kind).map(|_| ()).map_err(|e| e.to_string()),
        ScriptedAction::Select(units) => {
            sim.clear_selection();
            units
                .iter()
                .try_for_each(|&unit| sim.add_to_selection(unit))
                .map_err(|e| e.to_string())
        }
        ScriptedAction::Move(anchor) => sim.command_move(*anchor).map(|_| ()).map_err(|e| e.to_string()),
        ScriptedAction::Formation(name) => sim.set_formation(name).map_err(|e| e.to_string()),
        ScriptedAction::RotateFormation => {
            sim.rotate_formation();
            Ok(())
        }
        ScriptedAction::Remove(unit) => sim.remove_unit(*unit).map_err(|e| e.to_string()),
    };

    if let Err(message) = &result {
        tracing::warn!(tick = sim.get_tick(), ?action, %message, "scripted action failed");
    }
    result
}
