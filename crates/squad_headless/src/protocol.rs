//! JSON protocol for headless sessions.
//!
//! The headless runner communicates via JSON lines (one JSON object per line):
//!
//! **Input (stdin):** Commands from the controller
//! **Output (stdout):** Responses and state snapshots
//!
//! # Protocol Flow
//!
//! 1. Runner starts, outputs `{"type":"ready","version":"1.0","tick":0}`
//! 2. Controller sends commands as JSON lines
//! 3. Runner answers every command with one response line
//! 4. On `quit`, outputs `{"type":"bye"}` and exits
//!
//! # Example Session
//!
//! ```text
//! <- {"type":"ready","version":"1.0","tick":0}
//! -> {"cmd":"select","units":[0,1]}
//! <- {"type":"ack","cmd":"select"}
//! -> {"cmd":"move","row":7,"col":9}
//! <- {"type":"moved","assignments":[{"unit":0,"row":7,"col":9},...],"requested":[0,1]}
//! -> {"cmd":"tick","count":60}
//! <- {"type":"ticked","tick":60,"alerts":[],"shots":0,"hits":0,"escaped":0,"game_over":false}
//! -> {"cmd":"query"}
//! <- {"type":"state","tick":60,...}
//! ```

use serde::{Deserialize, Serialize};

use squad_core::grid::TileCoord;
use squad_core::simulation::Simulation;
use squad_core::state_machine::MovementState;
use squad_core::unit::{UnitId, UnitKind};

// ============================================================================
// Input Commands (Controller -> Runner)
// ============================================================================

/// Commands that can be sent to the headless runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Advance simulation by N ticks (default: 1).
    Tick {
        #[serde(default = "default_tick_count")]
        count: u32,
    },

    /// Place a squad unit on a tile.
    Place {
        row: i32,
        col: i32,
        #[serde(default)]
        kind: UnitKind,
    },

    /// Replace the selection; an empty list clears it.
    Select { units: Vec<u32> },

    /// Move the selection in formation around a tile.
    Move { row: i32, col: i32 },

    /// Cycle to the next formation.
    RotateFormation,

    /// Take a unit off the board.
    Remove { unit: u32 },

    /// Query current state without advancing time.
    Query {
        /// Include an ASCII rendering of the board.
        #[serde(default)]
        ascii: bool,
    },

    /// Report the current state hash (for determinism verification).
    Hash,

    /// Quit the session.
    Quit,
}

fn default_tick_count() -> u32 {
    1
}

// ============================================================================
// Output Responses (Runner -> Controller)
// ============================================================================

/// Responses sent from the headless runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Runner is ready to accept commands.
    Ready { version: String, tick: u64 },

    /// Acknowledgment of a command.
    Ack { cmd: String },

    /// Error processing a command.
    Error {
        message: String,
        cmd: Option<String>,
    },

    /// A unit was placed.
    Placed { unit: u32, row: i32, col: i32 },

    /// A move order was accepted.
    Moved {
        assignments: Vec<Assignment>,
        requested: Vec<u32>,
    },

    /// Formation changed.
    Formation { name: String },

    /// Summary of the ticks just run.
    Ticked {
        tick: u64,
        alerts: Vec<String>,
        shots: u32,
        hits: u32,
        escaped: u32,
        game_over: bool,
    },

    /// Current game state.
    State(StateSnapshot),

    /// State hash for determinism verification.
    StateHash { tick: u64, hash: u64 },

    /// Goodbye message before shutdown.
    Bye,
}

// ============================================================================
// State Types
// ============================================================================

/// A unit and the tile it was sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub unit: u32,
    pub row: i32,
    pub col: i32,
}

/// State of a single squad unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub id: u32,
    pub kind: UnitKind,
    pub x: f64,
    pub y: f64,
    pub row: i32,
    pub col: i32,
    pub state: MovementState,
    pub selected: bool,
}

/// State of a single active enemy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub hp: u32,
}

/// Full observable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tick: u64,
    pub formation: String,
    pub selection: Vec<u32>,
    pub units: Vec<UnitState>,
    pub enemies: Vec<EnemyState>,
    pub projectiles: usize,
    pub base_hp: u32,
    pub game_over: bool,
    pub hash: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascii: Option<String>,
}

impl StateSnapshot {
    /// Capture the state of `sim`.
    pub fn capture(sim: &Simulation, ascii: bool) -> Self {
        let units = sim
            .units()
            .values()
            .map(|unit| {
                let pos = unit.position();
                UnitState {
                    id: unit.id().0,
                    kind: unit.kind(),
                    x: pos.x.to_num(),
                    y: pos.y.to_num(),
                    row: unit.anchor().row,
                    col: unit.anchor().col,
                    state: unit.state(),
                    selected: sim.coordinator().is_selected(unit.id()),
                }
            })
            .collect();

        let enemies = sim
            .enemies()
            .enemies()
            .iter()
            .filter(|e| e.is_active())
            .map(|e| EnemyState {
                id: e.id().0,
                x: e.position().x.to_num(),
                y: e.position().y.to_num(),
                hp: e.hp(),
            })
            .collect();

        Self {
            tick: sim.get_tick(),
            formation: sim.formation().to_string(),
            selection: sim.selection().iter().map(|id| id.0).collect(),
            units,
            enemies,
            projectiles: sim.projectiles().active().count(),
            base_hp: sim.base().hp(),
            game_over: sim.is_game_over(),
            hash: sim.state_hash(),
            ascii: ascii.then(|| crate::ascii::render(sim, &crate::ascii::AsciiConfig::default())),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

impl Response {
    /// Create a ready response.
    pub fn ready(tick: u64) -> Self {
        Self::Ready {
            version: "1.0".to_string(),
            tick,
        }
    }

    /// Create an acknowledgment.
    pub fn ack(cmd: &str) -> Self {
        Self::Ack {
            cmd: cmd.to_string(),
        }
    }

    /// Create an error response.
    pub fn error(message: impl Into<String>, cmd: Option<&str>) -> Self {
        Self::Error {
            message: message.into(),
            cmd: cmd.map(String::from),
        }
    }

    /// Serialize to JSON line (with newline).
    pub fn to_json_line(&self) -> String {
        let mut json = serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"type":"error","message":"Serialization failed: {}"}}"#,
                e
            )
        });
        json.push('\n');
        json
    }
}

impl Command {
    /// Parse from a JSON line.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Get command name for acknowledgment.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tick { .. } => "tick",
            Self::Place { .. } => "place",
            Self::Select { .. } => "select",
            Self::Move { .. } => "move",
            Self::RotateFormation => "rotate_formation",
            Self::Remove { .. } => "remove",
            Self::Query { .. } => "query",
            Self::Hash => "hash",
            Self::Quit => "quit",
        }
    }
}

impl From<(UnitId, TileCoord)> for Assignment {
    fn from((unit, tile): (UnitId, TileCoord)) -> Self {
        Self {
            unit: unit.0,
            row: tile.row,
            col: tile.col,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tick_command() {
        let json = r#"{"cmd":"tick","count":60}"#;
        let cmd = Command::from_json(json).unwrap();
        assert_eq!(cmd, Command::Tick { count: 60 });

        let cmd = Command::from_json(r#"{"cmd":"tick"}"#).unwrap();
        assert_eq!(cmd, Command::Tick { count: 1 });
    }

    #[test]
    fn test_parse_place_command() {
        let cmd = Command::from_json(r#"{"cmd":"place","row":3,"col":4}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Place {
                row: 3,
                col: 4,
                kind: UnitKind::Tank
            }
        );

        let cmd = Command::from_json(r#"{"cmd":"place","row":3,"col":4,"kind":"Scout"}"#).unwrap();
        assert!(matches!(cmd, Command::Place { kind: UnitKind::Scout, .. }));
    }

    #[test]
    fn test_parse_unit_commands() {
        let cmd = Command::from_json(r#"{"cmd":"rotate_formation"}"#).unwrap();
        assert_eq!(cmd.name(), "rotate_formation");

        let cmd = Command::from_json(r#"{"cmd":"select","units":[0,2]}"#).unwrap();
        assert_eq!(cmd, Command::Select { units: vec![0, 2] });

        let cmd = Command::from_json(r#"{"cmd":"query"}"#).unwrap();
        assert_eq!(cmd, Command::Query { ascii: false });
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Command::from_json(r#"{"cmd":"teleport"}"#).is_err());
    }

    #[test]
    fn test_response_serialization() {
        let json = Response::ready(0).to_json_line();
        assert_eq!(json, "{\"type\":\"ready\",\"version\":\"1.0\",\"tick\":0}\n");

        let json = Response::error("Unknown unit: 4", Some("remove")).to_json_line();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""cmd":"remove""#));
    }
}
