//! Headless squad runner for scripted scenarios and CI verification.
//!
//! This crate drives a [`squad_core::simulation::Simulation`] without any
//! renderer. It can be controlled via JSON commands on stdin, with
//! responses on stdout. This enables:
//!
//! - **Scripted scenarios**: RON files with a level, tunables and timed actions
//! - **CI verification**: Automated determinism checks over whole scenarios
//! - **External controllers**: A bot or test harness playing over the protocol
//!
//! # Protocol
//!
//! Communication uses JSON lines (one JSON object per line):
//!
//! - **stdin**: Commands from controller (tick, place, select, move, etc.)
//! - **stdout**: Responses and state snapshots (JSON)
//! - **stderr**: Debug logs (human-readable)
//!
//! See [`protocol`] module for the command/response format.
//!
//! # Example
//!
//! ```bash
//! # Run interactively
//! echo '{"cmd":"tick","count":60}' | cargo run -p squad_headless -- interactive
//!
//! # Run a scenario
//! cargo run -p squad_headless -- run --scenario scenarios/default.ron
//!
//! # Verify determinism
//! cargo run -p squad_headless -- verify --scenario scenarios/default.ron --runs 5
//! ```

pub mod ascii;
pub mod protocol;
pub mod runner;
pub mod scenario;

pub use ascii::{render, AsciiConfig};
pub use protocol::{Command, Response, StateSnapshot};
pub use runner::{run_scenario, verify_scenario, HeadlessConfig, HeadlessRunner, RunSummary};
pub use scenario::{Scenario, ScenarioError, ScriptedAction, ScriptedEvent};
