//! Headless runner implementation.
//!
//! [`HeadlessRunner`] wraps a [`Simulation`] and answers protocol
//! commands. [`run_scenario`] and [`verify_scenario`] drive a scripted
//! scenario to completion without any controller.

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};

use squad_core::grid::TileCoord;
use squad_core::simulation::Simulation;
use squad_core::unit::UnitId;

use crate::protocol::{Assignment, Command, Response, StateSnapshot};
use crate::scenario::{apply_action, Scenario, ScenarioError};

/// Headless runner configuration.
#[derive(Debug, Clone, Default)]
pub struct HeadlessConfig {
    /// Output a state snapshot after every `tick` command.
    pub auto_state_output: bool,
}

/// Protocol-driven session over one simulation.
pub struct HeadlessRunner {
    sim: Simulation,
    config: HeadlessConfig,
}

impl HeadlessRunner {
    /// Create a runner around an existing simulation.
    pub fn new(sim: Simulation) -> Self {
        Self::with_config(sim, HeadlessConfig::default())
    }

    /// Create a runner with custom configuration.
    pub fn with_config(sim: Simulation, config: HeadlessConfig) -> Self {
        Self { sim, config }
    }

    /// The simulation being driven.
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    /// Handle one command.
    ///
    /// Returns the responses to emit and whether the session should end.
    pub fn handle(&mut self, cmd: Command) -> (Vec<Response>, bool) {
        let name = cmd.name();
        tracing::debug!(cmd = name, "handling command");

        let response = match cmd {
            Command::Tick { count } => {
                let mut responses = vec![self.tick(count)];
                if self.config.auto_state_output {
                    responses.push(Response::State(StateSnapshot::capture(&self.sim, false)));
                }
                return (responses, false);
            }
            Command::Place { row, col, kind } => match self.sim.place_unit(TileCoord::new(row, col), kind) {
                Ok(unit) => Response::Placed { unit: unit.0, row, col },
                Err(e) => Response::error(e.to_string(), Some(name)),
            },
            Command::Select { units } => {
                self.sim.clear_selection();
                match units
                    .into_iter()
                    .try_for_each(|id| self.sim.add_to_selection(UnitId(id)))
                {
                    Ok(()) => Response::ack(name),
                    Err(e) => Response::error(e.to_string(), Some(name)),
                }
            }
            Command::Move { row, col } => match self.sim.command_move(TileCoord::new(row, col)) {
                Ok(order) => Response::Moved {
                    assignments: order.assignments.into_iter().map(Assignment::from).collect(),
                    requested: order.requested.iter().map(|id| id.0).collect(),
                },
                Err(rejection) => Response::error(rejection.to_string(), Some(name)),
            },
            Command::RotateFormation => Response::Formation {
                name: self.sim.rotate_formation().to_string(),
            },
            Command::Remove { unit } => match self.sim.remove_unit(UnitId(unit)) {
                Ok(()) => Response::ack(name),
                Err(e) => Response::error(e.to_string(), Some(name)),
            },
            Command::Query { ascii } => Response::State(StateSnapshot::capture(&self.sim, ascii)),
            Command::Hash => Response::StateHash {
                tick: self.sim.get_tick(),
                hash: self.sim.state_hash(),
            },
            Command::Quit => return (vec![Response::Bye], true),
        };

        (vec![response], false)
    }

    fn tick(&mut self, count: u32) -> Response {
        let mut alerts: Vec<String> = self.sim.take_alerts().iter().map(ToString::to_string).collect();
        let (mut shots, mut hits, mut escaped) = (0u32, 0u32, 0u32);

        for _ in 0..count {
            let events = self.sim.tick();
            alerts.extend(events.alerts.iter().map(ToString::to_string));
            shots += events.shots.len() as u32;
            hits += events.hits.len() as u32;
            escaped += events.escaped.len() as u32;
            if events.base_destroyed {
                tracing::info!(tick = events.tick, "home base destroyed");
                break;
            }
        }

        Response::Ticked {
            tick: self.sim.get_tick(),
            alerts,
            shots,
            hits,
            escaped,
            game_over: self.sim.is_game_over(),
        }
    }

    /// Run the protocol loop until `quit` or end of input.
    ///
    /// Reads JSON commands from `input`, writes responses to `output`.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> io::Result<()> {
        output.write_all(Response::ready(self.sim.get_tick()).to_json_line().as_bytes())?;
        output.flush()?;

        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let (responses, quit) = match Command::from_json(&line) {
                Ok(cmd) => self.handle(cmd),
                Err(e) => {
                    tracing::warn!(%line, error = %e, "unparseable command");
                    (vec![Response::error(format!("Invalid command: {e}"), None)], false)
                }
            };

            for response in responses {
                output.write_all(response.to_json_line().as_bytes())?;
            }
            output.flush()?;

            if quit {
                break;
            }
        }

        tracing::info!(tick = self.sim.get_tick(), "session ended");
        Ok(())
    }
}

/// Outcome of a scripted run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Ticks actually simulated.
    pub ticks: u64,
    /// Final state hash.
    pub hash: u64,
    /// Units on the board at the end.
    pub units: usize,
    /// Shots fired.
    pub shots: u64,
    /// Enemies killed.
    pub kills: u64,
    /// Enemies that reached the base.
    pub escaped: u64,
    /// Command rejections raised during the run.
    pub alerts: u64,
    /// Scripted actions that failed.
    pub failed_actions: u64,
    /// Base hit points left.
    pub base_hp: u32,
    /// Whether the base fell.
    pub game_over: bool,
}

/// Run a scenario to completion and summarize it.
///
/// Stops early if the base falls. `ticks` overrides the scenario's own
/// length.
pub fn run_scenario(scenario: &Scenario, ticks: Option<u64>) -> Result<(RunSummary, Simulation), ScenarioError> {
    let mut sim = scenario.build()?;
    let limit = ticks.unwrap_or(scenario.ticks);
    tracing::info!(scenario = %scenario.name, ticks = limit, "running scenario");

    let mut summary = RunSummary {
        scenario: scenario.name.clone(),
        ticks: 0,
        hash: 0,
        units: 0,
        shots: 0,
        kills: 0,
        escaped: 0,
        alerts: 0,
        failed_actions: 0,
        base_hp: 0,
        game_over: false,
    };

    while sim.get_tick() < limit && !sim.is_game_over() {
        for action in scenario.actions_at(sim.get_tick()) {
            if apply_action(&mut sim, action).is_err() {
                summary.failed_actions += 1;
            }
        }

        let events = sim.tick();
        summary.alerts += events.alerts.len() as u64;
        summary.shots += events.shots.len() as u64;
        summary.kills += events.hits.iter().filter(|h| h.killed).count() as u64;
        summary.escaped += events.escaped.len() as u64;
    }

    summary.ticks = sim.get_tick();
    summary.hash = sim.state_hash();
    summary.units = sim.units().len();
    summary.base_hp = sim.base().hp();
    summary.game_over = sim.is_game_over();

    tracing::info!(
        ticks = summary.ticks,
        hash = summary.hash,
        kills = summary.kills,
        "scenario finished"
    );
    Ok((summary, sim))
}

/// Run a scenario `runs` times and collect the final hashes.
pub fn verify_scenario(scenario: &Scenario, runs: u32, ticks: Option<u64>) -> Result<Vec<u64>, ScenarioError> {
    (0..runs)
        .map(|run| {
            let (summary, _) = run_scenario(scenario, ticks)?;
            tracing::debug!(run, hash = summary.hash, "verification run");
            Ok(summary.hash)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_test_utils::fixtures::quiet_sim;

    fn lines(output: &[u8]) -> Vec<serde_json::Value> {
        std::str::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_session_round_trip() {
        let mut runner = HeadlessRunner::new(quiet_sim(&["U....", "....."]));
        let input = [
            r#"{"cmd":"select","units":[0]}"#,
            r#"{"cmd":"move","row":1,"col":4}"#,
            r#"{"cmd":"tick","count":80}"#,
            r#"{"cmd":"query"}"#,
            r#"{"cmd":"quit"}"#,
            r#"{"cmd":"hash"}"#,
        ]
        .join("\n");

        let mut output = Vec::new();
        runner.run(input.as_bytes(), &mut output).unwrap();
        let out = lines(&output);

        assert_eq!(out.len(), 6);
        assert_eq!(out[0]["type"], "ready");
        assert_eq!(out[1]["type"], "ack");
        assert_eq!(out[2]["type"], "moved");
        assert_eq!(out[2]["assignments"][0]["col"], 4);
        assert_eq!(out[3]["tick"], 80);
        assert_eq!(out[4]["units"][0]["row"], 1);
        assert_eq!(out[4]["units"][0]["state"], "Engaged");
        assert_eq!(out[5]["type"], "bye");
    }

    #[test]
    fn test_errors_do_not_end_session() {
        let mut runner = HeadlessRunner::new(quiet_sim(&["U."]));
        let input = "not json\n{\"cmd\":\"move\",\"row\":0,\"col\":1}\n{\"cmd\":\"remove\",\"unit\":7}\n";

        let mut output = Vec::new();
        runner.run(input.as_bytes(), &mut output).unwrap();
        let out = lines(&output);

        assert_eq!(out.len(), 4);
        assert_eq!(out[1]["type"], "error");
        assert_eq!(out[2]["message"], "No units selected");
        assert_eq!(out[3]["message"], "Unknown unit: 7");
    }

    #[test]
    fn test_place_and_rotate() {
        let mut runner = HeadlessRunner::new(quiet_sim(&["..", ".."]));
        let (responses, quit) = runner.handle(Command::Place {
            row: 1,
            col: 1,
            kind: Default::default(),
        });
        assert!(!quit);
        assert_eq!(responses, vec![Response::Placed { unit: 0, row: 1, col: 1 }]);

        let (responses, _) = runner.handle(Command::RotateFormation);
        assert_eq!(
            responses,
            vec![Response::Formation {
                name: "horizontal".to_string()
            }]
        );
    }

    #[test]
    fn test_run_scenario_is_repeatable() {
        let scenario = Scenario::from_ron_str(
            r#"Scenario(
                name: "repeat",
                ticks: 200,
                config: (move_delay_ticks: 8, engage_delay_ticks: 8),
                events: [
                    (tick: 0, action: Select([UnitId(0), UnitId(1)])),
                    (tick: 2, action: Move((row: 8, col: 9))),
                ],
            )"#,
        )
        .unwrap();

        let (summary, sim) = run_scenario(&scenario, None).unwrap();
        assert_eq!(summary.ticks, 200);
        assert_eq!(summary.units, 2);
        assert_eq!(summary.failed_actions, 0);
        assert!(sim.occupancy_consistent());

        let hashes = verify_scenario(&scenario, 3, None).unwrap();
        assert_eq!(hashes, vec![summary.hash; 3]);
    }
}
