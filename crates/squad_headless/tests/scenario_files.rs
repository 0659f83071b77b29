//! Scenario files on disk, end to end.

use std::io::Write;

use squad_headless::runner::{run_scenario, verify_scenario};
use squad_headless::scenario::{Scenario, ScenarioError};

fn bundled_default() -> Scenario {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/default.ron");
    Scenario::load(path).expect("bundled scenario parses")
}

#[test]
fn test_bundled_scenario_runs_clean() {
    let scenario = bundled_default();
    assert_eq!(scenario.events.len(), 8);

    let (summary, sim) = run_scenario(&scenario, Some(600)).unwrap();
    assert_eq!(summary.ticks, 600);
    assert_eq!(summary.units, 3);
    assert_eq!(summary.failed_actions, 0);
    assert!(summary.shots > 0);
    assert!(sim.occupancy_consistent());
}

#[test]
fn test_bundled_scenario_is_deterministic() {
    let hashes = verify_scenario(&bundled_default(), 3, Some(900)).unwrap();
    assert_eq!(hashes.len(), 3);
    assert!(hashes.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn test_load_from_temp_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"Scenario(
            name: "tiny",
            ticks: 30,
            config: (enemy_spawn_interval_ticks: 0),
            level: (
                rows: 3,
                cols: 4,
                lane: [(orientation: Horizontal, start: (row: 0, col: 0), size: 4)],
                starting_units: [(tile: (row: 2, col: 0))],
            ),
            events: [(tick: 0, action: Place(tile: (row: 2, col: 3)))],
        )"#
    )
    .unwrap();

    let scenario = Scenario::load(file.path()).unwrap();
    let (summary, _) = run_scenario(&scenario, None).unwrap();
    assert_eq!(summary.scenario, "tiny");
    assert_eq!(summary.ticks, 30);
    assert_eq!(summary.units, 2);
    assert_eq!(summary.shots, 0);
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ron");
    std::fs::write(&path, "Scenario(name: \"x\", ticks: -1)").unwrap();

    assert!(matches!(Scenario::load(&path), Err(ScenarioError::ParseError(_))));
    assert!(matches!(
        Scenario::load(dir.path().join("missing.ron")),
        Err(ScenarioError::FileNotFound(_))
    ));
}
