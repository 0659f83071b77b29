//! Headless squad runner.
//!
//! This binary runs the simulation without graphics, either from a RON
//! scenario or controlled via JSON on stdin/stdout.
//!
//! # Usage
//!
//! ```bash
//! # Interactive mode - read commands from stdin
//! cargo run -p squad_headless -- interactive
//!
//! # Run a scenario and print a summary line
//! cargo run -p squad_headless -- run --scenario scenarios/default.ron --ascii
//!
//! # Verify determinism
//! cargo run -p squad_headless -- verify --scenario scenarios/default.ron --runs 5
//! ```
//!
//! # Protocol
//!
//! Input (stdin): JSON commands, one per line
//! Output (stdout): JSON responses, one per line
//! Logs (stderr): Debug information
//!
//! See the protocol module for command/response format.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use squad_headless::{
    ascii::{render, AsciiConfig},
    runner::{run_scenario, verify_scenario, HeadlessConfig, HeadlessRunner},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "squad_headless")]
#[command(about = "Headless squad runner for scripted scenarios and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario to completion and print a JSON summary
    Run {
        /// Scenario file to load (default level when omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Override the scenario length
        #[arg(short, long)]
        ticks: Option<u64>,

        /// Print the final board as ASCII to stderr
        #[arg(long)]
        ascii: bool,
    },

    /// Drive the simulation over the JSON-lines protocol
    Interactive {
        /// Scenario file to load (only its level and config are used)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Output state after every tick command
        #[arg(long)]
        auto_state: bool,
    },

    /// Verify determinism by running a scenario multiple times
    Verify {
        /// Scenario to test
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,

        /// Override the scenario length
        #[arg(short, long)]
        ticks: Option<u64>,
    },
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for protocol)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    match cli.command {
        Some(Commands::Run {
            scenario,
            ticks,
            ascii,
        }) => {
            cmd_run(scenario, ticks, ascii);
        }
        Some(Commands::Interactive {
            scenario,
            auto_state,
        }) => {
            cmd_interactive(scenario, auto_state);
        }
        Some(Commands::Verify {
            scenario,
            runs,
            ticks,
        }) => {
            cmd_verify(scenario, runs, ticks);
        }
        None => {
            // Default: interactive mode
            cmd_interactive(None, false);
        }
    }
}

fn load_scenario(path: Option<PathBuf>) -> Scenario {
    match Scenario::load_or_default(path.as_deref()) {
        Ok(scenario) => scenario,
        Err(e) => {
            eprintln!("Failed to load scenario: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run a scenario and print its summary
fn cmd_run(path: Option<PathBuf>, ticks: Option<u64>, ascii: bool) {
    let scenario = load_scenario(path);

    let (summary, sim) = match run_scenario(&scenario, ticks) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Scenario failed: {}", e);
            std::process::exit(1);
        }
    };

    if ascii {
        eprint!("{}", render(&sim, &AsciiConfig::default()));
    }

    match serde_json::to_string(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize summary: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run an interactive protocol session
fn cmd_interactive(path: Option<PathBuf>, auto_state: bool) {
    tracing::info!("Starting interactive session");

    let scenario = load_scenario(path);
    let sim = match scenario.build() {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("Failed to build simulation: {}", e);
            std::process::exit(1);
        }
    };

    let config = HeadlessConfig {
        auto_state_output: auto_state,
    };
    let mut runner = HeadlessRunner::with_config(sim, config);

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    if let Err(e) = runner.run(stdin.lock(), stdout.lock()) {
        tracing::error!(error = %e, "session aborted");
        std::process::exit(1);
    }
}

/// Verify determinism
fn cmd_verify(path: Option<PathBuf>, runs: u32, ticks: Option<u64>) {
    let scenario = load_scenario(path);
    tracing::info!(
        "Verifying determinism: {} ({} runs)",
        scenario.name,
        runs
    );

    let hashes = match verify_scenario(&scenario, runs, ticks) {
        Ok(hashes) => hashes,
        Err(e) => {
            eprintln!("Scenario failed: {}", e);
            std::process::exit(1);
        }
    };

    if hashes.windows(2).all(|w| w[0] == w[1]) {
        eprintln!("PASS: All {} runs produced identical results", runs);
    } else {
        eprintln!("FAIL: Non-determinism detected! Hashes: {:?}", hashes);
        std::process::exit(1);
    }
}
