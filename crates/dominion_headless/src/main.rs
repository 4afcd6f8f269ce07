//! Headless empire simulation.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish
//! cargo run -p dominion_headless -- run
//!
//! # Run a scenario file for 30 turns and save metrics
//! cargo run -p dominion_headless -- run --scenario my.ron --turns 30 --output results/run.json
//!
//! # Verify that repeated runs agree
//! cargo run -p dominion_headless -- verify --runs 8
//! ```
//!
//! Metrics go to stdout (or `--output`); logs go to stderr.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dominion_headless::{run_scenario, verify_runs, RunConfig, RunError, Scenario};

#[derive(Parser)]
#[command(name = "dominion_headless")]
#[command(about = "Headless empire simulation for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scenario and report metrics
    Run {
        /// Scenario file (defaults to the built-in skirmish)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Override the scenario's turn count
        #[arg(short, long)]
        turns: Option<u32>,

        /// Override the scenario's seed
        #[arg(long)]
        seed: Option<u64>,

        /// Tick cap per battle
        #[arg(long)]
        max_battle_ticks: Option<u32>,

        /// Write metrics JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a scenario several times and compare state hashes
    Verify {
        /// Scenario file (defaults to the built-in skirmish)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Override the scenario's turn count
        #[arg(short, long)]
        turns: Option<u32>,

        /// Number of runs
        #[arg(short, long, default_value = "4")]
        runs: usize,
    },
}

fn load(path: Option<&PathBuf>) -> Result<Scenario, RunError> {
    let scenario = match path {
        Some(path) => Scenario::load(path)?,
        None => Scenario::skirmish()?,
    };
    Ok(scenario)
}

fn cmd_run(
    scenario: Option<PathBuf>,
    turns: Option<u32>,
    seed: Option<u64>,
    max_battle_ticks: Option<u32>,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario = load(scenario.as_ref())?;
    let mut config = RunConfig::from_scenario(&scenario);
    config.turns = turns.unwrap_or(config.turns);
    config.seed = seed.unwrap_or(config.seed);
    config.max_battle_ticks = max_battle_ticks.unwrap_or(config.max_battle_ticks);

    let metrics = run_scenario(&scenario, config)?;
    match output {
        Some(path) => {
            metrics.write_json(&path)?;
            tracing::info!(path = %path.display(), "Metrics written");
        }
        None => println!("{}", metrics.to_json()?),
    }

    eprintln!("Scenario: {} ({} turns, seed {})", metrics.scenario, metrics.turns.len(), metrics.seed);
    for player in &metrics.players {
        eprintln!(
            "  {:<12} money {:>6}  planets {}  fleets {}  battles {}W/{}L",
            player.name, player.money, player.planets, player.fleets, player.battles_won, player.battles_lost
        );
    }
    eprintln!("Final state hash: {:016x}", metrics.final_state_hash);
    Ok(())
}

fn cmd_verify(scenario: Option<PathBuf>, turns: Option<u32>, runs: usize) -> Result<bool, Box<dyn std::error::Error>> {
    let scenario = load(scenario.as_ref())?;
    let mut config = RunConfig::from_scenario(&scenario);
    config.turns = turns.unwrap_or(config.turns);

    let report = verify_runs(&scenario, config, runs)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.deterministic)
}

fn main() {
    let cli = Cli::parse();

    // Logs to stderr; stdout carries JSON.
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
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            turns,
            seed,
            max_battle_ticks,
            output,
        } => cmd_run(scenario, turns, seed, max_battle_ticks, output),
        Commands::Verify { scenario, turns, runs } => match cmd_verify(scenario, turns, runs) {
            Ok(true) => Ok(()),
            Ok(false) => {
                eprintln!("FATAL: runs diverged");
                std::process::exit(2);
            }
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("FATAL: {e}");
        std::process::exit(1);
    }
}
