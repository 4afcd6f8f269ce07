//! Headless runner for the empire planning core.
//!
//! Loads a scenario, advances its world turn by turn with every empire under
//! AI control, and reports what happened as JSON. The same scenario and seed
//! always produce the same run, which the `verify` command checks by
//! running several copies in parallel and comparing state hashes.
//!
//! # Example
//!
//! ```bash
//! # Run the built-in skirmish and write metrics
//! cargo run -p dominion_headless -- run --output results/skirmish.json
//!
//! # Run a scenario file with a different seed
//! cargo run -p dominion_headless -- run --scenario scenarios/skirmish.ron --seed 7
//!
//! # Check determinism
//! cargo run -p dominion_headless -- verify --runs 4
//! ```

pub mod metrics;
pub mod runner;
pub mod scenario;

pub use metrics::{BattleReport, PlayerSummary, RunMetrics, TurnReport};
pub use runner::{run_scenario, verify_runs, RunConfig, RunError, TurnRunner, VerifyReport};
pub use scenario::{Scenario, ScenarioError};
