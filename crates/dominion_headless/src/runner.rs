//! Turn loop for headless runs.
//!
//! One turn is: allocation on every planet, a snapshot and planning cycle
//! per AI empire, sequential commits, then the battles the commits started.
//! Planning and battles run in parallel; everything that writes the world
//! runs in a fixed order so a seed always reproduces the same run.

use std::collections::BTreeMap;
use std::sync::Arc;

use dominion_core::allocation::run_allocation_pass;
use dominion_core::combat::{
    apply_battle_outcome, orbit_cleared, AutoBattleAi, Battle, BattleOutcome, Battlefield, GroundBattle, SpaceBattle,
    DEFAULT_FLEE_RATIO, DEFAULT_MAX_TICKS,
};
use dominion_core::error::GameError;
use dominion_core::ids::{FleetId, PlanetId};
use dominion_core::planning::{commit, EmpirePlanner, PlanningCycle};
use dominion_core::snapshot::WorldSnapshotBuilder;
use dominion_core::world::World;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::{BattleReport, RunMetrics, TurnReport};
use crate::scenario::{Scenario, ScenarioError};

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum RunError {
    /// The scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The core failed outside the expected planning outcomes.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Run parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Turns to simulate.
    pub turns: u32,
    /// Base seed for battle rolls.
    pub seed: u64,
    /// Tick cap per battle.
    pub max_battle_ticks: u32,
    /// Strength ratio below which the battle AI flees.
    pub flee_ratio: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            turns: 10,
            seed: 0,
            max_battle_ticks: DEFAULT_MAX_TICKS,
            flee_ratio: DEFAULT_FLEE_RATIO,
        }
    }
}

impl RunConfig {
    /// Turns and seed from the scenario, battle settings at their defaults.
    #[must_use]
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            turns: scenario.turns,
            seed: scenario.seed,
            ..Self::default()
        }
    }
}

/// Per-battle seed: stable for a given base seed, tick and planet.
#[must_use]
pub fn battle_seed(base: u64, tick: u64, planet: PlanetId) -> u64 {
    let mut x = base ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (u64::from(planet.0) << 32);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Owns the world for a run and advances it one turn at a time.
pub struct TurnRunner {
    world: World,
    config: RunConfig,
    metrics: RunMetrics,
}

impl TurnRunner {
    /// Runner over an existing world.
    #[must_use]
    pub fn new(world: World, config: RunConfig, label: impl Into<String>) -> Self {
        Self {
            world,
            metrics: RunMetrics::new(label, config.seed),
            config,
        }
    }

    /// Build the scenario's world and wrap it.
    pub fn from_scenario(scenario: &Scenario, config: RunConfig) -> Result<Self, RunError> {
        Ok(Self::new(scenario.build_world()?, config, scenario.name.clone()))
    }

    /// The live world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Metrics so far.
    #[must_use]
    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    /// Simulate one turn.
    pub fn run_turn(&mut self) -> Result<TurnReport, RunError> {
        let tick = self.world.tick;
        let mut report = TurnReport {
            tick,
            ..TurnReport::default()
        };

        let catalog = Arc::clone(self.world.catalog());
        for planet in self.world.planets_mut() {
            run_allocation_pass(planet, &catalog);
        }

        let views = WorldSnapshotBuilder::new(&self.world).build_ai_views()?;
        let cycles: Vec<PlanningCycle> = views
            .par_iter()
            .map(|view| EmpirePlanner::for_view(view).plan(view))
            .collect();

        // First attacker per planet gets the battle; later arrivals just move in.
        let mut attacks: BTreeMap<PlanetId, FleetId> = BTreeMap::new();
        for cycle in &cycles {
            for action in cycle.actions() {
                match commit(&mut self.world, cycle.player, &action) {
                    Ok(receipt) => {
                        report.actions_committed += 1;
                        report.money_spent += receipt.money_spent;
                        if let Some((fleet, planet)) = receipt.battle {
                            attacks.entry(planet).or_insert(fleet);
                        }
                    }
                    Err(_) => report.actions_rejected += 1,
                }
            }
        }

        let space = self.fight_space(tick, &attacks)?;
        let mut landings = Vec::new();
        for outcome in &space {
            let applied = apply_battle_outcome(&mut self.world, outcome)?;
            report.battles.push(BattleReport::new(outcome, &applied));
            if orbit_cleared(outcome) && self.world.fleet(outcome.context.fleet).is_some() {
                landings.push((outcome.context.planet, outcome.context.fleet));
            }
        }

        for outcome in self.fight_ground(&landings)? {
            let applied = apply_battle_outcome(&mut self.world, &outcome)?;
            report.battles.push(BattleReport::new(&outcome, &applied));
        }

        self.world.tick += 1;
        report.state_hash = self.world.state_hash()?;
        tracing::info!(
            tick,
            committed = report.actions_committed,
            rejected = report.actions_rejected,
            battles = report.battles.len(),
            hash = report.state_hash,
            "Turn complete"
        );
        self.metrics.record_turn(report.clone());
        Ok(report)
    }

    fn fight_space(&self, tick: u64, attacks: &BTreeMap<PlanetId, FleetId>) -> Result<Vec<BattleOutcome>, RunError> {
        let mut battles = Vec::with_capacity(attacks.len());
        for (&planet, &fleet) in attacks {
            let seed = battle_seed(self.config.seed, tick, planet);
            match SpaceBattle::from_world(&self.world, fleet, planet, seed) {
                Ok(field) => battles.push(Battle::with_max_ticks(field, self.config.max_battle_ticks)),
                Err(e) => tracing::warn!(%fleet, %planet, error = %e, "Space battle skipped"),
            }
        }
        self.run_battles(battles)
    }

    fn fight_ground(&self, landings: &[(PlanetId, FleetId)]) -> Result<Vec<BattleOutcome>, RunError> {
        let mut battles = Vec::with_capacity(landings.len());
        for &(planet, fleet) in landings {
            match GroundBattle::from_world(&self.world, fleet, planet) {
                Ok(field) => battles.push(Battle::with_max_ticks(field, self.config.max_battle_ticks)),
                Err(e) => tracing::warn!(%fleet, %planet, error = %e, "Ground battle skipped"),
            }
        }
        self.run_battles(battles)
    }

    fn run_battles<F: Battlefield + Send>(&self, mut battles: Vec<Battle<F>>) -> Result<Vec<BattleOutcome>, RunError> {
        let flee_ratio = self.config.flee_ratio;
        let outcomes = battles
            .par_iter_mut()
            .map(|battle| battle.run(&mut AutoBattleAi::new(flee_ratio)))
            .collect::<Result<Vec<_>, GameError>>()?;
        Ok(outcomes)
    }

    /// Run every configured turn and return the finished metrics.
    pub fn run(mut self) -> Result<RunMetrics, RunError> {
        tracing::info!(scenario = %self.metrics.scenario, turns = self.config.turns, seed = self.config.seed, "Run starting");
        for _ in 0..self.config.turns {
            self.run_turn()?;
        }
        self.metrics.finalize(&self.world);
        Ok(self.metrics)
    }
}

/// Run a scenario to completion.
pub fn run_scenario(scenario: &Scenario, config: RunConfig) -> Result<RunMetrics, RunError> {
    TurnRunner::from_scenario(scenario, config)?.run()
}

/// Result of running the same scenario several times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Runs compared.
    pub runs: usize,
    /// Whether every run matched the first.
    pub deterministic: bool,
    /// Final hash of each run.
    pub final_hashes: Vec<u64>,
    /// First turn whose hash differed, if any.
    pub first_divergent_turn: Option<usize>,
}

/// Run `runs` copies of a scenario in parallel and compare their hashes.
pub fn verify_runs(scenario: &Scenario, config: RunConfig, runs: usize) -> Result<VerifyReport, RunError> {
    let results: Vec<RunMetrics> = (0..runs)
        .into_par_iter()
        .map(|_| run_scenario(scenario, config))
        .collect::<Result<_, _>>()?;

    let final_hashes: Vec<u64> = results.iter().map(|m| m.final_state_hash).collect();
    let first_divergent_turn = results.split_first().and_then(|(first, rest)| {
        let reference = first.state_hashes();
        rest.iter()
            .filter_map(|m| {
                let hashes = m.state_hashes();
                (0..reference.len().max(hashes.len())).find(|&i| reference.get(i) != hashes.get(i))
            })
            .min()
    });

    let report = VerifyReport {
        runs,
        deterministic: first_divergent_turn.is_none(),
        final_hashes,
        first_divergent_turn,
    };
    if report.deterministic {
        tracing::info!(runs, "Runs are deterministic");
    } else {
        tracing::error!(runs, turn = ?report.first_divergent_turn, "Runs diverged");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dominion_core::ids::PlayerId;

    fn skirmish() -> Scenario {
        Scenario::skirmish().expect("built-in scenario parses")
    }

    #[test]
    fn test_battle_seed_varies() {
        let a = battle_seed(1, 0, PlanetId(1));
        assert_eq!(a, battle_seed(1, 0, PlanetId(1)));
        assert_ne!(a, battle_seed(1, 1, PlanetId(1)));
        assert_ne!(a, battle_seed(1, 0, PlanetId(2)));
        assert_ne!(a, battle_seed(2, 0, PlanetId(1)));
    }

    #[test]
    fn test_turn_advances_tick() {
        let scenario = skirmish();
        let mut runner = TurnRunner::from_scenario(&scenario, RunConfig::from_scenario(&scenario)).expect("builds");
        let report = runner.run_turn().expect("turn");
        assert_eq!(report.tick, 0);
        assert_eq!(runner.world().tick, 1);
        assert!(report.actions_committed > 0);
        assert_eq!(runner.metrics().turns.len(), 1);
    }

    #[test]
    fn test_inert_empires_do_nothing() {
        let mut scenario = skirmish();
        for player in &mut scenario.players {
            player.behavior = dominion_core::planning::BehaviorMode::Inert;
        }
        let config = RunConfig {
            turns: 3,
            ..RunConfig::from_scenario(&scenario)
        };
        let metrics = run_scenario(&scenario, config).expect("runs");
        assert_eq!(metrics.turns.len(), 3);
        assert!(metrics.turns.iter().all(|t| t.actions_committed == 0 && t.battles.is_empty()));
        let garthog = metrics.player(PlayerId(1)).expect("summary");
        assert_eq!(garthog.money, 6000);
    }

    #[test]
    fn test_verify_runs_matches() {
        let scenario = skirmish();
        let config = RunConfig {
            turns: 4,
            ..RunConfig::from_scenario(&scenario)
        };
        let report = verify_runs(&scenario, config, 3).expect("runs");
        assert!(report.deterministic);
        assert_eq!(report.final_hashes.len(), 3);
        assert!(report.final_hashes.windows(2).all(|w| w[0] == w[1]));
    }
}
