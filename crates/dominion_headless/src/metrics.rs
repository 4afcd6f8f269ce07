//! Run metrics for balance analysis.
//!
//! Everything recorded here is plain data so it can be written as JSON and
//! compared across runs and seeds.

use std::collections::BTreeMap;
use std::path::Path;

use dominion_core::combat::{BattleEndReason, BattleKind, BattleOutcome, Side, WriteBack};
use dominion_core::ids::{FleetId, PlanetId, PlayerId};
use dominion_core::world::World;
use serde::{Deserialize, Serialize};

/// Complete metrics for a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    /// Scenario name.
    pub scenario: String,
    /// Base seed.
    pub seed: u64,
    /// One report per simulated turn.
    pub turns: Vec<TurnReport>,
    /// Final per-player standings.
    pub players: Vec<PlayerSummary>,
    /// Final world state hash (for determinism validation).
    pub final_state_hash: u64,
}

impl RunMetrics {
    /// Empty metrics for a run.
    #[must_use]
    pub fn new(scenario: impl Into<String>, seed: u64) -> Self {
        Self {
            scenario: scenario.into(),
            seed,
            ..Default::default()
        }
    }

    /// Append a finished turn.
    pub fn record_turn(&mut self, report: TurnReport) {
        self.final_state_hash = report.state_hash;
        self.turns.push(report);
    }

    /// Fill in the final standings from the world the run ended with.
    pub fn finalize(&mut self, world: &World) {
        let mut won: BTreeMap<PlayerId, u32> = BTreeMap::new();
        let mut lost: BTreeMap<PlayerId, u32> = BTreeMap::new();
        let mut captured: BTreeMap<PlayerId, u32> = BTreeMap::new();
        for battle in self.turns.iter().flat_map(|t| &t.battles) {
            let (winner, loser) = match battle.winner {
                Some(Side::Attacker) => (Some(battle.attacker), battle.defender),
                Some(Side::Defender) => (battle.defender, Some(battle.attacker)),
                None => (None, None),
            };
            if let Some(p) = winner {
                *won.entry(p).or_default() += 1;
            }
            if let Some(p) = loser {
                *lost.entry(p).or_default() += 1;
            }
            if battle.planet_captured {
                *captured.entry(battle.attacker).or_default() += 1;
            }
        }

        self.players = world
            .players()
            .map(|p| PlayerSummary {
                id: p.id,
                name: p.name.clone(),
                money: p.money,
                planets: world.planets_of(p.id).count() as u32,
                buildings: world.planets_of(p.id).map(|planet| planet.buildings.len() as u32).sum(),
                fleets: world.fleets_of(p.id).count() as u32,
                battles_won: won.get(&p.id).copied().unwrap_or(0),
                battles_lost: lost.get(&p.id).copied().unwrap_or(0),
                planets_captured: captured.get(&p.id).copied().unwrap_or(0),
            })
            .collect();
    }

    /// Every battle fought, in order.
    pub fn battles(&self) -> impl Iterator<Item = &BattleReport> {
        self.turns.iter().flat_map(|t| &t.battles)
    }

    /// Per-turn state hashes.
    #[must_use]
    pub fn state_hashes(&self) -> Vec<u64> {
        self.turns.iter().map(|t| t.state_hash).collect()
    }

    /// Standing of one player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// What happened in one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    /// World tick the turn ran on.
    pub tick: u64,
    /// Actions applied.
    pub actions_committed: u32,
    /// Actions rejected as stale.
    pub actions_rejected: u32,
    /// Money spent by all players.
    pub money_spent: i64,
    /// Battles fought, space battles first.
    pub battles: Vec<BattleReport>,
    /// World hash after the turn.
    pub state_hash: u64,
}

/// Summary of one battle and its write-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleReport {
    /// Space or ground.
    pub kind: BattleKind,
    /// Contested planet.
    pub planet: PlanetId,
    /// Attacking fleet.
    pub fleet: FleetId,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Defending player.
    pub defender: Option<PlayerId>,
    /// Winning side.
    pub winner: Option<Side>,
    /// Why it ended.
    pub reason: BattleEndReason,
    /// Ticks simulated.
    pub ticks: u32,
    /// Attacker participants left.
    pub attacker_survivors: u32,
    /// Defender participants left.
    pub defender_survivors: u32,
    /// Items removed from the world.
    pub items_lost: u32,
    /// Buildings removed from the world.
    pub buildings_destroyed: u32,
    /// Whether the planet changed hands.
    pub planet_captured: bool,
}

impl BattleReport {
    /// Build from an applied outcome.
    #[must_use]
    pub fn new(outcome: &BattleOutcome, applied: &WriteBack) -> Self {
        Self {
            kind: outcome.kind,
            planet: outcome.context.planet,
            fleet: outcome.context.fleet,
            attacker: outcome.context.attacker,
            defender: outcome.context.defender,
            winner: outcome.winner,
            reason: outcome.reason,
            ticks: outcome.ticks,
            attacker_survivors: outcome.attacker_survivors,
            defender_survivors: outcome.defender_survivors,
            items_lost: applied.items_lost,
            buildings_destroyed: applied.buildings_destroyed,
            planet_captured: applied.planet_captured,
        }
    }
}

/// Final standing of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Money left.
    pub money: i64,
    /// Planets owned.
    pub planets: u32,
    /// Buildings on owned planets.
    pub buildings: u32,
    /// Fleets owned.
    pub fleets: u32,
    /// Battles won as either side.
    pub battles_won: u32,
    /// Battles lost as either side.
    pub battles_lost: u32,
    /// Planets taken.
    pub planets_captured: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battle(winner: Option<Side>, captured: bool) -> BattleReport {
        BattleReport {
            kind: BattleKind::Ground,
            planet: PlanetId(2),
            fleet: FleetId(1),
            attacker: PlayerId(1),
            defender: Some(PlayerId(2)),
            winner,
            reason: BattleEndReason::Annihilation,
            ticks: 40,
            attacker_survivors: 3,
            defender_survivors: 0,
            items_lost: 4,
            buildings_destroyed: 1,
            planet_captured: captured,
        }
    }

    #[test]
    fn test_record_turn_tracks_hash() {
        let mut metrics = RunMetrics::new("test", 7);
        metrics.record_turn(TurnReport {
            tick: 0,
            state_hash: 11,
            ..Default::default()
        });
        metrics.record_turn(TurnReport {
            tick: 1,
            state_hash: 22,
            battles: vec![battle(Some(Side::Attacker), true)],
            ..Default::default()
        });
        assert_eq!(metrics.final_state_hash, 22);
        assert_eq!(metrics.state_hashes(), vec![11, 22]);
        assert_eq!(metrics.battles().count(), 1);
    }

    #[test]
    fn test_json_shape() {
        let mut metrics = RunMetrics::new("test", 7);
        metrics.record_turn(TurnReport {
            battles: vec![battle(Some(Side::Defender), false)],
            ..Default::default()
        });
        let json = metrics.to_json().expect("serializes");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["scenario"], "test");
        assert_eq!(value["turns"][0]["battles"][0]["planet"], 2);
        assert_eq!(value["turns"][0]["battles"][0]["winner"], "Defender");

        let back: RunMetrics = serde_json::from_str(&json).expect("reads back");
        assert_eq!(back.turns, metrics.turns);
    }
}
