//! Writing battle results back into the live world.

use super::orchestrator::{BattleEndReason, BattleKind, BattleOutcome, ParticipantSource, Side};
use crate::data::ItemCategory;
use crate::error::Result;
use crate::world::{adjust_inventory, InventoryItem, World};

impl BattleOutcome {
    /// Whether the attacker takes the planet: a ground win by annihilation or surrender.
    #[must_use]
    pub fn captures_planet(&self) -> bool {
        self.kind == BattleKind::Ground
            && self.winner == Some(Side::Attacker)
            && matches!(self.reason, BattleEndReason::Annihilation | BattleEndReason::Surrender)
    }
}

/// What changed in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteBack {
    /// Items removed from fleet and planet inventories.
    pub items_lost: u32,
    /// Buildings removed.
    pub buildings_destroyed: u32,
    /// Buildings left damaged.
    pub buildings_damaged: u32,
    /// Whether the attacking fleet was left empty and disbanded.
    pub fleet_disbanded: bool,
    /// Whether the planet changed hands.
    pub planet_captured: bool,
    /// Unexploded enemy mines removed from a captured planet.
    pub mines_cleared: u32,
}

/// Apply an outcome's casualties and consequences to the world.
///
/// Entities that disappeared since the battle started are skipped. A
/// captured planet goes to the attacker, the previous owner's unexploded
/// mines are cleared and the fleet's ground units land on it. Empty fleets
/// are removed.
pub fn apply_battle_outcome(world: &mut World, outcome: &BattleOutcome) -> Result<WriteBack> {
    let mut summary = WriteBack::default();

    for casualty in &outcome.casualties {
        match casualty.source {
            ParticipantSource::FleetItem { fleet, item } => {
                if let Ok(fleet) = world.require_fleet_mut(fleet) {
                    adjust_inventory(&mut fleet.inventory, item, casualty.owner, -1);
                    summary.items_lost += 1;
                }
            }
            ParticipantSource::PlanetItem { planet, item } => {
                if let Ok(planet) = world.require_planet_mut(planet) {
                    adjust_inventory(&mut planet.inventory, item, casualty.owner, -1);
                    summary.items_lost += 1;
                }
            }
            ParticipantSource::Building { planet, building } => {
                let Ok(planet) = world.require_planet_mut(planet) else {
                    continue;
                };
                if casualty.destroyed {
                    if planet.remove_building(building).is_some() {
                        summary.buildings_destroyed += 1;
                    }
                } else if let Some(b) = planet.buildings.iter_mut().find(|b| b.id == building) {
                    b.hit_points = casualty.hit_points.min(b.max_hit_points);
                    summary.buildings_damaged += 1;
                }
            }
        }
    }

    let context = outcome.context;
    if outcome.captures_planet() {
        world.transfer_planet(context.planet, Some(context.attacker))?;
        let catalog = std::sync::Arc::clone(world.catalog());
        let is_mine = |line: &InventoryItem| {
            line.owner != context.attacker
                && catalog
                    .item(line.type_id)
                    .is_some_and(|def| def.category == ItemCategory::Mine)
        };
        let planet = world.require_planet_mut(context.planet)?;
        summary.mines_cleared = planet.inventory.iter().filter(|&l| is_mine(l)).map(|l| l.count).sum();
        planet.inventory.retain(|line| !is_mine(line));

        let landed: Vec<_> = world
            .fleet(context.fleet)
            .map(|fleet| {
                fleet
                    .inventory
                    .iter()
                    .filter(|line| {
                        catalog
                            .item(line.type_id)
                            .is_some_and(|def| def.category == ItemCategory::GroundUnit)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for line in landed {
            let delta = i64::from(line.count);
            adjust_inventory(&mut world.require_fleet_mut(context.fleet)?.inventory, line.type_id, line.owner, -delta);
            adjust_inventory(&mut world.require_planet_mut(context.planet)?.inventory, line.type_id, line.owner, delta);
        }
        summary.planet_captured = true;
    }

    if world.fleet(context.fleet).is_some_and(|f| f.is_empty()) {
        world.remove_fleet(context.fleet);
        summary.fleet_disbanded = true;
    }

    world.refresh_radar(context.attacker);
    if let Some(defender) = context.defender {
        world.refresh_radar(defender);
    }

    tracing::info!(
        planet = %context.planet,
        fleet = %context.fleet,
        items_lost = summary.items_lost,
        buildings_destroyed = summary.buildings_destroyed,
        captured = summary.planet_captured,
        mines_cleared = summary.mines_cleared,
        disbanded = summary.fleet_disbanded,
        "Battle outcome applied"
    );
    Ok(summary)
}
