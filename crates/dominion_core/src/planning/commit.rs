//! Applying planning decisions to the live world.
//!
//! A decision was made against a snapshot that may be stale by the time it
//! is applied. Every action is re-checked against live state; a decision
//! that no longer holds is rejected with [`GameError::InvalidState`] and the
//! world is left untouched.

use std::sync::Arc;

use super::Action;
use crate::error::{GameError, Result};
use crate::ids::{BuildingId, FleetId, PlanetId, PlayerId};
use crate::surface::{BuildingIndex, PlacementHelper};
use crate::world::{adjust_inventory, inventory_total, World};

/// What a committed action changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Acting player.
    pub player: PlayerId,
    /// The applied action; a build's location may differ from the decided one.
    pub action: Action,
    /// Money deducted.
    pub money_spent: i64,
    /// Building created by a build action.
    pub building: Option<BuildingId>,
    /// Battle to start, for attack actions.
    pub battle: Option<(FleetId, PlanetId)>,
}

fn owned_planet(world: &World, player: PlayerId, planet: PlanetId) -> Result<()> {
    let live = world.require_planet(planet)?;
    if live.owner == Some(player) {
        Ok(())
    } else {
        Err(GameError::InvalidState(format!("{planet} is no longer owned by {player}")))
    }
}

fn owned_fleet(world: &World, player: PlayerId, fleet: FleetId) -> Result<()> {
    if world.require_fleet(fleet)?.owner == player {
        Ok(())
    } else {
        Err(GameError::InvalidState(format!("{fleet} is not owned by {player}")))
    }
}

/// Re-validate `action` for `player` against the live world and apply it.
pub fn commit(world: &mut World, player: PlayerId, action: &Action) -> Result<CommitReceipt> {
    let result = apply(world, player, *action);
    match &result {
        Ok(receipt) => tracing::info!(player = %player, action = ?receipt.action, spent = receipt.money_spent, "Action committed"),
        Err(e) => tracing::warn!(player = %player, ?action, error = %e, "Action rejected"),
    }
    result
}

fn apply(world: &mut World, player: PlayerId, action: Action) -> Result<CommitReceipt> {
    let mut receipt = CommitReceipt {
        player,
        action,
        money_spent: 0,
        building: None,
        battle: None,
    };

    match action {
        Action::Build {
            planet,
            building_type,
            location,
        } => {
            owned_planet(world, player, planet)?;
            let catalog = Arc::clone(world.catalog());
            let def = catalog.require_building(building_type)?;

            let owner = world.require_player(player)?;
            if !owner.researched_buildings.contains(&building_type) {
                return Err(GameError::InvalidState(format!("{} not researched", def.name)));
            }
            if owner.money < def.cost {
                return Err(GameError::InvalidState(format!(
                    "{} costs {} but only {} left",
                    def.name, def.cost, owner.money
                )));
            }

            let live = world.require_planet(planet)?;
            if !live.can_build(&catalog, building_type) {
                return Err(GameError::InvalidState(format!("{} not allowed on {planet}", def.name)));
            }
            // A stale cell falls back to live placement.
            let location = match def.footprint {
                None => location,
                Some(footprint) => {
                    let helper = PlacementHelper::new(&live.surface, BuildingIndex::empty());
                    if helper.can_place_at(location.0, location.1, footprint) {
                        location
                    } else {
                        live.find_location(&catalog, building_type).ok_or_else(|| {
                            GameError::InvalidState(format!("no room for {} on {planet}", def.name))
                        })?
                    }
                }
            };

            let id = world.next_building_id();
            world.require_planet_mut(planet)?.add_building(id, def, location)?;
            world.require_player_mut(player)?.money -= def.cost;

            receipt.action = Action::Build {
                planet,
                building_type,
                location,
            };
            receipt.money_spent = def.cost;
            receipt.building = Some(id);
        }
        Action::Deploy { planet, item, count } => {
            owned_planet(world, player, planet)?;
            world.catalog().require_item(item)?;
            let available = inventory_total(&world.require_player(player)?.stock, item, Some(player));
            if available < count {
                return Err(GameError::InvalidState(format!(
                    "only {available} of item {} in stock, {count} requested",
                    item.0
                )));
            }
            adjust_inventory(&mut world.require_player_mut(player)?.stock, item, player, -i64::from(count));
            adjust_inventory(&mut world.require_planet_mut(planet)?.inventory, item, player, i64::from(count));
        }
        Action::SetTax { planet, level } => {
            owned_planet(world, player, planet)?;
            world.require_planet_mut(planet)?.tax = level;
        }
        Action::Attack { fleet, planet } => {
            owned_fleet(world, player, fleet)?;
            let target = world.require_planet(planet)?;
            if target.owner.map_or(true, |o| o == player) {
                return Err(GameError::InvalidState(format!("{planet} is not an enemy planet")));
            }
            let position = target.position;
            world.require_fleet_mut(fleet)?.position = position;
            world.refresh_radar(player);
            receipt.battle = Some((fleet, planet));
        }
        Action::MoveFleet { fleet, planet } => {
            owned_fleet(world, player, fleet)?;
            let position = world.require_planet(planet)?.position;
            world.require_fleet_mut(fleet)?.position = position;
            world.refresh_radar(player);
        }
    }

    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::fixtures::{self, ATTACKER, DEFENDER, FLEET, PLANET};
    use crate::math::{Fixed, GalaxyPos};

    const PARKED: GalaxyPos = GalaxyPos::new(Fixed::from_bits(500 << 32), Fixed::from_bits(500 << 32));

    /// Fixture world with the attacking fleet parked far from the planet.
    fn parked_world() -> World {
        let mut world = fixtures::world(2, 0);
        world.require_fleet_mut(FLEET).expect("fleet").position = PARKED;
        world.refresh_radar(ATTACKER);
        world
    }

    #[test]
    fn test_attack_moves_radar_with_fleet() {
        let mut world = parked_world();
        let target = world.require_planet(PLANET).expect("planet").position;
        assert!(!world.require_player(ATTACKER).expect("player").radar.is_covered(target));

        let receipt = commit(&mut world, ATTACKER, &Action::Attack { fleet: FLEET, planet: PLANET }).expect("commits");
        assert_eq!(receipt.battle, Some((FLEET, PLANET)));
        assert_eq!(world.require_fleet(FLEET).expect("fleet").position, target);

        let radar = &world.require_player(ATTACKER).expect("player").radar;
        assert!(radar.is_covered(target));
        assert!(!radar.is_covered(PARKED));
    }

    #[test]
    fn test_attack_with_foreign_fleet_is_rejected() {
        let mut world = parked_world();
        let result = commit(&mut world, DEFENDER, &Action::Attack { fleet: FLEET, planet: PLANET });
        assert!(matches!(result, Err(GameError::InvalidState(_))));
        assert_eq!(world.require_fleet(FLEET).expect("fleet").position, PARKED);
    }
}
