//! Tactical battles and the strength figures planning uses to pick them.
//!
//! - [`totals`]: additive attack/defence aggregates
//! - [`efficiency`]: owner/category/item scoped damage multipliers
//! - [`orchestrator`]: the battle state machine and callback protocol
//! - [`space`] and [`ground`]: the two battlefields
//! - [`ai`]: default decision logic
//! - [`outcome`]: write-back into the live world
//!
//! A battle only reads the world while it is built. From then on it owns its
//! participants, so several battles can run on separate threads and have
//! their outcomes applied one after another.

pub mod ai;
pub mod efficiency;
pub mod ground;
pub mod orchestrator;
pub mod outcome;
mod participant;
pub mod space;
pub mod totals;

pub use ai::{AutoBattleAi, DEFAULT_FLEE_RATIO};
pub use efficiency::{resolve_efficiency, EfficiencyCache, ParticipantType};
pub use ground::{GroundBattle, GROUND_CELL_SIZE};
pub use orchestrator::{
    Battle, BattleCallback, BattleCommands, BattleContext, BattleEndReason, BattleKind, BattleOrder,
    BattleOutcome, BattlePhase, BattleSignal, Battlefield, Casualty, ParticipantId, ParticipantInfo,
    ParticipantSource, Side, DEFAULT_MAX_TICKS,
};
pub use outcome::{apply_battle_outcome, WriteBack};
pub use space::{divert_chance, SpaceBattle};
pub use totals::AttackDefenseTotals;

use crate::error::Result;
use crate::ids::{FleetId, PlanetId};
use crate::world::World;

/// Fight the space battle for `fleet` attacking `planet`.
pub fn run_space_battle(
    world: &World,
    fleet: FleetId,
    planet: PlanetId,
    seed: u64,
    callback: &mut dyn BattleCallback,
) -> Result<BattleOutcome> {
    Battle::new(SpaceBattle::from_world(world, fleet, planet, seed)?).run(callback)
}

/// Fight the ground battle for `fleet`'s troops landing on `planet`.
pub fn run_ground_battle(
    world: &World,
    fleet: FleetId,
    planet: PlanetId,
    callback: &mut dyn BattleCallback,
) -> Result<BattleOutcome> {
    Battle::new(GroundBattle::from_world(world, fleet, planet)?).run(callback)
}

/// Whether a space outcome leaves the orbit clear for a landing.
#[must_use]
pub fn orbit_cleared(space: &BattleOutcome) -> bool {
    space.kind == BattleKind::Space && space.defender_survivors == 0 && space.reason != BattleEndReason::Flee
}

/// Resolve one attack end to end: space battle, then a landing if the
/// orbit was cleared and troops are aboard. Each outcome is applied to the
/// world before the next battle is built.
pub fn resolve_attack(
    world: &mut World,
    fleet: FleetId,
    planet: PlanetId,
    seed: u64,
    callback: &mut dyn BattleCallback,
) -> Result<Vec<BattleOutcome>> {
    let space = run_space_battle(world, fleet, planet, seed, callback)?;
    apply_battle_outcome(world, &space)?;
    let land = orbit_cleared(&space) && world.fleet(fleet).is_some();
    let mut outcomes = vec![space];
    if land {
        let ground = run_ground_battle(world, fleet, planet, callback)?;
        apply_battle_outcome(world, &ground)?;
        outcomes.push(ground);
    }
    Ok(outcomes)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ItemTypeId;
    use crate::world::inventory_total;

    #[test]
    fn test_resolve_attack_space_then_ground() {
        let mut world = fixtures::world(12, 10);
        let outcomes = resolve_attack(&mut world, fixtures::FLEET, fixtures::PLANET, 5, &mut AutoBattleAi::default())
            .expect("resolves");
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].kind, BattleKind::Space);
        assert!(orbit_cleared(&outcomes[0]));
        assert_eq!(outcomes[1].kind, BattleKind::Ground);

        let planet = world.require_planet(fixtures::PLANET).expect("planet");
        assert_eq!(planet.owner, Some(fixtures::ATTACKER));
        assert_eq!(inventory_total(&planet.inventory, ItemTypeId(fixtures::STATION), None), 0);
        assert_eq!(
            inventory_total(&planet.inventory, ItemTypeId(fixtures::TANK), Some(fixtures::ATTACKER)),
            outcomes[1].attacker_survivors
        );
    }

    #[test]
    fn test_troops_only_fleet_cannot_pass_defended_orbit() {
        let mut world = fixtures::world(0, 5);
        let outcomes = resolve_attack(&mut world, fixtures::FLEET, fixtures::PLANET, 5, &mut AutoBattleAi::default())
            .expect("resolves");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].winner, Some(Side::Defender));
        assert_eq!(world.require_planet(fixtures::PLANET).expect("planet").owner, Some(fixtures::DEFENDER));
    }
}
