//! Space battles: a fleet against orbital stations and planetary guns.
//!
//! Attackers enter from the left, defenders hold the right. Ships turn and
//! move through [`CombatObject`], so hit tests use the same rotated frame
//! the renderer would draw. Weapons launch homing projectiles that are
//! advanced every tick and destroyed on impact or once their range runs
//! out. Rockets can be diverted by the target's ECM.

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::efficiency::{EfficiencyCache, ParticipantType};
use super::orchestrator::{
    BattleCommands, BattleContext, BattleKind, BattleOrder, Battlefield, Casualty, ParticipantId,
    ParticipantInfo, Side,
};
use super::participant::{Combatant, Roster, RosterFilter};
use crate::data::{BattleEfficiencyData, ItemCategory, WeaponKind};
use crate::error::Result;
use crate::ids::{FleetId, PlanetId};
use crate::kinematics::{CombatObject, FrameMatrix, Point, Rect};
use crate::world::World;

/// Battle area width.
pub const ARENA_WIDTH: f64 = 1200.0;
/// Battle area height.
pub const ARENA_HEIGHT: f64 = 800.0;

const ATTACKER_LINE: f64 = 150.0;
const DEFENDER_LINE: f64 = 1050.0;
const LINE_SPACING: f64 = 40.0;
const UNITS_PER_LINE: usize = 16;

/// Attackers stop at this fraction of their shortest weapon range.
const STAND_OFF: f64 = 0.9;

/// Homing projectiles may fly this multiple of the weapon range.
const PROJECTILE_RANGE_FACTOR: f64 = 1.5;

/// Divert chance per ECM level above the projectile's anti-ECM.
pub const ECM_DIVERT_PER_LEVEL: f64 = 0.15;

/// Upper bound on the divert chance.
pub const MAX_DIVERT_CHANCE: f64 = 0.75;

/// Chance that a rocket is diverted by its target's ECM.
#[must_use]
pub fn divert_chance(ecm: u32, anti_ecm: u32) -> f64 {
    ((f64::from(ecm) - f64::from(anti_ecm)) * ECM_DIVERT_PER_LEVEL).clamp(0.0, MAX_DIVERT_CHANCE)
}

#[derive(Debug, Clone)]
struct Vessel {
    unit: Combatant,
    object: CombatObject,
}

#[derive(Debug, Clone, Copy)]
struct Projectile {
    target: ParticipantId,
    kind: WeaponKind,
    position: Point,
    speed: f64,
    range_left: f64,
    damage: u32,
    anti_ecm: u32,
}

/// Formation slot of the `index`-th participant of a side.
fn formation(side: Side, index: usize) -> Point {
    let line = (index / UNITS_PER_LINE) as f64;
    let slot = (index % UNITS_PER_LINE) as f64;
    let x = match side {
        Side::Attacker => ATTACKER_LINE - line * LINE_SPACING,
        Side::Defender => DEFENDER_LINE + line * LINE_SPACING,
    };
    Point::new(
        x.clamp(LINE_SPACING / 2.0, ARENA_WIDTH - LINE_SPACING / 2.0),
        (slot + 1.0) * ARENA_HEIGHT / (UNITS_PER_LINE as f64 + 1.0),
    )
}

/// A fleet attacking a planet's orbital defences.
#[derive(Debug)]
pub struct SpaceBattle {
    context: BattleContext,
    vessels: Vec<Vessel>,
    projectiles: Vec<Projectile>,
    efficiency: Vec<BattleEfficiencyData>,
    cache: EfficiencyCache,
    rng: ChaCha8Rng,
    arena: Rect,
}

impl SpaceBattle {
    /// Assemble the battle for `fleet` attacking `planet`.
    ///
    /// Ships fight for the attacker; stations and defensive buildings for
    /// the defender. `seed` drives every ECM roll.
    pub fn from_world(world: &World, fleet: FleetId, planet: PlanetId, seed: u64) -> Result<Self> {
        let filter = RosterFilter {
            attacker: |c| c == ItemCategory::Ship,
            defender: |c| c == ItemCategory::Station,
            buildings: |def| def.is_defensive(),
        };
        let roster = Roster::gather(world, fleet, planet, &filter)?;
        Ok(Self::from_roster(roster, seed))
    }

    fn from_roster(roster: Roster, seed: u64) -> Self {
        let mut matrices: BTreeMap<ParticipantType, Arc<FrameMatrix>> = BTreeMap::new();
        let mut place = |unit: Combatant, index: usize| {
            let matrix = Arc::clone(
                matrices
                    .entry(unit.kind)
                    .or_insert_with(|| Arc::new(FrameMatrix::from_layout(&unit.frames))),
            );
            let facing = match unit.side {
                Side::Attacker => 0.0,
                Side::Defender => PI,
            };
            let object = CombatObject::new(formation(unit.side, index), unit.owner, facing, matrix);
            Vessel { unit, object }
        };

        let mut vessels = Vec::with_capacity(roster.attackers.len() + roster.defenders.len());
        for (index, unit) in roster.attackers.into_iter().enumerate() {
            vessels.push(place(unit, index));
        }
        for (index, unit) in roster.defenders.into_iter().enumerate() {
            vessels.push(place(unit, index));
        }

        Self {
            context: roster.context,
            vessels,
            projectiles: Vec::new(),
            efficiency: roster.efficiency,
            cache: EfficiencyCache::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            arena: Rect {
                x: 0.0,
                y: 0.0,
                width: ARENA_WIDTH,
                height: ARENA_HEIGHT,
            },
        }
    }

    /// Projectiles in flight.
    #[must_use]
    pub fn projectiles_in_flight(&self) -> usize {
        self.projectiles.len()
    }

    fn vessel(&self, id: ParticipantId) -> Option<&Vessel> {
        self.vessels.get(id as usize).filter(|v| v.unit.alive)
    }

    /// Living enemy named by an attack order.
    fn engaged_target(&self, index: usize) -> Option<(ParticipantId, Point)> {
        let unit = &self.vessels[index].unit;
        let BattleOrder::Attack(target) = unit.order else {
            return None;
        };
        self.vessel(target)
            .filter(|t| t.unit.side != unit.side)
            .map(|t| (target, t.object.position))
    }

    /// Closest living enemy within `reach`; ties go to the lower id.
    fn nearest_enemy(&self, index: usize, reach: f64) -> Option<(ParticipantId, Point)> {
        let me = &self.vessels[index];
        self.vessels
            .iter()
            .filter(|v| v.unit.alive && v.unit.side != me.unit.side)
            .map(|v| (v.unit.id, v.object.position, me.object.distance_to(v.object.position)))
            .filter(|&(_, _, d)| d <= reach)
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)))
            .map(|(id, at, _)| (id, at))
    }

    fn advance_units(&mut self) {
        let mut launched = Vec::new();
        for index in 0..self.vessels.len() {
            if !self.vessels[index].unit.alive {
                continue;
            }
            let engaged = self.engaged_target(index);
            let opportunity = if engaged.is_none() && self.vessels[index].unit.is_armed() {
                self.nearest_enemy(index, self.vessels[index].unit.reach())
            } else {
                None
            };

            let arena = self.arena;
            let vessel = &mut self.vessels[index];
            match vessel.unit.order {
                BattleOrder::MoveTo(point) => {
                    vessel.object.rotate_toward(point, vessel.unit.rotation_speed);
                    if vessel.object.position.step_toward(point, vessel.unit.speed) {
                        vessel.unit.set_order(BattleOrder::Idle);
                    }
                }
                BattleOrder::Attack(_) => match engaged {
                    Some((_, at)) if vessel.unit.is_mobile() => {
                        vessel.object.rotate_toward(at, vessel.unit.rotation_speed);
                        let gap = vessel.object.distance_to(at) - vessel.unit.close_reach() * STAND_OFF;
                        if gap > 0.0 {
                            vessel.object.position.step_toward(at, gap.min(vessel.unit.speed));
                        }
                    }
                    Some(_) => {}
                    None => vessel.unit.set_order(BattleOrder::Idle),
                },
                BattleOrder::Idle => {}
            }
            vessel.object.position.x = vessel.object.position.x.clamp(arena.x, arena.right());
            vessel.object.position.y = vessel.object.position.y.clamp(arena.y, arena.bottom());

            let target = engaged.or(opportunity);
            let distance = target.map(|(_, at)| vessel.object.distance_to(at));
            for weapon in vessel.unit.fire(distance) {
                if let Some((target, _)) = target {
                    launched.push(Projectile {
                        target,
                        kind: weapon.kind,
                        position: vessel.object.position,
                        speed: weapon.projectile_speed.max(1.0),
                        range_left: weapon.range * PROJECTILE_RANGE_FACTOR,
                        damage: vessel.unit.shot_damage(&weapon),
                        anti_ecm: weapon.anti_ecm,
                    });
                }
            }
        }
        self.projectiles.extend(launched);
    }

    fn advance_projectiles(&mut self) {
        let in_flight = std::mem::take(&mut self.projectiles);
        for mut shot in in_flight {
            let Some(target) = self
                .vessels
                .get_mut(shot.target as usize)
                .filter(|v| v.unit.alive)
            else {
                continue;
            };
            let aim = target.object.position;
            let arrived = shot.position.step_toward(aim, shot.speed) || target.object.contains(shot.position);
            if arrived {
                if shot.kind == WeaponKind::Rocket {
                    let chance = divert_chance(target.unit.ecm, shot.anti_ecm);
                    if chance > 0.0 && self.rng.gen::<f64>() < chance {
                        tracing::trace!(target = shot.target, chance, "Rocket diverted");
                        continue;
                    }
                }
                if target.unit.take_damage(shot.damage) {
                    tracing::debug!(participant = shot.target, side = ?target.unit.side, "Participant destroyed");
                }
                continue;
            }
            shot.range_left -= shot.speed;
            if shot.range_left > 0.0 {
                self.projectiles.push(shot);
            }
        }
    }

    fn release_dead_targets(&mut self) {
        let alive: Vec<bool> = self.vessels.iter().map(|v| v.unit.alive).collect();
        for vessel in &mut self.vessels {
            if let BattleOrder::Attack(target) = vessel.unit.order {
                if !alive.get(target as usize).copied().unwrap_or(false) {
                    vessel.unit.set_order(BattleOrder::Idle);
                }
            }
        }
    }
}

impl BattleCommands for SpaceBattle {
    fn participants(&self) -> Vec<ParticipantInfo> {
        self.vessels
            .iter()
            .filter(|v| v.unit.alive)
            .map(|v| v.unit.info(v.object.position))
            .collect()
    }

    fn issue_order(&mut self, id: ParticipantId, order: BattleOrder) -> bool {
        let Some(vessel) = self.vessel(id) else {
            return false;
        };
        let valid = match order {
            BattleOrder::Idle => true,
            BattleOrder::MoveTo(point) => vessel.unit.is_mobile() && self.arena.contains(point),
            BattleOrder::Attack(target) => {
                vessel.unit.is_armed() && self.vessel(target).is_some_and(|t| t.unit.side != vessel.unit.side)
            }
        };
        if valid {
            self.vessels[id as usize].unit.set_order(order);
        }
        valid
    }

    fn supports_retreat(&self) -> bool {
        true
    }
}

impl Battlefield for SpaceBattle {
    fn kind(&self) -> BattleKind {
        BattleKind::Space
    }

    fn context(&self) -> BattleContext {
        self.context
    }

    fn setup(&mut self) {
        for vessel in &mut self.vessels {
            vessel.unit.resolve_scale(&self.efficiency, &mut self.cache);
        }
        tracing::debug!(
            participants = self.vessels.len(),
            types = self.cache.len(),
            "Space battle modifiers resolved"
        );
    }

    fn step(&mut self) -> Vec<ParticipantId> {
        self.advance_units();
        self.advance_projectiles();
        self.release_dead_targets();
        self.vessels
            .iter_mut()
            .filter_map(|v| v.unit.poll_idle().then_some(v.unit.id))
            .collect()
    }

    fn remaining(&self, side: Side) -> usize {
        self.vessels
            .iter()
            .filter(|v| v.unit.alive && v.unit.side == side)
            .count()
    }

    fn casualties(&self) -> Vec<Casualty> {
        self.vessels.iter().filter_map(|v| v.unit.casualty()).collect()
    }

    fn surrender(&mut self, side: Side) {
        for vessel in self.vessels.iter_mut().filter(|v| v.unit.alive && v.unit.side == side) {
            vessel.unit.give_up();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::fixtures::{self, FIGHTER, STATION};
    use crate::combat::orchestrator::{Battle, BattleCallback, BattleEndReason, BattleSignal, ParticipantSource};
    use crate::ids::ItemTypeId;

    /// Sends every idle armed participant at the first living enemy.
    struct Charge;

    impl BattleCallback for Charge {
        fn on_battle_tick(
            &mut self,
            battle: &mut dyn BattleCommands,
            idle: &[ParticipantId],
        ) -> BattleSignal {
            let all = battle.participants();
            for &id in idle {
                let Some(me) = all.iter().find(|p| p.id == id) else {
                    continue;
                };
                if let Some(enemy) = all.iter().find(|p| p.side != me.side) {
                    battle.issue_order(id, BattleOrder::Attack(enemy.id));
                }
            }
            BattleSignal::Continue
        }
    }

    #[test]
    fn test_divert_chance() {
        assert!((divert_chance(5, 2) - 0.45).abs() < 1e-9);
        assert!((divert_chance(10, 0) - MAX_DIVERT_CHANCE).abs() < 1e-9);
        assert!(divert_chance(1, 3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_world_sides() {
        let world = fixtures::world(3, 2);
        let battle = SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 1).expect("battle");
        // Three fighters; the station and the tower defend. Tanks and mines stay out.
        assert_eq!(battle.remaining(Side::Attacker), 3);
        assert_eq!(battle.remaining(Side::Defender), 2);

        let infos = battle.participants();
        let attacker_x = infos.iter().filter(|p| p.side == Side::Attacker).map(|p| p.position.x);
        let defender_x = infos.iter().filter(|p| p.side == Side::Defender).map(|p| p.position.x);
        assert!(attacker_x.fold(f64::MIN, f64::max) < defender_x.fold(f64::MAX, f64::min));
        assert!(battle.supports_retreat());
    }

    #[test]
    fn test_first_tick_reports_everyone_idle() {
        let world = fixtures::world(2, 0);
        let mut battle = SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 1).expect("battle");
        battle.setup();
        let idle = battle.step();
        assert_eq!(idle, vec![0, 1, 2, 3]);
        assert!(battle.step().is_empty());
    }

    #[test]
    fn test_issue_order_validation() {
        let world = fixtures::world(1, 0);
        let mut battle = SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 1).expect("battle");
        // 0 = fighter, 1 = station, 2 = tower
        assert!(battle.issue_order(0, BattleOrder::Attack(1)));
        assert!(!battle.issue_order(1, BattleOrder::Attack(2)), "no friendly fire");
        assert!(!battle.issue_order(1, BattleOrder::MoveTo(Point::new(10.0, 10.0))), "stations are static");
        assert!(!battle.issue_order(0, BattleOrder::MoveTo(Point::new(-5.0, 10.0))), "outside the arena");
        assert!(!battle.issue_order(9, BattleOrder::Idle));
    }

    #[test]
    fn test_strong_fleet_wins_and_reports_losses() {
        let world = fixtures::world(12, 0);
        let mut battle = Battle::new(SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 7).expect("battle"));
        let outcome = battle.run(&mut Charge).expect("runs");

        assert_eq!(outcome.reason, BattleEndReason::Annihilation);
        assert_eq!(outcome.winner, Some(Side::Attacker));
        assert_eq!(outcome.defender_survivors, 0);
        assert!(outcome.casualties.iter().any(|c| c.destroyed
            && c.source
                == ParticipantSource::PlanetItem {
                    planet: fixtures::PLANET,
                    item: ItemTypeId(STATION),
                }));
        let lost = outcome
            .casualties
            .iter()
            .filter(|c| matches!(c.source, ParticipantSource::FleetItem { item, .. } if item == ItemTypeId(FIGHTER)))
            .count() as u32;
        assert_eq!(lost + outcome.attacker_survivors, 12);
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let world = fixtures::world(6, 0);
        let run = |seed| {
            let mut battle = Battle::new(SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, seed).expect("battle"));
            battle.run(&mut Charge).expect("runs")
        };
        assert_eq!(run(11), run(11));
    }

    #[test]
    fn test_idle_units_fire_at_targets_of_opportunity() {
        let world = fixtures::world(1, 0);
        let mut battle = SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 1).expect("battle");
        battle.setup();
        // Park the fighter right next to the station without an order.
        let station_at = battle.vessels[1].object.position;
        battle.vessels[0].object.position = Point::new(station_at.x - 50.0, station_at.y);
        battle.step();
        assert!(battle.projectiles_in_flight() > 0);
    }
}
