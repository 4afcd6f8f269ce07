//! Battle participants shared by space and ground battlefields.

use crate::data::{BattleEfficiencyData, BuildingData, FrameLayout, ItemCategory, ItemData, WeaponData};
use crate::error::Result;
use crate::ids::{FleetId, PlanetId, PlayerId};
use crate::world::{Building, World};

use super::efficiency::{EfficiencyCache, ParticipantType};
use super::orchestrator::{
    BattleContext, BattleOrder, Casualty, ParticipantId, ParticipantInfo, ParticipantSource, Side,
};
use crate::kinematics::Point;

/// One weapon mount and its reload state.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mount {
    pub weapon: WeaponData,
    pub cooldown: u32,
}

/// Combat state of one participant, independent of where it stands.
#[derive(Debug, Clone)]
pub(crate) struct Combatant {
    pub id: ParticipantId,
    pub side: Side,
    pub owner: PlayerId,
    pub source: ParticipantSource,
    pub kind: ParticipantType,
    pub hit_points: u32,
    pub max_hit_points: u32,
    start_hit_points: u32,
    pub shield: u32,
    pub ecm: u32,
    pub speed: f64,
    pub rotation_speed: f64,
    pub burst: u32,
    pub mounts: Vec<Mount>,
    pub frames: FrameLayout,
    weapon_multiplier: f64,
    damage_scale: f64,
    pub order: BattleOrder,
    pub alive: bool,
    idle_reported: bool,
}

impl Combatant {
    fn from_item(id: ParticipantId, side: Side, owner: PlayerId, source: ParticipantSource, def: &ItemData) -> Self {
        Self {
            id,
            side,
            owner,
            source,
            kind: ParticipantType::Item(def.category, def.id),
            hit_points: def.hit_points,
            max_hit_points: def.hit_points,
            start_hit_points: def.hit_points,
            shield: def.shield,
            ecm: def.ecm,
            speed: def.speed,
            rotation_speed: def.rotation_speed,
            burst: def.burst_damage,
            mounts: def.weapons.iter().map(|&weapon| Mount { weapon, cooldown: 0 }).collect(),
            frames: def.frames,
            weapon_multiplier: 1.0,
            damage_scale: 1.0,
            order: BattleOrder::Idle,
            alive: def.hit_points > 0,
            idle_reported: false,
        }
    }

    fn from_building(id: ParticipantId, owner: PlayerId, planet: PlanetId, building: &Building, def: &BuildingData) -> Self {
        // Knocked-out buildings can still be hit but no longer fire.
        let mounts = if building.is_serviceable() {
            def.weapon.iter().map(|&weapon| Mount { weapon, cooldown: 0 }).collect()
        } else {
            Vec::new()
        };
        Self {
            id,
            side: Side::Defender,
            owner,
            source: ParticipantSource::Building {
                planet,
                building: building.id,
            },
            kind: ParticipantType::Building(def.id),
            hit_points: building.hit_points,
            max_hit_points: building.max_hit_points,
            start_hit_points: building.hit_points,
            shield: def.shield,
            ecm: 0,
            speed: 0.0,
            rotation_speed: 0.0,
            burst: 0,
            mounts,
            frames: def.frames,
            weapon_multiplier: 1.0,
            damage_scale: 1.0,
            order: BattleOrder::Idle,
            alive: building.hit_points > 0,
            idle_reported: false,
        }
    }

    /// Whether this is a planetary building.
    pub fn is_building(&self) -> bool {
        matches!(self.kind, ParticipantType::Building(_))
    }

    pub fn is_mobile(&self) -> bool {
        self.speed > 0.0
    }

    pub fn is_armed(&self) -> bool {
        !self.mounts.is_empty()
    }

    /// Longest weapon reach, zero when unarmed.
    pub fn reach(&self) -> f64 {
        self.mounts.iter().map(|m| m.weapon.range).fold(0.0, f64::max)
    }

    /// Shortest weapon reach, zero when unarmed.
    pub fn close_reach(&self) -> f64 {
        self.mounts
            .iter()
            .map(|m| m.weapon.range)
            .reduce(f64::min)
            .unwrap_or(0.0)
    }

    /// Sum of base damage over all mounts.
    pub fn attack(&self) -> u32 {
        self.mounts.iter().map(|m| m.weapon.damage).sum()
    }

    /// Resolve the damage multiplier once: owner trait times efficiency.
    pub fn resolve_scale(&mut self, table: &[BattleEfficiencyData], cache: &mut EfficiencyCache) {
        self.damage_scale = self.weapon_multiplier * cache.get(table, self.owner, self.kind);
    }

    /// Damage of one shot: never below one point.
    pub fn shot_damage(&self, weapon: &WeaponData) -> u32 {
        (f64::from(weapon.damage) * self.damage_scale).round().max(1.0) as u32
    }

    /// Advance reload timers and return the weapons that fire at `distance`.
    pub fn fire(&mut self, distance: Option<f64>) -> Vec<WeaponData> {
        let mut fired = Vec::new();
        for mount in &mut self.mounts {
            mount.cooldown = mount.cooldown.saturating_sub(1);
            if let Some(distance) = distance {
                if mount.cooldown == 0 && distance <= mount.weapon.range {
                    mount.cooldown = mount.weapon.delay.max(1);
                    fired.push(mount.weapon);
                }
            }
        }
        fired
    }

    /// Apply damage, shield first. Returns whether this destroyed it.
    pub fn take_damage(&mut self, amount: u32) -> bool {
        if !self.alive {
            return false;
        }
        let absorbed = amount.min(self.shield);
        self.shield -= absorbed;
        self.hit_points = self.hit_points.saturating_sub(amount - absorbed);
        if self.hit_points == 0 {
            self.alive = false;
            return true;
        }
        false
    }

    pub fn set_order(&mut self, order: BattleOrder) {
        self.order = order;
        if order != BattleOrder::Idle {
            self.idle_reported = false;
        }
    }

    /// True the first time an idle participant is polled after an order.
    pub fn poll_idle(&mut self) -> bool {
        if self.alive && self.order == BattleOrder::Idle && !self.idle_reported {
            self.idle_reported = true;
            return true;
        }
        false
    }

    /// Leave the battle on surrender: items are lost, buildings stay behind.
    pub fn give_up(&mut self) {
        if !self.is_building() {
            self.hit_points = 0;
        }
        self.alive = false;
    }

    /// World change caused by this battle, if any.
    ///
    /// Items only report destruction; buildings also report damage.
    pub fn casualty(&self) -> Option<Casualty> {
        let destroyed = self.hit_points == 0;
        let changed = destroyed || (self.is_building() && self.hit_points != self.start_hit_points);
        changed.then_some(Casualty {
            source: self.source,
            owner: self.owner,
            destroyed,
            hit_points: self.hit_points,
        })
    }

    pub fn info(&self, position: Point) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            side: self.side,
            owner: self.owner,
            source: self.source,
            position,
            hit_points: self.hit_points,
            attack: self.attack(),
            mobile: self.is_mobile(),
            order: self.order,
        }
    }
}

/// Participants drawn from the world, before positions are assigned.
#[derive(Debug)]
pub(crate) struct Roster {
    pub context: BattleContext,
    pub attackers: Vec<Combatant>,
    pub defenders: Vec<Combatant>,
    /// Building participants and their top-left cells.
    pub building_cells: Vec<(ParticipantId, (u32, u32))>,
    pub efficiency: Vec<BattleEfficiencyData>,
}

/// Which categories fight in a roster.
pub(crate) struct RosterFilter {
    pub attacker: fn(ItemCategory) -> bool,
    pub defender: fn(ItemCategory) -> bool,
    pub buildings: fn(&BuildingData) -> bool,
}

impl Roster {
    /// Gather participants for `fleet` attacking `planet`.
    ///
    /// Fleet items are attackers; planet items not owned by the attacker
    /// and the planet owner's matching buildings are defenders. Ids are
    /// dense, attackers first.
    pub fn gather(world: &World, fleet_id: FleetId, planet_id: PlanetId, filter: &RosterFilter) -> Result<Self> {
        let catalog = world.catalog();
        let fleet = world.require_fleet(fleet_id)?;
        let planet = world.require_planet(planet_id)?;
        let context = BattleContext {
            planet: planet_id,
            fleet: fleet_id,
            attacker: fleet.owner,
            defender: planet.owner,
        };
        let multiplier = |owner: PlayerId| world.player(owner).map_or(1.0, |p| p.weapon_multiplier());

        let mut next_id: ParticipantId = 0;
        let mut attackers = Vec::new();
        for line in &fleet.inventory {
            let Some(def) = catalog.item(line.type_id) else {
                continue;
            };
            if !(filter.attacker)(def.category) {
                continue;
            }
            let source = ParticipantSource::FleetItem {
                fleet: fleet_id,
                item: def.id,
            };
            for _ in 0..line.count {
                let mut unit = Combatant::from_item(next_id, Side::Attacker, line.owner, source, def);
                unit.weapon_multiplier = multiplier(line.owner);
                attackers.push(unit);
                next_id += 1;
            }
        }

        let mut defenders = Vec::new();
        for line in planet.inventory.iter().filter(|l| l.owner != fleet.owner) {
            let Some(def) = catalog.item(line.type_id) else {
                continue;
            };
            if !(filter.defender)(def.category) {
                continue;
            }
            let source = ParticipantSource::PlanetItem {
                planet: planet_id,
                item: def.id,
            };
            for _ in 0..line.count {
                let mut unit = Combatant::from_item(next_id, Side::Defender, line.owner, source, def);
                unit.weapon_multiplier = multiplier(line.owner);
                defenders.push(unit);
                next_id += 1;
            }
        }

        let mut building_cells = Vec::new();
        if let Some(owner) = planet.owner.filter(|&o| o != fleet.owner) {
            for building in &planet.buildings {
                let Some(def) = catalog.building(building.type_id) else {
                    continue;
                };
                if !(filter.buildings)(def) || building.hit_points == 0 {
                    continue;
                }
                let mut unit = Combatant::from_building(next_id, owner, planet_id, building, def);
                unit.weapon_multiplier = multiplier(owner);
                building_cells.push((next_id, building.location));
                defenders.push(unit);
                next_id += 1;
            }
        }

        Ok(Self {
            context,
            attackers,
            defenders,
            building_cells,
            efficiency: catalog.battle_efficiency().to_vec(),
        })
    }
}
