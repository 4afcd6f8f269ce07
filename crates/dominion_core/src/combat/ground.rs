//! Ground battles: landed troops against planetary defences.
//!
//! The planet surface becomes a [`BattleGrid`]. Units stand on cells and
//! move one cell at a time along A* paths, re-pathing when another unit
//! steps into the way. Each unit also carries a [`CombatObject`] at its
//! cell centre and turns to face the next cell before stepping into it. Buildings block their footprint and are attacked
//! from any adjacent cell. Mines sit on the middle columns and detonate
//! under the first attacker to enter their cell. Ground battles have no
//! retreat.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::f64::consts::PI;
use std::sync::Arc;

use super::efficiency::{EfficiencyCache, ParticipantType};
use super::orchestrator::{
    BattleCommands, BattleContext, BattleKind, BattleOrder, Battlefield, Casualty, ParticipantId,
    ParticipantInfo, ParticipantSource, Side,
};
use super::participant::{Combatant, Roster, RosterFilter};
use crate::data::{BattleEfficiencyData, ItemCategory};
use crate::error::Result;
use crate::ids::{FleetId, PlanetId, PlayerId};
use crate::kinematics::{CombatObject, FrameMatrix, Point};
use crate::pathfinding::{find_path, BattleCell, BattleGrid};
use crate::surface::Footprint;
use crate::world::World;

/// Battle units per ground cell; weapon ranges and speeds convert with it.
pub const GROUND_CELL_SIZE: f64 = 40.0;

type Cell = (u32, u32);

#[inline]
fn chebyshev(a: Cell, b: Cell) -> u32 {
    a.0.abs_diff(b.0).max(a.1.abs_diff(b.1))
}

/// Battle-space centre of a cell.
fn cell_centre((x, y): Cell) -> Point {
    Point::new(
        (f64::from(x) + 0.5) * GROUND_CELL_SIZE,
        (f64::from(y) + 0.5) * GROUND_CELL_SIZE,
    )
}

#[derive(Debug, Clone)]
struct Trooper {
    unit: Combatant,
    object: CombatObject,
    /// Cells covered; one for units, the footprint for buildings.
    cells: Vec<Cell>,
    path: VecDeque<Cell>,
    path_goal: Option<Cell>,
    ticks_per_cell: u32,
    move_timer: u32,
}

impl Trooper {
    fn anchor(&self) -> Cell {
        self.cells[0]
    }

    /// Centre in cell units, the coordinates orders are given in.
    fn centre(&self) -> Point {
        Point::new(
            self.object.position.x / GROUND_CELL_SIZE,
            self.object.position.y / GROUND_CELL_SIZE,
        )
    }

    /// Turn toward `cell`; returns whether the unit now faces it.
    fn face(&mut self, cell: Cell) -> bool {
        let turn = if self.unit.rotation_speed > 0.0 {
            self.unit.rotation_speed
        } else {
            PI
        };
        self.object.rotate_toward(cell_centre(cell), turn)
    }

    fn step_to(&mut self, cell: Cell) {
        self.cells[0] = cell;
        self.object.position = cell_centre(cell);
    }

    /// Cells between the closest pair of covered cells.
    fn gap(&self, other: &Self) -> u32 {
        self.cells
            .iter()
            .flat_map(|&a| other.cells.iter().map(move |&b| chebyshev(a, b)))
            .min()
            .unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
struct Mine {
    owner: PlayerId,
    source: ParticipantSource,
    cell: Cell,
    damage: u32,
    armed: bool,
}

/// Ground units landing on a planet against its garrison and buildings.
#[derive(Debug)]
pub struct GroundBattle {
    context: BattleContext,
    grid: BattleGrid,
    troopers: Vec<Trooper>,
    mines: Vec<Mine>,
    efficiency: Vec<BattleEfficiencyData>,
    cache: EfficiencyCache,
}

/// Walkable free cells, column by column in the given column order.
fn free_cells<'a>(
    grid: &'a BattleGrid,
    columns: impl Iterator<Item = u32> + 'a,
    taken: &'a BTreeSet<Cell>,
) -> impl Iterator<Item = Cell> + 'a {
    columns.flat_map(move |x| {
        (0..grid.height())
            .map(move |y| (x, y))
            .filter(move |&(x, y)| grid.is_walkable(x, y) && !taken.contains(&(x, y)))
    })
}

/// Middle column first, then alternating outwards.
fn middle_out(width: u32) -> impl Iterator<Item = u32> {
    let mid = width / 2;
    (0..width).filter_map(move |i| {
        let offset = (i + 1) / 2;
        if i % 2 == 1 {
            mid.checked_sub(offset)
        } else {
            Some(mid + offset).filter(|&x| x < width)
        }
    })
}

impl GroundBattle {
    /// Assemble the ground battle for `fleet`'s troops landing on `planet`.
    pub fn from_world(world: &World, fleet: FleetId, planet_id: PlanetId) -> Result<Self> {
        let filter = RosterFilter {
            attacker: |c| c == ItemCategory::GroundUnit,
            defender: |c| c == ItemCategory::GroundUnit,
            buildings: |def| def.is_defensive() && def.footprint.is_some(),
        };
        let roster = Roster::gather(world, fleet, planet_id, &filter)?;
        let planet = world.require_planet(planet_id)?;
        let catalog = world.catalog();
        let grid = BattleGrid::from_surface(&planet.surface);

        let Roster {
            context,
            attackers,
            defenders,
            building_cells,
            efficiency,
        } = roster;

        let mut matrices: BTreeMap<ParticipantType, Arc<FrameMatrix>> = BTreeMap::new();
        let mut matrix_for = |unit: &Combatant| {
            Arc::clone(
                matrices
                    .entry(unit.kind)
                    .or_insert_with(|| Arc::new(FrameMatrix::from_layout(&unit.frames))),
            )
        };

        let mut troopers = Vec::new();
        let mut taken = BTreeSet::new();
        let mut dropped = 0usize;

        for unit in defenders.iter().filter(|u| u.is_building()) {
            let ParticipantType::Building(type_id) = unit.kind else {
                continue;
            };
            let Some(&(_, (x, y))) = building_cells.iter().find(|(id, _)| *id == unit.id) else {
                continue;
            };
            let footprint = catalog
                .building(type_id)
                .and_then(|def| def.footprint)
                .unwrap_or_else(Footprint::default);
            let cells = (y..y + footprint.height)
                .flat_map(|cy| (x..x + footprint.width).map(move |cx| (cx, cy)))
                .collect();
            let matrix = matrix_for(unit);
            troopers.push(Trooper::placed(unit.clone(), cells, matrix));
        }

        let mut place = |units: Vec<Combatant>, columns: Vec<u32>, troopers: &mut Vec<Trooper>| {
            for unit in units.into_iter().filter(|u| !u.is_building()) {
                let cell = free_cells(&grid, columns.iter().copied(), &taken).next();
                match cell {
                    Some(cell) => {
                        taken.insert(cell);
                        let matrix = matrix_for(&unit);
                        troopers.push(Trooper::placed(unit, vec![cell], matrix));
                    }
                    None => dropped += 1,
                }
            }
        };
        place(attackers, (0..grid.width()).collect(), &mut troopers);
        place(defenders, (0..grid.width()).rev().collect(), &mut troopers);
        troopers.sort_by_key(|t| t.unit.id);

        let mut mines = Vec::new();
        for line in planet.inventory.iter().filter(|l| l.owner != context.attacker) {
            let Some(def) = catalog.item(line.type_id).filter(|d| d.category == ItemCategory::Mine) else {
                continue;
            };
            for _ in 0..line.count {
                let Some(cell) = free_cells(&grid, middle_out(grid.width()), &taken).next() else {
                    dropped += 1;
                    continue;
                };
                taken.insert(cell);
                mines.push(Mine {
                    owner: line.owner,
                    source: ParticipantSource::PlanetItem {
                        planet: planet_id,
                        item: def.id,
                    },
                    cell,
                    damage: def.burst_damage,
                    armed: true,
                });
            }
        }
        if dropped > 0 {
            tracing::debug!(planet = %planet_id, dropped, "No free cell for some ground participants");
        }

        Ok(Self {
            context,
            grid,
            troopers,
            mines,
            efficiency,
            cache: EfficiencyCache::new(),
        })
    }

    /// Armed mines still on the field.
    #[must_use]
    pub fn armed_mines(&self) -> usize {
        self.mines.iter().filter(|m| m.armed).count()
    }

    fn index_of(&self, id: ParticipantId) -> Option<usize> {
        self.troopers
            .binary_search_by_key(&id, |t| t.unit.id)
            .ok()
            .filter(|&i| self.troopers[i].unit.alive)
    }

    fn cell_of(&self, point: Point) -> Option<Cell> {
        if point.x < 0.0 || point.y < 0.0 {
            return None;
        }
        let cell = (point.x.floor() as u32, point.y.floor() as u32);
        self.grid.in_bounds(cell.0, cell.1).then_some(cell)
    }

    /// Cells held by living units other than `except`.
    fn occupied(&self, except: usize) -> BTreeSet<Cell> {
        self.troopers
            .iter()
            .enumerate()
            .filter(|(i, t)| *i != except && t.unit.alive && !t.unit.is_building())
            .map(|(_, t)| t.anchor())
            .collect()
    }

    fn engaged_target(&self, index: usize) -> Option<usize> {
        let unit = &self.troopers[index].unit;
        let BattleOrder::Attack(target) = unit.order else {
            return None;
        };
        self.index_of(target)
            .filter(|&t| self.troopers[t].unit.side != unit.side)
    }

    fn nearest_enemy(&self, index: usize, reach: f64) -> Option<usize> {
        let me = &self.troopers[index];
        self.troopers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.unit.alive && t.unit.side != me.unit.side)
            .map(|(i, t)| (i, me.gap(t)))
            .filter(|&(_, gap)| f64::from(gap) * GROUND_CELL_SIZE <= reach)
            .min_by_key(|&(i, gap)| (gap, i))
            .map(|(i, _)| i)
    }

    /// Free walkable cell next to the target, closest to the attacker.
    fn approach_cell(&self, index: usize, target: usize) -> Option<Cell> {
        let me = self.troopers[index].anchor();
        let occupied = self.occupied(index);
        // Closest first, then row-major.
        let mut best: Option<(u32, u32, u32)> = None;
        for &(tx, ty) in &self.troopers[target].cells {
            for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    let (Some(x), Some(y)) = (tx.checked_add_signed(dx), ty.checked_add_signed(dy)) else {
                        continue;
                    };
                    if !self.grid.is_walkable(x, y) || occupied.contains(&(x, y)) {
                        continue;
                    }
                    let key = (chebyshev(me, (x, y)), y, x);
                    if best.map_or(true, |b| key < b) {
                        best = Some(key);
                    }
                }
            }
        }
        best.map(|(_, y, x)| (x, y))
    }

    /// Move one step toward `goal` when the unit's move timer allows.
    ///
    /// Returns `false` when the goal cannot be reached.
    fn advance_along(&mut self, index: usize, goal: Cell) -> bool {
        let trooper = &mut self.troopers[index];
        trooper.move_timer = trooper.move_timer.saturating_add(1);
        if trooper.move_timer < trooper.ticks_per_cell {
            if let Some(next) = trooper.path.front().copied() {
                trooper.face(next);
            }
            return true;
        }

        let occupied = self.occupied(index);
        let trooper = &self.troopers[index];
        let stale = trooper.path_goal != Some(goal)
            || trooper
                .path
                .front()
                .map_or(true, |next| occupied.contains(next) && *next != goal);
        if stale {
            let Ok(path) = find_path(&self.grid, trooper.anchor(), goal, &occupied) else {
                return false;
            };
            let trooper = &mut self.troopers[index];
            trooper.path = path.into_iter().skip(1).collect();
            trooper.path_goal = Some(goal);
        }

        let trooper = &mut self.troopers[index];
        let Some(next) = trooper.path.front().copied() else {
            return true;
        };
        if occupied.contains(&next) {
            // The goal itself is taken; wait for it to clear.
            return true;
        }
        if !trooper.face(next) {
            return true;
        }
        trooper.path.pop_front();
        trooper.step_to(next);
        trooper.move_timer = 0;
        self.trigger_mines(index);
        true
    }

    /// Detonate every enemy mine under the unit's hit box.
    fn trigger_mines(&mut self, index: usize) {
        let trooper = &mut self.troopers[index];
        if trooper.unit.side != Side::Attacker {
            return;
        }
        let owner = trooper.unit.owner;
        for mine in self
            .mines
            .iter_mut()
            .filter(|m| m.armed && m.owner != owner && trooper.object.contains(cell_centre(m.cell)))
        {
            mine.armed = false;
            let destroyed = trooper.unit.take_damage(mine.damage);
            tracing::debug!(participant = trooper.unit.id, cell = ?mine.cell, damage = mine.damage, destroyed, "Mine detonated");
        }
    }

    fn strike(&mut self, target: usize, damage: u32) {
        let victim = &mut self.troopers[target];
        if victim.unit.take_damage(damage) {
            tracing::debug!(participant = victim.unit.id, side = ?victim.unit.side, "Participant destroyed");
            if victim.unit.is_building() {
                for &(x, y) in &victim.cells {
                    self.grid.set_cell(x, y, BattleCell::Open);
                }
            }
        }
    }

    fn advance_unit(&mut self, index: usize) {
        let engaged = self.engaged_target(index);
        let unit = &self.troopers[index].unit;
        let reach = unit.reach();
        let close_reach = unit.close_reach().max(GROUND_CELL_SIZE);
        let opportunity = if engaged.is_none() && unit.is_armed() {
            self.nearest_enemy(index, reach)
        } else {
            None
        };

        match self.troopers[index].unit.order {
            BattleOrder::MoveTo(point) => {
                let arrived = self
                    .cell_of(point)
                    .map_or(true, |goal| goal == self.troopers[index].anchor() || !self.advance_along(index, goal));
                if arrived {
                    self.troopers[index].unit.set_order(BattleOrder::Idle);
                }
            }
            BattleOrder::Attack(_) => match engaged {
                Some(target) => {
                    let gap = f64::from(self.troopers[index].gap(&self.troopers[target])) * GROUND_CELL_SIZE;
                    if gap > close_reach && self.troopers[index].unit.is_mobile() {
                        let reachable = self
                            .approach_cell(index, target)
                            .is_some_and(|goal| self.advance_along(index, goal));
                        if !reachable {
                            self.troopers[index].unit.set_order(BattleOrder::Idle);
                        }
                    }
                }
                None => self.troopers[index].unit.set_order(BattleOrder::Idle),
            },
            BattleOrder::Idle => {}
        }

        if !self.troopers[index].unit.alive {
            return;
        }
        let Some(target) = engaged.or(opportunity) else {
            self.troopers[index].unit.fire(None);
            return;
        };
        let distance = f64::from(self.troopers[index].gap(&self.troopers[target])) * GROUND_CELL_SIZE;
        let shots: Vec<u32> = {
            let unit = &mut self.troopers[index].unit;
            let fired = unit.fire(Some(distance));
            fired.iter().map(|w| unit.shot_damage(w)).collect()
        };
        for damage in shots {
            self.strike(target, damage);
        }
    }

    fn release_dead_targets(&mut self) {
        let alive: Vec<(ParticipantId, bool)> = self.troopers.iter().map(|t| (t.unit.id, t.unit.alive)).collect();
        for trooper in &mut self.troopers {
            if let BattleOrder::Attack(target) = trooper.unit.order {
                let living = alive
                    .binary_search_by_key(&target, |&(id, _)| id)
                    .is_ok_and(|i| alive[i].1);
                if !living {
                    trooper.unit.set_order(BattleOrder::Idle);
                }
            }
        }
    }
}

impl Trooper {
    fn placed(unit: Combatant, cells: Vec<Cell>, matrix: Arc<FrameMatrix>) -> Self {
        let ticks_per_cell = if unit.is_mobile() {
            (GROUND_CELL_SIZE / unit.speed).ceil().max(1.0) as u32
        } else {
            u32::MAX
        };
        let count = cells.len().max(1) as f64;
        let (sx, sy) = cells.iter().map(|&c| cell_centre(c)).fold((0.0, 0.0), |(x, y), p| (x + p.x, y + p.y));
        let facing = match unit.side {
            Side::Attacker => 0.0,
            Side::Defender => PI,
        };
        let object = CombatObject::new(Point::new(sx / count, sy / count), unit.owner, facing, matrix);
        Self {
            unit,
            object,
            cells,
            path: VecDeque::new(),
            path_goal: None,
            ticks_per_cell,
            move_timer: 0,
        }
    }
}

impl BattleCommands for GroundBattle {
    fn participants(&self) -> Vec<ParticipantInfo> {
        self.troopers
            .iter()
            .filter(|t| t.unit.alive)
            .map(|t| t.unit.info(t.centre()))
            .collect()
    }

    fn issue_order(&mut self, id: ParticipantId, order: BattleOrder) -> bool {
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let unit = &self.troopers[index].unit;
        let valid = match order {
            BattleOrder::Idle => true,
            BattleOrder::MoveTo(point) => {
                unit.is_mobile() && self.cell_of(point).is_some_and(|(x, y)| self.grid.is_walkable(x, y))
            }
            BattleOrder::Attack(target) => {
                unit.is_armed()
                    && self
                        .index_of(target)
                        .is_some_and(|t| self.troopers[t].unit.side != unit.side)
            }
        };
        if valid {
            let trooper = &mut self.troopers[index];
            trooper.unit.set_order(order);
            trooper.path.clear();
            trooper.path_goal = None;
        }
        valid
    }

    fn supports_retreat(&self) -> bool {
        false
    }
}

impl Battlefield for GroundBattle {
    fn kind(&self) -> BattleKind {
        BattleKind::Ground
    }

    fn context(&self) -> BattleContext {
        self.context
    }

    fn setup(&mut self) {
        for trooper in &mut self.troopers {
            trooper.unit.resolve_scale(&self.efficiency, &mut self.cache);
        }
        tracing::debug!(
            participants = self.troopers.len(),
            mines = self.mines.len(),
            types = self.cache.len(),
            "Ground battle modifiers resolved"
        );
    }

    fn step(&mut self) -> Vec<ParticipantId> {
        for index in 0..self.troopers.len() {
            if self.troopers[index].unit.alive {
                self.advance_unit(index);
            }
        }
        self.release_dead_targets();
        self.troopers
            .iter_mut()
            .filter_map(|t| t.unit.poll_idle().then_some(t.unit.id))
            .collect()
    }

    fn remaining(&self, side: Side) -> usize {
        self.troopers
            .iter()
            .filter(|t| t.unit.alive && t.unit.side == side)
            .count()
    }

    fn casualties(&self) -> Vec<Casualty> {
        let units = self.troopers.iter().filter_map(|t| t.unit.casualty());
        let mines = self.mines.iter().filter(|m| !m.armed).map(|m| Casualty {
            source: m.source,
            owner: m.owner,
            destroyed: true,
            hit_points: 0,
        });
        units.chain(mines).collect()
    }

    fn surrender(&mut self, side: Side) {
        for trooper in self.troopers.iter_mut().filter(|t| t.unit.alive && t.unit.side == side) {
            trooper.unit.give_up();
        }
    }
}
