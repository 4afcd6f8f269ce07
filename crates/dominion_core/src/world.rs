//! Live world state: players, planets, fleets and their inventories.
//!
//! This is the state the simulation timeline owns and mutates. The planning
//! layer never reads it directly; it reads a [`crate::snapshot::WorldView`]
//! built from it. Containers are `BTreeMap`s so iteration order, and
//! therefore every decision derived from it, is stable.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::allocation::efficiency_bound;
use crate::data::{BuildingData, BuildingKind, Catalog};
use crate::error::{GameError, Result};
use crate::ids::{BuildingId, BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
use crate::math::{fixed_bits, Fixed, GalaxyPos};
use crate::planning::{AttackMode, BehaviorMode};
use crate::surface::{BuildingIndex, PlacementHelper, SurfaceGrid, SurfaceKind};

/// Radar range every owned planet has without radar buildings.
pub const BASE_PLANET_RADAR: i32 = 30;

/// Radar range of a fleet.
pub const FLEET_RADAR_RANGE: i32 = 40;

/// Removal radius above which radar coverage removal is skipped.
pub const MAX_RADAR_REMOVAL_RADIUS: i32 = 200;

/// Galaxy units per radar coverage cell.
const RADAR_CELL_SIZE: i32 = 10;

// ============================================================================
// Players
// ============================================================================

/// Race/empire traits that modify game formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TraitKind {
    /// Percent bonus to weapon damage.
    Weapons,
    /// Percent bonus to tax income.
    Tax,
    /// Percent bonus to population growth.
    Fertility,
}

/// Tax level of a planet; higher levels hurt morale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum TaxLevel {
    /// No taxes.
    None,
    /// Light taxes.
    Low,
    /// Standard taxes.
    #[default]
    Moderate,
    /// Heavy taxes.
    High,
    /// Confiscatory taxes.
    Oppressive,
}

impl TaxLevel {
    /// One step lower, saturating at [`TaxLevel::None`].
    #[must_use]
    pub const fn lower(self) -> Self {
        match self {
            Self::None | Self::Low => Self::None,
            Self::Moderate => Self::Low,
            Self::High => Self::Moderate,
            Self::Oppressive => Self::High,
        }
    }

    /// One step higher, saturating at [`TaxLevel::Oppressive`].
    #[must_use]
    pub const fn higher(self) -> Self {
        match self {
            Self::None => Self::Low,
            Self::Low => Self::Moderate,
            Self::Moderate => Self::High,
            Self::High | Self::Oppressive => Self::Oppressive,
        }
    }
}

/// Radar coverage counts over a coarse galaxy grid.
///
/// Coverage is reference counted so overlapping sources can be removed
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadarMap {
    coverage: BTreeMap<(i32, i32), u16>,
}

impl RadarMap {
    /// Empty coverage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn cells_in_radius(center: GalaxyPos, radius: i32) -> impl Iterator<Item = (i32, i32)> {
        let cx = center.x.to_num::<i32>();
        let cy = center.y.to_num::<i32>();
        let r = radius.max(0);
        let r_sq = i64::from(r) * i64::from(r);
        let min_x = (cx - r).div_euclid(RADAR_CELL_SIZE);
        let max_x = (cx + r).div_euclid(RADAR_CELL_SIZE);
        let min_y = (cy - r).div_euclid(RADAR_CELL_SIZE);
        let max_y = (cy + r).div_euclid(RADAR_CELL_SIZE);
        (min_y..=max_y).flat_map(move |gy| {
            (min_x..=max_x).filter_map(move |gx| {
                let px = gx * RADAR_CELL_SIZE + RADAR_CELL_SIZE / 2;
                let py = gy * RADAR_CELL_SIZE + RADAR_CELL_SIZE / 2;
                let dx = i64::from(px - cx);
                let dy = i64::from(py - cy);
                (dx * dx + dy * dy <= r_sq).then_some((gx, gy))
            })
        })
    }

    /// Add one layer of coverage around `center`.
    pub fn add_coverage(&mut self, center: GalaxyPos, radius: i32) {
        for cell in Self::cells_in_radius(center, radius) {
            *self.coverage.entry(cell).or_insert(0) += 1;
        }
    }

    /// Remove one layer of coverage around `center`.
    ///
    /// Radii above [`MAX_RADAR_REMOVAL_RADIUS`] are skipped without touching
    /// the map; returns whether the removal was applied.
    pub fn remove_coverage(&mut self, center: GalaxyPos, radius: i32) -> bool {
        if radius > MAX_RADAR_REMOVAL_RADIUS {
            tracing::debug!(radius, "radar removal radius above limit, skipped");
            return false;
        }
        for cell in Self::cells_in_radius(center, radius) {
            if let Some(count) = self.coverage.get_mut(&cell) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.coverage.remove(&cell);
                }
            }
        }
        true
    }

    /// Whether a galaxy position is under coverage.
    #[must_use]
    pub fn is_covered(&self, position: GalaxyPos) -> bool {
        let gx = position.x.to_num::<i32>().div_euclid(RADAR_CELL_SIZE);
        let gy = position.y.to_num::<i32>().div_euclid(RADAR_CELL_SIZE);
        self.coverage.contains_key(&(gx, gy))
    }

    /// Drop all coverage.
    pub fn clear(&mut self) {
        self.coverage.clear();
    }
}

/// An empire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    /// Identifier.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Money available for construction.
    pub money: i64,
    /// Trait modifiers in percent.
    #[serde(default)]
    pub traits: BTreeMap<TraitKind, f64>,
    /// Building types this player may construct.
    #[serde(default)]
    pub researched_buildings: BTreeSet<BuildingTypeId>,
    /// Produced but not yet deployed items.
    #[serde(default)]
    pub stock: Vec<InventoryItem>,
    /// Whether the planning pipeline drives this player.
    #[serde(default)]
    pub ai_controlled: bool,
    /// Planning behaviour.
    #[serde(default)]
    pub behavior: BehaviorMode,
    /// What attacks aim for.
    #[serde(default)]
    pub attack_mode: AttackMode,
    /// Radar coverage.
    #[serde(default, skip_serializing)]
    pub radar: RadarMap,
}

impl Player {
    /// Create a player with no money, traits or research.
    #[must_use]
    pub fn new(id: PlayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            money: 0,
            traits: BTreeMap::new(),
            researched_buildings: BTreeSet::new(),
            stock: Vec::new(),
            ai_controlled: false,
            behavior: BehaviorMode::default(),
            attack_mode: AttackMode::default(),
            radar: RadarMap::new(),
        }
    }

    /// Trait lookup; `None` when the player lacks the trait.
    #[must_use]
    pub fn trait_value(&self, kind: TraitKind) -> Option<f64> {
        self.traits.get(&kind).copied()
    }

    /// Weapon damage multiplier: `1 + weapons_trait / 100`.
    #[must_use]
    pub fn weapon_multiplier(&self) -> f64 {
        1.0 + self.trait_value(TraitKind::Weapons).unwrap_or(0.0) / 100.0
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Equipment slot state of an inventory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSnapshot {
    /// Slot index on the hull.
    pub slot: u32,
    /// Installed item, if any.
    pub item: Option<ItemTypeId>,
    /// Installed quantity.
    pub count: u32,
}

/// A stack of items of one type owned by one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item type.
    pub type_id: ItemTypeId,
    /// Owner.
    pub owner: PlayerId,
    /// Number of items in the stack.
    pub count: u32,
    /// Equipment slots.
    #[serde(default)]
    pub slots: Vec<SlotSnapshot>,
}

impl InventoryItem {
    /// A stack with no equipment.
    #[must_use]
    pub fn new(type_id: ItemTypeId, owner: PlayerId, count: u32) -> Self {
        Self {
            type_id,
            owner,
            count,
            slots: Vec::new(),
        }
    }
}

/// Change the count of the `(type_id, owner)` stack in `items`.
///
/// Stacks driven to zero are removed; a positive delta on a missing stack
/// creates it. Returns the resulting count.
pub fn adjust_inventory(
    items: &mut Vec<InventoryItem>,
    type_id: ItemTypeId,
    owner: PlayerId,
    delta: i64,
) -> u32 {
    if let Some(index) = items
        .iter()
        .position(|i| i.type_id == type_id && i.owner == owner)
    {
        let next = i64::from(items[index].count) + delta;
        if next <= 0 {
            items.remove(index);
            0
        } else {
            items[index].count = next as u32;
            items[index].count
        }
    } else if delta > 0 {
        let count = u32::try_from(delta).unwrap_or(u32::MAX);
        items.push(InventoryItem::new(type_id, owner, count));
        count
    } else {
        0
    }
}

/// Total count of `type_id` in `items`, optionally restricted to one owner.
#[must_use]
pub fn inventory_total(items: &[InventoryItem], type_id: ItemTypeId, owner: Option<PlayerId>) -> u32 {
    items
        .iter()
        .filter(|i| i.type_id == type_id && owner.map_or(true, |o| o == i.owner))
        .map(|i| i.count)
        .sum()
}

// ============================================================================
// Buildings and planets
// ============================================================================

/// One live building.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    /// Identity.
    pub id: BuildingId,
    /// Type.
    pub type_id: BuildingTypeId,
    /// Top-left surface cell.
    pub location: (u32, u32),
    /// Current hit points.
    pub hit_points: u32,
    /// Maximum hit points.
    pub max_hit_points: u32,
    /// Energy granted by the last allocation pass.
    #[serde(with = "fixed_bits")]
    pub energy_allocated: Fixed,
    /// Workers granted by the last allocation pass.
    #[serde(with = "fixed_bits")]
    pub worker_allocated: Fixed,
    /// Operating efficiency from the last allocation pass, `[0, 1]`.
    #[serde(with = "fixed_bits")]
    pub efficiency: Fixed,
}

impl Building {
    /// A freshly completed building at full health.
    #[must_use]
    pub fn new(id: BuildingId, def: &BuildingData, location: (u32, u32)) -> Self {
        Self {
            id,
            type_id: def.id,
            location,
            hit_points: def.hit_points,
            max_hit_points: def.hit_points,
            energy_allocated: Fixed::ZERO,
            worker_allocated: Fixed::ZERO,
            efficiency: Fixed::ZERO,
        }
    }

    /// Hit points as a fraction of maximum.
    #[must_use]
    pub fn health_ratio(&self) -> Fixed {
        if self.max_hit_points == 0 {
            return Fixed::ZERO;
        }
        Fixed::from_num(self.hit_points) / Fixed::from_num(self.max_hit_points)
    }

    /// Whether damage has not yet knocked the building out of service.
    #[must_use]
    pub fn is_serviceable(&self) -> bool {
        efficiency_bound(self.health_ratio()) > Fixed::ZERO
    }
}

/// Building limit and surface compatibility rule.
///
/// `replacement` evaluates the limit as if one existing instance of the type
/// were being rebuilt in place.
#[must_use]
pub fn can_build_on(
    def: &BuildingData,
    surface: SurfaceKind,
    counts: &BTreeMap<BuildingTypeId, u32>,
    replacement: bool,
) -> bool {
    if !def.allows_surface(surface) {
        return false;
    }
    let Some(limit) = def.limit else {
        return true;
    };
    let existing = counts.get(&def.id).copied().unwrap_or(0);
    let existing = if replacement {
        existing.saturating_sub(1)
    } else {
        existing
    };
    existing < limit
}

/// Per-type building counts.
#[must_use]
pub fn count_buildings(buildings: &[Building]) -> BTreeMap<BuildingTypeId, u32> {
    let mut counts = BTreeMap::new();
    for building in buildings {
        *counts.entry(building.type_id).or_insert(0) += 1;
    }
    counts
}

/// A planet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    /// Identifier.
    pub id: PlanetId,
    /// Display name.
    pub name: String,
    /// Owner, if colonised.
    pub owner: Option<PlayerId>,
    /// Galaxy position.
    pub position: GalaxyPos,
    /// Inhabitants; also the labour pool.
    pub population: i32,
    /// Morale percentage, `0..=100`.
    pub morale: i32,
    /// Tax level.
    pub tax: TaxLevel,
    /// Terrain family.
    pub surface_kind: SurfaceKind,
    /// Surface cells.
    pub surface: SurfaceGrid,
    /// Buildings in construction order.
    pub buildings: Vec<Building>,
    /// Deployed stations, ground units and mines.
    pub inventory: Vec<InventoryItem>,
}

impl Planet {
    /// An unowned planet with an empty surface.
    #[must_use]
    pub fn new(
        id: PlanetId,
        name: impl Into<String>,
        position: GalaxyPos,
        surface_kind: SurfaceKind,
        surface: SurfaceGrid,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            owner: None,
            position,
            population: 0,
            morale: 50,
            tax: TaxLevel::default(),
            surface_kind,
            surface,
            buildings: Vec::new(),
            inventory: Vec::new(),
        }
    }

    /// Per-type building counts.
    #[must_use]
    pub fn building_counts(&self) -> BTreeMap<BuildingTypeId, u32> {
        count_buildings(&self.buildings)
    }

    /// Whether a new building of `type_id` is allowed here.
    #[must_use]
    pub fn can_build(&self, catalog: &Catalog, type_id: BuildingTypeId) -> bool {
        catalog.building(type_id).is_some_and(|def| {
            can_build_on(def, self.surface_kind, &self.building_counts(), false)
        })
    }

    /// Whether a building of `type_id` may be rebuilt in place of an existing one.
    #[must_use]
    pub fn can_build_replacement(&self, catalog: &Catalog, type_id: BuildingTypeId) -> bool {
        catalog.building(type_id).is_some_and(|def| {
            can_build_on(def, self.surface_kind, &self.building_counts(), true)
        })
    }

    /// Live placement: clusters next to existing buildings.
    #[must_use]
    pub fn find_location(&self, catalog: &Catalog, type_id: BuildingTypeId) -> Option<(u32, u32)> {
        let footprint = catalog.building(type_id)?.footprint?;
        PlacementHelper::new(&self.surface, BuildingIndex::from_grid(&self.surface))
            .find_location(footprint)
    }

    /// Place a building. Fails without side effects when the footprint does not fit.
    pub fn add_building(&mut self, id: BuildingId, def: &BuildingData, location: (u32, u32)) -> Result<()> {
        if let Some(footprint) = def.footprint {
            let helper = PlacementHelper::new(&self.surface, BuildingIndex::empty());
            if !helper.can_place_at(location.0, location.1, footprint) {
                return Err(GameError::InvalidState(format!(
                    "{} does not fit at {:?} on {}",
                    def.name, location, self.id
                )));
            }
            self.surface.occupy(location.0, location.1, footprint, id);
        }
        self.buildings.push(Building::new(id, def, location));
        Ok(())
    }

    /// Remove a building and free its cells.
    pub fn remove_building(&mut self, id: BuildingId) -> Option<Building> {
        let index = self.buildings.iter().position(|b| b.id == id)?;
        self.surface.release(id);
        Some(self.buildings.remove(index))
    }

    /// Radar range: the best serviceable radar building, or the base range.
    #[must_use]
    pub fn radar_range(&self, catalog: &Catalog) -> i32 {
        self.buildings
            .iter()
            .filter(|b| b.is_serviceable())
            .filter_map(|b| catalog.building(b.type_id))
            .filter(|def| def.kind == BuildingKind::Radar)
            .map(|def| def.radar_range)
            .fold(BASE_PLANET_RADAR, i32::max)
    }

    /// Living space offered by serviceable housing.
    #[must_use]
    pub fn housing(&self, catalog: &Catalog) -> i32 {
        self.buildings
            .iter()
            .filter(|b| b.is_serviceable())
            .filter_map(|b| catalog.building(b.type_id))
            .map(|def| def.housing)
            .sum()
    }
}

/// A fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fleet {
    /// Identifier.
    pub id: FleetId,
    /// Owner.
    pub owner: PlayerId,
    /// Display name.
    pub name: String,
    /// Galaxy position.
    pub position: GalaxyPos,
    /// Ships and embarked ground units.
    pub inventory: Vec<InventoryItem>,
}

impl Fleet {
    /// An empty fleet.
    #[must_use]
    pub fn new(id: FleetId, owner: PlayerId, name: impl Into<String>, position: GalaxyPos) -> Self {
        Self {
            id,
            owner,
            name: name.into(),
            position,
            inventory: Vec::new(),
        }
    }

    /// Whether nothing is left aboard.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inventory.iter().all(|i| i.count == 0)
    }
}

// ============================================================================
// World
// ============================================================================

/// The complete live world.
#[derive(Debug, Clone, Serialize)]
pub struct World {
    /// Current world tick (planning cycle counter).
    pub tick: u64,
    #[serde(skip)]
    catalog: Arc<Catalog>,
    players: BTreeMap<PlayerId, Player>,
    planets: BTreeMap<PlanetId, Planet>,
    fleets: BTreeMap<FleetId, Fleet>,
    next_building_id: u64,
}

impl World {
    /// An empty world over a shared catalog.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            tick: 0,
            catalog,
            players: BTreeMap::new(),
            planets: BTreeMap::new(),
            fleets: BTreeMap::new(),
            next_building_id: 1,
        }
    }

    /// Shared balance tables.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Insert or replace a player.
    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
    }

    /// Insert or replace a planet.
    pub fn add_planet(&mut self, planet: Planet) {
        self.planets.insert(planet.id, planet);
    }

    /// Insert or replace a fleet.
    pub fn add_fleet(&mut self, fleet: Fleet) {
        self.fleets.insert(fleet.id, fleet);
    }

    /// Remove a fleet.
    pub fn remove_fleet(&mut self, id: FleetId) -> Option<Fleet> {
        self.fleets.remove(&id)
    }

    /// Allocate a fresh building identity.
    pub fn next_building_id(&mut self) -> BuildingId {
        let id = BuildingId(self.next_building_id);
        self.next_building_id += 1;
        id
    }

    /// All players in id order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// All planets in id order.
    pub fn planets(&self) -> impl Iterator<Item = &Planet> {
        self.planets.values()
    }

    /// All planets, mutably, in id order.
    pub fn planets_mut(&mut self) -> impl Iterator<Item = &mut Planet> {
        self.planets.values_mut()
    }

    /// All fleets in id order.
    pub fn fleets(&self) -> impl Iterator<Item = &Fleet> {
        self.fleets.values()
    }

    /// Planets owned by `owner`.
    pub fn planets_of(&self, owner: PlayerId) -> impl Iterator<Item = &Planet> {
        self.planets.values().filter(move |p| p.owner == Some(owner))
    }

    /// Fleets owned by `owner`.
    pub fn fleets_of(&self, owner: PlayerId) -> impl Iterator<Item = &Fleet> {
        self.fleets.values().filter(move |f| f.owner == owner)
    }

    /// Look up a player.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Look up a player or fail.
    pub fn require_player(&self, id: PlayerId) -> Result<&Player> {
        self.players
            .get(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Look up a player mutably or fail.
    pub fn require_player_mut(&mut self, id: PlayerId) -> Result<&mut Player> {
        self.players
            .get_mut(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Look up a planet.
    #[must_use]
    pub fn planet(&self, id: PlanetId) -> Option<&Planet> {
        self.planets.get(&id)
    }

    /// Look up a planet or fail.
    pub fn require_planet(&self, id: PlanetId) -> Result<&Planet> {
        self.planets
            .get(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Look up a planet mutably or fail.
    pub fn require_planet_mut(&mut self, id: PlanetId) -> Result<&mut Planet> {
        self.planets
            .get_mut(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Look up a fleet.
    #[must_use]
    pub fn fleet(&self, id: FleetId) -> Option<&Fleet> {
        self.fleets.get(&id)
    }

    /// Look up a fleet or fail.
    pub fn require_fleet(&self, id: FleetId) -> Result<&Fleet> {
        self.fleets
            .get(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Look up a fleet mutably or fail.
    pub fn require_fleet_mut(&mut self, id: FleetId) -> Result<&mut Fleet> {
        self.fleets
            .get_mut(&id)
            .ok_or_else(|| GameError::EntityNotFound(id.to_string()))
    }

    /// Recompute a player's radar coverage from its planets and fleets.
    pub fn refresh_radar(&mut self, player: PlayerId) {
        let mut radar = RadarMap::new();
        for planet in self.planets_of(player) {
            radar.add_coverage(planet.position, planet.radar_range(&self.catalog));
        }
        for fleet in self.fleets_of(player) {
            radar.add_coverage(fleet.position, FLEET_RADAR_RANGE);
        }
        if let Some(p) = self.players.get_mut(&player) {
            p.radar = radar;
        }
    }

    /// Hand a planet to a new owner, withdrawing the old owner's radar over it.
    pub fn transfer_planet(&mut self, planet_id: PlanetId, new_owner: Option<PlayerId>) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let planet = self.require_planet_mut(planet_id)?;
        let old_owner = planet.owner;
        let position = planet.position;
        let radius = planet.radar_range(&catalog);
        planet.owner = new_owner;

        if let Some(old) = old_owner {
            if let Some(player) = self.players.get_mut(&old) {
                player.radar.remove_coverage(position, radius);
            }
        }
        if let Some(new) = new_owner {
            if let Some(player) = self.players.get_mut(&new) {
                player.radar.add_coverage(position, radius);
            }
        }
        tracing::info!(planet = %planet_id, ?old_owner, ?new_owner, "planet changed hands");
        Ok(())
    }

    /// Hash of the serialized world, for determinism checks.
    pub fn state_hash(&self) -> Result<u64> {
        let bytes = bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("world serialization failed: {e}")))?;
        let mut hasher = DefaultHasher::new();
        hasher.write(&bytes);
        let hash = hasher.finish();
        tracing::debug!(tick = self.tick, state_hash = hash, "World state hash");
        Ok(hash)
    }
}
