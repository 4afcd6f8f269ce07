//! Read-only per-player views of the live world.
//!
//! A [`WorldView`] is a value copy: it owns its planets, buildings, surface
//! grids and inventory lines and holds no references into the [`World`].
//! The planning layer reasons over views only, so a view can be handed to a
//! worker thread while the live world keeps ticking. Views are rebuilt from
//! scratch every planning cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::allocation::ResourcePools;
use crate::combat::AttackDefenseTotals;
use crate::data::{BuildingKind, Catalog};
use crate::error::Result;
use crate::ids::{BuildingId, BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
use crate::math::{Fixed, GalaxyPos};
use crate::planning::{AttackMode, BehaviorMode};
use crate::surface::{BuildingIndex, PlacementHelper, SurfaceGrid, SurfaceKind};
use crate::world::{can_build_on, Building, Fleet, InventoryItem, Planet, SlotSnapshot, TaxLevel, World};

/// Aggregated inventory entry keyed by `(type, owner)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryLineItem {
    /// Item type.
    pub type_id: ItemTypeId,
    /// Owner.
    pub owner: PlayerId,
    /// Count; always positive while the line exists.
    pub count: u32,
    /// Slots of every aggregated stack.
    pub slots: Vec<SlotSnapshot>,
}

/// Aggregate live stacks by `(type, owner)`, in key order.
#[must_use]
pub fn aggregate_inventory<'a>(items: impl IntoIterator<Item = &'a InventoryItem>) -> Vec<InventoryLineItem> {
    let mut lines: BTreeMap<(ItemTypeId, PlayerId), InventoryLineItem> = BTreeMap::new();
    for item in items {
        if item.count == 0 {
            continue;
        }
        let line = lines
            .entry((item.type_id, item.owner))
            .or_insert_with(|| InventoryLineItem {
                type_id: item.type_id,
                owner: item.owner,
                count: 0,
                slots: Vec::new(),
            });
        line.count = line.count.saturating_add(item.count);
        line.slots.extend(item.slots.iter().copied());
    }
    lines.into_values().collect()
}

/// Adjust the `(type, owner)` line by `delta`.
///
/// Lines reaching zero are removed; a positive delta on a missing line
/// creates it. Returns the resulting count.
pub fn adjust_lines(lines: &mut Vec<InventoryLineItem>, type_id: ItemTypeId, owner: PlayerId, delta: i64) -> u32 {
    match lines
        .iter()
        .position(|l| l.type_id == type_id && l.owner == owner)
    {
        Some(index) => {
            let next = i64::from(lines[index].count) + delta;
            if next <= 0 {
                lines.remove(index);
                0
            } else {
                lines[index].count = u32::try_from(next).unwrap_or(u32::MAX);
                lines[index].count
            }
        }
        None if delta > 0 => {
            let count = u32::try_from(delta).unwrap_or(u32::MAX);
            lines.push(InventoryLineItem {
                type_id,
                owner,
                count,
                slots: Vec::new(),
            });
            count
        }
        None => 0,
    }
}

/// Count of `type_id` across lines, optionally for one owner.
#[must_use]
pub fn line_count(lines: &[InventoryLineItem], type_id: ItemTypeId, owner: Option<PlayerId>) -> u32 {
    lines
        .iter()
        .filter(|l| l.type_id == type_id && owner.map_or(true, |o| o == l.owner))
        .map(|l| l.count)
        .sum()
}

/// Copy of one structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildingView {
    /// Identity of the live building.
    pub id: BuildingId,
    /// Type.
    pub type_id: BuildingTypeId,
    /// Functional family.
    pub kind: BuildingKind,
    /// Top-left cell.
    pub location: (u32, u32),
    /// Hit points.
    pub hit_points: u32,
    /// Maximum hit points.
    pub max_hit_points: u32,
    /// Energy from the last allocation pass.
    pub energy_allocated: Fixed,
    /// Workers from the last allocation pass.
    pub worker_allocated: Fixed,
    /// Efficiency from the last allocation pass.
    pub efficiency: Fixed,
}

impl BuildingView {
    /// Whether this view was taken of `building`. Identity only; no state is compared.
    #[must_use]
    pub fn is_same_as(&self, building: &Building) -> bool {
        self.id == building.id
    }

    /// Whether the building is damaged below full health.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.hit_points < self.max_hit_points
    }
}

/// Copy of one planet's economy and defences.
#[derive(Debug, Clone)]
pub struct PlanetView {
    /// Planet id.
    pub id: PlanetId,
    /// Display name.
    pub name: String,
    /// Owner.
    pub owner: Option<PlayerId>,
    /// Galaxy position.
    pub position: GalaxyPos,
    /// Population.
    pub population: i32,
    /// Morale percentage.
    pub morale: i32,
    /// Tax level.
    pub tax: TaxLevel,
    /// Radar range.
    pub radar_range: i32,
    /// Terrain family.
    pub surface_kind: SurfaceKind,
    /// Copied surface grid.
    pub surface: SurfaceGrid,
    /// Copied buildings.
    pub buildings: Vec<BuildingView>,
    /// Per-type building counts.
    pub building_counts: BTreeMap<BuildingTypeId, u32>,
    /// Aggregated inventory.
    pub inventory: Vec<InventoryLineItem>,
    /// Energy the producers can supply.
    pub energy_production: Fixed,
    /// Energy the consumers ask for.
    pub energy_demand: Fixed,
    /// Workers the buildings ask for.
    pub worker_demand: Fixed,
    /// Living space.
    pub housing: i32,
    /// Defensive strength of stations, ground units, mines and guns.
    pub defense: AttackDefenseTotals,
    catalog: Arc<Catalog>,
}

impl PlanetView {
    /// Copy a live planet.
    #[must_use]
    pub fn from_planet(planet: &Planet, catalog: &Arc<Catalog>) -> Self {
        let pools = ResourcePools::for_planet(planet, catalog);
        let mut energy_demand = Fixed::ZERO;
        let mut worker_demand = Fixed::ZERO;
        let mut buildings = Vec::with_capacity(planet.buildings.len());

        for building in &planet.buildings {
            let Some(def) = catalog.building(building.type_id) else {
                continue;
            };
            energy_demand = energy_demand.saturating_add(Fixed::from_num(def.energy_demand()));
            worker_demand = worker_demand.saturating_add(Fixed::from_num(def.workers.max(0)));
            buildings.push(BuildingView {
                id: building.id,
                type_id: building.type_id,
                kind: def.kind,
                location: building.location,
                hit_points: building.hit_points,
                max_hit_points: building.max_hit_points,
                energy_allocated: building.energy_allocated,
                worker_allocated: building.worker_allocated,
                efficiency: building.efficiency,
            });
        }

        let inventory = aggregate_inventory(&planet.inventory);
        let defense = AttackDefenseTotals::for_lines(&inventory, catalog)
            + AttackDefenseTotals::for_buildings(planet.buildings.iter().map(|b| b.type_id), catalog);

        Self {
            id: planet.id,
            name: planet.name.clone(),
            owner: planet.owner,
            position: planet.position,
            population: planet.population,
            morale: planet.morale,
            tax: planet.tax,
            radar_range: planet.radar_range(catalog),
            surface_kind: planet.surface_kind,
            surface: planet.surface.clone(),
            buildings,
            building_counts: planet.building_counts(),
            inventory,
            energy_production: pools.energy,
            energy_demand,
            worker_demand,
            housing: planet.housing(catalog),
            defense,
            catalog: Arc::clone(catalog),
        }
    }

    /// Whether any line of `type_id` exists.
    #[must_use]
    pub fn has_inventory(&self, type_id: ItemTypeId) -> bool {
        self.inventory.iter().any(|l| l.type_id == type_id)
    }

    /// Count of `type_id`, optionally restricted to one owner.
    #[must_use]
    pub fn inventory_count(&self, type_id: ItemTypeId, owner: Option<PlayerId>) -> u32 {
        line_count(&self.inventory, type_id, owner)
    }

    /// Limit and surface rule against the copied building list.
    #[must_use]
    pub fn can_build(&self, type_id: BuildingTypeId) -> bool {
        self.catalog
            .building(type_id)
            .is_some_and(|def| can_build_on(def, self.surface_kind, &self.building_counts, false))
    }

    /// Like [`Self::can_build`] with one existing instance being replaced.
    #[must_use]
    pub fn can_build_replacement(&self, type_id: BuildingTypeId) -> bool {
        self.catalog
            .building(type_id)
            .is_some_and(|def| can_build_on(def, self.surface_kind, &self.building_counts, true))
    }

    /// First-fit location on the copied grid; `None` if the type has no
    /// footprint or nothing fits.
    #[must_use]
    pub fn find_location(&self, type_id: BuildingTypeId) -> Option<(u32, u32)> {
        let footprint = self.catalog.building(type_id)?.footprint?;
        PlacementHelper::new(&self.surface, BuildingIndex::empty()).find_location(footprint)
    }

    /// Euclidean distance to a galaxy position.
    #[must_use]
    pub fn distance(&self, other: GalaxyPos) -> Fixed {
        self.position.distance(other)
    }

    /// Adjust the local inventory copy. Never touches the live planet.
    pub fn add_inventory_count(&mut self, type_id: ItemTypeId, owner: PlayerId, delta: i64) -> u32 {
        adjust_lines(&mut self.inventory, type_id, owner, delta)
    }

    /// Number of buildings of one kind.
    #[must_use]
    pub fn count_of_kind(&self, kind: BuildingKind) -> u32 {
        self.buildings.iter().filter(|b| b.kind == kind).count() as u32
    }

    /// Spare energy; negative when consumers outstrip producers.
    #[must_use]
    pub fn energy_surplus(&self) -> Fixed {
        self.energy_production - self.energy_demand
    }

    /// Catalog the view was built against.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// Copy of one fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetView {
    /// Fleet id.
    pub id: FleetId,
    /// Owner.
    pub owner: PlayerId,
    /// Galaxy position.
    pub position: GalaxyPos,
    /// Aggregated inventory.
    pub inventory: Vec<InventoryLineItem>,
    /// Combined strength of the ships aboard.
    pub strength: AttackDefenseTotals,
}

impl FleetView {
    /// Copy a live fleet.
    #[must_use]
    pub fn from_fleet(fleet: &Fleet, catalog: &Catalog) -> Self {
        let inventory = aggregate_inventory(&fleet.inventory);
        let strength = AttackDefenseTotals::for_lines(&inventory, catalog);
        Self {
            id: fleet.id,
            owner: fleet.owner,
            position: fleet.position,
            inventory,
            strength,
        }
    }

    /// Euclidean distance to a galaxy position.
    #[must_use]
    pub fn distance(&self, other: GalaxyPos) -> Fixed {
        self.position.distance(other)
    }
}

/// Everything one player may see this cycle.
#[derive(Debug, Clone)]
pub struct WorldView {
    /// The viewing player.
    pub player: PlayerId,
    /// World tick the view was taken at.
    pub tick: u64,
    /// Money at snapshot time.
    pub money: i64,
    /// Planning behaviour.
    pub behavior: BehaviorMode,
    /// Attack aim.
    pub attack_mode: AttackMode,
    /// Building types the player may construct.
    pub researched_buildings: BTreeSet<BuildingTypeId>,
    /// Undeployed stock.
    pub stock: Vec<InventoryLineItem>,
    /// Own planets.
    pub planets: Vec<PlanetView>,
    /// Foreign planets under radar coverage.
    pub visible_planets: Vec<PlanetView>,
    /// Own fleets.
    pub fleets: Vec<FleetView>,
    catalog: Arc<Catalog>,
}

impl WorldView {
    /// Catalog the view was built against.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Look up an own planet view.
    #[must_use]
    pub fn planet(&self, id: PlanetId) -> Option<&PlanetView> {
        self.planets.iter().find(|p| p.id == id)
    }

    /// Combined strength of every own fleet.
    #[must_use]
    pub fn total_fleet_strength(&self) -> AttackDefenseTotals {
        AttackDefenseTotals::fold(self.fleets.iter().map(|f| f.strength))
    }
}

/// Builds [`WorldView`]s from the live world.
#[derive(Debug, Clone, Copy)]
pub struct WorldSnapshotBuilder<'w> {
    world: &'w World,
}

impl<'w> WorldSnapshotBuilder<'w> {
    /// Bind to the live world for one planning cycle.
    #[must_use]
    pub const fn new(world: &'w World) -> Self {
        Self { world }
    }

    /// Snapshot for one player.
    pub fn build(&self, player_id: PlayerId) -> Result<WorldView> {
        let player = self.world.require_player(player_id)?;
        let catalog = self.world.catalog();

        let planets: Vec<PlanetView> = self
            .world
            .planets_of(player_id)
            .map(|p| PlanetView::from_planet(p, catalog))
            .collect();
        let visible_planets: Vec<PlanetView> = self
            .world
            .planets()
            .filter(|p| p.owner != Some(player_id) && player.radar.is_covered(p.position))
            .map(|p| PlanetView::from_planet(p, catalog))
            .collect();
        let fleets: Vec<FleetView> = self
            .world
            .fleets_of(player_id)
            .map(|f| FleetView::from_fleet(f, catalog))
            .collect();

        tracing::debug!(
            player = %player_id,
            planets = planets.len(),
            visible = visible_planets.len(),
            fleets = fleets.len(),
            "Snapshot built"
        );

        Ok(WorldView {
            player: player_id,
            tick: self.world.tick,
            money: player.money,
            behavior: player.behavior,
            attack_mode: player.attack_mode,
            researched_buildings: player.researched_buildings.clone(),
            stock: aggregate_inventory(&player.stock),
            planets,
            visible_planets,
            fleets,
            catalog: Arc::clone(catalog),
        })
    }

    /// Snapshots for every AI-controlled player, in player order.
    pub fn build_ai_views(&self) -> Result<Vec<WorldView>> {
        self.world
            .players()
            .filter(|p| p.ai_controlled)
            .map(|p| self.build(p.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BalanceData, BuildingData, FrameLayout};
    use crate::surface::Footprint;
    use crate::world::Player;
    use proptest::prelude::*;

    fn catalog() -> Arc<Catalog> {
        let plant = BuildingData {
            id: BuildingTypeId(1),
            name: "plant".into(),
            kind: BuildingKind::Power,
            footprint: Some(Footprint::new(2, 2)),
            cost: 100,
            energy: 60,
            workers: 10,
            hit_points: 100,
            limit: Some(2),
            surfaces: vec![],
            housing: 0,
            morale: 0,
            radar_range: 0,
            weapon: None,
            shield: 0,
            frames: FrameLayout::default(),
        };
        let beacon = BuildingData {
            id: BuildingTypeId(2),
            name: "beacon".into(),
            kind: BuildingKind::Other,
            footprint: None,
            ..plant.clone()
        };
        Arc::new(
            Catalog::new(BalanceData {
                buildings: vec![plant, beacon],
                ..Default::default()
            })
            .expect("catalog"),
        )
    }

    fn world() -> World {
        let catalog = catalog();
        let mut world = World::new(Arc::clone(&catalog));
        let mut player = Player::new(PlayerId(1), "Humans");
        player.ai_controlled = true;
        world.add_player(player);
        world.add_player(Player::new(PlayerId(2), "Rivals"));

        let mut home = Planet::new(
            PlanetId(1),
            "Home",
            GalaxyPos::from_ints(0, 0),
            SurfaceKind::Earth,
            SurfaceGrid::new(6, 6),
        );
        home.owner = Some(PlayerId(1));
        home.population = 100;
        let id = world.next_building_id();
        let def = catalog.building(BuildingTypeId(1)).expect("plant").clone();
        home.add_building(id, &def, (2, 2)).expect("fits");
        home.inventory.push(InventoryItem::new(ItemTypeId(5), PlayerId(1), 2));
        home.inventory.push(InventoryItem::new(ItemTypeId(5), PlayerId(1), 3));
        home.inventory.push(InventoryItem::new(ItemTypeId(5), PlayerId(2), 1));
        world.add_planet(home);

        let mut near = Planet::new(
            PlanetId(2),
            "Near",
            GalaxyPos::from_ints(20, 0),
            SurfaceKind::Earth,
            SurfaceGrid::new(4, 4),
        );
        near.owner = Some(PlayerId(2));
        world.add_planet(near);

        let mut far = Planet::new(
            PlanetId(3),
            "Far",
            GalaxyPos::from_ints(900, 900),
            SurfaceKind::Earth,
            SurfaceGrid::new(4, 4),
        );
        far.owner = Some(PlayerId(2));
        world.add_planet(far);

        world.refresh_radar(PlayerId(1));
        world
    }

    #[test]
    fn test_inventory_aggregated_by_type_and_owner() {
        let world = world();
        let view = WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view");
        let home = view.planet(PlanetId(1)).expect("home");

        assert_eq!(home.inventory.len(), 2);
        assert_eq!(home.inventory_count(ItemTypeId(5), Some(PlayerId(1))), 5);
        assert_eq!(home.inventory_count(ItemTypeId(5), None), 6);
        assert!(home.has_inventory(ItemTypeId(5)));
        assert!(!home.has_inventory(ItemTypeId(6)));
    }

    #[test]
    fn test_radar_limits_visible_planets() {
        let world = world();
        let view = WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view");
        let visible: Vec<PlanetId> = view.visible_planets.iter().map(|p| p.id).collect();
        assert_eq!(visible, vec![PlanetId(2)]);
    }

    #[test]
    fn test_view_mutation_does_not_touch_live_world() {
        let world = world();
        let mut view = WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view");
        let home = &mut view.planets[0];
        home.add_inventory_count(ItemTypeId(5), PlayerId(1), -5);
        home.surface.occupy(0, 0, Footprint::new(1, 1), BuildingId(99));

        let live = world.planet(PlanetId(1)).expect("live");
        assert_eq!(crate::world::inventory_total(&live.inventory, ItemTypeId(5), Some(PlayerId(1))), 5);
        assert!(live.surface.is_available(0, 0));
    }

    #[test]
    fn test_build_queries_use_copied_state() {
        let world = world();
        let view = WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view");
        let home = view.planet(PlanetId(1)).expect("home");

        assert!(home.can_build(BuildingTypeId(1)));
        assert!(home.can_build_replacement(BuildingTypeId(1)));
        assert!(!home.can_build(BuildingTypeId(9)));
        // First fit ignores adjacency to the plant at (2, 2).
        assert_eq!(home.find_location(BuildingTypeId(1)), Some((0, 0)));
        assert_eq!(home.find_location(BuildingTypeId(2)), None);
        assert_eq!(home.distance(GalaxyPos::from_ints(3, 4)), Fixed::from_num(5));
        assert!(home.buildings[0].is_same_as(&world.planet(PlanetId(1)).expect("live").buildings[0]));
    }

    #[test]
    fn test_energy_figures() {
        let world = world();
        let view = WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view");
        let home = view.planet(PlanetId(1)).expect("home");
        assert_eq!(home.energy_production, Fixed::from_num(60));
        assert_eq!(home.energy_demand, Fixed::ZERO);
        assert_eq!(home.worker_demand, Fixed::from_num(10));
        assert_eq!(home.count_of_kind(BuildingKind::Power), 1);
    }

    #[test]
    fn test_ai_views_only_for_ai_players() {
        let world = world();
        let views = WorldSnapshotBuilder::new(&world).build_ai_views().expect("views");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].player, PlayerId(1));
    }

    #[test]
    fn test_view_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WorldView>();
    }

    fn lines_strategy() -> impl Strategy<Value = Vec<InventoryLineItem>> {
        prop::collection::btree_map((0u32..6, 0u32..3), 1u32..50, 0..8).prop_map(|m| {
            m.into_iter()
                .map(|((t, o), count)| InventoryLineItem {
                    type_id: ItemTypeId(t),
                    owner: PlayerId(o),
                    count,
                    slots: Vec::new(),
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_add_then_remove_restores_lines(
            lines in lines_strategy(),
            t in 0u32..6,
            o in 0u32..3,
            n in 1i64..100,
        ) {
            let mut working = lines.clone();
            adjust_lines(&mut working, ItemTypeId(t), PlayerId(o), n);
            adjust_lines(&mut working, ItemTypeId(t), PlayerId(o), -n);
            prop_assert_eq!(working, lines);
        }

        #[test]
        fn prop_no_zero_count_lines(
            lines in lines_strategy(),
            t in 0u32..6,
            o in 0u32..3,
            delta in -100i64..100,
        ) {
            let mut working = lines;
            adjust_lines(&mut working, ItemTypeId(t), PlayerId(o), delta);
            prop_assert!(working.iter().all(|l| l.count > 0));
        }
    }
}
