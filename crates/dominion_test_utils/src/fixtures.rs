//! Test fixtures and helpers.
//!
//! A small but complete balance table and a two-empire world built on it,
//! for tests and benchmarks that need more than a handful of hand-made
//! entities.

use std::sync::Arc;

use dominion_core::data::{BalanceData, Catalog};
use dominion_core::ids::{BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
use dominion_core::math::GalaxyPos;
use dominion_core::planning::{AttackMode, BehaviorMode};
use dominion_core::surface::{SurfaceGrid, SurfaceKind};
use dominion_core::world::{Fleet, InventoryItem, Planet, Player, TraitKind, World};
use fixed::types::I32F32;
use serde::de::DeserializeOwned;

/// Balance data shared by the sample world.
pub const SAMPLE_BALANCE_RON: &str = r#"
(
    buildings: [
        (id: (1), name: "solar_plant", kind: Power, footprint: Some((width: 2, height: 2)),
         cost: 400, energy: 60, workers: 10, hit_points: 300),
        (id: (2), name: "habitat", kind: Housing, footprint: Some((width: 2, height: 1)),
         cost: 250, energy: -5, hit_points: 200, housing: 400),
        (id: (3), name: "factory", kind: Factory, footprint: Some((width: 2, height: 2)),
         cost: 600, energy: -25, workers: 40, hit_points: 400),
        (id: (4), name: "park", kind: Social, cost: 150, energy: -2, hit_points: 100, morale: 10),
        (id: (5), name: "radar_dish", kind: Radar, cost: 300, energy: -10, hit_points: 150,
         radar_range: 150, limit: Some(1)),
        (id: (6), name: "laser_tower", kind: Defense, cost: 500, energy: -15, hit_points: 350,
         weapon: Some((damage: 14, range: 220.0, delay: 8))),
        (id: (7), name: "shield_generator", kind: Shield, footprint: Some((width: 2, height: 2)),
         cost: 700, energy: -30, hit_points: 250, shield: 200, limit: Some(1)),
    ],
    items: [
        (id: (10), name: "fighter", category: Ship, cost: 120, hit_points: 80, speed: 5.0, ecm: 1,
         weapons: [(kind: Rocket, damage: 10, range: 180.0, delay: 5)]),
        (id: (11), name: "cruiser", category: Ship, cost: 600, hit_points: 300, shield: 60, speed: 3.0,
         weapons: [(damage: 25, range: 240.0, delay: 9, anti_ecm: 1)]),
        (id: (12), name: "orbital_station", category: Station, cost: 900, hit_points: 500, shield: 100,
         weapons: [(damage: 30, range: 300.0, delay: 10)], max_per_planet: Some(2)),
        (id: (13), name: "tank", category: GroundUnit, cost: 150, hit_points: 60, speed: 4.0,
         weapons: [(damage: 8, range: 70.0, delay: 3)]),
        (id: (14), name: "mine", category: Mine, cost: 60, hit_points: 1, burst_damage: 40,
         max_per_planet: Some(4)),
        (id: (15), name: "spy_satellite", category: Satellite, cost: 200, hit_points: 20),
    ],
    battle_efficiency: [
        (category: Some(Station), damage_multiplier: 1.2),
    ],
)
"#;

/// Solar plant type.
pub const SOLAR_PLANT: BuildingTypeId = BuildingTypeId(1);
/// Habitat type.
pub const HABITAT: BuildingTypeId = BuildingTypeId(2);
/// Factory type.
pub const FACTORY: BuildingTypeId = BuildingTypeId(3);
/// Laser tower type.
pub const LASER_TOWER: BuildingTypeId = BuildingTypeId(6);
/// Fighter type.
pub const FIGHTER: ItemTypeId = ItemTypeId(10);
/// Cruiser type.
pub const CRUISER: ItemTypeId = ItemTypeId(11);
/// Orbital station type.
pub const STATION: ItemTypeId = ItemTypeId(12);
/// Tank type.
pub const TANK: ItemTypeId = ItemTypeId(13);
/// Mine type.
pub const MINE: ItemTypeId = ItemTypeId(14);

/// The balanced, capture-minded empire.
pub const GARTHOG: PlayerId = PlayerId(1);
/// The pirate empire.
pub const OCULUM: PlayerId = PlayerId(2);

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real economy code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Parse a RON fixture, panicking with the parser's message on failure.
///
/// # Panics
///
/// Panics if `text` does not deserialize into `T`.
#[must_use]
pub fn parse_ron<T: DeserializeOwned>(text: &str) -> T {
    match ron::from_str(text) {
        Ok(value) => value,
        Err(e) => panic!("fixture RON failed to parse: {e}"),
    }
}

/// The sample catalog.
///
/// # Panics
///
/// Panics if [`SAMPLE_BALANCE_RON`] stops parsing.
#[must_use]
pub fn sample_catalog() -> Arc<Catalog> {
    let data: BalanceData = parse_ron(SAMPLE_BALANCE_RON);
    Arc::new(Catalog::new(data).expect("sample balance indexes"))
}

fn place(world: &mut World, planet: &mut Planet, type_id: BuildingTypeId, at: (u32, u32)) {
    let def = world.catalog().require_building(type_id).expect("sample building").clone();
    let id = world.next_building_id();
    planet.add_building(id, &def, at).expect("sample placement");
}

/// Two AI empires facing each other, plus an unclaimed planet.
///
/// Garthog's fleet sits within radar range of Oculum's home, so the first
/// planning cycle already has an attack to consider.
///
/// # Panics
///
/// Panics if the sample layout stops fitting the sample balance.
#[must_use]
pub fn sample_world() -> World {
    let catalog = sample_catalog();
    let mut world = World::new(Arc::clone(&catalog));

    let mut garthog = Player::new(GARTHOG, "Garthog");
    garthog.money = 5000;
    garthog.ai_controlled = true;
    garthog.behavior = BehaviorMode::Balanced;
    garthog.attack_mode = AttackMode::Capture;
    garthog.researched_buildings = catalog.buildings().map(|b| b.id).collect();
    garthog.traits.insert(TraitKind::Weapons, 10.0);
    garthog.stock = vec![InventoryItem::new(STATION, GARTHOG, 2), InventoryItem::new(MINE, GARTHOG, 3)];
    world.add_player(garthog);

    let mut oculum = Player::new(OCULUM, "Oculum");
    oculum.money = 3000;
    oculum.ai_controlled = true;
    oculum.behavior = BehaviorMode::Pirate;
    oculum.attack_mode = AttackMode::Cripple;
    oculum.researched_buildings = [SOLAR_PLANT, FACTORY, LASER_TOWER].into_iter().collect();
    world.add_player(oculum);

    let mut prime = Planet::new(
        PlanetId(1),
        "Garthog Prime",
        GalaxyPos::ZERO,
        SurfaceKind::Earth,
        SurfaceGrid::new(12, 10),
    );
    prime.owner = Some(GARTHOG);
    prime.population = 800;
    place(&mut world, &mut prime, SOLAR_PLANT, (0, 0));
    place(&mut world, &mut prime, FACTORY, (3, 0));
    place(&mut world, &mut prime, HABITAT, (6, 0));
    prime.inventory.push(InventoryItem::new(STATION, GARTHOG, 1));
    world.add_planet(prime);

    let mut home = Planet::new(
        PlanetId(2),
        "Oculum",
        GalaxyPos::from_ints(120, 0),
        SurfaceKind::Desert,
        SurfaceGrid::new(12, 10).with_blocked(&[(5, 5), (6, 5)]),
    );
    home.owner = Some(OCULUM);
    home.population = 600;
    place(&mut world, &mut home, SOLAR_PLANT, (0, 0));
    place(&mut world, &mut home, LASER_TOWER, (9, 4));
    place(&mut world, &mut home, FACTORY, (3, 0));
    home.inventory = vec![InventoryItem::new(TANK, OCULUM, 3), InventoryItem::new(MINE, OCULUM, 2)];
    world.add_planet(home);

    world.add_planet(Planet::new(
        PlanetId(3),
        "Vega",
        GalaxyPos::from_ints(60, 80),
        SurfaceKind::Cratered,
        SurfaceGrid::new(8, 8),
    ));

    let mut armada = Fleet::new(FleetId(1), GARTHOG, "First Armada", GalaxyPos::from_ints(100, 0));
    armada.inventory = vec![
        InventoryItem::new(FIGHTER, GARTHOG, 8),
        InventoryItem::new(CRUISER, GARTHOG, 2),
        InventoryItem::new(TANK, GARTHOG, 6),
    ];
    world.add_fleet(armada);

    let mut raiders = Fleet::new(FleetId(2), OCULUM, "Raiders", GalaxyPos::from_ints(120, 0));
    raiders.inventory = vec![InventoryItem::new(FIGHTER, OCULUM, 4)];
    world.add_fleet(raiders);

    world.refresh_radar(GARTHOG);
    world.refresh_radar(OCULUM);
    world
}
