//! Scenario loading and world construction.
//!
//! Scenarios define the starting world for a headless run: balance data,
//! empires, planets with their buildings and defences, and fleets. Types are
//! referred to by name so scenario files stay readable.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use dominion_core::data::{BalanceData, Catalog};
use dominion_core::error::GameError;
use dominion_core::ids::{BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
use dominion_core::math::GalaxyPos;
use dominion_core::planning::{AttackMode, BehaviorMode};
use dominion_core::surface::{SurfaceGrid, SurfaceKind};
use dominion_core::world::{Fleet, InventoryItem, Planet, Player, TaxLevel, TraitKind, World};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The built-in two-empire scenario.
pub const SKIRMISH_RON: &str = include_str!("../scenarios/skirmish.ron");

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A building or item name is not in the balance data.
    #[error("Unknown {kind} '{name}'")]
    UnknownName {
        /// "building" or "item".
        kind: &'static str,
        /// The name as written.
        name: String,
    },
    /// The scenario contradicts itself.
    #[error("Invalid scenario: {0}")]
    Invalid(String),
    /// The core rejected the setup.
    #[error(transparent)]
    Game(#[from] GameError),
}

fn default_turns() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

fn default_morale() -> i32 {
    50
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Turns to run unless overridden.
    #[serde(default = "default_turns")]
    pub turns: u32,
    /// Base seed for battle rolls.
    #[serde(default)]
    pub seed: u64,
    /// Buildings, items and tables.
    pub balance: BalanceData,
    /// Empires.
    pub players: Vec<PlayerSetup>,
    /// Planets.
    pub planets: Vec<PlanetSetup>,
    /// Fleets.
    #[serde(default)]
    pub fleets: Vec<FleetSetup>,
}

/// Starting state of one empire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Player id.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Starting money.
    #[serde(default)]
    pub money: i64,
    /// Whether the planner drives this empire.
    #[serde(default = "default_true")]
    pub ai_controlled: bool,
    /// Planning behaviour.
    #[serde(default)]
    pub behavior: BehaviorMode,
    /// Attack aim.
    #[serde(default)]
    pub attack_mode: AttackMode,
    /// Trait modifiers in percent.
    #[serde(default)]
    pub traits: BTreeMap<TraitKind, f64>,
    /// Constructible buildings by name; `None` means every building.
    #[serde(default)]
    pub researched: Option<Vec<String>>,
    /// Undeployed items.
    #[serde(default)]
    pub stock: Vec<ItemLine>,
}

/// A counted stack of items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemLine {
    /// Item name.
    pub item: String,
    /// How many.
    pub count: u32,
    /// Owner; defaults to the owner of the planet, fleet or stock.
    #[serde(default)]
    pub owner: Option<PlayerId>,
}

/// A building at a fixed cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingPlacement {
    /// Building name.
    pub kind: String,
    /// Top-left cell.
    pub at: (u32, u32),
}

/// Starting state of one planet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanetSetup {
    /// Planet id.
    pub id: PlanetId,
    /// Display name.
    pub name: String,
    /// Owner, if colonised.
    #[serde(default)]
    pub owner: Option<PlayerId>,
    /// Galaxy position.
    pub position: (i32, i32),
    /// Terrain family.
    pub surface: SurfaceKind,
    /// Surface grid size in cells.
    pub size: (u32, u32),
    /// Impassable cells.
    #[serde(default)]
    pub blocked: Vec<(u32, u32)>,
    /// Population.
    #[serde(default)]
    pub population: i32,
    /// Morale percentage.
    #[serde(default = "default_morale")]
    pub morale: i32,
    /// Tax level.
    #[serde(default)]
    pub tax: TaxLevel,
    /// Buildings.
    #[serde(default)]
    pub buildings: Vec<BuildingPlacement>,
    /// Deployed items.
    #[serde(default)]
    pub inventory: Vec<ItemLine>,
}

/// Starting state of one fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetSetup {
    /// Fleet id.
    pub id: FleetId,
    /// Owner.
    pub owner: PlayerId,
    /// Display name.
    pub name: String,
    /// Galaxy position.
    pub position: (i32, i32),
    /// Items aboard.
    #[serde(default)]
    pub inventory: Vec<ItemLine>,
}

/// Name lookup over a catalog.
struct Names {
    buildings: BTreeMap<String, BuildingTypeId>,
    items: BTreeMap<String, ItemTypeId>,
}

impl Names {
    fn new(catalog: &Catalog) -> Self {
        Self {
            buildings: catalog.buildings().map(|b| (b.name.clone(), b.id)).collect(),
            items: catalog.items().map(|i| (i.name.clone(), i.id)).collect(),
        }
    }

    fn building(&self, name: &str) -> Result<BuildingTypeId, ScenarioError> {
        self.buildings.get(name).copied().ok_or_else(|| ScenarioError::UnknownName {
            kind: "building",
            name: name.to_string(),
        })
    }

    fn item(&self, name: &str) -> Result<ItemTypeId, ScenarioError> {
        self.items.get(name).copied().ok_or_else(|| ScenarioError::UnknownName {
            kind: "item",
            name: name.to_string(),
        })
    }

    fn lines(&self, lines: &[ItemLine], default_owner: Option<PlayerId>) -> Result<Vec<InventoryItem>, ScenarioError> {
        lines
            .iter()
            .map(|line| {
                let owner = line.owner.or(default_owner).ok_or_else(|| {
                    ScenarioError::Invalid(format!("'{}' has no owner", line.item))
                })?;
                Ok(InventoryItem::new(self.item(&line.item)?, owner, line.count))
            })
            .collect()
    }
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// The built-in skirmish.
    pub fn skirmish() -> Result<Self, ScenarioError> {
        Self::from_ron_str(SKIRMISH_RON)
    }

    /// Build the live world this scenario describes.
    pub fn build_world(&self) -> Result<World, ScenarioError> {
        let catalog = Arc::new(Catalog::new(self.balance.clone())?);
        let names = Names::new(&catalog);
        let mut world = World::new(Arc::clone(&catalog));

        for setup in &self.players {
            let mut player = Player::new(setup.id, setup.name.clone());
            player.money = setup.money;
            player.ai_controlled = setup.ai_controlled;
            player.behavior = setup.behavior;
            player.attack_mode = setup.attack_mode;
            player.traits = setup.traits.clone();
            player.researched_buildings = match &setup.researched {
                None => catalog.buildings().map(|b| b.id).collect(),
                Some(list) => list.iter().map(|n| names.building(n)).collect::<Result<_, _>>()?,
            };
            player.stock = names.lines(&setup.stock, Some(setup.id))?;
            world.add_player(player);
        }

        for setup in &self.planets {
            if let Some(owner) = setup.owner {
                world.require_player(owner)?;
            }
            let grid = SurfaceGrid::new(setup.size.0, setup.size.1).with_blocked(&setup.blocked);
            let position = GalaxyPos::from_ints(setup.position.0, setup.position.1);
            let mut planet = Planet::new(setup.id, setup.name.clone(), position, setup.surface, grid);
            planet.owner = setup.owner;
            planet.population = setup.population;
            planet.morale = setup.morale;
            planet.tax = setup.tax;
            for placement in &setup.buildings {
                let def = catalog.require_building(names.building(&placement.kind)?)?;
                let id = world.next_building_id();
                planet.add_building(id, def, placement.at)?;
            }
            planet.inventory = names.lines(&setup.inventory, setup.owner)?;
            world.add_planet(planet);
        }

        for setup in &self.fleets {
            world.require_player(setup.owner)?;
            let position = GalaxyPos::from_ints(setup.position.0, setup.position.1);
            let mut fleet = Fleet::new(setup.id, setup.owner, setup.name.clone(), position);
            fleet.inventory = names.lines(&setup.inventory, Some(setup.owner))?;
            world.add_fleet(fleet);
        }

        for setup in &self.players {
            world.refresh_radar(setup.id);
        }

        tracing::info!(
            scenario = %self.name,
            players = self.players.len(),
            planets = self.planets.len(),
            fleets = self.fleets.len(),
            "Scenario world built"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skirmish_parses() {
        let scenario = Scenario::skirmish().expect("built-in scenario parses");
        assert_eq!(scenario.players.len(), 2);
        assert_eq!(scenario.turns, 12);
        assert_eq!(scenario.balance.planning.attack_margin, 1.4);
        // Unset thresholds keep their defaults.
        assert_eq!(scenario.balance.planning.low_morale, 40);
    }

    #[test]
    fn test_skirmish_world() {
        let world = Scenario::skirmish().expect("parses").build_world().expect("builds");
        assert_eq!(world.players().count(), 2);
        assert_eq!(world.planets().count(), 3);

        let oculum = world.player(PlayerId(2)).expect("player");
        assert_eq!(oculum.researched_buildings.len(), 3);
        assert_eq!(world.player(PlayerId(1)).expect("player").researched_buildings.len(), 7);

        let home = world.planet(PlanetId(2)).expect("planet");
        assert_eq!(home.buildings.len(), 3);
        assert!(home.inventory.iter().all(|line| line.owner == PlayerId(2)));
        assert!(world.planet(PlanetId(3)).expect("planet").owner.is_none());
    }

    #[test]
    fn test_unknown_names_are_reported() {
        let mut scenario = Scenario::skirmish().expect("parses");
        scenario.fleets[0].inventory[0].item = "dreadnought".into();
        match scenario.build_world() {
            Err(ScenarioError::UnknownName { kind, name }) => {
                assert_eq!(kind, "item");
                assert_eq!(name, "dreadnought");
            }
            other => panic!("expected unknown item, got {other:?}"),
        }
    }

    #[test]
    fn test_ownerless_lines_rejected() {
        let mut scenario = Scenario::skirmish().expect("parses");
        scenario.planets[2].inventory.push(ItemLine {
            item: "mine".into(),
            count: 1,
            owner: None,
        });
        assert!(matches!(scenario.build_world(), Err(ScenarioError::Invalid(_))));
    }

    #[test]
    fn test_overlapping_buildings_fail() {
        let mut scenario = Scenario::skirmish().expect("parses");
        scenario.planets[0].buildings.push(BuildingPlacement {
            kind: "factory".into(),
            at: (0, 0),
        });
        assert!(matches!(scenario.build_world(), Err(ScenarioError::Game(_))));
    }

    #[test]
    fn test_parse_error_is_typed() {
        assert!(matches!(
            Scenario::from_ron_str("Scenario(name: )"),
            Err(ScenarioError::ParseError(_))
        ));
    }
}
