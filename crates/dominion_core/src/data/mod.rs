//! Balance data: building and item definitions plus battle and planning tables.
//!
//! All structs deserialize from RON. [`Catalog`] indexes a [`BalanceData`]
//! by id and is shared read-only (behind an `Arc`) by the live world,
//! snapshots and battles.

mod building_data;
mod item_data;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use building_data::{BuildingData, BuildingKind};
pub use item_data::{FrameLayout, ItemCategory, ItemData, WeaponData, WeaponKind};

use crate::error::{GameError, Result};
use crate::ids::{BuildingTypeId, ItemTypeId, PlayerId};
use crate::planning::PlanningThresholds;

/// One damage-multiplier entry, scoped by owner, category and/or item id.
///
/// Unset scopes match anything. Entries are checked in order and the first
/// match wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BattleEfficiencyData {
    /// Owner the entry applies to.
    #[serde(default)]
    pub owner: Option<PlayerId>,
    /// Item category the entry applies to.
    #[serde(default)]
    pub category: Option<ItemCategory>,
    /// Specific item type the entry applies to.
    #[serde(default)]
    pub item: Option<ItemTypeId>,
    /// Multiplier applied to every shot fired by a matching participant.
    pub damage_multiplier: f64,
}

impl BattleEfficiencyData {
    /// Whether this entry covers a participant.
    #[must_use]
    pub fn matches(&self, owner: PlayerId, category: ItemCategory, item: ItemTypeId) -> bool {
        self.owner.map_or(true, |o| o == owner)
            && self.category.map_or(true, |c| c == category)
            && self.item.map_or(true, |i| i == item)
    }
}

/// Complete balance configuration as authored in RON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceData {
    /// Building definitions.
    pub buildings: Vec<BuildingData>,
    /// Item definitions.
    pub items: Vec<ItemData>,
    /// Battle damage modifiers.
    #[serde(default)]
    pub battle_efficiency: Vec<BattleEfficiencyData>,
    /// Planning thresholds.
    #[serde(default)]
    pub planning: PlanningThresholds,
}

impl BalanceData {
    /// Parse balance data from a RON string. `label` names the source in errors.
    pub fn from_ron_str(label: &str, ron_text: &str) -> Result<Self> {
        ron::from_str(ron_text).map_err(|e| GameError::DataParseError {
            path: label.to_string(),
            message: e.to_string(),
        })
    }
}

/// Battle sprites need a positive multiple of four angles and at least one phase.
fn check_frames(frames: &FrameLayout, path: &str) -> Result<()> {
    if frames.angles == 0 || frames.angles % 4 != 0 || frames.phases == 0 {
        return Err(GameError::DataParseError {
            path: path.to_string(),
            message: format!(
                "invalid frame layout: {} angles, {} phases",
                frames.angles, frames.phases
            ),
        });
    }
    Ok(())
}

/// Indexed, read-only view over [`BalanceData`].
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    buildings: BTreeMap<BuildingTypeId, BuildingData>,
    items: BTreeMap<ItemTypeId, ItemData>,
    battle_efficiency: Vec<BattleEfficiencyData>,
    planning: PlanningThresholds,
}

impl Catalog {
    /// Index balance data, rejecting duplicate ids.
    pub fn new(data: BalanceData) -> Result<Self> {
        let mut buildings = BTreeMap::new();
        for building in data.buildings {
            let id = building.id;
            check_frames(&building.frames, &format!("buildings/{}", building.name))?;
            if buildings.insert(id, building).is_some() {
                return Err(GameError::DataParseError {
                    path: "buildings".into(),
                    message: format!("duplicate building type {}", id.0),
                });
            }
        }

        let mut items = BTreeMap::new();
        for item in data.items {
            let id = item.id;
            check_frames(&item.frames, &format!("items/{}", item.name))?;
            if items.insert(id, item).is_some() {
                return Err(GameError::DataParseError {
                    path: "items".into(),
                    message: format!("duplicate item type {}", id.0),
                });
            }
        }

        Ok(Self {
            buildings,
            items,
            battle_efficiency: data.battle_efficiency,
            planning: data.planning,
        })
    }

    /// Look up a building definition.
    #[must_use]
    pub fn building(&self, id: BuildingTypeId) -> Option<&BuildingData> {
        self.buildings.get(&id)
    }

    /// Look up a building definition or fail with [`GameError::UnknownBuildingType`].
    pub fn require_building(&self, id: BuildingTypeId) -> Result<&BuildingData> {
        self.building(id)
            .ok_or(GameError::UnknownBuildingType(id.0))
    }

    /// Look up an item definition.
    #[must_use]
    pub fn item(&self, id: ItemTypeId) -> Option<&ItemData> {
        self.items.get(&id)
    }

    /// Look up an item definition or fail with [`GameError::UnknownItemType`].
    pub fn require_item(&self, id: ItemTypeId) -> Result<&ItemData> {
        self.item(id).ok_or(GameError::UnknownItemType(id.0))
    }

    /// All building definitions in id order.
    pub fn buildings(&self) -> impl Iterator<Item = &BuildingData> {
        self.buildings.values()
    }

    /// Building definitions of one kind, in id order.
    pub fn buildings_of_kind(&self, kind: BuildingKind) -> impl Iterator<Item = &BuildingData> {
        self.buildings.values().filter(move |b| b.kind == kind)
    }

    /// All item definitions in id order.
    pub fn items(&self) -> impl Iterator<Item = &ItemData> {
        self.items.values()
    }

    /// Battle damage modifier table.
    #[must_use]
    pub fn battle_efficiency(&self) -> &[BattleEfficiencyData] {
        &self.battle_efficiency
    }

    /// Planning thresholds.
    #[must_use]
    pub fn planning(&self) -> &PlanningThresholds {
        &self.planning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
BalanceData(
    buildings: [
        BuildingData(
            id: (1),
            name: "solar_plant",
            kind: Power,
            footprint: Some((width: 2, height: 2)),
            cost: 4000,
            energy: 100,
            workers: 10,
            hit_points: 400,
        ),
    ],
    items: [
        ItemData(
            id: (10),
            name: "fighter",
            category: Ship,
            cost: 300,
            hit_points: 60,
            speed: 4.0,
            weapons: [(damage: 8, range: 120.0, delay: 5)],
        ),
    ],
    battle_efficiency: [(category: Some(Ship), damage_multiplier: 1.5)],
)
"#;

    #[test]
    fn test_parse_sample_balance() {
        let data = BalanceData::from_ron_str("sample", SAMPLE).expect("sample parses");
        let catalog = Catalog::new(data).expect("unique ids");

        let plant = catalog.building(BuildingTypeId(1)).expect("plant");
        assert!(plant.produces_energy());
        assert_eq!(plant.energy_demand(), 0);
        assert_eq!(plant.footprint.map(|f| f.width), Some(2));

        let fighter = catalog.require_item(ItemTypeId(10)).expect("fighter");
        assert!(fighter.is_armed());
        assert_eq!(fighter.frames.angles, 16);
        assert_eq!(catalog.battle_efficiency().len(), 1);
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = BalanceData::from_ron_str("broken", "BalanceData(").unwrap_err();
        assert!(matches!(err, GameError::DataParseError { ref path, .. } if path == "broken"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut data = BalanceData::from_ron_str("sample", SAMPLE).expect("sample parses");
        let dup = data.buildings[0].clone();
        data.buildings.push(dup);
        assert!(Catalog::new(data).is_err());
    }

    #[test]
    fn test_bad_frame_layout_rejected() {
        let mut data = BalanceData::from_ron_str("sample", SAMPLE).expect("sample parses");
        data.items[0].frames.angles = 6;
        assert!(matches!(
            Catalog::new(data),
            Err(GameError::DataParseError { ref path, .. }) if path == "items/fighter"
        ));
    }

    #[test]
    fn test_efficiency_scope_matching() {
        let entry = BattleEfficiencyData {
            owner: Some(PlayerId(2)),
            category: None,
            item: None,
            damage_multiplier: 2.0,
        };
        assert!(entry.matches(PlayerId(2), ItemCategory::Station, ItemTypeId(4)));
        assert!(!entry.matches(PlayerId(1), ItemCategory::Station, ItemTypeId(4)));
    }
}
