//! Building data structures for data-driven building definitions.

use serde::{Deserialize, Serialize};

use super::item_data::{FrameLayout, WeaponData};
use crate::ids::BuildingTypeId;
use crate::surface::{Footprint, SurfaceKind};

/// Functional family of a building; planning rules look buildings up by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    /// Produces energy.
    Power,
    /// Provides living space.
    Housing,
    /// Produces ships and equipment.
    Factory,
    /// Raises morale (stadiums, bars, churches).
    Social,
    /// Extends radar range.
    Radar,
    /// Planetary gun; fights in both space and ground battles.
    Defense,
    /// Planetary shield generator.
    Shield,
    /// Anything else.
    Other,
}

/// Data-driven building definition.
///
/// # Example RON
///
/// ```ron
/// BuildingData(
///     id: (3),
///     name: "fusion_plant",
///     kind: Power,
///     footprint: Some((width: 3, height: 2)),
///     cost: 12000,
///     energy: 300,
///     workers: 40,
///     hit_points: 800,
///     surfaces: [],
/// )
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingData {
    /// Unique identifier for this building type.
    pub id: BuildingTypeId,

    /// Display key.
    pub name: String,

    /// Functional family.
    pub kind: BuildingKind,

    /// Surface footprint; `None` for orbital installations with no cells.
    #[serde(default = "default_footprint")]
    pub footprint: Option<Footprint>,

    /// Money cost to construct.
    pub cost: i64,

    /// Energy balance: positive values produce, negative values consume.
    #[serde(default)]
    pub energy: i32,

    /// Workers needed to run at full efficiency.
    #[serde(default)]
    pub workers: i32,

    /// Maximum hit points.
    pub hit_points: u32,

    /// Maximum number of this type per planet (`None` = unlimited).
    #[serde(default)]
    pub limit: Option<u32>,

    /// Surfaces this building can be placed on (empty = any).
    #[serde(default)]
    pub surfaces: Vec<SurfaceKind>,

    /// Living space provided.
    #[serde(default)]
    pub housing: i32,

    /// Morale bonus while operating.
    #[serde(default)]
    pub morale: i32,

    /// Radar range granted to the planet, in galaxy units.
    #[serde(default)]
    pub radar_range: i32,

    /// Planetary gun, if any.
    #[serde(default)]
    pub weapon: Option<WeaponData>,

    /// Shield points projected over the planet.
    #[serde(default)]
    pub shield: u32,

    /// Battle sprite layout used when this building takes part in a battle.
    #[serde(default)]
    pub frames: FrameLayout,
}

fn default_footprint() -> Option<Footprint> {
    Some(Footprint::default())
}

impl BuildingData {
    /// Whether this building is a net energy producer.
    #[must_use]
    pub const fn produces_energy(&self) -> bool {
        self.energy > 0
    }

    /// Energy consumed at full efficiency (zero for producers).
    #[must_use]
    pub const fn energy_demand(&self) -> i32 {
        if self.energy < 0 {
            -self.energy
        } else {
            0
        }
    }

    /// Whether the building participates in battles.
    #[must_use]
    pub const fn is_defensive(&self) -> bool {
        matches!(self.kind, BuildingKind::Defense | BuildingKind::Shield)
    }

    /// Whether this type fits on a given surface.
    #[must_use]
    pub fn allows_surface(&self, surface: SurfaceKind) -> bool {
        self.surfaces.is_empty() || self.surfaces.contains(&surface)
    }
}
