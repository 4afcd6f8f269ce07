//! Research item definitions: ships, stations, ground units and mines.

use serde::{Deserialize, Serialize};

use crate::ids::ItemTypeId;

/// Category of a research item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ItemCategory {
    /// Space-going warship; lives in fleet inventories.
    Ship,
    /// Orbital station; deployed into planet inventories.
    Station,
    /// Tank or other vehicle for ground battles.
    GroundUnit,
    /// Ground mine; detonates under the first enemy to enter its cell.
    Mine,
    /// Surveillance satellite; no combat value.
    Satellite,
}

impl ItemCategory {
    /// Categories that fight in space battles.
    #[must_use]
    pub const fn fights_in_space(self) -> bool {
        matches!(self, Self::Ship | Self::Station)
    }

    /// Categories the planning layer deploys to planets for defence.
    #[must_use]
    pub const fn is_planet_defense(self) -> bool {
        matches!(self, Self::Station | Self::GroundUnit | Self::Mine)
    }
}

/// How a weapon delivers its damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeaponKind {
    /// Straight-flying bolt; ignores ECM.
    #[default]
    Beam,
    /// Homing rocket; can be diverted by the target's ECM.
    Rocket,
}

/// One weapon mount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponData {
    /// Delivery kind.
    #[serde(default)]
    pub kind: WeaponKind,
    /// Base damage per shot.
    pub damage: u32,
    /// Maximum reach in battle units.
    pub range: f64,
    /// Ticks between shots.
    pub delay: u32,
    /// Projectile speed per tick (space only).
    #[serde(default = "default_projectile_speed")]
    pub projectile_speed: f64,
    /// Anti-ECM level of the projectile.
    #[serde(default)]
    pub anti_ecm: u32,
}

const fn default_projectile_speed() -> f64 {
    12.0
}

/// Sprite layout of a battle object: frame size and rotation matrix shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Frame width in battle units.
    pub width: f64,
    /// Frame height in battle units.
    pub height: f64,
    /// Number of discrete rotation angles (multiple of four).
    #[serde(default = "default_angles")]
    pub angles: u32,
    /// Number of animation phases.
    #[serde(default = "default_phases")]
    pub phases: u32,
}

const fn default_angles() -> u32 {
    16
}

const fn default_phases() -> u32 {
    1
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            width: 20.0,
            height: 20.0,
            angles: default_angles(),
            phases: default_phases(),
        }
    }
}

/// Data-driven research item definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemData {
    /// Unique identifier.
    pub id: ItemTypeId,
    /// Display key.
    pub name: String,
    /// Category.
    pub category: ItemCategory,
    /// Production cost.
    pub cost: i64,
    /// Hull points.
    pub hit_points: u32,
    /// Shield points, absorbed before hull.
    #[serde(default)]
    pub shield: u32,
    /// Movement per tick.
    #[serde(default)]
    pub speed: f64,
    /// Radians turned per tick.
    #[serde(default = "default_rotation_speed")]
    pub rotation_speed: f64,
    /// ECM level.
    #[serde(default)]
    pub ecm: u32,
    /// Weapon mounts.
    #[serde(default)]
    pub weapons: Vec<WeaponData>,
    /// One-time damage (mine detonation, bombs).
    #[serde(default)]
    pub burst_damage: u32,
    /// Maximum count per planet for deployable items.
    #[serde(default)]
    pub max_per_planet: Option<u32>,
    /// Battle sprite layout.
    #[serde(default)]
    pub frames: FrameLayout,
}

const fn default_rotation_speed() -> f64 {
    0.3
}

impl ItemData {
    /// Whether this item can shoot.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        !self.weapons.is_empty()
    }
}
