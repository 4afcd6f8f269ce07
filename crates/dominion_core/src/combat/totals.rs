//! Additive attack/defence aggregates.

use std::ops::{Add, AddAssign};

use crate::data::{Catalog, ItemCategory, ItemData};
use crate::ids::BuildingTypeId;
use crate::snapshot::InventoryLineItem;

/// Summed combat strength of a group of units and structures.
///
/// Every field is a saturating sum, so [`Add`] is associative and
/// commutative and fleets, planets and whole empires fold with the same
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttackDefenseTotals {
    /// Damage per volley.
    pub attack: u64,
    /// Hull plus shield points.
    pub defense: u64,
    /// One-time damage (mines, bombs).
    pub burst: u64,
    /// Sum of ECM levels.
    pub ecm_sum: u64,
    /// Units carrying ECM.
    pub ecm_count: u64,
    /// Sum of anti-ECM levels over weapons.
    pub anti_ecm_sum: u64,
    /// Weapons carrying anti-ECM.
    pub anti_ecm_count: u64,
    /// Defensive structures.
    pub structures: u64,
}

impl AttackDefenseTotals {
    /// Totals of `count` items of one type.
    #[must_use]
    pub fn for_item(def: &ItemData, count: u32) -> Self {
        if def.category == ItemCategory::Satellite {
            return Self::default();
        }
        let n = u64::from(count);
        let volley: u64 = def.weapons.iter().map(|w| u64::from(w.damage)).sum();
        let anti_ecm: u64 = def.weapons.iter().map(|w| u64::from(w.anti_ecm)).sum();
        let anti_ecm_weapons = def.weapons.iter().filter(|w| w.anti_ecm > 0).count() as u64;
        Self {
            attack: volley.saturating_mul(n),
            defense: (u64::from(def.hit_points) + u64::from(def.shield)).saturating_mul(n),
            burst: u64::from(def.burst_damage) * n,
            ecm_sum: u64::from(def.ecm) * n,
            ecm_count: if def.ecm > 0 { n } else { 0 },
            anti_ecm_sum: anti_ecm.saturating_mul(n),
            anti_ecm_count: anti_ecm_weapons.saturating_mul(n),
            structures: 0,
        }
    }

    /// Totals of inventory lines; unknown item types count for nothing.
    #[must_use]
    pub fn for_lines(lines: &[InventoryLineItem], catalog: &Catalog) -> Self {
        Self::fold(
            lines
                .iter()
                .filter_map(|l| catalog.item(l.type_id).map(|def| Self::for_item(def, l.count))),
        )
    }

    /// Totals of the defensive buildings among `types`.
    #[must_use]
    pub fn for_buildings(types: impl IntoIterator<Item = BuildingTypeId>, catalog: &Catalog) -> Self {
        Self::fold(
            types
                .into_iter()
                .filter_map(|id| catalog.building(id))
                .filter(|def| def.is_defensive())
                .map(|def| {
                    let anti_ecm = def.weapon.map_or(0, |w| u64::from(w.anti_ecm));
                    Self {
                        attack: def.weapon.map_or(0, |w| u64::from(w.damage)),
                        defense: u64::from(def.hit_points) + u64::from(def.shield),
                        anti_ecm_sum: anti_ecm,
                        anti_ecm_count: u64::from(anti_ecm > 0),
                        structures: 1,
                        ..Self::default()
                    }
                }),
        )
    }

    /// Sum of any number of totals.
    #[must_use]
    pub fn fold(parts: impl IntoIterator<Item = Self>) -> Self {
        parts.into_iter().fold(Self::default(), Add::add)
    }

    /// Single strength figure used to compare sides.
    #[must_use]
    pub fn power(&self) -> u64 {
        self.attack
            .saturating_add(self.defense)
            .saturating_add(self.burst)
    }

    /// Mean ECM level over units that carry ECM.
    #[must_use]
    pub fn average_ecm(&self) -> f64 {
        if self.ecm_count == 0 {
            0.0
        } else {
            self.ecm_sum as f64 / self.ecm_count as f64
        }
    }
}

impl Add for AttackDefenseTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            attack: self.attack.saturating_add(rhs.attack),
            defense: self.defense.saturating_add(rhs.defense),
            burst: self.burst.saturating_add(rhs.burst),
            ecm_sum: self.ecm_sum.saturating_add(rhs.ecm_sum),
            ecm_count: self.ecm_count.saturating_add(rhs.ecm_count),
            anti_ecm_sum: self.anti_ecm_sum.saturating_add(rhs.anti_ecm_sum),
            anti_ecm_count: self.anti_ecm_count.saturating_add(rhs.anti_ecm_count),
            structures: self.structures.saturating_add(rhs.structures),
        }
    }
}

impl AddAssign for AttackDefenseTotals {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
