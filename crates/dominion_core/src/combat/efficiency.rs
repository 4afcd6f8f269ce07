//! Battle damage multipliers scoped by owner, category and item id.

use std::collections::BTreeMap;

use crate::data::{BattleEfficiencyData, ItemCategory};
use crate::ids::{BuildingTypeId, ItemTypeId, PlayerId};

/// What kind of thing a participant is, for modifier lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticipantType {
    /// A ship, station, ground unit or mine.
    Item(ItemCategory, ItemTypeId),
    /// A planetary building.
    Building(BuildingTypeId),
}

/// Multiplier for one participant type: the first matching entry, else 1.
///
/// Buildings have no item category or id, so only entries scoped purely by
/// owner apply to them.
#[must_use]
pub fn resolve_efficiency(table: &[BattleEfficiencyData], owner: PlayerId, kind: ParticipantType) -> f64 {
    table
        .iter()
        .find(|entry| match kind {
            ParticipantType::Item(category, item) => entry.matches(owner, category, item),
            ParticipantType::Building(_) => {
                entry.category.is_none()
                    && entry.item.is_none()
                    && entry.owner.map_or(true, |o| o == owner)
            }
        })
        .map_or(1.0, |entry| entry.damage_multiplier)
}

/// Per-battle memo so each `(owner, type)` is resolved once.
#[derive(Debug, Clone, Default)]
pub struct EfficiencyCache {
    resolved: BTreeMap<(PlayerId, ParticipantType), f64>,
}

impl EfficiencyCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Multiplier for `(owner, kind)`, resolving against `table` on first use.
    pub fn get(&mut self, table: &[BattleEfficiencyData], owner: PlayerId, kind: ParticipantType) -> f64 {
        *self
            .resolved
            .entry((owner, kind))
            .or_insert_with(|| resolve_efficiency(table, owner, kind))
    }

    /// Number of distinct types resolved so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    /// Whether nothing has been resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(owner: Option<u32>, category: Option<ItemCategory>, item: Option<u32>, m: f64) -> BattleEfficiencyData {
        BattleEfficiencyData {
            owner: owner.map(PlayerId),
            category,
            item: item.map(ItemTypeId),
            damage_multiplier: m,
        }
    }

    #[test]
    fn test_first_match_wins() {
        let table = [
            entry(Some(1), None, Some(7), 2.0),
            entry(None, Some(ItemCategory::Ship), None, 1.5),
        ];
        let ship7 = ParticipantType::Item(ItemCategory::Ship, ItemTypeId(7));
        assert!((resolve_efficiency(&table, PlayerId(1), ship7) - 2.0).abs() < f64::EPSILON);
        assert!((resolve_efficiency(&table, PlayerId(2), ship7) - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_is_one() {
        let table = [entry(None, Some(ItemCategory::Station), None, 0.5)];
        let ship = ParticipantType::Item(ItemCategory::Ship, ItemTypeId(1));
        assert!((resolve_efficiency(&table, PlayerId(1), ship) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_buildings_only_take_owner_entries() {
        let table = [
            entry(None, Some(ItemCategory::Ship), None, 3.0),
            entry(Some(4), None, None, 0.8),
        ];
        let gun = ParticipantType::Building(BuildingTypeId(2));
        assert!((resolve_efficiency(&table, PlayerId(4), gun) - 0.8).abs() < f64::EPSILON);
        assert!((resolve_efficiency(&table, PlayerId(5), gun) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_resolves_once_per_type() {
        let table = [entry(None, None, None, 1.25)];
        let mut cache = EfficiencyCache::new();
        let kind = ParticipantType::Item(ItemCategory::Ship, ItemTypeId(1));
        for _ in 0..5 {
            assert!((cache.get(&table, PlayerId(1), kind) - 1.25).abs() < f64::EPSILON);
        }
        cache.get(&table, PlayerId(2), kind);
        assert_eq!(cache.len(), 2);
    }
}
