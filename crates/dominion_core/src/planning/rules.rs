//! Concrete planning rules.
//!
//! Economy rules run once per own planet, military rules once per own
//! fleet. Every rule returns [`PlanningOutcome::Continue`] when its trigger
//! does not hold, so the next rule gets a chance.

use std::cmp::Reverse;

use super::{Action, AttackMode, PlanningContext, PlanningOutcome, PlanningRule};
use crate::data::{BuildingData, BuildingKind};
use crate::math::Fixed;
use crate::snapshot::{FleetView, PlanetView};
use crate::world::TaxLevel;

/// Pick the best researched building of `kind` and try to place it.
///
/// Candidates are ranked by `score` (highest first, then by id). The first
/// candidate the planet's limits allow is placed; NO_AVAIL, NO_ROOM and
/// NO_MONEY report why nothing could be.
fn plan_build(
    ctx: &mut PlanningContext<'_>,
    planet: &PlanetView,
    kind: BuildingKind,
    score: impl Fn(&BuildingData) -> i64,
) -> PlanningOutcome {
    let view = ctx.view();
    let mut candidates: Vec<&BuildingData> = view
        .catalog()
        .buildings_of_kind(kind)
        .filter(|def| view.researched_buildings.contains(&def.id))
        .collect();
    candidates.sort_by_key(|def| Reverse(score(def)));

    let Some(def) = candidates.into_iter().find(|def| planet.can_build(def.id)) else {
        return PlanningOutcome::NoAvail;
    };

    let location = if def.footprint.is_some() {
        match planet.find_location(def.id) {
            Some(cell) => cell,
            None => return PlanningOutcome::NoRoom,
        }
    } else {
        (0, 0)
    };

    if !ctx.can_afford(def.cost) {
        return PlanningOutcome::NoMoney;
    }
    ctx.spend(def.cost);
    PlanningOutcome::Success(Action::Build {
        planet: planet.id,
        building_type: def.id,
        location,
    })
}

/// Per-cost score scaled to keep integer precision.
fn per_cost(value: i32, cost: i64) -> i64 {
    i64::from(value) * 1000 / cost.max(1)
}

/// Builds power plants while consumers outstrip producers.
#[derive(Debug, Clone, Copy)]
pub struct PowerDeficitRule {
    min_surplus: i32,
}

impl PowerDeficitRule {
    /// Trigger when the surplus falls below `min_surplus`.
    #[must_use]
    pub const fn new(min_surplus: i32) -> Self {
        Self { min_surplus }
    }
}

impl PlanningRule<PlanetView> for PowerDeficitRule {
    fn name(&self) -> &'static str {
        "power_deficit"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, planet: &mut PlanetView) -> PlanningOutcome {
        if planet.energy_surplus() >= Fixed::from_num(self.min_surplus) {
            return PlanningOutcome::Continue;
        }
        plan_build(ctx, planet, BuildingKind::Power, |def| per_cost(def.energy, def.cost))
    }
}

/// Builds housing when population presses against living space.
#[derive(Debug, Clone, Copy)]
pub struct LivingSpaceRule {
    pressure: f64,
}

impl LivingSpaceRule {
    /// Trigger when `population >= housing * pressure`.
    #[must_use]
    pub const fn new(pressure: f64) -> Self {
        Self { pressure }
    }
}

impl PlanningRule<PlanetView> for LivingSpaceRule {
    fn name(&self) -> &'static str {
        "living_space"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, planet: &mut PlanetView) -> PlanningOutcome {
        if f64::from(planet.population) < f64::from(planet.housing) * self.pressure {
            return PlanningOutcome::Continue;
        }
        plan_build(ctx, planet, BuildingKind::Housing, |def| per_cost(def.housing, def.cost))
    }
}

/// Keeps morale within a band by moving taxes, or builds social buildings
/// when taxes are already gone.
#[derive(Debug, Clone, Copy)]
pub struct MoraleTaxRule {
    low: i32,
    high: i32,
}

impl MoraleTaxRule {
    /// Morale band `[low, high]`.
    #[must_use]
    pub const fn new(low: i32, high: i32) -> Self {
        Self { low, high }
    }
}

impl PlanningRule<PlanetView> for MoraleTaxRule {
    fn name(&self) -> &'static str {
        "morale_tax"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, planet: &mut PlanetView) -> PlanningOutcome {
        if planet.morale < self.low {
            if planet.tax == TaxLevel::None {
                return plan_build(ctx, planet, BuildingKind::Social, |def| per_cost(def.morale, def.cost));
            }
            return PlanningOutcome::Success(Action::SetTax {
                planet: planet.id,
                level: planet.tax.lower(),
            });
        }
        if planet.morale > self.high && planet.tax < TaxLevel::High {
            return PlanningOutcome::Success(Action::SetTax {
                planet: planet.id,
                level: planet.tax.higher(),
            });
        }
        PlanningOutcome::Continue
    }
}

/// Builds factories up to a per-planet target.
#[derive(Debug, Clone, Copy)]
pub struct FactoryRule {
    per_planet: u32,
}

impl FactoryRule {
    /// Aim for `per_planet` factories.
    #[must_use]
    pub const fn new(per_planet: u32) -> Self {
        Self { per_planet }
    }
}

impl PlanningRule<PlanetView> for FactoryRule {
    fn name(&self) -> &'static str {
        "factory"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, planet: &mut PlanetView) -> PlanningOutcome {
        if planet.count_of_kind(BuildingKind::Factory) >= self.per_planet {
            return PlanningOutcome::Continue;
        }
        // Cheapest first.
        plan_build(ctx, planet, BuildingKind::Factory, |def| -def.cost)
    }
}

/// Moves stations, ground units and mines from stock onto planets.
#[derive(Debug, Clone, Copy)]
pub struct DeployDefenseRule {
    default_cap: u32,
}

impl DeployDefenseRule {
    /// Cap for items without their own `max_per_planet`.
    #[must_use]
    pub const fn new(default_cap: u32) -> Self {
        Self { default_cap }
    }
}

impl PlanningRule<PlanetView> for DeployDefenseRule {
    fn name(&self) -> &'static str {
        "deploy_defense"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, planet: &mut PlanetView) -> PlanningOutcome {
        let player = ctx.view().player;
        let catalog = ctx.view().catalog();

        let candidate = ctx.stock().iter().find_map(|line| {
            if line.owner != player {
                return None;
            }
            let def = catalog.item(line.type_id)?;
            if !def.category.is_planet_defense() {
                return None;
            }
            let cap = def.max_per_planet.unwrap_or(self.default_cap);
            let room = cap.saturating_sub(planet.inventory_count(line.type_id, Some(player)));
            let count = room.min(line.count);
            (count > 0).then_some((line.type_id, count))
        });

        let Some((item, count)) = candidate else {
            return PlanningOutcome::Continue;
        };
        ctx.take_stock(item, count);
        planet.add_inventory_count(item, player, i64::from(count));
        PlanningOutcome::Success(Action::Deploy {
            planet: planet.id,
            item,
            count,
        })
    }
}

/// Sends a fleet against the best visible enemy planet it can beat.
#[derive(Debug, Clone, Copy)]
pub struct AttackRule {
    mode: AttackMode,
    margin: f64,
}

impl AttackRule {
    /// Attack with `mode` when fleet power is at least `margin` times the
    /// target's.
    #[must_use]
    pub const fn new(mode: AttackMode, margin: f64) -> Self {
        Self { mode, margin }
    }
}

impl PlanningRule<FleetView> for AttackRule {
    fn name(&self) -> &'static str {
        "attack"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, fleet: &mut FleetView) -> PlanningOutcome {
        if fleet.strength.attack == 0 {
            return PlanningOutcome::Continue;
        }
        let power = fleet.strength.power() as f64;
        let view = ctx.view();

        let target = view
            .visible_planets
            .iter()
            .filter(|p| p.owner.is_some_and(|o| o != fleet.owner))
            .filter(|p| !ctx.is_claimed(p.id))
            .filter(|p| power >= p.defense.power() as f64 * self.margin)
            .max_by_key(|p| {
                let value = match self.mode {
                    AttackMode::Capture => i64::from(p.population),
                    AttackMode::Cripple => i64::from(p.count_of_kind(BuildingKind::Factory)),
                };
                // Prefer value, then the nearer planet, then the lower id.
                (value, Reverse(fleet.distance(p.position)), Reverse(p.id))
            });

        let Some(target) = target else {
            return PlanningOutcome::Continue;
        };
        ctx.claim(target.id);
        PlanningOutcome::Success(Action::Attack {
            fleet: fleet.id,
            planet: target.id,
        })
    }
}

/// Pulls stray fleets back to the nearest own planet.
#[derive(Debug, Clone, Copy)]
pub struct RegroupRule {
    distance: i32,
}

impl RegroupRule {
    /// Regroup when farther than `distance` from every own planet.
    #[must_use]
    pub const fn new(distance: i32) -> Self {
        Self { distance }
    }
}

impl PlanningRule<FleetView> for RegroupRule {
    fn name(&self) -> &'static str {
        "regroup"
    }

    fn evaluate(&self, ctx: &mut PlanningContext<'_>, fleet: &mut FleetView) -> PlanningOutcome {
        let Some(home) = ctx
            .view()
            .planets
            .iter()
            .min_by_key(|p| (fleet.distance(p.position), p.id))
        else {
            return PlanningOutcome::NoAvail;
        };
        if fleet.distance(home.position) <= Fixed::from_num(self.distance) {
            return PlanningOutcome::Continue;
        }
        PlanningOutcome::Success(Action::MoveFleet {
            fleet: fleet.id,
            planet: home.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data::{BalanceData, Catalog, FrameLayout, ItemCategory, ItemData, WeaponData, WeaponKind};
    use crate::ids::{BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
    use crate::math::GalaxyPos;
    use crate::snapshot::{WorldSnapshotBuilder, WorldView};
    use crate::surface::{Footprint, SurfaceGrid, SurfaceKind};
    use crate::world::{Fleet, InventoryItem, Planet, Player, World};

    const ME: PlayerId = PlayerId(1);
    const RIVAL: PlayerId = PlayerId(2);
    const PLANT: BuildingTypeId = BuildingTypeId(1);
    const BIG_PLANT: BuildingTypeId = BuildingTypeId(2);
    const FACTORY: BuildingTypeId = BuildingTypeId(3);
    const PARK: BuildingTypeId = BuildingTypeId(5);
    const STATION: ItemTypeId = ItemTypeId(10);
    const FRIGATE: ItemTypeId = ItemTypeId(11);

    fn building(id: BuildingTypeId, kind: BuildingKind, size: u32, cost: i64, energy: i32) -> BuildingData {
        BuildingData {
            id,
            name: format!("b{}", id.0),
            kind,
            footprint: Some(Footprint::new(size, size)),
            cost,
            energy,
            workers: 5,
            hit_points: 100,
            limit: None,
            surfaces: Vec::new(),
            housing: 0,
            morale: 0,
            radar_range: 0,
            weapon: None,
            shield: 0,
            frames: FrameLayout::default(),
        }
    }

    fn item(id: ItemTypeId, category: ItemCategory) -> ItemData {
        ItemData {
            id,
            name: format!("i{}", id.0),
            category,
            cost: 50,
            hit_points: 100,
            shield: 0,
            speed: 3.0,
            rotation_speed: 0.5,
            ecm: 0,
            weapons: vec![WeaponData {
                kind: WeaponKind::Beam,
                damage: 20,
                range: 100.0,
                delay: 5,
                projectile_speed: 10.0,
                anti_ecm: 0,
            }],
            burst_damage: 0,
            max_per_planet: None,
            frames: FrameLayout::default(),
        }
    }

    fn catalog() -> Arc<Catalog> {
        let mut habitat = building(BuildingTypeId(4), BuildingKind::Housing, 1, 50, 0);
        habitat.housing = 100;
        let mut park = building(PARK, BuildingKind::Social, 1, 80, 0);
        park.morale = 10;
        let mut station = item(STATION, ItemCategory::Station);
        station.max_per_planet = Some(2);
        Arc::new(
            Catalog::new(BalanceData {
                buildings: vec![
                    building(PLANT, BuildingKind::Power, 2, 100, 50),
                    building(BIG_PLANT, BuildingKind::Power, 3, 150, 150),
                    building(FACTORY, BuildingKind::Factory, 1, 200, -30),
                    habitat,
                    park,
                ],
                items: vec![station, item(FRIGATE, ItemCategory::Ship)],
                ..BalanceData::default()
            })
            .expect("catalog"),
        )
    }

    /// Home planet with one power-hungry factory, two rival planets in
    /// radar range of a frigate fleet.
    fn world(money: i64, grid: u32) -> World {
        let catalog = catalog();
        let mut world = World::new(Arc::clone(&catalog));
        let mut me = Player::new(ME, "Garthog");
        me.money = money;
        me.ai_controlled = true;
        me.researched_buildings = catalog.buildings().map(|b| b.id).collect();
        me.stock.push(InventoryItem::new(STATION, ME, 5));
        world.add_player(me);
        world.add_player(Player::new(RIVAL, "Oculum"));

        let mut home = Planet::new(PlanetId(1), "Home", GalaxyPos::ZERO, SurfaceKind::Earth, SurfaceGrid::new(grid, grid));
        home.owner = Some(ME);
        home.population = 50;
        let id = world.next_building_id();
        home.add_building(id, catalog.require_building(FACTORY).expect("factory"), (0, 0))
            .expect("fits");
        world.add_planet(home);

        let mut rich = Planet::new(PlanetId(2), "Rich", GalaxyPos::from_ints(100, 100), SurfaceKind::Earth, SurfaceGrid::new(4, 4));
        rich.owner = Some(RIVAL);
        rich.population = 500;
        world.add_planet(rich);

        let mut industrial =
            Planet::new(PlanetId(3), "Forge", GalaxyPos::from_ints(100, 110), SurfaceKind::Earth, SurfaceGrid::new(4, 4));
        industrial.owner = Some(RIVAL);
        industrial.population = 10;
        let id = world.next_building_id();
        industrial
            .add_building(id, catalog.require_building(FACTORY).expect("factory"), (1, 1))
            .expect("fits");
        world.add_planet(industrial);

        let mut fleet = Fleet::new(FleetId(1), ME, "Raiders", GalaxyPos::from_ints(100, 100));
        fleet.inventory.push(InventoryItem::new(FRIGATE, ME, 2));
        world.add_fleet(fleet);
        world.refresh_radar(ME);
        world
    }

    fn view(world: &World) -> WorldView {
        WorldSnapshotBuilder::new(world).build(ME).expect("view")
    }

    #[test]
    fn test_power_deficit_builds_best_plant() {
        let view = view(&world(1000, 8));
        let mut planet = view.planets[0].clone();
        assert!(planet.energy_surplus() < Fixed::ZERO);
        let mut ctx = PlanningContext::new(&view);

        let outcome = PowerDeficitRule::new(0).evaluate(&mut ctx, &mut planet);
        let Some(Action::Build { building_type, location, .. }) = outcome.action() else {
            panic!("expected a build, got {outcome:?}");
        };
        assert_eq!(building_type, BIG_PLANT);
        assert!(planet.surface.in_bounds(location.0 + 2, location.1 + 2));
        assert_eq!(ctx.budget(), 850);
    }

    #[test]
    fn test_power_rule_continues_with_surplus() {
        let view = view(&world(1000, 8));
        let mut planet = view.planets[0].clone();
        planet.energy_production = Fixed::from_num(40);
        let mut ctx = PlanningContext::new(&view);
        assert_eq!(PowerDeficitRule::new(0).evaluate(&mut ctx, &mut planet), PlanningOutcome::Continue);
        assert_eq!(ctx.budget(), 1000);
    }

    #[test]
    fn test_build_failures_are_reported() {
        let poor = view(&world(100, 8));
        let mut planet = poor.planets[0].clone();
        let mut ctx = PlanningContext::new(&poor);
        assert_eq!(PowerDeficitRule::new(0).evaluate(&mut ctx, &mut planet), PlanningOutcome::NoMoney);

        let cramped = view(&world(1000, 2));
        let mut planet = cramped.planets[0].clone();
        let mut ctx = PlanningContext::new(&cramped);
        assert_eq!(PowerDeficitRule::new(0).evaluate(&mut ctx, &mut planet), PlanningOutcome::NoRoom);

        let mut unresearched = view(&world(1000, 8));
        unresearched.researched_buildings.clear();
        let mut planet = unresearched.planets[0].clone();
        let mut ctx = PlanningContext::new(&unresearched);
        assert_eq!(PowerDeficitRule::new(0).evaluate(&mut ctx, &mut planet), PlanningOutcome::NoAvail);
    }

    #[test]
    fn test_morale_moves_taxes() {
        let view = view(&world(1000, 8));
        let mut ctx = PlanningContext::new(&view);
        let rule = MoraleTaxRule::new(40, 75);

        let mut planet = view.planets[0].clone();
        planet.morale = 20;
        assert_eq!(
            rule.evaluate(&mut ctx, &mut planet),
            PlanningOutcome::Success(Action::SetTax {
                planet: planet.id,
                level: TaxLevel::Low
            })
        );

        planet.morale = 90;
        assert_eq!(
            rule.evaluate(&mut ctx, &mut planet).action(),
            Some(Action::SetTax {
                planet: planet.id,
                level: TaxLevel::High
            })
        );

        planet.morale = 60;
        assert_eq!(rule.evaluate(&mut ctx, &mut planet), PlanningOutcome::Continue);
    }

    #[test]
    fn test_untaxed_unhappy_planet_gets_social_building() {
        let view = view(&world(1000, 8));
        let mut ctx = PlanningContext::new(&view);
        let mut planet = view.planets[0].clone();
        planet.morale = 10;
        planet.tax = TaxLevel::None;
        let outcome = MoraleTaxRule::new(40, 75).evaluate(&mut ctx, &mut planet);
        assert!(matches!(
            outcome,
            PlanningOutcome::Success(Action::Build { building_type: PARK, .. })
        ));
    }

    #[test]
    fn test_factory_rule_stops_at_target() {
        let view = view(&world(1000, 8));
        let mut ctx = PlanningContext::new(&view);
        let mut planet = view.planets[0].clone();
        assert_eq!(FactoryRule::new(1).evaluate(&mut ctx, &mut planet), PlanningOutcome::Continue);
        assert!(matches!(
            FactoryRule::new(2).evaluate(&mut ctx, &mut planet),
            PlanningOutcome::Success(Action::Build { building_type: FACTORY, .. })
        ));
    }

    #[test]
    fn test_deploy_respects_planet_cap() {
        let view = view(&world(1000, 8));
        let mut ctx = PlanningContext::new(&view);
        let mut planet = view.planets[0].clone();
        let rule = DeployDefenseRule::new(4);

        assert_eq!(
            rule.evaluate(&mut ctx, &mut planet),
            PlanningOutcome::Success(Action::Deploy {
                planet: planet.id,
                item: STATION,
                count: 2
            })
        );
        assert_eq!(ctx.stock_count(STATION), 3);
        assert_eq!(planet.inventory_count(STATION, Some(ME)), 2);
        assert_eq!(rule.evaluate(&mut ctx, &mut planet), PlanningOutcome::Continue);
        // The snapshot copy is untouched.
        assert_eq!(view.planets[0].inventory_count(STATION, None), 0);
    }

    #[test]
    fn test_attack_mode_picks_target() {
        let view = view(&world(1000, 8));
        assert_eq!(view.visible_planets.len(), 2);
        let mut fleet = view.fleets[0].clone();

        let mut ctx = PlanningContext::new(&view);
        assert_eq!(
            AttackRule::new(AttackMode::Capture, 1.5).evaluate(&mut ctx, &mut fleet),
            PlanningOutcome::Success(Action::Attack {
                fleet: fleet.id,
                planet: PlanetId(2)
            })
        );

        let mut ctx = PlanningContext::new(&view);
        assert_eq!(
            AttackRule::new(AttackMode::Cripple, 1.5).evaluate(&mut ctx, &mut fleet).action(),
            Some(Action::Attack {
                fleet: fleet.id,
                planet: PlanetId(3)
            })
        );
    }

    #[test]
    fn test_claimed_targets_are_skipped() {
        let view = view(&world(1000, 8));
        let mut fleet = view.fleets[0].clone();
        let mut ctx = PlanningContext::new(&view);
        let rule = AttackRule::new(AttackMode::Capture, 1.5);
        assert!(rule.evaluate(&mut ctx, &mut fleet).is_terminal());
        assert_eq!(
            rule.evaluate(&mut ctx, &mut fleet).action(),
            Some(Action::Attack {
                fleet: fleet.id,
                planet: PlanetId(3)
            })
        );
        assert_eq!(rule.evaluate(&mut ctx, &mut fleet), PlanningOutcome::Continue);
    }

    #[test]
    fn test_regroup_returns_stray_fleet() {
        let view = view(&world(1000, 8));
        let mut fleet = view.fleets[0].clone();
        let mut ctx = PlanningContext::new(&view);
        let rule = RegroupRule::new(50);
        assert_eq!(
            rule.evaluate(&mut ctx, &mut fleet),
            PlanningOutcome::Success(Action::MoveFleet {
                fleet: fleet.id,
                planet: PlanetId(1)
            })
        );

        fleet.position = GalaxyPos::from_ints(10, 0);
        assert_eq!(rule.evaluate(&mut ctx, &mut fleet), PlanningOutcome::Continue);
    }
}
