//! Strategy enumerations and the rule subsets they switch on.

use serde::{Deserialize, Serialize};

use super::rules::{
    AttackRule, DeployDefenseRule, FactoryRule, LivingSpaceRule, MoraleTaxRule, PowerDeficitRule,
    RegroupRule,
};
use super::{EmpirePlanner, PlanningPipeline};
use crate::snapshot::{FleetView, PlanetView};

/// What an attack is meant to achieve.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum AttackMode {
    /// Take populous planets.
    #[default]
    Capture,
    /// Hit the enemy's production.
    Cripple,
}

/// Overall temperament of a computer empire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum BehaviorMode {
    /// Does nothing.
    Inert,
    /// Raids production, neglects its own population.
    Pirate,
    /// Grows its economy, never attacks.
    Trader,
    /// Full economy plus cautious attacks.
    #[default]
    Balanced,
    /// Full economy plus reckless attacks.
    Hybrid,
}

/// Tunable thresholds for planning rules.
///
/// # Example RON
///
/// ```ron
/// PlanningThresholds(
///     housing_pressure: 0.9,
///     low_morale: 40,
///     attack_margin: 1.5,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningThresholds {
    /// Energy surplus below which power plants are built.
    pub min_energy_surplus: i32,
    /// Population / housing ratio at which new housing is built.
    pub housing_pressure: f64,
    /// Morale below which taxes are cut.
    pub low_morale: i32,
    /// Morale above which taxes are raised.
    pub high_morale: i32,
    /// Factories wanted on each planet.
    pub factories_per_planet: u32,
    /// Default cap on deployed defence items of one type per planet.
    pub defense_per_planet: u32,
    /// Required attack / defence strength ratio before attacking.
    pub attack_margin: f64,
    /// Strength ratio used by [`BehaviorMode::Hybrid`].
    pub hybrid_attack_margin: f64,
    /// Distance from the nearest own planet beyond which fleets regroup.
    pub regroup_distance: i32,
}

impl Default for PlanningThresholds {
    fn default() -> Self {
        Self {
            min_energy_surplus: 0,
            housing_pressure: 0.9,
            low_morale: 40,
            high_morale: 75,
            factories_per_planet: 2,
            defense_per_planet: 4,
            attack_margin: 1.5,
            hybrid_attack_margin: 1.1,
            regroup_distance: 50,
        }
    }
}

/// Behaviour, attack aim and thresholds of one empire.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyProfile {
    /// Behaviour.
    pub behavior: BehaviorMode,
    /// Attack aim.
    pub attack_mode: AttackMode,
    /// Rule thresholds.
    pub thresholds: PlanningThresholds,
}

impl StrategyProfile {
    /// Create a profile.
    #[must_use]
    pub fn new(behavior: BehaviorMode, attack_mode: AttackMode, thresholds: PlanningThresholds) -> Self {
        Self {
            behavior,
            attack_mode,
            thresholds,
        }
    }

    /// Planner with the rule subsets this profile enables.
    #[must_use]
    pub fn pipeline_for(
        behavior: BehaviorMode,
        attack_mode: AttackMode,
        thresholds: &PlanningThresholds,
    ) -> EmpirePlanner {
        Self::new(behavior, attack_mode, thresholds.clone()).planner()
    }

    /// Planner for this profile.
    #[must_use]
    pub fn planner(&self) -> EmpirePlanner {
        EmpirePlanner::new(self.planet_pipeline(), self.fleet_pipeline())
    }

    /// Economy rules, in priority order.
    #[must_use]
    pub fn planet_pipeline(&self) -> PlanningPipeline<PlanetView> {
        let t = &self.thresholds;
        match self.behavior {
            BehaviorMode::Inert => PlanningPipeline::new(),
            BehaviorMode::Pirate => PlanningPipeline::new()
                .with_rule(PowerDeficitRule::new(t.min_energy_surplus))
                .with_rule(FactoryRule::new(t.factories_per_planet))
                .with_rule(DeployDefenseRule::new(t.defense_per_planet)),
            BehaviorMode::Trader | BehaviorMode::Balanced | BehaviorMode::Hybrid => {
                PlanningPipeline::new()
                    .with_rule(PowerDeficitRule::new(t.min_energy_surplus))
                    .with_rule(LivingSpaceRule::new(t.housing_pressure))
                    .with_rule(MoraleTaxRule::new(t.low_morale, t.high_morale))
                    .with_rule(FactoryRule::new(t.factories_per_planet))
                    .with_rule(DeployDefenseRule::new(t.defense_per_planet))
            }
        }
    }

    /// Fleet rules, in priority order.
    #[must_use]
    pub fn fleet_pipeline(&self) -> PlanningPipeline<FleetView> {
        let t = &self.thresholds;
        match self.behavior {
            BehaviorMode::Inert => PlanningPipeline::new(),
            BehaviorMode::Trader => PlanningPipeline::new().with_rule(RegroupRule::new(t.regroup_distance)),
            // Pirates always go for production.
            BehaviorMode::Pirate => PlanningPipeline::new()
                .with_rule(AttackRule::new(AttackMode::Cripple, t.hybrid_attack_margin))
                .with_rule(RegroupRule::new(t.regroup_distance)),
            BehaviorMode::Balanced => PlanningPipeline::new()
                .with_rule(AttackRule::new(self.attack_mode, t.attack_margin))
                .with_rule(RegroupRule::new(t.regroup_distance)),
            BehaviorMode::Hybrid => PlanningPipeline::new()
                .with_rule(AttackRule::new(self.attack_mode, t.hybrid_attack_margin))
                .with_rule(RegroupRule::new(t.regroup_distance)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inert_has_no_rules() {
        let profile = StrategyProfile::new(BehaviorMode::Inert, AttackMode::Capture, PlanningThresholds::default());
        assert!(profile.planet_pipeline().is_empty());
        assert!(profile.fleet_pipeline().is_empty());
    }

    #[test]
    fn test_trader_never_attacks() {
        let profile = StrategyProfile::new(BehaviorMode::Trader, AttackMode::Capture, PlanningThresholds::default());
        assert_eq!(profile.fleet_pipeline().rule_names(), vec!["regroup"]);
        assert_eq!(profile.planet_pipeline().len(), 5);
    }

    #[test]
    fn test_rule_order_for_balanced() {
        let profile = StrategyProfile::new(BehaviorMode::Balanced, AttackMode::Cripple, PlanningThresholds::default());
        assert_eq!(
            profile.planet_pipeline().rule_names(),
            vec!["power_deficit", "living_space", "morale_tax", "factory", "deploy_defense"]
        );
        assert_eq!(profile.fleet_pipeline().rule_names(), vec!["attack", "regroup"]);
    }

    #[test]
    fn test_thresholds_partial_ron() {
        let t: PlanningThresholds = ron::from_str("(low_morale: 25, attack_margin: 2.0)").expect("parses");
        assert_eq!(t.low_morale, 25);
        assert!((t.attack_margin - 2.0).abs() < f64::EPSILON);
        assert_eq!(t.factories_per_planet, 2);
    }
}
