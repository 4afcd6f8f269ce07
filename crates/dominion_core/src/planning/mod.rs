//! Planning pipeline: ordered rules turning a [`WorldView`] into actions.
//!
//! Each rule returns a [`PlanningOutcome`]. [`PlanningOutcome::Continue`]
//! passes to the next rule; anything else ends the pipeline for that
//! subject. Rules never touch the live world. A `Success` carries an
//! [`Action`] that [`commit`] later re-validates and applies on the
//! simulation's own timeline.

mod commit;
mod rules;
mod strategy;

use std::collections::BTreeSet;

pub use commit::{commit, CommitReceipt};
pub use rules::{
    AttackRule, DeployDefenseRule, FactoryRule, LivingSpaceRule, MoraleTaxRule, PowerDeficitRule,
    RegroupRule,
};
pub use strategy::{AttackMode, BehaviorMode, PlanningThresholds, StrategyProfile};

use crate::ids::{BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
use crate::snapshot::{adjust_lines, line_count, FleetView, InventoryLineItem, PlanetView, WorldView};
use crate::world::TaxLevel;

/// A change to the live world decided by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Construct a building.
    Build {
        /// Target planet.
        planet: PlanetId,
        /// Building type.
        building_type: BuildingTypeId,
        /// Top-left cell.
        location: (u32, u32),
    },
    /// Move items from stock to a planet.
    Deploy {
        /// Target planet.
        planet: PlanetId,
        /// Item type.
        item: ItemTypeId,
        /// How many.
        count: u32,
    },
    /// Change a planet's tax level.
    SetTax {
        /// Target planet.
        planet: PlanetId,
        /// New level.
        level: TaxLevel,
    },
    /// Send a fleet against a foreign planet.
    Attack {
        /// Attacking fleet.
        fleet: FleetId,
        /// Target planet.
        planet: PlanetId,
    },
    /// Move a fleet to a planet.
    MoveFleet {
        /// Fleet.
        fleet: FleetId,
        /// Destination planet.
        planet: PlanetId,
    },
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanningOutcome {
    /// The rule decided on an action.
    Success(Action),
    /// Nothing suitable is available (no research, limits reached).
    NoAvail,
    /// No free surface location.
    NoRoom,
    /// Not enough money.
    NoMoney,
    /// Not applicable; try the next rule.
    Continue,
}

impl PlanningOutcome {
    /// Whether this outcome ends the pipeline.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// The committed action, if any.
    #[must_use]
    pub const fn action(&self) -> Option<Action> {
        match self {
            Self::Success(action) => Some(*action),
            _ => None,
        }
    }
}

/// Mutable per-cycle state shared by every rule of one player's cycle.
///
/// Money and stock are copied from the view so that a decision on one planet
/// is visible to the next.
#[derive(Debug)]
pub struct PlanningContext<'v> {
    view: &'v WorldView,
    budget: i64,
    stock: Vec<InventoryLineItem>,
    claimed: BTreeSet<PlanetId>,
}

impl<'v> PlanningContext<'v> {
    /// Start a cycle over `view`.
    #[must_use]
    pub fn new(view: &'v WorldView) -> Self {
        Self {
            view,
            budget: view.money,
            stock: view.stock.clone(),
            claimed: BTreeSet::new(),
        }
    }

    /// The snapshot being planned over.
    #[must_use]
    pub fn view(&self) -> &'v WorldView {
        self.view
    }

    /// Money left this cycle.
    #[must_use]
    pub fn budget(&self) -> i64 {
        self.budget
    }

    /// Whether `cost` fits the remaining budget.
    #[must_use]
    pub fn can_afford(&self, cost: i64) -> bool {
        cost <= self.budget
    }

    /// Reserve money for a decided action.
    pub fn spend(&mut self, cost: i64) {
        self.budget -= cost;
    }

    /// Undeployed stock of `item` owned by the planning player.
    #[must_use]
    pub fn stock_count(&self, item: ItemTypeId) -> u32 {
        line_count(&self.stock, item, Some(self.view.player))
    }

    /// Undeployed stock lines.
    #[must_use]
    pub fn stock(&self) -> &[InventoryLineItem] {
        &self.stock
    }

    /// Reserve stock for a decided deployment.
    pub fn take_stock(&mut self, item: ItemTypeId, count: u32) {
        adjust_lines(&mut self.stock, item, self.view.player, -i64::from(count));
    }

    /// Mark a target as taken; false if another fleet already claimed it.
    pub fn claim(&mut self, planet: PlanetId) -> bool {
        self.claimed.insert(planet)
    }

    /// Whether a target is already claimed this cycle.
    #[must_use]
    pub fn is_claimed(&self, planet: PlanetId) -> bool {
        self.claimed.contains(&planet)
    }
}

/// One candidate-action evaluator.
pub trait PlanningRule<S>: Send + Sync {
    /// Short stable name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Evaluate against one subject. Only snapshot-local state may change.
    fn evaluate(&self, ctx: &mut PlanningContext<'_>, subject: &mut S) -> PlanningOutcome;
}

/// Outcome of a pipeline run and the rule that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineResult {
    /// Rule that ended the pipeline; `None` when every rule continued.
    pub rule: Option<&'static str>,
    /// Terminal outcome, or `Continue` when nothing applied.
    pub outcome: PlanningOutcome,
}

/// Ordered rules evaluated first-applicable-wins.
pub struct PlanningPipeline<S> {
    rules: Vec<Box<dyn PlanningRule<S>>>,
}

impl<S> Default for PlanningPipeline<S> {
    fn default() -> Self {
        Self { rules: Vec::new() }
    }
}

impl<S> std::fmt::Debug for PlanningPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanningPipeline")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl<S> PlanningPipeline<S> {
    /// Empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule (builder style).
    #[must_use]
    pub fn with_rule(mut self, rule: impl PlanningRule<S> + 'static) -> Self {
        self.push(rule);
        self
    }

    /// Append a rule.
    pub fn push(&mut self, rule: impl PlanningRule<S> + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule names in evaluation order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Evaluate rules in order until one returns a terminal outcome.
    pub fn run(&self, ctx: &mut PlanningContext<'_>, subject: &mut S) -> PipelineResult {
        for rule in &self.rules {
            let outcome = rule.evaluate(ctx, subject);
            tracing::debug!(rule = rule.name(), ?outcome, "Rule evaluated");
            if outcome.is_terminal() {
                return PipelineResult {
                    rule: Some(rule.name()),
                    outcome,
                };
            }
        }
        PipelineResult {
            rule: None,
            outcome: PlanningOutcome::Continue,
        }
    }
}

/// What a decision was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSubject {
    /// An own planet.
    Planet(PlanetId),
    /// An own fleet.
    Fleet(FleetId),
}

/// Result of one pipeline run within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Planet or fleet planned for.
    pub subject: DecisionSubject,
    /// Rule that decided, if any.
    pub rule: Option<&'static str>,
    /// Outcome.
    pub outcome: PlanningOutcome,
}

/// Everything one player decided in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningCycle {
    /// The planning player.
    pub player: PlayerId,
    /// Tick of the snapshot.
    pub tick: u64,
    /// One entry per planet, then per fleet.
    pub decisions: Vec<Decision>,
}

impl PlanningCycle {
    /// Actions to commit, in decision order.
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.decisions.iter().filter_map(|d| d.outcome.action())
    }
}

/// Economy and fleet pipelines of one empire.
#[derive(Debug, Default)]
pub struct EmpirePlanner {
    planet_pipeline: PlanningPipeline<PlanetView>,
    fleet_pipeline: PlanningPipeline<FleetView>,
}

impl EmpirePlanner {
    /// Combine the two pipelines.
    #[must_use]
    pub fn new(planet_pipeline: PlanningPipeline<PlanetView>, fleet_pipeline: PlanningPipeline<FleetView>) -> Self {
        Self {
            planet_pipeline,
            fleet_pipeline,
        }
    }

    /// Planner for the behaviour recorded in the view.
    #[must_use]
    pub fn for_view(view: &WorldView) -> Self {
        StrategyProfile::pipeline_for(view.behavior, view.attack_mode, view.catalog().planning())
    }

    /// Run one planning cycle. Pure with respect to the live world.
    #[must_use]
    pub fn plan(&self, view: &WorldView) -> PlanningCycle {
        let mut ctx = PlanningContext::new(view);
        let mut decisions = Vec::with_capacity(view.planets.len() + view.fleets.len());

        for planet in &view.planets {
            let mut working = planet.clone();
            let result = self.planet_pipeline.run(&mut ctx, &mut working);
            decisions.push(Decision {
                subject: DecisionSubject::Planet(planet.id),
                rule: result.rule,
                outcome: result.outcome,
            });
        }

        for fleet in &view.fleets {
            let mut working = fleet.clone();
            let result = self.fleet_pipeline.run(&mut ctx, &mut working);
            decisions.push(Decision {
                subject: DecisionSubject::Fleet(fleet.id),
                rule: result.rule,
                outcome: result.outcome,
            });
        }

        tracing::debug!(
            player = %view.player,
            tick = view.tick,
            actions = decisions.iter().filter(|d| d.outcome.action().is_some()).count(),
            budget_left = ctx.budget(),
            "Planning cycle complete"
        );

        PlanningCycle {
            player: view.player,
            tick: view.tick,
            decisions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::data::Catalog;
    use crate::snapshot::WorldSnapshotBuilder;
    use crate::world::{Player, World};

    struct Scripted {
        name: &'static str,
        outcome: PlanningOutcome,
        calls: Arc<AtomicUsize>,
    }

    impl PlanningRule<u32> for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn evaluate(&self, _ctx: &mut PlanningContext<'_>, subject: &mut u32) -> PlanningOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *subject += 1;
            self.outcome
        }
    }

    fn rule(name: &'static str, outcome: PlanningOutcome) -> (Scripted, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Scripted {
                name,
                outcome,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    fn empty_view() -> WorldView {
        let mut world = World::new(Arc::new(Catalog::default()));
        world.add_player(Player::new(PlayerId(1), "Solo"));
        WorldSnapshotBuilder::new(&world).build(PlayerId(1)).expect("view")
    }

    #[test]
    fn test_first_terminal_rule_wins() {
        let action = Action::SetTax {
            planet: PlanetId(1),
            level: TaxLevel::Low,
        };
        let (a, a_calls) = rule("a", PlanningOutcome::Continue);
        let (b, b_calls) = rule("b", PlanningOutcome::Continue);
        let (c, c_calls) = rule("c", PlanningOutcome::Success(action));
        let (d, d_calls) = rule("d", PlanningOutcome::NoMoney);
        let pipeline = PlanningPipeline::new().with_rule(a).with_rule(b).with_rule(c).with_rule(d);

        let view = empty_view();
        let mut ctx = PlanningContext::new(&view);
        let mut evaluated = 0u32;
        let result = pipeline.run(&mut ctx, &mut evaluated);

        assert_eq!(result.rule, Some("c"));
        assert_eq!(result.outcome, PlanningOutcome::Success(action));
        assert_eq!(evaluated, 3);
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
        assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_terminal_failure_stops_pipeline() {
        let (a, _) = rule("a", PlanningOutcome::NoRoom);
        let (b, b_calls) = rule("b", PlanningOutcome::Continue);
        let pipeline = PlanningPipeline::new().with_rule(a).with_rule(b);

        let view = empty_view();
        let mut ctx = PlanningContext::new(&view);
        let result = pipeline.run(&mut ctx, &mut 0);
        assert_eq!(result.outcome, PlanningOutcome::NoRoom);
        assert_eq!(result.outcome.action(), None);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_continue_reports_continue() {
        let (a, _) = rule("a", PlanningOutcome::Continue);
        let pipeline = PlanningPipeline::new().with_rule(a);
        let view = empty_view();
        let mut ctx = PlanningContext::new(&view);
        let result = pipeline.run(&mut ctx, &mut 0);
        assert_eq!(result.rule, None);
        assert!(!result.outcome.is_terminal());
    }

    #[test]
    fn test_context_budget_and_claims() {
        let mut view = empty_view();
        view.money = 100;
        let mut ctx = PlanningContext::new(&view);
        assert!(ctx.can_afford(100));
        ctx.spend(60);
        assert!(!ctx.can_afford(50));
        assert!(ctx.claim(PlanetId(3)));
        assert!(!ctx.claim(PlanetId(3)));
        assert!(ctx.is_claimed(PlanetId(3)));
        // Budget is per cycle; the view keeps its own figure.
        assert_eq!(view.money, 100);
    }
}
