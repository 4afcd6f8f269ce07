//! Determinism testing utilities.
//!
//! Provides a harness for verifying that planning and battles produce
//! identical results given identical inputs.
//!
//! # Testing Strategy
//!
//! AI decisions must be reproducible so that a recorded scenario can be
//! replayed and audited. Sources of non-determinism include:
//!
//! - **Floating-point economy math**: The economy uses fixed-point
//!   arithmetic via [`dominion_core::math::Fixed`] throughout. Battles use
//!   `f64` but iterate in participant-id order.
//!
//! - **HashMap iteration order**: Rust's default hasher is randomized.
//!   The live world keeps everything in `BTreeMap`s.
//!
//! - **System randomness**: Battle ECM rolls come from a seeded ChaCha
//!   generator; nothing reads the system RNG.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual battle determinism
//! 2. **Property tests**: Random inputs must still produce deterministic outputs
//! 3. **Integration tests**: Whole turns over the sample world are reproducible
//! 4. **Parallel tests**: Running N worlds on N threads all match

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;

use dominion_core::allocation::run_allocation_pass;
use dominion_core::combat::{run_space_battle, AutoBattleAi, BattleOutcome};
use dominion_core::ids::{FleetId, PlanetId};
use dominion_core::planning::{commit, EmpirePlanner};
use dominion_core::snapshot::WorldSnapshotBuilder;
use dominion_core::world::World;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of steps simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for a deterministic run).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the runs were deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "World is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a stepped computation multiple times and verify determinism.
///
/// # Arguments
///
/// * `runs` - Number of times to run
/// * `ticks` - Number of steps per run
/// * `setup` - Function to create initial state
/// * `step` - Function to advance state by one step
/// * `hash` - Function to compute state hash
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();

        for _ in 0..ticks {
            step(&mut state);
        }

        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Hash of a world; panics if it cannot be serialized.
///
/// # Panics
///
/// Panics if [`World::state_hash`] fails.
#[must_use]
pub fn world_hash(world: &World) -> u64 {
    match world.state_hash() {
        Ok(hash) => hash,
        Err(e) => panic!("world hash failed: {e}"),
    }
}

/// One economy turn without battles: allocation on every planet, a
/// planning cycle per AI player, then sequential commits.
///
/// Rejected commits are logged and skipped, as a live runner would.
///
/// # Panics
///
/// Panics if a snapshot cannot be built, which means the world is corrupt.
pub fn economy_turn(world: &mut World) {
    let catalog = std::sync::Arc::clone(world.catalog());
    for planet in world.planets_mut() {
        run_allocation_pass(planet, &catalog);
    }

    let views = WorldSnapshotBuilder::new(world)
        .build_ai_views()
        .expect("snapshots of a consistent world");
    let cycles: Vec<_> = views
        .iter()
        .map(|view| EmpirePlanner::for_view(view).plan(view))
        .collect();

    for cycle in &cycles {
        for action in cycle.actions() {
            if let Err(e) = commit(world, cycle.player, &action) {
                tracing::debug!(player = %cycle.player, error = %e, "Stale decision skipped");
            }
        }
    }
    world.tick += 1;
}

/// Run economy turns several times from the same setup and compare hashes.
pub fn verify_world_determinism<F>(setup_fn: F, turns: u64) -> DeterminismResult
where
    F: Fn() -> World,
{
    verify_determinism(2, turns, setup_fn, economy_turn, world_hash)
}

/// Result of parallel world runs.
#[derive(Debug, Clone)]
pub struct ParallelSimResult {
    /// Final state hash from each world.
    pub hashes: Vec<u64>,
    /// Number of turns each world ran.
    pub ticks: u64,
    /// Number of worlds run.
    pub num_sims: usize,
}

impl ParallelSimResult {
    /// Check if all worlds produced identical results.
    #[must_use]
    pub fn is_deterministic(&self) -> bool {
        self.hashes.windows(2).all(|w| w[0] == w[1])
    }

    /// Assert all worlds matched.
    ///
    /// # Panics
    ///
    /// Panics if worlds produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic() {
            let mut unique: Vec<u64> = self.hashes.clone();
            unique.sort_unstable();
            unique.dedup();
            panic!(
                "Parallel worlds diverged!\n\
                 Worlds: {}\n\
                 Turns: {}\n\
                 Unique hashes: {}\n\
                 All hashes: {:?}",
                self.num_sims,
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run N worlds on scoped threads and collect final hashes.
///
/// Catches non-determinism that only shows under thread scheduling.
///
/// # Panics
///
/// Panics if a worker thread panics.
pub fn run_parallel_worlds<F>(setup_fn: F, num_sims: usize, turns: u64) -> ParallelSimResult
where
    F: Fn() -> World + Sync,
{
    let hashes = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut world = setup_fn();
                    for _ in 0..turns {
                        economy_turn(&mut world);
                    }
                    world_hash(&world)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("world thread panicked"))
            .collect()
    });

    ParallelSimResult {
        hashes,
        ticks: turns,
        num_sims,
    }
}

/// Compare two worlds turn by turn, finding the first divergence.
///
/// # Returns
///
/// `None` if the worlds stay identical, `Some(turn)` if they diverge at
/// that turn.
pub fn find_first_divergence<F>(setup_fn: F, turns: u64) -> Option<u64>
where
    F: Fn() -> World,
{
    let mut first = setup_fn();
    let mut second = setup_fn();

    if world_hash(&first) != world_hash(&second) {
        return Some(0);
    }

    for turn in 1..=turns {
        economy_turn(&mut first);
        economy_turn(&mut second);

        if world_hash(&first) != world_hash(&second) {
            return Some(turn);
        }
    }

    None
}

/// Fight the same space battle `runs` times and report whether every
/// outcome matched.
///
/// # Panics
///
/// Panics if the battle cannot be built or the AI breaks the callback
/// contract.
pub fn verify_battle_determinism(world: &World, fleet: FleetId, planet: PlanetId, seed: u64, runs: usize) -> bool {
    let outcomes: Vec<BattleOutcome> = (0..runs)
        .map(|_| {
            run_space_battle(world, fleet, planet, seed, &mut AutoBattleAi::default())
                .expect("battle runs to completion")
        })
        .collect();
    outcomes.windows(2).all(|w| w[0] == w[1])
}

/// Compute a simple hash for any hashable value.
pub fn compute_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Proptest strategies for the core's value types.
///
/// These strategies generate random but reproducible inputs for
/// property-based testing.
pub mod strategies {
    use dominion_core::allocation::{AllocationRequest, ResourcePools};
    use dominion_core::combat::AttackDefenseTotals;
    use dominion_core::ids::{ItemTypeId, PlayerId};
    use dominion_core::math::{Fixed, GalaxyPos};
    use proptest::prelude::*;

    /// Generate a fixed-point galaxy coordinate.
    ///
    /// Range: -10000 to 10000
    pub fn arb_fixed_position() -> impl Strategy<Value = Fixed> {
        (-10000i32..10000i32).prop_map(Fixed::from_num)
    }

    /// Generate a fixed-point 2D galaxy position.
    pub fn arb_vec2_position() -> impl Strategy<Value = GalaxyPos> {
        (arb_fixed_position(), arb_fixed_position()).prop_map(|(x, y)| GalaxyPos::new(x, y))
    }

    /// Generate a non-negative pool or demand amount (0-5000).
    pub fn arb_amount() -> impl Strategy<Value = Fixed> {
        (0i32..5000i32).prop_map(Fixed::from_num)
    }

    /// Generate a health ratio in `[0, 1]` in hundredths.
    pub fn arb_health_ratio() -> impl Strategy<Value = Fixed> {
        (0i32..=100i32).prop_map(|pct| Fixed::from_num(pct) / Fixed::from_num(100))
    }

    /// Generate one structure's allocation request.
    pub fn arb_allocation_request() -> impl Strategy<Value = AllocationRequest> {
        (arb_amount(), arb_amount(), any::<bool>(), arb_health_ratio()).prop_map(
            |(energy_demand, worker_demand, produces_energy, health)| AllocationRequest {
                energy_demand: if produces_energy { Fixed::ZERO } else { energy_demand },
                worker_demand,
                produces_energy,
                efficiency_bound: dominion_core::allocation::efficiency_bound(health),
            },
        )
    }

    /// Generate planet pools.
    pub fn arb_pools() -> impl Strategy<Value = ResourcePools> {
        (arb_amount(), arb_amount()).prop_map(|(energy, workers)| ResourcePools::new(energy, workers))
    }

    /// Generate strength totals with bounded fields so sums cannot overflow.
    pub fn arb_totals() -> impl Strategy<Value = AttackDefenseTotals> {
        (
            0u64..1_000_000,
            0u64..1_000_000,
            0u64..100_000,
            (0u64..1000, 0u64..100),
            (0u64..1000, 0u64..100),
            0u64..50,
        )
            .prop_map(
                |(attack, defense, burst, (ecm_sum, ecm_count), (anti_ecm_sum, anti_ecm_count), structures)| {
                    AttackDefenseTotals {
                        attack,
                        defense,
                        burst,
                        ecm_sum,
                        ecm_count,
                        anti_ecm_sum,
                        anti_ecm_count,
                        structures,
                    }
                },
            )
    }

    /// Generate a continuous facing angle, including several full turns
    /// either way.
    pub fn arb_angle() -> impl Strategy<Value = f64> {
        -20.0f64..20.0f64
    }

    /// Generate an inventory adjustment: type, owner and signed delta.
    pub fn arb_inventory_delta() -> impl Strategy<Value = (ItemTypeId, PlayerId, i64)> {
        ((1u32..5).prop_map(ItemTypeId), (1u32..3).prop_map(PlayerId), -20i64..20)
    }

    /// Generate a sequence of inventory adjustments.
    pub fn arb_inventory_deltas(max_len: usize) -> impl Strategy<Value = Vec<(ItemTypeId, PlayerId, i64)>> {
        proptest::collection::vec(arb_inventory_delta(), 0..max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::strategies::*;
    use super::*;
    use crate::fixtures::{sample_world, GARTHOG};
    use dominion_core::allocation::allocate;
    use dominion_core::math::Fixed;
    use dominion_core::snapshot::{adjust_lines, InventoryLineItem};
    use proptest::prelude::*;

    // =========================================================================
    // Basic determinism tests
    // =========================================================================

    #[test]
    fn test_verify_determinism_simple() {
        let result = verify_determinism(3, 100, || 0u64, |n| *n += 1, |n| *n);

        assert!(result.is_deterministic);
        assert_eq!(result.hashes, vec![100, 100, 100]);
    }

    #[test]
    fn test_economy_turns_are_deterministic() {
        verify_world_determinism(sample_world, 5).assert_deterministic();
    }

    #[test]
    fn test_economy_turn_spends_money() {
        let mut world = sample_world();
        let before = world.player(GARTHOG).expect("player").money;
        economy_turn(&mut world);
        assert_eq!(world.tick, 1);
        assert!(world.player(GARTHOG).expect("player").money < before);
    }

    #[test]
    fn test_find_divergence_on_deterministic_world() {
        assert!(find_first_divergence(sample_world, 5).is_none(), "Expected no divergence");
    }

    #[test]
    fn test_parallel_worlds_match() {
        run_parallel_worlds(sample_world, 4, 3).assert_deterministic();
    }

    #[test]
    fn test_sample_battle_is_deterministic() {
        let world = sample_world();
        assert!(verify_battle_determinism(&world, FleetId(1), PlanetId(2), 42, 3));
    }

    #[test]
    fn test_compute_hash_is_stable() {
        assert_eq!(compute_hash(&(1u32, "a")), compute_hash(&(1u32, "a")));
    }

    // =========================================================================
    // Property-based tests using proptest
    // =========================================================================

    proptest! {
        /// Allocation never hands out more than a pool holds or a structure asks for.
        #[test]
        fn prop_allocation_never_overcommits(
            pools in arb_pools(),
            requests in proptest::collection::vec(arb_allocation_request(), 0..12),
        ) {
            let results = allocate(pools, &requests);
            prop_assert_eq!(results.len(), requests.len());
            let mut energy = Fixed::ZERO;
            let mut workers = Fixed::ZERO;
            for (request, result) in requests.iter().zip(&results) {
                prop_assert!(result.energy_allocated <= request.energy_demand);
                prop_assert!(result.worker_allocated <= request.worker_demand);
                prop_assert!(result.efficiency >= Fixed::ZERO);
                prop_assert!(result.efficiency <= request.efficiency_bound);
                energy += result.energy_allocated;
                workers += result.worker_allocated;
            }
            prop_assert!(energy <= pools.energy);
            prop_assert!(workers <= pools.workers);
        }

        /// Strength totals fold the same way regardless of grouping.
        #[test]
        fn prop_totals_add_is_associative(a in arb_totals(), b in arb_totals(), c in arb_totals()) {
            prop_assert_eq!((a + b) + c, a + (b + c));
            prop_assert_eq!(a + b, b + a);
        }

        /// Snapshot inventory never keeps empty or negative lines.
        #[test]
        fn prop_inventory_lines_stay_positive(deltas in arb_inventory_deltas(30)) {
            let mut lines: Vec<InventoryLineItem> = Vec::new();
            for (type_id, owner, delta) in deltas {
                adjust_lines(&mut lines, type_id, owner, delta);
                prop_assert!(lines.iter().all(|l| l.count > 0));
            }
        }

        /// Any seed gives the same battle twice.
        #[test]
        fn prop_battle_seed_is_reproducible(seed in any::<u64>()) {
            let world = sample_world();
            prop_assert!(verify_battle_determinism(&world, FleetId(1), PlanetId(2), seed, 2));
        }
    }
}
