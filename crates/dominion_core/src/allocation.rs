//! Planet-wide energy and labour allocation.
//!
//! A pass runs in three explicit phases:
//!
//! 1. **Collect**: every structure reports an [`AllocationRequest`] from its
//!    current state. Nothing is mutated.
//! 2. **Compute**: [`allocate`] splits the pools over the collected requests.
//!    It sees one consistent read of all demands.
//! 3. **Apply**: each [`AllocationResult`] is written back to the structure
//!    it was computed for.
//!
//! Shortfalls are not errors. When demand exceeds a pool every consumer gets
//! the same fraction of its demand.

use crate::data::{BuildingData, Catalog};
use crate::math::{unit_ratio, Fixed};
use crate::world::{Building, Planet};

/// Health ratio below which a structure stops working.
const MIN_OPERATING_HEALTH: Fixed = Fixed::from_bits(1 << 31);

/// Efficiency ceiling for a health ratio: zero below one half, else the ratio.
#[must_use]
pub fn efficiency_bound(health_ratio: Fixed) -> Fixed {
    if health_ratio < MIN_OPERATING_HEALTH {
        Fixed::ZERO
    } else {
        health_ratio.clamp(Fixed::ZERO, Fixed::ONE)
    }
}

/// What one structure asks of the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationRequest {
    /// Energy needed at full efficiency.
    pub energy_demand: Fixed,
    /// Workers needed at full efficiency.
    pub worker_demand: Fixed,
    /// Net producers take no energy and are limited by labour only.
    pub produces_energy: bool,
    /// Health-derived efficiency ceiling in `[0, 1]`.
    pub efficiency_bound: Fixed,
}

impl AllocationRequest {
    /// Request for a building of type `def` in its current condition.
    #[must_use]
    pub fn for_building(building: &Building, def: &BuildingData) -> Self {
        Self {
            energy_demand: Fixed::from_num(def.energy_demand()),
            worker_demand: Fixed::from_num(def.workers.max(0)),
            produces_energy: def.produces_energy(),
            efficiency_bound: efficiency_bound(building.health_ratio()),
        }
    }
}

/// What one structure was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationResult {
    /// Energy granted, never above demand.
    pub energy_allocated: Fixed,
    /// Workers granted, never above demand.
    pub worker_allocated: Fixed,
    /// Achievable efficiency in `[0, 1]`.
    pub efficiency: Fixed,
}

/// Planet-wide energy and labour supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePools {
    /// Energy available to consumers.
    pub energy: Fixed,
    /// Workers available.
    pub workers: Fixed,
}

impl ResourcePools {
    /// Create pools.
    ///
    /// # Panics
    ///
    /// Panics if either pool is negative.
    #[must_use]
    pub fn new(energy: Fixed, workers: Fixed) -> Self {
        assert!(energy >= Fixed::ZERO, "energy pool must not be negative");
        assert!(workers >= Fixed::ZERO, "worker pool must not be negative");
        Self { energy, workers }
    }

    /// Pools of a live planet: producer output scaled by health, and population.
    #[must_use]
    pub fn for_planet(planet: &Planet, catalog: &Catalog) -> Self {
        let energy = planet
            .buildings
            .iter()
            .filter_map(|b| catalog.building(b.type_id).map(|def| (b, def)))
            .filter(|(_, def)| def.produces_energy())
            .map(|(b, def)| Fixed::from_num(def.energy) * efficiency_bound(b.health_ratio()))
            .fold(Fixed::ZERO, |acc, e| acc.saturating_add(e));
        Self::new(energy, Fixed::from_num(planet.population.max(0)))
    }
}

/// Something that takes part in an allocation pass.
pub trait AllocationTarget {
    /// Read phase: report current demand.
    fn allocation_request(&self, catalog: &Catalog) -> Option<AllocationRequest>;

    /// Apply phase: store the granted figures.
    fn apply_allocation(&mut self, result: AllocationResult);
}

impl AllocationTarget for Building {
    fn allocation_request(&self, catalog: &Catalog) -> Option<AllocationRequest> {
        catalog
            .building(self.type_id)
            .map(|def| AllocationRequest::for_building(self, def))
    }

    fn apply_allocation(&mut self, result: AllocationResult) {
        self.energy_allocated = result.energy_allocated;
        self.worker_allocated = result.worker_allocated;
        self.efficiency = result.efficiency;
    }
}

/// Sum of demands as raw fixed bits; `i128` cannot overflow here.
fn total_bits(demands: impl Iterator<Item = Fixed>) -> i128 {
    demands.map(|d| i128::from(d.to_bits())).sum()
}

/// Proportional share of `pool` for one `demand` out of `total` demand bits.
///
/// Works on raw bits in `i128`: the product of two `I32F32` values fits, so
/// nothing saturates and truncation keeps the sum of shares at or below
/// the pool.
fn share(demand: Fixed, pool: Fixed, total: i128) -> Fixed {
    let pool_bits = i128::from(pool.to_bits());
    if pool_bits >= total || total <= 0 {
        return demand;
    }
    let bits = i128::from(demand.to_bits()) * pool_bits / total;
    i64::try_from(bits).map_or(demand, Fixed::from_bits).min(demand)
}

/// Fraction of `demand` covered by `allocated`; a zero demand is fully met.
fn met(allocated: Fixed, demand: Fixed) -> Fixed {
    if demand <= Fixed::ZERO {
        Fixed::ONE
    } else {
        unit_ratio(allocated, demand)
    }
}

/// Split the pools proportionally over `requests`.
///
/// Results come back in request order. No result exceeds its demand and the
/// totals never exceed the pools.
#[must_use]
pub fn allocate(pools: ResourcePools, requests: &[AllocationRequest]) -> Vec<AllocationResult> {
    let total_energy = total_bits(requests.iter().filter(|r| !r.produces_energy).map(|r| r.energy_demand));
    let total_workers = total_bits(requests.iter().map(|r| r.worker_demand));

    requests
        .iter()
        .map(|request| {
            let worker_allocated = share(request.worker_demand, pools.workers, total_workers);
            let mut efficiency = request
                .efficiency_bound
                .min(met(worker_allocated, request.worker_demand));

            let energy_allocated = if request.produces_energy {
                Fixed::ZERO
            } else {
                let granted = share(request.energy_demand, pools.energy, total_energy);
                efficiency = efficiency.min(met(granted, request.energy_demand));
                granted
            };

            AllocationResult {
                energy_allocated,
                worker_allocated,
                efficiency: efficiency.clamp(Fixed::ZERO, Fixed::ONE),
            }
        })
        .collect()
}

/// Run collect, compute and apply over a set of targets sharing one pool.
pub fn run_allocation<T: AllocationTarget>(pools: ResourcePools, targets: &mut [T], catalog: &Catalog) {
    let collected: Vec<(usize, AllocationRequest)> = targets
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.allocation_request(catalog).map(|r| (i, r)))
        .collect();
    let requests: Vec<AllocationRequest> = collected.iter().map(|(_, r)| *r).collect();
    let results = allocate(pools, &requests);

    for ((index, _), result) in collected.into_iter().zip(results) {
        targets[index].apply_allocation(result);
    }
}

/// Allocation pass over one live planet.
pub fn run_allocation_pass(planet: &mut Planet, catalog: &Catalog) {
    let pools = ResourcePools::for_planet(planet, catalog);
    tracing::debug!(
        planet = %planet.id,
        energy = %pools.energy,
        workers = %pools.workers,
        buildings = planet.buildings.len(),
        "Allocation pass"
    );
    run_allocation(pools, &mut planet.buildings, catalog);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn consumer(energy: i32, workers: i32) -> AllocationRequest {
        AllocationRequest {
            energy_demand: Fixed::from_num(energy),
            worker_demand: Fixed::from_num(workers),
            produces_energy: false,
            efficiency_bound: Fixed::ONE,
        }
    }

    #[test]
    fn test_proportional_split_example() {
        let pools = ResourcePools::new(Fixed::from_num(100), Fixed::from_num(50));
        let results = allocate(pools, &[consumer(80, 30), consumer(80, 30)]);

        for result in &results {
            assert_eq!(result.energy_allocated, Fixed::from_num(50));
            assert_eq!(result.worker_allocated, Fixed::from_num(25));
            assert_eq!(result.efficiency, Fixed::from_num(0.625));
        }
    }

    #[test]
    fn test_full_supply_gives_full_efficiency() {
        let pools = ResourcePools::new(Fixed::from_num(500), Fixed::from_num(500));
        let results = allocate(pools, &[consumer(80, 30)]);
        assert_eq!(results[0].energy_allocated, Fixed::from_num(80));
        assert_eq!(results[0].efficiency, Fixed::ONE);
    }

    #[test]
    fn test_producer_limited_by_workers_only() {
        let pools = ResourcePools::new(Fixed::ZERO, Fixed::from_num(10));
        let producer = AllocationRequest {
            energy_demand: Fixed::ZERO,
            worker_demand: Fixed::from_num(20),
            produces_energy: true,
            efficiency_bound: Fixed::ONE,
        };
        let results = allocate(pools, &[producer]);
        assert_eq!(results[0].energy_allocated, Fixed::ZERO);
        assert_eq!(results[0].efficiency, Fixed::from_num(0.5));
    }

    #[test]
    fn test_damaged_structure_has_zero_efficiency() {
        let pools = ResourcePools::new(Fixed::from_num(100), Fixed::from_num(100));
        let mut request = consumer(10, 10);
        request.efficiency_bound = efficiency_bound(Fixed::from_num(0.49));
        let results = allocate(pools, &[request]);
        assert_eq!(results[0].efficiency, Fixed::ZERO);
    }

    #[test]
    fn test_efficiency_bound_threshold() {
        assert_eq!(efficiency_bound(Fixed::from_num(0.25)), Fixed::ZERO);
        assert_eq!(efficiency_bound(Fixed::from_num(0.5)), Fixed::from_num(0.5));
        assert_eq!(efficiency_bound(Fixed::from_num(0.8)), Fixed::from_num(0.8));
    }

    #[test]
    fn test_share_near_fixed_max_is_proportional() {
        let pools = ResourcePools::new(Fixed::MAX, Fixed::MAX);
        let mut request = consumer(0, 0);
        request.energy_demand = Fixed::MAX;
        request.worker_demand = Fixed::MAX;
        let results = allocate(pools, &[request, request]);
        let half = Fixed::from_bits(i64::MAX / 2);
        for result in &results {
            assert_eq!(result.energy_allocated, half);
            assert_eq!(result.worker_allocated, half);
        }
    }

    #[test]
    #[should_panic(expected = "must not be negative")]
    fn test_negative_pool_panics() {
        let _ = ResourcePools::new(Fixed::from_num(-1), Fixed::ZERO);
    }

    struct Recorder {
        request: AllocationRequest,
        applied: Option<AllocationResult>,
    }

    impl AllocationTarget for Recorder {
        fn allocation_request(&self, _catalog: &Catalog) -> Option<AllocationRequest> {
            Some(self.request)
        }

        fn apply_allocation(&mut self, result: AllocationResult) {
            // Applying must not feed back into other requests of the same pass.
            self.request.energy_demand = Fixed::ZERO;
            self.applied = Some(result);
        }
    }

    #[test]
    fn test_apply_phase_does_not_disturb_compute() {
        let catalog = Catalog::default();
        let mut recorders = vec![
            Recorder { request: consumer(80, 30), applied: None },
            Recorder { request: consumer(80, 30), applied: None },
        ];
        let pools = ResourcePools::new(Fixed::from_num(100), Fixed::from_num(50));
        run_allocation(pools, &mut recorders, &catalog);

        let first = recorders[0].applied.expect("applied");
        let second = recorders[1].applied.expect("applied");
        assert_eq!(first, second);
        assert_eq!(first.energy_allocated, Fixed::from_num(50));
    }

    fn request_strategy() -> impl Strategy<Value = AllocationRequest> {
        (0i32..500, 0i32..200, any::<bool>(), 0u32..=100).prop_map(|(e, w, producer, health)| {
            AllocationRequest {
                energy_demand: Fixed::from_num(e),
                worker_demand: Fixed::from_num(w),
                produces_energy: producer,
                efficiency_bound: efficiency_bound(Fixed::from_num(health) / Fixed::from_num(100)),
            }
        })
    }

    proptest! {
        #[test]
        fn prop_never_overcommits(
            energy in 0i32..2000,
            workers in 0i32..1000,
            requests in prop::collection::vec(request_strategy(), 0..12),
        ) {
            let pools = ResourcePools::new(Fixed::from_num(energy), Fixed::from_num(workers));
            let results = allocate(pools, &requests);
            prop_assert_eq!(results.len(), requests.len());

            let mut energy_sum = Fixed::ZERO;
            let mut worker_sum = Fixed::ZERO;
            for (request, result) in requests.iter().zip(&results) {
                prop_assert!(result.energy_allocated <= request.energy_demand);
                prop_assert!(result.worker_allocated <= request.worker_demand);
                prop_assert!(result.efficiency >= Fixed::ZERO && result.efficiency <= Fixed::ONE);
                prop_assert!(result.efficiency <= request.efficiency_bound);
                energy_sum += result.energy_allocated;
                worker_sum += result.worker_allocated;
            }
            prop_assert!(energy_sum <= pools.energy);
            prop_assert!(worker_sum <= pools.workers);
        }

        #[test]
        fn prop_huge_demands_stay_within_pool(
            pool_offset in 0i64..(1i64 << 40),
            demands in prop::collection::vec((1i64 << 60)..=i64::MAX, 2..6),
        ) {
            let pool = Fixed::from_bits(i64::MAX - pool_offset);
            let pools = ResourcePools::new(pool, pool);
            let requests: Vec<AllocationRequest> = demands
                .iter()
                .map(|&bits| AllocationRequest {
                    energy_demand: Fixed::from_bits(bits),
                    worker_demand: Fixed::from_bits(bits),
                    produces_energy: false,
                    efficiency_bound: Fixed::ONE,
                })
                .collect();
            let results = allocate(pools, &requests);

            let mut energy_sum = 0i128;
            let mut worker_sum = 0i128;
            for (request, result) in requests.iter().zip(&results) {
                prop_assert!(result.energy_allocated <= request.energy_demand);
                energy_sum += i128::from(result.energy_allocated.to_bits());
                worker_sum += i128::from(result.worker_allocated.to_bits());
            }
            prop_assert!(energy_sum <= i128::from(pool.to_bits()));
            prop_assert!(worker_sum <= i128::from(pool.to_bits()));
            // Nothing is lost beyond one truncation step per share.
            let wanted = demands.iter().map(|&bits| i128::from(bits)).sum::<i128>().min(i128::from(pool.to_bits()));
            prop_assert!(energy_sum >= wanted - requests.len() as i128);
        }

        #[test]
        fn prop_low_health_means_zero_efficiency(health in 0u32..50) {
            let pools = ResourcePools::new(Fixed::from_num(1000), Fixed::from_num(1000));
            let mut request = consumer(10, 10);
            request.efficiency_bound = efficiency_bound(Fixed::from_num(health) / Fixed::from_num(100));
            prop_assert_eq!(allocate(pools, &[request])[0].efficiency, Fixed::ZERO);
        }
    }
}
