//! # Dominion Core
//!
//! Decision-and-resolution core for a tick-based space strategy game.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No IO
//! - No system randomness (battles take an explicit seed)
//!
//! Economy math is fixed-point. Battle kinematics use `f64` but iterate in a
//! stable order, so a given world and seed always produce the same result.
//!
//! ## Crate Structure
//!
//! - [`world`] - Live players, planets, fleets and the balance catalog
//! - [`kinematics`] - Angle discretization and hit-testing for battle objects
//! - [`allocation`] - Energy and labour distribution across buildings
//! - [`snapshot`] - Read-only per-player views for the planner
//! - [`planning`] - Ordered rule pipeline and the live commit step
//! - [`combat`] - Space and ground battles with a callback protocol
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod allocation;
pub mod combat;
pub mod data;
pub mod error;
pub mod ids;
pub mod kinematics;
pub mod math;
pub mod pathfinding;
pub mod planning;
pub mod snapshot;
pub mod surface;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allocation::{run_allocation_pass, AllocationRequest, AllocationResult, ResourcePools};
    pub use crate::combat::{
        apply_battle_outcome, resolve_attack, AttackDefenseTotals, AutoBattleAi, Battle, BattleCallback,
        BattleCommands, BattleOutcome, BattleSignal, GroundBattle, Side, SpaceBattle,
    };
    pub use crate::data::{BalanceData, Catalog};
    pub use crate::error::{GameError, Result};
    pub use crate::ids::{BuildingId, BuildingTypeId, FleetId, ItemTypeId, PlanetId, PlayerId};
    pub use crate::math::{Fixed, GalaxyPos};
    pub use crate::planning::{commit, Action, EmpirePlanner, PlanningOutcome, PlanningPipeline};
    pub use crate::snapshot::{PlanetView, WorldSnapshotBuilder, WorldView};
    pub use crate::world::{Fleet, InventoryItem, Planet, Player, World};
}
