//! Battle state machine and callback protocol.
//!
//! A battle moves `Init -> Running -> Done`. Every [`Battle::tick`] call
//! advances exactly one step: the first sets the battlefield up, each later
//! one advances the simulation once and then hands the newly idle
//! participants to a synchronous [`BattleCallback`]. The callback answers
//! with a [`BattleSignal`] before the next tick starts. There is no other
//! way for outside logic to interrupt a battle.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::ids::{BuildingId, FleetId, ItemTypeId, PlanetId, PlayerId};
use crate::kinematics::Point;

/// Default tick cap for one battle.
pub const DEFAULT_MAX_TICKS: u32 = 3000;

/// Participant identity within one battle.
pub type ParticipantId = u32;

/// Which side a participant fights on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    /// The fleet that started the battle.
    Attacker,
    /// The planet's owner.
    Defender,
}

impl Side {
    /// The other side.
    #[must_use]
    pub const fn opponent(self) -> Self {
        match self {
            Self::Attacker => Self::Defender,
            Self::Defender => Self::Attacker,
        }
    }
}

/// Space or ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleKind {
    /// Fleet against orbital defences.
    Space,
    /// Ground units against planetary defences.
    Ground,
}

/// Current objective of a participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BattleOrder {
    /// No objective; fires at whatever comes into range.
    Idle,
    /// Move to a point (space) or cell centre (ground).
    MoveTo(Point),
    /// Close in on and destroy a participant.
    Attack(ParticipantId),
}

/// Answer of the decision callback after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleSignal {
    /// Keep fighting.
    Continue,
    /// The given side gives up; everything it still has is lost.
    Surrender(Side),
    /// The given side withdraws with its survivors.
    Flee(Side),
}

/// Where a participant lives in the world, for write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParticipantSource {
    /// One item of a fleet inventory stack.
    FleetItem {
        /// Fleet.
        fleet: FleetId,
        /// Item type.
        item: ItemTypeId,
    },
    /// One item of a planet inventory stack.
    PlanetItem {
        /// Planet.
        planet: PlanetId,
        /// Item type.
        item: ItemTypeId,
    },
    /// A planetary building.
    Building {
        /// Planet.
        planet: PlanetId,
        /// Building.
        building: BuildingId,
    },
}

/// Read-only state of one participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticipantInfo {
    /// Id within the battle.
    pub id: ParticipantId,
    /// Side.
    pub side: Side,
    /// Owner.
    pub owner: PlayerId,
    /// World origin.
    pub source: ParticipantSource,
    /// Position (cell centre on the ground).
    pub position: Point,
    /// Remaining hull.
    pub hit_points: u32,
    /// Damage per volley.
    pub attack: u32,
    /// Whether it can move.
    pub mobile: bool,
    /// Current order.
    pub order: BattleOrder,
}

/// A participant whose world state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Casualty {
    /// World origin.
    pub source: ParticipantSource,
    /// Owner.
    pub owner: PlayerId,
    /// Whether it was destroyed.
    pub destroyed: bool,
    /// Hull left (zero when destroyed).
    pub hit_points: u32,
}

/// Who fights where.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleContext {
    /// Contested planet.
    pub planet: PlanetId,
    /// Attacking fleet.
    pub fleet: FleetId,
    /// Attacking player.
    pub attacker: PlayerId,
    /// Defending player, if the planet is owned.
    pub defender: Option<PlayerId>,
}

/// Why the battle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattleEndReason {
    /// One side has nothing left.
    Annihilation,
    /// A side surrendered.
    Surrender,
    /// A side fled.
    Flee,
    /// The tick cap was reached.
    Timeout,
}

/// Final result handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleOutcome {
    /// Space or ground.
    pub kind: BattleKind,
    /// Participants.
    pub context: BattleContext,
    /// Ticks simulated.
    pub ticks: u32,
    /// Winning side, if any.
    pub winner: Option<Side>,
    /// Defeated side, if any.
    pub defeated: Option<Side>,
    /// Why it ended.
    pub reason: BattleEndReason,
    /// World changes to apply.
    pub casualties: Vec<Casualty>,
    /// Surviving attacker participants.
    pub attacker_survivors: u32,
    /// Surviving defender participants.
    pub defender_survivors: u32,
}

/// Battle state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BattlePhase {
    /// Not started.
    Init,
    /// Ticking.
    Running,
    /// Finished; the outcome is available.
    Done,
}

/// Operations the decision callback may use during a tick.
pub trait BattleCommands {
    /// Living participants in id order.
    fn participants(&self) -> Vec<ParticipantInfo>;

    /// Replace a participant's order. Returns `false` for unknown or dead ids.
    fn issue_order(&mut self, id: ParticipantId, order: BattleOrder) -> bool;

    /// Whether [`BattleSignal::Flee`] is honoured.
    fn supports_retreat(&self) -> bool;
}

/// A concrete battle simulation driven by [`Battle`].
pub trait Battlefield: BattleCommands {
    /// Space or ground.
    fn kind(&self) -> BattleKind;

    /// Who fights where.
    fn context(&self) -> BattleContext;

    /// One-time setup: resolve modifiers for every participant type.
    fn setup(&mut self);

    /// Advance one tick. Returns participants that became idle.
    fn step(&mut self) -> Vec<ParticipantId>;

    /// Living participants on `side`.
    fn remaining(&self, side: Side) -> usize;

    /// World changes so far.
    fn casualties(&self) -> Vec<Casualty>;

    /// Mark every remaining participant of `side` as lost.
    fn surrender(&mut self, side: Side);
}

/// Decision logic consulted by a running battle.
pub trait BattleCallback {
    /// Called once after setup.
    fn on_battle_init(&mut self, _battle: &dyn BattleCommands) {}

    /// Called after every tick with the newly idle participants.
    fn on_battle_tick(&mut self, battle: &mut dyn BattleCommands, idle: &[ParticipantId]) -> BattleSignal;

    /// Called once with the final outcome.
    fn on_battle_done(&mut self, _outcome: &BattleOutcome) {}
}

/// One battle: a battlefield plus its state machine.
#[derive(Debug)]
pub struct Battle<F> {
    field: F,
    phase: BattlePhase,
    ticks: u32,
    max_ticks: u32,
    outcome: Option<BattleOutcome>,
}

impl<F: Battlefield> Battle<F> {
    /// Wrap a battlefield with the default tick cap.
    #[must_use]
    pub fn new(field: F) -> Self {
        Self::with_max_ticks(field, DEFAULT_MAX_TICKS)
    }

    /// Wrap a battlefield with an explicit tick cap.
    #[must_use]
    pub fn with_max_ticks(field: F, max_ticks: u32) -> Self {
        Self {
            field,
            phase: BattlePhase::Init,
            ticks: 0,
            max_ticks,
            outcome: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> BattlePhase {
        self.phase
    }

    /// Ticks simulated.
    #[must_use]
    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    /// The battlefield.
    #[must_use]
    pub fn field(&self) -> &F {
        &self.field
    }

    /// Outcome once done.
    #[must_use]
    pub fn outcome(&self) -> Option<&BattleOutcome> {
        self.outcome.as_ref()
    }

    /// Advance the state machine one step.
    ///
    /// # Errors
    ///
    /// [`GameError::CallbackContract`] when the callback asks for a retreat
    /// the battlefield cannot perform. The battle is then aborted without
    /// an outcome.
    pub fn tick(&mut self, callback: &mut dyn BattleCallback) -> Result<BattlePhase> {
        match self.phase {
            BattlePhase::Done => {}
            BattlePhase::Init => {
                self.field.setup();
                let context = self.field.context();
                tracing::info!(
                    kind = ?self.field.kind(),
                    planet = %context.planet,
                    attacker = %context.attacker,
                    attackers = self.field.remaining(Side::Attacker),
                    defenders = self.field.remaining(Side::Defender),
                    "Battle started"
                );
                callback.on_battle_init(&self.field);
                self.phase = BattlePhase::Running;
                if let Some(side) = self.empty_side() {
                    self.finish(callback, BattleEndReason::Annihilation, side);
                }
            }
            BattlePhase::Running => {
                let idle = self.field.step();
                self.ticks += 1;
                if let Some(side) = self.empty_side() {
                    self.finish(callback, BattleEndReason::Annihilation, side);
                    return Ok(self.phase);
                }
                match callback.on_battle_tick(&mut self.field, &idle) {
                    BattleSignal::Continue => {
                        if self.ticks >= self.max_ticks {
                            // The attacker failed to take the planet in time.
                            self.finish(callback, BattleEndReason::Timeout, Side::Attacker);
                        }
                    }
                    BattleSignal::Surrender(side) => {
                        self.field.surrender(side);
                        self.finish(callback, BattleEndReason::Surrender, side);
                    }
                    BattleSignal::Flee(side) => {
                        if !self.field.supports_retreat() {
                            self.phase = BattlePhase::Done;
                            return Err(GameError::CallbackContract(format!(
                                "{:?} battle cannot honour a retreat by {side:?}",
                                self.field.kind()
                            )));
                        }
                        self.finish(callback, BattleEndReason::Flee, side);
                    }
                }
            }
        }
        Ok(self.phase)
    }

    /// Tick until done and return the outcome.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::tick`] errors.
    pub fn run(&mut self, callback: &mut dyn BattleCallback) -> Result<BattleOutcome> {
        while self.tick(callback)? != BattlePhase::Done {}
        self.outcome
            .clone()
            .ok_or_else(|| GameError::InvalidState("battle finished without an outcome".into()))
    }

    /// Side with no participants left; the attacker if both are empty.
    fn empty_side(&self) -> Option<Side> {
        if self.field.remaining(Side::Attacker) == 0 {
            Some(Side::Attacker)
        } else if self.field.remaining(Side::Defender) == 0 {
            Some(Side::Defender)
        } else {
            None
        }
    }

    fn finish(&mut self, callback: &mut dyn BattleCallback, reason: BattleEndReason, defeated: Side) {
        let winner = match reason {
            BattleEndReason::Timeout => Some(Side::Defender),
            _ if self.field.remaining(defeated.opponent()) > 0 => Some(defeated.opponent()),
            _ => None,
        };
        let defeated = match reason {
            BattleEndReason::Timeout => None,
            _ => Some(defeated),
        };
        let outcome = BattleOutcome {
            kind: self.field.kind(),
            context: self.field.context(),
            ticks: self.ticks,
            winner,
            defeated,
            reason,
            casualties: self.field.casualties(),
            attacker_survivors: self.field.remaining(Side::Attacker) as u32,
            defender_survivors: self.field.remaining(Side::Defender) as u32,
        };
        tracing::info!(
            kind = ?outcome.kind,
            planet = %outcome.context.planet,
            ticks = outcome.ticks,
            ?winner,
            ?reason,
            casualties = outcome.casualties.len(),
            "Battle finished"
        );
        callback.on_battle_done(&outcome);
        self.outcome = Some(outcome);
        self.phase = BattlePhase::Done;
    }
}
