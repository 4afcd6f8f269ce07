//! Default battle decision logic.

use super::orchestrator::{
    BattleCallback, BattleCommands, BattleOrder, BattleOutcome, BattleSignal, ParticipantId,
    ParticipantInfo, Side,
};

/// Attacker strength ratio below which the fleet withdraws.
pub const DEFAULT_FLEE_RATIO: f64 = 0.25;

/// Drives both sides of a battle without outside input.
///
/// Idle mobile armed participants are sent at the nearest enemy. Where the
/// battlefield allows retreat, the attacker flees once its strength drops
/// below `flee_ratio` of the defender's.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoBattleAi {
    /// Strength ratio that triggers a retreat; zero never flees.
    pub flee_ratio: f64,
    ticks_seen: u32,
}

impl Default for AutoBattleAi {
    fn default() -> Self {
        Self::new(DEFAULT_FLEE_RATIO)
    }
}

impl AutoBattleAi {
    /// AI with an explicit flee ratio.
    #[must_use]
    pub fn new(flee_ratio: f64) -> Self {
        Self {
            flee_ratio,
            ticks_seen: 0,
        }
    }

    /// Ticks this AI has been consulted for.
    #[must_use]
    pub fn ticks_seen(&self) -> u32 {
        self.ticks_seen
    }
}

/// Strength of one side: hull plus firepower.
fn strength(participants: &[ParticipantInfo], side: Side) -> f64 {
    participants
        .iter()
        .filter(|p| p.side == side)
        .map(|p| f64::from(p.hit_points) + f64::from(p.attack))
        .sum()
}

/// Nearest participant of the other side; ties go to the lower id.
fn nearest_enemy(me: &ParticipantInfo, participants: &[ParticipantInfo]) -> Option<ParticipantId> {
    participants
        .iter()
        .filter(|p| p.side != me.side)
        .map(|p| (p.id, me.position.distance(p.position)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(id, _)| id)
}

impl BattleCallback for AutoBattleAi {
    fn on_battle_init(&mut self, battle: &dyn BattleCommands) {
        self.ticks_seen = 0;
        tracing::debug!(participants = battle.participants().len(), "Battle AI engaged");
    }

    fn on_battle_tick(&mut self, battle: &mut dyn BattleCommands, idle: &[ParticipantId]) -> BattleSignal {
        self.ticks_seen += 1;
        let participants = battle.participants();

        if self.flee_ratio > 0.0 && battle.supports_retreat() {
            let attacker = strength(&participants, Side::Attacker);
            let defender = strength(&participants, Side::Defender);
            if attacker < defender * self.flee_ratio {
                tracing::info!(attacker, defender, "Attacker retreats");
                return BattleSignal::Flee(Side::Attacker);
            }
        }

        for &id in idle {
            let Some(me) = participants.iter().find(|p| p.id == id) else {
                continue;
            };
            if !me.mobile || me.attack == 0 {
                continue;
            }
            if let Some(enemy) = nearest_enemy(me, &participants) {
                battle.issue_order(id, BattleOrder::Attack(enemy));
            }
        }
        BattleSignal::Continue
    }

    fn on_battle_done(&mut self, outcome: &BattleOutcome) {
        tracing::debug!(ticks = self.ticks_seen, winner = ?outcome.winner, "Battle AI released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::fixtures;
    use crate::combat::orchestrator::{Battle, BattleEndReason, ParticipantSource};
    use crate::combat::space::SpaceBattle;
    use crate::ids::{FleetId, ItemTypeId, PlayerId};
    use crate::kinematics::Point;

    /// Fixed participant list that records orders.
    struct Board {
        participants: Vec<ParticipantInfo>,
        orders: Vec<(ParticipantId, BattleOrder)>,
        retreat: bool,
    }

    impl BattleCommands for Board {
        fn participants(&self) -> Vec<ParticipantInfo> {
            self.participants.clone()
        }

        fn issue_order(&mut self, id: ParticipantId, order: BattleOrder) -> bool {
            self.orders.push((id, order));
            true
        }

        fn supports_retreat(&self) -> bool {
            self.retreat
        }
    }

    fn info(id: ParticipantId, side: Side, x: f64, hit_points: u32, mobile: bool) -> ParticipantInfo {
        ParticipantInfo {
            id,
            side,
            owner: PlayerId(if side == Side::Attacker { 1 } else { 2 }),
            source: ParticipantSource::FleetItem {
                fleet: FleetId(1),
                item: ItemTypeId(1),
            },
            position: Point::new(x, 0.0),
            hit_points,
            attack: 5,
            mobile,
            order: BattleOrder::Idle,
        }
    }

    #[test]
    fn test_idle_units_attack_nearest() {
        let mut board = Board {
            participants: vec![
                info(0, Side::Attacker, 0.0, 50, true),
                info(1, Side::Defender, 300.0, 50, true),
                info(2, Side::Defender, 100.0, 50, false),
                info(3, Side::Defender, 100.0, 50, true),
            ],
            orders: Vec::new(),
            retreat: true,
        };
        let mut ai = AutoBattleAi::default();
        assert_eq!(ai.on_battle_tick(&mut board, &[0, 2, 3]), BattleSignal::Continue);
        // The static gun keeps firing at whatever comes close.
        assert_eq!(board.orders, vec![(0, BattleOrder::Attack(2)), (3, BattleOrder::Attack(0))]);
    }

    #[test]
    fn test_flees_only_where_retreat_exists() {
        let participants = vec![
            info(0, Side::Attacker, 0.0, 10, true),
            info(1, Side::Defender, 100.0, 500, true),
        ];
        let mut ai = AutoBattleAi::default();
        let mut space = Board {
            participants: participants.clone(),
            orders: Vec::new(),
            retreat: true,
        };
        assert_eq!(ai.on_battle_tick(&mut space, &[]), BattleSignal::Flee(Side::Attacker));

        let mut ground = Board {
            participants,
            orders: Vec::new(),
            retreat: false,
        };
        assert_eq!(ai.on_battle_tick(&mut ground, &[0]), BattleSignal::Continue);
        assert_eq!(ground.orders.len(), 1);
    }

    #[test]
    fn test_outnumbered_fleet_withdraws() {
        let world = fixtures::world(1, 0);
        let field = SpaceBattle::from_world(&world, fixtures::FLEET, fixtures::PLANET, 3).expect("battle");
        let mut battle = Battle::new(field);
        let outcome = battle.run(&mut AutoBattleAi::new(0.5)).expect("runs");
        assert_eq!(outcome.reason, BattleEndReason::Flee);
        assert_eq!(outcome.winner, Some(Side::Defender));
        assert_eq!(outcome.context.planet, fixtures::PLANET);
    }
}
