//! What a finished battle leaves behind: the record, roster changes and rewards

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::event::{EndingTone, GameEnd};
use crate::game::start::BattleSize;
use crate::game::state::{AdmiralSummary, GameState};
use crate::game::subplot::{SubplotOutcome, SubplotResult};
use crate::game::types::{PerSide, ShipId, Side};
use crate::util::time::{DRYDOCK_DAMAGED, DRYDOCK_DESTROYED};

const CURRENCY_PER_TONNE: i64 = 10;
const EXPERIENCE_PER_TONNE: i64 = 1;
const VICTORY_CURRENCY: i64 = 50;
const SUBPLOT_CURRENCY: i64 = 100;
const SUBPLOT_EXPERIENCE: i64 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub id: Uuid,
    pub admirals: PerSide<AdmiralSummary>,
    pub battle_size: BattleSize,
    pub winner: Option<Side>,
    pub message: String,
    pub tones: PerSide<EndingTone>,
    pub subplot_outcomes: Vec<SubplotResult>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipFate {
    Destroyed,
    Escaped,
    Damaged,
    Intact,
}

/// Roster change for one ship that took part in the battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipDelta {
    pub ship_id: ShipId,
    pub admiral_id: Uuid,
    pub fate: ShipFate,
    /// When the ship leaves drydock; `None` if it can sail right away
    pub ready_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmiralReward {
    pub admiral_id: Uuid,
    pub currency: i64,
    pub experience: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleResults {
    pub record: BattleRecord,
    pub ship_deltas: Vec<ShipDelta>,
    pub rewards: Vec<AdmiralReward>,
}

fn drydock_until(now: DateTime<Utc>, fate: ShipFate) -> Option<DateTime<Utc>> {
    let stay = match fate {
        ShipFate::Destroyed => DRYDOCK_DESTROYED,
        ShipFate::Damaged => DRYDOCK_DAMAGED,
        ShipFate::Escaped | ShipFate::Intact => return None,
    };
    chrono::Duration::from_std(stay).ok().map(|stay| now + stay)
}

fn ship_deltas(state: &GameState, ended_at: DateTime<Utc>) -> Vec<ShipDelta> {
    let live = state.ships.values().map(|ship| {
        let fate = if ship.hull < ship.durability().max_hull {
            ShipFate::Damaged
        } else {
            ShipFate::Intact
        };
        (ship.id(), ship.owner, fate)
    });
    let lost = state.wrecks.iter().map(|(id, wreck)| {
        let fate = match (wreck.is_escape, wreck.is_damaged()) {
            (false, _) => ShipFate::Destroyed,
            (true, true) => ShipFate::Damaged,
            (true, false) => ShipFate::Escaped,
        };
        (*id, wreck.owner, fate)
    });

    live.chain(lost)
        .filter(|(_, owner, _)| !state.admirals.get(*owner).is_ai)
        .map(|(ship_id, owner, fate)| ShipDelta {
            ship_id,
            admiral_id: state.admirals.get(owner).id,
            fate,
            ready_at: drydock_until(ended_at, fate),
        })
        .collect()
}

fn reward(state: &GameState, end: &GameEnd, side: Side) -> AdmiralReward {
    let destroyed_tonnage: i64 = state
        .wrecks
        .values()
        .filter(|wreck| wreck.owner == side.other() && !wreck.is_escape)
        .map(|wreck| i64::from(wreck.ship.class.weight().tonnage()))
        .sum();
    let subplots_won = end
        .subplot_outcomes
        .iter()
        .filter(|result| result.subplot.player == side && result.outcome == SubplotOutcome::Won)
        .count() as i64;
    let victory = if end.winner == Some(side) {
        VICTORY_CURRENCY
    } else {
        0
    };

    AdmiralReward {
        admiral_id: state.admirals.get(side).id,
        currency: destroyed_tonnage * CURRENCY_PER_TONNE + subplots_won * SUBPLOT_CURRENCY + victory,
        experience: destroyed_tonnage * EXPERIENCE_PER_TONNE + subplots_won * SUBPLOT_EXPERIENCE,
    }
}

/// Everything to persist for a battle. AI admirals get neither deltas nor rewards.
pub fn compile_results(
    session_id: Uuid,
    state: &GameState,
    end: &GameEnd,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> BattleResults {
    let rewards = Side::BOTH
        .into_iter()
        .filter(|side| !state.admirals.get(*side).is_ai)
        .map(|side| reward(state, end, side))
        .collect();

    BattleResults {
        record: BattleRecord {
            id: session_id,
            admirals: state.admirals.clone(),
            battle_size: state.battle.size,
            winner: end.winner,
            message: end.message.clone(),
            tones: end.tones.clone(),
            subplot_outcomes: end.subplot_outcomes.clone(),
            started_at,
            ended_at,
        },
        ship_deltas: ship_deltas(state, ended_at),
        rewards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::event::victory_check;
    use crate::game::ship::ShipClass;
    use crate::game::state::tests::battle;

    #[test]
    fn test_results_skip_ai_and_reward_tonnage() {
        let mut state = battle(&[ShipClass::Sentinel, ShipClass::Picket], &[ShipClass::Warden]);
        state.admirals.host.is_ai = false;

        let picket = state
            .ships_of(Side::Host)
            .find(|ship| ship.class() == ShipClass::Picket)
            .unwrap()
            .id();
        state.destroy_ship(picket);
        let sentinel = state.ships_of(Side::Host).next().unwrap().id();
        state.ships.get_mut(&sentinel).unwrap().hull -= 1;
        let warden = state.ships_of(Side::Guest).next().unwrap().id();
        state.destroy_ship(warden);

        let end = victory_check(&state).unwrap();
        let now = Utc::now();
        let results = compile_results(Uuid::new_v4(), &state, &end, now, now);

        assert_eq!(results.record.winner, Some(Side::Host));
        assert_eq!(results.rewards.len(), 1);
        // a destroyer is 12 kilotonnes
        assert_eq!(results.rewards[0].experience, 12);
        assert_eq!(results.rewards[0].currency, 12 * CURRENCY_PER_TONNE + VICTORY_CURRENCY);

        assert_eq!(results.ship_deltas.len(), 2);
        let fate = |id: ShipId| {
            results
                .ship_deltas
                .iter()
                .find(|delta| delta.ship_id == id)
                .map(|delta| (delta.fate, delta.ready_at.is_some()))
        };
        assert_eq!(fate(picket), Some((ShipFate::Destroyed, true)));
        assert_eq!(fate(sentinel), Some((ShipFate::Damaged, true)));
        assert_eq!(fate(warden), None);
    }
}
