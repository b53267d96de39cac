//! What a player sends and what the engine answers

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::ability::{finish_on_server, PlayerAbilityData, PlayerAbilityType};
use super::chat::{sanitize_message, ChatEntry};
use super::state::{BattleOutcome, GameState};
use super::subplot::{outcomes, SubplotResult};
use super::types::{PerSide, Side};
use crate::util::time::unix_millis;

/// Share of a fleet whose loss turns a victory pyrrhic, or a defeat heroic
const HEAVY_LOSS_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    StateChange { state: Box<GameState> },
    InvalidAction { message: String },
    GameEnd(GameEnd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndingTone {
    GloriousVictory,
    Victory,
    PyrrhicVictory,
    HeroicDefeat,
    Defeat,
    HumiliatingDefeat,
    Stalemate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEnd {
    pub winner: Option<Side>,
    pub message: String,
    pub subplot_outcomes: Vec<SubplotResult>,
    pub tones: PerSide<EndingTone>,
}

impl GameEnd {
    pub fn new(state: &GameState, winner: Option<Side>, message: impl Into<String>) -> Self {
        Self {
            winner,
            message: message.into(),
            subplot_outcomes: outcomes(state),
            tones: PerSide::from_fn(|side| ending_tone(state, winner, side)),
        }
    }

    /// End of a battle decided on the battlefield
    pub fn from_outcome(state: &GameState, outcome: BattleOutcome) -> Self {
        match outcome {
            BattleOutcome::Victory(side) => {
                let name = &state.admirals.get(side).name;
                Self::new(
                    state,
                    Some(side),
                    format!("{} holds the field; the enemy fleet is gone", name),
                )
            }
            BattleOutcome::Stalemate => Self::new(
                state,
                None,
                "Neither fleet survived. The battlefield belongs to the dead.",
            ),
        }
    }
}

/// Point share of `side`'s fleet destroyed, escapes excluded
fn lost_fraction(state: &GameState, side: Side) -> f64 {
    let total = state.fleet_points(side);
    if total == 0 {
        return 0.0;
    }
    let lost: u32 = state
        .wrecks
        .values()
        .filter(|wreck| wreck.owner == side && !wreck.is_escape)
        .map(|wreck| wreck.ship.point_cost())
        .sum();
    lost as f64 / total as f64
}

pub fn ending_tone(state: &GameState, winner: Option<Side>, side: Side) -> EndingTone {
    match winner {
        None => EndingTone::Stalemate,
        Some(winner) if winner == side => {
            let lost = lost_fraction(state, side);
            if lost == 0.0 {
                EndingTone::GloriousVictory
            } else if lost >= HEAVY_LOSS_FRACTION {
                EndingTone::PyrrhicVictory
            } else {
                EndingTone::Victory
            }
        }
        Some(_) => {
            let inflicted = lost_fraction(state, side.other());
            if inflicted >= HEAVY_LOSS_FRACTION {
                EndingTone::HeroicDefeat
            } else if inflicted == 0.0 {
                EndingTone::HumiliatingDefeat
            } else {
                EndingTone::Defeat
            }
        }
    }
}

/// Something a side does to a running game. `TimeOut` and `Disconnect` are
/// raised by the server and never accepted from a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAction {
    UseAbility {
        ability: PlayerAbilityType,
        data: PlayerAbilityData,
    },
    SendChatMessage { message: String },
    TimeOut,
    Disconnect,
}

impl PlayerAction {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, PlayerAction::TimeOut | PlayerAction::Disconnect)
    }
}

/// Applies one action from `side`. Victory is not checked here.
pub fn resolve_action<R: Rng + ?Sized>(
    state: &GameState,
    side: Side,
    action: &PlayerAction,
    rng: &mut R,
) -> GameEvent {
    match action {
        PlayerAction::UseAbility { ability, data } => {
            finish_on_server(state, side, ability, data, rng)
        }
        PlayerAction::SendChatMessage { message } => match sanitize_message(message) {
            Some(message) => {
                let mut next = state.clone();
                next.log(ChatEntry::PlayerMessage {
                    sender: side,
                    message,
                    sent_at: unix_millis(),
                });
                GameEvent::StateChange {
                    state: Box::new(next),
                }
            }
            None => GameEvent::InvalidAction {
                message: "cannot send an empty message".to_string(),
            },
        },
        PlayerAction::TimeOut => {
            let absent = &state.admirals.get(side).name;
            GameEvent::GameEnd(GameEnd::new(
                state,
                Some(side.other()),
                format!("{} never arrived at the battle", absent),
            ))
        }
        PlayerAction::Disconnect => {
            let deserter = &state.admirals.get(side).name;
            GameEvent::GameEnd(GameEnd::new(
                state,
                Some(side.other()),
                format!("{} abandoned the battle", deserter),
            ))
        }
    }
}

/// Game end for a state that has just changed, if the battle is decided
pub fn victory_check(state: &GameState) -> Option<GameEnd> {
    state
        .check_victory()
        .map(|outcome| GameEnd::from_outcome(state, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ship::ShipClass;
    use crate::game::state::tests::battle;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_tones() {
        let mut state = battle(
            &[ShipClass::Bastion, ShipClass::Picket],
            &[ShipClass::Warden, ShipClass::Needle],
        );
        let guests: Vec<_> = state.ships_of(Side::Guest).map(|s| s.id()).collect();
        for id in guests {
            state.destroy_ship(id);
        }
        let end = victory_check(&state).unwrap();
        assert_eq!(end.winner, Some(Side::Host));
        assert_eq!(end.tones.host, EndingTone::GloriousVictory);
        assert_eq!(end.tones.guest, EndingTone::HumiliatingDefeat);

        // losing the 300 point flagship out of 350 is a pyrrhic win
        let bastion = state
            .ships_of(Side::Host)
            .find(|s| s.class() == ShipClass::Bastion)
            .unwrap()
            .id();
        state.destroy_ship(bastion);
        assert_eq!(ending_tone(&state, Some(Side::Host), Side::Host), EndingTone::PyrrhicVictory);
        assert_eq!(ending_tone(&state, Some(Side::Host), Side::Guest), EndingTone::HeroicDefeat);
        assert_eq!(ending_tone(&state, None, Side::Guest), EndingTone::Stalemate);
    }

    #[test]
    fn test_timeout_credits_the_other_side() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let state = battle(&[ShipClass::Picket], &[ShipClass::Needle]);
        match resolve_action(&state, Side::Guest, &PlayerAction::TimeOut, &mut rng) {
            GameEvent::GameEnd(end) => {
                assert_eq!(end.winner, Some(Side::Host));
                assert!(end.message.contains("never arrived"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chat_message_is_logged() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let state = battle(&[ShipClass::Picket], &[ShipClass::Needle]);
        let action = PlayerAction::SendChatMessage {
            message: "  hold the line ".to_string(),
        };
        let GameEvent::StateChange { state: next } =
            resolve_action(&state, Side::Host, &action, &mut rng)
        else {
            panic!("chat rejected");
        };
        assert!(matches!(
            next.chat.last(),
            Some(ChatEntry::PlayerMessage { sender: Side::Host, message, .. }) if message == "hold the line"
        ));

        let blank = PlayerAction::SendChatMessage {
            message: "   ".to_string(),
        };
        assert!(matches!(
            resolve_action(&state, Side::Host, &blank, &mut rng),
            GameEvent::InvalidAction { .. }
        ));
    }

    #[test]
    fn test_action_wire_format() {
        let json = r#"{"type":"use_ability","ability":{"type":"done_phase","phase":{"phase":"power","turn":1}},"data":{"type":"done_phase"}}"#;
        let action: PlayerAction = serde_json::from_str(json).unwrap();
        assert!(!action.is_synthetic());
        assert!(PlayerAction::Disconnect.is_synthetic());
    }
}
