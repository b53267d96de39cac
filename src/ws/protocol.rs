//! WebSocket frame definitions
//! One JSON message per text frame, tagged by `type`

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::start::BattleSize;
use crate::game::state::AdmiralSummary;
use crate::game::types::Side;
use crate::matchmaking::{JoinRequest, OpenGame};

/// What an admiral wants to do in the lobby
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LobbyRole {
    /// Advertise a game and wait for joiners
    Host { size: BattleSize },
    /// Browse open games and ask to join one
    Join,
    /// Play against a generated fleet
    Training { size: BattleSize },
}

/// Lobby messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyClientMsg {
    Login { admiral: Uuid, role: LobbyRole },

    /// Host's answer to the last `join_request`
    JoinResponse { accepted: bool },

    SelectGame { invitation: Uuid },

    RefreshGames,
}

/// Lobby messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LobbyServerMsg {
    Welcome {
        admiral: Uuid,
        name: String,
        rank: u32,
        ready_ships: usize,
        /// Battle sizes this admiral's rank may host or join
        allowed_sizes: Vec<BattleSize>,
        server_time: u64,
    },

    Hosting {
        invitation: Uuid,
        size: BattleSize,
    },

    JoinRequest {
        #[serde(flatten)]
        request: JoinRequest,
    },

    OpenGames {
        games: Vec<OpenGame>,
    },

    JoinRejected {
        invitation: Uuid,
    },

    /// The joiner left before the host answered
    JoinWithdrawn {
        admiral: Uuid,
    },

    /// Open `/ws/game?token=...` next
    GameReady {
        session: Uuid,
        token: String,
    },
}

/// First frame on a game socket, before any game events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeginNotice {
    pub session: Uuid,
    pub side: Side,
    pub opponent: AdmiralSummary,
}

/// Connection-ending protocol violations
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unexpected frame: expected {0}")]
    Unexpected(&'static str),

    #[error("Binary frames are not supported")]
    BinaryFrame,

    #[error("Clients cannot send synthetic actions")]
    SyntheticAction,

    #[error("Connection closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::event::PlayerAction;

    #[test]
    fn test_login_frame_parses() {
        let admiral = Uuid::new_v4();
        let json = format!(
            r#"{{"type":"login","admiral":"{}","role":{{"kind":"host","size":"raid"}}}}"#,
            admiral
        );
        let msg: LobbyClientMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(
            msg,
            LobbyClientMsg::Login {
                admiral,
                role: LobbyRole::Host {
                    size: BattleSize::Raid
                },
            }
        );

        let refresh: LobbyClientMsg = serde_json::from_str(r#"{"type":"refresh_games"}"#).unwrap();
        assert_eq!(refresh, LobbyClientMsg::RefreshGames);
    }

    #[test]
    fn test_server_frames_are_tagged() {
        let msg = LobbyServerMsg::GameReady {
            session: Uuid::nil(),
            token: "abc.def".to_string(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "game_ready");
        assert_eq!(value["token"], "abc.def");

        let request = LobbyServerMsg::JoinRequest {
            request: JoinRequest {
                admiral: Uuid::nil(),
                name: "Ro".to_string(),
                rank: 2,
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "join_request");
        assert_eq!(value["name"], "Ro");

        let withdrawn = serde_json::to_value(LobbyServerMsg::JoinWithdrawn {
            admiral: Uuid::nil(),
        })
        .unwrap();
        assert_eq!(withdrawn["type"], "join_withdrawn");
    }

    #[test]
    fn test_player_action_frames() {
        let chat: PlayerAction =
            serde_json::from_str(r#"{"type":"send_chat_message","message":"o7"}"#).unwrap();
        assert!(!chat.is_synthetic());

        let timeout: PlayerAction = serde_json::from_str(r#"{"type":"time_out"}"#).unwrap();
        assert!(timeout.is_synthetic());

        assert!(serde_json::from_str::<PlayerAction>(r#"{"type":"launch_nukes"}"#).is_err());
    }
}
