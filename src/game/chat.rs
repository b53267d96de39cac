//! Battle log entries

use serde::{Deserialize, Serialize};

use super::combat::CriticalEffect;
use super::ship::ShipModule;
use super::types::{ShipId, Side, WeaponId};

/// Longest player message kept in the log
pub const MAX_CHAT_MESSAGE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShipAttacker {
    EnemyShip { id: ShipId },
    Bombers,
    Fire,
    BoardingParty { id: ShipId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEntry {
    PlayerMessage {
        sender: Side,
        message: String,
        sent_at: u64,
    },
    ShipIdentified {
        ship: ShipId,
        sent_at: u64,
    },
    ShipEscaped {
        ship: ShipId,
        sent_at: u64,
    },
    ShipAttacked {
        ship: ShipId,
        attacker: ShipAttacker,
        sent_at: u64,
        damage_inflicted: u32,
        weapon: Option<WeaponId>,
        critical: Option<CriticalEffect>,
    },
    ShipAttackFailed {
        ship: ShipId,
        attacker: ShipAttacker,
        sent_at: u64,
        weapon: Option<WeaponId>,
    },
    ShipBoarded {
        ship: ShipId,
        boarder: ShipId,
        sent_at: u64,
        damage_inflicted: u32,
        module_damaged: Option<ShipModule>,
    },
    ShipDestroyed {
        ship: ShipId,
        sent_at: u64,
    },
}

/// Trims a player message to something storable; `None` if nothing is left
pub fn sanitize_message(message: &str) -> Option<String> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_CHAT_MESSAGE_LEN).collect())
}
