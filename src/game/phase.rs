//! Turn structure

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "phase", content = "turn", rename_all = "snake_case")]
pub enum GamePhase {
    Deploy,
    Power(u32),
    Move(u32),
    Attack(u32),
    Repair(u32),
}

impl GamePhase {
    /// The phase that follows this one; only Repair advances the turn
    pub fn next(self) -> Self {
        match self {
            GamePhase::Deploy => GamePhase::Power(1),
            GamePhase::Power(turn) => GamePhase::Move(turn),
            GamePhase::Move(turn) => GamePhase::Attack(turn),
            GamePhase::Attack(turn) => GamePhase::Repair(turn),
            GamePhase::Repair(turn) => GamePhase::Power(turn + 1),
        }
    }

    pub fn turn(self) -> u32 {
        match self {
            GamePhase::Deploy => 0,
            GamePhase::Power(turn)
            | GamePhase::Move(turn)
            | GamePhase::Attack(turn)
            | GamePhase::Repair(turn) => turn,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GamePhase::Deploy => "deploy",
            GamePhase::Power(_) => "power",
            GamePhase::Move(_) => "move",
            GamePhase::Attack(_) => "attack",
            GamePhase::Repair(_) => "repair",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GamePhase::Deploy => f.write_str("deploy"),
            other => write!(f, "{} (turn {})", other.name(), other.turn()),
        }
    }
}
