//! Battle sizes and construction of a fresh game

use std::f64::consts::PI;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::Position;
use super::phase::GamePhase;
use super::pick::PickBoundary;
use super::ship::Ship;
use super::state::{AdmiralSummary, BattleInfo, GameStart, GameState, PlayerStart};
use super::subplot::{Subplot, SubplotSet};
use super::types::{PerSide, Side};

/// Distance from the battlefield's short edge to the middle of a deploy zone
pub const DEPLOY_ZONE_INSET: f64 = 1500.0;
pub const DEPLOY_ZONE_HALF_LENGTH: f64 = 1000.0;

const BACKGROUNDS: [&str; 5] = [
    "nebula_crimson",
    "asteroid_belt",
    "gas_giant_rings",
    "deep_void",
    "shattered_moon",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleSize {
    Skirmish,
    Raid,
    Firefight,
    Battle,
    GrandClash,
    Armageddon,
}

impl BattleSize {
    pub const ALL: [BattleSize; 6] = [
        BattleSize::Skirmish,
        BattleSize::Raid,
        BattleSize::Firefight,
        BattleSize::Battle,
        BattleSize::GrandClash,
        BattleSize::Armageddon,
    ];

    /// Fleet points each side may deploy
    pub fn points(self) -> u32 {
        match self {
            BattleSize::Skirmish => 300,
            BattleSize::Raid => 600,
            BattleSize::Firefight => 1000,
            BattleSize::Battle => 1500,
            BattleSize::GrandClash => 2000,
            BattleSize::Armageddon => 3000,
        }
    }

    /// Battlefield length (x) and width (y)
    pub fn dimensions(self) -> (f64, f64) {
        match self {
            BattleSize::Skirmish => (8000.0, 5000.0),
            BattleSize::Raid => (10000.0, 6000.0),
            BattleSize::Firefight => (12000.0, 7000.0),
            BattleSize::Battle => (14000.0, 8000.0),
            BattleSize::GrandClash => (16000.0, 9000.0),
            BattleSize::Armageddon => (20000.0, 11000.0),
        }
    }

    /// Largest battle an admiral of `rank` may fight
    pub fn max_for_rank(rank: u32) -> BattleSize {
        match rank {
            0 => BattleSize::Raid,
            1 => BattleSize::Firefight,
            2 => BattleSize::Battle,
            3 => BattleSize::GrandClash,
            _ => BattleSize::Armageddon,
        }
    }

    pub fn allowed_for_rank(self, rank: u32) -> bool {
        self <= Self::max_for_rank(rank)
    }

    /// Every size an admiral of `rank` may host or join, smallest first
    pub fn allowed_sizes(rank: u32) -> Vec<BattleSize> {
        Self::ALL
            .into_iter()
            .filter(|size| size.allowed_for_rank(rank))
            .collect()
    }
}

/// One side's participant and the ships they bring
#[derive(Debug, Clone)]
pub struct PlayerSetup {
    pub admiral: AdmiralSummary,
    pub fleet: Vec<Ship>,
}

/// Deploy zone and facing for a side; the guest mirrors the host across x = 0
pub fn deploy_zone(size: BattleSize, side: Side) -> (PickBoundary, f64) {
    let (length, width) = size.dimensions();
    let offset = length / 2.0 - DEPLOY_ZONE_INSET;
    let (x, facing) = match side {
        Side::Host => (-offset, 0.0),
        Side::Guest => (offset, PI),
    };
    let zone = PickBoundary::Rectangle {
        center: Position::new(x, 0.0),
        width2: width / 2.0 - 500.0,
        length2: DEPLOY_ZONE_HALF_LENGTH,
    };
    (zone, facing)
}

pub fn new_game<R: Rng + ?Sized>(
    size: BattleSize,
    host: PlayerSetup,
    guest: PlayerSetup,
    rng: &mut R,
) -> GameState {
    let (length, width) = size.dimensions();

    let mut subplots = SubplotSet::new();
    for (side, setup) in [(Side::Host, &host), (Side::Guest, &guest)] {
        if !setup.admiral.is_ai {
            subplots.replace(Subplot::random_for(side, rng));
        }
    }

    let player_start = |side: Side, fleet: Vec<Ship>| {
        let (deploy_zone, deploy_facing) = deploy_zone(size, side);
        PlayerStart {
            deploy_zone,
            deploy_facing,
            deployable_fleet: fleet.into_iter().map(|ship| (ship.id, ship)).collect(),
        }
    };

    let background = BACKGROUNDS
        .choose(rng)
        .copied()
        .unwrap_or("deep_void")
        .to_string();

    GameState {
        start: GameStart {
            battlefield_length: length,
            battlefield_width: width,
            players: PerSide::new(
                player_start(Side::Host, host.fleet),
                player_start(Side::Guest, guest.fleet),
            ),
        },
        admirals: PerSide::new(host.admiral, guest.admiral),
        battle: BattleInfo { size, background },
        phase: GamePhase::Deploy,
        ready: None,
        ships: Default::default(),
        wrecks: Default::default(),
        chat: Vec::new(),
        subplots,
        initiative: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_zones_mirror() {
        let (host, host_facing) = deploy_zone(BattleSize::Raid, Side::Host);
        let (guest, guest_facing) = deploy_zone(BattleSize::Raid, Side::Guest);
        assert!(host.contains(Position::new(-3500.0, 0.0)));
        assert!(guest.contains(Position::new(3500.0, 0.0)));
        assert!(!host.contains(Position::new(3500.0, 0.0)));
        assert_eq!(host_facing, 0.0);
        assert_eq!(guest_facing, PI);
    }

    #[test]
    fn test_rank_caps_battle_size() {
        assert!(BattleSize::Skirmish.allowed_for_rank(0));
        assert!(BattleSize::Raid.allowed_for_rank(0));
        assert!(!BattleSize::Firefight.allowed_for_rank(0));
        assert!(BattleSize::Armageddon.allowed_for_rank(7));
    }
}
