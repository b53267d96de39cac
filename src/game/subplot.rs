//! Secondary per-player objectives

use rand::seq::{IteratorRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::chat::ChatEntry;
use super::ship::ShipModule;
use super::state::GameState;
use super::types::{ShipId, Side};

/// Share of the enemy fleet's points that must be destroyed for No Quarter
pub const NO_QUARTER_THRESHOLD: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubplotType {
    ExtendedDuty,
    NoQuarter,
    Vendetta,
    RecoverInformant,
}

impl SubplotType {
    pub const ALL: [SubplotType; 4] = [
        SubplotType::ExtendedDuty,
        SubplotType::NoQuarter,
        SubplotType::Vendetta,
        SubplotType::RecoverInformant,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubplotKey {
    pub kind: SubplotType,
    pub player: Side,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubplotOutcome {
    Won,
    Lost,
    Undecided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubplotResult {
    pub subplot: SubplotKey,
    pub outcome: SubplotOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subplot {
    /// Start battered; win by losing no ship
    ExtendedDuty { player: Side },
    NoQuarter { player: Side },
    /// Destroy the strongest enemy ship
    Vendetta {
        player: Side,
        target: Option<ShipId>,
    },
    /// Board a chosen enemy ship
    RecoverInformant {
        player: Side,
        target: Option<ShipId>,
        recovered: bool,
        /// Chat entries already inspected
        scanned: usize,
    },
}

impl Subplot {
    pub fn new(kind: SubplotType, player: Side) -> Self {
        match kind {
            SubplotType::ExtendedDuty => Subplot::ExtendedDuty { player },
            SubplotType::NoQuarter => Subplot::NoQuarter { player },
            SubplotType::Vendetta => Subplot::Vendetta {
                player,
                target: None,
            },
            SubplotType::RecoverInformant => Subplot::RecoverInformant {
                player,
                target: None,
                recovered: false,
                scanned: 0,
            },
        }
    }

    pub fn random_for<R: Rng + ?Sized>(player: Side, rng: &mut R) -> Self {
        let kind = *SubplotType::ALL
            .choose(rng)
            .unwrap_or(&SubplotType::NoQuarter);
        Self::new(kind, player)
    }

    pub fn kind(&self) -> SubplotType {
        match self {
            Subplot::ExtendedDuty { .. } => SubplotType::ExtendedDuty,
            Subplot::NoQuarter { .. } => SubplotType::NoQuarter,
            Subplot::Vendetta { .. } => SubplotType::Vendetta,
            Subplot::RecoverInformant { .. } => SubplotType::RecoverInformant,
        }
    }

    pub fn player(&self) -> Side {
        match self {
            Subplot::ExtendedDuty { player }
            | Subplot::NoQuarter { player }
            | Subplot::Vendetta { player, .. }
            | Subplot::RecoverInformant { player, .. } => *player,
        }
    }

    pub fn key(&self) -> SubplotKey {
        SubplotKey {
            kind: self.kind(),
            player: self.player(),
        }
    }

    /// Runs once when deployment ends
    pub fn on_initial_deploy<R: Rng + ?Sized>(&self, state: &mut GameState, rng: &mut R) -> Self {
        match self {
            Subplot::ExtendedDuty { player } => {
                for ship in state.ships.values_mut().filter(|ship| ship.owner == *player) {
                    ship.hull = ship.hull.saturating_sub(1).max(1);
                    let candidates: Vec<ShipModule> = ship
                        .modules
                        .damageable()
                        .into_iter()
                        .filter(|module| *module != ShipModule::Shields)
                        .collect();
                    if let Some(module) = candidates.choose(rng) {
                        ship.modules.damage(module);
                    }
                }
                self.clone()
            }
            Subplot::NoQuarter { .. } => self.clone(),
            Subplot::Vendetta { player, .. } => {
                let target = state
                    .ships
                    .values()
                    .filter(|ship| ship.owner != *player)
                    .max_by(|a, b| {
                        a.ship
                            .point_cost()
                            .cmp(&b.ship.point_cost())
                            .then_with(|| b.id().cmp(&a.id()))
                    })
                    .map(|ship| ship.id());
                Subplot::Vendetta {
                    player: *player,
                    target,
                }
            }
            Subplot::RecoverInformant { player, .. } => {
                let target = state
                    .ships
                    .values()
                    .filter(|ship| ship.owner != *player)
                    .map(|ship| ship.id())
                    .choose(rng);
                Subplot::RecoverInformant {
                    player: *player,
                    target,
                    recovered: false,
                    scanned: state.chat.len(),
                }
            }
        }
    }

    /// Runs after every accepted state change
    pub fn on_state_change(&self, state: &GameState) -> Option<Self> {
        let Subplot::RecoverInformant {
            player,
            target: Some(target),
            recovered: false,
            scanned,
        } = self
        else {
            return None;
        };

        let recovered = state.chat.iter().skip(*scanned).any(|entry| match entry {
            ChatEntry::ShipBoarded { ship, boarder, .. } => {
                ship == target && state.owner_of(*boarder) == Some(*player)
            }
            _ => false,
        });
        Some(Subplot::RecoverInformant {
            player: *player,
            target: Some(*target),
            recovered,
            scanned: state.chat.len(),
        })
    }

    pub fn outcome(&self, state: &GameState) -> SubplotOutcome {
        match self {
            Subplot::ExtendedDuty { player } => {
                let lost_any = state
                    .wrecks
                    .values()
                    .any(|wreck| wreck.owner == *player && !wreck.is_escape);
                if lost_any {
                    SubplotOutcome::Lost
                } else {
                    SubplotOutcome::Won
                }
            }
            Subplot::NoQuarter { player } => {
                let enemy = player.other();
                let total = state.fleet_points(enemy);
                let destroyed: u32 = state
                    .wrecks
                    .values()
                    .filter(|wreck| wreck.owner == enemy && !wreck.is_escape)
                    .map(|wreck| wreck.ship.point_cost())
                    .sum();
                if total == 0 {
                    SubplotOutcome::Undecided
                } else if destroyed as f64 >= NO_QUARTER_THRESHOLD * total as f64 {
                    SubplotOutcome::Won
                } else {
                    SubplotOutcome::Lost
                }
            }
            Subplot::Vendetta { target, .. } => match target {
                None => SubplotOutcome::Undecided,
                Some(id) => match state.wrecks.get(id) {
                    Some(wreck) if !wreck.is_escape => SubplotOutcome::Won,
                    _ => SubplotOutcome::Lost,
                },
            },
            Subplot::RecoverInformant {
                target, recovered, ..
            } => match (target, recovered) {
                (None, _) => SubplotOutcome::Undecided,
                (Some(_), true) => SubplotOutcome::Won,
                (Some(_), false) => SubplotOutcome::Lost,
            },
        }
    }
}

/// Active subplots, at most one per key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubplotSet(Vec<Subplot>);

impl SubplotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the subplot, replacing any with the same key
    pub fn replace(&mut self, subplot: Subplot) {
        let key = subplot.key();
        match self.0.iter_mut().find(|existing| existing.key() == key) {
            Some(existing) => *existing = subplot,
            None => self.0.push(subplot),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subplot> + '_ {
        self.0.iter()
    }
}

pub fn run_initial_deploy_hooks<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) {
    let subplots: Vec<Subplot> = state.subplots.iter().cloned().collect();
    for subplot in subplots {
        let updated = subplot.on_initial_deploy(state, rng);
        state.subplots.replace(updated);
    }
}

pub fn run_state_change_hooks(state: &mut GameState) {
    let updates: Vec<Subplot> = state
        .subplots
        .iter()
        .filter_map(|subplot| subplot.on_state_change(state))
        .collect();
    for subplot in updates {
        state.subplots.replace(subplot);
    }
}

pub fn outcomes(state: &GameState) -> Vec<SubplotResult> {
    state
        .subplots
        .iter()
        .map(|subplot| SubplotResult {
            subplot: subplot.key(),
            outcome: subplot.outcome(state),
        })
        .collect()
}
