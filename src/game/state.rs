//! The immutable battle snapshot and its phase machine

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chat::ChatEntry;
use super::combat::{resolve_fires, resolve_strike_craft};
use super::instance::{ShipInstance, ShipWreck};
use super::phase::GamePhase;
use super::physics::sensor_sweep;
use super::pick::PickBoundary;
use super::ship::Ship;
use super::start::BattleSize;
use super::subplot::{run_initial_deploy_hooks, SubplotSet};
use super::types::{PerSide, ShipId, Side};
use crate::util::time::unix_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmiralSummary {
    pub id: Uuid,
    pub name: String,
    pub is_ai: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStart {
    pub deploy_zone: PickBoundary,
    pub deploy_facing: f64,
    pub deployable_fleet: BTreeMap<ShipId, Ship>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStart {
    pub battlefield_length: f64,
    pub battlefield_width: f64,
    pub players: PerSide<PlayerStart>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleInfo {
    pub size: BattleSize,
    pub background: String,
}

/// How a finished battle came out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattleOutcome {
    Victory(Side),
    Stalemate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub start: GameStart,
    pub admirals: PerSide<AdmiralSummary>,
    pub battle: BattleInfo,
    pub phase: GamePhase,
    /// The side that has finished the current phase, if any
    pub ready: Option<Side>,
    pub ships: BTreeMap<ShipId, ShipInstance>,
    pub wrecks: BTreeMap<ShipId, ShipWreck>,
    pub chat: Vec<ChatEntry>,
    pub subplots: SubplotSet,
    pub initiative: Option<Side>,
}

impl GameState {
    pub fn log(&mut self, entry: ChatEntry) {
        self.chat.push(entry);
    }

    pub fn turn(&self) -> u32 {
        self.phase.turn()
    }

    pub fn ships_of(&self, side: Side) -> impl Iterator<Item = &ShipInstance> + '_ {
        self.ships.values().filter(move |ship| ship.owner == side)
    }

    pub fn owner_of(&self, id: ShipId) -> Option<Side> {
        self.ships
            .get(&id)
            .map(|ship| ship.owner)
            .or_else(|| self.wrecks.get(&id).map(|wreck| wreck.owner))
    }

    /// Points of everything a side brought into battle
    pub fn fleet_points(&self, side: Side) -> u32 {
        let live: u32 = self.ships_of(side).map(|ship| ship.ship.point_cost()).sum();
        let lost: u32 = self
            .wrecks
            .values()
            .filter(|wreck| wreck.owner == side)
            .map(|wreck| wreck.ship.point_cost())
            .sum();
        live + lost
    }

    /// Deployment points left for a side
    pub fn remaining_budget(&self, side: Side) -> u32 {
        let deployed: u32 = self.ships_of(side).map(|ship| ship.ship.point_cost()).sum();
        self.battle.size.points().saturating_sub(deployed)
    }

    /// Roster ships of a side not yet placed on the battlefield
    pub fn undeployed(&self, side: Side) -> impl Iterator<Item = &Ship> + '_ {
        self.start
            .players
            .get(side)
            .deployable_fleet
            .values()
            .filter(move |ship| !self.ships.contains_key(&ship.id))
    }

    /// Moves a live ship to the wreck list
    pub fn destroy_ship(&mut self, id: ShipId) -> bool {
        let Some(ship) = self.ships.remove(&id) else {
            return false;
        };
        let turn = self.turn();
        self.wrecks
            .insert(id, ShipWreck::from_instance(&ship, false, turn));
        self.log(ChatEntry::ShipDestroyed {
            ship: id,
            sent_at: unix_millis(),
        });
        true
    }

    pub fn can_finish_phase(&self, side: Side) -> bool {
        match self.phase {
            GamePhase::Deploy => {
                let budget = self.remaining_budget(side);
                !self.undeployed(side).any(|ship| ship.point_cost() <= budget)
            }
            GamePhase::Move(_) => !self.ships_of(side).any(|ship| ship.is_awaiting_move()),
            _ => true,
        }
    }

    /// Whether initiative currently holds `side` back from acting
    pub fn is_waiting_for_initiative(&self, side: Side) -> bool {
        let Some(holder) = self.initiative else {
            return false;
        };
        match self.phase {
            GamePhase::Move(_) => {
                side == holder
                    && self.ready != Some(side.other())
                    && self.ships_of(side.other()).any(|ship| ship.is_awaiting_move())
            }
            GamePhase::Attack(_) => side != holder && self.ready != Some(holder),
            _ => false,
        }
    }

    /// Records that `side` is done; the second side to finish ends the phase
    pub fn after_player_ready<R: Rng + ?Sized>(&mut self, side: Side, rng: &mut R) {
        match self.ready {
            Some(ready) if ready == side => {}
            Some(_) => self.after_phase(rng),
            None => self.ready = Some(side),
        }
    }

    pub fn after_phase<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let finished = self.phase;
        self.phase = finished.next();
        self.ready = None;

        match finished {
            GamePhase::Deploy => {
                run_initial_deploy_hooks(self, rng);
                sensor_sweep(self);
            }
            GamePhase::Power(_) | GamePhase::Move(_) => {
                self.initiative = self.calculate_initiative();
            }
            GamePhase::Attack(_) => {
                resolve_strike_craft(self, rng);
                resolve_fires(self, rng);
                for ship in self.ships.values_mut() {
                    ship.reset_for_new_turn();
                }
            }
            GamePhase::Repair(_) => {
                for ship in self.ships.values_mut() {
                    ship.restore_wings();
                }
            }
        }

        for ship in self.ships.values_mut() {
            ship.is_done = false;
        }
    }

    /// Side with the stronger weighted fleet, none on a tie
    pub fn calculate_initiative(&self) -> Option<Side> {
        let strength = |side: Side| -> f64 {
            self.ships_of(side)
                .map(|ship| ship.initiative_weight())
                .sum()
        };
        let host = strength(Side::Host);
        let guest = strength(Side::Guest);
        if (host - guest).abs() < 1e-9 {
            None
        } else if host > guest {
            Some(Side::Host)
        } else {
            Some(Side::Guest)
        }
    }

    pub fn check_victory(&self) -> Option<BattleOutcome> {
        if self.phase == GamePhase::Deploy {
            return None;
        }
        let host_alive = self.ships_of(Side::Host).next().is_some();
        let guest_alive = self.ships_of(Side::Guest).next().is_some();
        match (host_alive, guest_alive) {
            (false, false) => Some(BattleOutcome::Stalemate),
            (true, false) => Some(BattleOutcome::Victory(Side::Host)),
            (false, true) => Some(BattleOutcome::Victory(Side::Guest)),
            (true, true) => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::game::geometry::Position;
    use crate::game::ship::{ShipClass, ShipModule};
    use crate::game::start::{new_game, PlayerSetup};
    use crate::game::types::WeaponId;
    use crate::game::weapons::WeaponState;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    pub(crate) fn setup(name: &str, classes: &[ShipClass]) -> PlayerSetup {
        PlayerSetup {
            admiral: AdmiralSummary {
                id: Uuid::new_v4(),
                name: name.to_string(),
                is_ai: true,
            },
            fleet: classes
                .iter()
                .enumerate()
                .map(|(i, class)| Ship::new(format!("{} {}", name, i + 1), *class))
                .collect(),
        }
    }

    /// A skirmish with the given fleets placed by hand, already past deployment
    pub(crate) fn battle(host: &[ShipClass], guest: &[ShipClass]) -> GameState {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut state = new_game(
            BattleSize::Armageddon,
            setup("Host", host),
            setup("Guest", guest),
            &mut rng,
        );
        for side in Side::BOTH {
            let start = state.start.players.get(side).clone();
            let x = if side == Side::Host { -1000.0 } else { 1000.0 };
            for (i, ship) in start.deployable_fleet.values().enumerate() {
                let position = Position::new(x, i as f64 * 600.0);
                let instance = ShipInstance::new(ship.clone(), side, position, start.deploy_facing);
                state.ships.insert(ship.id, instance);
            }
        }
        state.phase = GamePhase::Power(1);
        state
    }

    #[test]
    fn test_phase_needs_both_sides() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut state = battle(&[ShipClass::Sentinel], &[ShipClass::Hammer]);
        state.after_player_ready(Side::Host, &mut rng);
        assert_eq!(state.phase, GamePhase::Power(1));
        assert_eq!(state.ready, Some(Side::Host));
        state.after_player_ready(Side::Host, &mut rng);
        assert_eq!(state.ready, Some(Side::Host));
        state.after_player_ready(Side::Guest, &mut rng);
        assert_eq!(state.phase, GamePhase::Move(1));
        assert_eq!(state.ready, None);
    }

    #[test]
    fn test_attack_to_repair_resets_turn_state() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        state.phase = GamePhase::Attack(1);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        let guest = state.ships_of(Side::Guest).next().unwrap().id();

        {
            let ship = state.ships.get_mut(&id).unwrap();
            ship.weapon_power = 0;
            ship.shield_power = 1;
            ship.used_repair_tokens = 2;
            ship.used_armaments.insert(WeaponId::new("bow_cannons"));
            ship.used_armaments.insert(WeaponId::new("fighter_bay"));
            ship.has_sent_boarding_party = true;
            ship.is_done = true;
            ship.fighter_wings.push(crate::game::instance::ShipHangarWing {
                ship: id,
                hangar: WeaponId::new("fighter_bay"),
            });
            if let Some(bay) = ship.armaments.get_mut(&WeaponId::new("fighter_bay")) {
                bay.state = WeaponState::Wing { health: 0.25 };
            }
        }
        state.ships.get_mut(&guest).unwrap().is_done = true;

        state.after_phase(&mut rng);
        assert_eq!(state.phase, GamePhase::Repair(1));

        let ship = &state.ships[&id];
        assert_eq!(ship.weapon_power, ship.power_mode.weapons);
        assert_eq!(ship.shield_power, ship.power_mode.shields);
        assert_eq!(ship.used_repair_tokens, 0);
        assert!(ship.used_armaments.is_empty());
        assert!(ship.fighter_wings.is_empty());
        assert!(!ship.has_sent_boarding_party);
        assert!(!ship.is_done);
        assert!(!state.ships[&guest].is_done);
        // wings come back at full strength only once repairs are over
        assert_eq!(
            ship.armaments[&WeaponId::new("fighter_bay")].wing_health(),
            0.25
        );

        state.after_phase(&mut rng);
        assert_eq!(state.phase, GamePhase::Power(2));
        assert_eq!(
            state.ships[&id].armaments[&WeaponId::new("fighter_bay")].wing_health(),
            1.0
        );
    }

    #[test]
    fn test_shields_stay_down_after_reset_when_module_is_damaged() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        state.phase = GamePhase::Attack(1);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        state
            .ships
            .get_mut(&id)
            .unwrap()
            .modules
            .damage(&ShipModule::Shields);
        state.after_phase(&mut rng);
        assert_eq!(state.ships[&id].shield_power, 0);
    }

    #[test]
    fn test_victory_check() {
        let mut state = battle(&[ShipClass::Picket], &[ShipClass::Needle]);
        assert_eq!(state.check_victory(), None);
        let guest = state.ships_of(Side::Guest).next().unwrap().id();
        assert!(state.destroy_ship(guest));
        assert!(!state.destroy_ship(guest));
        assert_eq!(state.check_victory(), Some(BattleOutcome::Victory(Side::Host)));

        let host = state.ships_of(Side::Host).next().unwrap().id();
        state.destroy_ship(host);
        assert_eq!(state.check_victory(), Some(BattleOutcome::Stalemate));

        state.phase = GamePhase::Deploy;
        assert_eq!(state.check_victory(), None);
    }

    #[test]
    fn test_initiative_and_gating() {
        let mut state = battle(&[ShipClass::Bastion], &[ShipClass::Picket]);
        assert_eq!(state.calculate_initiative(), Some(Side::Host));
        state.initiative = Some(Side::Host);

        state.phase = GamePhase::Move(1);
        assert!(state.is_waiting_for_initiative(Side::Host));
        assert!(!state.is_waiting_for_initiative(Side::Guest));
        for ship in state.ships.values_mut().filter(|s| s.owner == Side::Guest) {
            ship.is_done = true;
        }
        assert!(!state.is_waiting_for_initiative(Side::Host));

        state.phase = GamePhase::Attack(1);
        assert!(state.is_waiting_for_initiative(Side::Guest));
        state.ready = Some(Side::Host);
        assert!(!state.is_waiting_for_initiative(Side::Guest));
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut state = battle(&[ShipClass::Sentinel, ShipClass::Hive], &[ShipClass::Eclipse]);
        state.log(ChatEntry::PlayerMessage {
            sender: Side::Guest,
            message: "for the Veil".to_string(),
            sent_at: 1,
        });
        state.after_phase(&mut rng);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        state.ships.get_mut(&id).unwrap().facing = 0.1 + 0.2;
        state.ships.get_mut(&id).unwrap().modules.damage(&ShipModule::Turrets);

        let json = serde_json::to_string(&state).unwrap();
        let back: GameState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
