//! Player abilities: what a side may do, how a client gathers the details,
//! and the server's authoritative resolution.

use std::future::Future;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::combat::{self, BOARDING_RANGE};
use super::event::GameEvent;
use super::geometry::Position;
use super::instance::ShipInstance;
use super::phase::GamePhase;
use super::physics::{relocate_ship, PhysicsSystem};
use super::pick::{is_valid_pick, PickBoundary, PickRequest, PickResponse};
use super::ship::{ReactorSpec, ShipModule, ShipPowerMode};
use super::state::GameState;
use super::subplot::run_state_change_hooks;
use super::types::{ShipId, Side, WeaponId};
use super::weapons::{all_arcs, WeaponTarget};

/// Identifies one concrete action a side could take
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAbilityType {
    DonePhase { phase: GamePhase },
    DeployShip { ship: ShipId },
    UndeployShip { ship: ShipId },
    ConfigurePower { ship: ShipId },
    DistributePower { ship: ShipId },
    MoveShip { ship: ShipId },
    UseInertialessDrive { ship: ShipId },
    ChargeLance { ship: ShipId, weapon: WeaponId },
    UseWeapon { ship: ShipId, weapon: WeaponId },
    RecallStrikeCraft { ship: ShipId, hangar: WeaponId },
    AreaPulse { ship: ShipId },
    BoardingParty { ship: ShipId },
    RepairModule { ship: ShipId, module: ShipModule },
    ExtinguishFire { ship: ShipId },
    RecoalesceHull { ship: ShipId },
}

impl PlayerAbilityType {
    pub fn ship(&self) -> Option<ShipId> {
        use PlayerAbilityType::*;
        match self {
            DonePhase { .. } => None,
            DeployShip { ship }
            | UndeployShip { ship }
            | ConfigurePower { ship }
            | DistributePower { ship }
            | MoveShip { ship }
            | UseInertialessDrive { ship }
            | ChargeLance { ship, .. }
            | UseWeapon { ship, .. }
            | RecallStrikeCraft { ship, .. }
            | AreaPulse { ship }
            | BoardingParty { ship }
            | RepairModule { ship, .. }
            | ExtinguishFire { ship }
            | RecoalesceHull { ship } => Some(*ship),
        }
    }
}

/// Client-gathered details for an ability. Never trusted by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerAbilityData {
    DonePhase,
    DeployShip { position: Position },
    UndeployShip,
    ConfigurePower { mode: ShipPowerMode },
    DistributePower { mode: ShipPowerMode },
    MoveShip {
        destination: Position,
        facing_point: Position,
    },
    UseInertialessDrive { destination: Position },
    ChargeLance,
    UseWeapon { target: PickResponse },
    RecallStrikeCraft,
    AreaPulse,
    BoardingParty { target: ShipId },
    RepairModule,
    ExtinguishFire,
    RecoalesceHull,
}

/// Source of player choices while an ability is being prepared
pub trait ClientInput {
    /// `None` when the player backs out
    fn pick(&mut self, request: PickRequest) -> impl Future<Output = Option<PickResponse>> + Send;

    /// `max_transfer` is set when only a limited reallocation is allowed
    fn power_mode(
        &mut self,
        ship: ShipId,
        reactor: ReactorSpec,
        current: ShipPowerMode,
        max_transfer: Option<u32>,
    ) -> impl Future<Output = Option<ShipPowerMode>> + Send;
}

// Pick requests shared by the client-side preparation and the server check

fn deploy_request(state: &GameState, side: Side) -> PickRequest {
    let zone = state.start.players.get(side).deploy_zone.clone();
    PickRequest::location(zone, []).with_helper_circle(super::ship::SHIP_BASE_SIZE)
}

fn move_request(ship: &ShipInstance) -> PickRequest {
    PickRequest::location(PhysicsSystem::move_line(ship), [ship.id()])
}

fn turn_request(state: &GameState, ship: &ShipInstance, destination: Position) -> PickRequest {
    PickRequest::location(
        PhysicsSystem::turn_cone(ship, destination),
        state.ships.keys().copied(),
    )
}

fn jump_request(ship: &ShipInstance) -> Option<PickRequest> {
    PhysicsSystem::jump_area(ship).map(|area| PickRequest::location(area, [ship.id()]))
}

fn weapon_request(state: &GameState, ship: &ShipInstance, weapon: &WeaponId) -> Option<PickRequest> {
    let weapon = &ship.armaments.get(weapon)?.weapon;
    let target = weapon.target();
    let boundary = PickBoundary::WeaponsFire {
        center: ship.position,
        facing: ship.facing,
        min_distance: weapon.min_range(),
        max_distance: weapon.max_range(),
        firing_arcs: weapon.firing_arcs(),
        can_select_self: target == WeaponTarget::FriendlyShip,
    };
    Some(match target {
        WeaponTarget::EnemyShip => PickRequest::ship(boundary, [ship.owner.other()]),
        WeaponTarget::FriendlyShip => PickRequest::ship(boundary, [ship.owner]),
        WeaponTarget::Location => {
            PickRequest::location(boundary, state.ships.keys().copied())
                .with_helper_circle(super::weapons::MEGA_CANNON_BLAST_RADIUS)
        }
    })
}

fn boarding_request(ship: &ShipInstance) -> PickRequest {
    PickRequest::ship(
        PickBoundary::WeaponsFire {
            center: ship.position,
            facing: ship.facing,
            min_distance: 0.0,
            max_distance: BOARDING_RANGE,
            firing_arcs: all_arcs(),
            can_select_self: false,
        },
        [ship.owner.other()],
    )
}

fn has_ship_target(state: &GameState, request: &PickRequest) -> bool {
    state
        .ships
        .keys()
        .any(|id| is_valid_pick(state, request, &PickResponse::Ship { id: *id }))
}

fn own_ship<'a>(state: &'a GameState, side: Side, id: &ShipId) -> Result<&'a ShipInstance, String> {
    let ship = state
        .ships
        .get(id)
        .ok_or_else(|| "that ship is not on the battlefield".to_string())?;
    if ship.owner != side {
        return Err("that ship is not yours".to_string());
    }
    Ok(ship)
}

fn require_phase(state: &GameState, allowed: bool, name: &str) -> Result<(), String> {
    if allowed {
        Ok(())
    } else {
        Err(format!("{} is not possible during the {} phase", name, state.phase.name()))
    }
}

fn require_initiative(state: &GameState, side: Side) -> Result<(), String> {
    if state.is_waiting_for_initiative(side) {
        Err("the enemy has initiative; wait for them to act".to_string())
    } else {
        Ok(())
    }
}

fn require_tokens(ship: &ShipInstance) -> Result<(), String> {
    if ship.remaining_repair_tokens() == 0 {
        Err("no repair tokens left this turn".to_string())
    } else {
        Ok(())
    }
}

/// Checks whether `side` may use `ability` right now, without looking at any payload
pub fn check_ability(state: &GameState, side: Side, ability: &PlayerAbilityType) -> Result<(), String> {
    use PlayerAbilityType as A;

    if state.ready == Some(side) {
        return Err("you have already finished this phase".to_string());
    }
    let phase = state.phase;

    match ability {
        A::DonePhase { phase: done } => {
            if *done != phase {
                return Err(format!("the {} phase is already over", done.name()));
            }
            if !state.can_finish_phase(side) {
                return Err(match phase {
                    GamePhase::Deploy => "you can still deploy more ships".to_string(),
                    _ => "some of your ships have not moved yet".to_string(),
                });
            }
            Ok(())
        }
        A::DeployShip { ship } => {
            require_phase(state, phase == GamePhase::Deploy, "deploying")?;
            let roster = &state.start.players.get(side).deployable_fleet;
            let ship = roster
                .get(ship)
                .ok_or_else(|| "that ship is not in your fleet".to_string())?;
            if state.ships.contains_key(&ship.id) {
                return Err("that ship is already deployed".to_string());
            }
            if ship.point_cost() > state.remaining_budget(side) {
                return Err("not enough battle points left for that ship".to_string());
            }
            Ok(())
        }
        A::UndeployShip { ship } | A::ConfigurePower { ship } => {
            require_phase(state, phase == GamePhase::Deploy, "changing your deployment")?;
            own_ship(state, side, ship).map(|_| ())
        }
        A::DistributePower { ship } => {
            require_phase(state, matches!(phase, GamePhase::Power(_)), "redistributing power")?;
            let ship = own_ship(state, side, ship)?;
            if ship.is_done {
                return Err("power was already redistributed this turn".to_string());
            }
            Ok(())
        }
        A::MoveShip { ship } => {
            require_phase(state, matches!(phase, GamePhase::Move(_)), "moving")?;
            require_initiative(state, side)?;
            let ship = own_ship(state, side, ship)?;
            if ship.is_done {
                return Err("that ship has already moved".to_string());
            }
            if !ship.can_move() {
                return Err("that ship cannot move".to_string());
            }
            Ok(())
        }
        A::UseInertialessDrive { ship } => {
            require_phase(state, matches!(phase, GamePhase::Move(_)), "jumping")?;
            require_initiative(state, side)?;
            let ship = own_ship(state, side, ship)?;
            let drive = ship
                .class()
                .inertialess_drive()
                .ok_or_else(|| "that ship has no inertialess drive".to_string())?;
            if ship.is_done {
                return Err("that ship has already moved".to_string());
            }
            if ship.weapon_power < drive.power_cost {
                return Err("not enough weapon power to jump".to_string());
            }
            Ok(())
        }
        A::ChargeLance { ship, weapon } => {
            require_phase(
                state,
                matches!(phase, GamePhase::Power(_) | GamePhase::Attack(_)),
                "charging lances",
            )?;
            if matches!(phase, GamePhase::Attack(_)) {
                require_initiative(state, side)?;
            }
            let ship = own_ship(state, side, ship)?;
            if !ship.can_charge_lance(weapon) {
                return Err("that lance cannot be charged".to_string());
            }
            Ok(())
        }
        A::UseWeapon { ship, weapon } => {
            require_phase(state, matches!(phase, GamePhase::Attack(_)), "firing")?;
            require_initiative(state, side)?;
            let ship = own_ship(state, side, ship)?;
            if !ship.can_use_weapon(weapon) {
                return Err("that armament cannot be used".to_string());
            }
            let request = weapon_request(state, ship, weapon)
                .ok_or_else(|| "that armament does not exist".to_string())?;
            match request.pick_type {
                super::pick::PickType::Ship { .. } if !has_ship_target(state, &request) => {
                    Err("no target in range".to_string())
                }
                _ => Ok(()),
            }
        }
        A::RecallStrikeCraft { ship, hangar } => {
            require_phase(state, matches!(phase, GamePhase::Attack(_)), "recalling strike craft")?;
            let ship = own_ship(state, side, ship)?;
            let launched = ship.launched_hangars().any(|id| id == hangar)
                && state.ships.values().any(|other| {
                    other
                        .fighter_wings
                        .iter()
                        .chain(other.bomber_wings.iter())
                        .any(|wing| wing.ship == ship.id() && wing.hangar == *hangar)
                });
            if !launched {
                return Err("that wing is not deployed".to_string());
            }
            Ok(())
        }
        A::AreaPulse { ship } => {
            require_phase(state, matches!(phase, GamePhase::Attack(_)), "pulsing")?;
            require_initiative(state, side)?;
            let ship = own_ship(state, side, ship)?;
            let emitter = ship
                .class()
                .pulse_emitter()
                .ok_or_else(|| "that ship has no pulse emitter".to_string())?;
            if ship.has_used_area_pulse {
                return Err("the pulse emitter was already used this turn".to_string());
            }
            if ship.weapon_power < emitter.power_cost {
                return Err("not enough weapon power to pulse".to_string());
            }
            Ok(())
        }
        A::BoardingParty { ship } => {
            require_phase(state, matches!(phase, GamePhase::Attack(_)), "boarding")?;
            require_initiative(state, side)?;
            let ship = own_ship(state, side, ship)?;
            if !ship.can_board() {
                return Err("that ship cannot send a boarding party".to_string());
            }
            if !has_ship_target(state, &boarding_request(ship)) {
                return Err("no enemy ship close enough to board".to_string());
            }
            Ok(())
        }
        A::RepairModule { ship, module } => {
            require_phase(state, matches!(phase, GamePhase::Repair(_)), "repairing")?;
            let ship = own_ship(state, side, ship)?;
            require_tokens(ship)?;
            if ship.modules.status(module) != super::ship::ModuleStatus::Damaged {
                return Err(format!("{} is not repairable", module));
            }
            Ok(())
        }
        A::ExtinguishFire { ship } => {
            require_phase(state, matches!(phase, GamePhase::Repair(_)), "fighting fires")?;
            let ship = own_ship(state, side, ship)?;
            require_tokens(ship)?;
            if ship.fires == 0 {
                return Err("that ship is not on fire".to_string());
            }
            Ok(())
        }
        A::RecoalesceHull { ship } => {
            require_phase(state, matches!(phase, GamePhase::Repair(_)), "recoalescing")?;
            let ship = own_ship(state, side, ship)?;
            require_tokens(ship)?;
            if !ship.class().faction().can_recoalesce() {
                return Err("that hull cannot recoalesce".to_string());
            }
            if ship.hull >= ship.durability().max_hull {
                return Err("that hull is already whole".to_string());
            }
            Ok(())
        }
    }
}

/// Every ability `side` may use in `state`, in a stable order
pub fn get_possible_abilities(state: &GameState, side: Side) -> Vec<PlayerAbilityType> {
    use PlayerAbilityType as A;

    let mut candidates = vec![A::DonePhase { phase: state.phase }];
    for ship in state.undeployed(side) {
        candidates.push(A::DeployShip { ship: ship.id });
    }
    for ship in state.ships_of(side) {
        let id = ship.id();
        candidates.extend([
            A::UndeployShip { ship: id },
            A::ConfigurePower { ship: id },
            A::DistributePower { ship: id },
            A::MoveShip { ship: id },
            A::UseInertialessDrive { ship: id },
            A::AreaPulse { ship: id },
            A::BoardingParty { ship: id },
            A::ExtinguishFire { ship: id },
            A::RecoalesceHull { ship: id },
        ]);
        for weapon in ship.armaments.keys() {
            candidates.push(A::ChargeLance {
                ship: id,
                weapon: weapon.clone(),
            });
            candidates.push(A::UseWeapon {
                ship: id,
                weapon: weapon.clone(),
            });
            candidates.push(A::RecallStrikeCraft {
                ship: id,
                hangar: weapon.clone(),
            });
        }
        for module in ship.modules.damaged() {
            candidates.push(A::RepairModule {
                ship: id,
                module: module.clone(),
            });
        }
    }

    candidates.sort();
    candidates.dedup();
    candidates.retain(|ability| check_ability(state, side, ability).is_ok());
    candidates
}

/// Gathers the payload for `ability` from the player. Advisory only: the
/// server checks everything again in [`finish_on_server`].
pub async fn begin_on_client<I: ClientInput + Send>(
    state: &GameState,
    side: Side,
    ability: &PlayerAbilityType,
    input: &mut I,
) -> Option<PlayerAbilityData> {
    use PlayerAbilityType as A;

    let ship = ability.ship().and_then(|id| state.ships.get(&id));

    match ability {
        A::DonePhase { .. } => Some(PlayerAbilityData::DonePhase),
        A::DeployShip { .. } => {
            let picked = input.pick(deploy_request(state, side)).await?;
            Some(PlayerAbilityData::DeployShip {
                position: picked.position()?,
            })
        }
        A::UndeployShip { .. } => Some(PlayerAbilityData::UndeployShip),
        A::ConfigurePower { .. } | A::DistributePower { .. } => {
            let ship = ship?;
            let limited = matches!(ability, A::DistributePower { .. });
            let reactor = ship.reactor();
            let max_transfer = limited.then(|| reactor.max_transfer());
            let mode = input
                .power_mode(ship.id(), reactor, ship.power_mode, max_transfer)
                .await?;
            Some(if limited {
                PlayerAbilityData::DistributePower { mode }
            } else {
                PlayerAbilityData::ConfigurePower { mode }
            })
        }
        A::MoveShip { .. } => {
            let ship = ship?;
            let destination = input.pick(move_request(ship)).await?.position()?;
            let facing_point = input
                .pick(turn_request(state, ship, destination))
                .await?
                .position()?;
            Some(PlayerAbilityData::MoveShip {
                destination,
                facing_point,
            })
        }
        A::UseInertialessDrive { .. } => {
            let request = jump_request(ship?)?;
            let destination = input.pick(request).await?.position()?;
            Some(PlayerAbilityData::UseInertialessDrive { destination })
        }
        A::ChargeLance { .. } => Some(PlayerAbilityData::ChargeLance),
        A::UseWeapon { weapon, .. } => {
            let request = weapon_request(state, ship?, weapon)?;
            let target = input.pick(request).await?;
            Some(PlayerAbilityData::UseWeapon { target })
        }
        A::RecallStrikeCraft { .. } => Some(PlayerAbilityData::RecallStrikeCraft),
        A::AreaPulse { .. } => Some(PlayerAbilityData::AreaPulse),
        A::BoardingParty { .. } => {
            let target = input.pick(boarding_request(ship?)).await?.ship()?;
            Some(PlayerAbilityData::BoardingParty { target })
        }
        A::RepairModule { .. } => Some(PlayerAbilityData::RepairModule),
        A::ExtinguishFire { .. } => Some(PlayerAbilityData::ExtinguishFire),
        A::RecoalesceHull { .. } => Some(PlayerAbilityData::RecoalesceHull),
    }
}

/// Resolves an ability on the authoritative state
pub fn finish_on_server<R: Rng + ?Sized>(
    state: &GameState,
    side: Side,
    ability: &PlayerAbilityType,
    data: &PlayerAbilityData,
    rng: &mut R,
) -> GameEvent {
    match apply_ability(state, side, ability, data, rng) {
        Ok(next) => GameEvent::StateChange {
            state: Box::new(next),
        },
        Err(message) => GameEvent::InvalidAction { message },
    }
}

fn mismatched() -> String {
    "ability details do not match the ability".to_string()
}

fn invalid_target() -> String {
    "invalid target".to_string()
}

fn apply_ability<R: Rng + ?Sized>(
    state: &GameState,
    side: Side,
    ability: &PlayerAbilityType,
    data: &PlayerAbilityData,
    rng: &mut R,
) -> Result<GameState, String> {
    use PlayerAbilityData as D;
    use PlayerAbilityType as A;

    check_ability(state, side, ability)?;
    let mut next = state.clone();

    match (ability, data) {
        (A::DonePhase { .. }, D::DonePhase) => next.after_player_ready(side, rng),
        (A::DeployShip { ship }, D::DeployShip { position }) => {
            if !is_valid_pick(
                state,
                &deploy_request(state, side),
                &PickResponse::Location {
                    position: *position,
                },
            ) {
                return Err("ships must be deployed inside your zone, clear of other ships".to_string());
            }
            let start = next.start.players.get(side);
            let roster_ship = start
                .deployable_fleet
                .get(ship)
                .cloned()
                .ok_or_else(|| "that ship is not in your fleet".to_string())?;
            let instance = ShipInstance::new(roster_ship, side, *position, start.deploy_facing);
            next.ships.insert(*ship, instance);
        }
        (A::UndeployShip { ship }, D::UndeployShip) => {
            next.ships.remove(ship);
        }
        (A::ConfigurePower { ship }, D::ConfigurePower { mode }) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            instance
                .reactor()
                .check_allocation(mode)
                .map_err(|err| err.to_string())?;
            instance.power_mode = *mode;
            instance.weapon_power = mode.weapons;
            instance.shield_power = mode.shields;
        }
        (A::DistributePower { ship }, D::DistributePower { mode }) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            let previous = instance.power_mode;
            instance
                .reactor()
                .check_transfer(&previous, mode)
                .map_err(|err| err.to_string())?;
            let spent_weapons = previous.weapons.saturating_sub(instance.weapon_power);
            let spent_shields = previous.shields.saturating_sub(instance.shield_power);
            instance.power_mode = *mode;
            instance.weapon_power = mode.weapons.saturating_sub(spent_weapons);
            instance.shield_power = if instance.shields_up() {
                mode.shields.saturating_sub(spent_shields)
            } else {
                0
            };
            instance.is_done = true;
        }
        (
            A::MoveShip { ship },
            D::MoveShip {
                destination,
                facing_point,
            },
        ) => {
            let current = state.ships.get(ship).ok_or_else(mismatched)?;
            let destination_pick = PickResponse::Location {
                position: *destination,
            };
            if !is_valid_pick(state, &move_request(current), &destination_pick) {
                return Err("ships can only move straight ahead, within engine range".to_string());
            }
            let facing_pick = PickResponse::Location {
                position: *facing_point,
            };
            if !is_valid_pick(state, &turn_request(state, current, *destination), &facing_pick) {
                return Err("that turn is too sharp for this ship".to_string());
            }
            let facing = (*facing_point - *destination).angle();
            relocate_ship(&mut next, *ship, *destination, facing);
            if let Some(moved) = next.ships.get_mut(ship) {
                moved.is_done = true;
            }
        }
        (A::UseInertialessDrive { ship }, D::UseInertialessDrive { destination }) => {
            let current = state.ships.get(ship).ok_or_else(mismatched)?;
            let request = jump_request(current).ok_or_else(mismatched)?;
            let pick = PickResponse::Location {
                position: *destination,
            };
            if !is_valid_pick(state, &request, &pick) {
                return Err("that jump is out of the drive's reach".to_string());
            }
            let cost = current
                .class()
                .inertialess_drive()
                .map(|drive| drive.power_cost)
                .unwrap_or(0);
            let facing = current.facing;
            if let Some(jumping) = next.ships.get_mut(ship) {
                jumping.weapon_power = jumping.weapon_power.saturating_sub(cost);
            }
            relocate_ship(&mut next, *ship, *destination, facing);
            if let Some(jumped) = next.ships.get_mut(ship) {
                jumped.is_done = true;
            }
        }
        (A::ChargeLance { ship, weapon }, D::ChargeLance) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            instance.weapon_power -= 1;
            if let Some(lance) = instance.armaments.get_mut(weapon) {
                if let super::weapons::WeaponState::Charging { charges } = &mut lance.state {
                    *charges += 1;
                }
            }
        }
        (A::UseWeapon { ship, weapon }, D::UseWeapon { target }) => {
            let current = state.ships.get(ship).ok_or_else(mismatched)?;
            let request = weapon_request(state, current, weapon).ok_or_else(mismatched)?;
            if !is_valid_pick(state, &request, target) {
                return Err(invalid_target());
            }
            combat::fire_weapon(&mut next, *ship, weapon, target, rng)?;
        }
        (A::RecallStrikeCraft { ship, hangar }, D::RecallStrikeCraft) => {
            for other in next.ships.values_mut() {
                other
                    .fighter_wings
                    .retain(|wing| !(wing.ship == *ship && wing.hangar == *hangar));
                other
                    .bomber_wings
                    .retain(|wing| !(wing.ship == *ship && wing.hangar == *hangar));
            }
        }
        (A::AreaPulse { ship }, D::AreaPulse) => combat::area_pulse(&mut next, *ship, rng)?,
        (A::BoardingParty { ship }, D::BoardingParty { target }) => {
            let current = state.ships.get(ship).ok_or_else(mismatched)?;
            let pick = PickResponse::Ship { id: *target };
            if !is_valid_pick(state, &boarding_request(current), &pick) {
                return Err(invalid_target());
            }
            combat::board(&mut next, *ship, *target, rng)?;
        }
        (A::RepairModule { ship, module }, D::RepairModule) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            instance.used_repair_tokens += 1;
            instance.modules.repair(module);
            if *module == ShipModule::Shields && instance.shields_up() {
                instance.shield_power = instance.power_mode.shields;
            }
        }
        (A::ExtinguishFire { ship }, D::ExtinguishFire) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            instance.used_repair_tokens += 1;
            instance.fires -= 1;
        }
        (A::RecoalesceHull { ship }, D::RecoalesceHull) => {
            let instance = next.ships.get_mut(ship).ok_or_else(mismatched)?;
            instance.used_repair_tokens += 1;
            instance.hull += 1;
        }
        _ => return Err(mismatched()),
    }

    run_state_change_hooks(&mut next);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ai::AiInput;
    use crate::game::chat::ChatEntry;
    use crate::game::combat::CriticalEffect;
    use crate::game::geometry::Position;
    use crate::game::ship::{ShipClass, WeightClass};
    use crate::game::start::{new_game, BattleSize};
    use crate::game::state::tests::{battle, setup};
    use crate::game::weapons::{FiringArc, ShipWeapon, ShipWeaponInstance};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn expect_state(event: GameEvent) -> GameState {
        match event {
            GameEvent::StateChange { state } => *state,
            other => panic!("expected a state change, got {:?}", other),
        }
    }

    fn expect_invalid(event: GameEvent) -> String {
        match event {
            GameEvent::InvalidAction { message } => message,
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    /// Every enumerated ability, prepared by an automated client, is accepted
    async fn assert_lock_step(state: &GameState, seed: u64) {
        for side in Side::BOTH {
            let abilities = get_possible_abilities(state, side);
            for ability in abilities {
                let mut input = AiInput::new(state.clone(), seed);
                let data = begin_on_client(state, side, &ability, &mut input)
                    .await
                    .unwrap_or_else(|| panic!("client could not prepare {:?}", ability));
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                match finish_on_server(state, side, &ability, &data, &mut rng) {
                    GameEvent::StateChange { .. } => {}
                    other => panic!("{:?} with {:?} rejected: {:?}", ability, data, other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_possible_abilities_agree_with_server_in_every_phase() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut deploy = new_game(
            BattleSize::Raid,
            setup("Host", &[ShipClass::Sentinel, ShipClass::Picket]),
            setup("Guest", &[ShipClass::Shade, ShipClass::Needle]),
            &mut rng,
        );
        assert_lock_step(&deploy, 1).await;

        // deploy one ship each so undeploy and configure show up
        for side in Side::BOTH {
            let ability = get_possible_abilities(&deploy, side)
                .into_iter()
                .find(|a| matches!(a, PlayerAbilityType::DeployShip { .. }))
                .unwrap();
            let mut input = AiInput::new(deploy.clone(), 2);
            let data = begin_on_client(&deploy, side, &ability, &mut input).await.unwrap();
            deploy = expect_state(finish_on_server(&deploy, side, &ability, &data, &mut rng));
        }
        assert_lock_step(&deploy, 2).await;

        let mut state = battle(
            &[ShipClass::Sentinel, ShipClass::Hive],
            &[ShipClass::Shade, ShipClass::Swarmmother],
        );
        for phase in [
            GamePhase::Power(1),
            GamePhase::Move(1),
            GamePhase::Attack(1),
            GamePhase::Repair(1),
        ] {
            state.phase = phase;
            state.initiative = None;
            assert_lock_step(&state, 4).await;
        }

        // damaged, burning ships in the repair phase
        state.phase = GamePhase::Repair(1);
        for ship in state.ships.values_mut() {
            ship.modules.damage(&ShipModule::Engines);
            ship.fires = 1;
            ship.hull -= 1;
        }
        assert_lock_step(&state, 5).await;
    }

    #[test]
    fn test_reused_armament_is_rejected_without_changing_state() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        state.phase = GamePhase::Attack(1);
        let attacker = state.ships_of(Side::Host).next().unwrap().id();
        let target = state.ships_of(Side::Guest).next().unwrap().id();
        // bring the target into the bow arc
        state.ships.get_mut(&target).unwrap().position = Position::new(0.0, 0.0);

        let ability = PlayerAbilityType::UseWeapon {
            ship: attacker,
            weapon: WeaponId::new("bow_cannons"),
        };
        let data = PlayerAbilityData::UseWeapon {
            target: PickResponse::Ship { id: target },
        };
        let after = expect_state(finish_on_server(&state, Side::Host, &ability, &data, &mut rng));

        let first = expect_invalid(finish_on_server(&after, Side::Host, &ability, &data, &mut rng));
        let second = expect_invalid(finish_on_server(&after, Side::Host, &ability, &data, &mut rng));
        assert_eq!(first, second);
        assert!(!get_possible_abilities(&after, Side::Host).contains(&ability));
    }

    fn duel() -> (GameState, ShipId, ShipId) {
        let mut state = battle(&[ShipClass::Sentinel], &[ShipClass::Sentinel]);
        state.phase = GamePhase::Attack(1);
        let a = state.ships_of(Side::Host).next().unwrap().id();
        let b = state.ships_of(Side::Guest).next().unwrap().id();

        let cannon = WeaponId::new("bow_cannons");
        for (id, position, facing) in [
            (a, Position::new(0.0, 0.0), 0.0),
            (b, Position::new(2000.0, 0.0), std::f64::consts::PI),
        ] {
            let ship = state.ships.get_mut(&id).unwrap();
            ship.position = position;
            ship.facing = facing;
            ship.armaments.clear();
            ship.armaments.insert(
                cannon.clone(),
                ShipWeaponInstance::new(ShipWeapon::cannon(3, 2500.0, &[FiringArc::Bow])),
            );
        }
        (state, a, b)
    }

    fn bow_cannon_attack(a: ShipId, b: ShipId) -> (PlayerAbilityType, PlayerAbilityData) {
        (
            PlayerAbilityType::UseWeapon {
                ship: a,
                weapon: WeaponId::new("bow_cannons"),
            },
            PlayerAbilityData::UseWeapon {
                target: PickResponse::Ship { id: b },
            },
        )
    }

    /// Last attack log entry: damage, hull critical damage and weapon, or `None` damage for a miss
    fn last_attack(state: &GameState, target: ShipId) -> (Option<u32>, u32, Option<WeaponId>) {
        state
            .chat
            .iter()
            .rev()
            .find_map(|entry| match entry {
                ChatEntry::ShipAttacked {
                    ship,
                    damage_inflicted,
                    critical,
                    weapon,
                    ..
                } if *ship == target => {
                    let extra = match critical {
                        Some(CriticalEffect::Hull { damage }) => *damage,
                        _ => 0,
                    };
                    Some((Some(*damage_inflicted), extra, weapon.clone()))
                }
                ChatEntry::ShipAttackFailed { ship, weapon, .. } if *ship == target => {
                    Some((None, 0, weapon.clone()))
                }
                _ => None,
            })
            .expect("the attack was not logged")
    }

    #[test]
    fn test_cruiser_duel_cannon_accounting() {
        let (state, a, b) = duel();
        let (ability, data) = bow_cannon_attack(a, b);
        let before = &state.ships[&b];
        let bow_cannons = Some(WeaponId::new("bow_cannons"));

        let mut saw_hit = false;
        let mut saw_miss = false;
        for seed in 0..200 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let after = expect_state(finish_on_server(&state, Side::Host, &ability, &data, &mut rng));

            let shooter = &after.ships[&a];
            assert_eq!(shooter.weapon_power, state.ships[&a].weapon_power - 1);
            assert!(shooter.used_armaments.contains(&WeaponId::new("bow_cannons")));

            let target = &after.ships[&b];
            let (damage, critical_damage, weapon) = last_attack(&after, b);
            assert_eq!(weapon, bow_cannons);
            match damage {
                Some(damage) => {
                    saw_hit = true;
                    let hits = damage - critical_damage;
                    assert!((1..=3).contains(&hits));
                    // 4 shield points on a cruiser soak a full volley
                    if target.shields_up() {
                        assert_eq!(target.shield_power, before.shield_power - hits);
                    }
                    assert_eq!(target.hull, before.hull - critical_damage);
                }
                None => {
                    saw_miss = true;
                    assert_eq!(target.shield_power, before.shield_power);
                    assert_eq!(target.hull, before.hull);
                }
            }
        }
        assert!(saw_hit && saw_miss);
        assert_eq!(before.hull, WeightClass::Cruiser.durability().max_hull);
    }

    #[test]
    fn test_cannon_hit_rate_falls_off_with_distance() {
        let (state, a, b) = duel();
        let (ability, data) = bow_cannon_attack(a, b);
        let mut rng = ChaCha8Rng::seed_from_u64(40);

        let volleys = 4000;
        let mut hits = 0;
        for _ in 0..volleys {
            let after = expect_state(finish_on_server(&state, Side::Host, &ability, &data, &mut rng));
            if let (Some(damage), critical_damage, _) = last_attack(&after, b) {
                hits += damage - critical_damage;
            }
        }

        // 250 / 2000 per shot, three shots per volley
        let rate = hits as f64 / (3 * volleys) as f64;
        assert!((rate - 0.125).abs() < 0.015, "hit rate {}", rate);
    }

    #[test]
    fn test_cruiser_duel_rejects_out_of_range_and_out_of_arc() {
        let (mut state, a, b) = duel();
        let ability = PlayerAbilityType::UseWeapon {
            ship: a,
            weapon: WeaponId::new("bow_cannons"),
        };
        let data = PlayerAbilityData::UseWeapon {
            target: PickResponse::Ship { id: b },
        };
        let mut rng = ChaCha8Rng::seed_from_u64(22);

        state.ships.get_mut(&b).unwrap().position = Position::new(2600.0, 0.0);
        assert_eq!(
            expect_invalid(finish_on_server(&state, Side::Host, &ability, &data, &mut rng)),
            "no target in range"
        );

        state.ships.get_mut(&b).unwrap().position = Position::new(0.0, 1500.0);
        assert_eq!(
            expect_invalid(finish_on_server(&state, Side::Host, &ability, &data, &mut rng)),
            "no target in range"
        );

        // a second, legal target makes the ability available but the payload still fails
        let decoy = ShipInstance::new(
            crate::game::ship::Ship::new("Decoy", ShipClass::Picket),
            Side::Guest,
            Position::new(1200.0, 0.0),
            0.0,
        );
        state.ships.insert(decoy.id(), decoy);
        assert_eq!(
            expect_invalid(finish_on_server(&state, Side::Host, &ability, &data, &mut rng)),
            "invalid target"
        );
    }

    #[test]
    fn test_power_distribution_limits() {
        let mut rng = ChaCha8Rng::seed_from_u64(30);
        let state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        let ability = PlayerAbilityType::DistributePower { ship: id };

        let too_far = PlayerAbilityData::DistributePower {
            mode: ShipPowerMode {
                weapons: 8,
                shields: 2,
                engines: 2,
            },
        };
        let message = expect_invalid(finish_on_server(&state, Side::Host, &ability, &too_far, &mut rng));
        assert!(message.contains("move 4 units"));

        let ok = PlayerAbilityData::DistributePower {
            mode: ShipPowerMode {
                weapons: 6,
                shields: 2,
                engines: 4,
            },
        };
        let after = expect_state(finish_on_server(&state, Side::Host, &ability, &ok, &mut rng));
        assert_eq!(after.ships[&id].weapon_power, 6);
        assert_eq!(after.ships[&id].shield_power, 2);
        expect_invalid(finish_on_server(&after, Side::Host, &ability, &ok, &mut rng));
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        let state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        let ability = PlayerAbilityType::DistributePower { ship: id };
        let message = expect_invalid(finish_on_server(
            &state,
            Side::Host,
            &ability,
            &PlayerAbilityData::AreaPulse,
            &mut rng,
        ));
        assert_eq!(message, "ability details do not match the ability");
    }

    #[test]
    fn test_enemy_ship_cannot_be_commanded() {
        let mut rng = ChaCha8Rng::seed_from_u64(32);
        let state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        let enemy = state.ships_of(Side::Guest).next().unwrap().id();
        let message = expect_invalid(finish_on_server(
            &state,
            Side::Host,
            &PlayerAbilityType::DistributePower { ship: enemy },
            &PlayerAbilityData::DistributePower {
                mode: state.ships[&enemy].power_mode,
            },
            &mut rng,
        ));
        assert_eq!(message, "that ship is not yours");
    }

    #[test]
    fn test_oversized_power_allocation_is_rejected() {
        let mut rng = ChaCha8Rng::seed_from_u64(33);
        let mut deploy = new_game(
            BattleSize::Raid,
            setup("Host", &[ShipClass::Sentinel]),
            setup("Guest", &[ShipClass::Warden]),
            &mut rng,
        );
        let cruiser = deploy
            .start
            .players
            .get(Side::Host)
            .deployable_fleet
            .values()
            .next()
            .unwrap()
            .clone();
        let instance = ShipInstance::new(cruiser.clone(), Side::Host, Position::new(-3500.0, 0.0), 0.0);
        deploy.ships.insert(cruiser.id, instance);

        let reactor = deploy.ships[&cruiser.id].reactor();
        // wraps to the reactor output in 32 bits
        let engines = reactor.power_output.wrapping_add(1);
        let wrapping = PlayerAbilityData::ConfigurePower {
            mode: ShipPowerMode {
                weapons: u32::MAX,
                shields: 0,
                engines,
            },
        };
        let ability = PlayerAbilityType::ConfigurePower { ship: cruiser.id };
        let message = expect_invalid(finish_on_server(&deploy, Side::Host, &ability, &wrapping, &mut rng));
        assert!(message.contains("must total"));

        let distribute = PlayerAbilityData::DistributePower {
            mode: ShipPowerMode {
                weapons: u32::MAX,
                shields: u32::MAX,
                engines: u32::MAX,
            },
        };
        let state = battle(&[ShipClass::Sentinel], &[ShipClass::Warden]);
        let id = state.ships_of(Side::Host).next().unwrap().id();
        let message = expect_invalid(finish_on_server(
            &state,
            Side::Host,
            &PlayerAbilityType::DistributePower { ship: id },
            &distribute,
            &mut rng,
        ));
        assert!(message.contains("must total"));
    }
}
