//! Combat system - hit chance, damage, criticals, strike craft and boarding

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::util::time::unix_millis;

use super::chat::{ChatEntry, ShipAttacker};
use super::geometry::Position;
use super::instance::{ShipHangarWing, ShipInstance};
use super::pick::PickResponse;
use super::ship::{ShipModule, SHIP_BASE_SIZE};
use super::state::GameState;
use super::types::{ShipId, WeaponId};
use super::weapons::{
    ShipWeapon, StrikeCraftWing, WeaponState, CANNON_DAMAGE_PER_HIT, LANCE_DAMAGE,
    MEGA_CANNON_BLAST_RADIUS, MEGA_CANNON_DAMAGE, REVELATION_GUN_DAMAGE,
};

/// Units within which a boarding party can cross over
pub const BOARDING_RANGE: f64 = 750.0;
pub const BOARDING_ROLLS: u32 = 3;
pub const BOMBER_STRIKES: u32 = 3;
pub const FIRE_DAMAGE_CHANCE: f64 = 0.5;

/// Result of a critical roll, after any random choice has been made
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum CriticalEffect {
    AllModules,
    AllWeapons,
    ShieldsAndEngines,
    RandomWeapon,
    Module { module: ShipModule },
    Hull { damage: u32 },
    AllModulesAndFire,
    Fire { count: u32 },
}

/// What dealt the damage; decides shield interaction and crit chance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageSource {
    Cannon,
    Lance,
    Bombers,
    MegaCannon,
    RevelationGun,
    AreaPulse,
    Boarding,
    Fire,
}

impl DamageSource {
    pub fn bypasses_shields(self) -> bool {
        matches!(
            self,
            DamageSource::RevelationGun | DamageSource::Boarding | DamageSource::Fire
        )
    }

    /// Probability of a critical roll after a damaging hit
    pub fn crit_chance(self, shields_up: bool) -> f64 {
        let (up, down) = match self {
            DamageSource::Cannon => (0.1, 0.3),
            DamageSource::Lance => (0.2, 0.5),
            DamageSource::Bombers => (0.15, 0.4),
            DamageSource::MegaCannon => (0.25, 0.5),
            DamageSource::RevelationGun => (1.0, 1.0),
            DamageSource::AreaPulse => (0.1, 0.25),
            DamageSource::Boarding | DamageSource::Fire => (0.0, 0.0),
        };
        if shields_up {
            up
        } else {
            down
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    pub shield_damage: u32,
    pub hull_damage: u32,
    /// Extra hull lost to a Hull critical
    pub critical_damage: u32,
    pub critical: Option<CriticalEffect>,
}

impl Impact {
    pub fn total(&self) -> u32 {
        self.shield_damage + self.hull_damage + self.critical_damage
    }
}

/// Combat math that does not depend on the rest of the battlefield
pub struct CombatSystem;

impl CombatSystem {
    /// Chance that a single direct-fire shot lands
    pub fn hit_chance(distance: f64) -> f64 {
        if distance <= SHIP_BASE_SIZE {
            1.0
        } else {
            SHIP_BASE_SIZE / distance
        }
    }

    pub fn lance_hit_chance(charges: u32) -> f64 {
        1.0 - (-(charges as f64)).exp()
    }

    /// Armored hull table, indexed by `d(0..=6) + d(0..=4)`
    pub fn armored_critical(roll: u32) -> Option<CriticalEffect> {
        let effect = match roll {
            0 => CriticalEffect::AllModules,
            1 => CriticalEffect::AllWeapons,
            2 => CriticalEffect::ShieldsAndEngines,
            3 | 4 => CriticalEffect::RandomWeapon,
            5 => CriticalEffect::Module {
                module: ShipModule::Shields,
            },
            6 => CriticalEffect::Module {
                module: ShipModule::Engines,
            },
            7 => CriticalEffect::Module {
                module: ShipModule::Turrets,
            },
            8 => CriticalEffect::Hull { damage: 1 },
            9 => CriticalEffect::Hull { damage: 2 },
            10 => CriticalEffect::Hull { damage: 3 },
            _ => return None,
        };
        Some(effect)
    }

    /// Flammable hull table, indexed by `d(1..=6) + d(0..=3)`
    pub fn flammable_critical(roll: u32) -> Option<CriticalEffect> {
        let effect = match roll {
            1 => CriticalEffect::AllModulesAndFire,
            2 => CriticalEffect::Fire { count: 2 },
            3 | 4 => CriticalEffect::Fire { count: 1 },
            5 => CriticalEffect::RandomWeapon,
            6 => CriticalEffect::Module {
                module: ShipModule::Shields,
            },
            7 => CriticalEffect::Module {
                module: ShipModule::Engines,
            },
            8 => CriticalEffect::Hull { damage: 1 },
            9 => CriticalEffect::Hull { damage: 2 },
            _ => return None,
        };
        Some(effect)
    }

    /// Index into the critical table for the hull type
    pub fn critical_roll<R: Rng + ?Sized>(flammable: bool, rng: &mut R) -> u32 {
        if flammable {
            rng.gen_range(1..=6) + rng.gen_range(0..=3)
        } else {
            rng.gen_range(0..=6) + rng.gen_range(0..=4)
        }
    }

    pub fn roll_critical<R: Rng + ?Sized>(flammable: bool, rng: &mut R) -> Option<CriticalEffect> {
        let roll = Self::critical_roll(flammable, rng);
        if flammable {
            Self::flammable_critical(roll)
        } else {
            Self::armored_critical(roll)
        }
    }

    /// Applies a critical to a ship. Random weapon picks are resolved into a
    /// concrete module so the log shows what was hit.
    pub fn apply_critical<R: Rng + ?Sized>(
        ship: &mut ShipInstance,
        effect: CriticalEffect,
        rng: &mut R,
    ) -> CriticalEffect {
        match effect {
            CriticalEffect::AllModules => ship.modules.damage_all(),
            CriticalEffect::AllWeapons => ship.modules.damage_weapons(),
            CriticalEffect::ShieldsAndEngines => {
                ship.modules.damage(&ShipModule::Shields);
                ship.modules.damage(&ShipModule::Engines);
            }
            CriticalEffect::RandomWeapon => {
                if let Some(module) = ship.modules.damageable_weapons().choose(rng).cloned() {
                    ship.modules.damage(&module);
                    return CriticalEffect::Module { module };
                }
            }
            CriticalEffect::Module { ref module } => ship.modules.damage(module),
            CriticalEffect::Hull { damage } => ship.hull = ship.hull.saturating_sub(damage),
            CriticalEffect::AllModulesAndFire => {
                ship.modules.damage_all();
                ship.fires += 1;
            }
            CriticalEffect::Fire { count } => ship.fires += count,
        }
        if !ship.shields_up() {
            ship.shield_power = 0;
        }
        effect
    }

    /// Shields absorb first while they are up, the rest goes to the hull.
    /// A surviving ship may then take a critical.
    pub fn impact<R: Rng + ?Sized>(
        ship: &mut ShipInstance,
        damage: u32,
        source: DamageSource,
        rng: &mut R,
    ) -> Impact {
        let shields_up = ship.shields_up();
        let mut remaining = damage;

        let mut shield_damage = 0;
        if shields_up && !source.bypasses_shields() {
            shield_damage = remaining.min(ship.shield_power);
            ship.shield_power -= shield_damage;
            remaining -= shield_damage;
        }

        let hull_damage = remaining.min(ship.hull);
        ship.hull -= hull_damage;

        let hull_before_critical = ship.hull;
        let critical = if damage > 0 && ship.hull > 0 && rng.gen_bool(source.crit_chance(shields_up))
        {
            Self::roll_critical(ship.is_flammable(), rng)
                .map(|rolled| Self::apply_critical(ship, rolled, rng))
        } else {
            None
        };

        Impact {
            shield_damage,
            hull_damage,
            critical_damage: hull_before_critical - ship.hull,
            critical,
        }
    }
}

/// Deals damage to a live ship, logs it and wrecks the ship if its hull is gone.
/// Returns the damage that landed.
pub fn apply_damage<R: Rng + ?Sized>(
    state: &mut GameState,
    target: ShipId,
    damage: u32,
    source: DamageSource,
    attacker: ShipAttacker,
    weapon: Option<WeaponId>,
    rng: &mut R,
) -> u32 {
    let Some(ship) = state.ships.get_mut(&target) else {
        return 0;
    };
    let impact = CombatSystem::impact(ship, damage, source, rng);
    let destroyed = ship.hull == 0;
    let total = impact.total();

    state.log(ChatEntry::ShipAttacked {
        ship: target,
        attacker,
        sent_at: unix_millis(),
        damage_inflicted: total,
        weapon,
        critical: impact.critical,
    });
    if destroyed {
        state.destroy_ship(target);
    }
    total
}

fn log_miss(state: &mut GameState, target: ShipId, attacker: ShipAttacker, weapon: WeaponId) {
    state.log(ChatEntry::ShipAttackFailed {
        ship: target,
        attacker,
        sent_at: unix_millis(),
        weapon: Some(weapon),
    });
}

/// Resolves one armament against an already validated target
pub fn fire_weapon<R: Rng + ?Sized>(
    state: &mut GameState,
    attacker_id: ShipId,
    weapon_id: &WeaponId,
    target: &PickResponse,
    rng: &mut R,
) -> Result<(), String> {
    let attacker = state
        .ships
        .get_mut(&attacker_id)
        .ok_or_else(|| "attacking ship is no longer in the battle".to_string())?;
    let origin = attacker.position;
    let instance = attacker
        .armaments
        .get_mut(weapon_id)
        .ok_or_else(|| format!("ship has no armament '{}'", weapon_id))?;
    let weapon = instance.weapon.clone();

    // Spend the armament before resolving so a wreck mid-resolution cannot reuse it
    let lance_charges = match &mut instance.state {
        WeaponState::Charging { charges } => std::mem::take(charges),
        WeaponState::Limited { remaining_shots } => {
            *remaining_shots = remaining_shots.saturating_sub(1);
            0
        }
        _ => 0,
    };
    attacker.weapon_power = attacker.weapon_power.saturating_sub(weapon.power_cost());
    attacker.used_armaments.insert(weapon_id.clone());

    let by_enemy = ShipAttacker::EnemyShip { id: attacker_id };

    match (&weapon, target) {
        (ShipWeapon::MegaCannon, PickResponse::Location { position }) => {
            blast(state, attacker_id, *position, weapon_id, rng);
        }
        (ShipWeapon::Hangar { wing }, PickResponse::Ship { id }) => {
            let launched = ShipHangarWing {
                ship: attacker_id,
                hangar: weapon_id.clone(),
            };
            let target_ship = state
                .ships
                .get_mut(id)
                .ok_or_else(|| "target ship is no longer in the battle".to_string())?;
            match wing {
                StrikeCraftWing::Fighters => target_ship.fighter_wings.push(launched),
                StrikeCraftWing::Bombers => target_ship.bomber_wings.push(launched),
            }
        }
        (_, PickResponse::Ship { id }) => {
            let target_position = state
                .ships
                .get(id)
                .map(|ship| ship.position)
                .ok_or_else(|| "target ship is no longer in the battle".to_string())?;
            let distance = origin.distance_to(target_position);

            match &weapon {
                ShipWeapon::Cannon { num_shots, .. } => {
                    let chance = CombatSystem::hit_chance(distance);
                    let hits = (0..*num_shots).filter(|_| rng.gen_bool(chance)).count() as u32;
                    if hits == 0 {
                        log_miss(state, *id, by_enemy, weapon_id.clone());
                    } else {
                        apply_damage(
                            state,
                            *id,
                            hits * CANNON_DAMAGE_PER_HIT,
                            DamageSource::Cannon,
                            by_enemy,
                            Some(weapon_id.clone()),
                            rng,
                        );
                    }
                }
                ShipWeapon::Lance { .. } => {
                    if rng.gen_bool(CombatSystem::lance_hit_chance(lance_charges)) {
                        apply_damage(
                            state,
                            *id,
                            LANCE_DAMAGE,
                            DamageSource::Lance,
                            by_enemy,
                            Some(weapon_id.clone()),
                            rng,
                        );
                    } else {
                        log_miss(state, *id, by_enemy, weapon_id.clone());
                    }
                }
                ShipWeapon::RevelationGun => {
                    apply_damage(
                        state,
                        *id,
                        REVELATION_GUN_DAMAGE,
                        DamageSource::RevelationGun,
                        by_enemy,
                        Some(weapon_id.clone()),
                        rng,
                    );
                }
                ShipWeapon::EmpAntenna => {
                    if let Some(target_ship) = state.ships.get_mut(id) {
                        target_ship.shield_power = 0;
                        target_ship.weapon_power = 0;
                    }
                    state.log(ChatEntry::ShipAttacked {
                        ship: *id,
                        attacker: by_enemy,
                        sent_at: unix_millis(),
                        damage_inflicted: 0,
                        weapon: Some(weapon_id.clone()),
                        critical: None,
                    });
                }
                ShipWeapon::MegaCannon | ShipWeapon::Hangar { .. } => {
                    return Err(format!("{} needs a different target", weapon.display_name()));
                }
            }
        }
        (_, PickResponse::Location { .. }) => {
            return Err(format!("{} must target a ship", weapon.display_name()));
        }
    }
    Ok(())
}

fn blast<R: Rng + ?Sized>(
    state: &mut GameState,
    attacker_id: ShipId,
    center: Position,
    weapon_id: &WeaponId,
    rng: &mut R,
) {
    let caught: Vec<ShipId> = state
        .ships
        .values()
        .filter(|ship| {
            ship.id() != attacker_id
                && ship.position.distance_to(center) <= MEGA_CANNON_BLAST_RADIUS + SHIP_BASE_SIZE
        })
        .map(|ship| ship.id())
        .collect();
    for id in caught {
        apply_damage(
            state,
            id,
            MEGA_CANNON_DAMAGE,
            DamageSource::MegaCannon,
            ShipAttacker::EnemyShip { id: attacker_id },
            Some(weapon_id.clone()),
            rng,
        );
    }
}

/// Damages every enemy ship within the emitter's radius
pub fn area_pulse<R: Rng + ?Sized>(
    state: &mut GameState,
    ship_id: ShipId,
    rng: &mut R,
) -> Result<(), String> {
    let ship = state
        .ships
        .get_mut(&ship_id)
        .ok_or_else(|| "ship is no longer in the battle".to_string())?;
    let emitter = ship
        .class()
        .pulse_emitter()
        .ok_or_else(|| "ship has no pulse emitter".to_string())?;
    ship.weapon_power = ship.weapon_power.saturating_sub(emitter.power_cost);
    ship.has_used_area_pulse = true;
    let (owner, center) = (ship.owner, ship.position);

    let caught: Vec<ShipId> = state
        .ships
        .values()
        .filter(|other| other.owner != owner && other.position.distance_to(center) <= emitter.radius)
        .map(|other| other.id())
        .collect();
    for id in caught {
        apply_damage(
            state,
            id,
            emitter.damage,
            DamageSource::AreaPulse,
            ShipAttacker::EnemyShip { id: ship_id },
            None,
            rng,
        );
    }
    Ok(())
}

/// Boarding party from `boarder_id` against `target_id`
pub fn board<R: Rng + ?Sized>(
    state: &mut GameState,
    boarder_id: ShipId,
    target_id: ShipId,
    rng: &mut R,
) -> Result<(), String> {
    let boarder = state
        .ships
        .get_mut(&boarder_id)
        .ok_or_else(|| "boarding ship is no longer in the battle".to_string())?;
    boarder.has_sent_boarding_party = true;
    let attack = boarder.boarding_attack();

    let target = state
        .ships
        .get_mut(&target_id)
        .ok_or_else(|| "target ship is no longer in the battle".to_string())?;
    let defense = target.boarding_defense();
    let chance = if attack + defense > 0.0 {
        attack / (attack + defense)
    } else {
        0.0
    };

    let successes = (0..BOARDING_ROLLS).filter(|_| rng.gen_bool(chance)).count() as u32;
    let hull_damage = successes.min(target.hull);
    target.hull -= hull_damage;

    let module_damaged = if successes >= 2 {
        let module = target.modules.damageable().choose(rng).cloned();
        if let Some(module) = &module {
            target.modules.damage(module);
            if !target.shields_up() {
                target.shield_power = 0;
            }
        }
        module
    } else {
        None
    };
    let destroyed = target.hull == 0;

    state.log(ChatEntry::ShipBoarded {
        ship: target_id,
        boarder: boarder_id,
        sent_at: unix_millis(),
        damage_inflicted: hull_damage,
        module_damaged,
    });
    if destroyed {
        state.destroy_ship(target_id);
    }
    Ok(())
}

/// End-of-attack bomber runs against every ship that has bombers on it
pub fn resolve_strike_craft<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) {
    let targets: Vec<ShipId> = state
        .ships
        .values()
        .filter(|ship| !ship.bomber_wings.is_empty())
        .map(|ship| ship.id())
        .collect();

    for target_id in targets {
        let Some(target) = state.ships.get(&target_id) else {
            continue;
        };
        let bombers = target.bomber_wings.clone();
        let friendly_fighters: f64 = target
            .fighter_wings
            .iter()
            .map(|wing| wing_health(state, &wing.ship, &wing.hangar))
            .sum();
        let escorting_fighters: f64 = bombers
            .iter()
            .filter_map(|bomber| state.ships.get(&bomber.ship))
            .flat_map(|carrier| carrier.fighter_wings.iter())
            .map(|wing| wing_health(state, &wing.ship, &wing.hangar))
            .sum();
        let defense =
            (friendly_fighters + target.turret_defense() - escorting_fighters).max(0.0);
        let share = defense / bombers.len() as f64;

        for bomber in bombers {
            let Some(carrier) = state.ships.get_mut(&bomber.ship) else {
                continue;
            };
            let Some(instance) = carrier.armaments.get_mut(&bomber.hangar) else {
                continue;
            };
            let health = match &mut instance.state {
                WeaponState::Wing { health } => {
                    *health = (*health - share).max(0.0);
                    *health
                }
                _ => continue,
            };

            let landed = (0..BOMBER_STRIKES).filter(|_| rng.gen_bool(health)).count() as u32;
            if !state.ships.contains_key(&target_id) {
                break;
            }
            if landed == 0 {
                log_miss(state, target_id, ShipAttacker::Bombers, bomber.hangar.clone());
            } else {
                apply_damage(
                    state,
                    target_id,
                    landed,
                    DamageSource::Bombers,
                    ShipAttacker::Bombers,
                    Some(bomber.hangar.clone()),
                    rng,
                );
            }
        }
    }
}

fn wing_health(state: &GameState, carrier: &ShipId, hangar: &WeaponId) -> f64 {
    state
        .ships
        .get(carrier)
        .and_then(|ship| ship.armaments.get(hangar))
        .map(|instance| instance.wing_health())
        .unwrap_or(0.0)
}

/// Each burning fire has a chance to take one hull point
pub fn resolve_fires<R: Rng + ?Sized>(state: &mut GameState, rng: &mut R) {
    let burning: Vec<(ShipId, u32)> = state
        .ships
        .values()
        .filter(|ship| ship.fires > 0)
        .map(|ship| (ship.id(), ship.fires))
        .collect();

    for (id, fires) in burning {
        let damage = (0..fires)
            .filter(|_| rng.gen_bool(FIRE_DAMAGE_CHANCE))
            .count() as u32;
        if damage > 0 {
            apply_damage(state, id, damage, DamageSource::Fire, ShipAttacker::Fire, None, rng);
        }
    }
}
