//! Per-battle ship state

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::geometry::Position;
use super::ship::{
    ModuleStatus, ReactorSpec, Ship, ShipClass, ShipDurability, ShipModule, ShipModules,
    ShipMovement, ShipPowerMode,
};
use super::types::{ShipId, Side, WeaponId};
use super::weapons::{ShipWeapon, ShipWeaponInstance, WeaponState};

/// A launched wing, identified by the carrier and hangar it came from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShipHangarWing {
    pub ship: ShipId,
    pub hangar: WeaponId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipInstance {
    pub ship: Ship,
    pub owner: Side,
    pub position: Position,
    pub facing: f64,

    pub power_mode: ShipPowerMode,
    pub weapon_power: u32,
    pub shield_power: u32,
    pub hull: u32,

    pub modules: ShipModules,
    pub fires: u32,
    pub used_repair_tokens: u32,

    pub armaments: BTreeMap<WeaponId, ShipWeaponInstance>,
    pub used_armaments: BTreeSet<WeaponId>,
    /// Friendly fighter wings flying escort over this ship
    pub fighter_wings: Vec<ShipHangarWing>,
    /// Enemy bomber wings attacking this ship
    pub bomber_wings: Vec<ShipHangarWing>,

    pub is_identified: bool,
    pub is_done: bool,
    pub has_sent_boarding_party: bool,
    pub has_used_area_pulse: bool,
}

impl ShipInstance {
    pub fn new(ship: Ship, owner: Side, position: Position, facing: f64) -> Self {
        let class = ship.class;
        let power_mode = class.weight().reactor().default_power_mode();
        let armaments = class
            .armaments()
            .into_iter()
            .map(|(id, weapon)| (id, ShipWeaponInstance::new(weapon)))
            .collect();

        Self {
            owner,
            position,
            facing,
            power_mode,
            weapon_power: power_mode.weapons,
            shield_power: power_mode.shields,
            hull: class.weight().durability().max_hull,
            modules: ShipModules::for_class(class),
            fires: 0,
            used_repair_tokens: 0,
            armaments,
            used_armaments: BTreeSet::new(),
            fighter_wings: Vec::new(),
            bomber_wings: Vec::new(),
            is_identified: false,
            is_done: false,
            has_sent_boarding_party: false,
            has_used_area_pulse: false,
            ship,
        }
    }

    pub fn id(&self) -> ShipId {
        self.ship.id
    }

    pub fn class(&self) -> ShipClass {
        self.ship.class
    }

    pub fn durability(&self) -> ShipDurability {
        self.class().weight().durability()
    }

    pub fn reactor(&self) -> ReactorSpec {
        self.class().weight().reactor()
    }

    pub fn movement(&self) -> ShipMovement {
        self.class().weight().movement()
    }

    pub fn is_flammable(&self) -> bool {
        self.class().faction().flammable_hulls()
    }

    pub fn shields_up(&self) -> bool {
        self.modules.is_intact(&ShipModule::Shields)
    }

    pub fn hull_fraction(&self) -> f64 {
        self.hull as f64 / self.durability().max_hull as f64
    }

    /// Distance this ship may cover in one move with its current engines
    pub fn max_move_distance(&self) -> f64 {
        let reactor = self.reactor();
        let base = self.movement().move_speed * self.power_mode.engines as f64
            / reactor.subsystem_amount.max(1) as f64;
        match self.modules.status(&ShipModule::Engines) {
            ModuleStatus::Intact => base,
            ModuleStatus::Damaged => base / 2.0,
            ModuleStatus::Destroyed | ModuleStatus::Absent => 0.0,
        }
    }

    pub fn can_move(&self) -> bool {
        self.max_move_distance() > 0.0
    }

    /// Still has a move to make this phase
    pub fn is_awaiting_move(&self) -> bool {
        !self.is_done && self.can_move()
    }

    pub fn turret_defense(&self) -> f64 {
        let base = self.durability().turret_defense;
        match self.modules.status(&ShipModule::Turrets) {
            ModuleStatus::Intact => base,
            ModuleStatus::Damaged => base / 2.0,
            ModuleStatus::Destroyed | ModuleStatus::Absent => 0.0,
        }
    }

    pub fn can_board(&self) -> bool {
        self.modules.is_intact(&ShipModule::Assault) && !self.has_sent_boarding_party
    }

    pub fn boarding_attack(&self) -> f64 {
        self.durability().troops as f64 * self.hull_fraction()
    }

    pub fn boarding_defense(&self) -> f64 {
        self.durability().troops as f64 * (1.0 + self.turret_defense())
    }

    pub fn remaining_repair_tokens(&self) -> u32 {
        self.durability()
            .repair_tokens
            .saturating_sub(self.used_repair_tokens)
    }

    pub fn weapon_module(id: &WeaponId) -> ShipModule {
        ShipModule::Weapon(id.clone())
    }

    /// Whether the armament in `id` can be fired right now
    pub fn can_use_weapon(&self, id: &WeaponId) -> bool {
        let Some(instance) = self.armaments.get(id) else {
            return false;
        };
        if self.used_armaments.contains(id) || !self.modules.is_intact(&Self::weapon_module(id)) {
            return false;
        }
        match (&instance.weapon, &instance.state) {
            (ShipWeapon::Cannon { .. }, _) => self.weapon_power >= instance.weapon.power_cost(),
            (ShipWeapon::Lance { .. }, WeaponState::Charging { charges }) => *charges > 0,
            (ShipWeapon::Hangar { .. }, WeaponState::Wing { health }) => *health > 0.0,
            (_, WeaponState::Limited { remaining_shots }) => *remaining_shots > 0,
            _ => false,
        }
    }

    pub fn can_charge_lance(&self, id: &WeaponId) -> bool {
        matches!(
            self.armaments.get(id),
            Some(ShipWeaponInstance { weapon: ShipWeapon::Lance { .. }, .. })
        ) && self.weapon_power > 0
            && self.modules.is_intact(&Self::weapon_module(id))
            && !self.used_armaments.contains(id)
    }

    /// Hangars whose wing is out this turn
    pub fn launched_hangars(&self) -> impl Iterator<Item = &WeaponId> + '_ {
        self.armaments
            .iter()
            .filter(|(id, instance)| {
                matches!(instance.weapon, ShipWeapon::Hangar { .. })
                    && self.used_armaments.contains(*id)
            })
            .map(|(id, _)| id)
    }

    /// Share of weapon modules still intact
    pub fn operational_weapon_fraction(&self) -> f64 {
        let (total, intact) = self
            .modules
            .iter()
            .filter(|(module, _)| matches!(module, ShipModule::Weapon(_)))
            .fold((0u32, 0u32), |(total, intact), (_, status)| {
                (total + 1, intact + u32::from(status == ModuleStatus::Intact))
            });
        if total == 0 {
            0.0
        } else {
            intact as f64 / total as f64
        }
    }

    /// Weighted strength used for initiative
    pub fn initiative_weight(&self) -> f64 {
        self.ship.point_cost() as f64
            * self.hull_fraction()
            * (0.5 + 0.5 * self.operational_weapon_fraction())
    }

    /// Restores pools and clears per-turn bookkeeping at the end of Attack
    pub fn reset_for_new_turn(&mut self) {
        self.weapon_power = self.power_mode.weapons;
        self.shield_power = if self.shields_up() {
            self.power_mode.shields
        } else {
            0
        };
        self.fighter_wings.clear();
        self.bomber_wings.clear();
        self.used_repair_tokens = 0;
        self.used_armaments.clear();
        self.has_sent_boarding_party = false;
        self.has_used_area_pulse = false;
    }

    pub fn restore_wings(&mut self) {
        for instance in self.armaments.values_mut() {
            if let WeaponState::Wing { health } = &mut instance.state {
                *health = 1.0;
            }
        }
    }
}

/// A ship that has left the battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipWreck {
    pub ship: Ship,
    pub owner: Side,
    pub position: Position,
    pub hull: u32,
    /// Escaped off the battlefield rather than destroyed
    pub is_escape: bool,
    pub turn: u32,
}

impl ShipWreck {
    pub fn from_instance(instance: &ShipInstance, is_escape: bool, turn: u32) -> Self {
        Self {
            ship: instance.ship.clone(),
            owner: instance.owner,
            position: instance.position,
            hull: instance.hull,
            is_escape,
            turn,
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.hull < self.ship.class.weight().durability().max_hull
    }
}
