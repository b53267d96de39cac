//! Ship catalogue: factions, weight classes, classes, modules and power

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ShipId, WeaponId};
use super::weapons::{FiringArc, ShipWeapon, StrikeCraftWing};

/// Footprint radius of a ship; also the reference distance for hit chance
pub const SHIP_BASE_SIZE: f64 = 250.0;
/// Distance within which enemy ships get identified
pub const SHIP_SENSOR_RANGE: f64 = 4000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Concordat,
    Ironhold,
    Veilborn,
    Tessari,
}

impl Faction {
    pub fn flammable_hulls(self) -> bool {
        matches!(self, Faction::Veilborn | Faction::Tessari)
    }

    pub fn can_recoalesce(self) -> bool {
        matches!(self, Faction::Tessari)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightClass {
    Escort,
    Destroyer,
    Cruiser,
    Battlecruiser,
    Battleship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactorSpec {
    pub power_output: u32,
    pub subsystem_amount: u32,
    pub grid_efficiency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShipMovement {
    /// Maximum turn per move, in radians
    pub turn_angle: f64,
    /// Maximum distance per move at full engine power
    pub move_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShipDurability {
    pub max_hull: u32,
    pub repair_tokens: u32,
    pub turret_defense: f64,
    pub troops: u32,
}

impl WeightClass {
    pub fn durability(self) -> ShipDurability {
        let (max_hull, repair_tokens, turret_defense, troops) = match self {
            WeightClass::Escort => (4, 1, 0.5, 1),
            WeightClass::Destroyer => (6, 1, 1.0, 2),
            WeightClass::Cruiser => (8, 2, 1.5, 3),
            WeightClass::Battlecruiser => (10, 2, 1.5, 4),
            WeightClass::Battleship => (14, 3, 2.0, 5),
        };
        ShipDurability {
            max_hull,
            repair_tokens,
            turret_defense,
            troops,
        }
    }

    pub fn reactor(self) -> ReactorSpec {
        let (power_output, grid_efficiency) = match self {
            WeightClass::Escort => (6, 1),
            WeightClass::Destroyer => (9, 1),
            WeightClass::Cruiser => (12, 2),
            WeightClass::Battlecruiser => (15, 2),
            WeightClass::Battleship => (18, 3),
        };
        ReactorSpec {
            power_output,
            subsystem_amount: power_output / 3,
            grid_efficiency,
        }
    }

    pub fn movement(self) -> ShipMovement {
        let (degrees, move_speed): (f64, f64) = match self {
            WeightClass::Escort => (90.0, 2000.0),
            WeightClass::Destroyer => (75.0, 1750.0),
            WeightClass::Cruiser => (60.0, 1500.0),
            WeightClass::Battlecruiser => (50.0, 1400.0),
            WeightClass::Battleship => (40.0, 1200.0),
        };
        ShipMovement {
            turn_angle: degrees.to_radians(),
            move_speed,
        }
    }

    /// Displacement in kilotonnes, used for rewards
    pub fn tonnage(self) -> u32 {
        match self {
            WeightClass::Escort => 5,
            WeightClass::Destroyer => 12,
            WeightClass::Cruiser => 30,
            WeightClass::Battlecruiser => 45,
            WeightClass::Battleship => 70,
        }
    }

    pub fn has_assault_module(self) -> bool {
        !matches!(self, WeightClass::Escort)
    }
}

/// Short-range teleport carried by some Veilborn hulls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialessDrive {
    pub jump_length: f64,
    pub jump_width: f64,
    pub power_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseEmitter {
    pub radius: f64,
    pub damage: u32,
    pub power_cost: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipClass {
    Picket,
    Warden,
    Sentinel,
    Bastion,
    Anvil,
    Hammer,
    Citadel,
    Wisp,
    Shade,
    Eclipse,
    Needle,
    Hive,
    Swarmmother,
}

impl ShipClass {
    pub const ALL: [ShipClass; 13] = [
        ShipClass::Picket,
        ShipClass::Warden,
        ShipClass::Sentinel,
        ShipClass::Bastion,
        ShipClass::Anvil,
        ShipClass::Hammer,
        ShipClass::Citadel,
        ShipClass::Wisp,
        ShipClass::Shade,
        ShipClass::Eclipse,
        ShipClass::Needle,
        ShipClass::Hive,
        ShipClass::Swarmmother,
    ];

    pub fn faction(self) -> Faction {
        use ShipClass::*;
        match self {
            Picket | Warden | Sentinel | Bastion => Faction::Concordat,
            Anvil | Hammer | Citadel => Faction::Ironhold,
            Wisp | Shade | Eclipse => Faction::Veilborn,
            Needle | Hive | Swarmmother => Faction::Tessari,
        }
    }

    pub fn weight(self) -> WeightClass {
        use ShipClass::*;
        match self {
            Picket | Wisp | Needle => WeightClass::Escort,
            Warden | Anvil => WeightClass::Destroyer,
            Sentinel | Hammer | Shade | Hive => WeightClass::Cruiser,
            Eclipse => WeightClass::Battlecruiser,
            Bastion | Citadel | Swarmmother => WeightClass::Battleship,
        }
    }

    pub fn point_cost(self) -> u32 {
        use ShipClass::*;
        match self {
            Picket => 50,
            Warden => 100,
            Sentinel => 150,
            Bastion => 300,
            Anvil => 100,
            Hammer => 200,
            Citadel => 350,
            Wisp => 60,
            Shade => 175,
            Eclipse => 250,
            Needle => 40,
            Hive => 160,
            Swarmmother => 320,
        }
    }

    pub fn inertialess_drive(self) -> Option<InertialessDrive> {
        let (jump_length, jump_width) = match self {
            ShipClass::Wisp => (1500.0, 750.0),
            ShipClass::Shade => (2000.0, 1000.0),
            ShipClass::Eclipse => (2500.0, 1250.0),
            _ => return None,
        };
        Some(InertialessDrive {
            jump_length,
            jump_width,
            power_cost: 2,
        })
    }

    pub fn pulse_emitter(self) -> Option<PulseEmitter> {
        match self {
            ShipClass::Shade | ShipClass::Eclipse => Some(PulseEmitter {
                radius: 1500.0,
                damage: 1,
                power_cost: 2,
            }),
            _ => None,
        }
    }

    /// Armament slots in a stable order
    pub fn armaments(self) -> Vec<(WeaponId, ShipWeapon)> {
        use FiringArc::*;
        use ShipClass::*;
        use StrikeCraftWing::*;

        let slots: Vec<(&str, ShipWeapon)> = match self {
            Picket => vec![("bow_cannons", ShipWeapon::cannon(2, 2000.0, &[Bow]))],
            Warden => vec![
                ("bow_cannons", ShipWeapon::cannon(3, 2500.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(2, 2000.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(2, 2000.0, &[AbeamStarboard])),
            ],
            Sentinel => vec![
                ("bow_cannons", ShipWeapon::cannon(3, 2500.0, &[Bow])),
                ("bow_lance", ShipWeapon::lance(3000.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamStarboard])),
                ("fighter_bay", ShipWeapon::hangar(Fighters)),
            ],
            Bastion => vec![
                ("bow_lance_1", ShipWeapon::lance(3500.0, &[Bow])),
                ("bow_lance_2", ShipWeapon::lance(3500.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(4, 2500.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(4, 2500.0, &[AbeamStarboard])),
                ("stern_cannons", ShipWeapon::cannon(2, 1500.0, &[Stern])),
                ("fighter_bay", ShipWeapon::hangar(Fighters)),
                ("bomber_bay", ShipWeapon::hangar(Bombers)),
            ],
            Anvil => vec![
                ("bow_cannons", ShipWeapon::cannon(4, 2500.0, &[Bow])),
                ("stern_cannons", ShipWeapon::cannon(2, 1500.0, &[Stern])),
            ],
            Hammer => vec![
                ("mega_cannon", ShipWeapon::MegaCannon),
                ("port_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamStarboard])),
            ],
            Citadel => vec![
                ("mega_cannon", ShipWeapon::MegaCannon),
                ("emp_antenna", ShipWeapon::EmpAntenna),
                ("port_cannons", ShipWeapon::cannon(4, 2500.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(4, 2500.0, &[AbeamStarboard])),
                ("fighter_bay", ShipWeapon::hangar(Fighters)),
            ],
            Wisp => vec![("bow_lance", ShipWeapon::lance(2500.0, &[Bow]))],
            Shade => vec![
                ("bow_lance_1", ShipWeapon::lance(3000.0, &[Bow])),
                ("bow_lance_2", ShipWeapon::lance(3000.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(2, 2000.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(2, 2000.0, &[AbeamStarboard])),
            ],
            Eclipse => vec![
                ("revelation_gun", ShipWeapon::RevelationGun),
                ("bow_lance", ShipWeapon::lance(3000.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(3, 2500.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(3, 2500.0, &[AbeamStarboard])),
            ],
            Needle => vec![("bow_cannons", ShipWeapon::cannon(2, 2000.0, &[Bow]))],
            Hive => vec![
                ("point_cannons", ShipWeapon::cannon(2, 1500.0, &FiringArc::ALL)),
                ("fighter_bay_1", ShipWeapon::hangar(Fighters)),
                ("fighter_bay_2", ShipWeapon::hangar(Fighters)),
                ("bomber_bay_1", ShipWeapon::hangar(Bombers)),
                ("bomber_bay_2", ShipWeapon::hangar(Bombers)),
            ],
            Swarmmother => vec![
                ("bow_lance", ShipWeapon::lance(3000.0, &[Bow])),
                ("port_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamPort])),
                ("starboard_cannons", ShipWeapon::cannon(3, 2000.0, &[AbeamStarboard])),
                ("fighter_bay_1", ShipWeapon::hangar(Fighters)),
                ("fighter_bay_2", ShipWeapon::hangar(Fighters)),
                ("bomber_bay_1", ShipWeapon::hangar(Bombers)),
                ("bomber_bay_2", ShipWeapon::hangar(Bombers)),
                ("bomber_bay_3", ShipWeapon::hangar(Bombers)),
            ],
        };

        slots
            .into_iter()
            .map(|(id, weapon)| (WeaponId::new(id), weapon))
            .collect()
    }

    pub fn display_name(self) -> &'static str {
        use ShipClass::*;
        match self {
            Picket => "Picket",
            Warden => "Warden",
            Sentinel => "Sentinel",
            Bastion => "Bastion",
            Anvil => "Anvil",
            Hammer => "Hammer",
            Citadel => "Citadel",
            Wisp => "Wisp",
            Shade => "Shade",
            Eclipse => "Eclipse",
            Needle => "Needle",
            Hive => "Hive",
            Swarmmother => "Swarmmother",
        }
    }
}

/// A ship from an admiral's roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub id: ShipId,
    pub name: String,
    pub class: ShipClass,
}

impl Ship {
    pub fn new(name: impl Into<String>, class: ShipClass) -> Self {
        Self {
            id: ShipId::new(),
            name: name.into(),
            class,
        }
    }

    pub fn point_cost(&self) -> u32 {
        self.class.point_cost()
    }
}

/// Damageable component of a ship. Serialized as a string so it can key a map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ShipModule {
    Shields,
    Engines,
    Turrets,
    Assault,
    Weapon(WeaponId),
}

impl fmt::Display for ShipModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShipModule::Shields => f.write_str("shields"),
            ShipModule::Engines => f.write_str("engines"),
            ShipModule::Turrets => f.write_str("turrets"),
            ShipModule::Assault => f.write_str("assault"),
            ShipModule::Weapon(id) => write!(f, "weapon:{}", id),
        }
    }
}

impl From<ShipModule> for String {
    fn from(module: ShipModule) -> String {
        module.to_string()
    }
}

impl TryFrom<String> for ShipModule {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "shields" => Ok(ShipModule::Shields),
            "engines" => Ok(ShipModule::Engines),
            "turrets" => Ok(ShipModule::Turrets),
            "assault" => Ok(ShipModule::Assault),
            other => match other.strip_prefix("weapon:") {
                Some(id) if !id.is_empty() => Ok(ShipModule::Weapon(WeaponId::new(id))),
                _ => Err(format!("unknown ship module '{}'", value)),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Intact,
    Damaged,
    Destroyed,
    Absent,
}

impl ModuleStatus {
    /// Status after one point of damage
    pub fn damaged(self) -> Self {
        match self {
            ModuleStatus::Intact => ModuleStatus::Damaged,
            ModuleStatus::Damaged | ModuleStatus::Destroyed => ModuleStatus::Destroyed,
            ModuleStatus::Absent => ModuleStatus::Absent,
        }
    }
}

/// Status of every module a ship has
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipModules(BTreeMap<ShipModule, ModuleStatus>);

impl ShipModules {
    pub fn for_class(class: ShipClass) -> Self {
        let mut modules = BTreeMap::new();
        modules.insert(ShipModule::Shields, ModuleStatus::Intact);
        modules.insert(ShipModule::Engines, ModuleStatus::Intact);
        modules.insert(ShipModule::Turrets, ModuleStatus::Intact);
        let assault = if class.weight().has_assault_module() {
            ModuleStatus::Intact
        } else {
            ModuleStatus::Absent
        };
        modules.insert(ShipModule::Assault, assault);
        for (id, _) in class.armaments() {
            modules.insert(ShipModule::Weapon(id), ModuleStatus::Intact);
        }
        Self(modules)
    }

    pub fn status(&self, module: &ShipModule) -> ModuleStatus {
        self.0.get(module).copied().unwrap_or(ModuleStatus::Absent)
    }

    pub fn is_intact(&self, module: &ShipModule) -> bool {
        self.status(module) == ModuleStatus::Intact
    }

    pub fn damage(&mut self, module: &ShipModule) {
        if let Some(status) = self.0.get_mut(module) {
            *status = status.damaged();
        }
    }

    pub fn damage_all(&mut self) {
        for status in self.0.values_mut() {
            *status = status.damaged();
        }
    }

    pub fn damage_weapons(&mut self) {
        for (module, status) in self.0.iter_mut() {
            if matches!(module, ShipModule::Weapon(_)) {
                *status = status.damaged();
            }
        }
    }

    /// Returns false unless the module was damaged
    pub fn repair(&mut self, module: &ShipModule) -> bool {
        match self.0.get_mut(module) {
            Some(status) if *status == ModuleStatus::Damaged => {
                *status = ModuleStatus::Intact;
                true
            }
            _ => false,
        }
    }

    /// Modules that can still take damage
    pub fn damageable(&self) -> Vec<ShipModule> {
        self.0
            .iter()
            .filter(|(_, status)| matches!(status, ModuleStatus::Intact | ModuleStatus::Damaged))
            .map(|(module, _)| module.clone())
            .collect()
    }

    pub fn damageable_weapons(&self) -> Vec<ShipModule> {
        self.damageable()
            .into_iter()
            .filter(|module| matches!(module, ShipModule::Weapon(_)))
            .collect()
    }

    pub fn damaged(&self) -> impl Iterator<Item = &ShipModule> + '_ {
        self.0
            .iter()
            .filter(|(_, status)| **status == ModuleStatus::Damaged)
            .map(|(module, _)| module)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShipModule, ModuleStatus)> + '_ {
        self.0.iter().map(|(module, status)| (module, *status))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipPowerMode {
    pub weapons: u32,
    pub shields: u32,
    pub engines: u32,
}

impl ShipPowerMode {
    /// Widened so client-supplied allocations cannot wrap
    pub fn total(&self) -> u64 {
        u64::from(self.weapons) + u64::from(self.shields) + u64::from(self.engines)
    }

    /// Units of power moved between subsystems to get from `self` to `other`
    pub fn transfer_distance(&self, other: &ShipPowerMode) -> u64 {
        u64::from(self.weapons.abs_diff(other.weapons))
            + u64::from(self.shields.abs_diff(other.shields))
            + u64::from(self.engines.abs_diff(other.engines))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowerError {
    #[error("power allocation must total {expected}, got {actual}")]
    WrongTotal { expected: u32, actual: u64 },
    #[error("can only move {max} units of power per turn, tried {moved}")]
    TransferTooLarge { moved: u64, max: u32 },
}

impl ReactorSpec {
    pub fn default_power_mode(&self) -> ShipPowerMode {
        let subsystem = self.subsystem_amount;
        ShipPowerMode {
            weapons: subsystem,
            shields: subsystem,
            engines: self.power_output - 2 * subsystem,
        }
    }

    pub fn max_transfer(&self) -> u32 {
        2 * self.grid_efficiency
    }

    pub fn check_allocation(&self, mode: &ShipPowerMode) -> Result<(), PowerError> {
        if mode.total() != u64::from(self.power_output) {
            return Err(PowerError::WrongTotal {
                expected: self.power_output,
                actual: mode.total(),
            });
        }
        Ok(())
    }

    pub fn check_transfer(
        &self,
        previous: &ShipPowerMode,
        next: &ShipPowerMode,
    ) -> Result<(), PowerError> {
        self.check_allocation(next)?;
        let moved = previous.transfer_distance(next);
        if moved > u64::from(self.max_transfer()) {
            return Err(PowerError::TransferTooLarge {
                moved,
                max: self.max_transfer(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_serializes_as_map_key() {
        let modules = ShipModules::for_class(ShipClass::Picket);
        let json = serde_json::to_string(&modules).unwrap();
        assert!(json.contains("\"weapon:bow_cannons\":\"intact\""));
        assert!(json.contains("\"assault\":\"absent\""));
        let back: ShipModules = serde_json::from_str(&json).unwrap();
        assert_eq!(back, modules);
    }

    #[test]
    fn test_module_damage_escalates_and_absent_is_terminal() {
        let mut modules = ShipModules::for_class(ShipClass::Needle);
        modules.damage(&ShipModule::Shields);
        assert_eq!(modules.status(&ShipModule::Shields), ModuleStatus::Damaged);
        modules.damage(&ShipModule::Shields);
        assert_eq!(modules.status(&ShipModule::Shields), ModuleStatus::Destroyed);
        assert!(!modules.repair(&ShipModule::Shields));

        modules.damage_all();
        assert_eq!(modules.status(&ShipModule::Assault), ModuleStatus::Absent);
        assert!(modules.repair(&ShipModule::Engines));
        assert!(modules.is_intact(&ShipModule::Engines));
    }

    #[test]
    fn test_power_transfer_limits() {
        let reactor = WeightClass::Cruiser.reactor();
        let start = reactor.default_power_mode();
        assert_eq!(start.total(), 12);

        let shifted = ShipPowerMode {
            weapons: start.weapons + 2,
            shields: start.shields - 2,
            engines: start.engines,
        };
        assert!(reactor.check_transfer(&start, &shifted).is_ok());

        let too_far = ShipPowerMode {
            weapons: start.weapons + 3,
            shields: start.shields - 3,
            engines: start.engines,
        };
        assert_eq!(
            reactor.check_transfer(&start, &too_far),
            Err(PowerError::TransferTooLarge { moved: 6, max: 4 })
        );

        let wrong = ShipPowerMode {
            weapons: 1,
            shields: 1,
            engines: 1,
        };
        assert!(matches!(
            reactor.check_allocation(&wrong),
            Err(PowerError::WrongTotal { .. })
        ));
    }

    #[test]
    fn test_catalogue_is_consistent() {
        for class in ShipClass::ALL {
            assert!(!class.armaments().is_empty());
            let reactor = class.weight().reactor();
            assert_eq!(
                reactor.default_power_mode().total(),
                u64::from(reactor.power_output)
            );
            if class.faction() == Faction::Tessari {
                assert!(class.faction().flammable_hulls());
            }
        }
    }
}
