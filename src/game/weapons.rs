//! Weapon definitions, firing arcs and per-battle weapon state

use std::collections::BTreeSet;
use std::f64::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};

use super::geometry::normalize_angle;

/// Range at which hangars can send their wings
pub const HANGAR_RANGE: f64 = 4000.0;

pub const CANNON_DAMAGE_PER_HIT: u32 = 1;
pub const LANCE_DAMAGE: u32 = 2;

pub const MEGA_CANNON_MIN_RANGE: f64 = 1000.0;
pub const MEGA_CANNON_MAX_RANGE: f64 = 6000.0;
pub const MEGA_CANNON_BLAST_RADIUS: f64 = 600.0;
pub const MEGA_CANNON_DAMAGE: u32 = 3;
pub const MEGA_CANNON_SHOTS: u32 = 3;

pub const REVELATION_GUN_RANGE: f64 = 4000.0;
pub const REVELATION_GUN_DAMAGE: u32 = 8;
pub const REVELATION_GUN_SHOTS: u32 = 1;

pub const EMP_ANTENNA_RANGE: f64 = 3000.0;
pub const EMP_ANTENNA_SHOTS: u32 = 2;

/// Angular sector around a ship, relative to its facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringArc {
    Bow,
    AbeamPort,
    AbeamStarboard,
    Stern,
}

impl FiringArc {
    pub const ALL: [FiringArc; 4] = [
        FiringArc::Bow,
        FiringArc::AbeamPort,
        FiringArc::AbeamStarboard,
        FiringArc::Stern,
    ];

    /// Whether a bearing relative to the ship's facing lies in this arc.
    /// Arc edges belong to both neighbouring arcs.
    pub fn contains(self, relative_bearing: f64) -> bool {
        const EDGE: f64 = 1e-9;
        let bearing = normalize_angle(relative_bearing);
        match self {
            FiringArc::Bow => bearing.abs() <= FRAC_PI_4 + EDGE,
            FiringArc::Stern => bearing.abs() >= 3.0 * FRAC_PI_4 - EDGE,
            FiringArc::AbeamPort => {
                bearing >= FRAC_PI_4 - EDGE && bearing <= 3.0 * FRAC_PI_4 + EDGE
            }
            FiringArc::AbeamStarboard => {
                bearing <= -FRAC_PI_4 + EDGE && bearing >= -3.0 * FRAC_PI_4 - EDGE
            }
        }
    }
}

pub fn arcs(list: &[FiringArc]) -> BTreeSet<FiringArc> {
    list.iter().copied().collect()
}

pub fn all_arcs() -> BTreeSet<FiringArc> {
    arcs(&FiringArc::ALL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeCraftWing {
    Fighters,
    Bombers,
}

/// What a weapon may be pointed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponTarget {
    EnemyShip,
    FriendlyShip,
    Location,
}

/// Static definition of an armament slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShipWeapon {
    Cannon {
        num_shots: u32,
        range: f64,
        firing_arcs: BTreeSet<FiringArc>,
    },
    Lance {
        range: f64,
        firing_arcs: BTreeSet<FiringArc>,
    },
    Hangar {
        wing: StrikeCraftWing,
    },
    MegaCannon,
    RevelationGun,
    EmpAntenna,
}

impl ShipWeapon {
    pub fn cannon(num_shots: u32, range: f64, firing_arcs: &[FiringArc]) -> Self {
        ShipWeapon::Cannon {
            num_shots,
            range,
            firing_arcs: arcs(firing_arcs),
        }
    }

    pub fn lance(range: f64, firing_arcs: &[FiringArc]) -> Self {
        ShipWeapon::Lance {
            range,
            firing_arcs: arcs(firing_arcs),
        }
    }

    pub fn hangar(wing: StrikeCraftWing) -> Self {
        ShipWeapon::Hangar { wing }
    }

    pub fn min_range(&self) -> f64 {
        match self {
            ShipWeapon::MegaCannon => MEGA_CANNON_MIN_RANGE,
            _ => 0.0,
        }
    }

    pub fn max_range(&self) -> f64 {
        match self {
            ShipWeapon::Cannon { range, .. } | ShipWeapon::Lance { range, .. } => *range,
            ShipWeapon::Hangar { .. } => HANGAR_RANGE,
            ShipWeapon::MegaCannon => MEGA_CANNON_MAX_RANGE,
            ShipWeapon::RevelationGun => REVELATION_GUN_RANGE,
            ShipWeapon::EmpAntenna => EMP_ANTENNA_RANGE,
        }
    }

    pub fn firing_arcs(&self) -> BTreeSet<FiringArc> {
        match self {
            ShipWeapon::Cannon { firing_arcs, .. } | ShipWeapon::Lance { firing_arcs, .. } => {
                firing_arcs.clone()
            }
            ShipWeapon::Hangar { .. } | ShipWeapon::EmpAntenna => all_arcs(),
            ShipWeapon::MegaCannon | ShipWeapon::RevelationGun => arcs(&[FiringArc::Bow]),
        }
    }

    pub fn target(&self) -> WeaponTarget {
        match self {
            ShipWeapon::Hangar {
                wing: StrikeCraftWing::Fighters,
            } => WeaponTarget::FriendlyShip,
            ShipWeapon::MegaCannon => WeaponTarget::Location,
            _ => WeaponTarget::EnemyShip,
        }
    }

    /// Weapon power spent by one use
    pub fn power_cost(&self) -> u32 {
        match self {
            ShipWeapon::Cannon { .. } => 1,
            _ => 0,
        }
    }

    pub fn initial_state(&self) -> WeaponState {
        match self {
            ShipWeapon::Cannon { .. } => WeaponState::Ready,
            ShipWeapon::Lance { .. } => WeaponState::Charging { charges: 0 },
            ShipWeapon::Hangar { .. } => WeaponState::Wing { health: 1.0 },
            ShipWeapon::MegaCannon => WeaponState::Limited {
                remaining_shots: MEGA_CANNON_SHOTS,
            },
            ShipWeapon::RevelationGun => WeaponState::Limited {
                remaining_shots: REVELATION_GUN_SHOTS,
            },
            ShipWeapon::EmpAntenna => WeaponState::Limited {
                remaining_shots: EMP_ANTENNA_SHOTS,
            },
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ShipWeapon::Cannon { .. } => "cannon battery",
            ShipWeapon::Lance { .. } => "lance",
            ShipWeapon::Hangar {
                wing: StrikeCraftWing::Fighters,
            } => "fighter hangar",
            ShipWeapon::Hangar {
                wing: StrikeCraftWing::Bombers,
            } => "bomber hangar",
            ShipWeapon::MegaCannon => "mega cannon",
            ShipWeapon::RevelationGun => "revelation gun",
            ShipWeapon::EmpAntenna => "EMP antenna",
        }
    }
}

/// Mutable per-battle state of one armament
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WeaponState {
    /// Cannons carry no state; their ammunition is the ship's weapon power
    Ready,
    Charging { charges: u32 },
    /// Health fraction of the hangar's wing; the wing is lost at zero
    Wing { health: f64 },
    Limited { remaining_shots: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipWeaponInstance {
    pub weapon: ShipWeapon,
    pub state: WeaponState,
}

impl ShipWeaponInstance {
    pub fn new(weapon: ShipWeapon) -> Self {
        let state = weapon.initial_state();
        Self { weapon, state }
    }

    pub fn wing_health(&self) -> f64 {
        match self.state {
            WeaponState::Wing { health } => health,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_firing_arcs_cover_the_circle() {
        let mut bearing = -PI;
        while bearing <= PI {
            assert!(
                FiringArc::ALL.iter().any(|arc| arc.contains(bearing)),
                "bearing {} not covered",
                bearing
            );
            bearing += 0.01;
        }
    }

    #[test]
    fn test_firing_arc_sides() {
        assert!(FiringArc::Bow.contains(0.0));
        assert!(!FiringArc::Bow.contains(FRAC_PI_2));
        assert!(FiringArc::AbeamPort.contains(FRAC_PI_2));
        assert!(FiringArc::AbeamStarboard.contains(-FRAC_PI_2));
        assert!(FiringArc::Stern.contains(PI));
        assert!(FiringArc::Stern.contains(-PI + 0.1));
    }

    #[test]
    fn test_initial_states() {
        let lance = ShipWeaponInstance::new(ShipWeapon::lance(3000.0, &[FiringArc::Bow]));
        assert_eq!(lance.state, WeaponState::Charging { charges: 0 });
        let hangar = ShipWeaponInstance::new(ShipWeapon::hangar(StrikeCraftWing::Bombers));
        assert_eq!(hangar.wing_health(), 1.0);
        let mega = ShipWeaponInstance::new(ShipWeapon::MegaCannon);
        assert_eq!(
            mega.state,
            WeaponState::Limited {
                remaining_shots: MEGA_CANNON_SHOTS
            }
        );
        assert_eq!(ShipWeapon::MegaCannon.target(), WeaponTarget::Location);
    }
}
