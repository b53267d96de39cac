//! Opponents for training battles

use rand::seq::SliceRandom;
use rand::Rng;

use super::ship::{Faction, Ship, ShipClass};
use super::start::{BattleSize, PlayerSetup};
use super::state::AdmiralSummary;

const AI_ADMIRAL_NAMES: [&str; 8] = [
    "Admiral Vasht",
    "Commodore Ilen Marr",
    "Fleet Captain Oduya",
    "Warmaster Kethrin",
    "The Pale Regent",
    "Admiral Sorrow-of-Tides",
    "Overseer Nine",
    "High Captain Bellweather",
];

const SHIP_NAMES: [&str; 16] = [
    "Ashen Vow",
    "Quiet Ruin",
    "Last Lantern",
    "Iron Psalm",
    "Distant Thunder",
    "Glass Tyrant",
    "Cinder Saint",
    "Hollow Crown",
    "Seventh Oath",
    "Red Meridian",
    "Pale Horizon",
    "Bitter Harvest",
    "Sable Wake",
    "Errant Star",
    "Widow's Due",
    "Long Silence",
];

/// Cap on ships so tiny classes cannot flood big battles
const MAX_AI_SHIPS: usize = 12;

pub fn ai_admiral<R: Rng + ?Sized>(rng: &mut R) -> AdmiralSummary {
    let name = AI_ADMIRAL_NAMES
        .choose(rng)
        .copied()
        .unwrap_or("Admiral Vasht");
    AdmiralSummary {
        id: uuid::Builder::from_random_bytes(rng.gen()).into_uuid(),
        name: name.to_string(),
        is_ai: true,
    }
}

/// A single-faction fleet that spends as much of the battle budget as it can
pub fn generate_fleet<R: Rng + ?Sized>(size: BattleSize, rng: &mut R) -> Vec<Ship> {
    let factions = [
        Faction::Concordat,
        Faction::Ironhold,
        Faction::Veilborn,
        Faction::Tessari,
    ];
    let faction = *factions.choose(rng).unwrap_or(&Faction::Concordat);
    let classes: Vec<ShipClass> = ShipClass::ALL
        .into_iter()
        .filter(|class| class.faction() == faction)
        .collect();

    let mut budget = size.points();
    let mut fleet = Vec::new();
    while fleet.len() < MAX_AI_SHIPS {
        let affordable: Vec<ShipClass> = classes
            .iter()
            .copied()
            .filter(|class| class.point_cost() <= budget)
            .collect();
        let Some(class) = affordable.choose(rng).copied() else {
            break;
        };
        budget -= class.point_cost();
        let name = SHIP_NAMES
            .choose(rng)
            .copied()
            .unwrap_or("Errant Star");
        fleet.push(Ship::new(format!("{} {}", name, fleet.len() + 1), class));
    }
    fleet
}

pub fn ai_setup<R: Rng + ?Sized>(size: BattleSize, rng: &mut R) -> PlayerSetup {
    PlayerSetup {
        admiral: ai_admiral(rng),
        fleet: generate_fleet(size, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_fleet_fits_budget_and_faction() {
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        for size in BattleSize::ALL {
            let fleet = generate_fleet(size, &mut rng);
            assert!(!fleet.is_empty());
            assert!(fleet.len() <= MAX_AI_SHIPS);
            let spent: u32 = fleet.iter().map(|ship| ship.point_cost()).sum();
            assert!(spent <= size.points());
            let faction = fleet[0].class.faction();
            assert!(fleet.iter().all(|ship| ship.class.faction() == faction));
        }
    }

    #[test]
    fn test_ai_admiral_is_flagged() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(ai_admiral(&mut rng).is_ai);
    }
}
