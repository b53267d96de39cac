//! Ship movement, battlefield bounds and sensor identification

use crate::util::time::unix_millis;

use super::chat::ChatEntry;
use super::geometry::{Distance, Position};
use super::instance::{ShipInstance, ShipWreck};
use super::pick::PickBoundary;
use super::ship::SHIP_SENSOR_RANGE;
use super::state::GameState;
use super::types::ShipId;

/// Where a move left the ship
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    Escaped,
}

/// Movement geometry shared by the ability engine and automated players
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Outside the battlefield, which is centered on the origin
    pub fn is_out_of_bounds(position: Position, length: f64, width: f64) -> bool {
        let offset = (position - Position::ORIGIN).0;
        offset.x.abs() > length / 2.0 || offset.y.abs() > width / 2.0
    }

    /// Straight ahead from the ship, as far as its engines allow
    pub fn move_line(ship: &ShipInstance) -> PickBoundary {
        PickBoundary::AlongLine {
            start: ship.position,
            end: ship.position + Distance::polar(ship.max_move_distance(), ship.facing),
        }
    }

    /// Cone of headings the ship may turn to after arriving at `destination`
    pub fn turn_cone(ship: &ShipInstance, destination: Position) -> PickBoundary {
        PickBoundary::Angle {
            center: destination,
            mid_angle: ship.facing,
            max_angle_diff: ship.movement().turn_angle,
        }
    }

    /// Jump area of an inertialess drive, stretched along the ship's facing
    pub fn jump_area(ship: &ShipInstance) -> Option<PickBoundary> {
        let drive = ship.class().inertialess_drive()?;
        Some(PickBoundary::Ellipse {
            center: ship.position,
            width_radius: drive.jump_width,
            length_radius: drive.jump_length,
            rotation: ship.facing,
        })
    }
}

/// Places a ship and applies escape or identification. A ship that leaves
/// the battlefield becomes an escaped wreck and stays one.
pub fn relocate_ship(
    state: &mut GameState,
    id: ShipId,
    position: Position,
    facing: f64,
) -> Option<MoveOutcome> {
    let (length, width) = (state.start.battlefield_length, state.start.battlefield_width);
    let turn = state.phase.turn();
    let ship = state.ships.get_mut(&id)?;
    ship.position = position;
    ship.facing = facing;

    if PhysicsSystem::is_out_of_bounds(position, length, width) {
        let ship = state.ships.remove(&id)?;
        state
            .wrecks
            .insert(id, ShipWreck::from_instance(&ship, true, turn));
        state.log(ChatEntry::ShipEscaped {
            ship: id,
            sent_at: unix_millis(),
        });
        return Some(MoveOutcome::Escaped);
    }

    identify_around(state, id);
    Some(MoveOutcome::Moved)
}

/// Reveals enemies within the mover's sensors, and the mover to enemies that see it
pub fn identify_around(state: &mut GameState, id: ShipId) {
    let Some(mover) = state.ships.get(&id) else {
        return;
    };
    let (owner, position) = (mover.owner, mover.position);

    let spotted: Vec<ShipId> = state
        .ships
        .values()
        .filter(|other| {
            other.owner != owner && other.position.distance_to(position) <= SHIP_SENSOR_RANGE
        })
        .map(|other| other.id())
        .collect();

    let mut newly_identified = Vec::new();
    if !spotted.is_empty() {
        newly_identified.push(id);
    }
    newly_identified.extend(spotted);

    for ship_id in newly_identified {
        if let Some(ship) = state.ships.get_mut(&ship_id) {
            if !ship.is_identified {
                ship.is_identified = true;
                state.log(ChatEntry::ShipIdentified {
                    ship: ship_id,
                    sent_at: unix_millis(),
                });
            }
        }
    }
}

/// Identification pass over the whole battlefield, run when deployment ends
pub fn sensor_sweep(state: &mut GameState) {
    let ids: Vec<ShipId> = state.ships.keys().copied().collect();
    for id in ids {
        identify_around(state, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert!(!PhysicsSystem::is_out_of_bounds(Position::new(4999.0, 0.0), 10000.0, 6000.0));
        assert!(PhysicsSystem::is_out_of_bounds(Position::new(5001.0, 0.0), 10000.0, 6000.0));
        assert!(PhysicsSystem::is_out_of_bounds(Position::new(0.0, -3001.0), 10000.0, 6000.0));
    }

    #[test]
    fn test_ship_escapes_exactly_once() {
        use crate::game::ship::ShipClass;
        use crate::game::state::tests::battle;

        let mut state = battle(&[ShipClass::Picket], &[ShipClass::Needle]);
        let picket = state
            .ships
            .values()
            .find(|ship| ship.class() == ShipClass::Picket)
            .map(|ship| ship.id())
            .unwrap();
        let far_away = Position::new(1.0e6, 0.0);

        assert_eq!(relocate_ship(&mut state, picket, far_away, 0.0), Some(MoveOutcome::Escaped));
        assert_eq!(relocate_ship(&mut state, picket, far_away, 0.0), None);

        assert!(!state.ships.contains_key(&picket));
        assert!(state.wrecks[&picket].is_escape);
        let escapes = state
            .chat
            .iter()
            .filter(|entry| matches!(entry, ChatEntry::ShipEscaped { ship, .. } if *ship == picket))
            .count();
        assert_eq!(escapes, 1);
    }
}
