//! Target selection: what a client may point at, and the server-side check

use std::collections::BTreeSet;
use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{angle_diff, distance_to_segment, Distance, Position};
use super::ship::SHIP_BASE_SIZE;
use super::state::GameState;
use super::types::{ShipId, Side};
use super::weapons::FiringArc;

/// Tolerance for picks that must lie on a line
pub const ALONG_LINE_TOLERANCE: f64 = 1.0;

const SELF_PICK_EPSILON: f64 = 1e-6;

/// Region a pick must fall into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "boundary", rename_all = "snake_case")]
pub enum PickBoundary {
    /// Axis aligned; `length2` is the half extent along x, `width2` along y
    Rectangle {
        center: Position,
        width2: f64,
        length2: f64,
    },
    AlongLine {
        start: Position,
        end: Position,
    },
    /// Any point whose bearing from `center` is within `max_angle_diff` of `mid_angle`
    Angle {
        center: Position,
        mid_angle: f64,
        max_angle_diff: f64,
    },
    /// `length_radius` runs along `rotation`
    Ellipse {
        center: Position,
        width_radius: f64,
        length_radius: f64,
        rotation: f64,
    },
    WeaponsFire {
        center: Position,
        facing: f64,
        min_distance: f64,
        max_distance: f64,
        firing_arcs: BTreeSet<FiringArc>,
        can_select_self: bool,
    },
}

impl PickBoundary {
    pub fn contains(&self, point: Position) -> bool {
        if !point.x().is_finite() || !point.y().is_finite() {
            return false;
        }
        match self {
            PickBoundary::Rectangle {
                center,
                width2,
                length2,
            } => {
                (point.x() - center.x()).abs() <= *length2
                    && (point.y() - center.y()).abs() <= *width2
            }
            PickBoundary::AlongLine { start, end } => {
                distance_to_segment(point, *start, *end) <= ALONG_LINE_TOLERANCE
            }
            PickBoundary::Angle {
                center,
                mid_angle,
                max_angle_diff,
            } => {
                let offset = point - *center;
                offset.length() > SELF_PICK_EPSILON
                    && angle_diff(offset.angle(), *mid_angle) <= *max_angle_diff + 1e-9
            }
            PickBoundary::Ellipse {
                center,
                width_radius,
                length_radius,
                rotation,
            } => {
                let local = (point - *center).rotated(-rotation).0;
                let x = local.x / length_radius;
                let y = local.y / width_radius;
                x * x + y * y <= 1.0 + 1e-9
            }
            PickBoundary::WeaponsFire {
                center,
                facing,
                min_distance,
                max_distance,
                firing_arcs,
                can_select_self,
            } => {
                let offset = point - *center;
                let distance = offset.length();
                if distance < SELF_PICK_EPSILON {
                    return *can_select_self;
                }
                let bearing = offset.angle() - facing;
                distance >= *min_distance
                    && distance <= *max_distance
                    && firing_arcs.iter().any(|arc| arc.contains(bearing))
            }
        }
    }

    /// A random point inside the boundary, used by automated players
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        match self {
            PickBoundary::Rectangle {
                center,
                width2,
                length2,
            } => {
                *center
                    + Distance::new(
                        rng.gen_range(-1.0f64..=1.0) * *length2,
                        rng.gen_range(-1.0f64..=1.0) * *width2,
                    )
            }
            PickBoundary::AlongLine { start, end } => {
                let t: f64 = rng.gen_range(0.0..=1.0);
                *start + (*end - *start) * t
            }
            PickBoundary::Angle {
                center,
                mid_angle,
                max_angle_diff,
            } => {
                let angle = *mid_angle + rng.gen_range(-1.0f64..=1.0) * *max_angle_diff;
                *center + Distance::polar(SHIP_BASE_SIZE * 4.0, angle)
            }
            PickBoundary::Ellipse {
                center,
                width_radius,
                length_radius,
                rotation,
            } => {
                let angle = rng.gen_range(0.0..TAU);
                let radius = rng.gen_range(0.0f64..=1.0).sqrt();
                let local = Distance::new(
                    angle.cos() * radius * length_radius,
                    angle.sin() * radius * width_radius,
                );
                *center + local.rotated(*rotation)
            }
            PickBoundary::WeaponsFire {
                center,
                facing,
                min_distance,
                max_distance,
                firing_arcs,
                ..
            } => {
                let arcs: Vec<FiringArc> = firing_arcs.iter().copied().collect();
                let bearing = loop {
                    let candidate = rng.gen_range(-std::f64::consts::PI..std::f64::consts::PI);
                    if arcs.is_empty() || arcs.iter().any(|arc| arc.contains(candidate)) {
                        break candidate;
                    }
                };
                let distance = if max_distance - min_distance > 2e-6 {
                    rng.gen_range(*min_distance + 1e-6..=*max_distance - 1e-6)
                } else {
                    *min_distance
                };
                *center + Distance::polar(distance, facing + bearing)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PickType {
    /// A free point on the battlefield, clear of every live ship not listed
    Location {
        excluded_ships: BTreeSet<ShipId>,
        /// Radius of the guide circle drawn by clients around the cursor
        helper_circle_radius: Option<f64>,
    },
    Ship {
        allowed_sides: BTreeSet<Side>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRequest {
    pub pick_type: PickType,
    pub boundary: PickBoundary,
}

impl PickRequest {
    pub fn location(boundary: PickBoundary, excluded_ships: impl IntoIterator<Item = ShipId>) -> Self {
        Self {
            pick_type: PickType::Location {
                excluded_ships: excluded_ships.into_iter().collect(),
                helper_circle_radius: None,
            },
            boundary,
        }
    }

    pub fn ship(boundary: PickBoundary, allowed_sides: impl IntoIterator<Item = Side>) -> Self {
        Self {
            pick_type: PickType::Ship {
                allowed_sides: allowed_sides.into_iter().collect(),
            },
            boundary,
        }
    }

    pub fn with_helper_circle(mut self, radius: f64) -> Self {
        if let PickType::Location {
            helper_circle_radius,
            ..
        } = &mut self.pick_type
        {
            *helper_circle_radius = Some(radius);
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PickResponse {
    Location { position: Position },
    Ship { id: ShipId },
}

impl PickResponse {
    pub fn position(&self) -> Option<Position> {
        match self {
            PickResponse::Location { position } => Some(*position),
            PickResponse::Ship { .. } => None,
        }
    }

    pub fn ship(&self) -> Option<ShipId> {
        match self {
            PickResponse::Ship { id } => Some(*id),
            PickResponse::Location { .. } => None,
        }
    }
}

/// Whether `response` satisfies `request` against the current battlefield
pub fn is_valid_pick(state: &GameState, request: &PickRequest, response: &PickResponse) -> bool {
    match (&request.pick_type, response) {
        (PickType::Location { excluded_ships, .. }, PickResponse::Location { position }) => {
            request.boundary.contains(*position)
                && state
                    .ships
                    .values()
                    .filter(|ship| !excluded_ships.contains(&ship.id()))
                    .all(|ship| ship.position.distance_to(*position) >= SHIP_BASE_SIZE)
        }
        (PickType::Ship { allowed_sides }, PickResponse::Ship { id }) => state
            .ships
            .get(id)
            .map(|ship| {
                allowed_sides.contains(&ship.owner) && request.boundary.contains(ship.position)
            })
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::weapons::arcs;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_rectangle_and_line() {
        let rect = PickBoundary::Rectangle {
            center: Position::new(-2000.0, 0.0),
            width2: 500.0,
            length2: 1000.0,
        };
        assert!(rect.contains(Position::new(-2999.0, 499.0)));
        assert!(!rect.contains(Position::new(-2000.0, 501.0)));

        let line = PickBoundary::AlongLine {
            start: Position::ORIGIN,
            end: Position::new(1500.0, 0.0),
        };
        assert!(line.contains(Position::new(700.0, 0.9)));
        assert!(!line.contains(Position::new(700.0, 1.5)));
        assert!(!line.contains(Position::new(1502.0, 0.0)));
    }

    #[test]
    fn test_angle_and_ellipse() {
        let cone = PickBoundary::Angle {
            center: Position::ORIGIN,
            mid_angle: 0.0,
            max_angle_diff: FRAC_PI_4,
        };
        assert!(cone.contains(Position::new(100.0, 50.0)));
        assert!(!cone.contains(Position::new(0.0, 100.0)));
        assert!(!cone.contains(Position::ORIGIN));

        let jump = PickBoundary::Ellipse {
            center: Position::ORIGIN,
            width_radius: 500.0,
            length_radius: 1500.0,
            rotation: FRAC_PI_2,
        };
        assert!(jump.contains(Position::new(0.0, 1400.0)));
        assert!(!jump.contains(Position::new(1400.0, 0.0)));
    }

    #[test]
    fn test_weapons_fire_range_and_arcs() {
        let fire = PickBoundary::WeaponsFire {
            center: Position::ORIGIN,
            facing: 0.0,
            min_distance: 0.0,
            max_distance: 2500.0,
            firing_arcs: arcs(&[FiringArc::Bow]),
            can_select_self: false,
        };
        assert!(fire.contains(Position::new(2000.0, 0.0)));
        assert!(!fire.contains(Position::new(2600.0, 0.0)));
        assert!(!fire.contains(Position::new(0.0, 2000.0)));
        assert!(!fire.contains(Position::ORIGIN));
    }

    #[test]
    fn test_samples_fall_inside() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let boundaries = [
            PickBoundary::Rectangle {
                center: Position::new(300.0, -200.0),
                width2: 800.0,
                length2: 400.0,
            },
            PickBoundary::Ellipse {
                center: Position::ORIGIN,
                width_radius: 600.0,
                length_radius: 1200.0,
                rotation: 1.0,
            },
            PickBoundary::WeaponsFire {
                center: Position::ORIGIN,
                facing: 2.0,
                min_distance: 1000.0,
                max_distance: 6000.0,
                firing_arcs: arcs(&[FiringArc::AbeamPort]),
                can_select_self: false,
            },
        ];
        for boundary in &boundaries {
            for _ in 0..50 {
                let point = boundary.sample(&mut rng);
                assert!(boundary.contains(point), "{:?} outside {:?}", point, boundary);
            }
        }
    }
}
