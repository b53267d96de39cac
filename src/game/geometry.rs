//! Planar vector math for the battlefield
//!
//! `Position` is an affine point and `Distance` a displacement. Only the
//! meaningful combinations have operators: `Position - Position = Distance`,
//! `Position ± Distance = Position`, and `Distance` forms a vector space.

use std::f64::consts::{PI, TAU};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `angle` radians (counter-clockwise from +x)
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn rotated(self, angle: f64) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        self.scaled(rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f64) -> Vec2 {
        self.scaled(1.0 / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// A point on the battlefield
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(pub Vec2);

impl Position {
    pub const ORIGIN: Position = Position(Vec2::ZERO);

    pub const fn new(x: f64, y: f64) -> Self {
        Self(Vec2::new(x, y))
    }

    pub fn x(self) -> f64 {
        self.0.x
    }

    pub fn y(self) -> f64 {
        self.0.y
    }

    pub fn distance_to(self, other: Position) -> f64 {
        (other - self).length()
    }
}

/// A displacement between two positions
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(pub Vec2);

impl Distance {

    pub const fn new(x: f64, y: f64) -> Self {
        Self(Vec2::new(x, y))
    }

    /// A displacement of `length` units heading at `angle`
    pub fn polar(length: f64, angle: f64) -> Self {
        Self(Vec2::from_angle(angle).scaled(length))
    }

    pub fn length(self) -> f64 {
        self.0.length()
    }

    pub fn angle(self) -> f64 {
        self.0.angle()
    }

    pub fn rotated(self, angle: f64) -> Self {
        Self(self.0.rotated(angle))
    }
}

impl Sub for Position {
    type Output = Distance;
    fn sub(self, rhs: Position) -> Distance {
        Distance(self.0 - rhs.0)
    }
}

impl Add<Distance> for Position {
    type Output = Position;
    fn add(self, rhs: Distance) -> Position {
        Position(self.0 + rhs.0)
    }
}

impl Sub<Distance> for Position {
    type Output = Position;
    fn sub(self, rhs: Distance) -> Position {
        Position(self.0 - rhs.0)
    }
}

impl AddAssign<Distance> for Position {
    fn add_assign(&mut self, rhs: Distance) {
        self.0 = self.0 + rhs.0;
    }
}

impl SubAssign<Distance> for Position {
    fn sub_assign(&mut self, rhs: Distance) {
        self.0 = self.0 - rhs.0;
    }
}

impl Add for Distance {
    type Output = Distance;
    fn add(self, rhs: Distance) -> Distance {
        Distance(self.0 + rhs.0)
    }
}

impl Sub for Distance {
    type Output = Distance;
    fn sub(self, rhs: Distance) -> Distance {
        Distance(self.0 - rhs.0)
    }
}

impl Mul<f64> for Distance {
    type Output = Distance;
    fn mul(self, rhs: f64) -> Distance {
        Distance(self.0 * rhs)
    }
}

impl Neg for Distance {
    type Output = Distance;
    fn neg(self) -> Distance {
        Distance(-self.0)
    }
}

/// Normalize an angle into `(-PI, PI]`
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Absolute angular difference in `[0, PI]`
pub fn angle_diff(a: f64, b: f64) -> f64 {
    normalize_angle(a - b).abs()
}

/// Shortest distance from `point` to the segment `start..end`
pub fn distance_to_segment(point: Position, start: Position, end: Position) -> f64 {
    let segment = (end - start).0;
    let len_sq = segment.length_squared();
    if len_sq < f64::EPSILON {
        return point.distance_to(start);
    }
    let t = ((point - start).0.dot(segment) / len_sq).clamp(0.0, 1.0);
    let closest = start + Distance(segment.scaled(t));
    point.distance_to(closest)
}
