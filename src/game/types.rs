//! Identifiers and side bookkeeping shared by the whole engine

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two players in a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Host,
    Guest,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Host, Side::Guest];

    pub fn other(self) -> Self {
        match self {
            Side::Host => Side::Guest,
            Side::Guest => Side::Host,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Host => f.write_str("host"),
            Side::Guest => f.write_str("guest"),
        }
    }
}

/// Roster identifier of a ship, stable across battles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipId(pub Uuid);

impl ShipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ShipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ShipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Key of an armament slot on a ship class (e.g. `bow_cannons`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeaponId(pub String);

impl WeaponId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WeaponId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pair of values, one per side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerSide<T> {
    pub host: T,
    pub guest: T,
}

impl<T> PerSide<T> {
    pub fn new(host: T, guest: T) -> Self {
        Self { host, guest }
    }

    pub fn from_fn(mut f: impl FnMut(Side) -> T) -> Self {
        Self {
            host: f(Side::Host),
            guest: f(Side::Guest),
        }
    }

    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Host => &self.host,
            Side::Guest => &self.guest,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Host => &mut self.host,
            Side::Guest => &mut self.guest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_other_is_involution() {
        for side in Side::BOTH {
            assert_ne!(side, side.other());
            assert_eq!(side, side.other().other());
        }
    }

    #[test]
    fn test_per_side_indexing() {
        let mut counts = PerSide::from_fn(|side| if side == Side::Host { 1 } else { 2 });
        *counts.get_mut(Side::Guest) += 5;
        assert_eq!(*counts.get(Side::Host), 1);
        assert_eq!(*counts.get(Side::Guest), 7);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = WeaponId::new("bow_cannons");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"bow_cannons\"");
        assert_eq!(serde_json::to_string(&Side::Guest).unwrap(), "\"guest\"");
    }
}
