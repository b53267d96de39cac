//! Fleet rosters - server-side only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rest::RestClient;
use super::StoreError;
use crate::game::ship::{Ship, ShipClass};
use crate::game::types::ShipId;
use crate::session::results::ShipDelta;

/// One ship an admiral owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: ShipId,
    pub admiral_id: Uuid,
    pub name: String,
    pub class: ShipClass,
    pub ready_at: Option<DateTime<Utc>>,
}

impl RosterEntry {
    pub fn new(admiral_id: Uuid, ship: Ship) -> Self {
        Self {
            id: ship.id,
            admiral_id,
            name: ship.name,
            class: ship.class,
            ready_at: None,
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.ready_at.map_or(true, |ready_at| ready_at <= now)
    }

    pub fn to_ship(&self) -> Ship {
        Ship {
            id: self.id,
            name: self.name.clone(),
            class: self.class,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReadyAtUpdate {
    ready_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct RosterStore {
    client: RestClient,
}

impl RosterStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Ships of an admiral that are out of drydock
    pub async fn ready_ships(&self, admiral_id: Uuid) -> Result<Vec<Ship>, StoreError> {
        let now = Utc::now();
        let query = format!(
            "admiral_id=eq.{}&or=(ready_at.is.null,ready_at.lte.{})",
            admiral_id,
            now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        let entries: Vec<RosterEntry> = self.client.get("roster", &query).await?;
        Ok(entries.iter().map(RosterEntry::to_ship).collect())
    }

    pub async fn apply_delta(&self, delta: &ShipDelta) -> Result<(), StoreError> {
        let query = format!("id=eq.{}&admiral_id=eq.{}", delta.ship_id, delta.admiral_id);
        self.client
            .update(
                "roster",
                &query,
                &ReadyAtUpdate {
                    ready_at: delta.ready_at,
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drydock_readiness() {
        let mut entry = RosterEntry::new(Uuid::new_v4(), Ship::new("Vigil", ShipClass::Warden));
        let now = Utc::now();
        assert!(entry.is_ready(now));
        entry.ready_at = Some(now + chrono::Duration::minutes(5));
        assert!(!entry.is_ready(now));
        assert_eq!(entry.to_ship().class, ShipClass::Warden);
    }
}
