//! In-process repository for development and tests

use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use uuid::Uuid;

use super::admirals::rank_for_experience;
use super::roster::RosterEntry;
use super::{Admiral, AdmiralRepository, StoreError};
use crate::game::ship::{Ship, ShipClass};
use crate::session::results::BattleResults;

#[derive(Default)]
pub struct MemoryStore {
    admirals: DashMap<Uuid, Admiral>,
    rosters: DashMap<Uuid, Vec<RosterEntry>>,
    locked: DashSet<Uuid>,
    results: Mutex<Vec<BattleResults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_admiral(&self, admiral: Admiral, ships: Vec<Ship>) {
        let entries = ships
            .into_iter()
            .map(|ship| RosterEntry::new(admiral.id, ship))
            .collect();
        self.rosters.insert(admiral.id, entries);
        self.admirals.insert(admiral.id, admiral);
    }

    #[cfg(test)]
    pub fn is_locked(&self, id: Uuid) -> bool {
        self.locked.contains(&id)
    }

    pub fn admiral(&self, id: Uuid) -> Option<Admiral> {
        self.admirals.get(&id).map(|entry| entry.value().clone())
    }

    pub fn roster(&self, id: Uuid) -> Vec<RosterEntry> {
        self.rosters
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Persisted battles, oldest first
    pub fn results(&self) -> Vec<BattleResults> {
        self.results.lock().clone()
    }

    /// A handful of admirals with starter fleets so a fresh server is playable
    pub fn seed_demo_admirals(&self) -> Vec<Uuid> {
        let demo: [(&str, u32, &[ShipClass]); 3] = [
            (
                "Admiral Hale",
                0,
                &[ShipClass::Sentinel, ShipClass::Warden, ShipClass::Warden, ShipClass::Picket],
            ),
            (
                "Captain Ro",
                1,
                &[ShipClass::Hammer, ShipClass::Anvil, ShipClass::Anvil, ShipClass::Anvil],
            ),
            (
                "Matriarch Ysolde",
                2,
                &[ShipClass::Shade, ShipClass::Hive, ShipClass::Needle, ShipClass::Wisp],
            ),
        ];
        demo.into_iter()
            .map(|(name, rank, classes)| {
                let admiral = Admiral {
                    id: Uuid::new_v4(),
                    name: name.to_string(),
                    rank,
                    currency: 0,
                    experience: 0,
                };
                let id = admiral.id;
                let ships = classes
                    .iter()
                    .enumerate()
                    .map(|(i, class)| Ship::new(format!("{} {}", class.display_name(), i + 1), *class))
                    .collect();
                self.insert_admiral(admiral, ships);
                id
            })
            .collect()
    }
}

#[async_trait]
impl AdmiralRepository for MemoryStore {
    async fn get_admiral(&self, id: Uuid) -> Result<Option<Admiral>, StoreError> {
        Ok(self.admiral(id))
    }

    async fn try_lock(&self, id: Uuid) -> Result<bool, StoreError> {
        if !self.admirals.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.locked.insert(id))
    }

    fn release(&self, id: Uuid) {
        self.locked.remove(&id);
    }

    async fn fleet_roster(&self, id: Uuid) -> Result<Vec<Ship>, StoreError> {
        let now = Utc::now();
        Ok(self
            .roster(id)
            .iter()
            .filter(|entry| entry.is_ready(now))
            .map(RosterEntry::to_ship)
            .collect())
    }

    async fn persist_results(&self, results: &BattleResults) -> Result<(), StoreError> {
        for delta in &results.ship_deltas {
            if let Some(mut roster) = self.rosters.get_mut(&delta.admiral_id) {
                if let Some(entry) = roster.iter_mut().find(|entry| entry.id == delta.ship_id) {
                    entry.ready_at = delta.ready_at;
                }
            }
        }
        for reward in &results.rewards {
            if let Some(mut admiral) = self.admirals.get_mut(&reward.admiral_id) {
                admiral.currency += reward.currency;
                admiral.experience += reward.experience;
                admiral.rank = rank_for_experience(admiral.experience);
            }
        }
        self.results.lock().push(results.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AdmiralLock;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lock_is_exclusive_and_released_on_drop() {
        let store = Arc::new(MemoryStore::new());
        let id = store.seed_demo_admirals()[0];

        let lock = AdmiralLock::acquire(store.clone(), id).await.unwrap();
        assert!(store.is_locked(id));
        assert!(matches!(
            AdmiralLock::acquire(store.clone(), id).await,
            Err(StoreError::Locked(_))
        ));
        drop(lock);
        assert!(!store.is_locked(id));
    }

    #[tokio::test]
    async fn test_unknown_admiral_cannot_lock() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.try_lock(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_drydocked_ships_are_not_offered() {
        let store = MemoryStore::new();
        let id = store.seed_demo_admirals()[0];
        let before = store.fleet_roster(id).await.unwrap();
        assert_eq!(before.len(), 4);

        if let Some(mut roster) = store.rosters.get_mut(&id) {
            roster[0].ready_at = Some(Utc::now() + chrono::Duration::hours(1));
        }
        assert_eq!(store.fleet_roster(id).await.unwrap().len(), 3);
    }
}
