//! Admirals, rosters and battle records.
//!
//! The game core only sees [`AdmiralRepository`]. Production talks to a
//! PostgREST backend, development and tests use the in-memory store.

pub mod admirals;
pub mod memory;
pub mod rest;
pub mod roster;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::game::ship::Ship;
use crate::session::results::BattleResults;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// A player's persistent identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Admiral {
    pub id: Uuid,
    pub name: String,
    pub rank: u32,
    pub currency: i64,
    pub experience: i64,
}

#[async_trait]
pub trait AdmiralRepository: Send + Sync {
    async fn get_admiral(&self, id: Uuid) -> Result<Option<Admiral>, StoreError>;

    /// Marks the admiral as busy; `false` if someone already holds them
    async fn try_lock(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Releases a lock taken with `try_lock`. Never blocks.
    fn release(&self, id: Uuid);

    /// Ships out of drydock and ready to sail
    async fn fleet_roster(&self, id: Uuid) -> Result<Vec<Ship>, StoreError>;

    async fn persist_results(&self, results: &BattleResults) -> Result<(), StoreError>;
}

/// Exclusive hold on an admiral, released when dropped
pub struct AdmiralLock {
    admiral: Uuid,
    repository: Arc<dyn AdmiralRepository>,
}

impl AdmiralLock {
    pub async fn acquire(
        repository: Arc<dyn AdmiralRepository>,
        admiral: Uuid,
    ) -> Result<Self, StoreError> {
        if !repository.try_lock(admiral).await? {
            return Err(StoreError::Locked(admiral));
        }
        debug!(admiral_id = %admiral, "Admiral locked");
        Ok(Self {
            admiral,
            repository,
        })
    }

    pub fn admiral(&self) -> Uuid {
        self.admiral
    }
}

impl Drop for AdmiralLock {
    fn drop(&mut self) {
        debug!(admiral_id = %self.admiral, "Admiral released");
        self.repository.release(self.admiral);
    }
}

impl std::fmt::Debug for AdmiralLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmiralLock")
            .field("admiral", &self.admiral)
            .finish()
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),

    #[error("No row returned from insert")]
    NoRowReturned,

    #[error("Admiral {0} not found")]
    NotFound(Uuid),

    #[error("Admiral {0} is already in use")]
    Locked(Uuid),
}
