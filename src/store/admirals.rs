//! Admiral rows

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::rest::RestClient;
use super::{Admiral, StoreError};
use crate::session::results::AdmiralReward;

/// Experience needed for each rank above zero
const RANK_THRESHOLDS: [i64; 4] = [100, 300, 700, 1500];

pub fn rank_for_experience(experience: i64) -> u32 {
    RANK_THRESHOLDS
        .iter()
        .filter(|threshold| experience >= **threshold)
        .count() as u32
}

/// Admiral as stored in the admirals table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmiralRow {
    pub id: Uuid,
    pub name: String,
    pub rank: u32,
    pub currency: i64,
    pub experience: i64,
    pub locked: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<AdmiralRow> for Admiral {
    fn from(row: AdmiralRow) -> Self {
        Admiral {
            id: row.id,
            name: row.name,
            rank: row.rank,
            currency: row.currency,
            experience: row.experience,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LockUpdate {
    locked: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ProgressUpdate {
    rank: u32,
    currency: i64,
    experience: i64,
}

#[derive(Clone)]
pub struct AdmiralStore {
    client: RestClient,
}

impl AdmiralStore {
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub async fn get_admiral(&self, id: Uuid) -> Result<Option<AdmiralRow>, StoreError> {
        let query = format!("id=eq.{}", id);
        self.client.get_one("admirals", &query).await
    }

    /// Flips `locked` only if it is currently unset
    pub async fn try_lock(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = format!("id=eq.{}&locked=eq.false", id);
        let rows: Vec<AdmiralRow> = self
            .client
            .update_returning("admirals", &query, &LockUpdate { locked: true })
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn unlock(&self, id: Uuid) -> Result<(), StoreError> {
        let query = format!("id=eq.{}", id);
        self.client
            .update("admirals", &query, &LockUpdate { locked: false })
            .await
    }

    pub async fn apply_reward(&self, reward: &AdmiralReward) -> Result<(), StoreError> {
        let admiral = self
            .get_admiral(reward.admiral_id)
            .await?
            .ok_or(StoreError::NotFound(reward.admiral_id))?;
        let experience = admiral.experience + reward.experience;
        let update = ProgressUpdate {
            rank: rank_for_experience(experience),
            currency: admiral.currency + reward.currency,
            experience,
        };
        let query = format!("id=eq.{}", reward.admiral_id);
        self.client.update("admirals", &query, &update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_thresholds() {
        assert_eq!(rank_for_experience(0), 0);
        assert_eq!(rank_for_experience(99), 0);
        assert_eq!(rank_for_experience(100), 1);
        assert_eq!(rank_for_experience(5000), 4);
    }
}
