//! PostgREST API client using a service key

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::admirals::AdmiralStore;
use super::roster::RosterStore;
use super::{Admiral, AdmiralRepository, StoreError};
use crate::game::ship::Ship;
use crate::session::results::BattleResults;

/// Client for server-side database operations.
/// The service key bypasses row level security; never hand it to players.
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestClient {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Content-Type", "application/json")
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Vec<T>, StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(StoreError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
    ) -> Result<Option<T>, StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorized(self.client.get(&url))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(StoreError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(StoreError::Parse)
    }

    /// Insert rows without reading them back
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, data: &T) -> Result<(), StoreError> {
        let response = self
            .authorized(self.client.post(self.rest_url(table)))
            .header("Prefer", "return=minimal")
            .json(data)
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// Make an authenticated PATCH request (update)
    pub async fn update<T: Serialize>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<(), StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorized(self.client.patch(&url))
            .json(data)
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response).await.map(|_| ())
    }

    /// PATCH that returns the rows it touched, for conditional updates
    pub async fn update_returning<T: Serialize, R: DeserializeOwned>(
        &self,
        table: &str,
        query: &str,
        data: &T,
    ) -> Result<Vec<R>, StoreError> {
        let url = format!("{}?{}", self.rest_url(table), query);

        let response = self
            .authorized(self.client.patch(&url))
            .header("Prefer", "return=representation")
            .json(data)
            .send()
            .await
            .map_err(StoreError::Request)?;

        Self::check(response)
            .await?
            .json()
            .await
            .map_err(StoreError::Parse)
    }
}

/// Production repository backed by the REST API
#[derive(Clone)]
pub struct RestStore {
    client: RestClient,
    admirals: AdmiralStore,
    roster: RosterStore,
}

impl RestStore {
    pub fn new(client: RestClient) -> Self {
        Self {
            admirals: AdmiralStore::new(client.clone()),
            roster: RosterStore::new(client.clone()),
            client,
        }
    }
}

#[async_trait]
impl AdmiralRepository for RestStore {
    async fn get_admiral(&self, id: Uuid) -> Result<Option<Admiral>, StoreError> {
        Ok(self.admirals.get_admiral(id).await?.map(Admiral::from))
    }

    async fn try_lock(&self, id: Uuid) -> Result<bool, StoreError> {
        self.admirals.try_lock(id).await
    }

    fn release(&self, id: Uuid) {
        let admirals = self.admirals.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(admiral_id = %id, "No runtime to release admiral lock on");
            return;
        };
        runtime.spawn(async move {
            if let Err(e) = admirals.unlock(id).await {
                warn!(admiral_id = %id, error = %e, "Failed to release admiral lock");
            }
        });
    }

    async fn fleet_roster(&self, id: Uuid) -> Result<Vec<Ship>, StoreError> {
        self.roster.ready_ships(id).await
    }

    async fn persist_results(&self, results: &BattleResults) -> Result<(), StoreError> {
        self.client
            .insert("battle_records", &results.record)
            .await?;
        for delta in &results.ship_deltas {
            self.roster.apply_delta(delta).await?;
        }
        for reward in &results.rewards {
            self.admirals.apply_reward(reward).await?;
        }
        info!(battle_id = %results.record.id, "Battle results persisted");
        Ok(())
    }
}
