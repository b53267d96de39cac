//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::matchmaking::Broker;
use crate::session::token::TokenSigner;
use crate::session::SessionRegistry;
use crate::store::rest::RestClient;
use crate::store::{AdmiralRepository, MemoryStore, RestStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repository: Arc<dyn AdmiralRepository>,
    pub registry: Arc<SessionRegistry>,
    pub broker: Arc<Broker>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let repository: Arc<dyn AdmiralRepository> = match &config.store {
            Some(store) => {
                info!(url = %store.url, "Using REST admiral store");
                Arc::new(RestStore::new(RestClient::new(&store.url, &store.service_key)))
            }
            None => {
                let memory = MemoryStore::new();
                if config.seed_demo_admirals {
                    for id in memory.seed_demo_admirals() {
                        info!(admiral_id = %id, "Seeded demo admiral");
                    }
                }
                info!("Using in-memory admiral store");
                Arc::new(memory)
            }
        };

        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: Arc<Config>, repository: Arc<dyn AdmiralRepository>) -> Self {
        let registry = SessionRegistry::new(
            repository.clone(),
            TokenSigner::new(&config.game_token_secret),
            config.entry_timeout,
        );
        let broker = Arc::new(Broker::new(registry.clone()));

        Self {
            config,
            repository,
            registry,
            broker,
        }
    }
}
