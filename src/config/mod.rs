//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Default wait for the second admiral to open their game socket
const DEFAULT_ENTRY_TIMEOUT_SECS: u64 = 30;

/// Connection details for the REST-backed admiral store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    /// Service key (server only, bypasses row-level security)
    pub service_key: String,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Secret for signing game tokens
    pub game_token_secret: String,
    pub entry_timeout: Duration,

    /// Allowed client origins for CORS, comma separated or `*`
    pub client_origin: String,

    /// `None` runs on the in-memory store
    pub store: Option<StoreConfig>,
    /// Seed a few admirals into the in-memory store
    pub seed_demo_admirals: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let entry_timeout_secs = match env::var("ENTRY_TIMEOUT_SECS") {
            Ok(value) => value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::Invalid("ENTRY_TIMEOUT_SECS"))?,
            Err(_) => DEFAULT_ENTRY_TIMEOUT_SECS,
        };

        let store = match (env::var("STORE_URL"), env::var("STORE_SERVICE_KEY")) {
            (Ok(url), Ok(service_key)) => Some(StoreConfig { url, service_key }),
            (Err(_), Err(_)) => None,
            (Ok(_), Err(_)) => return Err(ConfigError::Missing("STORE_SERVICE_KEY")),
            (Err(_), Ok(_)) => return Err(ConfigError::Missing("STORE_URL")),
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            game_token_secret: env::var("GAME_TOKEN_SECRET")
                .map_err(|_| ConfigError::Missing("GAME_TOKEN_SECRET"))?,
            entry_timeout: Duration::from_secs(entry_timeout_secs),

            client_origin: env::var("CLIENT_ORIGIN").unwrap_or_else(|_| "*".to_string()),

            seed_demo_admirals: store.is_none()
                && env::var("SEED_DEMO_ADMIRALS")
                    .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            store,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
