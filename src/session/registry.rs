//! Running games by id

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ai_player::spawn_ai_player;
use super::game_session::GameSession;
use super::results::compile_results;
use super::token::{GameClaims, TokenError, TokenSigner};
use crate::game::fleet::ai_setup;
use crate::game::start::{new_game, BattleSize, PlayerSetup};
use crate::game::types::Side;
use crate::store::{AdmiralLock, AdmiralRepository};

/// One side of a game about to be created
pub struct Seat {
    pub setup: PlayerSetup,
    pub lock: Option<Arc<AdmiralLock>>,
}

impl Seat {
    pub fn new(setup: PlayerSetup, lock: Arc<AdmiralLock>) -> Self {
        Self {
            setup,
            lock: Some(lock),
        }
    }
}

/// Tokens for the humans seated in a new game
#[derive(Debug, Clone)]
pub struct CreatedGame {
    pub session: Uuid,
    pub host_token: String,
    pub guest_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub active_games: usize,
    pub games_started: u64,
    pub games_finished: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Game {0} does not exist")]
    UnknownSession(Uuid),

    #[error("Game already over")]
    Ended,

    #[error(transparent)]
    Token(#[from] TokenError),
}

pub struct SessionRegistry {
    sessions: DashMap<Uuid, Arc<GameSession>>,
    repository: Arc<dyn AdmiralRepository>,
    signer: TokenSigner,
    entry_timeout: Duration,
    games_started: AtomicU64,
    games_finished: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        repository: Arc<dyn AdmiralRepository>,
        signer: TokenSigner,
        entry_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            repository,
            signer,
            entry_timeout,
            games_started: AtomicU64::new(0),
            games_finished: AtomicU64::new(0),
        })
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<GameSession>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            active_games: self.sessions.len(),
            games_started: self.games_started.load(Ordering::Relaxed),
            games_finished: self.games_finished.load(Ordering::Relaxed),
        }
    }

    /// Checks a game token and finds its session
    pub fn authorize(&self, token: &str) -> Result<(Arc<GameSession>, GameClaims), SessionError> {
        let claims = self.signer.verify(token)?;
        let session = self
            .get(claims.session)
            .ok_or(SessionError::UnknownSession(claims.session))?;
        if session.is_ended() {
            return Err(SessionError::Ended);
        }
        Ok((session, claims))
    }

    /// Creates a game. Without a guest the host trains against a generated AI fleet.
    pub fn create_game(
        self: &Arc<Self>,
        size: BattleSize,
        host: Seat,
        guest: Option<Seat>,
    ) -> Result<CreatedGame, SessionError> {
        let seed: u64 = rand::thread_rng().gen();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let guest = guest.unwrap_or_else(|| Seat {
            setup: ai_setup(size, &mut rng),
            lock: None,
        });
        let host_admiral = host.setup.admiral.id;
        let guest_admiral = guest.setup.admiral.id;
        let guest_is_ai = guest.setup.admiral.is_ai;

        let state = new_game(size, host.setup, guest.setup, &mut rng);
        let locks = [host.lock, guest.lock]
            .into_iter()
            .flatten()
            .collect();

        let id = Uuid::new_v4();
        let session = GameSession::new(id, state, rng.gen(), self.entry_timeout, locks);

        let host_token = self.signer.issue(id, Side::Host, host_admiral)?;
        let guest_token = if guest_is_ai {
            None
        } else {
            Some(self.signer.issue(id, Side::Guest, guest_admiral)?)
        };

        self.sessions.insert(id, session.clone());
        self.games_started.fetch_add(1, Ordering::Relaxed);
        info!(
            session_id = %id,
            size = ?size,
            training = guest_is_ai,
            "Game created"
        );

        if guest_is_ai {
            spawn_ai_player(session.clone(), Side::Guest, rng.gen());
        }

        let registry = self.clone();
        tokio::spawn(async move {
            registry.supervise(session).await;
        });

        Ok(CreatedGame {
            session: id,
            host_token,
            guest_token,
        })
    }

    /// Ends games nobody enters, persists results and forgets the session
    async fn supervise(&self, session: Arc<GameSession>) {
        let id = session.id();

        let someone_came =
            tokio::time::timeout(session.entry_timeout(), session.wait_any_entry()).await;
        if someone_came.is_err() {
            warn!(session_id = %id, "Nobody entered the game");
            session.abandon().await;
        }

        let Some(end) = session.wait_end().await else {
            self.sessions.remove(&id);
            return;
        };

        let state = session.current_state().await;
        let results = compile_results(id, &state, &end, session.started_at(), Utc::now());
        if results.rewards.is_empty() && results.ship_deltas.is_empty() {
            info!(session_id = %id, "No human participants to record");
        } else if let Err(e) = self.repository.persist_results(&results).await {
            error!(session_id = %id, error = %e, "Failed to persist battle results");
        }

        self.sessions.remove(&id);
        self.games_finished.fetch_add(1, Ordering::Relaxed);
        info!(session_id = %id, "Game closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ship::{Ship, ShipClass};
    use crate::game::state::AdmiralSummary;
    use crate::store::{Admiral, MemoryStore};

    fn registry(store: &Arc<MemoryStore>) -> Arc<SessionRegistry> {
        SessionRegistry::new(
            store.clone(),
            TokenSigner::new("registry-secret"),
            Duration::from_secs(30),
        )
    }

    async fn seat(store: &Arc<MemoryStore>, name: &str, class: ShipClass) -> Seat {
        let admiral = Admiral {
            id: Uuid::new_v4(),
            name: name.to_string(),
            rank: 0,
            currency: 0,
            experience: 0,
        };
        let id = admiral.id;
        store.insert_admiral(admiral, vec![Ship::new("Lead", class)]);
        let lock = AdmiralLock::acquire(store.clone(), id).await.unwrap();
        let setup = PlayerSetup {
            admiral: AdmiralSummary {
                id,
                name: name.to_string(),
                is_ai: false,
            },
            fleet: store.fleet_roster(id).await.unwrap(),
        };
        Seat::new(setup, Arc::new(lock))
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_authorize_their_own_side() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let host = seat(&store, "Hale", ShipClass::Warden).await;
        let guest = seat(&store, "Ro", ShipClass::Anvil).await;

        let created = registry
            .create_game(BattleSize::Skirmish, host, Some(guest))
            .unwrap();
        let (session, claims) = registry.authorize(&created.host_token).unwrap();
        assert_eq!(session.id(), created.session);
        assert_eq!(claims.side, Side::Host);

        let guest_token = created.guest_token.unwrap();
        assert_eq!(registry.authorize(&guest_token).unwrap().1.side, Side::Guest);
        assert!(matches!(
            registry.authorize("garbage"),
            Err(SessionError::Token(_))
        ));
        assert_eq!(registry.stats().active_games, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_game_is_recorded_and_removed() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let host = seat(&store, "Hale", ShipClass::Warden).await;
        let guest = seat(&store, "Ro", ShipClass::Anvil).await;
        let host_id = host.setup.admiral.id;

        let created = registry
            .create_game(BattleSize::Skirmish, host, Some(guest))
            .unwrap();
        let session = registry.get(created.session).unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;
        let end = session.wait_end().await.unwrap();
        assert_eq!(end.winner, None);

        for _ in 0..10 {
            if registry.get(created.session).is_none() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(registry.get(created.session).is_none());
        assert!(!store.is_locked(host_id));
        assert_eq!(store.results().len(), 1);
        assert_eq!(registry.stats().games_finished, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_game_issues_only_host_token() {
        let store = Arc::new(MemoryStore::new());
        let registry = registry(&store);
        let host = seat(&store, "Hale", ShipClass::Sentinel).await;

        let created = registry.create_game(BattleSize::Raid, host, None).unwrap();
        assert!(created.guest_token.is_none());

        let session = registry.get(created.session).unwrap();
        let state = session.current_state().await;
        assert!(state.admirals.guest.is_ai);
        assert!(!state.start.players.guest.deployable_fleet.is_empty());
    }
}
