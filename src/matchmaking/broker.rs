//! Host/join rendezvous ending in a created game

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::invitation::{GameTicket, JoinAttempt, JoinReply, JoinRequest, OpenGame};
use crate::game::start::BattleSize;
use crate::session::{Seat, SessionError, SessionRegistry};

/// Join attempts an invitation buffers before joiners have to wait
const JOIN_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Rank {rank} cannot command a {size:?} battle")]
    SizeNotAllowed { size: BattleSize, rank: u32 },

    #[error("No join request is waiting for an answer")]
    NoPendingRequest,

    #[error("Invitation already closed")]
    Closed,

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Outcome of a join attempt, from the joiner's side
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    Accepted(GameTicket),
    Rejected,
}

struct Listing {
    game: OpenGame,
    attempts: mpsc::Sender<JoinAttempt>,
}

pub struct Broker {
    listings: Arc<DashMap<Uuid, Listing>>,
    registry: Arc<SessionRegistry>,
}

impl Broker {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            listings: Arc::new(DashMap::new()),
            registry,
        }
    }

    /// Snapshot of every advertised game, oldest first
    pub fn open_games(&self) -> Vec<OpenGame> {
        let mut games: Vec<OpenGame> = self
            .listings
            .iter()
            .map(|entry| entry.value().game.clone())
            .collect();
        games.sort_by_key(|game| game.created_at);
        games
    }

    pub fn open_game_count(&self) -> usize {
        self.listings.len()
    }

    /// Advertises a game. The listing lives as long as the returned invitation.
    pub fn advertise(
        &self,
        host: Seat,
        rank: u32,
        size: BattleSize,
    ) -> Result<HostedInvitation, MatchmakingError> {
        if !size.allowed_for_rank(rank) {
            return Err(MatchmakingError::SizeNotAllowed { size, rank });
        }

        let game = OpenGame::new(host.setup.admiral.name.clone(), rank, size);
        let id = game.invitation;
        let (attempts_tx, attempts_rx) = mpsc::channel(JOIN_QUEUE_CAPACITY);
        self.listings.insert(
            id,
            Listing {
                game,
                attempts: attempts_tx,
            },
        );
        info!(invitation = %id, host = %host.setup.admiral.name, size = ?size, "Game advertised");

        Ok(HostedInvitation {
            id,
            size,
            host: Some(host),
            attempts: attempts_rx,
            pending: None,
            listings: self.listings.clone(),
            registry: self.registry.clone(),
        })
    }

    /// Sends a join attempt and waits for the host's answer.
    /// A listing that disappears before answering counts as a rejection.
    pub async fn request_join(
        &self,
        invitation: Uuid,
        joiner: Seat,
        rank: u32,
    ) -> Result<JoinOutcome, MatchmakingError> {
        let Some((size, attempts)) = self
            .listings
            .get(&invitation)
            .map(|listing| (listing.game.size, listing.attempts.clone()))
        else {
            return Ok(JoinOutcome::Rejected);
        };
        if !size.allowed_for_rank(rank) {
            return Err(MatchmakingError::SizeNotAllowed { size, rank });
        }

        let request = JoinRequest {
            admiral: joiner.setup.admiral.id,
            name: joiner.setup.admiral.name.clone(),
            rank,
        };
        let (attempt, reply) = JoinAttempt::new(request, joiner);
        if attempts.send(attempt).await.is_err() {
            return Ok(JoinOutcome::Rejected);
        }

        match reply.await {
            Ok(JoinReply::Accepted(ticket)) => Ok(JoinOutcome::Accepted(ticket)),
            Ok(JoinReply::Rejected) | Err(_) => Ok(JoinOutcome::Rejected),
        }
    }

    /// Host against a generated AI fleet
    pub fn start_training(
        &self,
        host: Seat,
        rank: u32,
        size: BattleSize,
    ) -> Result<GameTicket, MatchmakingError> {
        if !size.allowed_for_rank(rank) {
            return Err(MatchmakingError::SizeNotAllowed { size, rank });
        }
        let created = self.registry.create_game(size, host, None)?;
        Ok(GameTicket {
            session: created.session,
            token: created.host_token,
        })
    }
}

/// The host's end of an advertised game
pub struct HostedInvitation {
    id: Uuid,
    size: BattleSize,
    host: Option<Seat>,
    attempts: mpsc::Receiver<JoinAttempt>,
    pending: Option<JoinAttempt>,
    listings: Arc<DashMap<Uuid, Listing>>,
    registry: Arc<SessionRegistry>,
}

impl HostedInvitation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn size(&self) -> BattleSize {
        self.size
    }

    /// Waits for the next joiner. `None` once the invitation is closed.
    pub async fn next_request(&mut self) -> Option<JoinRequest> {
        if let Some(pending) = &self.pending {
            return Some(pending.request.clone());
        }
        self.host.as_ref()?;

        loop {
            let attempt = self.attempts.recv().await?;
            if attempt.reply.is_closed() {
                debug!(invitation = %self.id, joiner = %attempt.request.name, "Skipping withdrawn join request");
                continue;
            }
            let request = attempt.request.clone();
            debug!(invitation = %self.id, joiner = %request.name, "Join request received");
            self.pending = Some(attempt);
            return Some(request);
        }
    }

    pub fn reject(&mut self) -> Result<(), MatchmakingError> {
        let attempt = self
            .pending
            .take()
            .ok_or(MatchmakingError::NoPendingRequest)?;
        debug!(
            invitation = %self.id,
            joiner = %attempt.request.name,
            waited_ms = attempt.wait_time().as_millis() as u64,
            "Join request rejected"
        );
        attempt.reject();
        Ok(())
    }

    /// Creates the game with the waiting joiner and closes the invitation.
    /// `Ok(None)` if the joiner already left; the invitation stays open.
    pub fn accept(&mut self) -> Result<Option<GameTicket>, MatchmakingError> {
        let attempt = self
            .pending
            .take()
            .ok_or(MatchmakingError::NoPendingRequest)?;
        if attempt.reply.is_closed() {
            debug!(
                invitation = %self.id,
                joiner = %attempt.request.name,
                waited_ms = attempt.wait_time().as_millis() as u64,
                "Joiner left before being accepted"
            );
            return Ok(None);
        }
        let host = self.host.take().ok_or(MatchmakingError::Closed)?;
        let attempt_wait = attempt.wait_time();
        self.close();

        let created = match self.registry.create_game(self.size, host, Some(attempt.seat)) {
            Ok(created) => created,
            Err(e) => {
                let _ = attempt.reply.send(JoinReply::Rejected);
                return Err(e.into());
            }
        };

        let Some(guest_token) = created.guest_token else {
            let _ = attempt.reply.send(JoinReply::Rejected);
            return Err(MatchmakingError::Closed);
        };
        let guest_ticket = GameTicket {
            session: created.session,
            token: guest_token,
        };
        if attempt.reply.send(JoinReply::Accepted(guest_ticket)).is_err() {
            warn!(invitation = %self.id, "Joiner left before the handoff");
        }
        info!(
            invitation = %self.id,
            session_id = %created.session,
            waited_ms = attempt_wait.as_millis() as u64,
            "Join accepted"
        );

        Ok(Some(GameTicket {
            session: created.session,
            token: created.host_token,
        }))
    }

    /// Stops taking joiners; anyone still queued is turned away
    fn close(&mut self) {
        self.listings.remove(&self.id);
        self.attempts.close();
        while let Ok(attempt) = self.attempts.try_recv() {
            attempt.reject();
        }
    }
}

impl Drop for HostedInvitation {
    fn drop(&mut self) {
        if self.listings.remove(&self.id).is_some() {
            debug!(invitation = %self.id, "Invitation withdrawn");
        }
        if let Some(attempt) = self.pending.take() {
            attempt.reject();
        }
    }
}
