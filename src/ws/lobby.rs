//! Lobby connection: login, then host, join or train

use std::sync::Arc;

use axum::extract::ws::{close_code, Message, WebSocket};
use futures::{Sink, Stream, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::handler::{close_code_for, close_with, next_frame, send_json};
use super::protocol::{LobbyClientMsg, LobbyRole, LobbyServerMsg, ProtocolError};
use crate::app::AppState;
use crate::game::start::{BattleSize, PlayerSetup};
use crate::game::state::AdmiralSummary;
use crate::matchmaking::{GameTicket, JoinOutcome, MatchmakingError};
use crate::session::Seat;
use crate::store::{AdmiralLock, StoreError};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;

/// Why a lobby connection ended
#[derive(Debug, thiserror::Error)]
enum LobbyError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Unknown admiral {0}")]
    UnknownAdmiral(Uuid),

    #[error("Admiral is already in a game or lobby")]
    AdmiralBusy,

    #[error("No ships are ready to sail")]
    EmptyRoster,

    #[error(transparent)]
    Matchmaking(#[from] MatchmakingError),

    #[error("Store unavailable: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LobbyError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Locked(_) => LobbyError::AdmiralBusy,
            StoreError::NotFound(id) => LobbyError::UnknownAdmiral(id),
            other => LobbyError::Store(other),
        }
    }
}

impl LobbyError {
    fn close_code(&self) -> u16 {
        match self {
            LobbyError::Protocol(e) => close_code_for(e),
            LobbyError::Store(_) => close_code::ERROR,
            _ => close_code::POLICY,
        }
    }
}

/// A logged-in admiral holding their lock
struct Commander {
    setup: PlayerSetup,
    rank: u32,
    lock: Arc<AdmiralLock>,
}

impl Commander {
    fn seat(&self) -> Seat {
        Seat::new(self.setup.clone(), self.lock.clone())
    }
}

pub async fn run_lobby(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let limiter = ConnectionRateLimiter::for_lobby();

    match lobby_session(&mut sink, &mut stream, &state, &limiter).await {
        Ok(reason) => {
            debug!(reason = %reason, "Lobby connection finished");
            close_with(&mut sink, close_code::NORMAL, reason).await;
        }
        Err(e) => {
            warn!(error = %e, "Lobby connection ended");
            close_with(&mut sink, e.close_code(), e.to_string()).await;
        }
    }
}

async fn lobby_session<Si, S>(
    sink: &mut Si,
    stream: &mut S,
    state: &AppState,
    limiter: &ConnectionRateLimiter,
) -> Result<String, LobbyError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let Some(LobbyClientMsg::Login { admiral, role }) = next_frame(stream, limiter).await? else {
        return Err(ProtocolError::Unexpected("login").into());
    };

    let commander = login(state, admiral).await?;
    send_json(
        sink,
        &LobbyServerMsg::Welcome {
            admiral,
            name: commander.setup.admiral.name.clone(),
            rank: commander.rank,
            ready_ships: commander.setup.fleet.len(),
            allowed_sizes: BattleSize::allowed_sizes(commander.rank),
            server_time: unix_millis(),
        },
    )
    .await?;
    info!(admiral_id = %admiral, role = ?role, "Admiral entered the lobby");

    let ticket = match role {
        LobbyRole::Training { size } => {
            Some(state.broker.start_training(commander.seat(), commander.rank, size)?)
        }
        LobbyRole::Host { size } => host(sink, stream, state, limiter, &commander, size).await?,
        LobbyRole::Join => join(sink, stream, state, limiter, &commander).await?,
    };

    match ticket {
        Some(ticket) => {
            send_json(
                sink,
                &LobbyServerMsg::GameReady {
                    session: ticket.session,
                    token: ticket.token,
                },
            )
            .await?;
            Ok("Game ready".to_string())
        }
        None => Ok("Left the lobby".to_string()),
    }
}

async fn login(state: &AppState, id: Uuid) -> Result<Commander, LobbyError> {
    let admiral = state
        .repository
        .get_admiral(id)
        .await?
        .ok_or(LobbyError::UnknownAdmiral(id))?;
    let lock = AdmiralLock::acquire(state.repository.clone(), id).await?;

    let fleet = state.repository.fleet_roster(id).await?;
    if fleet.is_empty() {
        return Err(LobbyError::EmptyRoster);
    }

    Ok(Commander {
        setup: PlayerSetup {
            admiral: AdmiralSummary {
                id,
                name: admiral.name,
                is_ai: false,
            },
            fleet,
        },
        rank: admiral.rank,
        lock: Arc::new(lock),
    })
}

/// Advertises a game and answers join requests until one is accepted
async fn host<Si, S>(
    sink: &mut Si,
    stream: &mut S,
    state: &AppState,
    limiter: &ConnectionRateLimiter,
    commander: &Commander,
    size: BattleSize,
) -> Result<Option<GameTicket>, LobbyError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut hosted = state.broker.advertise(commander.seat(), commander.rank, size)?;
    send_json(
        sink,
        &LobbyServerMsg::Hosting {
            invitation: hosted.id(),
            size: hosted.size(),
        },
    )
    .await?;

    loop {
        let request = tokio::select! {
            request = hosted.next_request() => request,
            frame = next_frame::<_, LobbyClientMsg>(stream, limiter) => match frame? {
                None => return Ok(None),
                Some(LobbyClientMsg::RefreshGames) => continue,
                Some(_) => return Err(ProtocolError::Unexpected("refresh_games").into()),
            },
        };
        let Some(request) = request else {
            return Ok(None);
        };
        let joiner = request.admiral;
        send_json(sink, &LobbyServerMsg::JoinRequest { request }).await?;

        let accepted = loop {
            match next_frame(stream, limiter).await? {
                None => return Ok(None),
                Some(LobbyClientMsg::JoinResponse { accepted }) => break accepted,
                Some(LobbyClientMsg::RefreshGames) => continue,
                Some(_) => return Err(ProtocolError::Unexpected("join_response").into()),
            }
        };

        if !accepted {
            hosted.reject()?;
            continue;
        }
        match hosted.accept()? {
            Some(ticket) => return Ok(Some(ticket)),
            None => {
                send_json(sink, &LobbyServerMsg::JoinWithdrawn { admiral: joiner }).await?;
            }
        }
    }
}

/// Lists open games and tries joining the selected one until accepted
async fn join<Si, S>(
    sink: &mut Si,
    stream: &mut S,
    state: &AppState,
    limiter: &ConnectionRateLimiter,
    commander: &Commander,
) -> Result<Option<GameTicket>, LobbyError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    send_open_games(sink, state).await?;

    loop {
        let invitation = match next_frame(stream, limiter).await? {
            None => return Ok(None),
            Some(LobbyClientMsg::RefreshGames) => {
                send_open_games(sink, state).await?;
                continue;
            }
            Some(LobbyClientMsg::SelectGame { invitation }) => invitation,
            Some(_) => return Err(ProtocolError::Unexpected("select_game").into()),
        };

        let attempt = state
            .broker
            .request_join(invitation, commander.seat(), commander.rank);
        tokio::pin!(attempt);

        // the host may take a while; only a closed socket cancels the attempt
        let outcome = loop {
            tokio::select! {
                outcome = &mut attempt => break outcome?,
                frame = next_frame::<_, LobbyClientMsg>(stream, limiter) => match frame? {
                    None => return Ok(None),
                    Some(other) => debug!(frame = ?other, "Ignoring frame while awaiting host"),
                },
            }
        };

        match outcome {
            JoinOutcome::Accepted(ticket) => return Ok(Some(ticket)),
            JoinOutcome::Rejected => {
                send_json(sink, &LobbyServerMsg::JoinRejected { invitation }).await?;
                send_open_games(sink, state).await?;
            }
        }
    }
}

async fn send_open_games<Si>(sink: &mut Si, state: &AppState) -> Result<(), ProtocolError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    let games = state.broker.open_games();
    if games.is_empty() {
        debug!("No open games to offer");
    }
    send_json(sink, &LobbyServerMsg::OpenGames { games }).await
}
