//! WebSocket upgrade handlers and frame helpers

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info};

use super::game::run_game_socket;
use super::lobby::run_lobby;
use super::protocol::ProtocolError;
use crate::app::AppState;
use crate::http::routes::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;

/// Query parameters for the game socket
#[derive(Debug, Deserialize)]
pub struct GameQuery {
    /// Game token from the lobby handoff
    pub token: String,
}

pub async fn lobby_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| run_lobby(socket, state))
}

/// Token is checked before upgrading
pub async fn game_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<GameQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let (session, claims) = state.registry.authorize(&query.token)?;
    info!(
        session_id = %claims.session,
        side = ?claims.side,
        admiral_id = %claims.admiral,
        "Game socket upgrade"
    );
    Ok(ws.on_upgrade(move |socket| run_game_socket(socket, session, claims.side)))
}

/// A text frame that passed the rate limit, or one that did not
#[derive(Debug, PartialEq)]
pub enum Inbound<T> {
    Frame(T),
    Throttled,
}

/// Reads the next JSON frame. `Ok(None)` once the socket is closed.
/// Frames over the rate limit come back as `Inbound::Throttled` unparsed.
pub async fn next_inbound<S, T>(
    stream: &mut S,
    limiter: &ConnectionRateLimiter,
) -> Result<Option<Inbound<T>>, ProtocolError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    T: DeserializeOwned,
{
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_frame() {
                    debug!(len = text.len(), "Rate limited frame dropped");
                    return Ok(Some(Inbound::Throttled));
                }
                return Ok(Some(Inbound::Frame(serde_json::from_str(&text)?)));
            }
            Ok(Message::Binary(_)) => return Err(ProtocolError::BinaryFrame),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("Client initiated close");
                return Ok(None);
            }
            Err(e) => {
                debug!(error = %e, "WebSocket error");
                return Ok(None);
            }
        }
    }
    Ok(None)
}

/// Like [`next_inbound`], skipping throttled frames
pub async fn next_frame<S, T>(
    stream: &mut S,
    limiter: &ConnectionRateLimiter,
) -> Result<Option<T>, ProtocolError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    T: DeserializeOwned,
{
    loop {
        match next_inbound(stream, limiter).await? {
            Some(Inbound::Frame(frame)) => return Ok(Some(frame)),
            Some(Inbound::Throttled) => continue,
            None => return Ok(None),
        }
    }
}

pub async fn send_json<Si, T>(sink: &mut Si, msg: &T) -> Result<(), ProtocolError>
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json))
        .await
        .map_err(|_| ProtocolError::Closed)
}

/// Closes the socket with a human-readable reason
pub async fn close_with<Si>(sink: &mut Si, code: u16, reason: impl Into<String>)
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut reason: String = reason.into();
    // close frames carry at most 123 bytes of reason
    if reason.len() > 123 {
        let mut end = 123;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
    let _ = sink.close().await;
}

pub fn close_code_for(error: &ProtocolError) -> u16 {
    match error {
        ProtocolError::Malformed(_) => close_code::INVALID,
        ProtocolError::BinaryFrame => close_code::UNSUPPORTED,
        ProtocolError::Unexpected(_) | ProtocolError::SyntheticAction => close_code::POLICY,
        ProtocolError::Closed => close_code::NORMAL,
    }
}
