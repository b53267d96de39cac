//! Game connection: one side of one session

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, Message, WebSocket};
use futures::{Sink, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::handler::{close_code_for, close_with, next_inbound, send_json, Inbound};
use super::protocol::{BeginNotice, ProtocolError};
use crate::game::event::{GameEvent, PlayerAction};
use crate::game::types::Side;
use crate::session::{GameSession, PacketOutcome};
use crate::util::rate_limit::ConnectionRateLimiter;

/// How long the writer gets to flush the final frames
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const THROTTLED_MESSAGE: &str = "Too many actions, slow down";

pub async fn run_game_socket(socket: WebSocket, session: Arc<GameSession>, side: Side) {
    let session_id = session.id();
    let (mut sink, mut stream) = socket.split();

    if !session.claim_side(side) {
        warn!(session_id = %session_id, side = ?side, "Side already connected");
        close_with(&mut sink, close_code::POLICY, "That side is already connected").await;
        return;
    }
    let Some(errors) = session.take_errors(side) else {
        close_with(&mut sink, close_code::POLICY, "That side is already connected").await;
        return;
    };

    // subscribe before reading the state so no change falls in between
    let events = session.subscribe();
    let state = session.current_state().await;
    let notice = BeginNotice {
        session: session_id,
        side,
        opponent: state.admirals.get(side.other()).clone(),
    };
    if send_json(&mut sink, &notice).await.is_err() {
        session.on_packet(side, PlayerAction::Disconnect).await;
        return;
    }
    info!(session_id = %session_id, side = ?side, "Player connected to game");

    let (control_tx, control_rx) = mpsc::channel::<(u16, String)>(1);
    let writer = tokio::spawn(write_loop(
        sink,
        session.clone(),
        events,
        errors,
        control_rx,
        GameEvent::StateChange {
            state: Box::new(state),
        },
    ));

    {
        let session = session.clone();
        tokio::spawn(async move {
            session.enter(side).await;
        });
    }

    let limiter = ConnectionRateLimiter::for_game();
    loop {
        match next_inbound::<_, PlayerAction>(&mut stream, &limiter).await {
            Ok(Some(Inbound::Throttled)) => session.reject(side, THROTTLED_MESSAGE),
            Ok(Some(Inbound::Frame(action))) if action.is_synthetic() => {
                let e = ProtocolError::SyntheticAction;
                let _ = control_tx.send((close_code_for(&e), e.to_string())).await;
                break;
            }
            Ok(Some(Inbound::Frame(action))) => {
                if session.on_packet(side, action).await == PacketOutcome::Ended {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(session_id = %session_id, side = ?side, error = %e, "Protocol violation");
                let _ = control_tx.send((close_code_for(&e), e.to_string())).await;
                break;
            }
        }
    }

    if !session.is_ended() {
        session.on_packet(side, PlayerAction::Disconnect).await;
    }

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        debug!(session_id = %session_id, side = ?side, "Writer did not finish in time");
    }
    info!(session_id = %session_id, side = ?side, "Game connection closed");
}

/// Forwards session events and this side's rejections to the socket.
/// Ends with a close frame carrying the game's end message.
async fn write_loop<Si>(
    mut sink: Si,
    session: Arc<GameSession>,
    mut events: broadcast::Receiver<GameEvent>,
    mut errors: mpsc::UnboundedReceiver<String>,
    mut control: mpsc::Receiver<(u16, String)>,
    initial: GameEvent,
) where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    if send_json(&mut sink, &initial).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;

            Some((code, reason)) = control.recv() => {
                close_with(&mut sink, code, reason).await;
                return;
            }
            Some(message) = errors.recv() => {
                if send_json(&mut sink, &GameEvent::InvalidAction { message }).await.is_err() {
                    return;
                }
            }
            event = events.recv() => match event {
                Ok(GameEvent::GameEnd(end)) => {
                    let reason = end.message.clone();
                    let _ = send_json(&mut sink, &GameEvent::GameEnd(end)).await;
                    close_with(&mut sink, close_code::NORMAL, reason).await;
                    return;
                }
                Ok(event) => {
                    if send_json(&mut sink, &event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // snapshots are full replacements, so the latest one is enough
                    warn!(session_id = %session.id(), skipped, "Client lagged, resyncing");
                    let state = session.current_state().await;
                    let event = GameEvent::StateChange { state: Box::new(state) };
                    if send_json(&mut sink, &event).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    close_with(&mut sink, close_code::AWAY, "Game closed").await;
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ship::ShipClass;
    use crate::game::state::tests::battle;
    use futures::channel::mpsc as futures_mpsc;
    use futures::SinkExt;
    use uuid::Uuid;

    /// Collects what the writer sends
    fn capture() -> (
        impl Sink<Message, Error = axum::Error> + Unpin,
        futures_mpsc::UnboundedReceiver<Message>,
    ) {
        let (tx, rx) = futures_mpsc::unbounded();
        (tx.sink_map_err(axum::Error::new), rx)
    }

    fn decode(message: &Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected a text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_writer_forwards_rejections_and_closes_on_game_end() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            9,
            Duration::from_secs(30),
            Vec::new(),
        );
        let (sink, sent) = capture();
        let (_control_tx, control_rx) = mpsc::channel(1);
        let events = session.subscribe();
        let errors = session.take_errors(Side::Host).unwrap();
        let initial = GameEvent::StateChange {
            state: Box::new(session.current_state().await),
        };
        let writer = tokio::spawn(write_loop(
            sink,
            session.clone(),
            events,
            errors,
            control_rx,
            initial,
        ));

        let empty_chat = PlayerAction::SendChatMessage {
            message: "   ".to_string(),
        };
        session.on_packet(Side::Host, empty_chat).await;
        session.on_packet(Side::Guest, PlayerAction::Disconnect).await;
        writer.await.unwrap();

        let frames: Vec<Message> = sent.collect().await;
        let kinds: Vec<String> = frames
            .iter()
            .filter(|message| matches!(message, Message::Text(_)))
            .map(|message| decode(message)["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(kinds.first().map(String::as_str), Some("state_change"));
        assert!(kinds.iter().any(|kind| kind == "invalid_action"));
        assert_eq!(kinds.last().map(String::as_str), Some("game_end"));

        match frames.last() {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, close_code::NORMAL);
                assert!(frame.reason.contains("abandoned"));
            }
            other => panic!("expected a close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_throttle_rejection_reaches_only_that_side() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            11,
            Duration::from_secs(30),
            Vec::new(),
        );
        let mut host_errors = session.take_errors(Side::Host).unwrap();
        let mut guest_errors = session.take_errors(Side::Guest).unwrap();

        session.reject(Side::Guest, THROTTLED_MESSAGE);

        assert_eq!(guest_errors.try_recv().ok().as_deref(), Some(THROTTLED_MESSAGE));
        assert!(host_errors.try_recv().is_err());
        assert!(!session.is_ended());
    }

    #[tokio::test]
    async fn test_writer_closes_with_protocol_reason() {
        let session = GameSession::new(
            Uuid::new_v4(),
            battle(&[ShipClass::Picket], &[ShipClass::Needle]),
            10,
            Duration::from_secs(30),
            Vec::new(),
        );
        let (sink, sent) = capture();
        let (control_tx, control_rx) = mpsc::channel(1);
        let writer = tokio::spawn(write_loop(
            sink,
            session.clone(),
            session.subscribe(),
            session.take_errors(Side::Guest).unwrap(),
            control_rx,
            GameEvent::StateChange {
                state: Box::new(session.current_state().await),
            },
        ));

        let e = ProtocolError::SyntheticAction;
        control_tx
            .send((close_code_for(&e), e.to_string()))
            .await
            .unwrap();
        writer.await.unwrap();

        let frames: Vec<Message> = sent.collect().await;
        match frames.last() {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, close_code::POLICY);
                assert!(frame.reason.contains("synthetic"));
            }
            other => panic!("expected a close frame, got {:?}", other),
        }
        assert!(!session.is_ended());
    }
}
