//! Automated opponent for training games

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::game_session::{EntryOutcome, GameSession, PacketOutcome};
use crate::game::ai::AiPlanner;
use crate::game::event::GameEvent;
use crate::game::types::Side;

/// Pause between automated actions so a human can follow along
const AI_THINK_DELAY: Duration = Duration::from_millis(250);

pub fn spawn_ai_player(session: Arc<GameSession>, side: Side, seed: u64) {
    tokio::spawn(async move {
        run_ai_player(session, side, seed).await;
    });
}

pub async fn run_ai_player(session: Arc<GameSession>, side: Side, seed: u64) {
    let session_id = session.id();
    let mut events = session.subscribe();

    if session.enter(side).await != EntryOutcome::BothPresent {
        debug!(session_id = %session_id, "AI leaving a game that never started");
        return;
    }
    info!(session_id = %session_id, side = ?side, "AI admiral takes command");

    let mut planner = AiPlanner::new(session.current_state().await, side, seed);
    loop {
        if session.is_ended() {
            break;
        }

        let state = session.current_state().await;
        if let Some(action) = planner.next_action(&state).await {
            tokio::time::sleep(AI_THINK_DELAY).await;
            match session.on_packet(side, action).await {
                PacketOutcome::Applied => {}
                PacketOutcome::Rejected(reason) => {
                    debug!(session_id = %session_id, reason = %reason, "AI action rejected");
                    planner.on_rejected();
                }
                PacketOutcome::Ended | PacketOutcome::Ignored => break,
            }
            continue;
        }

        // nothing to do until the state moves on
        match events.recv().await {
            Ok(GameEvent::GameEnd(_)) | Err(RecvError::Closed) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
        }
    }
    debug!(session_id = %session_id, "AI admiral finished");
}
