//! Advertised games and the join attempts sent to them

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::game::start::BattleSize;
use crate::session::Seat;

/// What the lobby shows about a hosted game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenGame {
    pub invitation: Uuid,
    pub host_name: String,
    pub host_rank: u32,
    pub size: BattleSize,
    pub points: u32,
    pub created_at: DateTime<Utc>,
}

impl OpenGame {
    pub fn new(host_name: impl Into<String>, host_rank: u32, size: BattleSize) -> Self {
        Self {
            invitation: Uuid::new_v4(),
            host_name: host_name.into(),
            host_rank,
            size,
            points: size.points(),
            created_at: Utc::now(),
        }
    }
}

/// Summary of a joiner, shown to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub admiral: Uuid,
    pub name: String,
    pub rank: u32,
}

/// Where to connect for one side of a created game
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTicket {
    pub session: Uuid,
    pub token: String,
}

#[derive(Debug)]
pub enum JoinReply {
    Accepted(GameTicket),
    Rejected,
}

/// A join attempt waiting in an invitation's queue
pub struct JoinAttempt {
    pub request: JoinRequest,
    pub seat: Seat,
    pub reply: oneshot::Sender<JoinReply>,
    received_at: Instant,
}

impl JoinAttempt {
    pub fn new(request: JoinRequest, seat: Seat) -> (Self, oneshot::Receiver<JoinReply>) {
        let (reply, rx) = oneshot::channel();
        (
            Self {
                request,
                seat,
                reply,
                received_at: Instant::now(),
            },
            rx,
        )
    }

    /// How long the joiner has been waiting
    pub fn wait_time(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn reject(self) {
        let _ = self.reply.send(JoinReply::Rejected);
    }
}
