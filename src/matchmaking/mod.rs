//! Matchmaking: hosts advertise, joiners pick, the broker hands both a game

pub mod broker;
pub mod invitation;

pub use broker::{Broker, JoinOutcome, MatchmakingError};
pub use invitation::{GameTicket, JoinRequest, OpenGame};
