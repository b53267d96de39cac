//! Live games: the per-game session, its registry and what gets recorded afterwards

pub mod ai_player;
pub mod game_session;
pub mod registry;
pub mod results;
pub mod token;

pub use game_session::{GameSession, PacketOutcome};
pub use registry::{Seat, SessionError, SessionRegistry};
