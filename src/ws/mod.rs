//! WebSocket transport for the lobby and for running games

pub mod game;
pub mod handler;
pub mod lobby;
pub mod protocol;
