//! Game rules: the battle state, its phases and everything that changes it.
//!
//! Everything here is synchronous except ability preparation, which waits on
//! player input. Randomness always comes from the caller's `Rng`.

pub mod ability;
pub mod ai;
pub mod chat;
pub mod combat;
pub mod event;
pub mod fleet;
pub mod geometry;
pub mod instance;
pub mod phase;
pub mod physics;
pub mod pick;
pub mod ship;
pub mod start;
pub mod state;
pub mod subplot;
pub mod types;
pub mod weapons;
