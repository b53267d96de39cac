//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Game frames per second per connection
pub const GAME_FRAME_RATE_LIMIT: u32 = 20;

/// Lobby frames per second per connection
pub const LOBBY_FRAME_RATE_LIMIT: u32 = 5;

/// Per-connection inbound frame limiter
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(frames_per_second: u32) -> Self {
        Self {
            limiter: create_limiter(frames_per_second),
        }
    }

    pub fn for_game() -> Self {
        Self::new(GAME_FRAME_RATE_LIMIT)
    }

    pub fn for_lobby() -> Self {
        Self::new(LOBBY_FRAME_RATE_LIMIT)
    }

    /// Check if a frame is allowed (returns true if allowed)
    pub fn check_frame(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_capped() {
        let limiter = ConnectionRateLimiter::new(3);
        let allowed = (0..10).filter(|_| limiter.check_frame()).count();
        assert_eq!(allowed, 3);
    }
}
