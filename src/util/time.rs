//! Time utilities

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Unix timestamp in seconds, used for token expiry
pub fn unix_secs() -> u64 {
    unix_millis() / 1000
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// How long a finished ship stays in drydock before it can sail again
pub const DRYDOCK_DAMAGED: Duration = Duration::from_secs(30 * 60);
pub const DRYDOCK_DESTROYED: Duration = Duration::from_secs(2 * 60 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uptime_after_init() {
        init_server_time();
        assert!(uptime_secs() < 5);
        assert!(unix_secs() > 1_600_000_000);
    }
}
