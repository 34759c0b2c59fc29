/// Path of the realtime WebSocket endpoint on the backend.
pub const WS_PATH: &str = "/ws";

/// Number of messages fetched per history page.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Delay before the first reconnect attempt.
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;

/// Upper bound on the delay between reconnect attempts.
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;

/// Consecutive failed connection attempts tolerated before the socket
/// goes dormant and waits for a manual reconnect.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// Minimum interval between scroll-triggered history fetches.
pub const SCROLL_THROTTLE_MS: u64 = 200;

/// Capacity of the command and notification channels.
pub const CHANNEL_CAPACITY: usize = 256;
