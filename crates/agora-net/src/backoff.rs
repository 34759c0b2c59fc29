//! Reconnection backoff policy for the realtime socket.

use std::time::Duration;

use agora_shared::constants::{
    MAX_RECONNECT_ATTEMPTS, RECONNECT_BASE_DELAY_MS, RECONNECT_MAX_DELAY_MS,
};

// Exponent cap so the doubling can never overflow u64.
const MAX_EXPONENT: u32 = 12;

/// Exponential backoff: the delay doubles on every consecutive failure and
/// is capped, and after `max_attempts` failures the socket goes dormant
/// until a manual reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound applied to every computed delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before going dormant.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(2u64.pow(attempt.min(MAX_EXPONENT)));
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Whether `attempt` consecutive failures exhaust the retry budget.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}
