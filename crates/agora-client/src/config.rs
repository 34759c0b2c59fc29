//! Client configuration.

use std::time::Duration;

use agora_net::ReconnectPolicy;
use agora_shared::constants::{DEFAULT_PAGE_SIZE, SCROLL_THROTTLE_MS};

/// Client configuration, loadable from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base origin of the forum backend.
    /// Env: `AGORA_BASE_URL`
    /// Default: `http://localhost:8082`
    pub base_url: String,

    /// Number of messages fetched per history page.
    /// Env: `AGORA_PAGE_SIZE`
    /// Default: `10`
    pub page_size: u32,

    /// Minimum interval between scroll-triggered history fetches.
    /// Env: `AGORA_SCROLL_THROTTLE_MS`
    /// Default: `200`
    pub scroll_throttle: Duration,

    /// Backoff policy for the realtime socket.
    /// Env: `AGORA_RECONNECT_BASE_MS`, `AGORA_RECONNECT_MAX_MS`,
    /// `AGORA_RECONNECT_ATTEMPTS`
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            scroll_throttle: Duration::from_millis(SCROLL_THROTTLE_MS),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("AGORA_BASE_URL") {
            config.base_url = url;
        }

        if let Ok(val) = std::env::var("AGORA_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %val, "Invalid AGORA_PAGE_SIZE, using default"),
            }
        }

        if let Ok(val) = std::env::var("AGORA_SCROLL_THROTTLE_MS") {
            match val.parse::<u64>() {
                Ok(ms) => config.scroll_throttle = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid AGORA_SCROLL_THROTTLE_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("AGORA_RECONNECT_BASE_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.reconnect.base_delay = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid AGORA_RECONNECT_BASE_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("AGORA_RECONNECT_MAX_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.reconnect.max_delay = Duration::from_millis(ms),
                _ => tracing::warn!(value = %val, "Invalid AGORA_RECONNECT_MAX_MS, using default"),
            }
        }

        if let Ok(val) = std::env::var("AGORA_RECONNECT_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(n) => config.reconnect.max_attempts = n,
                _ => tracing::warn!(value = %val, "Invalid AGORA_RECONNECT_ATTEMPTS, using default"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8082");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.scroll_throttle, Duration::from_millis(200));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }
}
