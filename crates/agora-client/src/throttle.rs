//! Scroll-trigger throttling.

use std::time::{Duration, Instant};

/// Minimum-interval gate for scroll-to-top pagination triggers.
///
/// The first trigger always passes; later ones pass only once the
/// configured interval has elapsed since the last accepted trigger.
#[derive(Debug)]
pub struct ScrollThrottle {
    interval: Duration,
    last_trigger: Option<Instant>,
}

impl ScrollThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_trigger: None,
        }
    }

    /// Whether the trigger may pass, recording it when it does.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&mut self, now: Instant) -> bool {
        match self.last_trigger {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last_trigger = Some(now);
                true
            }
        }
    }
}
