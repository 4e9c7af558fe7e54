use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Gates a repeated log line to at most once per `interval`.
///
/// The design calls out several spots ("rate-limit an overload log line",
/// "at most once per second") where a condition can hold on every single
/// call but the log line must not. A `RateLimiter` is a single `Instant`
/// behind a lock, checked and updated atomically under that lock.
pub struct RateLimiter {
    interval: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: Mutex::new(None),
        }
    }

    /// Returns `true` if the caller should log now, and records that a log
    /// happened. Subsequent calls within `interval` return `false`.
    pub fn allow(&self, now: Instant) -> bool {
        let mut last = self.last_fired.lock();
        match *last {
            Some(t) if now.duration_since(t) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
