//! services/api/src/web/throttle.rs
//!
//! A fixed-window request counter keyed by client.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries kept before expired windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

struct Window {
    started: Instant,
    count: u32,
}

/// Allows at most `limit` hits per key within each `window`.
///
/// A `limit` of zero disables the limiter.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a hit for `key` and reports whether it is within the allowance.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        if self.limit == 0 {
            return true;
        }

        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());

        if hits.len() >= SWEEP_THRESHOLD {
            let window = self.window;
            hits.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = hits.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_within_a_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("10.0.0.1", start));
        assert!(limiter.check_at("10.0.0.1", start));
        assert!(!limiter.check_at("10.0.0.1", start + Duration::from_secs(1)));

        // Other clients have their own allowance.
        assert!(limiter.check_at("10.0.0.2", start));
    }

    #[test]
    fn window_resets_after_it_elapses() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let start = Instant::now();
        assert!(limiter.check_at("client", start));
        assert!(!limiter.check_at("client", start + Duration::from_secs(59)));
        assert!(limiter.check_at("client", start + Duration::from_secs(60)));
    }

    #[test]
    fn zero_limit_disables_throttling() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..1_000 {
            assert!(limiter.check("client"));
        }
    }
}
