//! Fixed-window rate limiting over the ephemeral store.
//!
//! Counters live under `ratelimit:<bucket>:<identity>`. Each check is one
//! atomic increment; the TTL is set only when the counter is created, which
//! makes the window fixed rather than sliding.

use std::sync::Arc;
use std::time::Duration;

use troop_core::constants::{DISCOVERY_LIMIT, INFERENCE_LIMIT, RATE_WINDOW_SECS};
use troop_state::EphemeralStore;

pub struct RateLimiter {
    store: Arc<EphemeralStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<EphemeralStore>) -> Self {
        Self { store }
    }

    /// One atomic increment against `key`. Returns `(allowed, remaining)`.
    pub fn check(&self, key: &str, limit: u64) -> (bool, u64) {
        let count = self
            .store
            .incr(key, Duration::from_secs(RATE_WINDOW_SECS));
        if count > limit {
            (false, 0)
        } else {
            (true, limit - count)
        }
    }

    /// Heartbeat / peers / models: 100 per hour per client IP.
    pub fn check_discovery(&self, ip: &str) -> (bool, u64) {
        self.check(&format!("ratelimit:discovery:{ip}"), DISCOVERY_LIMIT)
    }

    /// Authorization: 20 per hour per client IP.
    pub fn check_inference(&self, ip: &str) -> (bool, u64) {
        self.check(&format!("ratelimit:inference:{ip}"), INFERENCE_LIMIT)
    }

    /// Clear a window early (admin escape hatch).
    pub fn reset(&self, key: &str) {
        self.store.delete(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(EphemeralStore::new()))
    }

    #[test]
    fn allows_up_to_the_limit_then_denies() {
        let limiter = limiter();
        for i in 1..=INFERENCE_LIMIT {
            let (allowed, remaining) = limiter.check_inference("1.2.3.4");
            assert!(allowed, "request {i} should pass");
            assert_eq!(remaining, INFERENCE_LIMIT - i);
        }
        let (allowed, remaining) = limiter.check_inference("1.2.3.4");
        assert!(!allowed);
        assert_eq!(remaining, 0);
    }

    #[test]
    fn identities_and_buckets_are_independent() {
        let limiter = limiter();
        for _ in 0..INFERENCE_LIMIT {
            limiter.check_inference("1.2.3.4");
        }
        assert!(!limiter.check_inference("1.2.3.4").0);
        // A different IP and a different bucket are untouched.
        assert!(limiter.check_inference("5.6.7.8").0);
        assert!(limiter.check_discovery("1.2.3.4").0);
    }

    #[test]
    fn reset_reopens_the_window() {
        let limiter = limiter();
        for _ in 0..=INFERENCE_LIMIT {
            limiter.check_inference("1.2.3.4");
        }
        assert!(!limiter.check_inference("1.2.3.4").0);
        limiter.reset("ratelimit:inference:1.2.3.4");
        assert!(limiter.check_inference("1.2.3.4").0);
    }
}
