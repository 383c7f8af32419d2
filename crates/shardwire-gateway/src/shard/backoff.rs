//! Reconnect delays for one shard.
//!
//! Each closed connection draws a delay uniformly from
//! `0..=min(max, base * 2^failures)`. READY or RESUMED counts as a
//! successful session and drops the window back to `base`.

use rand::Rng;
use std::time::Duration;

/// Full-jitter exponential backoff between connection attempts
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    /// Connections closed since the last established session
    failures: u32,
}

impl ReconnectBackoff {
    #[must_use]
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base: Duration::from_millis(base_ms),
            max: Duration::from_millis(max_ms),
            failures: 0,
        }
    }

    /// Upper bound of the next delay
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Pick the delay before the next attempt and count the failure
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.failures = self.failures.saturating_add(1);
        if ceiling.is_zero() {
            return Duration::ZERO;
        }
        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=millis))
    }

    /// The shard reached READY or RESUMED
    pub fn session_established(&mut self) {
        self.failures = 0;
    }

    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_doubles_until_max() {
        let mut backoff = ReconnectBackoff::new(500, 3_000);
        let ceilings: Vec<u64> = (0..5)
            .map(|_| {
                let ceiling = backoff.ceiling();
                let delay = backoff.next_delay();
                assert!(delay <= ceiling);
                ceiling.as_millis() as u64
            })
            .collect();

        assert_eq!(ceilings, vec![500, 1_000, 2_000, 3_000, 3_000]);
        assert_eq!(backoff.failures(), 5);
    }

    #[test]
    fn test_established_session_restarts_from_base() {
        let mut backoff = ReconnectBackoff::new(1_000, 60_000);
        for _ in 0..4 {
            backoff.next_delay();
        }
        assert_eq!(backoff.ceiling(), Duration::from_secs(16));

        for _ in 0..50 {
            backoff.session_established();
            assert_eq!(backoff.ceiling(), Duration::from_secs(1));
            assert!(backoff.next_delay() <= Duration::from_secs(1));
        }
    }

    #[test]
    fn test_zero_window_reconnects_immediately() {
        let mut backoff = ReconnectBackoff::new(0, 0);
        for _ in 0..10 {
            assert_eq!(backoff.next_delay(), Duration::ZERO);
        }
    }

    #[test]
    fn test_long_outage_stays_at_max() {
        let mut backoff = ReconnectBackoff::new(1_000, 60_000);
        backoff.failures = u32::MAX;

        assert_eq!(backoff.ceiling(), Duration::from_secs(60));
        assert!(backoff.next_delay() <= Duration::from_secs(60));
        assert_eq!(backoff.failures(), u32::MAX);
    }
}
