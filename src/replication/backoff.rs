//! Retry backoff for the ingestor's receive loop.

use std::time::Duration;

// == Exponential Backoff ==
/// Delay doubling (by `multiplier`) with each consecutive failure, capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Self::default()
        }
    }

    /// Delay before retrying after `failures` consecutive failures (1-based).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(63) as i32;
        let millis = self.initial.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_exponentially() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(10));

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));

        assert_eq!(backoff.delay_for_attempt(10), Duration::from_secs(1));
        assert_eq!(backoff.delay_for_attempt(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_failures_uses_initial_delay() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(500));
    }
}
