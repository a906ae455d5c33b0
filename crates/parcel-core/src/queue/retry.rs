//! Retry policy: backoff delays for audit writes that the sink rejected.

use std::time::Duration;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `failures` consecutive failures
    /// (1-indexed): `base_delay * multiplier^(failures - 1)`, capped at
    /// `max_delay`.
    ///
    /// With base=100ms, multiplier=2.0, max=5s:
    /// - failure 1: 100ms
    /// - failure 2: 200ms
    /// - failure 3: 400ms
    /// - failure 7+: 5s
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs.max(0.0))
    }
}
