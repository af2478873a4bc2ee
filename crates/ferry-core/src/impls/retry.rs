//! Retry policy: decides redelivery backoff for the in-memory transport.

use std::time::Duration;

/// Exponential backoff: `base_delay * multiplier^(attempts - 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first redelivery.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Redeliver right away. Handy in tests.
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, 1.0)
    }

    /// Delay before the next delivery, given the attempts already made (1-indexed).
    ///
    /// With base_delay=2s, multiplier=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // huge exponents overflow to inf; cap instead of panicking in from_secs_f64
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 2.0)
    }
}
