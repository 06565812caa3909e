//! Lockout duration after consecutive failures.

use std::time::Duration;

use super::config::GuardConfig;

/// `min(base * 2^(failures - 1), max)`. Stateless and safe to share.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    #[must_use]
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.base_backoff(), config.max_backoff())
    }

    /// Lockout for the given number of consecutive failures.
    ///
    /// Zero failures means no lockout.
    #[must_use]
    pub fn compute(&self, failure_count: u32) -> Duration {
        if failure_count == 0 {
            return Duration::ZERO;
        }
        let shift = (failure_count - 1).min(31);
        let factor = 1u32 << shift;
        let delay = self.base.checked_mul(factor).unwrap_or(self.max);
        delay.min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&GuardConfig::default())
    }
}
