use converse_core::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with bounded jitter.
///
/// Jitter never exceeds the base delay and the total is capped at
/// `max_delay`, so delays never decrease from one attempt to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
    pub fallback_on_throttle: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            fallback_on_throttle: config.fallback_on_throttle,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.max_jitter = Duration::ZERO;
        self
    }

    /// `base * 2^retry`, capped at `max_delay`. `retry` is zero-based.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(31)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn jitter_bound(&self) -> Duration {
        self.max_jitter.min(self.base_delay)
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let bound = self.jitter_bound();
        let jitter = if bound.is_zero() {
            Duration::ZERO
        } else {
            rand::thread_rng().gen_range(Duration::ZERO..=bound)
        };
        (self.backoff(retry) + jitter).min(self.max_delay)
    }

    pub fn has_attempts_left(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}
