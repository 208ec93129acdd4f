//! Bounded exponential backoff for retryable store errors

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// How many times a fetch is attempted and how long to wait in between
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_percent: u64,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; it is clamped to at least 1
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter_percent: 0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
            .with_max_delay(config.max_delay())
            .with_jitter(config.jitter_percent)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent.min(100);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after `attempts_made` failed attempts
    ///
    /// Returns `None` once the attempt cap is reached.
    pub fn delay_after(&self, attempts_made: u32) -> Option<Duration> {
        if attempts_made >= self.max_attempts {
            return None;
        }

        let shift = attempts_made.saturating_sub(1).min(20);
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        let capped = base_ms.saturating_mul(1u64 << shift).min(max_ms);

        let jitter = if self.jitter_percent > 0 && capped > 0 {
            rand::thread_rng().gen_range(0..=capped.saturating_mul(self.jitter_percent) / 100)
        } else {
            0
        };

        Some(Duration::from_millis(capped.saturating_add(jitter)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
