use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry schedule for a single dispatch: a few fast attempts right after a
/// failure, then an exponential phase capped at `max_delay_ms`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub fast_attempts: u32,
    pub fast_delay_ms: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub factor: f64,
    /// Total attempt cap (`None` = retry forever).
    pub max_retries: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fast_attempts: 3,
            fast_delay_ms: 50,
            base_delay_ms: 200,
            max_delay_ms: 10_000,
            factor: 1.8,
            max_retries: Some(8),
        }
    }
}

pub struct Backoff {
    cfg: RetryConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg, attempt: 0 }
    }

    /// Reset the attempt counter after any response from the server,
    /// including a redirect.
    #[inline]
    pub fn on_success(&mut self) {
        self.attempt = 0;
    }

    #[inline]
    pub fn exhausted(&self) -> bool {
        self.cfg
            .max_retries
            .is_some_and(|max| self.attempt >= max)
    }

    #[inline]
    pub fn next_delay(&mut self) -> Duration {
        if self.attempt < self.cfg.fast_attempts {
            self.attempt += 1;
            return Duration::from_millis(self.cfg.fast_delay_ms);
        }

        let exp = (self.cfg.base_delay_ms as f64)
            * self
                .cfg
                .factor
                .powi((self.attempt - self.cfg.fast_attempts + 1) as i32);
        let capped = exp.min(self.cfg.max_delay_ms as f64) as u64;

        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(capped)
    }
}
