use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::error::WeatherError;

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), ignoring any provider hint.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// What to do after `attempt` (1-based) failed with `error`.
    pub fn decide(&self, attempt: u32, error: &WeatherError) -> RetryDecision {
        if !error.is_transient() || attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }

        let delay = match error {
            WeatherError::RateLimited { retry_after: Some(hint) } => {
                self.backoff(attempt).max(*hint).min(self.max_delay)
            }
            _ => self.backoff(attempt),
        };
        RetryDecision::Retry(delay)
    }
}

/// Waits between attempts. Swapped out in tests so no real time passes.
#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
