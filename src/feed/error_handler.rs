//! Reconnect pacing for the feed client

use crate::feed::config::RuntimeConfig;
use std::time::Duration;
use tokio::time::sleep;

/// Consecutive failed reconnects exceeded the configured limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetriesExhausted {
    pub attempts: u32,
}

impl std::fmt::Display for RetriesExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Gave up after {} reconnect attempts", self.attempts)
    }
}

impl std::error::Error for RetriesExhausted {}

/// Wait before reconnect `n` (zero-based) is `initial * 2^n`, capped at
/// `ceiling`. Only consecutive failures count; `reset` on every connect.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    initial: Duration,
    ceiling: Duration,
    limit: u32,
    failures: u32,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, ceiling: Duration, limit: u32) -> Self {
        Self {
            initial,
            ceiling,
            limit,
            failures: 0,
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(
            Duration::from_secs(config.reconnect_initial_secs),
            Duration::from_secs(config.reconnect_max_secs),
            config.reconnect_max_retries,
        )
    }

    /// `None` once `limit` consecutive waits have been handed out
    pub fn next_delay(&self) -> Option<Duration> {
        if self.failures >= self.limit {
            return None;
        }
        let factor = 2_u32.checked_pow(self.failures).unwrap_or(u32::MAX);
        Some(self.initial.saturating_mul(factor).min(self.ceiling))
    }

    /// Record a failure and wait out its delay
    pub async fn wait(&mut self) -> Result<(), RetriesExhausted> {
        let delay = self.next_delay().ok_or(RetriesExhausted {
            attempts: self.failures,
        })?;
        self.failures += 1;

        log::warn!(
            "⏳ Reconnecting to feed in {}s (attempt {}/{})",
            delay.as_secs(),
            self.failures,
            self.limit
        );
        sleep(delay).await;
        Ok(())
    }

    pub fn reset(&mut self) {
        if self.failures > 0 {
            log::debug!("Backoff reset after {} failed attempts", self.failures);
        }
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}
