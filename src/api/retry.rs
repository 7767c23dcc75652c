use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const COLD_START_STATUS: u16 = 503;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Backoff {
    /// `base * attempt`
    Linear,
    Fixed,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear
    }
}

/// Shared retry rules for every outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(3000),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Wait applied after the 1-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(attempt.max(1)),
            Backoff::Fixed => self.base_delay,
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        status == COLD_START_STATUS
    }

    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
