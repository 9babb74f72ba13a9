//! Retry budget and backoff schedule for transient execution failures.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::RetryBackoff;

/// How many times a transiently failing async task is attempted, and how long
/// its queue message stays invisible between attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts, including the first one.
  pub max_attempts: u32,
  pub backoff: RetryBackoff,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      backoff: RetryBackoff::Exponential,
      base_delay_ms: 500,
      max_delay_ms: 30_000,
    }
  }
}

impl RetryPolicy {
  /// Whether another attempt is allowed after `attempt` attempts have run.
  pub fn allows_retry(&self, attempt: u32) -> bool {
    attempt < self.max_attempts
  }

  /// Delay before the attempt following `attempt` (1-based).
  pub fn delay_for(&self, attempt: u32) -> Duration {
    let n = attempt.max(1) as u64;
    let ms = match self.backoff {
      RetryBackoff::Constant => self.base_delay_ms,
      RetryBackoff::Linear => self.base_delay_ms.saturating_mul(n),
      RetryBackoff::Exponential => {
        let factor = 1u64.checked_shl((n - 1).min(63) as u32).unwrap_or(u64::MAX);
        self.base_delay_ms.saturating_mul(factor)
      }
    };
    Duration::from_millis(ms.min(self.max_delay_ms))
  }
}
