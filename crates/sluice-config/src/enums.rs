use std::fmt;

use serde::{Deserialize, Serialize};

/// What the worker pool does when every execution slot is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
  /// Wait for a slot to free up (bounded by the caller's deadline).
  #[default]
  Block,
  /// Fail the submission immediately.
  Reject,
}

impl fmt::Display for AdmissionPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Block => write!(f, "block"),
      Self::Reject => write!(f, "reject"),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryBackoff {
  Constant,
  Linear,
  #[default]
  Exponential,
}
