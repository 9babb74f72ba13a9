use serde::{Deserialize, Serialize};

use crate::state::TaskState;

/// Why a task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Failure {
  /// The deadline passed before the task reached the runtime.
  #[error("deadline exceeded before execution started")]
  DeadlineExceeded,

  /// The deadline passed while the function was running.
  #[error("execution timed out")]
  Timeout,

  /// The function ran and exited unsuccessfully.
  #[error("function exited with status {code}: {stderr}")]
  NonZeroExit { code: i32, stderr: String },

  /// The container hit its memory limit or the host ran out of capacity.
  #[error("resource exhausted: {message}")]
  ResourceExhausted { message: String },

  /// The container runtime could not be reached or could not start the
  /// container.
  #[error("container runtime unavailable: {message}")]
  RuntimeUnavailable { message: String },

  /// Execution was abandoned because the process is shutting down.
  #[error("execution cancelled")]
  Cancelled,

  /// Something went wrong inside the pool itself.
  #[error("internal error: {message}")]
  Internal { message: String },
}

impl Failure {
  /// Transient failures may succeed if retried later.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      Self::ResourceExhausted { .. } | Self::RuntimeUnavailable { .. } | Self::Cancelled
    )
  }
}

/// The result of executing a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
  Succeeded { output: String },
  Failed { failure: Failure },
}

impl TaskOutcome {
  pub fn succeeded(output: impl Into<String>) -> Self {
    Self::Succeeded {
      output: output.into(),
    }
  }

  pub fn failed(failure: Failure) -> Self {
    Self::Failed { failure }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Self::Succeeded { .. })
  }

  pub fn failure(&self) -> Option<&Failure> {
    match self {
      Self::Succeeded { .. } => None,
      Self::Failed { failure } => Some(failure),
    }
  }

  pub fn is_transient_failure(&self) -> bool {
    self.failure().is_some_and(Failure::is_transient)
  }

  /// The task state this outcome puts a task in.
  pub fn state(&self) -> TaskState {
    match self {
      Self::Succeeded { .. } => TaskState::Succeeded,
      Self::Failed { .. } => TaskState::Failed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_transient_classification() {
    assert!(Failure::RuntimeUnavailable {
      message: "daemon down".to_string()
    }
    .is_transient());
    assert!(Failure::Cancelled.is_transient());
    assert!(!Failure::Timeout.is_transient());
    assert!(!Failure::NonZeroExit {
      code: 1,
      stderr: String::new()
    }
    .is_transient());
  }

  #[test]
  fn test_outcome_serializes_with_tags() {
    let outcome = TaskOutcome::failed(Failure::NonZeroExit {
      code: 2,
      stderr: "boom".to_string(),
    });
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["failure"]["kind"], "non_zero_exit");
    assert_eq!(json["failure"]["code"], 2);
  }
}
