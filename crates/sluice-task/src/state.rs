use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::id::TaskId;

/// Lifecycle of a task.
///
/// ```text
/// Queued ──▶ Reserved ──▶ Running ──▶ Succeeded ──▶ Completed
///    ▲           │            │
///    │           └────────────┴─────▶ Failed ─────▶ Completed
///    └───────────────────────────────────┘ (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
  /// Sitting in the durable queue (async only).
  Queued,
  /// Picked up for execution but not started yet.
  Reserved,
  Running,
  Succeeded,
  Failed,
  /// Outcome recorded and reported; nothing more will happen.
  Completed,
}

impl TaskState {
  /// Whether an outcome has been reached.
  pub fn has_outcome(&self) -> bool {
    matches!(self, Self::Succeeded | Self::Failed | Self::Completed)
  }

  /// Returns `true` if moving from this state to `next` is allowed.
  ///
  /// Self-transitions are rejected. The only backwards edge is
  /// `Failed -> Queued`, used to requeue a transient failure.
  pub fn can_transition_to(&self, next: &Self) -> bool {
    match self {
      Self::Queued => matches!(next, Self::Reserved),
      Self::Reserved => matches!(next, Self::Running | Self::Failed),
      Self::Running => matches!(next, Self::Succeeded | Self::Failed),
      Self::Succeeded => matches!(next, Self::Completed),
      Self::Failed => matches!(next, Self::Completed | Self::Queued),
      Self::Completed => false,
    }
  }

  /// Validates a transition, returning a descriptive error if rejected.
  pub fn validate_transition(&self, task_id: &TaskId, next: &Self) -> Result<(), TaskError> {
    if self.can_transition_to(next) {
      Ok(())
    } else {
      Err(TaskError::InvalidTransition {
        task_id: task_id.clone(),
        from: *self,
        to: *next,
      })
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Queued => "queued",
      Self::Reserved => "reserved",
      Self::Running => "running",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
      Self::Completed => "completed",
    }
  }
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
