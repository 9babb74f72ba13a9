use crate::id::TaskId;
use crate::state::TaskState;

/// Errors raised by the task model.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
  /// The state machine does not allow this move.
  #[error("invalid transition from {from} to {to} for task {task_id}")]
  InvalidTransition {
    task_id: TaskId,
    from: TaskState,
    to: TaskState,
  },

  /// A task could not be serialized for the queue.
  #[error("failed to encode task: {0}")]
  Encode(#[source] serde_json::Error),

  /// A queue message body is not a task envelope.
  #[error("failed to decode task: {0}")]
  Decode(#[source] serde_json::Error),
}
