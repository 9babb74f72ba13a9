use sluice_pool::AdmissionError;
use sluice_queue::QueueError;
use sluice_route::ValidationError;
use sluice_task::{Failure, TaskError, TaskId};

/// Errors returned to a sync caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
  /// The pool refused the task.
  #[error(transparent)]
  Admission(#[from] AdmissionError),

  /// The deadline passed before an outcome arrived. The task may still
  /// finish; its result is discarded.
  #[error("task {task_id} timed out")]
  Timeout { task_id: TaskId },

  /// The task ran and failed.
  #[error("task {task_id} failed: {failure}")]
  Failed { task_id: TaskId, failure: Failure },
}

/// Errors returned to an async caller.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
  #[error(transparent)]
  Encode(#[from] TaskError),

  /// The queue couldn't take the message. Nothing is buffered locally.
  #[error("failed to enqueue task: {0}")]
  Queue(#[from] QueueError),
}

/// Errors from resolving and invoking a route.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
  #[error("route not found: {app_name}{path}")]
  RouteNotFound { app_name: String, path: String },

  /// The datastore couldn't be read.
  #[error("route lookup failed: {source}")]
  Lookup {
    #[source]
    source: sluice_datastore::Error,
  },

  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Dispatch(#[from] DispatchError),

  #[error(transparent)]
  Enqueue(#[from] EnqueueError),
}
