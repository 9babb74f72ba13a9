//! Synchronous dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sluice_pool::WorkerPool;
use sluice_route::Route;
use sluice_task::{Failure, Task, TaskId, TaskOutcome};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::error::DispatchError;

/// A successful sync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
  pub task_id: TaskId,
  pub output: String,
}

/// Runs a task on the worker pool and waits for it.
#[derive(Clone)]
pub struct SyncDispatcher {
  pool: WorkerPool,
}

impl SyncDispatcher {
  pub fn new(pool: WorkerPool) -> Self {
    Self { pool }
  }

  /// Build a task for `route` and run it with the given deadline.
  pub async fn dispatch(
    &self,
    route: Arc<Route>,
    payload: impl Into<String>,
    headers: HashMap<String, Vec<String>>,
    timeout: Duration,
  ) -> Result<Dispatched, DispatchError> {
    let task = Task::new(route, payload, timeout).with_headers(headers);
    self.dispatch_task(Arc::new(task)).await
  }

  /// Run an already-built task, waiting no longer than its deadline.
  ///
  /// Waiting for admission counts against the deadline too.
  #[instrument(
    name = "sync_dispatch",
    skip(self, task),
    fields(
      task_id = %task.id(),
      route = %task.route().key(),
    )
  )]
  pub async fn dispatch_task(&self, task: Arc<Task>) -> Result<Dispatched, DispatchError> {
    let task_id = task.id().clone();
    let deadline = Instant::now() + task.remaining();

    let outcome = match tokio::time::timeout_at(deadline, self.pool.execute(task)).await {
      Ok(result) => result?,
      Err(_) => {
        warn!("deadline passed while waiting for the task");
        return Err(DispatchError::Timeout { task_id });
      }
    };

    match outcome {
      TaskOutcome::Succeeded { output } => {
        info!("sync dispatch completed");
        Ok(Dispatched { task_id, output })
      }
      TaskOutcome::Failed {
        failure: Failure::Timeout | Failure::DeadlineExceeded,
      } => Err(DispatchError::Timeout { task_id }),
      TaskOutcome::Failed { failure } => Err(DispatchError::Failed { task_id, failure }),
    }
  }
}
