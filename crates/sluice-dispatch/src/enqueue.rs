//! Async enqueue.

use std::collections::HashMap;
use std::sync::Arc;

use sluice_queue::Queue;
use sluice_route::Route;
use sluice_task::{TaskEnvelope, TaskId};
use tracing::{info, instrument};

use crate::error::EnqueueError;

/// Pushes tasks onto the durable queue for the async runner.
#[derive(Clone)]
pub struct AsyncEnqueuer {
  queue: Arc<dyn Queue>,
}

impl AsyncEnqueuer {
  pub fn new(queue: Arc<dyn Queue>) -> Self {
    Self { queue }
  }

  /// Queue a task for `route` and return its id without waiting for it to run.
  #[instrument(name = "async_enqueue", skip_all, fields(route = %route.key()))]
  pub async fn enqueue(
    &self,
    route: &Route,
    payload: impl Into<String>,
    headers: HashMap<String, Vec<String>>,
  ) -> Result<TaskId, EnqueueError> {
    let envelope = TaskEnvelope::new(route, payload, headers);
    let message_id = self.queue.push(envelope.to_bytes()?).await?;

    info!(task_id = %envelope.task_id, message_id = %message_id, "task enqueued");
    Ok(envelope.task_id)
  }
}
