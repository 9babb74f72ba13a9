//! Queue wire form of a task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_route::Route;

use crate::error::TaskError;
use crate::id::TaskId;
use crate::state::TaskState;
use crate::task::Task;

/// What gets pushed onto the durable queue for an async invocation.
///
/// Carries a snapshot of the route so the task runs with the configuration
/// it was accepted under, even if the route changes while it waits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvelope {
  pub task_id: TaskId,
  pub route: Route,
  pub payload: String,
  #[serde(default)]
  pub headers: HashMap<String, Vec<String>>,
  pub created_at: DateTime<Utc>,
}

impl TaskEnvelope {
  pub fn new(route: &Route, payload: impl Into<String>, headers: HashMap<String, Vec<String>>) -> Self {
    Self {
      task_id: TaskId::generate(),
      route: route.clone(),
      payload: payload.into(),
      headers,
      created_at: Utc::now(),
    }
  }

  pub fn to_bytes(&self) -> Result<Vec<u8>, TaskError> {
    serde_json::to_vec(self).map_err(TaskError::Encode)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, TaskError> {
    serde_json::from_slice(bytes).map_err(TaskError::Decode)
  }

  /// Rebuild a reserved task for the given attempt.
  pub fn into_task(self, timeout: Duration, attempt: u32) -> Task {
    Task::new(Arc::new(self.route), self.payload, timeout)
      .with_id(self.task_id)
      .with_headers(self.headers)
      .with_created_at(self.created_at)
      .with_attempt(attempt)
      .with_state(TaskState::Reserved)
  }
}
