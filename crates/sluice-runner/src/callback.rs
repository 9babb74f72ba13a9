//! Status callbacks for finished async tasks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sluice_task::{Failure, Task, TaskId, TaskOutcome, TaskState};

use crate::error::CallbackError;

/// The final word on an async task, as posted to the callback endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
  pub task_id: TaskId,
  pub app_name: String,
  pub path: String,
  /// `succeeded` or `failed`.
  pub state: TaskState,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<Failure>,
  pub attempts: u32,
  pub completed_at: DateTime<Utc>,
}

impl StatusReport {
  pub fn new(task: &Task, outcome: &TaskOutcome) -> Self {
    let (output, error) = match outcome {
      TaskOutcome::Succeeded { output } => (Some(output.clone()), None),
      TaskOutcome::Failed { failure } => (None, Some(failure.clone())),
    };

    Self {
      task_id: task.id().clone(),
      app_name: task.route().app_name.clone(),
      path: task.route().path.clone(),
      state: outcome.state(),
      output,
      error,
      attempts: task.attempt(),
      completed_at: Utc::now(),
    }
  }
}

/// Where terminal outcomes are reported. Delivery is fire-and-forget: the
/// runner logs a failure and moves on.
#[async_trait]
pub trait StatusCallback: Send + Sync {
  async fn report(&self, report: &StatusReport) -> Result<(), CallbackError>;
}

/// Posts reports as JSON to `<base_url>/tasks/<task_id>`.
#[derive(Debug, Clone)]
pub struct HttpCallback {
  client: reqwest::Client,
  base_url: String,
}

impl HttpCallback {
  const TIMEOUT: Duration = Duration::from_secs(10);

  pub fn new(base_url: impl Into<String>) -> Result<Self, CallbackError> {
    let client = reqwest::Client::builder().timeout(Self::TIMEOUT).build()?;
    Ok(Self::with_client(client, base_url))
  }

  pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn url_for(&self, task_id: &TaskId) -> String {
    format!("{}/tasks/{}", self.base_url, task_id)
  }
}

#[async_trait]
impl StatusCallback for HttpCallback {
  async fn report(&self, report: &StatusReport) -> Result<(), CallbackError> {
    self
      .client
      .post(self.url_for(&report.task_id))
      .json(report)
      .send()
      .await?
      .error_for_status()?;
    Ok(())
  }
}

/// Drops every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallback;

#[async_trait]
impl StatusCallback for NoopCallback {
  async fn report(&self, _report: &StatusReport) -> Result<(), CallbackError> {
    Ok(())
  }
}
