//! The async runner loop.

use std::sync::Arc;

use sluice_config::RunnerConfig;
use sluice_pool::{AdmissionError, WorkerPool};
use sluice_queue::{Message, MessageId, Queue};
use sluice_task::{Failure, Task, TaskEnvelope, TaskOutcome, TaskState};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::callback::{StatusCallback, StatusReport};
use crate::error::RunnerError;

/// Reserves queued tasks and runs them on the worker pool.
///
/// Cloning is cheap; a supervisor builds a fresh loop from a clone on every
/// restart.
#[derive(Clone)]
pub struct AsyncRunner {
  queue: Arc<dyn Queue>,
  pool: WorkerPool,
  callback: Arc<dyn StatusCallback>,
  config: RunnerConfig,
}

impl AsyncRunner {
  pub fn new(
    queue: Arc<dyn Queue>,
    pool: WorkerPool,
    callback: Arc<dyn StatusCallback>,
    config: RunnerConfig,
  ) -> Self {
    Self {
      queue,
      pool,
      callback,
      config,
    }
  }

  /// Run until `cancel` fires. A queue error ends the loop with an error.
  ///
  /// Up to `concurrency` reserved messages are handled at once; no new
  /// message is reserved while that many are in progress. On the way out
  /// (cancel or queue error) every message already reserved is settled
  /// before the loop returns.
  pub async fn run(self, cancel: CancellationToken) -> Result<(), RunnerError> {
    let limit = self.config.concurrency_for(self.pool.size());
    info!(
      concurrency = limit,
      max_attempts = self.config.retry.max_attempts,
      backoff = ?self.config.retry.backoff,
      "async runner started"
    );

    let mut in_progress = JoinSet::new();
    let result = loop {
      while let Some(joined) = in_progress.try_join_next() {
        log_join(joined);
      }

      if in_progress.len() >= limit {
        tokio::select! {
          biased;
          _ = cancel.cancelled() => break Ok(()),
          Some(joined) = in_progress.join_next() => log_join(joined),
        }
        continue;
      }

      let reserved = tokio::select! {
        biased;
        _ = cancel.cancelled() => break Ok(()),
        reserved = self.queue.reserve(self.config.reserve_timeout()) => reserved,
      };

      match reserved {
        Ok(Some(message)) => {
          let runner = self.clone();
          in_progress.spawn(async move { runner.handle(message).await });
        }
        Ok(None) => continue,
        Err(e) => {
          error!(error = %e, "failed to reserve from queue");
          break Err(e.into());
        }
      }
    };

    if !in_progress.is_empty() {
      info!(in_progress = in_progress.len(), "settling reserved messages");
    }
    while let Some(joined) = in_progress.join_next().await {
      log_join(joined);
    }

    info!("async runner stopped");
    result
  }

  #[instrument(
    name = "async_run",
    skip(self, message),
    fields(
      message_id = %message.id,
      delivery = message.delivery_count,
    )
  )]
  async fn handle(&self, message: Message) {
    let envelope = match TaskEnvelope::from_bytes(&message.body) {
      Ok(envelope) => envelope,
      Err(e) => {
        // it will never decode, so retrying is pointless
        error!(error = %e, "dropping undecodable message");
        self.delete(&message.id).await;
        return;
      }
    };

    if self.pool.ledger().contains(&envelope.task_id) {
      info!(task_id = %envelope.task_id, "task already completed, dropping redelivered message");
      self.delete(&message.id).await;
      return;
    }

    let attempt = message.delivery_count.max(1);
    let task = Arc::new(envelope.into_task(self.config.task_timeout(), attempt));

    let outcome = match self.pool.execute(task.clone()).await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(task_id = %task.id(), error = %e, "task not admitted");
        let outcome = TaskOutcome::failed(admission_failure(e));
        task.complete(outcome.clone());
        outcome
      }
    };

    if outcome.is_transient_failure() && self.config.retry.allows_retry(attempt) {
      self.retry(&task, &message.id, &outcome).await;
      return;
    }

    self.settle(&task, &message.id, outcome).await;
  }

  /// Put a transiently failed task back on the queue.
  async fn retry(&self, task: &Task, message_id: &MessageId, outcome: &TaskOutcome) {
    let delay = self.config.retry.delay_for(task.attempt());
    warn!(
      task_id = %task.id(),
      attempt = task.attempt(),
      delay_ms = delay.as_millis() as u64,
      error = ?outcome.failure(),
      "transient failure, releasing for retry"
    );

    transition(task, TaskState::Queued);
    if let Err(e) = self.queue.release(message_id, delay).await {
      // the reservation will lapse and the message comes back anyway
      error!(task_id = %task.id(), error = %e, "failed to release message");
    }
  }

  /// Record a final outcome, remove the message and report.
  async fn settle(&self, task: &Task, message_id: &MessageId, outcome: TaskOutcome) {
    let outcome = self
      .pool
      .ledger()
      .record(task.id(), outcome.clone())
      .unwrap_or(outcome);

    self.delete(message_id).await;

    let report = StatusReport::new(task, &outcome);
    match self.callback.report(&report).await {
      Ok(()) => debug!(task_id = %task.id(), "status reported"),
      Err(e) => error!(task_id = %task.id(), error = %e, "status callback failed"),
    }

    transition(task, TaskState::Completed);
    info!(
      task_id = %task.id(),
      state = %report.state,
      attempts = task.attempt(),
      "async task completed"
    );
  }

  async fn delete(&self, message_id: &MessageId) {
    if let Err(e) = self.queue.delete(message_id).await {
      error!(message_id = %message_id, error = %e, "failed to delete message");
    }
  }
}

fn admission_failure(err: AdmissionError) -> Failure {
  match err {
    AdmissionError::Closed => Failure::Cancelled,
    other => Failure::ResourceExhausted {
      message: other.to_string(),
    },
  }
}

fn log_join(joined: Result<(), JoinError>) {
  if let Err(e) = joined {
    error!(error = %e, "message handler did not finish");
  }
}

fn transition(task: &Task, next: TaskState) {
  if let Err(e) = task.transition(next) {
    debug!(task_id = %task.id(), error = %e, "state not updated");
  }
}
