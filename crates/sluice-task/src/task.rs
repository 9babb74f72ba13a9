use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use sluice_route::Route;
use tokio::sync::watch;

use crate::error::TaskError;
use crate::id::TaskId;
use crate::outcome::{Failure, TaskOutcome};
use crate::state::TaskState;

/// One invocation attempt of a route.
///
/// Everything except the state and the outcome is fixed at construction.
/// Tasks are shared as `Arc<Task>` between the caller waiting on the result
/// and the pool slot executing it.
#[derive(Debug)]
pub struct Task {
  id: TaskId,
  route: Arc<Route>,
  payload: String,
  headers: HashMap<String, Vec<String>>,
  created_at: DateTime<Utc>,
  deadline: DateTime<Utc>,
  attempt: u32,
  state: Mutex<TaskState>,
  outcome: watch::Sender<Option<TaskOutcome>>,
}

impl Task {
  /// Create a task for a sync invocation: fresh id, `Reserved`, first attempt.
  pub fn new(route: Arc<Route>, payload: impl Into<String>, timeout: Duration) -> Self {
    let created_at = Utc::now();
    let (outcome, _) = watch::channel(None);
    Self {
      id: TaskId::generate(),
      route,
      payload: payload.into(),
      headers: HashMap::new(),
      created_at,
      deadline: deadline_after(created_at, timeout),
      attempt: 1,
      state: Mutex::new(TaskState::Reserved),
      outcome,
    }
  }

  pub fn with_id(mut self, id: TaskId) -> Self {
    self.id = id;
    self
  }

  pub fn with_headers(mut self, headers: HashMap<String, Vec<String>>) -> Self {
    self.headers = headers;
    self
  }

  pub fn with_attempt(mut self, attempt: u32) -> Self {
    self.attempt = attempt;
    self
  }

  /// Keep the original creation time (e.g. when rebuilt from the queue).
  /// The deadline is not moved.
  pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
    self.created_at = created_at;
    self
  }

  pub fn with_state(self, state: TaskState) -> Self {
    *self.state.lock() = state;
    self
  }

  pub fn id(&self) -> &TaskId {
    &self.id
  }

  pub fn route(&self) -> &Arc<Route> {
    &self.route
  }

  pub fn payload(&self) -> &str {
    &self.payload
  }

  pub fn headers(&self) -> &HashMap<String, Vec<String>> {
    &self.headers
  }

  pub fn created_at(&self) -> DateTime<Utc> {
    self.created_at
  }

  pub fn deadline(&self) -> DateTime<Utc> {
    self.deadline
  }

  /// 1-based attempt number.
  pub fn attempt(&self) -> u32 {
    self.attempt
  }

  pub fn state(&self) -> TaskState {
    *self.state.lock()
  }

  /// Time left until the deadline, zero once it has passed.
  pub fn remaining(&self) -> Duration {
    (self.deadline - Utc::now())
      .to_std()
      .unwrap_or(Duration::ZERO)
  }

  pub fn is_expired(&self) -> bool {
    Utc::now() >= self.deadline
  }

  /// Move to `next`, returning the previous state.
  pub fn transition(&self, next: TaskState) -> Result<TaskState, TaskError> {
    let mut state = self.state.lock();
    state.validate_transition(&self.id, &next)?;
    let prev = *state;
    *state = next;
    Ok(prev)
  }

  /// Record the outcome and wake every waiter.
  ///
  /// Only the first call has any effect; it returns `true`. Later calls are
  /// no-ops and return `false`.
  pub fn complete(&self, outcome: TaskOutcome) -> bool {
    let target = outcome.state();
    let recorded = self.outcome.send_if_modified(|slot| {
      if slot.is_some() {
        return false;
      }
      *slot = Some(outcome);
      true
    });

    if recorded {
      let mut state = self.state.lock();
      if !state.has_outcome() {
        *state = target;
      }
    }

    recorded
  }

  /// The recorded outcome, if any.
  pub fn outcome(&self) -> Option<TaskOutcome> {
    self.outcome.borrow().clone()
  }

  /// Wait until an outcome is recorded.
  pub async fn wait(&self) -> TaskOutcome {
    let mut rx = self.outcome.subscribe();
    loop {
      if let Some(outcome) = rx.borrow_and_update().clone() {
        return outcome;
      }
      if rx.changed().await.is_err() {
        // the sender lives in `self`, so this can't happen while we're borrowed
        return TaskOutcome::failed(Failure::Internal {
          message: "completion channel closed".to_string(),
        });
      }
    }
  }
}

fn deadline_after(start: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
  TimeDelta::from_std(timeout)
    .ok()
    .and_then(|delta| start.checked_add_signed(delta))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
