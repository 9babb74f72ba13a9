//! Thin HTTP front for the dispatch core.
//!
//! - `POST|GET /r/{app}/{*path}` invokes a route. Sync routes answer with the
//!   function's output; async routes answer `202` with the task id.
//! - `POST /tasks/{id}` receives async status callbacks.
//! - `GET /tasks/{id}` returns the last status received for a task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use parking_lot::Mutex;
use serde_json::json;
use sluice_dispatch::{DispatchError, Invocation, InvokeError, InvokeRequest, Invoker};
use sluice_runner::StatusReport;
use sluice_task::TaskId;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Request header carrying a per-call deadline for sync routes.
pub const TIMEOUT_HEADER: &str = "x-sluice-timeout-ms";

/// Task id of a completed sync invocation.
pub const TASK_ID_HEADER: &str = "x-sluice-task-id";

/// Last reported status of each async task.
///
/// Bounded like the outcome ledger: at most `capacity` tasks are kept, and
/// a report older than `ttl` is forgotten. The oldest go first.
#[derive(Debug)]
pub struct StatusBoard {
  capacity: usize,
  ttl: Duration,
  inner: Mutex<BoardInner>,
}

#[derive(Debug, Default)]
struct BoardInner {
  reports: HashMap<TaskId, (StatusReport, u64)>,
  order: VecDeque<(TaskId, u64, Instant)>,
  next_seq: u64,
}

impl StatusBoard {
  pub fn new(capacity: usize, ttl: Duration) -> Self {
    Self {
      capacity: capacity.max(1),
      ttl,
      inner: Mutex::new(BoardInner::default()),
    }
  }

  /// Store `report`, replacing any earlier one for the same task.
  pub fn record(&self, report: StatusReport) {
    let now = Instant::now();
    let mut inner = self.inner.lock();
    let seq = inner.next_seq;
    inner.next_seq += 1;

    let task_id = report.task_id.clone();
    inner.reports.insert(task_id.clone(), (report, seq));
    inner.order.push_back((task_id, seq, now));
    self.prune(&mut inner, now);
  }

  pub fn get(&self, task_id: &TaskId) -> Option<StatusReport> {
    let mut inner = self.inner.lock();
    self.prune(&mut inner, Instant::now());
    inner.reports.get(task_id).map(|(report, _)| report.clone())
  }

  pub fn len(&self) -> usize {
    let mut inner = self.inner.lock();
    self.prune(&mut inner, Instant::now());
    inner.reports.len()
  }

  fn prune(&self, inner: &mut BoardInner, now: Instant) {
    while let Some((task_id, seq, at)) = inner.order.front() {
      // a task reported again has a newer entry further back
      let current = inner.reports.get(task_id).is_some_and(|(_, stored)| stored == seq);
      let expired = now.duration_since(*at) >= self.ttl;
      if current && !expired && inner.reports.len() <= self.capacity {
        break;
      }
      if current {
        inner.reports.remove(task_id);
      }
      inner.order.pop_front();
    }
  }
}

#[derive(Clone)]
pub struct AppState {
  invoker: Invoker,
  board: Arc<StatusBoard>,
}

impl AppState {
  pub fn new(invoker: Invoker, board: StatusBoard) -> Self {
    Self {
      invoker,
      board: Arc::new(board),
    }
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/r/{app}/{*path}", post(invoke).get(invoke))
    .route("/tasks/{id}", post(receive_status).get(task_status))
    .with_state(state)
}

/// Serve until `cancel` fires, then finish in-flight requests.
pub async fn serve(listener: TcpListener, state: AppState, cancel: CancellationToken) -> anyhow::Result<()> {
  info!(addr = %listener.local_addr()?, "http listener started");
  axum::serve(listener, router(state))
    .with_graceful_shutdown(cancel.cancelled_owned())
    .await?;
  info!("http listener stopped");
  Ok(())
}

async fn invoke(
  State(state): State<AppState>,
  Path((app, path)): Path<(String, String)>,
  headers: HeaderMap,
  body: String,
) -> Response {
  let path = format!("/{path}");
  let request = InvokeRequest {
    payload: body,
    timeout: timeout_from(&headers),
    headers: forwarded_headers(&headers),
  };

  match state.invoker.invoke(&app, &path, request).await {
    Ok(Invocation::Completed { task_id, output }) => (
      StatusCode::OK,
      [(TASK_ID_HEADER, task_id.to_string())],
      output,
    )
      .into_response(),
    Ok(Invocation::Accepted { task_id }) => {
      (StatusCode::ACCEPTED, Json(json!({ "task_id": task_id }))).into_response()
    }
    Err(e) => {
      let status = status_for(&e);
      if status.is_server_error() {
        warn!(app = %app, path = %path, error = %e, "invocation failed");
      } else {
        debug!(app = %app, path = %path, error = %e, "invocation rejected");
      }
      (status, Json(json!({ "error": e.to_string() }))).into_response()
    }
  }
}

async fn receive_status(
  State(state): State<AppState>,
  Path(id): Path<String>,
  Json(report): Json<StatusReport>,
) -> StatusCode {
  if report.task_id.as_str() != id {
    return StatusCode::BAD_REQUEST;
  }
  state.board.record(report);
  debug!(task_id = %id, tracked = state.board.len(), "status received");
  StatusCode::NO_CONTENT
}

async fn task_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
  match state.board.get(&TaskId::from(id)) {
    Some(report) => Json(report).into_response(),
    None => StatusCode::NOT_FOUND.into_response(),
  }
}

/// HTTP status for an invocation error.
pub fn status_for(err: &InvokeError) -> StatusCode {
  match err {
    InvokeError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
    InvokeError::Validation(_) => StatusCode::BAD_REQUEST,
    InvokeError::Dispatch(DispatchError::Admission(_)) => StatusCode::SERVICE_UNAVAILABLE,
    InvokeError::Dispatch(DispatchError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
    InvokeError::Dispatch(DispatchError::Failed { .. }) => StatusCode::BAD_GATEWAY,
    InvokeError::Lookup { .. } | InvokeError::Enqueue(_) => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

fn timeout_from(headers: &HeaderMap) -> Option<Duration> {
  headers
    .get(TIMEOUT_HEADER)?
    .to_str()
    .ok()?
    .parse()
    .ok()
    .map(Duration::from_millis)
}

/// Request headers as handed to the function. Transport-level headers are
/// left out.
fn forwarded_headers(headers: &HeaderMap) -> HashMap<String, Vec<String>> {
  const SKIP: [&str; 5] = ["host", "content-length", "connection", "transfer-encoding", TIMEOUT_HEADER];

  let mut forwarded: HashMap<String, Vec<String>> = HashMap::new();
  for (name, value) in headers {
    if SKIP.contains(&name.as_str()) {
      continue;
    }
    if let Ok(value) = value.to_str() {
      forwarded
        .entry(name.as_str().to_string())
        .or_default()
        .push(value.to_string());
    }
  }
  forwarded
}
