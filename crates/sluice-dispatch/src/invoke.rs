//! Route resolution and mode selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sluice_datastore::Datastore;
use sluice_route::{Route, validate};
use sluice_task::TaskId;
use tracing::debug;

use crate::enqueue::AsyncEnqueuer;
use crate::error::InvokeError;
use crate::sync::SyncDispatcher;

/// One inbound invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeRequest {
  pub payload: String,
  pub headers: HashMap<String, Vec<String>>,
  /// Deadline for sync routes; the invoker's default applies when unset.
  pub timeout: Option<Duration>,
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
  /// A sync route ran to completion.
  Completed { task_id: TaskId, output: String },
  /// An async route was queued.
  Accepted { task_id: TaskId },
}

impl Invocation {
  pub fn task_id(&self) -> &TaskId {
    match self {
      Self::Completed { task_id, .. } | Self::Accepted { task_id } => task_id,
    }
  }
}

/// Resolves `(app, path)` to a route and invokes it in the route's mode.
#[derive(Clone)]
pub struct Invoker {
  datastore: Arc<dyn Datastore>,
  dispatcher: SyncDispatcher,
  enqueuer: AsyncEnqueuer,
  default_timeout: Duration,
}

impl Invoker {
  pub fn new(
    datastore: Arc<dyn Datastore>,
    dispatcher: SyncDispatcher,
    enqueuer: AsyncEnqueuer,
    default_timeout: Duration,
  ) -> Self {
    Self {
      datastore,
      dispatcher,
      enqueuer,
      default_timeout,
    }
  }

  /// Look up and validate a route. Validation failures are reported before
  /// any task exists.
  pub async fn resolve(&self, app_name: &str, path: &str) -> Result<Arc<Route>, InvokeError> {
    let def = self
      .datastore
      .get_route(app_name, path)
      .await
      .map_err(|e| {
        if e.is_not_found() {
          InvokeError::RouteNotFound {
            app_name: app_name.to_string(),
            path: path.to_string(),
          }
        } else {
          InvokeError::Lookup { source: e }
        }
      })?;

    Ok(Arc::new(validate(def)?))
  }

  pub async fn invoke(
    &self,
    app_name: &str,
    path: &str,
    request: InvokeRequest,
  ) -> Result<Invocation, InvokeError> {
    let route = self.resolve(app_name, path).await?;
    debug!(route = %route.key(), route_type = route.route_type.as_str(), "route resolved");

    if route.is_async() {
      let task_id = self
        .enqueuer
        .enqueue(&route, request.payload, request.headers)
        .await?;
      return Ok(Invocation::Accepted { task_id });
    }

    let timeout = request.timeout.unwrap_or(self.default_timeout);
    let dispatched = self
      .dispatcher
      .dispatch(route, request.payload, request.headers, timeout)
      .await?;

    Ok(Invocation::Completed {
      task_id: dispatched.task_id,
      output: dispatched.output,
    })
  }
}
