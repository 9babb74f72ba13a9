//! Sync dispatch, async enqueue and invocation through the route lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sluice_config::{AdmissionPolicy, PoolConfig};
use sluice_container::{ContainerRuntime, RunError, RunOutput, RunRequest};
use sluice_datastore::{Datastore, MemoryDatastore};
use sluice_dispatch::{
  AsyncEnqueuer, DispatchError, EnqueueError, Invocation, InvokeError, InvokeRequest, Invoker,
  SyncDispatcher,
};
use sluice_pool::{AdmissionError, WorkerPool};
use sluice_queue::{MemoryQueue, Message, MessageId, Queue, QueueError};
use sluice_route::{Route, RouteDef, Violation, validate};
use sluice_task::{Failure, OutcomeLedger, Task, TaskEnvelope, TaskState};
use tokio_util::sync::CancellationToken;

/// Echoes the payload back after `delay`, or fails when the payload says so.
struct EchoRuntime {
  delay: Duration,
}

#[async_trait]
impl ContainerRuntime for EchoRuntime {
  async fn run(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunOutput, RunError> {
    tokio::select! {
      _ = tokio::time::sleep(self.delay) => {}
      _ = cancel.cancelled() => return Err(RunError::Cancelled),
    }
    if request.payload == "fail" {
      return Err(RunError::NonZeroExit {
        code: 1,
        stderr: "bad input".to_string(),
      });
    }
    Ok(RunOutput {
      stdout: format!("hello {}", request.payload),
      stderr: String::new(),
    })
  }
}

struct DownQueue;

#[async_trait]
impl Queue for DownQueue {
  async fn push(&self, _: Vec<u8>) -> Result<MessageId, QueueError> {
    Err(queue_down())
  }
  async fn reserve(&self, _: Duration) -> Result<Option<Message>, QueueError> {
    Err(queue_down())
  }
  async fn delete(&self, id: &MessageId) -> Result<(), QueueError> {
    Err(QueueError::NotFound(id.clone()))
  }
  async fn release(&self, id: &MessageId, _: Duration) -> Result<(), QueueError> {
    Err(QueueError::NotFound(id.clone()))
  }
}

fn queue_down() -> QueueError {
  QueueError::Io(std::io::Error::new(
    std::io::ErrorKind::ConnectionRefused,
    "queue down",
  ))
}

fn def(path: &str, route_type: &str) -> RouteDef {
  RouteDef {
    app_name: "myapp".to_string(),
    path: path.to_string(),
    image: "iron/hello".to_string(),
    route_type: route_type.to_string(),
    ..Default::default()
  }
}

fn route(path: &str) -> Arc<Route> {
  Arc::new(validate(def(path, "sync")).unwrap())
}

fn started_pool(size: usize, admission: AdmissionPolicy, delay: Duration) -> WorkerPool {
  let pool = WorkerPool::new(
    PoolConfig {
      size,
      admission,
      cancel_grace_ms: 100,
    },
    Arc::new(EchoRuntime { delay }),
    Arc::new(OutcomeLedger::new(100, Duration::from_secs(60))),
  );
  tokio::spawn(pool.clone().run(CancellationToken::new()));
  pool
}

#[tokio::test]
async fn test_sync_dispatch_returns_output() {
  let dispatcher = SyncDispatcher::new(started_pool(2, AdmissionPolicy::Block, Duration::ZERO));
  let task = Arc::new(Task::new(route("/hello"), "world", Duration::from_secs(5)));

  let dispatched = dispatcher.dispatch_task(task.clone()).await.unwrap();

  assert_eq!(dispatched.output, "hello world");
  assert_eq!(&dispatched.task_id, task.id());
  assert_eq!(task.state(), TaskState::Succeeded);
}

#[tokio::test]
async fn test_sync_dispatch_times_out() {
  let dispatcher = SyncDispatcher::new(started_pool(
    1,
    AdmissionPolicy::Block,
    Duration::from_secs(10),
  ));

  let started = std::time::Instant::now();
  let err = dispatcher
    .dispatch(
      route("/slow"),
      "world",
      HashMap::new(),
      Duration::from_millis(100),
    )
    .await
    .unwrap_err();

  assert!(matches!(err, DispatchError::Timeout { .. }));
  assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_sync_dispatch_reports_failure() {
  let dispatcher = SyncDispatcher::new(started_pool(1, AdmissionPolicy::Block, Duration::ZERO));
  let err = dispatcher
    .dispatch(route("/hello"), "fail", HashMap::new(), Duration::from_secs(5))
    .await
    .unwrap_err();

  match err {
    DispatchError::Failed { failure, .. } => {
      assert!(matches!(failure, Failure::NonZeroExit { code: 1, .. }))
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_sync_dispatch_rejected_when_saturated() {
  let pool = started_pool(1, AdmissionPolicy::Reject, Duration::from_secs(10));
  let dispatcher = SyncDispatcher::new(pool.clone());

  let busy = Arc::new(Task::new(route("/hello"), "a", Duration::from_secs(30)));
  pool.submit(busy).await.unwrap();

  let err = dispatcher
    .dispatch(route("/hello"), "b", HashMap::new(), Duration::from_secs(5))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    DispatchError::Admission(AdmissionError::Saturated)
  ));
}

#[tokio::test]
async fn test_enqueue_pushes_envelope() {
  let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
  let enqueuer = AsyncEnqueuer::new(queue.clone());

  let route = route("/hello");
  let headers = HashMap::from([("X-Id".to_string(), vec!["1".to_string()])]);
  let task_id = enqueuer.enqueue(&route, "world", headers.clone()).await.unwrap();

  let message = queue.reserve(Duration::ZERO).await.unwrap().unwrap();
  let envelope = TaskEnvelope::from_bytes(&message.body).unwrap();
  assert_eq!(envelope.task_id, task_id);
  assert_eq!(envelope.route, *route);
  assert_eq!(envelope.payload, "world");
  assert_eq!(envelope.headers, headers);
}

#[tokio::test]
async fn test_enqueue_surfaces_queue_failure() {
  let enqueuer = AsyncEnqueuer::new(Arc::new(DownQueue));
  let err = enqueuer
    .enqueue(&route("/hello"), "world", HashMap::new())
    .await
    .unwrap_err();
  assert!(matches!(err, EnqueueError::Queue(_)));
}

async fn invoker(queue: Arc<MemoryQueue>) -> Invoker {
  let datastore = MemoryDatastore::new();
  datastore.put_route(def("/sync", "")).await.unwrap();
  datastore.put_route(def("/async", "async")).await.unwrap();
  datastore.put_route(def("/broken/:id", "sync")).await.unwrap();

  Invoker::new(
    Arc::new(datastore),
    SyncDispatcher::new(started_pool(2, AdmissionPolicy::Block, Duration::ZERO)),
    AsyncEnqueuer::new(queue),
    Duration::from_secs(5),
  )
}

#[tokio::test]
async fn test_invoke_sync_route() {
  let invoker = invoker(Arc::new(MemoryQueue::new(Duration::from_secs(60)))).await;
  let invocation = invoker
    .invoke(
      "myapp",
      "/sync",
      InvokeRequest {
        payload: "there".to_string(),
        ..Default::default()
      },
    )
    .await
    .unwrap();

  assert!(matches!(invocation, Invocation::Completed { ref output, .. } if output == "hello there"));
}

#[tokio::test]
async fn test_invoke_async_route_is_accepted() {
  let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
  let invoker = invoker(queue.clone()).await;

  let invocation = invoker
    .invoke("myapp", "/async", InvokeRequest::default())
    .await
    .unwrap();

  let Invocation::Accepted { task_id } = invocation else {
    panic!("async route should be accepted, got {invocation:?}");
  };
  let message = queue.reserve(Duration::ZERO).await.unwrap().unwrap();
  assert_eq!(TaskEnvelope::from_bytes(&message.body).unwrap().task_id, task_id);
}

#[tokio::test]
async fn test_invoke_unknown_route() {
  let invoker = invoker(Arc::new(MemoryQueue::new(Duration::from_secs(60)))).await;
  let err = invoker
    .invoke("myapp", "/missing", InvokeRequest::default())
    .await
    .unwrap_err();
  assert!(matches!(err, InvokeError::RouteNotFound { .. }));
}

#[tokio::test]
async fn test_invoke_invalid_route_fails_before_running() {
  let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
  let invoker = invoker(queue.clone()).await;

  let err = invoker
    .invoke("myapp", "/broken/:id", InvokeRequest::default())
    .await
    .unwrap_err();
  match err {
    InvokeError::Validation(e) => assert!(e.contains(Violation::DynamicUrl)),
    other => panic!("unexpected error: {other}"),
  }
  assert!(queue.is_empty());
}
