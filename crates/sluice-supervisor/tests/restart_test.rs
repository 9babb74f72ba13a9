//! Real pool and runner units under supervision: work keeps flowing across
//! restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sluice_config::{PoolConfig, RunnerConfig, SupervisorConfig};
use sluice_container::{ContainerRuntime, RunError, RunOutput, RunRequest};
use sluice_pool::WorkerPool;
use sluice_queue::{MemoryQueue, Message, MessageId, Queue, QueueError};
use sluice_route::{Route, RouteDef, validate};
use sluice_runner::{AsyncRunner, NoopCallback};
use sluice_supervisor::Supervisor;
use sluice_task::{OutcomeLedger, Task, TaskEnvelope, TaskOutcome};
use tokio_util::sync::CancellationToken;

struct EchoRuntime;

#[async_trait]
impl ContainerRuntime for EchoRuntime {
  async fn run(&self, request: RunRequest, _: CancellationToken) -> Result<RunOutput, RunError> {
    Ok(RunOutput {
      stdout: request.payload,
      stderr: String::new(),
    })
  }
}

/// Fails the first `reserve`, then behaves like a memory queue.
struct FailOnceQueue {
  inner: MemoryQueue,
  failed: AtomicBool,
  deletes: AtomicUsize,
}

#[async_trait]
impl Queue for FailOnceQueue {
  async fn push(&self, body: Vec<u8>) -> Result<MessageId, QueueError> {
    self.inner.push(body).await
  }

  async fn reserve(&self, timeout: Duration) -> Result<Option<Message>, QueueError> {
    if !self.failed.swap(true, Ordering::SeqCst) {
      return Err(QueueError::Io(std::io::Error::other("connection reset")));
    }
    self.inner.reserve(timeout).await
  }

  async fn delete(&self, id: &MessageId) -> Result<(), QueueError> {
    self.inner.delete(id).await?;
    self.deletes.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }

  async fn release(&self, id: &MessageId, delay: Duration) -> Result<(), QueueError> {
    self.inner.release(id, delay).await
  }
}

fn supervisor_config() -> SupervisorConfig {
  SupervisorConfig {
    restart_delay_ms: 10,
    max_restart_delay_ms: 50,
    drain_timeout_ms: 2_000,
  }
}

fn route(route_type: &str) -> Route {
  validate(RouteDef {
    app_name: "myapp".to_string(),
    path: "/hello".to_string(),
    image: "iron/hello".to_string(),
    route_type: route_type.to_string(),
    ..Default::default()
  })
  .unwrap()
}

fn pool() -> WorkerPool {
  WorkerPool::new(
    PoolConfig {
      size: 2,
      ..Default::default()
    },
    Arc::new(EchoRuntime),
    Arc::new(OutcomeLedger::new(100, Duration::from_secs(60))),
  )
}

#[tokio::test]
async fn test_pool_panic_does_not_lose_queued_work() {
  let pool = pool();
  let starts = Arc::new(AtomicUsize::new(0));

  let mut supervisor = Supervisor::new(supervisor_config());
  {
    let pool = pool.clone();
    let starts = starts.clone();
    supervisor.add("pool", move |cancel| {
      let pool = pool.clone();
      let start = starts.fetch_add(1, Ordering::SeqCst);
      async move {
        if start == 0 {
          panic!("pool driver crashed");
        }
        anyhow::Ok(pool.run(cancel).await?)
      }
    });
  }
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  let task = Arc::new(Task::new(Arc::new(route("sync")), "still here", Duration::from_secs(5)));
  let outcome = tokio::time::timeout(Duration::from_secs(5), pool.execute(task))
    .await
    .expect("task was not picked up after restart")
    .unwrap();

  assert_eq!(outcome, TaskOutcome::succeeded("still here"));
  assert_eq!(handle.restarts("pool"), 1);

  shutdown.cancel();
  serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_runner_resumes_after_queue_error() {
  let pool = pool();
  let queue = Arc::new(FailOnceQueue {
    inner: MemoryQueue::new(Duration::from_secs(60)),
    failed: AtomicBool::new(false),
    deletes: AtomicUsize::new(0),
  });

  let envelope = TaskEnvelope::new(&route("async"), "later", HashMap::new());
  queue.push(envelope.to_bytes().unwrap()).await.unwrap();

  let runner = AsyncRunner::new(
    queue.clone(),
    pool.clone(),
    Arc::new(NoopCallback),
    RunnerConfig {
      reserve_timeout_ms: 50,
      ..Default::default()
    },
  );

  let mut supervisor = Supervisor::new(supervisor_config());
  supervisor
    .add("pool", move |cancel| {
      let pool = pool.clone();
      async move { anyhow::Ok(pool.run(cancel).await?) }
    })
    .add("runner", move |cancel| {
      let runner = runner.clone();
      async move { anyhow::Ok(runner.run(cancel).await?) }
    });
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  let settled = tokio::time::timeout(Duration::from_secs(5), async {
    while queue.deletes.load(Ordering::SeqCst) == 0 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await;
  assert!(settled.is_ok(), "message was never settled");
  assert_eq!(handle.restarts("runner"), 1);
  assert!(queue.inner.is_empty());

  shutdown.cancel();
  serving.await.unwrap().unwrap();
}
