//! Worker pool implementation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::FutureExt;
use sluice_config::{AdmissionPolicy, PoolConfig};
use sluice_container::{ContainerRuntime, RunError, RunRequest};
use sluice_task::{Failure, OutcomeLedger, Task, TaskOutcome, TaskState, panic_message};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore, TryAcquireError, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::env::invocation_env;
use crate::error::{AdmissionError, PoolError};
use crate::gate::RouteGates;

/// A fixed-size set of execution slots fed from one intake channel.
///
/// Cloning is cheap; every clone shares the same slots, gates and intake.
#[derive(Clone)]
pub struct WorkerPool {
  inner: Arc<Inner>,
}

struct Inner {
  config: PoolConfig,
  runtime: Arc<dyn ContainerRuntime>,
  ledger: Arc<OutcomeLedger>,
  global: Arc<Semaphore>,
  routes: RouteGates,
  intake_tx: mpsc::Sender<Job>,
  /// Shared by the slots; outlives any single run of the driver.
  intake_rx: Mutex<mpsc::Receiver<Job>>,
  in_flight: AtomicUsize,
}

/// An admitted task together with the capacity it holds.
struct Job {
  task: Arc<Task>,
  permits: Option<Permits>,
}

struct Permits {
  _route: Option<OwnedSemaphorePermit>,
  _global: OwnedSemaphorePermit,
}

impl Drop for Job {
  // a job that is dropped without an outcome (shutdown, aborted slot) must
  // not leave its waiter hanging
  fn drop(&mut self) {
    if self.task.outcome().is_none() {
      self.task.complete(TaskOutcome::failed(Failure::Cancelled));
    }
  }
}

impl WorkerPool {
  pub fn new(
    config: PoolConfig,
    runtime: Arc<dyn ContainerRuntime>,
    ledger: Arc<OutcomeLedger>,
  ) -> Self {
    let size = config.size.max(1);
    // at most `size` jobs hold a global permit, so sends never wait
    let (intake_tx, intake_rx) = mpsc::channel(size);

    Self {
      inner: Arc::new(Inner {
        config: PoolConfig { size, ..config },
        runtime,
        ledger,
        global: Arc::new(Semaphore::new(size)),
        routes: RouteGates::default(),
        intake_tx,
        intake_rx: Mutex::new(intake_rx),
        in_flight: AtomicUsize::new(0),
      }),
    }
  }

  /// Number of execution slots.
  pub fn size(&self) -> usize {
    self.inner.config.size
  }

  /// Tasks currently running against the container runtime.
  pub fn in_flight(&self) -> usize {
    self.inner.in_flight.load(Ordering::Acquire)
  }

  pub fn ledger(&self) -> &Arc<OutcomeLedger> {
    &self.inner.ledger
  }

  /// Admit a task into the intake.
  ///
  /// Under the `block` policy this waits for capacity; under `reject` it
  /// fails immediately when the route or the pool is full. The outcome is
  /// delivered through the task's completion slot.
  pub async fn submit(&self, task: Arc<Task>) -> Result<(), AdmissionError> {
    let policy = self.inner.config.admission;

    let route_permit = match self.inner.routes.gate_for(task.route()) {
      Some(gate) => Some(
        acquire(gate, policy, || AdmissionError::RouteSaturated {
          route: task.route().key(),
        })
        .await?,
      ),
      None => None,
    };
    let global_permit = acquire(self.inner.global.clone(), policy, || AdmissionError::Saturated).await?;

    let job = Job {
      task,
      permits: Some(Permits {
        _route: route_permit,
        _global: global_permit,
      }),
    };

    self.inner.intake_tx.try_send(job).map_err(|e| match e {
      // permits bound the intake, so this only happens if that invariant breaks
      mpsc::error::TrySendError::Full(_) => AdmissionError::Saturated,
      mpsc::error::TrySendError::Closed(_) => AdmissionError::Closed,
    })
  }

  /// Admit a task and wait for its outcome.
  ///
  /// This is the single execution path shared by sync dispatch and the
  /// async runner. Errors are only ever admission errors; execution
  /// problems come back as a failed [`TaskOutcome`].
  pub async fn execute(&self, task: Arc<Task>) -> Result<TaskOutcome, AdmissionError> {
    self.submit(task.clone()).await?;
    Ok(task.wait().await)
  }

  /// Drive the execution slots until `cancel` fires.
  ///
  /// Returns an error if a slot dies; the intake is kept so a restarted
  /// driver picks up where this one left off. On cancellation, running tasks
  /// finish, the intake is closed and tasks still waiting in it fail with
  /// [`Failure::Cancelled`].
  pub async fn run(self, cancel: CancellationToken) -> Result<(), PoolError> {
    let size = self.size();
    info!(size, admission = %self.inner.config.admission, "worker pool started");

    let slots_cancel = cancel.child_token();
    let mut slots = JoinSet::new();
    for slot in 0..size {
      let inner = self.inner.clone();
      let cancel = slots_cancel.clone();
      slots.spawn(async move {
        inner.slot_loop(slot, cancel).await;
        slot
      });
    }

    let mut failure = None;
    while let Some(joined) = slots.join_next().await {
      if cancel.is_cancelled() || failure.is_some() {
        continue;
      }
      let err = match joined {
        Ok(slot) => PoolError::SlotExited { slot },
        Err(e) if e.is_panic() => PoolError::SlotPanicked {
          message: panic_message(&*e.into_panic()),
        },
        Err(e) => PoolError::SlotPanicked {
          message: e.to_string(),
        },
      };
      error!(error = %err, "worker pool slot failed, stopping driver");
      // let the other slots finish what they're running, then report
      slots_cancel.cancel();
      failure.get_or_insert(err);
    }

    if let Some(err) = failure {
      return Err(err);
    }

    self.inner.close_intake().await;
    info!("worker pool stopped");
    Ok(())
  }
}

impl Inner {
  async fn slot_loop(&self, slot: usize, cancel: CancellationToken) {
    debug!(slot, "slot started");
    loop {
      let job = tokio::select! {
        biased;
        _ = cancel.cancelled() => break,
        job = async { self.intake_rx.lock().await.recv().await } => job,
      };
      let Some(mut job) = job else { break };

      self.in_flight.fetch_add(1, Ordering::AcqRel);
      let outcome = self.execute_task(&job.task).await;
      self.in_flight.fetch_sub(1, Ordering::AcqRel);

      self.finish(&mut job, outcome);
    }
    debug!(slot, "slot stopped");
  }

  /// Run one task and decide its outcome. Never fails: every problem becomes
  /// a failed outcome.
  #[instrument(
    name = "pool_execute",
    skip(self, task),
    fields(
      task_id = %task.id(),
      route = %task.route().key(),
      attempt = task.attempt(),
    )
  )]
  async fn execute_task(&self, task: &Task) -> TaskOutcome {
    if let Some(existing) = self.ledger.get(task.id()) {
      info!("outcome already recorded, not running again");
      return existing;
    }

    if task.is_expired() {
      warn!("deadline passed before the task started");
      return TaskOutcome::failed(Failure::DeadlineExceeded);
    }

    if let Err(e) = task.transition(TaskState::Running) {
      error!(error = %e, "task can't start");
      return TaskOutcome::failed(Failure::Internal {
        message: e.to_string(),
      });
    }

    let route = task.route();
    let request = RunRequest {
      task_id: task.id().to_string(),
      image: route.image.clone(),
      memory_mb: route.memory,
      env: invocation_env(task),
      payload: task.payload().to_string(),
    };

    info!(image = %route.image, "task started");

    let cancel = CancellationToken::new();
    let run = AssertUnwindSafe(self.runtime.run(request, cancel.clone())).catch_unwind();
    tokio::pin!(run);

    let finished = tokio::select! {
      result = &mut run => Some(result),
      _ = tokio::time::sleep(task.remaining()) => None,
    };

    let outcome = match finished {
      Some(Ok(Ok(output))) => TaskOutcome::succeeded(output.stdout),
      Some(Ok(Err(e))) => TaskOutcome::failed(failure_from(e)),
      Some(Err(panic)) => TaskOutcome::failed(Failure::Internal {
        message: format!("container runtime panicked: {}", panic_message(&*panic)),
      }),
      None => {
        cancel.cancel();
        // give the runtime a moment to tear the container down
        if tokio::time::timeout(self.config.cancel_grace(), &mut run)
          .await
          .is_err()
        {
          warn!("container runtime did not stop within the grace period");
        }
        TaskOutcome::failed(Failure::Timeout)
      }
    };

    match &outcome {
      TaskOutcome::Succeeded { .. } => info!("task succeeded"),
      TaskOutcome::Failed { failure } => warn!(error = %failure, "task failed"),
    }

    outcome
  }

  /// Publish the outcome and wake the waiter.
  ///
  /// Nothing is written to the ledger. Queue-backed tasks are recorded by
  /// the async runner when it settles them; sync outcomes never go in, so
  /// they can't push async task ids out of a bounded ledger.
  fn finish(&self, job: &mut Job, outcome: TaskOutcome) {
    let task = &job.task;

    // free capacity before waking the waiter so it can resubmit at once
    drop(job.permits.take());

    if !task.complete(outcome) {
      debug!(task_id = %task.id(), "outcome already reported");
    }
  }

  async fn close_intake(&self) {
    let mut rx = self.intake_rx.lock().await;
    rx.close();

    let mut drained = 0;
    while let Ok(job) = rx.try_recv() {
      drained += 1;
      drop(job);
    }
    if drained > 0 {
      warn!(drained, "cancelled tasks still waiting in the intake");
    }
  }
}

async fn acquire(
  semaphore: Arc<Semaphore>,
  policy: AdmissionPolicy,
  saturated: impl FnOnce() -> AdmissionError,
) -> Result<OwnedSemaphorePermit, AdmissionError> {
  match policy {
    AdmissionPolicy::Block => semaphore
      .acquire_owned()
      .await
      .map_err(|_| AdmissionError::Closed),
    AdmissionPolicy::Reject => semaphore.try_acquire_owned().map_err(|e| match e {
      TryAcquireError::NoPermits => saturated(),
      TryAcquireError::Closed => AdmissionError::Closed,
    }),
  }
}

fn failure_from(err: RunError) -> Failure {
  match err {
    RunError::NonZeroExit { code, stderr } => Failure::NonZeroExit { code, stderr },
    RunError::OutOfMemory { .. } => Failure::ResourceExhausted {
      message: err.to_string(),
    },
    RunError::Unavailable { message } => Failure::RuntimeUnavailable { message },
    RunError::Cancelled => Failure::Cancelled,
    RunError::Io(e) => Failure::RuntimeUnavailable {
      message: e.to_string(),
    },
  }
}
