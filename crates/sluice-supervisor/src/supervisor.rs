use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use sluice_config::SupervisorConfig;
use sluice_task::panic_message;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// What a unit factory produces.
pub type UnitFuture = BoxFuture<'static, anyhow::Result<()>>;

type Factory = Arc<dyn Fn(CancellationToken) -> UnitFuture + Send + Sync>;

struct Unit {
  name: String,
  factory: Factory,
}

/// Errors from [`Supervisor::serve`].
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
  /// Some units were still running when the drain timeout ran out and were
  /// aborted.
  #[error("units did not drain in time: {}", units.join(", "))]
  DrainTimeout { units: Vec<String> },
}

/// Read-only view of the supervisor's restart counters.
#[derive(Debug, Clone, Default)]
pub struct SupervisorHandle {
  restarts: Arc<Mutex<HashMap<String, u64>>>,
}

impl SupervisorHandle {
  /// How many times the named unit has been restarted.
  pub fn restarts(&self, name: &str) -> u64 {
    self.restarts.lock().get(name).copied().unwrap_or(0)
  }

  fn record_restart(&self, name: &str) -> u64 {
    let mut restarts = self.restarts.lock();
    let count = restarts.entry(name.to_string()).or_insert(0);
    *count += 1;
    *count
  }
}

/// A registry of named, independently restartable units.
pub struct Supervisor {
  config: SupervisorConfig,
  units: Vec<Unit>,
  handle: SupervisorHandle,
}

impl Supervisor {
  pub fn new(config: SupervisorConfig) -> Self {
    Self {
      config,
      units: Vec::new(),
      handle: SupervisorHandle::default(),
    }
  }

  /// Register a unit. `factory` is called once at start and again after
  /// every failure; the token it gets is cancelled at shutdown.
  pub fn add<F, Fut>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
  where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    self.units.push(Unit {
      name: name.into(),
      factory: Arc::new(move |cancel| factory(cancel).boxed()),
    });
    self
  }

  pub fn handle(&self) -> SupervisorHandle {
    self.handle.clone()
  }

  /// Run every unit until `cancel` fires, then give them the drain timeout
  /// to finish before aborting what's left.
  pub async fn serve(self, cancel: CancellationToken) -> Result<(), SupervisorError> {
    let mut units = JoinSet::new();
    let mut names = HashMap::new();

    for unit in self.units {
      let name = unit.name.clone();
      let handle = units.spawn(supervise(
        unit,
        cancel.clone(),
        self.config.clone(),
        self.handle.clone(),
      ));
      names.insert(handle.id(), name);
    }
    info!(units = names.len(), "supervisor started");

    cancel.cancelled().await;
    info!(
      drain_timeout_ms = self.config.drain_timeout_ms,
      "shutting down, draining units"
    );

    let drained = tokio::time::timeout(self.config.drain_timeout(), async {
      while let Some(joined) = units.join_next_with_id().await {
        let id = match joined {
          Ok((id, ())) => id,
          Err(e) => e.id(),
        };
        names.remove(&id);
      }
    })
    .await;

    if drained.is_err() {
      units.abort_all();
      let mut stuck: Vec<String> = names.into_values().collect();
      stuck.sort();
      error!(units = ?stuck, "units did not drain in time, aborted");
      return Err(SupervisorError::DrainTimeout { units: stuck });
    }

    info!("supervisor stopped");
    Ok(())
  }
}

/// The restart loop for one unit.
async fn supervise(
  unit: Unit,
  cancel: CancellationToken,
  config: SupervisorConfig,
  handle: SupervisorHandle,
) {
  let name = unit.name.as_str();
  let mut delay = config.restart_delay();

  loop {
    let started = Instant::now();
    info!(unit = %name, "unit starting");

    // the factory runs inside the caught future so a panic while building
    // the unit is handled like one while running it
    let factory = unit.factory.clone();
    let token = cancel.child_token();
    let result = AssertUnwindSafe(async move { factory(token).await })
      .catch_unwind()
      .await;

    if cancel.is_cancelled() {
      match result {
        Ok(Ok(())) => info!(unit = %name, "unit stopped"),
        Ok(Err(e)) => warn!(unit = %name, error = %format!("{e:#}"), "unit stopped with error"),
        Err(panic) => error!(unit = %name, panic = %panic_message(&*panic), "unit panicked while stopping"),
      }
      return;
    }

    match result {
      Ok(Ok(())) => warn!(unit = %name, "unit exited unexpectedly"),
      Ok(Err(e)) => error!(unit = %name, error = %format!("{e:#}"), "unit failed"),
      Err(panic) => error!(unit = %name, panic = %panic_message(&*panic), "unit panicked"),
    }

    // a unit that stayed up for a while starts over with a short delay
    if started.elapsed() >= config.max_restart_delay() {
      delay = config.restart_delay();
    }

    let restarts = handle.record_restart(name);
    info!(
      unit = %name,
      restarts,
      delay_ms = delay.as_millis() as u64,
      "restarting unit"
    );

    tokio::select! {
      _ = cancel.cancelled() => return,
      _ = tokio::time::sleep(delay) => {}
    }
    delay = next_delay(delay, config.max_restart_delay());
  }
}

fn next_delay(delay: Duration, max: Duration) -> Duration {
  delay.saturating_mul(2).min(max)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_next_delay_doubles_and_caps() {
    let max = Duration::from_secs(5);
    assert_eq!(
      next_delay(Duration::from_millis(100), max),
      Duration::from_millis(200)
    );
    assert_eq!(next_delay(Duration::from_secs(4), max), max);
  }

  #[test]
  fn test_handle_counts_per_unit() {
    let handle = SupervisorHandle::default();
    handle.record_restart("pool");
    handle.record_restart("pool");
    handle.record_restart("runner");
    assert_eq!(handle.restarts("pool"), 2);
    assert_eq!(handle.restarts("runner"), 1);
    assert_eq!(handle.restarts("http"), 0);
  }
}
