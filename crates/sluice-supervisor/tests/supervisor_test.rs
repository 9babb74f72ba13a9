//! Restart and shutdown behaviour of supervised units.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use sluice_config::SupervisorConfig;
use sluice_supervisor::{Supervisor, SupervisorError};
use tokio_util::sync::CancellationToken;

fn config() -> SupervisorConfig {
  SupervisorConfig {
    restart_delay_ms: 10,
    max_restart_delay_ms: 50,
    drain_timeout_ms: 1_000,
  }
}

async fn wait_for(what: &str, done: impl Fn() -> bool) {
  let waited = tokio::time::timeout(Duration::from_secs(5), async {
    while !done() {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await;
  assert!(waited.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn test_failing_unit_is_restarted() {
  let runs = Arc::new(AtomicUsize::new(0));
  let mut supervisor = Supervisor::new(config());
  {
    let runs = runs.clone();
    supervisor.add("flaky", move |cancel| {
      let run = runs.fetch_add(1, Ordering::SeqCst);
      async move {
        if run < 2 {
          anyhow::bail!("failure number {}", run + 1);
        }
        cancel.cancelled().await;
        Ok(())
      }
    });
  }
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  wait_for("third run", || runs.load(Ordering::SeqCst) == 3).await;
  assert_eq!(handle.restarts("flaky"), 2);

  shutdown.cancel();
  serving.await.unwrap().unwrap();
  assert_eq!(runs.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_panicking_unit_is_restarted() {
  let runs = Arc::new(AtomicUsize::new(0));
  let mut supervisor = Supervisor::new(config());
  {
    let runs = runs.clone();
    supervisor.add("crashy", move |cancel| {
      let run = runs.fetch_add(1, Ordering::SeqCst);
      async move {
        if run == 0 {
          panic!("unit blew up");
        }
        cancel.cancelled().await;
        Ok(())
      }
    });
  }
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  wait_for("restart after panic", || handle.restarts("crashy") == 1).await;
  wait_for("second run", || runs.load(Ordering::SeqCst) == 2).await;

  shutdown.cancel();
  serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unexpected_clean_exit_is_restarted() {
  let runs = Arc::new(AtomicUsize::new(0));
  let mut supervisor = Supervisor::new(config());
  {
    let runs = runs.clone();
    supervisor.add("quitter", move |_cancel| {
      runs.fetch_add(1, Ordering::SeqCst);
      async { Ok(()) }
    });
  }

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  wait_for("several runs", || runs.load(Ordering::SeqCst) >= 3).await;
  shutdown.cancel();
  serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_factory_panic_is_restarted() {
  let builds = Arc::new(AtomicUsize::new(0));
  let mut supervisor = Supervisor::new(config());
  {
    let builds = builds.clone();
    supervisor.add("fragile", move |cancel| {
      if builds.fetch_add(1, Ordering::SeqCst) == 0 {
        panic!("could not build unit");
      }
      async move {
        cancel.cancelled().await;
        Ok(())
      }
    });
  }
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));

  wait_for("rebuild after panic", || builds.load(Ordering::SeqCst) == 2).await;
  assert_eq!(handle.restarts("fragile"), 1);

  shutdown.cancel();
  serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_units_drain_on_shutdown() {
  let drained = Arc::new(AtomicBool::new(false));
  let mut supervisor = Supervisor::new(config());
  {
    let drained = drained.clone();
    supervisor.add("worker", move |cancel| {
      let drained = drained.clone();
      async move {
        cancel.cancelled().await;
        // finish in-flight work
        tokio::time::sleep(Duration::from_millis(50)).await;
        drained.store(true, Ordering::SeqCst);
        Ok(())
      }
    });
  }
  let handle = supervisor.handle();

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));
  tokio::time::sleep(Duration::from_millis(20)).await;

  shutdown.cancel();
  serving.await.unwrap().unwrap();
  assert!(drained.load(Ordering::SeqCst));
  assert_eq!(handle.restarts("worker"), 0);
}

#[tokio::test]
async fn test_stuck_unit_is_aborted_after_drain_timeout() {
  let mut supervisor = Supervisor::new(SupervisorConfig {
    drain_timeout_ms: 100,
    ..config()
  });
  supervisor
    .add("stubborn", |_cancel| async {
      std::future::pending::<()>().await;
      Ok(())
    })
    .add("polite", |cancel| async move {
      cancel.cancelled().await;
      Ok(())
    });

  let shutdown = CancellationToken::new();
  let serving = tokio::spawn(supervisor.serve(shutdown.clone()));
  tokio::time::sleep(Duration::from_millis(20)).await;

  shutdown.cancel();
  let err = tokio::time::timeout(Duration::from_secs(5), serving)
    .await
    .expect("serve should return after the drain timeout")
    .unwrap()
    .unwrap_err();

  let SupervisorError::DrainTimeout { units } = err;
  assert_eq!(units, vec!["stubborn".to_string()]);
}
