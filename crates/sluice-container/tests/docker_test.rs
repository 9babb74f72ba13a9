//! DockerRuntime against a shell script standing in for the docker CLI.
#![cfg(unix)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use sluice_container::{ContainerRuntime, DockerRuntime, RunError, RunRequest};
use tokio_util::sync::CancellationToken;

fn runtime() -> DockerRuntime {
  DockerRuntime::with_binary(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fake-docker"))
}

fn request(image: &str, payload: &str) -> RunRequest {
  RunRequest {
    task_id: "task-1".to_string(),
    image: image.to_string(),
    memory_mb: 64,
    env: BTreeMap::from([("APP_NAME".to_string(), "myapp".to_string())]),
    payload: payload.to_string(),
  }
}

#[tokio::test]
async fn test_payload_round_trips_through_stdin() {
  let output = runtime()
    .run(request("echo", "{\"name\":\"sluice\"}"), CancellationToken::new())
    .await
    .expect("run should succeed");
  assert_eq!(output.stdout, "{\"name\":\"sluice\"}");
}

#[tokio::test]
async fn test_command_line_carries_limits_and_env() {
  let output = runtime()
    .run(request("args", ""), CancellationToken::new())
    .await
    .expect("run should succeed");
  assert!(output.stdout.contains("--memory 64m"), "{}", output.stdout);
  assert!(output.stdout.contains("-e APP_NAME=myapp"), "{}", output.stdout);
  assert!(output.stdout.contains("--name sluice-task-1"), "{}", output.stdout);
}

#[tokio::test]
async fn test_non_zero_exit() {
  let err = runtime()
    .run(request("fail", ""), CancellationToken::new())
    .await
    .unwrap_err();
  match err {
    RunError::NonZeroExit { code, stderr } => {
      assert_eq!(code, 3);
      assert_eq!(stderr.trim(), "boom");
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_oom_and_daemon_errors_are_transient() {
  let oom = runtime()
    .run(request("oom", ""), CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(oom, RunError::OutOfMemory { memory_mb: 64 }));
  assert!(oom.is_transient());

  let daemon = runtime()
    .run(request("daemon", ""), CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(daemon, RunError::Unavailable { .. }));
}

#[tokio::test]
async fn test_cancel_stops_the_container() {
  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let started = std::time::Instant::now();
  let err = runtime().run(request("hang", ""), cancel).await.unwrap_err();
  assert!(matches!(err, RunError::Cancelled));
  assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_missing_binary_is_unavailable() {
  let err = DockerRuntime::with_binary("/nonexistent/docker")
    .run(request("echo", ""), CancellationToken::new())
    .await
    .unwrap_err();
  assert!(matches!(err, RunError::Unavailable { .. }));
}
