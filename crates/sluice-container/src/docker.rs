//! Docker CLI runtime.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::ContainerRuntime;
use crate::error::RunError;
use crate::request::{RunOutput, RunRequest};

/// Exit status docker reports when the container was OOM-killed (128 + SIGKILL).
const EXIT_OOM_KILLED: i32 = 137;
/// Exit status docker reports when the daemon itself failed to run the container.
const EXIT_DOCKER_ERROR: i32 = 125;

/// Runs containers by shelling out to the `docker` CLI.
///
/// Each invocation is `docker run --rm -i` with the payload on stdin and the
/// function's stdout taken as its output.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
  binary: PathBuf,
}

impl Default for DockerRuntime {
  fn default() -> Self {
    Self::new()
  }
}

impl DockerRuntime {
  /// Use the `docker` binary found on `PATH`.
  pub fn new() -> Self {
    Self::with_binary("docker")
  }

  /// Use a specific docker-compatible binary (e.g. `podman`).
  pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
    Self {
      binary: binary.into(),
    }
  }

  /// Arguments for `docker run`.
  pub fn run_args(request: &RunRequest) -> Vec<String> {
    let mut args = vec![
      "run".to_string(),
      "--rm".to_string(),
      "-i".to_string(),
      "--name".to_string(),
      request.container_name(),
      "--memory".to_string(),
      format!("{}m", request.memory_mb),
    ];
    for (key, value) in &request.env {
      args.push("-e".to_string());
      args.push(format!("{}={}", key, value));
    }
    args.push(request.image.clone());
    args
  }

  async fn run_inner(
    &self,
    request: &RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunOutput, RunError> {
    if cancel.is_cancelled() {
      return Err(RunError::Cancelled);
    }

    let mut child = Command::new(&self.binary)
      .args(Self::run_args(request))
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => RunError::Unavailable {
          message: format!("{} not found", self.binary.display()),
        },
        _ => RunError::Io(e),
      })?;

    let finished = tokio::select! {
      result = communicate(&mut child, request.payload.as_bytes()) => Some(result),
      _ = cancel.cancelled() => None,
    };

    let Some(result) = finished else {
      warn!("cancelling container");
      if let Err(e) = child.kill().await {
        debug!(error = %e, "failed to kill docker client");
      }
      self.remove(&request.container_name()).await;
      return Err(RunError::Cancelled);
    };

    let (status, stdout, stderr) = result?;
    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    match status.code() {
      Some(0) => Ok(RunOutput { stdout, stderr }),
      Some(EXIT_OOM_KILLED) => Err(RunError::OutOfMemory {
        memory_mb: request.memory_mb,
      }),
      Some(EXIT_DOCKER_ERROR) => Err(RunError::Unavailable {
        message: stderr.trim().to_string(),
      }),
      Some(code) => Err(RunError::NonZeroExit { code, stderr }),
      // killed by a signal
      None => Err(RunError::NonZeroExit { code: -1, stderr }),
    }
  }

  /// Force-remove a container. Best effort: it may already be gone.
  async fn remove(&self, name: &str) {
    let result = Command::new(&self.binary)
      .args(["rm", "-f", name])
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status()
      .await;

    if let Err(e) = result {
      error!(container = %name, error = %e, "failed to remove container");
    }
  }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
  #[instrument(
    name = "container_run",
    skip(self, request, cancel),
    fields(
      task_id = %request.task_id,
      image = %request.image,
    )
  )]
  async fn run(
    &self,
    request: RunRequest,
    cancel: CancellationToken,
  ) -> Result<RunOutput, RunError> {
    info!(memory_mb = request.memory_mb, "container started");

    let result = self.run_inner(&request, cancel).await;

    match &result {
      Ok(output) => info!(output_bytes = output.stdout.len(), "container completed"),
      Err(e) => error!(error = %e, "container failed"),
    }

    result
  }
}

/// Feed stdin and collect stdout/stderr while waiting for the child to exit.
async fn communicate(
  child: &mut Child,
  payload: &[u8],
) -> Result<(ExitStatus, Vec<u8>, Vec<u8>), io::Error> {
  let stdin = child.stdin.take();
  let stdout = child.stdout.take();
  let stderr = child.stderr.take();

  let write = async move {
    if let Some(mut stdin) = stdin {
      match stdin.write_all(payload).await {
        // the function doesn't have to read its input
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
        other => other?,
      }
      // dropping stdin closes it, signalling EOF
    }
    Ok::<_, io::Error>(())
  };

  let (_, out, err, status) =
    tokio::try_join!(write, read_all(stdout), read_all(stderr), child.wait())?;
  Ok((status, out, err))
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Result<Vec<u8>, io::Error> {
  let mut buf = Vec::new();
  if let Some(mut pipe) = pipe {
    pipe.read_to_end(&mut buf).await?;
  }
  Ok(buf)
}
