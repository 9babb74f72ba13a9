//! Container execution for sluice invocations.
//!
//! The worker pool talks to containers only through [`ContainerRuntime`]:
//! hand it a [`RunRequest`] (image, memory limit, environment, payload) and a
//! cancellation token, get back the container's output or a [`RunError`].
//! [`DockerRuntime`] is the production implementation; tests plug in their
//! own.

mod docker;
mod error;
mod request;

pub use docker::DockerRuntime;
pub use error::RunError;
pub use request::{RunOutput, RunRequest};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runs one invocation to completion inside an isolated container.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
  /// Run the request. When `cancel` fires the runtime must stop the
  /// container, release its resources and return [`RunError::Cancelled`].
  async fn run(&self, request: RunRequest, cancel: CancellationToken)
  -> Result<RunOutput, RunError>;
}
