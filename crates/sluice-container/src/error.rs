//! Container runtime errors.

/// Errors that can occur while running a container.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
  /// The function ran and exited with a non-zero status.
  #[error("container exited with status {code}: {stderr}")]
  NonZeroExit { code: i32, stderr: String },

  /// The container was killed for exceeding its memory limit.
  #[error("container exceeded its memory limit of {memory_mb}MB")]
  OutOfMemory { memory_mb: u64 },

  /// The runtime itself couldn't start the container (daemon down, image
  /// pull failed, ...).
  #[error("container runtime unavailable: {message}")]
  Unavailable { message: String },

  /// The run was cancelled before it finished.
  #[error("container run cancelled")]
  Cancelled,

  #[error("container io error: {0}")]
  Io(#[from] std::io::Error),
}

impl RunError {
  /// Whether running the same request again might succeed.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      Self::OutOfMemory { .. } | Self::Unavailable { .. } | Self::Cancelled
    )
  }
}
