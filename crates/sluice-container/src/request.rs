use std::collections::BTreeMap;

/// Everything the runtime needs to start one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
  /// Task id; also used to name the container.
  pub task_id: String,
  pub image: String,
  /// Memory limit in megabytes.
  pub memory_mb: u64,
  /// Environment variables, sorted so the command line is deterministic.
  pub env: BTreeMap<String, String>,
  /// Written to the container's stdin.
  pub payload: String,
}

impl RunRequest {
  /// Name given to the container, so it can be found again to be removed.
  pub fn container_name(&self) -> String {
    format!("sluice-{}", self.task_id)
  }
}

/// What a successful container run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
  pub stdout: String,
  pub stderr: String,
}
