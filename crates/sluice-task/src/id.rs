use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a task, stable across queue redeliveries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  /// Generate a fresh random id.
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for TaskId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for TaskId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
