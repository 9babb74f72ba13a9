use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a caller waits for the result or only gets an acceptance id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
  Sync,
  Async,
}

impl RouteType {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "sync" => Some(Self::Sync),
      "async" => Some(Self::Async),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Sync => "sync",
      Self::Async => "async",
    }
  }
}

impl fmt::Display for RouteType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How the payload is framed on the function's stdin/stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
  Default,
  Http,
  Json,
}

impl Format {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "default" => Some(Self::Default),
      "http" => Some(Self::Http),
      "json" => Some(Self::Json),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Default => "default",
      Self::Http => "http",
      Self::Json => "json",
    }
  }

  /// Formats that pair each request with exactly one response on a shared
  /// stream, so a container can only serve one invocation at a time.
  pub fn requires_correlation(&self) -> bool {
    matches!(self, Self::Http | Self::Json)
  }
}

impl fmt::Display for Format {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Identifies a route: `(app_name, path)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
  pub app_name: String,
  pub path: String,
}

impl RouteKey {
  pub fn new(app_name: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      app_name: app_name.into(),
      path: path.into(),
    }
  }
}

impl fmt::Display for RouteKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.app_name, self.path)
  }
}

/// A validated route. Construct one with [`crate::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
  pub app_name: String,
  pub path: String,
  pub image: String,
  /// Memory limit in megabytes.
  pub memory: u64,
  #[serde(default)]
  pub headers: HashMap<String, Vec<String>>,
  #[serde(rename = "type")]
  pub route_type: RouteType,
  pub format: Format,
  /// Per-route concurrency ceiling; 0 means unlimited.
  pub max_concurrency: u32,
  #[serde(default)]
  pub config: HashMap<String, String>,
}

impl Route {
  pub fn key(&self) -> RouteKey {
    RouteKey::new(&self.app_name, &self.path)
  }

  pub fn is_async(&self) -> bool {
    self.route_type == RouteType::Async
  }

  /// The per-route ceiling, if one applies.
  pub fn concurrency_limit(&self) -> Option<u32> {
    (self.max_concurrency > 0).then_some(self.max_concurrency)
  }
}
