use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::route::{Format, Route, RouteType};

/// Memory limit (megabytes) applied when a definition leaves it unset.
pub const DEFAULT_MEMORY_MB: u64 = 128;

/// A route as written by the management API, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDef {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub app_name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub path: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub image: String,
  /// Memory limit in megabytes; 0 means unset.
  #[serde(default)]
  pub memory: u64,
  /// Headers injected into every invocation.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub headers: HashMap<String, Vec<String>>,
  /// `sync`, `async`, or empty.
  #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
  pub route_type: String,
  /// `default`, `http`, `json`, or empty.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub format: String,
  /// Per-route concurrency ceiling; 0 means unlimited.
  #[serde(default)]
  pub max_concurrency: u32,
  /// Injected into the function's environment.
  #[serde(default)]
  pub config: HashMap<String, String>,
}

/// Apply defaults to a definition.
///
/// Pure: the input is consumed and the defaulted copy returned. Applying it
/// twice yields the same result as applying it once.
pub fn normalize(mut def: RouteDef) -> RouteDef {
  if def.memory == 0 {
    def.memory = DEFAULT_MEMORY_MB;
  }

  if def.route_type.is_empty() {
    def.route_type = RouteType::Sync.as_str().to_string();
  }

  if def.format.is_empty() {
    def.format = Format::Default.as_str().to_string();
  }

  // http/json functions answer one request at a time over stdin/stdout
  if def.max_concurrency == 0
    && Format::parse(&def.format).is_some_and(|f| f.requires_correlation())
  {
    def.max_concurrency = 1;
  }

  def
}

impl RouteDef {
  /// Shorthand for [`normalize`].
  pub fn normalized(self) -> Self {
    normalize(self)
  }
}

impl From<Route> for RouteDef {
  fn from(route: Route) -> Self {
    Self {
      app_name: route.app_name,
      path: route.path,
      image: route.image,
      memory: route.memory,
      headers: route.headers,
      route_type: route.route_type.as_str().to_string(),
      format: route.format.as_str().to_string(),
      max_concurrency: route.max_concurrency,
      config: route.config,
    }
  }
}
