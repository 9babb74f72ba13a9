//! Route invariant checking.

use url::Url;

use crate::def::{RouteDef, normalize};
use crate::route::{Format, Route, RouteType};

/// A single broken route invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
  #[error("missing route app name")]
  MissingAppName,

  #[error("missing route path")]
  MissingPath,

  #[error("path malformed")]
  PathMalformed,

  #[error("dynamic URL is not allowed")]
  DynamicUrl,

  #[error("invalid path format: path must be absolute")]
  InvalidPath,

  #[error("invalid route type")]
  InvalidType,

  #[error("invalid route format")]
  InvalidFormat,
}

/// Every invariant a route definition broke, collected in one error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("route validation failed: {}", joined(.violations))]
pub struct ValidationError {
  pub violations: Vec<Violation>,
}

impl ValidationError {
  pub fn contains(&self, violation: Violation) -> bool {
    self.violations.contains(&violation)
  }
}

fn joined(violations: &[Violation]) -> String {
  violations
    .iter()
    .map(Violation::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

/// Check a (normalized) definition against the route invariants.
///
/// Does not stop at the first problem: every violation is reported. Callers
/// should normalize first; an un-normalized definition with an empty type or
/// format is reported as invalid.
pub fn check_invariants(def: &RouteDef) -> Vec<Violation> {
  let mut violations = Vec::new();

  if def.app_name.is_empty() {
    violations.push(Violation::MissingAppName);
  }

  if def.path.is_empty() {
    violations.push(Violation::MissingPath);
  }

  match path_component(&def.path) {
    Some(path) => {
      if path.contains(':') {
        violations.push(Violation::DynamicUrl);
      }
      if !path.starts_with('/') {
        violations.push(Violation::InvalidPath);
      }
    }
    None => violations.push(Violation::PathMalformed),
  }

  if RouteType::parse(&def.route_type).is_none() {
    violations.push(Violation::InvalidType);
  }

  if Format::parse(&def.format).is_none() {
    violations.push(Violation::InvalidFormat);
  }

  violations
}

/// Normalize a definition and, if it satisfies every invariant, type it.
pub fn validate(def: RouteDef) -> Result<Route, ValidationError> {
  let def = normalize(def);

  let violations = check_invariants(&def);
  if !violations.is_empty() {
    return Err(ValidationError { violations });
  }

  // both parsed successfully in check_invariants
  let (Some(route_type), Some(format)) = (
    RouteType::parse(&def.route_type),
    Format::parse(&def.format),
  ) else {
    return Err(ValidationError {
      violations: vec![Violation::InvalidType],
    });
  };

  Ok(Route {
    app_name: def.app_name,
    path: def.path,
    image: def.image,
    memory: def.memory,
    headers: def.headers,
    route_type,
    format,
    max_concurrency: def.max_concurrency,
    config: def.config,
  })
}

/// Extract the URL path from a route path, or `None` if it doesn't parse.
///
/// Route paths are normally relative references ("/hello"); a full URL is
/// accepted and contributes only its path. Query and fragment are ignored.
fn path_component(raw: &str) -> Option<String> {
  if raw
    .chars()
    .any(|c| c.is_control() || c.is_whitespace())
  {
    return None;
  }

  if !has_valid_escapes(raw) {
    return None;
  }

  if let Ok(url) = Url::parse(raw) {
    if url.cannot_be_a_base() {
      return Some(String::new());
    }
    return Some(url.path().to_string());
  }

  let base = Url::parse("http://localhost/").ok()?;
  base.join(raw).ok()?;

  let end = raw.find(['?', '#']).unwrap_or(raw.len());
  Some(raw[..end].to_string())
}

fn has_valid_escapes(raw: &str) -> bool {
  let bytes = raw.as_bytes();
  let mut i = 0;
  while i < bytes.len() {
    if bytes[i] == b'%' {
      let hex = bytes.get(i + 1..i + 3);
      if !hex.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
        return false;
      }
      i += 3;
    } else {
      i += 1;
    }
  }
  true
}
