//! Loading route definitions from a file at startup.

use std::path::Path;

use anyhow::{Context, Result};
use sluice_datastore::Datastore;
use sluice_route::{RouteDef, validate};
use tracing::{info, warn};

/// Read a JSON array of route definitions.
pub fn read_routes(path: &Path) -> Result<Vec<RouteDef>> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read routes file: {}", path.display()))?;
  serde_json::from_str(&content)
    .with_context(|| format!("failed to parse routes file: {}", path.display()))
}

/// Validate each definition and store the valid ones in normalized form.
///
/// Invalid definitions are logged and skipped. Returns how many were stored.
pub async fn seed_routes(datastore: &dyn Datastore, defs: Vec<RouteDef>) -> Result<usize> {
  let mut stored = 0;
  for def in defs {
    let label = format!("{}{}", def.app_name, def.path);
    let route = match validate(def) {
      Ok(route) => route,
      Err(e) => {
        warn!(route = %label, error = %e, "skipping invalid route");
        continue;
      }
    };

    datastore
      .put_route(RouteDef::from(route))
      .await
      .with_context(|| format!("failed to store route {label}"))?;
    stored += 1;
  }

  info!(routes = stored, "routes seeded");
  Ok(stored)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  use sluice_datastore::MemoryDatastore;
  use sluice_route::RouteFilter;

  #[tokio::test]
  async fn test_seed_skips_invalid() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
      file,
      r#"[
        {{"app_name": "myapp", "path": "/hello", "image": "iron/hello"}},
        {{"app_name": "myapp", "path": "/users/:id", "image": "iron/hello"}},
        {{"app_name": "myapp", "path": "/later", "image": "iron/hello", "type": "async", "format": "json"}}
      ]"#
    )
    .unwrap();

    let store = MemoryDatastore::new();
    let defs = read_routes(file.path()).unwrap();
    assert_eq!(seed_routes(&store, defs).await.unwrap(), 2);

    let routes = store.list_routes(&RouteFilter::default()).await.unwrap();
    assert_eq!(routes.len(), 2);

    // stored normalized
    let hello = store.get_route("myapp", "/hello").await.unwrap();
    assert_eq!(hello.route_type, "sync");
    assert_eq!(hello.format, "default");
    assert_eq!(hello.memory, 128);

    let later = store.get_route("myapp", "/later").await.unwrap();
    assert_eq!(later.max_concurrency, 1);
  }

  #[test]
  fn test_unparseable_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{not a list").unwrap();
    let err = read_routes(file.path()).unwrap_err();
    assert!(err.to_string().contains("failed to parse routes file"));
  }
}
