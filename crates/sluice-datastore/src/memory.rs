use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sluice_route::{RouteDef, RouteFilter, RouteKey};

use crate::{Datastore, Error};

/// In-memory datastore. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryDatastore {
  routes: RwLock<BTreeMap<RouteKey, RouteDef>>,
}

impl MemoryDatastore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Build a datastore pre-populated with `routes`.
  pub fn with_routes(routes: impl IntoIterator<Item = RouteDef>) -> Self {
    let store = Self::new();
    {
      let mut map = store.routes.write();
      for route in routes {
        map.insert(RouteKey::new(&route.app_name, &route.path), route);
      }
    }
    store
  }
}

#[async_trait]
impl Datastore for MemoryDatastore {
  async fn get_route(&self, app_name: &str, path: &str) -> Result<RouteDef, Error> {
    self
      .routes
      .read()
      .get(&RouteKey::new(app_name, path))
      .cloned()
      .ok_or_else(|| Error::not_found(app_name, path))
  }

  async fn list_routes(&self, filter: &RouteFilter) -> Result<Vec<RouteDef>, Error> {
    Ok(
      self
        .routes
        .read()
        .values()
        .filter(|def| filter.matches(def))
        .cloned()
        .collect(),
    )
  }

  async fn put_route(&self, route: RouteDef) -> Result<(), Error> {
    let key = RouteKey::new(&route.app_name, &route.path);
    self.routes.write().insert(key, route);
    Ok(())
  }

  async fn delete_route(&self, app_name: &str, path: &str) -> Result<(), Error> {
    self
      .routes
      .write()
      .remove(&RouteKey::new(app_name, path))
      .map(|_| ())
      .ok_or_else(|| Error::not_found(app_name, path))
  }
}
