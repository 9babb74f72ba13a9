//! Sluice Datastore
//!
//! Storage for route definitions. The dispatch core only ever reads from it
//! (to resolve an inbound request to a route); writes belong to the route
//! management API and to startup seeding.
//!
//! The [`Datastore`] trait defines operations for:
//! - Looking up a route by `(app_name, path)`
//! - Listing routes matching a [`RouteFilter`]
//! - Creating/replacing and deleting routes

mod memory;
mod sqlite;

pub use memory::MemoryDatastore;
pub use sqlite::SqliteDatastore;

use std::sync::Arc;

use async_trait::async_trait;
use sluice_route::{RouteDef, RouteFilter};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested route was not found.
  #[error("route not found: {app_name}{path}")]
  NotFound { app_name: String, path: String },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running schema migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// A stored definition could not be (de)serialized.
  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// The datastore URL names a backend we don't have.
  #[error("unsupported datastore url: {0}")]
  UnsupportedUrl(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn not_found(app_name: &str, path: &str) -> Self {
    Self::NotFound {
      app_name: app_name.to_string(),
      path: path.to_string(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Self::NotFound { .. })
  }
}

/// Storage trait for route definitions.
#[async_trait]
pub trait Datastore: Send + Sync {
  /// Get the route for `(app_name, path)`.
  async fn get_route(&self, app_name: &str, path: &str) -> Result<RouteDef, Error>;

  /// List routes matching the filter, ordered by app name then path.
  async fn list_routes(&self, filter: &RouteFilter) -> Result<Vec<RouteDef>, Error>;

  /// Create or replace a route.
  async fn put_route(&self, route: RouteDef) -> Result<(), Error>;

  /// Delete a route.
  async fn delete_route(&self, app_name: &str, path: &str) -> Result<(), Error>;
}

/// Open a datastore from a URL: `memory://` or `sqlite://<path>`.
pub async fn open(url: &str) -> Result<Arc<dyn Datastore>, Error> {
  if url.starts_with("memory://") {
    return Ok(Arc::new(MemoryDatastore::new()));
  }

  if url.starts_with("sqlite:") {
    let store = SqliteDatastore::connect(url).await?;
    store.migrate().await?;
    return Ok(Arc::new(store));
  }

  Err(Error::UnsupportedUrl(url.to_string()))
}
