use std::str::FromStr;

use async_trait::async_trait;
use sluice_route::{RouteDef, RouteFilter};
use sqlx::FromRow;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::debug;

use crate::{Datastore, Error};

#[derive(FromRow)]
struct RouteRow {
  definition: String,
}

impl RouteRow {
  fn into_def(self) -> Result<RouteDef, Error> {
    Ok(serde_json::from_str(&self.definition)?)
  }
}

/// SQLite-based datastore implementation.
///
/// Each route is stored as its JSON definition, keyed by `(app_name, path)`.
pub struct SqliteDatastore {
  pool: SqlitePool,
}

impl SqliteDatastore {
  /// Create a new SQLite datastore with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Connect to `sqlite://<path>` (created if missing) or `sqlite::memory:`.
  pub async fn connect(url: &str) -> Result<Self, Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    if let Some(dir) = options.get_filename().parent()
      && !dir.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(dir).await?;
    }

    // every connection to an in-memory database is a separate database
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect_with(options)
      .await?;

    debug!(url = %url, "connected to sqlite datastore");
    Ok(Self::new(pool))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), Error> {
    let mut migrator = sqlx::migrate!("./migrations");
    // the queue may share this database and carries its own migrations
    migrator.set_ignore_missing(true);
    migrator.run(&self.pool).await?;
    Ok(())
  }
}

#[async_trait]
impl Datastore for SqliteDatastore {
  async fn get_route(&self, app_name: &str, path: &str) -> Result<RouteDef, Error> {
    let row: Option<RouteRow> = sqlx::query_as(
      r#"
            SELECT definition
            FROM routes
            WHERE app_name = ? AND path = ?
            "#,
    )
    .bind(app_name)
    .bind(path)
    .fetch_optional(&self.pool)
    .await?;

    match row {
      Some(row) => row.into_def(),
      None => Err(Error::not_found(app_name, path)),
    }
  }

  async fn list_routes(&self, filter: &RouteFilter) -> Result<Vec<RouteDef>, Error> {
    let rows: Vec<RouteRow> = sqlx::query_as(
      r#"
            SELECT definition
            FROM routes
            WHERE (?1 IS NULL OR app_name = ?1)
              AND (?2 IS NULL OR path = ?2)
              AND (?3 IS NULL OR image = ?3)
            ORDER BY app_name ASC, path ASC
            "#,
    )
    .bind(filter.app_name.as_deref())
    .bind(filter.path.as_deref())
    .bind(filter.image.as_deref())
    .fetch_all(&self.pool)
    .await?;

    rows.into_iter().map(RouteRow::into_def).collect()
  }

  async fn put_route(&self, route: RouteDef) -> Result<(), Error> {
    let definition = serde_json::to_string(&route)?;

    sqlx::query(
      r#"
            INSERT INTO routes (app_name, path, image, definition)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (app_name, path)
            DO UPDATE SET image = excluded.image, definition = excluded.definition
            "#,
    )
    .bind(&route.app_name)
    .bind(&route.path)
    .bind(&route.image)
    .bind(definition)
    .execute(&self.pool)
    .await?;

    Ok(())
  }

  async fn delete_route(&self, app_name: &str, path: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            DELETE FROM routes
            WHERE app_name = ? AND path = ?
            "#,
    )
    .bind(app_name)
    .bind(path)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::not_found(app_name, path));
    }

    Ok(())
  }
}
