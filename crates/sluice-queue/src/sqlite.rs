use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sluice_config::QueueConfig;
use sqlx::FromRow;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::time::Instant;
use tracing::debug;

use crate::{Message, MessageId, Queue, QueueError, deadline_after};

#[derive(FromRow)]
struct MessageRow {
  id: String,
  body: Vec<u8>,
  delivery_count: i64,
}

impl From<MessageRow> for Message {
  fn from(row: MessageRow) -> Self {
    Self {
      id: MessageId::from(row.id),
      body: row.body,
      delivery_count: u32::try_from(row.delivery_count).unwrap_or(u32::MAX),
    }
  }
}

/// SQLite-backed durable queue.
///
/// Reservation is a single `UPDATE … RETURNING` statement, so two consumers
/// can never claim the same message. SQLite has no way to push a wakeup, so
/// `reserve` polls at the configured interval.
pub struct SqliteQueue {
  pool: SqlitePool,
  reservation_timeout: Duration,
  poll_interval: Duration,
}

fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

fn millis(d: Duration) -> i64 {
  i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

impl SqliteQueue {
  pub fn new(pool: SqlitePool, config: &QueueConfig) -> Self {
    Self {
      pool,
      reservation_timeout: config.reservation_timeout(),
      poll_interval: config.poll_interval(),
    }
  }

  /// Connect to `sqlite://<path>` (created if missing) or `sqlite::memory:`.
  pub async fn connect(url: &str, config: &QueueConfig) -> Result<Self, QueueError> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

    if let Some(dir) = options.get_filename().parent()
      && !dir.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(dir).await?;
    }

    let max_connections = if url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
      .max_connections(max_connections)
      .connect_with(options)
      .await?;

    debug!(url = %url, "connected to sqlite queue");
    Ok(Self::new(pool, config))
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), QueueError> {
    let mut migrator = sqlx::migrate!("./migrations");
    // the datastore may share this database and carries its own migrations
    migrator.set_ignore_missing(true);
    migrator.run(&self.pool).await?;
    Ok(())
  }

  async fn try_reserve(&self) -> Result<Option<Message>, QueueError> {
    let now = now_millis();
    let row: Option<MessageRow> = sqlx::query_as(
      r#"
            UPDATE queue_messages
            SET visible_at = ?1, delivery_count = delivery_count + 1
            WHERE seq = (
                SELECT seq FROM queue_messages
                WHERE visible_at <= ?2
                ORDER BY visible_at ASC, seq ASC
                LIMIT 1
            )
            RETURNING id, body, delivery_count
            "#,
    )
    .bind(now.saturating_add(millis(self.reservation_timeout)))
    .bind(now)
    .fetch_optional(&self.pool)
    .await?;

    Ok(row.map(Message::from))
  }
}

#[async_trait]
impl Queue for SqliteQueue {
  async fn push(&self, body: Vec<u8>) -> Result<MessageId, QueueError> {
    let id = MessageId::generate();
    let now = now_millis();

    sqlx::query(
      r#"
            INSERT INTO queue_messages (id, body, visible_at, delivery_count, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
    )
    .bind(id.as_str())
    .bind(body)
    .bind(now)
    .bind(now)
    .execute(&self.pool)
    .await?;

    Ok(id)
  }

  async fn reserve(&self, timeout: Duration) -> Result<Option<Message>, QueueError> {
    let deadline = deadline_after(Instant::now(), timeout);

    loop {
      if let Some(message) = self.try_reserve().await? {
        return Ok(Some(message));
      }

      let now = Instant::now();
      if now >= deadline {
        return Ok(None);
      }
      tokio::time::sleep_until(deadline.min(deadline_after(now, self.poll_interval))).await;
    }
  }

  async fn delete(&self, id: &MessageId) -> Result<(), QueueError> {
    let result = sqlx::query("DELETE FROM queue_messages WHERE id = ?")
      .bind(id.as_str())
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(QueueError::NotFound(id.clone()));
    }
    Ok(())
  }

  async fn release(&self, id: &MessageId, delay: Duration) -> Result<(), QueueError> {
    let result = sqlx::query("UPDATE queue_messages SET visible_at = ? WHERE id = ?")
      .bind(now_millis().saturating_add(millis(delay)))
      .bind(id.as_str())
      .execute(&self.pool)
      .await?;

    if result.rows_affected() == 0 {
      return Err(QueueError::NotFound(id.clone()));
    }
    Ok(())
  }
}
