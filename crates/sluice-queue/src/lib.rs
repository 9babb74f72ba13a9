//! Sluice Queue
//!
//! The durable queue behind async invocations. Delivery is at-least-once: a
//! reserved message is hidden from other consumers until it is deleted,
//! released, or its reservation expires, at which point it becomes
//! reservable again.
//!
//! The [`Queue`] trait defines operations for:
//! - Pushing a message body
//! - Reserving the next visible message (long-poll with a bounded wait)
//! - Deleting a message once its outcome is final
//! - Releasing a message back to the queue after a delay

mod memory;
mod sqlite;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sluice_config::QueueConfig;
use tokio::time::Instant;

/// Identifier assigned to a message when it is pushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<String> for MessageId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

impl fmt::Display for MessageId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A reserved message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  pub id: MessageId,
  pub body: Vec<u8>,
  /// How many times this message has been reserved, including this time.
  pub delivery_count: u32,
}

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  /// The message is not in the queue (already deleted, or never pushed).
  #[error("message not found: {0}")]
  NotFound(MessageId),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running schema migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),

  /// The queue URL names a backend we don't have.
  #[error("unsupported queue url: {0}")]
  UnsupportedUrl(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Durable message queue.
#[async_trait]
pub trait Queue: Send + Sync {
  /// Append a message. It is immediately visible.
  async fn push(&self, body: Vec<u8>) -> Result<MessageId, QueueError>;

  /// Reserve the next visible message, waiting up to `timeout` for one to
  /// appear. Returns `None` if nothing became available in time.
  async fn reserve(&self, timeout: Duration) -> Result<Option<Message>, QueueError>;

  /// Remove a message for good.
  async fn delete(&self, id: &MessageId) -> Result<(), QueueError>;

  /// Give up a reservation; the message becomes visible again after `delay`.
  async fn release(&self, id: &MessageId, delay: Duration) -> Result<(), QueueError>;
}

/// `start + after`, or a point decades away when that doesn't fit.
pub(crate) fn deadline_after(start: Instant, after: Duration) -> Instant {
  const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);
  start
    .checked_add(after)
    .or_else(|| start.checked_add(FAR_FUTURE))
    .unwrap_or(start)
}

/// Open a queue from a URL: `memory://` or `sqlite://<path>`.
pub async fn open(url: &str, config: &QueueConfig) -> Result<Arc<dyn Queue>, QueueError> {
  if url.starts_with("memory://") {
    return Ok(Arc::new(MemoryQueue::new(config.reservation_timeout())));
  }

  if url.starts_with("sqlite:") {
    let queue = SqliteQueue::connect(url, config).await?;
    queue.migrate().await?;
    return Ok(Arc::new(queue));
  }

  Err(QueueError::UnsupportedUrl(url.to_string()))
}
