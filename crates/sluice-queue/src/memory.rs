use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{Message, MessageId, Queue, QueueError, deadline_after};

/// In-process queue. Messages are lost when the process exits.
///
/// Consumers long-poll on a [`Notify`] that is signalled whenever a message
/// is pushed or released, so `reserve` returns as soon as work appears.
#[derive(Debug)]
pub struct MemoryQueue {
  reservation_timeout: Duration,
  inner: Mutex<Inner>,
  notify: Notify,
}

#[derive(Debug, Default)]
struct Inner {
  next_seq: u64,
  /// Keyed by push order.
  entries: BTreeMap<u64, Entry>,
}

#[derive(Debug)]
struct Entry {
  id: MessageId,
  body: Vec<u8>,
  visible_at: Instant,
  delivery_count: u32,
}

impl Inner {
  fn seq_of(&self, id: &MessageId) -> Option<u64> {
    self
      .entries
      .iter()
      .find(|(_, entry)| &entry.id == id)
      .map(|(seq, _)| *seq)
  }

  /// Earliest time any message becomes visible.
  fn next_visible(&self) -> Option<Instant> {
    self.entries.values().map(|e| e.visible_at).min()
  }
}

impl MemoryQueue {
  /// `reservation_timeout` is how long a reserved message stays hidden
  /// before it is handed out again.
  pub fn new(reservation_timeout: Duration) -> Self {
    Self {
      reservation_timeout,
      inner: Mutex::new(Inner::default()),
      notify: Notify::new(),
    }
  }

  /// Messages currently held, reserved or not.
  pub fn len(&self) -> usize {
    self.inner.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn try_reserve(&self, now: Instant) -> Option<Message> {
    let mut inner = self.inner.lock();
    let entry = inner
      .entries
      .values_mut()
      .filter(|e| e.visible_at <= now)
      .min_by_key(|e| e.visible_at)?;

    entry.visible_at = deadline_after(now, self.reservation_timeout);
    entry.delivery_count += 1;

    Some(Message {
      id: entry.id.clone(),
      body: entry.body.clone(),
      delivery_count: entry.delivery_count,
    })
  }
}

#[async_trait]
impl Queue for MemoryQueue {
  async fn push(&self, body: Vec<u8>) -> Result<MessageId, QueueError> {
    let id = MessageId::generate();
    {
      let mut inner = self.inner.lock();
      let seq = inner.next_seq;
      inner.next_seq += 1;
      inner.entries.insert(
        seq,
        Entry {
          id: id.clone(),
          body,
          visible_at: Instant::now(),
          delivery_count: 0,
        },
      );
    }
    self.notify.notify_waiters();
    Ok(id)
  }

  async fn reserve(&self, timeout: Duration) -> Result<Option<Message>, QueueError> {
    let deadline = deadline_after(Instant::now(), timeout);

    loop {
      // register interest before looking so a push in between isn't missed
      let notified = self.notify.notified();
      tokio::pin!(notified);
      notified.as_mut().enable();

      let now = Instant::now();
      if let Some(message) = self.try_reserve(now) {
        return Ok(Some(message));
      }
      if now >= deadline {
        return Ok(None);
      }

      let wake_at = match self.inner.lock().next_visible() {
        Some(at) if at < deadline => at,
        _ => deadline,
      };

      tokio::select! {
        _ = &mut notified => {}
        _ = tokio::time::sleep_until(wake_at) => {}
      }
    }
  }

  async fn delete(&self, id: &MessageId) -> Result<(), QueueError> {
    let mut inner = self.inner.lock();
    let seq = inner
      .seq_of(id)
      .ok_or_else(|| QueueError::NotFound(id.clone()))?;
    inner.entries.remove(&seq);
    Ok(())
  }

  async fn release(&self, id: &MessageId, delay: Duration) -> Result<(), QueueError> {
    {
      let mut inner = self.inner.lock();
      let seq = inner
        .seq_of(id)
        .ok_or_else(|| QueueError::NotFound(id.clone()))?;
      if let Some(entry) = inner.entries.get_mut(&seq) {
        entry.visible_at = deadline_after(Instant::now(), delay);
      }
    }
    self.notify.notify_waiters();
    Ok(())
  }
}
