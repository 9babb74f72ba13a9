//! Bounded record of final task outcomes.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::id::TaskId;
use crate::outcome::TaskOutcome;

/// Remembers which tasks already reached a final outcome.
///
/// Used to make outcome recording idempotent across redeliveries of the same
/// queue message. Retention is bounded both by entry count and by age; the
/// oldest entries are forgotten first.
#[derive(Debug)]
pub struct OutcomeLedger {
  capacity: usize,
  ttl: Duration,
  inner: Mutex<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
  entries: HashMap<TaskId, TaskOutcome>,
  order: VecDeque<(TaskId, Instant)>,
}

impl OutcomeLedger {
  pub fn new(capacity: usize, ttl: Duration) -> Self {
    Self {
      capacity: capacity.max(1),
      ttl,
      inner: Mutex::new(LedgerInner::default()),
    }
  }

  /// Record a final outcome for `id`.
  ///
  /// First writer wins: if an outcome is already recorded it is returned and
  /// `outcome` is discarded. Returns `None` when this call recorded it.
  pub fn record(&self, id: &TaskId, outcome: TaskOutcome) -> Option<TaskOutcome> {
    let now = Instant::now();
    let mut inner = self.inner.lock();
    self.prune(&mut inner, now);

    if let Some(existing) = inner.entries.get(id) {
      return Some(existing.clone());
    }

    inner.entries.insert(id.clone(), outcome);
    inner.order.push_back((id.clone(), now));
    self.prune(&mut inner, now);
    None
  }

  pub fn get(&self, id: &TaskId) -> Option<TaskOutcome> {
    let mut inner = self.inner.lock();
    self.prune(&mut inner, Instant::now());
    inner.entries.get(id).cloned()
  }

  pub fn contains(&self, id: &TaskId) -> bool {
    self.get(id).is_some()
  }

  pub fn len(&self) -> usize {
    let mut inner = self.inner.lock();
    self.prune(&mut inner, Instant::now());
    inner.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn prune(&self, inner: &mut LedgerInner, now: Instant) {
    while let Some((id, at)) = inner.order.front() {
      let expired = now.duration_since(*at) >= self.ttl;
      if !expired && inner.entries.len() <= self.capacity {
        break;
      }
      inner.entries.remove(id);
      inner.order.pop_front();
    }
  }
}
