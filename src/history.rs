/// Append-only log of every death the engine has seen, in arrival order.
///
/// Growth is bounded by `capacity`: once full, the oldest events are dropped
/// as new ones arrive. The running `appended` count is never trimmed and is
/// what drives the every-N-events session cleanup.
use crate::event::DeathEvent;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Inner {
    events:   VecDeque<Arc<DeathEvent>>,
    /// Total events ever appended, including trimmed ones.
    appended: u64,
}

#[derive(Debug)]
pub struct HistoryLog {
    inner:    RwLock<Inner>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner:    RwLock::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Appends `event` and returns its 1-based sequence number.
    pub fn append(&self, event: Arc<DeathEvent>) -> u64 {
        let mut inner = self.inner.write();
        inner.events.push_back(event);
        inner.appended += 1;
        while inner.events.len() > self.capacity {
            inner.events.pop_front();
        }
        inner.appended
    }

    /// Every retained death of `victim_id`, oldest first.
    pub fn deaths_of(&self, victim_id: Uuid) -> Vec<Arc<DeathEvent>> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.victim_id == Some(victim_id))
            .cloned()
            .collect()
    }

    /// The last `n` deaths, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Arc<DeathEvent>> {
        let inner = self.inner.read();
        let start = inner.events.len().saturating_sub(n);
        inner.events.iter().skip(start).cloned().collect()
    }

    /// Counts events at or after `since` with the same victim name and killer
    /// name as `record`, stopping once `cap` matches are found.
    pub fn count_matching(&self, record: &DeathEvent, since: u64, cap: usize) -> usize {
        self.inner
            .read()
            .events
            .iter()
            .rev()
            .filter(|e| e.timestamp >= since)
            .filter(|e| e.victim_name == record.victim_name)
            .filter(|e| e.killer_name == record.killer_name)
            .take(cap)
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    pub fn total_appended(&self) -> u64 {
        self.inner.read().appended
    }
}
