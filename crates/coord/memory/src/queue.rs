use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use dashmap::DashMap;

use corral_coord::error::{CoordError, require_non_empty};
use corral_coord::queue::DedupQueue;

/// Per-queue state: the FIFO list and its occurrence-count index.
///
/// A value is present in `index` iff it occurs at least once in `items`;
/// counts never reach zero without the entry being removed.
#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<String>,
    index: HashMap<String, u64>,
}

impl QueueState {
    fn push(&mut self, value: &str) {
        self.items.push_back(value.to_owned());
        *self.index.entry(value.to_owned()).or_insert(0) += 1;
    }

    fn decrement(&mut self, value: &str, by: u64) {
        if let Some(count) = self.index.get_mut(value) {
            *count = count.saturating_sub(by);
            if *count == 0 {
                self.index.remove(value);
            }
        }
    }

    /// Remove occurrences of `value` with LREM semantics: positive `count`
    /// removes head-first, negative tail-first, zero removes all.
    fn remove_occurrences(&mut self, value: &str, count: i64) -> u64 {
        let limit = if count == 0 { u64::MAX } else { count.unsigned_abs() };
        let mut removed = 0u64;

        if count < 0 {
            let mut i = self.items.len();
            while i > 0 && removed < limit {
                i -= 1;
                if self.items[i] == value {
                    self.items.remove(i);
                    removed += 1;
                }
            }
        } else {
            let mut i = 0;
            while i < self.items.len() && removed < limit {
                if self.items[i] == value {
                    self.items.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        }

        self.decrement(value, removed);
        removed
    }
}

/// In-memory [`DedupQueue`] backed by a [`DashMap`].
///
/// Every mutating operation runs while holding the queue's map entry, so the
/// list and its index are updated as one atomic step per queue, matching the
/// Redis backend's single-script execution.
#[derive(Debug, Default)]
pub struct MemoryDedupQueue {
    queues: DashMap<String, QueueState>,
}

impl MemoryDedupQueue {
    /// Create a new, empty in-memory queue backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupQueue for MemoryDedupQueue {
    async fn enqueue(
        &self,
        queue: &str,
        value: &str,
        check_duplicate: bool,
    ) -> Result<bool, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        let mut state = self.queues.entry(queue.to_owned()).or_default();
        if check_duplicate && state.index.contains_key(value) {
            return Ok(false);
        }
        state.push(value);
        Ok(true)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<String>, CoordError> {
        require_non_empty("queue", queue)?;

        let Some(mut state) = self.queues.get_mut(queue) else {
            return Ok(None);
        };
        let Some(value) = state.items.pop_front() else {
            return Ok(None);
        };
        state.decrement(&value, 1);
        Ok(Some(value))
    }

    async fn remove_value(
        &self,
        queue: &str,
        value: &str,
        count: i64,
    ) -> Result<u64, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        let Some(mut state) = self.queues.get_mut(queue) else {
            return Ok(0);
        };
        Ok(state.remove_occurrences(value, count))
    }

    async fn exists(&self, queue: &str, value: &str) -> Result<bool, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        Ok(self
            .queues
            .get(queue)
            .is_some_and(|state| state.index.contains_key(value)))
    }

    async fn len(&self, queue: &str) -> Result<u64, CoordError> {
        require_non_empty("queue", queue)?;

        Ok(self
            .queues
            .get(queue)
            .map_or(0, |state| state.items.len() as u64))
    }
}
