use async_trait::async_trait;

use crate::error::CoordError;

/// A FIFO queue with a counting membership index.
///
/// Each logical queue is a list (insertion order = dequeue order) paired with
/// a value → occurrence-count index. The index makes [`exists`] an O(1)
/// lookup and keeps duplicate values correctly tracked. Implementations must
/// keep the invariant that after every operation the index count for a value
/// equals its actual number of occurrences in the list, even under concurrent
/// access; every mutating operation is therefore a single atomic execution
/// against the store, never a sequence of independent commands.
///
/// Duplicate policy: `enqueue` with `check_duplicate = true` *rejects* a
/// value that is already queued (returns `false`, no mutation). With
/// `check_duplicate = false` the value is appended unconditionally and its
/// count incremented, so duplicates are allowed but still tracked.
///
/// Queues are created implicitly on first enqueue and never explicitly
/// destroyed by this layer.
///
/// [`exists`]: DedupQueue::exists
#[async_trait]
pub trait DedupQueue: Send + Sync {
    /// Append `value` to the tail of `queue`.
    ///
    /// Returns `false` only when `check_duplicate` is set and the value is
    /// already a member; in that case nothing is mutated.
    async fn enqueue(
        &self,
        queue: &str,
        value: &str,
        check_duplicate: bool,
    ) -> Result<bool, CoordError>;

    /// Pop the head of `queue`, decrementing its index count. `Ok(None)` if
    /// the queue is empty.
    async fn dequeue(&self, queue: &str) -> Result<Option<String>, CoordError>;

    /// Remove occurrences of `value` from `queue`: `count > 0` removes up to
    /// `count` from the head, `count < 0` up to `-count` from the tail, and
    /// `count == 0` removes all. Returns the number actually removed, by
    /// which the index is decremented.
    async fn remove_value(
        &self,
        queue: &str,
        value: &str,
        count: i64,
    ) -> Result<u64, CoordError>;

    /// O(1) membership check against the index. Never scans the list.
    async fn exists(&self, queue: &str, value: &str) -> Result<bool, CoordError>;

    /// Current length of the queue's list.
    async fn len(&self, queue: &str) -> Result<u64, CoordError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify object safety.
    fn _assert_dyn_dedup_queue(_: &dyn DedupQueue) {}
}
