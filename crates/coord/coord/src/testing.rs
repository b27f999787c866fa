//! Backend conformance suites.
//!
//! Call these from a backend's test module with a fresh implementation. The
//! memory backend runs them in plain unit tests; the Redis backend runs them
//! behind its `integration` feature against a real server. Time-dependent
//! properties (lease expiry, watchdog renewal) are backend-specific and are
//! covered in each backend's own tests rather than here.

use std::time::Duration;

use crate::error::CoordError;
use crate::lock::LockManager;
use crate::queue::DedupQueue;

const LEASE: Duration = Duration::from_secs(10);

/// Run the full lock manager conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_lock_conformance_tests(lock: &dyn LockManager) -> Result<(), CoordError> {
    test_try_lock_and_unlock(lock).await?;
    test_try_lock_contention(lock).await?;
    test_refresh_while_held(lock).await?;
    test_delay_while_held(lock).await?;
    test_lock_timeout(lock).await?;
    test_empty_key_rejected(lock).await?;
    Ok(())
}

async fn test_try_lock_and_unlock(lock: &dyn LockManager) -> Result<(), CoordError> {
    let handle = lock.try_lock("conf-lock-1", LEASE, false).await?;
    let handle = handle.expect("should acquire uncontested lock");
    assert_eq!(handle.key(), "conf-lock-1");
    assert!(handle.is_held().await?, "lock should be held");

    let released = handle.unlock().await?;
    assert!(released, "unlock of a held lock should return true");

    // Released, so a second acquisition succeeds immediately.
    let again = lock.try_lock("conf-lock-1", LEASE, false).await?;
    assert!(again.is_some(), "should reacquire after unlock");
    again.unwrap().unlock().await?;
    Ok(())
}

async fn test_try_lock_contention(lock: &dyn LockManager) -> Result<(), CoordError> {
    let held = lock
        .try_lock("conf-lock-2", LEASE, false)
        .await?
        .expect("should acquire");

    let second = lock.try_lock("conf-lock-2", LEASE, false).await?;
    assert!(
        second.is_none(),
        "second acquire should fail while lock is held"
    );

    held.unlock().await?;
    Ok(())
}

async fn test_refresh_while_held(lock: &dyn LockManager) -> Result<(), CoordError> {
    let handle = lock
        .try_lock("conf-lock-3", Duration::from_secs(5), false)
        .await?
        .expect("should acquire");

    let refreshed = handle.refresh(LEASE).await?;
    assert!(refreshed, "refresh of a held lock should return true");
    assert!(handle.is_held().await?);

    handle.unlock().await?;
    Ok(())
}

async fn test_delay_while_held(lock: &dyn LockManager) -> Result<(), CoordError> {
    let handle = lock
        .try_lock("conf-lock-5", Duration::from_secs(5), false)
        .await?
        .expect("should acquire");

    let delayed = handle.delay(Duration::from_secs(5)).await?;
    assert!(delayed, "delay of a held lock should return true");
    assert!(handle.is_held().await?);

    handle.unlock().await?;
    Ok(())
}

async fn test_lock_timeout(lock: &dyn LockManager) -> Result<(), CoordError> {
    let held = lock
        .try_lock("conf-lock-4", LEASE, false)
        .await?
        .expect("should acquire");

    // Timed-out acquisition is an expected outcome, not an error.
    let result = lock
        .lock("conf-lock-4", LEASE, Duration::from_millis(250), false)
        .await?;
    assert!(result.is_none(), "lock should time out while held");

    held.unlock().await?;

    let result = lock
        .lock("conf-lock-4", LEASE, Duration::from_millis(250), false)
        .await?;
    assert!(result.is_some(), "lock should succeed once free");
    result.unwrap().unlock().await?;
    Ok(())
}

async fn test_empty_key_rejected(lock: &dyn LockManager) -> Result<(), CoordError> {
    let result = lock.try_lock("", LEASE, false).await;
    assert!(
        matches!(result, Err(CoordError::InvalidArgument(_))),
        "empty key should fail fast"
    );
    Ok(())
}

/// Run the full dedup queue conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance test fails.
pub async fn run_queue_conformance_tests(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    test_empty_queue(queue).await?;
    test_fifo_order(queue).await?;
    test_dedup_rejection(queue).await?;
    test_unchecked_duplicates_are_counted(queue).await?;
    test_mixed_scenario(queue).await?;
    test_remove_from_head(queue).await?;
    test_remove_all(queue).await?;
    test_remove_from_tail(queue).await?;
    test_empty_arguments_rejected(queue).await?;
    Ok(())
}

async fn test_empty_queue(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    assert_eq!(queue.len("conf-q-empty").await?, 0);
    assert!(queue.dequeue("conf-q-empty").await?.is_none());
    assert!(!queue.exists("conf-q-empty", "anything").await?);
    assert_eq!(queue.remove_value("conf-q-empty", "anything", 0).await?, 0);
    Ok(())
}

async fn test_fifo_order(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    for value in ["first", "second", "third"] {
        assert!(queue.enqueue("conf-q-fifo", value, true).await?);
    }
    assert_eq!(queue.len("conf-q-fifo").await?, 3);

    for expected in ["first", "second", "third"] {
        let popped = queue.dequeue("conf-q-fifo").await?;
        assert_eq!(popped.as_deref(), Some(expected), "FIFO order violated");
    }
    assert!(queue.dequeue("conf-q-fifo").await?.is_none());
    Ok(())
}

async fn test_dedup_rejection(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    assert!(queue.enqueue("conf-q-dedup", "job-1", true).await?);
    assert!(
        !queue.enqueue("conf-q-dedup", "job-1", true).await?,
        "duplicate enqueue should be rejected"
    );
    assert_eq!(queue.len("conf-q-dedup").await?, 1, "rejection must not grow the list");
    assert!(queue.exists("conf-q-dedup", "job-1").await?);

    assert_eq!(queue.dequeue("conf-q-dedup").await?.as_deref(), Some("job-1"));
    assert!(
        !queue.exists("conf-q-dedup", "job-1").await?,
        "index entry should be gone once the last occurrence is dequeued"
    );

    // Once dequeued, the value may be enqueued again.
    assert!(queue.enqueue("conf-q-dedup", "job-1", true).await?);
    queue.remove_value("conf-q-dedup", "job-1", 0).await?;
    Ok(())
}

async fn test_unchecked_duplicates_are_counted(
    queue: &dyn DedupQueue,
) -> Result<(), CoordError> {
    assert!(queue.enqueue("conf-q-dup", "retry", false).await?);
    assert!(queue.enqueue("conf-q-dup", "retry", false).await?);
    assert_eq!(queue.len("conf-q-dup").await?, 2);

    assert_eq!(queue.dequeue("conf-q-dup").await?.as_deref(), Some("retry"));
    assert!(
        queue.exists("conf-q-dup", "retry").await?,
        "one occurrence remains, membership should still hold"
    );

    assert_eq!(queue.dequeue("conf-q-dup").await?.as_deref(), Some("retry"));
    assert!(!queue.exists("conf-q-dup", "retry").await?);
    Ok(())
}

/// The a/b/a scenario under the reject-on-duplicate policy.
async fn test_mixed_scenario(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    assert!(queue.enqueue("conf-q-mixed", "a", true).await?);
    assert!(queue.enqueue("conf-q-mixed", "b", true).await?);
    assert!(!queue.enqueue("conf-q-mixed", "a", true).await?);
    assert_eq!(queue.len("conf-q-mixed").await?, 2);

    assert_eq!(queue.dequeue("conf-q-mixed").await?.as_deref(), Some("a"));
    assert!(!queue.exists("conf-q-mixed", "a").await?);
    assert_eq!(queue.dequeue("conf-q-mixed").await?.as_deref(), Some("b"));
    assert_eq!(queue.len("conf-q-mixed").await?, 0);
    Ok(())
}

async fn test_remove_from_head(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    for value in ["v", "w", "v", "w", "v"] {
        queue.enqueue("conf-q-rem-head", value, false).await?;
    }

    let removed = queue.remove_value("conf-q-rem-head", "v", 1).await?;
    assert_eq!(removed, 1);
    assert_eq!(queue.len("conf-q-rem-head").await?, 4);
    assert!(queue.exists("conf-q-rem-head", "v").await?, "two occurrences remain");

    // Head was removed, so the list now leads with "w".
    assert_eq!(queue.dequeue("conf-q-rem-head").await?.as_deref(), Some("w"));
    queue.remove_value("conf-q-rem-head", "v", 0).await?;
    queue.remove_value("conf-q-rem-head", "w", 0).await?;
    Ok(())
}

async fn test_remove_all(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    for value in ["v", "w", "v"] {
        queue.enqueue("conf-q-rem-all", value, false).await?;
    }

    let removed = queue.remove_value("conf-q-rem-all", "v", 0).await?;
    assert_eq!(removed, 2, "count == 0 removes every occurrence");
    assert!(!queue.exists("conf-q-rem-all", "v").await?);
    assert_eq!(queue.len("conf-q-rem-all").await?, 1);

    queue.remove_value("conf-q-rem-all", "w", 0).await?;
    Ok(())
}

async fn test_remove_from_tail(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    for value in ["v", "w", "v"] {
        queue.enqueue("conf-q-rem-tail", value, false).await?;
    }

    let removed = queue.remove_value("conf-q-rem-tail", "v", -1).await?;
    assert_eq!(removed, 1);

    // The tail occurrence went away; the head one is still first out.
    assert_eq!(queue.dequeue("conf-q-rem-tail").await?.as_deref(), Some("v"));
    assert!(!queue.exists("conf-q-rem-tail", "v").await?);
    assert_eq!(queue.dequeue("conf-q-rem-tail").await?.as_deref(), Some("w"));
    Ok(())
}

async fn test_empty_arguments_rejected(queue: &dyn DedupQueue) -> Result<(), CoordError> {
    let result = queue.enqueue("", "x", false).await;
    assert!(matches!(result, Err(CoordError::InvalidArgument(_))));

    let result = queue.enqueue("conf-q-args", "", false).await;
    assert!(matches!(result, Err(CoordError::InvalidArgument(_))));
    Ok(())
}
