use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use corral_coord::error::{CoordError, require_non_empty};
use corral_coord::lock::{LockHandle, LockManager};

/// Internal entry representing a held lock.
#[derive(Debug, Clone)]
struct LockEntry {
    owner: String,
    expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Retry interval when polling for lock acquisition.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// In-memory [`LockManager`] backed by a [`DashMap`].
///
/// Lease expiry is lazy: expired entries are evicted on the next operation
/// touching the same lock key.
#[derive(Debug, Clone, Default)]
pub struct MemoryLockManager {
    locks: Arc<DashMap<String, LockEntry>>,
}

impl MemoryLockManager {
    /// Create a new in-memory lock manager.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn try_lock(
        &self,
        key: &str,
        lease: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError> {
        require_non_empty("key", key)?;
        let key = key.to_owned();

        // Remove expired entries lazily.
        self.locks.remove_if(&key, |_, entry| entry.is_expired());

        let owner = Uuid::new_v4().to_string();
        match self.locks.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(None),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(LockEntry {
                    owner: owner.clone(),
                    expires_at: Instant::now() + lease,
                });

                let watchdog = auto_renew
                    .then(|| spawn_watchdog(Arc::clone(&self.locks), key.clone(), owner.clone(), lease));

                Ok(Some(Box::new(MemoryLockHandle {
                    locks: Arc::clone(&self.locks),
                    key,
                    owner,
                    watchdog,
                })))
            }
        }
    }

    async fn lock(
        &self,
        key: &str,
        lease: Duration,
        acquire_timeout: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError> {
        let deadline = Instant::now() + acquire_timeout;

        loop {
            if let Some(handle) = self.try_lock(key, lease, auto_renew).await? {
                return Ok(Some(handle));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let sleep_dur = LOCK_POLL_INTERVAL.min(deadline - now);
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Extend the lease if `owner` still holds the lock. Returns `false` once
/// ownership is lost, which stops the watchdog.
fn renew(locks: &DashMap<String, LockEntry>, key: &str, owner: &str, lease: Duration) -> bool {
    match locks.get_mut(key) {
        Some(mut entry) if entry.owner == owner && !entry.is_expired() => {
            entry.expires_at = Instant::now() + lease;
            true
        }
        _ => false,
    }
}

fn spawn_watchdog(
    locks: Arc<DashMap<String, LockEntry>>,
    key: String,
    owner: String,
    lease: Duration,
) -> JoinHandle<()> {
    // Renewing at half the lease leaves room for one missed tick before the
    // lease runs out.
    let interval = lease / 2;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            if renew(&locks, &key, &owner, lease) {
                debug!(key = %key, "lease renewed");
            } else {
                warn!(key = %key, "lock no longer held, stopping renewal");
                break;
            }
        }
    })
}

/// A held lock acquired through [`MemoryLockManager`].
#[derive(Debug)]
pub struct MemoryLockHandle {
    locks: Arc<DashMap<String, LockEntry>>,
    key: String,
    owner: String,
    watchdog: Option<JoinHandle<()>>,
}

impl Drop for MemoryLockHandle {
    fn drop(&mut self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
    }
}

#[async_trait]
impl LockHandle for MemoryLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn delay(&self, additional: Duration) -> Result<bool, CoordError> {
        match self.locks.get_mut(&self.key) {
            Some(mut entry) if entry.owner == self.owner && !entry.is_expired() => {
                entry.expires_at += additional;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refresh(&self, lease: Duration) -> Result<bool, CoordError> {
        Ok(renew(&self.locks, &self.key, &self.owner, lease))
    }

    async fn unlock(self: Box<Self>) -> Result<bool, CoordError> {
        let removed = self
            .locks
            .remove_if(&self.key, |_, entry| {
                entry.owner == self.owner && !entry.is_expired()
            })
            .is_some();
        Ok(removed)
    }

    async fn is_held(&self) -> Result<bool, CoordError> {
        match self.locks.get(&self.key) {
            Some(entry) => Ok(entry.owner == self.owner && !entry.is_expired()),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use corral_coord::testing::run_lock_conformance_tests;

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let lock = MemoryLockManager::new();
        run_lock_conformance_tests(&lock)
            .await
            .expect("lock conformance tests should pass");
    }

    #[tokio::test(start_paused = true)]
    async fn lock_expires_after_lease() {
        let lock = MemoryLockManager::new();

        let handle = lock
            .try_lock("expiry", Duration::from_secs(2), false)
            .await
            .unwrap()
            .expect("should acquire");

        assert!(handle.is_held().await.unwrap());

        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(!handle.is_held().await.unwrap());
        let second = lock
            .try_lock("expiry", Duration::from_secs(10), false)
            .await
            .unwrap();
        assert!(second.is_some(), "should acquire after lease expiry");
    }

    #[tokio::test(start_paused = true)]
    async fn stale_handle_cannot_touch_foreign_lock() {
        let lock = MemoryLockManager::new();

        let first = lock
            .try_lock("foreign", Duration::from_secs(2), false)
            .await
            .unwrap()
            .expect("should acquire");

        tokio::time::advance(Duration::from_secs(3)).await;

        // A second caller takes over after the first lease ran out.
        let second = lock
            .try_lock("foreign", Duration::from_secs(10), false)
            .await
            .unwrap()
            .expect("should acquire expired lock");

        assert!(!first.refresh(Duration::from_secs(10)).await.unwrap());
        assert!(!first.delay(Duration::from_secs(10)).await.unwrap());
        assert!(!first.unlock().await.unwrap());
        assert!(
            second.is_held().await.unwrap(),
            "stale handle must not have touched the new holder's lock"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delay_adds_to_remaining_lease() {
        let lock = MemoryLockManager::new();

        let handle = lock
            .try_lock("delayed", Duration::from_secs(2), false)
            .await
            .unwrap()
            .expect("should acquire");
        assert!(handle.delay(Duration::from_secs(3)).await.unwrap());

        // Past the original lease but inside the extended one.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(handle.is_held().await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!handle.is_held().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_keeps_lock_alive() {
        let lock = MemoryLockManager::new();

        let handle = lock
            .try_lock("renewed", Duration::from_secs(2), true)
            .await
            .unwrap()
            .expect("should acquire");

        // Well past the original lease, the watchdog has kept it held.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(handle.is_held().await.unwrap());
        let contender = lock
            .try_lock("renewed", Duration::from_secs(2), false)
            .await
            .unwrap();
        assert!(contender.is_none(), "renewed lock should still exclude others");

        assert!(handle.unlock().await.unwrap());

        // Unlock stopped the watchdog, so the key is free immediately.
        let contender = lock
            .try_lock("renewed", Duration::from_secs(2), false)
            .await
            .unwrap();
        assert!(contender.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_renewal() {
        let lock = MemoryLockManager::new();

        let handle = lock
            .try_lock("dropped", Duration::from_secs(2), true)
            .await
            .unwrap()
            .expect("should acquire");
        drop(handle);

        // With the watchdog gone the lease runs out naturally.
        tokio::time::advance(Duration::from_secs(3)).await;
        let second = lock
            .try_lock("dropped", Duration::from_secs(2), false)
            .await
            .unwrap();
        assert!(second.is_some(), "lease should lapse once the handle is dropped");
    }

    #[tokio::test]
    async fn mutual_exclusion_under_contention() {
        let lock = Arc::new(MemoryLockManager::new());
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                let guard = lock
                    .lock(
                        "contended",
                        Duration::from_millis(200),
                        Duration::from_secs(5),
                        false,
                    )
                    .await
                    .expect("lock call should not error")
                    .expect("should eventually acquire");

                counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                guard.unlock().await.expect("unlock should succeed");
            }));
        }

        for h in handles {
            h.await.expect("task should not panic");
        }

        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 10);
    }
}
