//! Redis-backed distributed locking.
//!
//! Locks are acquired with the `SET key token NX PX lease` pattern: the key
//! is only set if absent, it expires on its own if the holder crashes, and
//! the stored token proves ownership. Release and extension run as Lua
//! scripts conditioned on the token still matching, so a holder whose lease
//! lapsed mid-critical-section can never delete or extend a lock that a
//! second caller has since acquired.
//!
//! Mutual exclusion is strong on a single Redis instance. Under Sentinel or
//! Cluster it can be violated during failover (replication is asynchronous);
//! use the lock for best-effort coordination there, not strict correctness.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::{AsyncCommands, Script};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use corral_coord::error::{CoordError, require_non_empty};
use corral_coord::lock::{LockHandle, LockManager};

use crate::config::RedisConfig;
use crate::scripts;

/// Retry interval when polling for lock acquisition.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Redis-backed implementation of [`LockManager`].
pub struct RedisLockManager {
    pool: Pool,
    prefix: String,
}

impl RedisLockManager {
    /// Create a lock manager with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, CoordError> {
        Ok(Self {
            pool: config.build_pool()?,
            prefix: config.prefix.clone(),
        })
    }

    /// Create a lock manager over an existing pool (registry path).
    pub(crate) fn from_pool(pool: Pool, prefix: String) -> Self {
        Self { pool, prefix }
    }

    /// Build the full Redis key for a lock.
    fn lock_key(&self, name: &str) -> String {
        format!("{}:lock:{}", self.prefix, name)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, CoordError> {
        self.pool
            .get()
            .await
            .map_err(|e| CoordError::Connection(e.to_string()))
    }
}

/// Convert a lease to the millisecond argument `PX` expects. A sub-millisecond
/// lease would render as `PX 0`, which Redis rejects, so it fails fast here.
fn lease_millis(lease: Duration) -> Result<i64, CoordError> {
    let ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    if ms <= 0 {
        return Err(CoordError::InvalidArgument(
            "lease must be at least one millisecond".into(),
        ));
    }
    Ok(ms)
}

/// Compare-and-extend the lease. Returns `false` once the token no longer
/// owns the lock.
async fn extend_lease(
    pool: &Pool,
    redis_key: &str,
    token: &str,
    lease_ms: i64,
) -> Result<bool, CoordError> {
    let mut conn = pool
        .get()
        .await
        .map_err(|e| CoordError::Connection(e.to_string()))?;

    let script = Script::new(scripts::LOCK_EXTEND);
    let result: i64 = script
        .key(redis_key)
        .arg(token)
        .arg(lease_ms)
        .invoke_async(&mut conn)
        .await
        .map_err(|e| CoordError::Backend(e.to_string()))?;

    Ok(result == 1)
}

fn spawn_watchdog(pool: Pool, redis_key: String, token: String, lease: Duration) -> JoinHandle<()> {
    // Renewing at half the lease leaves room for one failed attempt to be
    // retried before the lease runs out, so transient errors don't stop the
    // loop; only losing ownership does.
    let interval = lease / 2;
    let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match extend_lease(&pool, &redis_key, &token, lease_ms).await {
                Ok(true) => debug!(key = %redis_key, "lease renewed"),
                Ok(false) => {
                    warn!(key = %redis_key, "lock no longer held, stopping renewal");
                    break;
                }
                Err(error) => {
                    warn!(key = %redis_key, %error, "lease renewal attempt failed");
                }
            }
        }
    })
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn try_lock(
        &self,
        key: &str,
        lease: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError> {
        require_non_empty("key", key)?;
        let lease_ms = lease_millis(lease)?;
        let redis_key = self.lock_key(key);
        let token = Uuid::new_v4().to_string();

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::LOCK_ACQUIRE);
        let result: i64 = script
            .key(&redis_key)
            .arg(&token)
            .arg(lease_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        if result != 1 {
            return Ok(None);
        }

        let watchdog = auto_renew
            .then(|| spawn_watchdog(self.pool.clone(), redis_key.clone(), token.clone(), lease));

        Ok(Some(Box::new(RedisLockHandle {
            pool: self.pool.clone(),
            key: key.to_owned(),
            redis_key,
            token,
            watchdog,
        })))
    }

    async fn lock(
        &self,
        key: &str,
        lease: Duration,
        acquire_timeout: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError> {
        let deadline = tokio::time::Instant::now() + acquire_timeout;

        loop {
            if let Some(handle) = self.try_lock(key, lease, auto_renew).await? {
                return Ok(Some(handle));
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let sleep_dur = LOCK_POLL_INTERVAL.min(deadline - now);
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// A held distributed lock backed by Redis.
///
/// Dropping the handle without calling [`unlock`](LockHandle::unlock) stops
/// any renewal watchdog and lets the lock expire after its lease; explicit
/// unlock is preferred for prompt release.
pub struct RedisLockHandle {
    pool: Pool,
    key: String,
    redis_key: String,
    token: String,
    watchdog: Option<JoinHandle<()>>,
}

impl Drop for RedisLockHandle {
    fn drop(&mut self) {
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }
    }
}

impl RedisLockHandle {
    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, CoordError> {
        self.pool
            .get()
            .await
            .map_err(|e| CoordError::Connection(e.to_string()))
    }
}

#[async_trait]
impl LockHandle for RedisLockHandle {
    fn key(&self) -> &str {
        &self.key
    }

    async fn delay(&self, additional: Duration) -> Result<bool, CoordError> {
        let additional_ms = lease_millis(additional)?;

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::LOCK_DELAY);
        let result: i64 = script
            .key(&self.redis_key)
            .arg(&self.token)
            .arg(additional_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn refresh(&self, lease: Duration) -> Result<bool, CoordError> {
        let lease_ms = lease_millis(lease)?;
        extend_lease(&self.pool, &self.redis_key, &self.token, lease_ms).await
    }

    async fn unlock(self: Box<Self>) -> Result<bool, CoordError> {
        // Stop renewing before deleting; the script still only deletes if
        // this handle's token is the current owner.
        if let Some(watchdog) = &self.watchdog {
            watchdog.abort();
        }

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::LOCK_RELEASE);
        let result: i64 = script
            .key(&self.redis_key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn is_held(&self) -> Result<bool, CoordError> {
        let mut conn = self.conn().await?;
        let current: Option<String> = conn
            .get(&self.redis_key)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(current.as_deref() == Some(&self.token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_lease_is_rejected() {
        let err = lease_millis(Duration::ZERO).unwrap_err();
        assert!(matches!(err, CoordError::InvalidArgument(_)));
    }

    #[test]
    fn lease_renders_as_milliseconds() {
        assert_eq!(lease_millis(Duration::from_secs(30)).unwrap(), 30_000);
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use corral_coord::testing::run_lock_conformance_tests;

    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            prefix: format!("corral-test-{}", Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn lock_conformance() {
        let lock = RedisLockManager::new(&test_config()).expect("pool creation should succeed");
        run_lock_conformance_tests(&lock)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn stale_handle_cannot_touch_foreign_lock() {
        let lock = RedisLockManager::new(&test_config()).expect("pool creation should succeed");

        let first = lock
            .try_lock("foreign", Duration::from_millis(500), false)
            .await
            .unwrap()
            .expect("should acquire");

        tokio::time::sleep(Duration::from_millis(700)).await;

        let second = lock
            .try_lock("foreign", Duration::from_secs(10), false)
            .await
            .unwrap()
            .expect("should acquire after expiry");

        assert!(!first.refresh(Duration::from_secs(10)).await.unwrap());
        assert!(!first.unlock().await.unwrap());
        assert!(second.is_held().await.unwrap());
        second.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn watchdog_outlives_the_lease() {
        let lock = RedisLockManager::new(&test_config()).expect("pool creation should succeed");

        let handle = lock
            .try_lock("renewed", Duration::from_secs(1), true)
            .await
            .unwrap()
            .expect("should acquire");

        // Well past the original lease, renewal has kept the lock held.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let contender = lock
            .try_lock("renewed", Duration::from_secs(1), false)
            .await
            .unwrap();
        assert!(contender.is_none(), "renewed lock should still exclude others");

        assert!(handle.unlock().await.unwrap());
    }
}
