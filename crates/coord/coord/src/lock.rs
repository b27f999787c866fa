use std::time::Duration;

use async_trait::async_trait;

use crate::error::CoordError;

/// A held distributed lock.
///
/// The handle proves ownership through an opaque token generated at
/// acquisition; every mutating operation is conditioned on that token still
/// matching the store's value, never on key existence alone. Dropping the
/// handle without calling [`unlock`](LockHandle::unlock) is safe: any renewal
/// watchdog is stopped and the lock expires after its lease. Explicit unlock
/// is preferred for prompt release.
#[async_trait]
pub trait LockHandle: Send + Sync {
    /// The lock's key.
    fn key(&self) -> &str;

    /// Add `additional` time on top of the remaining lease, only if this
    /// handle's token still owns the lock. Returns `false` if ownership was
    /// lost.
    async fn delay(&self, additional: Duration) -> Result<bool, CoordError>;

    /// Extend the lease to `lease` from now, only if this handle's token
    /// still owns the lock. Returns `false` if ownership was lost; the
    /// caller must treat that as "I no longer hold the lock".
    async fn refresh(&self, lease: Duration) -> Result<bool, CoordError>;

    /// Release the lock, only if this handle's token still owns it. Returns
    /// `false` if ownership was already lost. Never deletes a lock currently
    /// held by another token. Stops the renewal watchdog either way.
    async fn unlock(self: Box<Self>) -> Result<bool, CoordError>;

    /// Check whether the store still records this handle's token as owner.
    async fn is_held(&self) -> Result<bool, CoordError>;
}

/// Acquires named exclusive locks with crash-safe expiry.
///
/// Failing to acquire a held lock is an expected outcome, surfaced as
/// `Ok(None)`. Backend failures are always `Err(..)` and never folded into
/// `None`; hiding an outage as contention would mask it entirely.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Single conditional-set attempt. `Ok(None)` means the lock is held by
    /// someone else.
    ///
    /// With `auto_renew`, a background watchdog refreshes the lease at half
    /// the lease interval until the lock is lost, unlocked, or the handle is
    /// dropped.
    async fn try_lock(
        &self,
        key: &str,
        lease: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError>;

    /// Repeatedly attempt [`try_lock`](LockManager::try_lock) with an async
    /// delay between attempts until acquisition succeeds or `acquire_timeout`
    /// elapses. `Ok(None)` on timeout.
    ///
    /// This is a bounded spin-wait, not a queue: there is no fairness
    /// guarantee across competing callers. The timeout is soft; it stops new
    /// attempts but does not interrupt an in-flight round trip.
    async fn lock(
        &self,
        key: &str,
        lease: Duration,
        acquire_timeout: Duration,
        auto_renew: bool,
    ) -> Result<Option<Box<dyn LockHandle>>, CoordError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify object safety of both traits.
    fn _assert_dyn_lock_handle(_: &dyn LockHandle) {}
    fn _assert_dyn_lock_manager(_: &dyn LockManager) {}
}
