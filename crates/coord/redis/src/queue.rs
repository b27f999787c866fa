//! Redis-backed deduplicated FIFO queue.
//!
//! Each logical queue `Q` is two keys: the list `{prefix}:queue:{Q}` holding
//! the elements in FIFO order, and the hash `{prefix}:queue:{Q}:index`
//! mapping each element value to its occurrence count. Every mutating
//! operation runs as one Lua script so the list and index are never visible
//! in a mutually inconsistent state; a crash between separate commands would
//! desynchronize them permanently, since nothing reconciles the two.

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::{AsyncCommands, Script};

use corral_coord::error::{CoordError, require_non_empty};
use corral_coord::queue::DedupQueue;

use crate::config::RedisConfig;
use crate::scripts;

/// Redis-backed implementation of [`DedupQueue`].
pub struct RedisDedupQueue {
    pool: Pool,
    prefix: String,
}

impl RedisDedupQueue {
    /// Create a queue manager with its own connection pool.
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

    /// Create a queue manager over an existing pool (registry path).
    pub(crate) fn from_pool(pool: Pool, prefix: String) -> Self {
        Self { pool, prefix }
    }

    /// Build the full Redis key for a queue's list.
    fn queue_key(&self, name: &str) -> String {
        format!("{}:queue:{}", self.prefix, name)
    }

    /// Build the full Redis key for a queue's occurrence index.
    fn index_key(&self, name: &str) -> String {
        format!("{}:queue:{}:index", self.prefix, name)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, CoordError> {
        self.pool
            .get()
            .await
            .map_err(|e| CoordError::Connection(e.to_string()))
    }
}

#[async_trait]
impl DedupQueue for RedisDedupQueue {
    async fn enqueue(
        &self,
        queue: &str,
        value: &str,
        check_duplicate: bool,
    ) -> Result<bool, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        let script = if check_duplicate {
            Script::new(scripts::ENQUEUE_DEDUP)
        } else {
            Script::new(scripts::ENQUEUE)
        };

        let mut conn = self.conn().await?;
        let result: i64 = script
            .key(self.queue_key(queue))
            .key(self.index_key(queue))
            .arg(value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(result == 1)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<String>, CoordError> {
        require_non_empty("queue", queue)?;

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::DEQUEUE);
        let value: Option<String> = script
            .key(self.queue_key(queue))
            .key(self.index_key(queue))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(value)
    }

    async fn remove_value(
        &self,
        queue: &str,
        value: &str,
        count: i64,
    ) -> Result<u64, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        let mut conn = self.conn().await?;
        let script = Script::new(scripts::REMOVE_VALUE);
        let removed: i64 = script
            .key(self.queue_key(queue))
            .key(self.index_key(queue))
            .arg(value)
            .arg(count)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(u64::try_from(removed).unwrap_or(0))
    }

    async fn exists(&self, queue: &str, value: &str) -> Result<bool, CoordError> {
        require_non_empty("queue", queue)?;
        require_non_empty("value", value)?;

        // Read-only index probe; the scripts guarantee a zero count never
        // lingers, so presence of the field is membership.
        let mut conn = self.conn().await?;
        let count: Option<i64> = conn
            .hget(self.index_key(queue), value)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(count.unwrap_or(0) > 0)
    }

    async fn len(&self, queue: &str) -> Result<u64, CoordError> {
        require_non_empty("queue", queue)?;

        let mut conn = self.conn().await?;
        let len: u64 = conn
            .llen(self.queue_key(queue))
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes() {
        let queue = RedisDedupQueue::from_pool(
            RedisConfig::default().build_pool().unwrap(),
            "corral".into(),
        );
        assert_eq!(queue.queue_key("jobs"), "corral:queue:jobs");
        assert_eq!(queue.index_key("jobs"), "corral:queue:jobs:index");
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use corral_coord::testing::run_queue_conformance_tests;
    use uuid::Uuid;

    use super::*;

    fn test_config() -> RedisConfig {
        RedisConfig {
            prefix: format!("corral-test-{}", Uuid::new_v4()),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn queue_conformance() {
        let queue = RedisDedupQueue::new(&test_config()).expect("pool creation should succeed");
        run_queue_conformance_tests(&queue)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn index_entry_removed_at_zero() {
        let queue = RedisDedupQueue::new(&test_config()).expect("pool creation should succeed");

        queue.enqueue("zero", "v", false).await.unwrap();
        queue.dequeue("zero").await.unwrap();

        // The index hash must not retain a zero-count field.
        let mut conn = queue.conn().await.unwrap();
        let count: Option<i64> = redis::AsyncCommands::hget(&mut conn, queue.index_key("zero"), "v")
            .await
            .unwrap();
        assert_eq!(count, None);
    }
}
