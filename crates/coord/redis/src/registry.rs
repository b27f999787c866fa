//! Instance registry: logical names mapped to configured Redis facades.
//!
//! A process typically talks to one Redis deployment, sometimes several
//! (separate cache and coordination clusters, per-team databases). The
//! registry holds one immutable [`RedisInstance`] per logical name, built on
//! first registration and cached for the process lifetime. There is no
//! process-wide static: the registry is an explicit value constructed at
//! startup and shared by the caller (clone it or wrap it in an `Arc`).

use std::sync::Arc;

use dashmap::DashMap;
use deadpool_redis::Pool;
use tracing::info;

use corral_coord::codec::JsonCodec;
use corral_coord::error::{CoordError, require_non_empty};
use corral_coord::typed::TypedQueue;

use crate::config::RedisConfig;
use crate::lock::RedisLockManager;
use crate::queue::RedisDedupQueue;
use crate::strings::RedisStrings;

/// Name used by the single-instance convenience entry points.
pub const DEFAULT_INSTANCE: &str = "default";

/// One configured Redis instance: a shared connection pool, the key prefix,
/// and the codec for typed accessors. Immutable after construction and safe
/// to share across tasks.
#[derive(Debug)]
pub struct RedisInstance {
    pool: Pool,
    prefix: String,
    codec: JsonCodec,
}

impl RedisInstance {
    /// Build an instance from its configuration. The pool is created eagerly
    /// but connects lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::Connection`] if the pool cannot be created.
    pub fn new(config: &RedisConfig) -> Result<Self, CoordError> {
        Ok(Self {
            pool: config.build_pool()?,
            prefix: config.prefix.clone(),
            codec: JsonCodec::new(),
        })
    }

    /// The key prefix this instance applies to everything it stores.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Lock manager sharing this instance's pool and prefix.
    pub fn locks(&self) -> RedisLockManager {
        RedisLockManager::from_pool(self.pool.clone(), self.prefix.clone())
    }

    /// Dedup queue manager sharing this instance's pool and prefix.
    pub fn queues(&self) -> RedisDedupQueue {
        RedisDedupQueue::from_pool(self.pool.clone(), self.prefix.clone())
    }

    /// Typed view over [`queues`](RedisInstance::queues) using this
    /// instance's codec.
    pub fn typed_queues(&self) -> TypedQueue<RedisDedupQueue> {
        TypedQueue::new(self.queues(), self.codec)
    }

    /// String accessor sharing this instance's pool, prefix, and codec.
    pub fn strings(&self) -> RedisStrings {
        RedisStrings::from_pool(self.pool.clone(), self.prefix.clone(), self.codec)
    }
}

/// Registry of named [`RedisInstance`]s.
///
/// Registrations are append-only for the life of the process: registering a
/// name twice is an error rather than a replacement, since replacement would
/// silently orphan pools already resolved by other callers. Concurrent
/// `resolve` calls for one name always return the same cached instance.
#[derive(Default)]
pub struct RedisRegistry {
    instances: DashMap<String, Arc<RedisInstance>>,
}

impl RedisRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and cache the facade for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::InstanceExists`] if `name` is already
    /// registered, or [`CoordError::Connection`] if the pool cannot be
    /// created.
    pub fn register(
        &self,
        name: &str,
        config: &RedisConfig,
    ) -> Result<Arc<RedisInstance>, CoordError> {
        require_non_empty("name", name)?;

        match self.instances.entry(name.to_owned()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(CoordError::InstanceExists(name.to_owned()))
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let instance = Arc::new(RedisInstance::new(config)?);
                info!(name, prefix = %config.prefix, "redis instance registered");
                vacant.insert(Arc::clone(&instance));
                Ok(instance)
            }
        }
    }

    /// Register under [`DEFAULT_INSTANCE`], for the common
    /// one-deployment-per-process case.
    pub fn register_default(
        &self,
        config: &RedisConfig,
    ) -> Result<Arc<RedisInstance>, CoordError> {
        self.register(DEFAULT_INSTANCE, config)
    }

    /// Look up the cached facade for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoordError::InstanceNotFound`] for an unregistered name;
    /// there is no silent empty result.
    pub fn resolve(&self, name: &str) -> Result<Arc<RedisInstance>, CoordError> {
        self.instances
            .get(name)
            .map(|entry| Arc::clone(&entry))
            .ok_or_else(|| CoordError::InstanceNotFound(name.to_owned()))
    }

    /// Look up the [`DEFAULT_INSTANCE`] facade.
    pub fn resolve_default(&self) -> Result<Arc<RedisInstance>, CoordError> {
        self.resolve(DEFAULT_INSTANCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_resolve_returns_same_instance() {
        let registry = RedisRegistry::new();
        let registered = registry.register("cache", &RedisConfig::default()).unwrap();
        let resolved = registry.resolve("cache").unwrap();
        assert!(Arc::ptr_eq(&registered, &resolved));
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let registry = RedisRegistry::new();
        registry.register("cache", &RedisConfig::default()).unwrap();

        let err = registry
            .register("cache", &RedisConfig::default())
            .unwrap_err();
        assert!(matches!(err, CoordError::InstanceExists(_)));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let registry = RedisRegistry::new();
        let err = registry.resolve("nowhere").unwrap_err();
        assert!(matches!(err, CoordError::InstanceNotFound(_)));
    }

    #[test]
    fn empty_name_is_rejected() {
        let registry = RedisRegistry::new();
        let err = registry.register("", &RedisConfig::default()).unwrap_err();
        assert!(matches!(err, CoordError::InvalidArgument(_)));
    }

    #[test]
    fn default_instance_round_trip() {
        let registry = RedisRegistry::new();
        registry.register_default(&RedisConfig::default()).unwrap();

        let instance = registry.resolve_default().unwrap();
        assert_eq!(instance.prefix(), "corral");
    }

    #[tokio::test]
    async fn concurrent_resolve_shares_one_instance() {
        let registry = Arc::new(RedisRegistry::new());
        registry.register("shared", &RedisConfig::default()).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.resolve("shared").unwrap()
            }));
        }

        let first = registry.resolve("shared").unwrap();
        for h in handles {
            let resolved = h.await.unwrap();
            assert!(Arc::ptr_eq(&first, &resolved));
        }
    }
}
