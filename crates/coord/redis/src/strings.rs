//! Pass-through string accessor.
//!
//! Plain GET/SET plumbing over the instance's pool, carrying no design of its
//! own; it exists so a facade resolved from the registry covers the ordinary
//! key-value traffic alongside the coordination primitives. Typed variants go
//! through the instance codec, so a malformed stored payload is a
//! serialization error, never a silent default.

use std::time::Duration;

use deadpool_redis::Pool;
use redis::AsyncCommands;
use serde::Serialize;
use serde::de::DeserializeOwned;

use corral_coord::codec::JsonCodec;
use corral_coord::error::{CoordError, require_non_empty};

/// String operations backed by one registered instance.
pub struct RedisStrings {
    pool: Pool,
    prefix: String,
    codec: JsonCodec,
}

impl RedisStrings {
    /// Create an accessor over an existing pool (registry path).
    pub(crate) fn from_pool(pool: Pool, prefix: String, codec: JsonCodec) -> Self {
        Self {
            pool,
            prefix,
            codec,
        }
    }

    /// Build the full Redis key.
    fn string_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Obtain a connection from the pool.
    async fn conn(&self) -> Result<deadpool_redis::Connection, CoordError> {
        self.pool
            .get()
            .await
            .map_err(|e| CoordError::Connection(e.to_string()))
    }

    /// Get the value for a key. `Ok(None)` if missing or expired.
    pub async fn get(&self, key: &str) -> Result<Option<String>, CoordError> {
        require_non_empty("key", key)?;

        let mut conn = self.conn().await?;
        conn.get(self.string_key(key))
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))
    }

    /// Set a value, overwriting any previous one, with an optional TTL.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordError> {
        require_non_empty("key", key)?;

        let redis_key = self.string_key(key);
        let mut conn = self.conn().await?;
        match ttl {
            Some(d) => {
                let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
                let () = conn
                    .pset_ex(redis_key, value, ms)
                    .await
                    .map_err(|e| CoordError::Backend(e.to_string()))?;
            }
            None => {
                let () = conn
                    .set(redis_key, value)
                    .await
                    .map_err(|e| CoordError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Set a value only if the key is absent. Returns `true` if it was set.
    pub async fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, CoordError> {
        require_non_empty("key", key)?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(self.string_key(key)).arg(value).arg("NX");
        if let Some(d) = ttl {
            let ms = u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
            cmd.arg("PX").arg(ms);
        }

        let mut conn = self.conn().await?;
        let reply: Option<String> = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(reply.is_some())
    }

    /// Delete a key. Returns `true` if it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, CoordError> {
        require_non_empty("key", key)?;

        let mut conn = self.conn().await?;
        let deleted: i64 = conn
            .del(self.string_key(key))
            .await
            .map_err(|e| CoordError::Backend(e.to_string()))?;

        Ok(deleted > 0)
    }

    /// Get and deserialize a stored JSON value.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, CoordError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(self.codec.decode(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value as JSON, with an optional TTL.
    pub async fn set_json<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CoordError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = self.codec.encode(value)?;
        self.set(key, &raw, ttl).await
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use serde::Deserialize;
    use uuid::Uuid;

    use crate::config::RedisConfig;
    use crate::registry::RedisInstance;

    use super::*;

    fn test_instance() -> RedisInstance {
        let config = RedisConfig {
            prefix: format!("corral-test-{}", Uuid::new_v4()),
            ..RedisConfig::default()
        };
        RedisInstance::new(&config).expect("pool creation should succeed")
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Session {
        user: String,
        hits: u32,
    }

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let strings = test_instance().strings();

        strings.set("greeting", "hello", None).await.unwrap();
        assert_eq!(strings.get("greeting").await.unwrap().as_deref(), Some("hello"));

        assert!(strings.delete("greeting").await.unwrap());
        assert!(strings.get("greeting").await.unwrap().is_none());
        assert!(!strings.delete("greeting").await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_respects_existing() {
        let strings = test_instance().strings();

        assert!(strings.set_nx("once", "first", None).await.unwrap());
        assert!(!strings.set_nx("once", "second", None).await.unwrap());
        assert_eq!(strings.get("once").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn json_round_trip() {
        let strings = test_instance().strings();

        let session = Session {
            user: "ada".into(),
            hits: 3,
        };
        strings.set_json("session", &session, None).await.unwrap();

        let back: Option<Session> = strings.get_json("session").await.unwrap();
        assert_eq!(back, Some(session));
    }
}
