//! Redis backend for Corral's coordination primitives.
//!
//! This crate provides Redis-backed implementations of the [`LockManager`]
//! and [`DedupQueue`] traits from `corral-coord`, plus the instance registry
//! that maps logical names to configured connection pools.
//!
//! # Features
//!
//! - **Distributed locking**: mutual exclusion using `SET NX PX` with Lua
//!   scripts, optional background lease renewal.
//! - **Deduplicated queues**: a FIFO list plus a counting hash index, kept
//!   consistent by running every mutating operation as a single Lua script.
//! - **Instance registry**: named `(pool, codec, prefix)` facades, built once
//!   and cached for the process lifetime.
//! - **Connection pooling**: `deadpool-redis` for connection management.
//!
//! # Consistency
//!
//! Lock mutual exclusion holds on a single Redis instance. Under Sentinel or
//! Cluster, asynchronous replication means a lock can be lost during
//! failover; treat the lock as best-effort coordination there. A queue's list
//! and index are two keys derived from the queue name; in cluster mode they
//! must hash to the same slot for the scripts to run, so standalone or
//! hash-tagged deployments are assumed.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use corral_coord::LockManager;
//! use corral_coord_redis::{RedisConfig, RedisRegistry};
//!
//! let registry = RedisRegistry::new();
//! let instance = registry.register_default(&RedisConfig::default())?;
//!
//! if let Some(lock) = instance.locks().try_lock("reindex", Duration::from_secs(30), true).await? {
//!     // Critical section; the watchdog renews the lease until unlock.
//!     lock.unlock().await?;
//! }
//! ```
//!
//! [`LockManager`]: corral_coord::LockManager
//! [`DedupQueue`]: corral_coord::DedupQueue

mod config;
pub mod lock;
pub mod queue;
mod registry;
mod scripts;
mod strings;

pub use config::RedisConfig;
pub use lock::RedisLockManager;
pub use queue::RedisDedupQueue;
pub use registry::{DEFAULT_INSTANCE, RedisInstance, RedisRegistry};
pub use strings::RedisStrings;
