//! # cardmill-store
//!
//! Key-value task store backends for cardmill.
//!
//! The [`TaskStore`] trait is the capability set the task registry relies
//! on: plain get/set-with-expiry plus the sorted-set operations backing
//! the per-user history log. Two interchangeable implementations are
//! provided:
//!
//! - [`MemoryStore`] — process-local, with a background sweep removing
//!   expired keys every second
//! - [`RedisStore`] — networked, TTL and atomicity delegated to redis
//!
//! Both produce identical externally observable behavior.

pub mod memory;
pub mod redis_store;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use cardmill_core::{Result, Settings, StorageKind};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Capability set required from a task store backend.
///
/// Sorted-set rank semantics follow redis: ranks ascend by score, and
/// negative indices count from the end (`-1` is the highest-scored
/// member). Range bounds are inclusive.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Upsert a value with an optional TTL. Overwrites any prior TTL.
    async fn set(&self, key: &str, value: JsonValue, expiry_secs: Option<u64>) -> Result<()>;

    /// Get the last set value, or `None` if never set or expired.
    async fn get(&self, key: &str) -> Result<Option<JsonValue>>;

    /// Delete a key. No-op if absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Add/update members of an ordered set with their scores.
    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<()>;

    /// Highest-score-first slice of an ordered set, inclusive indices.
    async fn zrevrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>>;

    /// Remove members by ascending rank range (used to trim to last N).
    async fn zremrangebyrank(&self, key: &str, start: i64, end: i64) -> Result<()>;

    /// Set or refresh the TTL on an existing key.
    async fn expire(&self, key: &str, secs: u64) -> Result<()>;
}

/// Build the configured task store backend.
pub async fn build_store(settings: &Settings) -> Result<Arc<dyn TaskStore>> {
    match settings.storage {
        StorageKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StorageKind::Redis => Ok(Arc::new(RedisStore::connect(&settings.redis_url).await?)),
    }
}
