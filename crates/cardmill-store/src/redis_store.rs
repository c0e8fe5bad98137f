//! Networked task store backed by redis.
//!
//! TTL handling and sorted-set rank semantics are delegated to redis, so
//! this backend is a thin command mapping. Values are stored as JSON
//! strings. A [`ConnectionManager`] handles reconnects; it is cheap to
//! clone, and every operation clones it rather than holding a lock across
//! the round trip.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use cardmill_core::{Error, Result};

use crate::TaskStore;

/// Redis-backed [`TaskStore`] implementation.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to redis and build the store.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| Error::Config(format!("invalid redis URL: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::Store(format!("redis connect failed: {e}")))?;
        info!(
            url = %url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
            "Redis task store connected"
        );
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager (used by tests and embedders).
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn store_err(e: redis::RedisError) -> Error {
    Error::Store(e.to_string())
}

#[async_trait]
impl TaskStore for RedisStore {
    async fn set(&self, key: &str, value: JsonValue, expiry_secs: Option<u64>) -> Result<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&value)?;
        match expiry_secs {
            Some(secs) => conn
                .set_ex::<_, _, ()>(key, payload, secs)
                .await
                .map_err(store_err)?,
            None => conn
                .set::<_, _, ()>(key, payload)
                .await
                .map_err(store_err)?,
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<JsonValue>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(store_err)?;
        match raw {
            Some(data) => {
                debug!(key, "Store GET hit");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(store_err)?;
        Ok(())
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<()> {
        let mut conn = self.conn.clone();
        let items: Vec<(f64, &str)> = members
            .iter()
            .map(|(member, score)| (*score, member.as_str()))
            .collect();
        conn.zadd_multiple::<_, _, _, ()>(key, &items)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn zrevrange(&self, key: &str, start: i64, end: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.zrevrange(key, start as isize, end as isize)
            .await
            .map_err(store_err)
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, end: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zremrangebyrank::<_, ()>(key, start as isize, end as isize)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn expire(&self, key: &str, secs: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.expire::<_, ()>(key, secs as i64)
            .await
            .map_err(store_err)?;
        Ok(())
    }
}
