//! Coordination-store adapter
//!
//! The visited set and the pending counter are the only cross-worker state in
//! the pipeline. Both live in Redis keyed by job id, and every operation here
//! is linearizable per key — the pre-increment / decrement / compensation
//! protocol in the scraper is correct only because these writes are
//! serialized across all replicas. Never substitute an in-process map.
//!
//! Key lifetimes are tied to the crawl; destruction is left to an external
//! TTL policy.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::Result;
use crate::types::ScrapingId;

/// Key of the per-job visited set
pub fn visited_key(id: ScrapingId) -> String {
    format!("scrape:{id}:visited")
}

/// Key of the per-job pending counter
pub fn pending_key(id: ScrapingId) -> String {
    format!("scrape:{id}:pending")
}

/// Atomic set and counter operations, linearizable per key
///
/// All operations return an error on store failure; they never silently
/// succeed.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomic check-and-insert. Returns true iff `member` was not present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Atomic signed add. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64>;

    /// Atomic decrement by one. Returns the new value.
    async fn decr(&self, key: &str) -> Result<i64>;

    /// Read a key's value
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Redis-backed implementation of [`CoordinationStore`]
///
/// Uses a multiplexed async connection; clones share the underlying
/// connection and are cheap.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    /// Connect to Redis at `url` (e.g. `redis://localhost:6379`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added == 1)
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.decr(key, 1).await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}
