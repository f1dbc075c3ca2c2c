//! Redis implementation of the ephemeral cache store.
//!
//! Layout under `prefix`:
//! - `{prefix}:item:{id}`: the cached segment
//! - `{prefix}:index`: sorted set of ids scored by creation time (unix secs)
//! - `{prefix}:sizes`: hash of id -> payload length
//!
//! Writes and deletes touch all three in one atomic pipeline, so counts and
//! sizes never drift from the stored items.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::time::Duration;

use lifecycle_core::{traits::ResourceStoreAdapter, types::ResourceKind, Error, Result};

use crate::cutoff_secs;

const KIND: ResourceKind = ResourceKind::EphemeralCache;

/// Redis-backed ephemeral cache.
pub struct RedisCacheStore {
    client: Client,
    prefix: String,
}

impl RedisCacheStore {
    /// Create a new Redis cache store.
    pub fn new(url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            client,
            prefix: prefix.trim_end_matches(':').to_string(),
        })
    }

    fn item_key(&self, id: &str) -> String {
        format!("{}:item:{}", self.prefix, id)
    }

    fn index_key(&self) -> String {
        format!("{}:index", self.prefix)
    }

    fn sizes_key(&self) -> String {
        format!("{}:sizes", self.prefix)
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::unavailable(KIND.as_str(), format!("Redis connection error: {}", e)))
    }

    fn command_error(op: &str, e: redis::RedisError) -> Error {
        Error::unavailable(KIND.as_str(), format!("Redis {} error: {}", op, e))
    }

    /// Cache a segment. Called by the ingestion path.
    pub async fn put(&self, id: &str, value: Bytes) -> Result<()> {
        let mut conn = self.connection().await?;
        let created_at = Utc::now().timestamp();
        let len = value.len() as u64;

        let _: () = redis::pipe()
            .atomic()
            .set(self.item_key(id), value.as_ref())
            .ignore()
            .zadd(self.index_key(), id, created_at)
            .ignore()
            .hset(self.sizes_key(), id, len)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("put", e))?;

        tracing::trace!(id = %id, size = len, "Cached segment in Redis");
        Ok(())
    }

    /// Read a cached segment. A concurrently evicted entry is simply a miss.
    pub async fn get(&self, id: &str) -> Result<Option<Bytes>> {
        let mut conn = self.connection().await?;
        let data: Option<Vec<u8>> = conn
            .get(self.item_key(id))
            .await
            .map_err(|e| Self::command_error("get", e))?;
        Ok(data.map(Bytes::from))
    }
}

#[async_trait]
impl ResourceStoreAdapter for RedisCacheStore {
    fn kind(&self) -> ResourceKind {
        KIND
    }

    async fn count(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        let count: u64 = conn
            .zcard(self.index_key())
            .await
            .map_err(|e| Self::command_error("zcard", e))?;
        Ok(count)
    }

    async fn size_bytes(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        let sizes: Vec<u64> = conn
            .hvals(self.sizes_key())
            .await
            .map_err(|e| Self::command_error("hvals", e))?;
        Ok(sizes.into_iter().sum())
    }

    async fn oldest_item_age(&self) -> Result<Option<Duration>> {
        let mut conn = self.connection().await?;
        let oldest: Vec<(String, f64)> = conn
            .zrange_withscores(self.index_key(), 0, 0)
            .await
            .map_err(|e| Self::command_error("zrange", e))?;

        Ok(oldest.first().map(|(_, score)| {
            let age = Utc::now().timestamp() - *score as i64;
            Duration::from_secs(age.max(0) as u64)
        }))
    }

    async fn list_older_than(&self, age: Duration) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        // Exclusive upper bound: strictly older than the cutoff.
        let max = format!("({}", cutoff_secs(age));
        let ids: Vec<String> = conn
            .zrangebyscore(self.index_key(), "-inf", max)
            .await
            .map_err(|e| Self::command_error("zrangebyscore", e))?;
        Ok(ids)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut conn = self.connection().await?;

        // DEL/ZREM/HDEL on missing members are no-ops, so repeats are safe.
        let _: () = redis::pipe()
            .atomic()
            .del(self.item_key(id))
            .ignore()
            .zrem(self.index_key(), id)
            .ignore()
            .hdel(self.sizes_key(), id)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::command_error("delete", e))?;

        Ok(())
    }
}
