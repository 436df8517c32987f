//! Cache collaborator and the in-process implementation.
//!
//! Read-path results are cached per request shape; mutations flush the
//! gate's invalidation group (see [`CacheGroups`]).

mod groups;

pub use groups::CacheGroups;

use crate::error::AppError;
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

/// Maximum expiring entries held by the in-process cache.
const MAX_CAPACITY: u64 = 10_000;

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError>;

    async fn forever(&self, key: &str, value: Value) -> Result<(), AppError>;

    /// Remove a key; true when it was present.
    async fn forget(&self, key: &str) -> Result<bool, AppError>;

    /// Read and remove in one step.
    async fn pull(&self, key: &str) -> Result<Option<Value>, AppError> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.forget(key).await?;
        }
        Ok(value)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, Entry> for PerEntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// moka-backed cache with per-entry expiry.
///
/// `put` entries live in a bounded cache and may be evicted under pressure.
/// `forever` entries (group indexes) live in an unbounded one and leave only through `forget` or `pull`.
#[derive(Clone)]
pub struct MemoryCache {
    expiring: Cache<String, Entry>,
    persistent: Cache<String, Value>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CAPACITY)
    }

    /// Bound the expiring entries at `capacity`.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            expiring: Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryExpiry)
                .build(),
            persistent: Cache::builder().build(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        if let Some(value) = self.persistent.get(key).await {
            return Ok(Some(value));
        }
        Ok(self.expiring.get(key).await.map(|e| e.value))
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), AppError> {
        if ttl.is_zero() {
            return Err(AppError::Cache(format!("zero ttl for key {}", key)));
        }
        self.persistent.remove(key).await;
        self.expiring.insert(key.to_string(), Entry { value, ttl }).await;
        debug!(key = %key, ttl = ?ttl, "cache put");
        Ok(())
    }

    async fn forever(&self, key: &str, value: Value) -> Result<(), AppError> {
        self.expiring.remove(key).await;
        self.persistent.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<bool, AppError> {
        let persistent = self.persistent.remove(key).await.is_some();
        let expiring = self.expiring.remove(key).await.is_some();
        Ok(persistent || expiring)
    }

    async fn pull(&self, key: &str) -> Result<Option<Value>, AppError> {
        if let Some(value) = self.persistent.remove(key).await {
            return Ok(Some(value));
        }
        Ok(self.expiring.remove(key).await.map(|e| e.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_pull_forget() {
        let cache = MemoryCache::new();
        cache.put("a", json!(1), Duration::from_secs(60)).await.unwrap();
        cache.forever("b", json!([2])).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.pull("b").await.unwrap(), Some(json!([2])));
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert!(cache.forget("a").await.unwrap());
        assert!(!cache.forget("a").await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = MemoryCache::new();
        cache.put("short", json!("x"), Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn forever_entries_survive_capacity_pressure() {
        let cache = MemoryCache::with_capacity(4);
        cache.forever("query-gate:group:posts", json!(["k"])).await.unwrap();
        for i in 0..200 {
            cache.put(&format!("k{}", i), json!(i), Duration::from_secs(60)).await.unwrap();
        }
        cache.expiring.run_pending_tasks().await;
        assert!(cache.expiring.entry_count() <= 4);
        assert_eq!(cache.get("query-gate:group:posts").await.unwrap(), Some(json!(["k"])));
    }

    #[tokio::test]
    async fn a_key_lives_in_one_store_at_a_time() {
        let cache = MemoryCache::new();
        cache.forever("k", json!("index")).await.unwrap();
        cache.put("k", json!("page"), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!("page")));
        cache.forever("k", json!("index")).await.unwrap();
        assert_eq!(cache.pull("k").await.unwrap(), Some(json!("index")));
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
