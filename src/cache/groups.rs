//! Cache invalidation groups: a name -> registered-keys index kept in the cache itself.
//!
//! `register` and `flush` are not atomic with respect to each other. A key
//! registered while a flush is in flight can survive until its own ttl.

use super::CacheStore;
use crate::error::AppError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Registration {
    key: String,
    /// Unix seconds; `None` never expires.
    expires_at: Option<i64>,
}

#[derive(Clone)]
pub struct CacheGroups {
    cache: Arc<dyn CacheStore>,
    prefix: String,
}

impl CacheGroups {
    pub fn new(cache: Arc<dyn CacheStore>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    fn index_key(&self, group: &str) -> String {
        format!("{}:group:{}", self.prefix, group)
    }

    async fn load(&self, index_key: &str) -> Result<Vec<Registration>, AppError> {
        match self.cache.get(index_key).await? {
            Some(v) => serde_json::from_value(v).map_err(|e| AppError::Cache(format!("corrupt group index: {}", e))),
            None => Ok(Vec::new()),
        }
    }

    /// Track `key` under `group`, pruning registrations that have already expired.
    pub async fn register(&self, group: &str, key: &str, ttl: Option<Duration>) -> Result<(), AppError> {
        let index_key = self.index_key(group);
        let now = Utc::now().timestamp();
        let mut entries: Vec<Registration> = self
            .load(&index_key)
            .await?
            .into_iter()
            .filter(|r| r.expires_at.map_or(true, |at| at > now) && r.key != key)
            .collect();
        entries.push(Registration {
            key: key.to_string(),
            expires_at: ttl.map(|t| now + t.as_secs() as i64),
        });
        self.cache.forever(&index_key, serde_json::to_value(&entries)?).await?;
        debug!(group = %group, key = %key, "cache key registered");
        Ok(())
    }

    /// Drop the index and evict every key it listed. Returns how many keys were evicted.
    pub async fn flush(&self, group: &str) -> Result<usize, AppError> {
        let index_key = self.index_key(group);
        let entries: Vec<Registration> = match self.cache.pull(&index_key).await? {
            Some(v) => serde_json::from_value(v).map_err(|e| AppError::Cache(format!("corrupt group index: {}", e)))?,
            None => Vec::new(),
        };
        let mut evicted = 0;
        for entry in &entries {
            if self.cache.forget(&entry.key).await? {
                evicted += 1;
            }
        }
        debug!(group = %group, keys = entries.len(), evicted, "cache group flushed");
        Ok(evicted)
    }

    /// Live keys registered under `group`.
    pub async fn keys(&self, group: &str) -> Result<Vec<String>, AppError> {
        let now = Utc::now().timestamp();
        Ok(self
            .load(&self.index_key(group))
            .await?
            .into_iter()
            .filter(|r| r.expires_at.map_or(true, |at| at > now))
            .map(|r| r.key)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use serde_json::json;

    #[tokio::test]
    async fn flush_evicts_registered_keys() {
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let groups = CacheGroups::new(cache.clone(), "query-gate");
        cache.put("k1", json!(1), Duration::from_secs(60)).await.unwrap();
        cache.put("k2", json!(2), Duration::from_secs(60)).await.unwrap();
        groups.register("posts-index", "k1", Some(Duration::from_secs(60))).await.unwrap();
        groups.register("posts-index", "k2", None).await.unwrap();
        groups.register("posts-index", "k1", Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(groups.keys("posts-index").await.unwrap(), vec!["k2", "k1"]);

        assert_eq!(groups.flush("posts-index").await.unwrap(), 2);
        assert_eq!(cache.get("k1").await.unwrap(), None);
        assert!(groups.keys("posts-index").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn flushing_unknown_group_is_a_no_op() {
        let groups = CacheGroups::new(Arc::new(MemoryCache::new()), "p");
        assert_eq!(groups.flush("missing").await.unwrap(), 0);
    }
}
