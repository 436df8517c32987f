//! Listing service: the query executor behind the read-path cache.

use crate::cache::{CacheGroups, CacheStore};
use crate::error::AppError;
use crate::gate::CompiledGate;
use crate::query::QueryExecutor;
use crate::request::GateRequest;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct ListingService {
    executor: QueryExecutor,
    cache: Arc<dyn CacheStore>,
    groups: CacheGroups,
    prefix: String,
}

impl ListingService {
    pub fn new(executor: QueryExecutor, cache: Arc<dyn CacheStore>, groups: CacheGroups, prefix: impl Into<String>) -> Self {
        Self {
            executor,
            cache,
            groups,
            prefix: prefix.into(),
        }
    }

    /// Stable key for one request shape against one gate version.
    pub fn cache_key(&self, gate: &CompiledGate, request: &GateRequest) -> String {
        let shape = json!({
            "entity": gate.entity,
            "version": gate.version,
            "request": request.cache_fingerprint(),
        });
        let digest = Sha256::digest(shape.to_string().as_bytes());
        format!("{}:listing:{}", self.prefix, hex::encode(digest))
    }

    /// Serialized page result. Cached gates are served from cache until flushed or expired.
    /// Gates with a base query always hit the store: the scope may read anything on the request.
    pub async fn list(&self, gate: &CompiledGate, request: &GateRequest) -> Result<Value, AppError> {
        let (Some(policy), Some(group)) = (&gate.cache, gate.cache_group()) else {
            return Ok(serde_json::to_value(self.executor.execute(gate, request).await?)?);
        };
        if gate.base_query.is_some() {
            debug!(entity = %gate.entity, "base query scope; listing cache bypassed");
            return Ok(serde_json::to_value(self.executor.execute(gate, request).await?)?);
        }
        let key = self.cache_key(gate, request);
        if let Some(hit) = self.cache.get(&key).await? {
            debug!(entity = %gate.entity, key = %key, "listing cache hit");
            return Ok(hit);
        }
        debug!(entity = %gate.entity, key = %key, "listing cache miss");
        let value = serde_json::to_value(self.executor.execute(gate, request).await?)?;
        let ttl = Duration::from_secs(policy.ttl);
        self.cache.put(&key, value.clone(), ttl).await?;
        self.groups.register(&group, &key, Some(ttl)).await?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::gate::QueryGate;
    use crate::policy::Actor;
    use crate::query::PaginationDefaults;
    use crate::sql::{Comparison, ValueKind};
    use crate::sql::QueryBuilder;
    use crate::service::RuleValidator;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn cached_listing_survives_writes_until_flushed() {
        let store = Arc::new(MemoryStore::new());
        store.seed("posts", vec![json!({"title": "Alpha"})]);
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let groups = CacheGroups::new(cache.clone(), "query-gate");
        let executor = QueryExecutor::new(store.clone(), Arc::new(RuleValidator), PaginationDefaults::default());
        let service = ListingService::new(executor, cache, groups.clone(), "query-gate");
        let gate = QueryGate::make("Post")
            .cache(60)
            .cache_name("posts-index")
            .build()
            .unwrap()
            .compiled(None)
            .unwrap();
        let request = GateRequest::default();

        let first = service.list(&gate, &request).await.unwrap();
        assert_eq!(first["total"], 1);
        assert_eq!(groups.keys("posts-index").await.unwrap(), vec![service.cache_key(&gate, &request)]);

        store.seed("posts", vec![json!({"title": "Beta"})]);
        assert_eq!(service.list(&gate, &request).await.unwrap()["total"], 1);

        groups.flush("posts-index").await.unwrap();
        assert_eq!(service.list(&gate, &request).await.unwrap()["total"], 2);
    }

    #[test]
    fn keys_differ_by_request_shape() {
        let store = Arc::new(MemoryStore::new());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let executor = QueryExecutor::new(store, Arc::new(RuleValidator), PaginationDefaults::default());
        let service = ListingService::new(executor, cache.clone(), CacheGroups::new(cache, "p"), "p");
        let gate = QueryGate::make("Post").build().unwrap().compiled(None).unwrap();
        let a = GateRequest::default();
        let b = GateRequest {
            sort: Some("title".into()),
            ..GateRequest::default()
        };
        assert_ne!(service.cache_key(&gate, &a), service.cache_key(&gate, &b));
        assert_eq!(service.cache_key(&gate, &a), service.cache_key(&gate, &a.clone()));
    }

    #[tokio::test]
    async fn actor_scoped_gate_never_serves_another_actors_rows() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            "posts",
            vec![
                json!({"title": "Mine", "author_id": "7"}),
                json!({"title": "Theirs", "author_id": "8"}),
            ],
        );
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let groups = CacheGroups::new(cache.clone(), "query-gate");
        let executor = QueryExecutor::new(store, Arc::new(RuleValidator), PaginationDefaults::default());
        let service = ListingService::new(executor, cache, groups.clone(), "query-gate");
        let gate = QueryGate::make("Post")
            .cache(60)
            .base_query(|q, request| {
                let author = request.actor.as_ref().map(|a| a.id.clone()).unwrap_or_default();
                q.where_compare("author_id", Comparison::Eq, json!(author), ValueKind::Text);
                None
            })
            .build()
            .unwrap()
            .compiled(None)
            .unwrap();

        let as_actor = |id: &str| GateRequest {
            actor: Some(Actor::new(id)),
            ..GateRequest::default()
        };
        let seven = service.list(&gate, &as_actor("7")).await.unwrap();
        let eight = service.list(&gate, &as_actor("8")).await.unwrap();
        assert_eq!(seven["total"], 1);
        assert_eq!(seven["data"][0]["title"], "Mine");
        assert_eq!(eight["total"], 1);
        assert_eq!(eight["data"][0]["title"], "Theirs");
        assert!(groups.keys(&gate.cache_group().unwrap()).await.unwrap().is_empty());
    }

    #[test]
    fn keys_differ_by_actor() {
        let store = Arc::new(MemoryStore::new());
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let executor = QueryExecutor::new(store, Arc::new(RuleValidator), PaginationDefaults::default());
        let service = ListingService::new(executor, cache.clone(), CacheGroups::new(cache, "p"), "p");
        let gate = QueryGate::make("Post").cache(60).build().unwrap().compiled(None).unwrap();
        let seven = GateRequest {
            actor: Some(Actor::new("7")),
            ..GateRequest::default()
        };
        let eight = GateRequest {
            actor: Some(Actor::new("8")),
            ..GateRequest::default()
        };
        assert_ne!(service.cache_key(&gate, &seven), service.cache_key(&gate, &eight));
        assert_ne!(service.cache_key(&gate, &seven), service.cache_key(&gate, &GateRequest::default()));
    }
}
