//! Shared application state for all gate routes.

use crate::action::ActionExecutor;
use crate::cache::{CacheGroups, CacheStore, MemoryCache};
use crate::config::{GateRegistry, GateSettings};
use crate::error::ConfigError;
use crate::middleware::MiddlewareRegistry;
use crate::openapi::ModifierRegistry;
use crate::policy::{AllowAll, PolicyChecker};
use crate::query::QueryExecutor;
use crate::service::{ListingService, RuleValidator, Validator};
use crate::store::EntityStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub gates: Arc<GateRegistry>,
    pub settings: Arc<GateSettings>,
    pub store: Arc<dyn EntityStore>,
    pub cache: Arc<dyn CacheStore>,
    pub groups: CacheGroups,
    pub middleware: Arc<MiddlewareRegistry>,
    pub modifiers: Arc<ModifierRegistry>,
    pub listing: ListingService,
    pub actions: ActionExecutor,
}

impl AppState {
    pub fn builder(gates: GateRegistry, store: Arc<dyn EntityStore>) -> AppStateBuilder {
        AppStateBuilder {
            gates,
            store,
            settings: GateSettings::default(),
            cache: None,
            validator: Arc::new(RuleValidator),
            policy: Arc::new(AllowAll),
            middleware: MiddlewareRegistry::new(),
            modifiers: ModifierRegistry::new(),
        }
    }
}

/// Collaborators default to the in-process cache, [`RuleValidator`] and [`AllowAll`].
pub struct AppStateBuilder {
    gates: GateRegistry,
    store: Arc<dyn EntityStore>,
    settings: GateSettings,
    cache: Option<Arc<dyn CacheStore>>,
    validator: Arc<dyn Validator>,
    policy: Arc<dyn PolicyChecker>,
    middleware: MiddlewareRegistry,
    modifiers: ModifierRegistry,
}

impl AppStateBuilder {
    pub fn settings(mut self, settings: GateSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyChecker>) -> Self {
        self.policy = policy;
        self
    }

    pub fn middleware(mut self, middleware: MiddlewareRegistry) -> Self {
        self.middleware = middleware;
        self
    }

    pub fn modifiers(mut self, modifiers: ModifierRegistry) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Fails when a gate names middleware nobody registered.
    pub fn build(self) -> Result<AppState, ConfigError> {
        self.middleware.check(&self.gates)?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>);
        let groups = CacheGroups::new(cache.clone(), self.settings.cache_prefix.clone());
        let executor = QueryExecutor::new(
            self.store.clone(),
            self.validator.clone(),
            self.settings.pagination_defaults(),
        );
        let listing = ListingService::new(executor, cache.clone(), groups.clone(), self.settings.cache_prefix.clone());
        let actions = ActionExecutor::new(self.store.clone(), self.validator, self.policy).with_cache_groups(groups.clone());
        tracing::info!(gates = self.gates.len(), prefix = %self.settings.prefix, "query gate state ready");
        Ok(AppState {
            gates: Arc::new(self.gates),
            settings: Arc::new(self.settings),
            store: self.store,
            cache,
            groups,
            middleware: Arc::new(self.middleware),
            modifiers: Arc::new(self.modifiers),
            listing,
            actions,
        })
    }
}
