//! Gate registry: built gates, looked up by alias or entity type.

use crate::case::short_hash;
use crate::error::ConfigError;
use crate::gate::{GateDefinition, Gated};
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct GateRegistry {
    gates: Vec<GateDefinition>,
    /// Aliases, entity types and hash slugs. Unique across gates.
    by_key: HashMap<String, usize>,
    /// Base names; `None` once two gates share one.
    by_base: HashMap<String, Option<usize>>,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup keys: the alias, the full entity type, a hash slug and the base name.
    /// Aliases and entity types share one namespace; a base name shared by two gates resolves to neither.
    pub fn register(&mut self, gate: GateDefinition) -> Result<(), ConfigError> {
        let index = self.gates.len();
        let entity = gate.entity().to_string();
        if let Some(&i) = self.by_key.get(&entity) {
            return Err(if self.gates[i].entity() == entity {
                ConfigError::DuplicateEntity(entity)
            } else {
                ConfigError::DuplicateAlias(entity)
            });
        }
        if let Some(alias) = gate.alias().filter(|a| *a != entity) {
            if self.by_key.contains_key(alias) {
                return Err(ConfigError::DuplicateAlias(alias.to_string()));
            }
            self.by_key.insert(alias.to_string(), index);
        }
        self.by_key.insert(entity.clone(), index);
        self.by_key.entry(short_hash(&entity)).or_insert(index);

        let base = gate.base_name();
        if !base.is_empty() {
            let slot = self.by_base.entry(base.to_string()).or_insert(Some(index));
            if *slot != Some(index) {
                tracing::warn!(base_name = %base, entity = %entity, "base name shared by several gates; use the alias or entity type");
                *slot = None;
            }
        }
        tracing::info!(entity = %entity, alias = ?gate.alias(), "gate registered");
        self.gates.push(gate);
        Ok(())
    }

    pub fn register_gated<T: Gated>(&mut self) -> Result<(), ConfigError> {
        self.register(T::definition()?)
    }

    pub fn with<T: Gated>(mut self) -> Result<Self, ConfigError> {
        self.register_gated::<T>()?;
        Ok(self)
    }

    /// Resolve a path alias or `model` parameter.
    pub fn get(&self, key: &str) -> Option<&GateDefinition> {
        let key = key.trim();
        self.by_key
            .get(key)
            .copied()
            .or_else(|| self.by_base.get(key).copied().flatten())
            .map(|i| &self.gates[i])
    }

    /// Path segment that routes back to `gate`: the alias, else the base name when it resolves here, else a hash.
    pub fn slug(&self, gate: &GateDefinition) -> String {
        if let Some(alias) = gate.alias() {
            return alias.to_string();
        }
        let base = gate.base_name();
        if self.get(base).is_some_and(|g| g.entity() == gate.entity()) {
            base.to_string()
        } else {
            short_hash(gate.entity())
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GateDefinition> {
        self.gates.iter()
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::QueryGate;

    struct Post;

    impl Gated for Post {
        const ENTITY: &'static str = "App\\Models\\Post";

        fn gate() -> QueryGate {
            QueryGate::make(Self::ENTITY).alias("posts")
        }
    }

    #[test]
    fn resolves_by_alias_entity_and_base_name() {
        let registry = GateRegistry::new().with::<Post>().unwrap();
        assert!(registry.get("posts").is_some());
        assert!(registry.get("App\\Models\\Post").is_some());
        assert!(registry.get("Post").is_some());
        assert!(registry.get("comments").is_none());
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut registry = GateRegistry::new().with::<Post>().unwrap();
        assert!(matches!(
            registry.register_gated::<Post>(),
            Err(ConfigError::DuplicateEntity(_))
        ));
        let other = QueryGate::make("App\\Blog\\Article").alias("posts").build().unwrap();
        assert!(matches!(registry.register(other), Err(ConfigError::DuplicateAlias(_))));
    }

    #[test]
    fn aliases_and_entity_types_share_one_namespace() {
        let mut registry = GateRegistry::new().with::<Post>().unwrap();
        let shadowing_alias = QueryGate::make("App\\Models\\Comment")
            .alias("App\\Models\\Post")
            .build()
            .unwrap();
        assert!(matches!(
            registry.register(shadowing_alias),
            Err(ConfigError::DuplicateAlias(_))
        ));
        let entity_named_like_alias = QueryGate::make("posts").build().unwrap();
        assert!(matches!(
            registry.register(entity_named_like_alias),
            Err(ConfigError::DuplicateAlias(_))
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("posts").unwrap().entity(), "App\\Models\\Post");

        let by_base_name = QueryGate::make("Shop\\posts").alias("shop-posts").build().unwrap();
        registry.register(by_base_name).unwrap();
        assert_eq!(registry.get("posts").unwrap().entity(), "App\\Models\\Post");
    }

    #[test]
    fn shared_base_names_resolve_to_neither_gate() {
        let mut registry = GateRegistry::new();
        registry.register(QueryGate::make("App\\Models\\Post").build().unwrap()).unwrap();
        assert_eq!(registry.slug(registry.get("Post").unwrap()), "Post");

        registry.register(QueryGate::make("Blog\\Post").build().unwrap()).unwrap();
        assert!(registry.get("Post").is_none());

        let app = registry.get("App\\Models\\Post").unwrap();
        let blog = registry.get("Blog\\Post").unwrap();
        let (app_slug, blog_slug) = (registry.slug(app), registry.slug(blog));
        assert_ne!(app_slug, blog_slug);
        assert_eq!(registry.get(&app_slug).unwrap().entity(), "App\\Models\\Post");
        assert_eq!(registry.get(&blog_slug).unwrap().entity(), "Blog\\Post");
    }
}
