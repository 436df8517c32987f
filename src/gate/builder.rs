//! `QueryGate` builder and the immutable `GateDefinition` it produces.

use super::action::{ActionDefinition, Rules};
use super::version::{diff, ChangelogEntry, OverlayFields, VersionOverlay};
use super::{BaseQueryFn, CachePolicy, CompiledGate};
use crate::case::{base_name, default_table};
use crate::config::{ActionConfig, GateConfig, VersionConfig};
use crate::error::{AppError, ConfigError};
use crate::query::{FilterInstruction, FilterOperator, OperatorMap, PaginationMode};
use crate::request::GateRequest;
use crate::sql::{QueryBuilder, SelectQuery};
use crate::store::EntitySource;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fluent builder. Nothing is validated until [`QueryGate::build`].
#[derive(Clone)]
pub struct QueryGate {
    entity: String,
    alias: Option<String>,
    table: Option<String>,
    primary_key: Option<String>,
    base_query: Option<BaseQueryFn>,
    middleware: Vec<String>,
    fields: OverlayFields,
    pagination: Option<PaginationMode>,
    cache_ttl: Option<u64>,
    cache_name: Option<String>,
    before_versions: Option<OverlayFields>,
    versions: Vec<(String, OverlayFields)>,
    default_version: Option<String>,
}

impl QueryGate {
    pub fn make(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into().trim().to_string(),
            alias: None,
            table: None,
            primary_key: None,
            base_query: None,
            middleware: Vec::new(),
            fields: OverlayFields::default(),
            pagination: None,
            cache_ttl: None,
            cache_name: None,
            before_versions: None,
            versions: Vec::new(),
            default_version: None,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into().trim().to_string();
        self.alias = (!alias.is_empty()).then_some(alias);
        self
    }

    /// Storage table; defaults to the snake-cased plural of the entity base name.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }

    pub fn base_query<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut SelectQuery, &GateRequest) -> Option<SelectQuery> + Send + Sync + 'static,
    {
        self.base_query = Some(Arc::new(f));
        self
    }

    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.middleware.push(name.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, rules: impl Into<Rules>) -> Self {
        self.fields = self.fields.filter(field, rules);
        self
    }

    pub fn filters<I, K, R>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Into<Rules>,
    {
        self.fields = self.fields.filters(filters);
        self
    }

    pub fn allowed_operators<I, S>(mut self, field: impl Into<String>, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fields = self.fields.allowed_operators(field, operators);
        self
    }

    pub fn raw_filter<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &FilterInstruction) + Send + Sync + 'static,
    {
        self.fields = self.fields.raw_filter(field, f);
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = self.fields.select(columns);
        self
    }

    pub fn sorts<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = self.fields.sorts(fields);
        self
    }

    pub fn action(mut self, action: ActionDefinition) -> Self {
        self.fields = self.fields.action(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = ActionDefinition>) -> Self {
        self.fields = self.fields.actions(actions);
        self
    }

    pub fn pagination(mut self, mode: PaginationMode) -> Self {
        self.pagination = Some(mode);
        self
    }

    /// Cache list results for `ttl` seconds.
    pub fn cache(mut self, ttl: u64) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Invalidation group name; defaults to `query-gate:{entity}`.
    pub fn cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = Some(name.into());
        self
    }

    /// Declare a version. The overlay starts from the state at this point; its result becomes the
    /// snapshot for `id` and the state later declarations build on.
    pub fn version<F>(mut self, id: impl Into<String>, overlay: F) -> Self
    where
        F: FnOnce(VersionOverlay) -> VersionOverlay,
    {
        if self.before_versions.is_none() {
            self.before_versions = Some(self.fields.clone());
        }
        let snapshot = overlay(self.fields.clone());
        self.fields = snapshot.clone();
        self.versions.push((id.into().trim().to_string(), snapshot));
        self
    }

    /// Version served when a request does not ask for one. Defaults to the last declared.
    pub fn default_version(mut self, id: impl Into<String>) -> Self {
        self.default_version = Some(id.into());
        self
    }

    pub fn build(self) -> Result<GateDefinition, ConfigError> {
        if self.entity.is_empty() {
            return Err(ConfigError::EmptyEntity);
        }
        let cache = match (self.cache_ttl, &self.cache_name) {
            (Some(0), _) | (None, Some(_)) => {
                return Err(ConfigError::InvalidCacheTtl {
                    entity: self.entity.clone(),
                })
            }
            (Some(ttl), name) => Some(CachePolicy {
                ttl,
                name: name.clone(),
            }),
            (None, None) => None,
        };
        let source = EntitySource::new(
            self.table.clone().unwrap_or_else(|| default_table(&self.entity)),
            self.primary_key.clone().unwrap_or_else(|| "id".to_string()),
        );
        for name in &self.middleware {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    entity: self.entity.clone(),
                    section: "middleware",
                });
            }
        }

        let mut seen = Vec::new();
        for (id, _) in &self.versions {
            if id.is_empty() || seen.contains(&id) {
                return Err(ConfigError::DuplicateVersion {
                    entity: self.entity.clone(),
                    version: id.clone(),
                });
            }
            seen.push(id);
        }
        if let Some(default) = &self.default_version {
            if !self.versions.iter().any(|(id, _)| id == default) {
                return Err(ConfigError::UnknownDefaultVersion {
                    entity: self.entity.clone(),
                    version: default.clone(),
                });
            }
        }

        let base = Arc::new(self.compile(&self.fields, None, &source, cache.clone())?);
        let mut compiled_versions = Vec::with_capacity(self.versions.len());
        let mut changelog = Vec::with_capacity(self.versions.len());
        let mut previous = self.before_versions.clone().unwrap_or_default();
        for (id, snapshot) in &self.versions {
            compiled_versions.push((
                id.clone(),
                Arc::new(self.compile(snapshot, Some(id), &source, cache.clone())?),
            ));
            changelog.push(ChangelogEntry {
                version: id.clone(),
                changes: diff(&previous, snapshot),
            });
            previous = snapshot.clone();
        }
        tracing::debug!(entity = %self.entity, versions = self.versions.len(), "gate built");

        Ok(GateDefinition {
            gate: self,
            source,
            cache,
            base,
            compiled_versions,
            changelog,
        })
    }

    fn compile(
        &self,
        fields: &OverlayFields,
        version: Option<&str>,
        source: &EntitySource,
        cache: Option<CachePolicy>,
    ) -> Result<CompiledGate, ConfigError> {
        let empty = |section: &'static str| ConfigError::EmptyField {
            entity: self.entity.clone(),
            section,
        };
        let filters = fields.filters.clone().unwrap_or_default();
        if filters.keys().any(|f| f.trim().is_empty()) {
            return Err(empty("filters"));
        }
        let mut operators = OperatorMap::new();
        for (field, tokens) in fields.operators.iter().flatten() {
            if field.trim().is_empty() {
                return Err(empty("allowed_operators"));
            }
            let mut ops = Vec::with_capacity(tokens.len());
            for token in tokens {
                let op = FilterOperator::parse(token).ok_or_else(|| ConfigError::UnsupportedOperator {
                    field: field.clone(),
                    operator: token.clone(),
                })?;
                if !ops.contains(&op) {
                    ops.push(op);
                }
            }
            operators.insert(field.clone(), ops);
        }
        let raw_filters = fields.raw_filters.clone().unwrap_or_default();
        if raw_filters.keys().any(|f| f.trim().is_empty()) {
            return Err(empty("raw_filters"));
        }
        let select = fields.select.clone().unwrap_or_default();
        if select.iter().any(|c| c.trim().is_empty()) {
            return Err(empty("select"));
        }
        let sorts = fields.sorts.clone().unwrap_or_default();
        if sorts.iter().any(|c| c.trim().is_empty()) {
            return Err(empty("sorts"));
        }
        let actions = fields
            .actions
            .iter()
            .flatten()
            .map(ActionDefinition::compile)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledGate {
            entity: self.entity.clone(),
            alias: self.alias.clone(),
            version: version.map(str::to_string),
            source: source.clone(),
            middleware: self.middleware.clone(),
            filters,
            operators,
            raw_filters,
            select,
            sorts,
            pagination: self.pagination.unwrap_or_default(),
            cache,
            actions,
            base_query: self.base_query.clone(),
        })
    }
}

/// Entity types that expose themselves through a gate.
pub trait Gated {
    const ENTITY: &'static str;

    fn gate() -> QueryGate;

    fn definition() -> Result<GateDefinition, ConfigError> {
        Self::gate().build()
    }
}

/// Immutable, built gate: the base state plus every version compiled ahead of time.
#[derive(Clone)]
pub struct GateDefinition {
    gate: QueryGate,
    source: EntitySource,
    cache: Option<CachePolicy>,
    base: Arc<CompiledGate>,
    compiled_versions: Vec<(String, Arc<CompiledGate>)>,
    changelog: Vec<ChangelogEntry>,
}

impl GateDefinition {
    pub fn entity(&self) -> &str {
        &self.gate.entity
    }

    pub fn alias(&self) -> Option<&str> {
        self.gate.alias.as_deref()
    }

    /// Entity base name, used when no alias is set.
    pub fn base_name(&self) -> &str {
        base_name(&self.gate.entity)
    }

    pub fn source(&self) -> &EntitySource {
        &self.source
    }

    pub fn middleware(&self) -> &[String] {
        &self.gate.middleware
    }

    pub fn cache(&self) -> Option<&CachePolicy> {
        self.cache.as_ref()
    }

    /// Version identifiers in declaration order.
    pub fn versions(&self) -> Vec<&str> {
        self.compiled_versions.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Explicit default, else the last declared version.
    pub fn default_version(&self) -> Option<&str> {
        self.gate
            .default_version
            .as_deref()
            .or_else(|| self.compiled_versions.last().map(|(id, _)| id.as_str()))
    }

    /// Compiled gate for a requested version; the default when none is asked for.
    pub fn compiled(&self, version: Option<&str>) -> Result<Arc<CompiledGate>, AppError> {
        let wanted = match version {
            Some(v) => Some(v),
            None => self.default_version(),
        };
        match wanted {
            None => Ok(self.base.clone()),
            Some(v) => self
                .compiled_versions
                .iter()
                .find(|(id, _)| id == v)
                .map(|(_, gate)| gate.clone())
                .ok_or_else(|| AppError::BadRequest(format!("unknown version '{}' for {}", v, self.gate.entity))),
        }
    }

    /// Compiled gates for every version (or just the base when unversioned).
    pub fn all_compiled(&self) -> Vec<Arc<CompiledGate>> {
        if self.compiled_versions.is_empty() {
            return vec![self.base.clone()];
        }
        self.compiled_versions.iter().map(|(_, g)| g.clone()).collect()
    }

    pub fn changelog(&self) -> &[ChangelogEntry] {
        &self.changelog
    }

    /// Plain serializable form: every explicitly set field, nothing else.
    pub fn to_config(&self) -> GateConfig {
        let g = &self.gate;
        let (filters, allowed_operators, raw_filters, select, sorts, actions) = overlay_config(
            g.before_versions.as_ref().unwrap_or(&g.fields),
        );
        GateConfig {
            entity: g.entity.clone(),
            alias: g.alias.clone(),
            table: g.table.clone(),
            primary_key: g.primary_key.clone(),
            middleware: g.middleware.clone(),
            filters,
            allowed_operators,
            raw_filters,
            select,
            sorts,
            pagination: g.pagination.map(|p| p.as_str().to_string()),
            cache: self.cache.clone(),
            actions,
            versions: g
                .versions
                .iter()
                .map(|(id, snapshot)| {
                    let (filters, allowed_operators, raw_filters, select, sorts, actions) = overlay_config(snapshot);
                    VersionConfig {
                        id: id.clone(),
                        filters,
                        allowed_operators,
                        raw_filters,
                        select,
                        sorts,
                        actions,
                    }
                })
                .collect(),
            default_version: g.default_version.clone(),
            base_query: g.base_query.is_some(),
        }
    }
}

type OverlayConfig = (
    Option<crate::service::RuleMap>,
    Option<BTreeMap<String, Vec<String>>>,
    Vec<String>,
    Option<Vec<String>>,
    Option<Vec<String>>,
    Option<BTreeMap<String, Option<ActionConfig>>>,
);

fn overlay_config(fields: &OverlayFields) -> OverlayConfig {
    (
        fields.filters.clone(),
        fields.operators.clone(),
        fields
            .raw_filters
            .as_ref()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default(),
        fields.select.clone(),
        fields.sorts.clone(),
        fields.actions.as_ref().map(|actions| {
            actions
                .iter()
                .map(|a| {
                    let config = a.to_config();
                    let config = (config != ActionConfig::default()).then_some(config);
                    (a.name.clone(), config)
                })
                .collect()
        }),
    )
}

impl std::fmt::Debug for GateDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GateDefinition")
            .field("entity", &self.gate.entity)
            .field("alias", &self.gate.alias)
            .field("source", &self.source)
            .field("versions", &self.versions())
            .finish_non_exhaustive()
    }
}
