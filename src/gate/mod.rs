//! Gate definitions: the declarative exposure contract for one entity type.
//!
//! A [`QueryGate`] builder is finalized once into an immutable [`GateDefinition`].
//! Every declared version is resolved into its own [`CompiledGate`] at build
//! time, so requests only pick a precompiled snapshot.

mod action;
mod builder;
mod version;

pub use action::{ActionDefinition, ActionKind, AuthorizeFn, CompiledAction, Rules};
pub use builder::{GateDefinition, Gated, QueryGate};
pub use version::{ChangelogEntry, OverlayFields, VersionOverlay};

use crate::query::{FilterInstruction, OperatorMap, PaginationMode};
use crate::request::GateRequest;
use crate::service::RuleMap;
use crate::sql::{QueryBuilder, SelectQuery, ValueKind};
use crate::store::EntitySource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Transform applied before filters. Mutate in place and return `None`, or return a replacement query.
pub type BaseQueryFn = Arc<dyn Fn(&mut SelectQuery, &GateRequest) -> Option<SelectQuery> + Send + Sync>;

/// Custom predicate builder for one filter field.
pub type RawFilterFn = Arc<dyn Fn(&mut dyn QueryBuilder, &FilterInstruction) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Seconds; always positive.
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CachePolicy {
    /// Invalidation group for the entity.
    pub fn group(&self, entity: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("query-gate:{}", entity))
    }
}

/// One version of a gate, ready for the executors.
#[derive(Clone)]
pub struct CompiledGate {
    pub entity: String,
    pub alias: Option<String>,
    pub version: Option<String>,
    pub source: EntitySource,
    pub middleware: Vec<String>,
    pub filters: RuleMap,
    pub operators: OperatorMap,
    pub raw_filters: BTreeMap<String, RawFilterFn>,
    pub select: Vec<String>,
    pub sorts: Vec<String>,
    pub pagination: PaginationMode,
    pub cache: Option<CachePolicy>,
    pub actions: Vec<CompiledAction>,
    pub base_query: Option<BaseQueryFn>,
}

impl CompiledGate {
    pub fn action(&self, name: &str) -> Option<&CompiledAction> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn cache_group(&self) -> Option<String> {
        self.cache.as_ref().map(|c| c.group(&self.entity))
    }

    /// Value typing for a filter field, from its declared rules.
    pub fn kind_for(&self, field: &str) -> ValueKind {
        self.filters
            .get(field)
            .map(ValueKind::from_rules)
            .unwrap_or_default()
    }

    /// Declared filter fields, rule-bearing first, then raw-only fields.
    pub fn filter_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = self.filters.keys().collect();
        for field in self.raw_filters.keys() {
            if !fields.contains(&field.as_str()) {
                fields.push(field.as_str());
            }
        }
        fields
    }
}

impl std::fmt::Debug for CompiledGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledGate")
            .field("entity", &self.entity)
            .field("alias", &self.alias)
            .field("version", &self.version)
            .field("source", &self.source)
            .field("filters", &self.filters)
            .field("operators", &self.operators)
            .field("raw_filters", &self.raw_filters.keys().collect::<Vec<_>>())
            .field("select", &self.select)
            .field("sorts", &self.sorts)
            .field("pagination", &self.pagination)
            .field("cache", &self.cache)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}
