//! Entity storage: the data-store collaborator behind the query and action executors.

mod memory;
mod pagination;
mod postgres;

pub use memory::MemoryStore;
pub use pagination::{cursor_paginate, get, paginate, CursorPage, LengthAwarePage, PageResult};
pub use postgres::PgStore;

use crate::error::AppError;
use crate::sql::{Comparison, QueryBuilder, SelectQuery, ValueKind};
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Where an entity's rows live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntitySource {
    pub table: String,
    pub primary_key: String,
}

impl EntitySource {
    pub fn new(table: impl Into<String>, primary_key: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: primary_key.into(),
        }
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Rows matching the query, ordered and windowed as the query says.
    async fn fetch(&self, source: &EntitySource, query: &SelectQuery) -> Result<Vec<Value>, AppError>;

    /// Number of rows matching the query's predicates.
    async fn count(&self, source: &EntitySource, query: &SelectQuery) -> Result<u64, AppError>;

    /// Persist a new row and return it as stored.
    async fn insert(&self, source: &EntitySource, attributes: &Map<String, Value>) -> Result<Value, AppError>;

    /// Update the row with the given key; `None` when it no longer exists.
    async fn update(
        &self,
        source: &EntitySource,
        key: &Value,
        attributes: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError>;

    /// Delete by key; true when a row was removed.
    async fn delete(&self, source: &EntitySource, key: &Value) -> Result<bool, AppError>;

    async fn first(&self, source: &EntitySource, query: &SelectQuery) -> Result<Option<Value>, AppError> {
        let mut query = query.clone();
        query.limit = Some(1);
        query.offset = None;
        Ok(self.fetch(source, &query).await?.into_iter().next())
    }

    /// Look a row up by primary key on top of an already-scoped query.
    async fn find(
        &self,
        source: &EntitySource,
        query: &SelectQuery,
        key: &Value,
    ) -> Result<Option<Value>, AppError> {
        let mut query = query.clone();
        query.where_compare(&source.primary_key, Comparison::Eq, key.clone(), ValueKind::Text);
        self.first(source, &query).await
    }
}
