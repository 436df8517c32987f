//! Entity storage against PostgreSQL via sqlx.

use super::{EntitySource, EntityStore};
use crate::error::AppError;
use crate::sql::{delete, insert, update, ColumnTypes, QueryBuf, SelectQuery};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

pub struct PgStore {
    pool: PgPool,
    /// Column types per table, loaded from information_schema on first use.
    column_types: RwLock<HashMap<String, Arc<ColumnTypes>>>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            column_types: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn types_for(&self, table: &str) -> Result<Arc<ColumnTypes>, AppError> {
        if let Some(types) = self
            .column_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
        {
            return Ok(types.clone());
        }
        let (schema, name) = table.split_once('.').unwrap_or(("public", table));
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name::text, udt_schema::text, udt_name::text \
             FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(schema)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        let types: ColumnTypes = rows
            .into_iter()
            .map(|(column, udt_schema, udt_name)| (column, format!("\"{}\".\"{}\"", udt_schema, udt_name)))
            .collect();
        tracing::debug!(table = %table, columns = types.len(), "loaded column types");
        let types = Arc::new(types);
        self.column_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(table.to_string(), types.clone());
        Ok(types)
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn query_optional(&self, q: &QueryBuf) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let row = query.fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn fetch(&self, source: &EntitySource, query: &SelectQuery) -> Result<Vec<Value>, AppError> {
        let types = self.types_for(&source.table).await?;
        self.query_many(&query.to_sql(&source.table, &types)).await
    }

    async fn count(&self, source: &EntitySource, query: &SelectQuery) -> Result<u64, AppError> {
        let types = self.types_for(&source.table).await?;
        let q = query.to_count_sql(&source.table, &types);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut count = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            count = count.bind(p.clone());
        }
        let total = count.fetch_one(&self.pool).await?;
        Ok(total.max(0) as u64)
    }

    async fn insert(&self, source: &EntitySource, attributes: &Map<String, Value>) -> Result<Value, AppError> {
        let types = self.types_for(&source.table).await?;
        self.query_optional(&insert(&source.table, attributes, &types))
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(
        &self,
        source: &EntitySource,
        key: &Value,
        attributes: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let types = self.types_for(&source.table).await?;
        self.query_optional(&update(&source.table, &source.primary_key, key, attributes, &types))
            .await
    }

    async fn delete(&self, source: &EntitySource, key: &Value) -> Result<bool, AppError> {
        let types = self.types_for(&source.table).await?;
        let q = delete(&source.table, &source.primary_key, key, &types);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(p.clone());
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    Value::Object(map)
}

/// Decode a cell by trying the common PostgreSQL types in turn.
fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
