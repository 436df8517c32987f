//! In-process store: tables of JSON rows. Evaluates `SelectQuery` directly; used by tests and the demo consumer.

use super::{EntitySource, EntityStore};
use crate::error::AppError;
use crate::sql::{Comparison, Predicate, SelectQuery, SortDirection};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Default)]
struct Table {
    rows: Vec<Map<String, Value>>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table. Objects only; rows without an `id` get the next auto-increment value.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Value::Object(mut map) = row {
                match map.get("id").and_then(Value::as_i64) {
                    Some(id) => table.next_id = table.next_id.max(id),
                    None if !map.contains_key("id") => {
                        table.next_id += 1;
                        map.insert("id".into(), Value::from(table.next_id));
                    }
                    None => {}
                }
                table.rows.push(map);
            }
        }
    }

    /// Snapshot of a table in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Value> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        tables
            .get(table)
            .map(|t| t.rows.iter().cloned().map(Value::Object).collect())
            .unwrap_or_default()
    }

    fn matching(&self, table: &str, query: &SelectQuery) -> Result<Vec<Map<String, Value>>, AppError> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for row in &table.rows {
            if all_match(&query.predicates, row)? {
                out.push(row.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn fetch(&self, source: &EntitySource, query: &SelectQuery) -> Result<Vec<Value>, AppError> {
        let mut rows = self.matching(&source.table, query)?;
        if !query.orders.is_empty() {
            rows.sort_by(|a, b| {
                for order in &query.orders {
                    let ord = sort_cmp(lookup(a, &order.field), lookup(b, &order.field));
                    let ord = match order.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map(|n| n as usize).unwrap_or(usize::MAX);
        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn count(&self, source: &EntitySource, query: &SelectQuery) -> Result<u64, AppError> {
        Ok(self.matching(&source.table, query)?.len() as u64)
    }

    async fn insert(&self, source: &EntitySource, attributes: &Map<String, Value>) -> Result<Value, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(source.table.clone()).or_default();
        let mut row = attributes.clone();
        match row.get(&source.primary_key).and_then(Value::as_i64) {
            Some(id) => table.next_id = table.next_id.max(id),
            None if !row.contains_key(&source.primary_key) => {
                table.next_id += 1;
                row.insert(source.primary_key.clone(), Value::from(table.next_id));
            }
            None => {}
        }
        table.rows.push(row.clone());
        Ok(Value::Object(row))
    }

    async fn update(
        &self,
        source: &EntitySource,
        key: &Value,
        attributes: &Map<String, Value>,
    ) -> Result<Option<Value>, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get_mut(&source.table) else {
            return Ok(None);
        };
        let Some(row) = table
            .rows
            .iter_mut()
            .find(|r| loose_eq(r.get(&source.primary_key), key))
        else {
            return Ok(None);
        };
        for (name, value) in attributes {
            if name != &source.primary_key {
                row.insert(name.clone(), value.clone());
            }
        }
        Ok(Some(Value::Object(row.clone())))
    }

    async fn delete(&self, source: &EntitySource, key: &Value) -> Result<bool, AppError> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let Some(table) = tables.get_mut(&source.table) else {
            return Ok(false);
        };
        let before = table.rows.len();
        table.rows.retain(|r| !loose_eq(r.get(&source.primary_key), key));
        Ok(table.rows.len() < before)
    }
}

/// Field value, following dotted paths into nested objects.
fn lookup<'a>(row: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = row.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn project(row: Map<String, Value>, columns: &[String]) -> Value {
    if columns.is_empty() {
        return Value::Object(row);
    }
    let mut out = Map::new();
    for column in columns {
        let value = lookup(&row, column).cloned().unwrap_or(Value::Null);
        out.insert(column.clone(), value);
    }
    Value::Object(out)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Ordering between two non-null values; numeric strings compare as numbers.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Bool(x), other) | (other, Value::Bool(x)) if other.is_string() => {
            let parsed = match other.as_str().unwrap_or_default() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return None,
            };
            let ord = x.cmp(&parsed);
            Some(if matches!(a, Value::Bool(_)) { ord } else { ord.reverse() })
        }
        _ => as_number(a)?.partial_cmp(&as_number(b)?),
    }
}

fn loose_eq(a: Option<&Value>, b: &Value) -> bool {
    match a {
        Some(a) => compare(a, b) == Some(Ordering::Equal) || a == b,
        None => false,
    }
}

/// Nulls sort last ascending, as PostgreSQL does.
fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare(a, b).unwrap_or_else(|| a.to_string().cmp(&b.to_string())),
    }
}

fn like_regex(pattern: &str) -> Result<Regex, AppError> {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| AppError::BadRequest(format!("invalid like pattern: {}", e)))
}

fn text_of(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn all_match(predicates: &[Predicate], row: &Map<String, Value>) -> Result<bool, AppError> {
    for p in predicates {
        if !matches(p, row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches(p: &Predicate, row: &Map<String, Value>) -> Result<bool, AppError> {
    Ok(match p {
        Predicate::Compare { field, op, value, kind } => {
            let Some(actual) = lookup(row, field) else {
                return Ok(false);
            };
            let expected = kind.coerce(value);
            let Some(ord) = compare(actual, &expected) else {
                return Ok(false);
            };
            match op {
                Comparison::Eq => ord == Ordering::Equal,
                Comparison::Neq => ord != Ordering::Equal,
                Comparison::Lt => ord == Ordering::Less,
                Comparison::Lte => ord != Ordering::Greater,
                Comparison::Gt => ord == Ordering::Greater,
                Comparison::Gte => ord != Ordering::Less,
            }
        }
        Predicate::Null { field, negated } => {
            let is_null = lookup(row, field).map_or(true, Value::is_null);
            is_null != *negated
        }
        Predicate::In { field, values, kind } => values
            .iter()
            .any(|v| loose_eq(lookup(row, field), &kind.coerce(v))),
        Predicate::Between { field, low, high, kind } => match lookup(row, field) {
            Some(actual) => {
                let above = compare(actual, &kind.coerce(low)).is_some_and(|o| o != Ordering::Less);
                let below = compare(actual, &kind.coerce(high)).is_some_and(|o| o != Ordering::Greater);
                above && below
            }
            None => false,
        },
        Predicate::Like { field, pattern } => match lookup(row, field).filter(|v| !v.is_null()) {
            Some(actual) => like_regex(pattern)?.is_match(&text_of(actual)),
            None => false,
        },
        Predicate::Any(inner) => {
            for p in inner {
                if matches(p, row)? {
                    return Ok(true);
                }
            }
            false
        }
        Predicate::All(inner) => all_match(inner, row)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{QueryBuilder, ValueKind};
    use serde_json::json;

    fn posts() -> (MemoryStore, EntitySource) {
        let store = MemoryStore::new();
        store.seed(
            "posts",
            vec![
                json!({"id": 1, "title": "Alpha", "status": "published", "views": 10, "meta": {"lang": "en"}}),
                json!({"id": 2, "title": "Beta", "status": "draft", "views": 3, "meta": {"lang": "de"}}),
                json!({"id": 3, "title": "Gamma", "status": "published", "views": null, "meta": {"lang": "en"}}),
            ],
        );
        (store, EntitySource::new("posts", "id"))
    }

    #[tokio::test]
    async fn filters_sorts_and_projects() {
        let (store, source) = posts();
        let mut query = SelectQuery::new();
        query.where_compare("status", Comparison::Eq, json!("published"), ValueKind::Text);
        query.order_by("id", SortDirection::Desc);
        query.select(&["id".to_string(), "meta.lang".to_string()]);
        let rows = store.fetch(&source, &query).await.unwrap();
        assert_eq!(rows, vec![json!({"id": 3, "meta.lang": "en"}), json!({"id": 1, "meta.lang": "en"})]);
        assert_eq!(store.count(&source, &query).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn numeric_strings_compare_as_numbers() {
        let (store, source) = posts();
        let mut query = SelectQuery::new();
        query.where_between("views", json!("3"), json!("9"), ValueKind::Integer);
        let rows = store.fetch(&source, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], "Beta");

        let found = store.find(&source, &SelectQuery::new(), &json!("2")).await.unwrap();
        assert_eq!(found.unwrap()["title"], "Beta");
    }

    #[tokio::test]
    async fn like_and_null_predicates() {
        let (store, source) = posts();
        let mut query = SelectQuery::new();
        query.where_like("title", "%a");
        query.where_null("views");
        let rows = store.fetch(&source, &query).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 3);
    }

    #[tokio::test]
    async fn insert_update_delete() {
        let (store, source) = posts();
        let mut attrs = Map::new();
        attrs.insert("title".into(), json!("Delta"));
        let created = store.insert(&source, &attrs).await.unwrap();
        assert_eq!(created["id"], 4);

        attrs.insert("title".into(), json!("Delta 2"));
        let updated = store.update(&source, &json!(4), &attrs).await.unwrap().unwrap();
        assert_eq!(updated["title"], "Delta 2");

        assert!(store.delete(&source, &json!("4")).await.unwrap());
        assert!(!store.delete(&source, &json!(4)).await.unwrap());
        assert_eq!(store.rows("posts").len(), 3);
    }
}
