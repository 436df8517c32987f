//! Offset and keyset pagination on top of any `EntityStore`.

use super::{EntitySource, EntityStore};
use crate::error::AppError;
use crate::sql::{Comparison, OrderClause, Predicate, QueryBuilder, SelectQuery, SortDirection, ValueKind};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LengthAwarePage {
    pub data: Vec<Value>,
    pub current_page: u64,
    pub per_page: u64,
    pub total: u64,
    pub last_page: u64,
    pub from: Option<u64>,
    pub to: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CursorPage {
    pub data: Vec<Value>,
    pub per_page: u64,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// What the query executor hands back: a page structure, or a bare list for `none`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageResult {
    Classic(LengthAwarePage),
    Cursor(CursorPage),
    All(Vec<Value>),
}

impl PageResult {
    pub fn rows(&self) -> &[Value] {
        match self {
            PageResult::Classic(p) => &p.data,
            PageResult::Cursor(p) => &p.data,
            PageResult::All(rows) => rows,
        }
    }
}

/// Unbounded fetch.
pub async fn get(store: &dyn EntityStore, source: &EntitySource, query: SelectQuery) -> Result<Vec<Value>, AppError> {
    store.fetch(source, &query).await
}

pub async fn paginate(
    store: &dyn EntityStore,
    source: &EntitySource,
    mut query: SelectQuery,
    per_page: u64,
    page: u64,
) -> Result<LengthAwarePage, AppError> {
    let per_page = per_page.max(1);
    let page = page.max(1);
    let total = store.count(source, &query).await?;
    let offset = (page - 1) * per_page;
    query.limit = Some(per_page);
    query.offset = Some(offset);
    let data = store.fetch(source, &query).await?;
    let last_page = total.div_ceil(per_page).max(1);
    let (from, to) = if data.is_empty() {
        (None, None)
    } else {
        (Some(offset + 1), Some(offset + data.len() as u64))
    };
    Ok(LengthAwarePage {
        data,
        current_page: page,
        per_page,
        total,
        last_page,
        from,
        to,
    })
}

/// Opaque position: ordering values of a boundary row plus the direction to read in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Cursor {
    values: Vec<Value>,
    next: bool,
}

impl Cursor {
    fn encode(&self) -> Result<String, AppError> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    fn decode(token: &str) -> Result<Self, AppError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| AppError::BadRequest("invalid cursor".into()))?;
        serde_json::from_slice(&bytes).map_err(|_| AppError::BadRequest("invalid cursor".into()))
    }
}

/// Keyset predicate: rows strictly after `values` under `orders`.
fn after(orders: &[OrderClause], values: &[Value]) -> Predicate {
    let mut branches = Vec::with_capacity(orders.len());
    for (i, order) in orders.iter().enumerate() {
        let mut all: Vec<Predicate> = orders[..i]
            .iter()
            .zip(values)
            .map(|(o, v)| Predicate::Compare {
                field: o.field.clone(),
                op: Comparison::Eq,
                value: v.clone(),
                kind: ValueKind::Json,
            })
            .collect();
        let op = match order.direction {
            SortDirection::Asc => Comparison::Gt,
            SortDirection::Desc => Comparison::Lt,
        };
        all.push(Predicate::Compare {
            field: order.field.clone(),
            op,
            value: values.get(i).cloned().unwrap_or(Value::Null),
            kind: ValueKind::Json,
        });
        branches.push(Predicate::All(all));
    }
    Predicate::Any(branches)
}

fn boundary(row: &Value, orders: &[OrderClause], next: bool) -> Result<String, AppError> {
    let values = orders
        .iter()
        .map(|o| row.get(&o.field).cloned().unwrap_or(Value::Null))
        .collect();
    Cursor { values, next }.encode()
}

/// Keyset pagination. The primary key is appended to the ordering so positions are unique.
pub async fn cursor_paginate(
    store: &dyn EntityStore,
    source: &EntitySource,
    mut query: SelectQuery,
    per_page: u64,
    cursor: Option<&str>,
) -> Result<CursorPage, AppError> {
    let per_page = per_page.max(1);
    if !query.orders.iter().any(|o| o.field == source.primary_key) {
        query.order_by(&source.primary_key, SortDirection::Asc);
    }
    let orders = query.orders.clone();

    // Ordering columns must be fetched to build cursors; extras are stripped before returning.
    let mut extra_columns = Vec::new();
    if !query.columns.is_empty() {
        for o in &orders {
            if !query.columns.contains(&o.field) {
                query.columns.push(o.field.clone());
                extra_columns.push(o.field.clone());
            }
        }
    }

    let cursor = cursor.map(Cursor::decode).transpose()?;
    let backwards = cursor.as_ref().is_some_and(|c| !c.next);
    if backwards {
        for o in &mut query.orders {
            o.direction = o.direction.reversed();
        }
    }
    if let Some(c) = &cursor {
        let walk: Vec<OrderClause> = query.orders.clone();
        query.push_predicate(after(&walk, &c.values));
    }
    query.limit = Some(per_page + 1);
    query.offset = None;

    let mut data = store.fetch(source, &query).await?;
    let has_more = data.len() as u64 > per_page;
    data.truncate(per_page as usize);
    if backwards {
        data.reverse();
    }

    let (next_cursor, prev_cursor) = match (&cursor, data.first(), data.last()) {
        (_, Some(first), Some(last)) => {
            let next = if backwards || has_more {
                Some(boundary(last, &orders, true)?)
            } else {
                None
            };
            let prev = if (cursor.is_some() && !backwards) || (backwards && has_more) {
                Some(boundary(first, &orders, false)?)
            } else {
                None
            };
            (next, prev)
        }
        _ => (None, None),
    };

    if !extra_columns.is_empty() {
        for row in &mut data {
            if let Value::Object(map) = row {
                for column in &extra_columns {
                    map.remove(column);
                }
            }
        }
    }

    Ok(CursorPage {
        data,
        per_page,
        next_cursor,
        prev_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn store() -> (MemoryStore, EntitySource) {
        let store = MemoryStore::new();
        store.seed("posts", (1..=5).map(|i| json!({"id": i, "title": format!("Post {}", i)})));
        (store, EntitySource::new("posts", "id"))
    }

    #[tokio::test]
    async fn offset_pagination_reports_window() {
        let (store, source) = store();
        let page = paginate(&store, &source, SelectQuery::new(), 2, 3).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.last_page, 3);
        assert_eq!(page.from, Some(5));
        assert_eq!(page.to, Some(5));
        assert_eq!(page.data.len(), 1);

        let empty = paginate(&store, &source, SelectQuery::new(), 2, 9).await.unwrap();
        assert!(empty.data.is_empty());
        assert_eq!(empty.from, None);
    }

    #[tokio::test]
    async fn cursor_walks_forward_and_back() {
        let (store, source) = store();
        let mut query = SelectQuery::new();
        query.select(&["title".to_string()]);

        let first = cursor_paginate(&store, &source, query.clone(), 2, None).await.unwrap();
        assert_eq!(first.data, vec![json!({"title": "Post 1"}), json!({"title": "Post 2"})]);
        assert!(first.prev_cursor.is_none());
        let next = first.next_cursor.clone().unwrap();

        let second = cursor_paginate(&store, &source, query.clone(), 2, Some(&next)).await.unwrap();
        assert_eq!(second.data[0]["title"], "Post 3");
        let prev = second.prev_cursor.clone().unwrap();

        let back = cursor_paginate(&store, &source, query, 2, Some(&prev)).await.unwrap();
        assert_eq!(back.data, first.data);
        assert!(back.prev_cursor.is_none());
        assert!(back.next_cursor.is_some());
    }

    #[tokio::test]
    async fn malformed_cursor_is_bad_request() {
        let (store, source) = store();
        let err = cursor_paginate(&store, &source, SelectQuery::new(), 2, Some("%%%"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
