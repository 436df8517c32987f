//! Query-builder abstraction and parameterized PostgreSQL rendering.
//! Identifiers are always quoted; values always travel as bound parameters.

use crate::sql::params::{PgBindValue, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Column name -> SQL type used to cast bound parameters (e.g. `"pg_catalog"."int4"`).
pub type ColumnTypes = HashMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    fn sql(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "<>",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        field: String,
        op: Comparison,
        value: Value,
        kind: ValueKind,
    },
    Null {
        field: String,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Value>,
        kind: ValueKind,
    },
    Between {
        field: String,
        low: Value,
        high: Value,
        kind: ValueKind,
    },
    Like {
        field: String,
        pattern: String,
    },
    Any(Vec<Predicate>),
    All(Vec<Predicate>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderClause {
    pub field: String,
    pub direction: SortDirection,
}

/// Operations the appliers issue against a query. Object-safe so raw filters can receive `&mut dyn QueryBuilder`.
pub trait QueryBuilder: Send {
    fn push_predicate(&mut self, predicate: Predicate);
    fn order_by(&mut self, field: &str, direction: SortDirection);
    fn select(&mut self, columns: &[String]);

    fn where_compare(&mut self, field: &str, op: Comparison, value: Value, kind: ValueKind) {
        self.push_predicate(Predicate::Compare {
            field: field.to_string(),
            op,
            value,
            kind,
        });
    }

    fn where_null(&mut self, field: &str) {
        self.push_predicate(Predicate::Null {
            field: field.to_string(),
            negated: false,
        });
    }

    fn where_not_null(&mut self, field: &str) {
        self.push_predicate(Predicate::Null {
            field: field.to_string(),
            negated: true,
        });
    }

    fn where_in(&mut self, field: &str, values: Vec<Value>, kind: ValueKind) {
        self.push_predicate(Predicate::In {
            field: field.to_string(),
            values,
            kind,
        });
    }

    fn where_between(&mut self, field: &str, low: Value, high: Value, kind: ValueKind) {
        self.push_predicate(Predicate::Between {
            field: field.to_string(),
            low,
            high,
            kind,
        });
    }

    fn where_like(&mut self, field: &str, pattern: &str) {
        self.push_predicate(Predicate::Like {
            field: field.to_string(),
            pattern: pattern.to_string(),
        });
    }
}

/// A SELECT under construction. Rendered to SQL by the Postgres store, evaluated directly by the memory store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectQuery {
    pub columns: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub orders: Vec<OrderClause>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl QueryBuilder for SelectQuery {
    fn push_predicate(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    fn order_by(&mut self, field: &str, direction: SortDirection) {
        self.orders.push(OrderClause {
            field: field.to_string(),
            direction,
        });
    }

    fn select(&mut self, columns: &[String]) {
        self.columns = columns.to_vec();
    }
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: PgBindValue) -> usize {
        self.params.push(v);
        self.params.len()
    }

    fn placeholder(&mut self, field: &str, value: &Value, kind: ValueKind, types: &ColumnTypes) -> String {
        let n = self.push_param(PgBindValue::from_kind(value, kind));
        if kind == ValueKind::Json {
            return format!("${}::jsonb", n);
        }
        if !field.contains('.') {
            if let Some(ty) = types.get(field) {
                return format!("${}::{}", n, ty);
            }
            return format!("${}", n);
        }
        match kind.cast() {
            Some(cast) => format!("${}::{}", n, cast),
            None => format!("${}", n),
        }
    }
}

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// `schema.table` or `table`, each part quoted.
pub fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

fn json_key(segment: &str) -> String {
    format!("'{}'", segment.replace('\'', "''"))
}

/// Expression for a field. Dotted paths address nested JSON: `"meta"->>'lang'`.
fn column_expr(field: &str, kind: ValueKind) -> String {
    let mut parts = field.split('.');
    let head = quoted(parts.next().unwrap_or_default());
    let rest: Vec<&str> = parts.collect();
    if kind == ValueKind::Json {
        if rest.is_empty() {
            return format!("to_jsonb({})", head);
        }
        let path: String = rest.iter().map(|s| format!("->{}", json_key(s))).collect();
        return format!("to_jsonb({}{})", head, path);
    }
    if rest.is_empty() {
        return head;
    }
    let mut expr = head;
    for (i, segment) in rest.iter().enumerate() {
        let arrow = if i + 1 == rest.len() { "->>" } else { "->" };
        expr.push_str(arrow);
        expr.push_str(&json_key(segment));
    }
    match kind.cast() {
        Some(cast) => format!("({})::{}", expr, cast),
        None => expr,
    }
}

/// Select-list expression: dotted paths keep their JSON value and are aliased to the path.
fn select_expr(column: &str) -> String {
    if !column.contains('.') {
        return quoted(column);
    }
    let mut parts = column.split('.');
    let mut expr = quoted(parts.next().unwrap_or_default());
    for segment in parts {
        expr.push_str("->");
        expr.push_str(&json_key(segment));
    }
    format!("{} AS {}", expr, quoted(column))
}

fn render_predicate(p: &Predicate, q: &mut QueryBuf, types: &ColumnTypes) -> String {
    match p {
        Predicate::Compare { field, op, value, kind } => {
            let ph = q.placeholder(field, value, *kind, types);
            format!("{} {} {}", column_expr(field, *kind), op.sql(), ph)
        }
        Predicate::Null { field, negated } => {
            let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
            format!("{} {}", column_expr(field, ValueKind::Text), test)
        }
        Predicate::In { field, values, kind } => {
            if values.is_empty() {
                return "1 = 0".to_string();
            }
            let placeholders: Vec<String> = values
                .iter()
                .map(|v| q.placeholder(field, v, *kind, types))
                .collect();
            format!("{} IN ({})", column_expr(field, *kind), placeholders.join(", "))
        }
        Predicate::Between { field, low, high, kind } => {
            let lo = q.placeholder(field, low, *kind, types);
            let hi = q.placeholder(field, high, *kind, types);
            format!("{} BETWEEN {} AND {}", column_expr(field, *kind), lo, hi)
        }
        Predicate::Like { field, pattern } => {
            let n = q.push_param(PgBindValue::String(pattern.clone()));
            let expr = column_expr(field, ValueKind::Text);
            if field.contains('.') {
                format!("{} LIKE ${}", expr, n)
            } else {
                format!("{}::text LIKE ${}", expr, n)
            }
        }
        Predicate::Any(inner) => group(inner, " OR ", "1 = 0", q, types),
        Predicate::All(inner) => group(inner, " AND ", "1 = 1", q, types),
    }
}

fn group(inner: &[Predicate], joiner: &str, empty: &str, q: &mut QueryBuf, types: &ColumnTypes) -> String {
    if inner.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = inner.iter().map(|p| render_predicate(p, q, types)).collect();
    format!("({})", parts.join(joiner))
}

fn where_clause(predicates: &[Predicate], q: &mut QueryBuf, types: &ColumnTypes) -> String {
    if predicates.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = predicates.iter().map(|p| render_predicate(p, q, types)).collect();
    format!(" WHERE {}", parts.join(" AND "))
}

impl SelectQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// SELECT with WHERE, ORDER BY and optional LIMIT/OFFSET.
    pub fn to_sql(&self, table: &str, types: &ColumnTypes) -> QueryBuf {
        let mut q = QueryBuf::new();
        let cols = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.iter().map(|c| select_expr(c)).collect::<Vec<_>>().join(", ")
        };
        let where_sql = where_clause(&self.predicates, &mut q, types);
        let order_sql = if self.orders.is_empty() {
            String::new()
        } else {
            let parts: Vec<String> = self
                .orders
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        column_expr(&o.field, ValueKind::Text),
                        o.direction.as_str().to_uppercase()
                    )
                })
                .collect();
            format!(" ORDER BY {}", parts.join(", "))
        };
        let limit_sql = self.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
        let offset_sql = self.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
        q.sql = format!(
            "SELECT {} FROM {}{}{}{}{}",
            cols,
            qualified_table(table),
            where_sql,
            order_sql,
            limit_sql,
            offset_sql
        );
        q
    }

    /// COUNT(*) over the same predicates; ordering and windowing are ignored.
    pub fn to_count_sql(&self, table: &str, types: &ColumnTypes) -> QueryBuf {
        let mut q = QueryBuf::new();
        let where_sql = where_clause(&self.predicates, &mut q, types);
        q.sql = format!(
            "SELECT COUNT(*) AS \"aggregate\" FROM {}{}",
            qualified_table(table),
            where_sql
        );
        q
    }
}

fn value_placeholder(q: &mut QueryBuf, column: &str, value: &Value, types: &ColumnTypes) -> String {
    if value.is_null() {
        return "NULL".to_string();
    }
    q.placeholder(column, value, ValueKind::Text, types)
}

/// INSERT of the given attributes, returning the stored row.
pub fn insert(table: &str, attributes: &Map<String, Value>, types: &ColumnTypes) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(table);
    if attributes.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table);
        return q;
    }
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, value) in attributes {
        cols.push(quoted(name));
        placeholders.push(value_placeholder(&mut q, name, value, types));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        table,
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE by key: SET only the given attributes (never the key column itself).
pub fn update(
    table: &str,
    primary_key: &str,
    key: &Value,
    attributes: &Map<String, Value>,
    types: &ColumnTypes,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let qualified = qualified_table(table);
    let mut sets = Vec::new();
    for (name, value) in attributes {
        if name == primary_key {
            continue;
        }
        let ph = value_placeholder(&mut q, name, value, types);
        sets.push(format!("{} = {}", quoted(name), ph));
    }
    if sets.is_empty() {
        let ph = q.placeholder(primary_key, key, ValueKind::Text, types);
        q.sql = format!("SELECT * FROM {} WHERE {} = {}", qualified, quoted(primary_key), ph);
        return q;
    }
    let ph = q.placeholder(primary_key, key, ValueKind::Text, types);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING *",
        qualified,
        sets.join(", "),
        quoted(primary_key),
        ph
    );
    q
}

/// DELETE by key.
pub fn delete(table: &str, primary_key: &str, key: &Value, types: &ColumnTypes) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ph = q.placeholder(primary_key, key, ValueKind::Text, types);
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(table),
        quoted(primary_key),
        ph
    );
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_filters_sorts_and_window() {
        let mut query = SelectQuery::new();
        query.where_compare("status", Comparison::Eq, json!("published"), ValueKind::Text);
        query.where_null("deleted_at");
        query.where_in("id", vec![json!(1), json!(2)], ValueKind::Integer);
        query.order_by("created_at", SortDirection::Desc);
        query.order_by("id", SortDirection::Asc);
        query.limit = Some(15);
        query.offset = Some(30);
        let q = query.to_sql("posts", &ColumnTypes::new());
        assert_eq!(
            q.sql,
            "SELECT * FROM \"posts\" WHERE \"status\" = $1 AND \"deleted_at\" IS NULL AND \"id\" IN ($2, $3) \
             ORDER BY \"created_at\" DESC, \"id\" ASC LIMIT 15 OFFSET 30"
        );
        assert_eq!(q.params[0], PgBindValue::String("published".into()));
        assert_eq!(q.params[1], PgBindValue::I64(1));
    }

    #[test]
    fn casts_placeholders_to_known_column_types() {
        let mut types = ColumnTypes::new();
        types.insert("published_at".into(), "\"pg_catalog\".\"timestamptz\"".into());
        let mut query = SelectQuery::new();
        query.where_between(
            "published_at",
            json!("2024-01-01"),
            json!("2024-02-01"),
            ValueKind::DateTime,
        );
        let q = query.to_sql("blog.posts", &types);
        assert_eq!(
            q.sql,
            "SELECT * FROM \"blog\".\"posts\" WHERE \"published_at\" BETWEEN \
             $1::\"pg_catalog\".\"timestamptz\" AND $2::\"pg_catalog\".\"timestamptz\""
        );
    }

    #[test]
    fn dotted_paths_address_json() {
        let mut query = SelectQuery::new();
        query.select(&["id".to_string(), "meta.lang".to_string()]);
        query.where_compare("meta.views", Comparison::Gt, json!("10"), ValueKind::Integer);
        query.where_like("title", "%rust%");
        let q = query.to_sql("posts", &ColumnTypes::new());
        assert_eq!(
            q.sql,
            "SELECT \"id\", \"meta\"->'lang' AS \"meta.lang\" FROM \"posts\" \
             WHERE (\"meta\"->>'views')::bigint > $1::bigint AND \"title\"::text LIKE $2"
        );
        assert_eq!(q.params[0], PgBindValue::I64(10));
    }

    #[test]
    fn keyset_groups_render_with_parentheses() {
        let mut query = SelectQuery::new();
        query.push_predicate(Predicate::Any(vec![
            Predicate::Compare {
                field: "title".into(),
                op: Comparison::Gt,
                value: json!("b"),
                kind: ValueKind::Json,
            },
            Predicate::All(vec![
                Predicate::Compare {
                    field: "title".into(),
                    op: Comparison::Eq,
                    value: json!("b"),
                    kind: ValueKind::Json,
                },
                Predicate::Compare {
                    field: "id".into(),
                    op: Comparison::Gt,
                    value: json!(4),
                    kind: ValueKind::Json,
                },
            ]),
        ]));
        let q = query.to_count_sql("posts", &ColumnTypes::new());
        assert_eq!(
            q.sql,
            "SELECT COUNT(*) AS \"aggregate\" FROM \"posts\" WHERE (to_jsonb(\"title\") > $1::jsonb OR \
             (to_jsonb(\"title\") = $2::jsonb AND to_jsonb(\"id\") > $3::jsonb))"
        );
    }

    #[test]
    fn insert_and_update_bind_values() {
        let mut attrs = Map::new();
        attrs.insert("title".into(), json!("Hello"));
        attrs.insert("summary".into(), Value::Null);
        let q = insert("posts", &attrs, &ColumnTypes::new());
        assert_eq!(
            q.sql,
            "INSERT INTO \"posts\" (\"title\", \"summary\") VALUES ($1, NULL) RETURNING *"
        );
        assert_eq!(q.params.len(), 1);

        let q = update("posts", "id", &json!(7), &attrs, &ColumnTypes::new());
        assert_eq!(
            q.sql,
            "UPDATE \"posts\" SET \"title\" = $1, \"summary\" = NULL WHERE \"id\" = $2 RETURNING *"
        );
        assert_eq!(q.params[1], PgBindValue::I64(7));
    }
}
