mod common;

use axum::http::StatusCode;
use common::{app, get};
use query_gate::query::{apply_filters, FilterParser, RawFilters};
use query_gate::sql::{ColumnTypes, SelectQuery};
use query_gate::{GateRegistry, Gated, MemoryStore, PaginationMode, QueryGate, RuleValidator};
use serde_json::json;
use std::sync::Arc;

struct Post;

impl Gated for Post {
    const ENTITY: &'static str = "App\\Models\\Post";

    fn gate() -> QueryGate {
        QueryGate::make(Self::ENTITY)
            .alias("posts")
            .filter("status", "required|string")
            .allowed_operators("status", ["eq"])
            .filter("views", "integer")
            .sorts(["views", "title"])
            .pagination(PaginationMode::Classic)
    }
}

fn store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "posts",
        vec![
            json!({"title": "Alpha", "status": "published", "views": 10}),
            json!({"title": "Beta", "status": "draft", "views": 3}),
            json!({"title": "Gamma", "status": "published", "views": 7}),
        ],
    );
    store
}

fn titles(body: &serde_json::Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn allowed_operator_filters_and_disallowed_one_is_ignored() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());

    let (status, body) = get(&app, "/query/posts?filter[status][eq]=published&sort=views").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["Gamma", "Alpha"]);
    assert_eq!(body["total"], 2);

    let (status, body) = get(&app, "/query/posts?filter[status][neq]=published").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
}

#[test]
fn eq_filter_renders_a_bound_where_clause() {
    let def = Post::definition().unwrap();
    let gate = def.compiled(None).unwrap();
    let mut raw = RawFilters::new();
    raw.push("status", "eq", json!("published"));
    let instructions = FilterParser::new(&gate.filters, &gate.operators, &RuleValidator)
        .parse(&raw)
        .unwrap();
    let mut query = SelectQuery::new();
    apply_filters(&mut query, &gate, &instructions);
    let rendered = query.to_sql("posts", &ColumnTypes::new());
    assert!(rendered.sql.contains(r#"WHERE "status" = $1"#), "{}", rendered.sql);
    assert_eq!(rendered.params.len(), 1);
}

#[tokio::test]
async fn model_parameter_resolves_alias_or_entity() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());

    let (status, body) = get(&app, "/query?model=posts&pagination=none").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, _) = get(&app, "/query?model=Post&pagination=none").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(&app, "/query").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _) = get(&app, "/query/comments").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn undeclared_filter_and_failed_rule_are_unprocessable() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());

    let (status, body) = get(&app, "/query/posts?filter[secret]=x").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = get(&app, "/query/posts?filter[views][eq]=many").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = get(&app, "/query/posts?filter[views][between][]=1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn classic_and_cursor_pages() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());

    let (_, body) = get(&app, "/query/posts?per_page=2&page=2&sort=title").await;
    assert_eq!(body["current_page"], 2);
    assert_eq!(body["last_page"], 2);
    assert_eq!(titles(&body), vec!["Gamma"]);

    let (_, first) = get(&app, "/query/posts?pagination=cursor&per_page=2&sort=title").await;
    assert_eq!(titles(&first), vec!["Alpha", "Beta"]);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let (_, second) = get(&app, &format!("/query/posts?pagination=cursor&per_page=2&sort=title&cursor={}", cursor)).await;
    assert_eq!(titles(&second), vec!["Gamma"]);
    assert!(second["next_cursor"].is_null());
}

#[tokio::test]
async fn sorts_outside_the_allow_list_are_dropped() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());
    let (status, body) = get(&app, "/query/posts?sort=status:desc,views:desc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["Alpha", "Gamma", "Beta"]);
}

#[tokio::test]
async fn health_routes_respond() {
    let (app, _) = app(GateRegistry::new().with::<Post>().unwrap(), store());
    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    let (_, body) = get(&app, "/ready").await;
    assert_eq!(body["gates"], 1);
}
