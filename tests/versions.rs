mod common;

use axum::http::StatusCode;
use common::{app, get, send};
use query_gate::{GateRegistry, Gated, MemoryStore, QueryGate};
use serde_json::json;
use std::sync::Arc;

struct Post;

impl Gated for Post {
    const ENTITY: &'static str = "Post";

    fn gate() -> QueryGate {
        QueryGate::make(Self::ENTITY)
            .alias("posts")
            .version("2024-01-01", |v| v.filter("title", "string"))
            .version("2024-06-01", |v| v.filter("status", "string"))
    }
}

fn setup() -> axum::Router {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "posts",
        vec![json!({"title": "Alpha", "status": "draft"}), json!({"title": "Beta", "status": "published"})],
    );
    app(GateRegistry::new().with::<Post>().unwrap(), store).0
}

#[test]
fn latest_version_is_the_default_and_exposes_status() {
    let def = Post::definition().unwrap();
    let latest = def.compiled(None).unwrap();
    assert_eq!(latest.version.as_deref(), Some("2024-06-01"));
    assert_eq!(latest.filter_fields(), vec!["title", "status"]);

    let older = def.compiled(Some("2024-01-01")).unwrap();
    assert_eq!(older.filter_fields(), vec!["title"]);

    let entry = def.changelog().iter().find(|e| e.version == "2024-06-01").unwrap();
    assert!(entry.changes.contains(&"Added filter: status".to_string()));
}

#[tokio::test]
async fn requests_select_versions_by_parameter_or_header() {
    let app = setup();

    let (status, body) = get(&app, "/query/posts?filter[status]=draft").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = get(&app, "/query/posts?filter[status]=draft&version=2024-01-01").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let request = axum::http::Request::builder()
        .uri("/query/posts?filter[status]=draft")
        .header("x-query-version", "2024-01-01")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.clone(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = get(&app, "/query/posts?version=1999-01-01").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn changelog_route_lists_versions_in_order() {
    let app = setup();
    let (status, body) = get(&app, "/query/posts/changelog").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["default_version"], "2024-06-01");
    assert_eq!(body["data"][0]["version"], "2024-01-01");
    assert_eq!(body["data"][1]["version"], "2024-06-01");
    assert_eq!(body["data"][1]["changes"], json!(["Added filter: status"]));

    let (status, _) = send(&app, "POST", "/query/posts/changelog", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}
