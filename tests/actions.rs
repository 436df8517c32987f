mod common;

use axum::http::StatusCode;
use common::{app, get, send};
use query_gate::action::ActionResponse;
use query_gate::{ActionDefinition, GateRegistry, Gated, MemoryStore, QueryGate};
use serde_json::json;
use std::sync::Arc;

struct Post;

impl Gated for Post {
    const ENTITY: &'static str = "Post";

    fn gate() -> QueryGate {
        QueryGate::make(Self::ENTITY).alias("posts").actions([
            ActionDefinition::new("create").rule("title", "required|string"),
            ActionDefinition::new("update").rule("title", "string"),
            ActionDefinition::new("delete"),
            ActionDefinition::new("publish")
                .method("PUT")
                .status(202)
                .handle(|inv| async move {
                    let mut row = inv.entity.unwrap_or_default();
                    row["status"] = json!("published");
                    Ok(ActionResponse::Entity(row))
                }),
            ActionDefinition::new("purge")
                .without_identifier()
                .handle(|_| async move { Ok(ActionResponse::Json(json!({"purged": true}))) }),
        ])
    }
}

fn setup() -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    store.seed(
        "posts",
        vec![json!({"title": "Alpha", "status": "draft"}), json!({"title": "Beta", "status": "draft"})],
    );
    let (router, _) = app(GateRegistry::new().with::<Post>().unwrap(), store.clone());
    (router, store)
}

#[tokio::test]
async fn delete_without_handler_reports_deleted() {
    let (app, store) = setup();
    let (status, body) = send(&app, "DELETE", "/query/posts/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"deleted": true}));
    assert_eq!(store.rows("posts").len(), 1);

    let (status, _) = send(&app, "DELETE", "/query/posts/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_with_missing_title_is_unprocessable() {
    let (app, store) = setup();
    let (status, body) = send(&app, "POST", "/query/posts", Some(json!({"body": "no title"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["details"]["title"].is_array());
    assert!(body["error"]["message"].as_str().unwrap().contains("title"));
    assert_eq!(store.rows("posts").len(), 2);

    let (status, body) = send(&app, "POST", "/query/posts", Some(json!({"title": "Gamma"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["title"], "Gamma");
    assert_eq!(body["data"]["id"], 3);
}

#[tokio::test]
async fn update_goes_through_the_member_route() {
    let (app, store) = setup();
    let (status, body) = send(&app, "PATCH", "/query/posts/2", Some(json!({"title": "Beta 2"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Beta 2");
    assert_eq!(store.rows("posts")[1]["title"], "Beta 2");

    let (status, _) = send(&app, "PUT", "/query/posts/2", Some(json!({"title": "x"}))).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn custom_actions_check_their_method() {
    let (app, _) = setup();
    let (status, body) = send(&app, "PUT", "/query/posts/actions/publish/1", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "published");

    let (status, _) = send(&app, "POST", "/query/posts/actions/publish/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = send(&app, "PUT", "/query/posts/actions/publish", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/query/posts/actions/purge", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"purged": true}));

    let (status, _) = send(&app, "POST", "/query/posts/actions/archive", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn non_object_body_is_bad_request() {
    let (app, _) = setup();
    let (status, _) = send(&app, "POST", "/query/posts", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/query/posts").await;
    assert_eq!(status, StatusCode::OK);
}
