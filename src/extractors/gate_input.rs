//! Build a [`GateRequest`] from the query string, headers and JSON body.

use crate::error::AppError;
use crate::request::GateRequest;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde_json::{Map, Value};

/// Extractor for the per-request gate input. The body, when present, must be a JSON object.
#[derive(Clone, Debug)]
pub struct GateInput(pub GateRequest);

fn payload_from_body(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::BadRequest("body must be a JSON object".into())),
        Err(e) => Err(AppError::BadRequest(format!("invalid JSON body: {}", e))),
    }
}

#[async_trait]
impl<S> FromRequest<S> for GateInput
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let headers = req.headers().clone();
        let query = req.uri().query().unwrap_or_default().to_string();
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let request = GateRequest::from_query(&query)
            .with_headers(method, headers)
            .with_payload(payload_from_body(&body)?);
        Ok(GateInput(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    #[test]
    fn empty_body_is_empty_payload() {
        assert!(payload_from_body(b"").unwrap().is_empty());
        assert!(payload_from_body(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(matches!(payload_from_body(b"[1,2]"), Err(AppError::BadRequest(_))));
        assert!(matches!(payload_from_body(b"{oops"), Err(AppError::BadRequest(_))));
        let map = payload_from_body(br#"{"title":"Hi"}"#).unwrap();
        assert_eq!(map.get("title"), Some(&json!("Hi")));
    }

    #[tokio::test]
    async fn extracts_query_headers_and_body() {
        let req = Request::builder()
            .method(Method::PATCH)
            .uri("/query/posts/1?filter[status]=draft&version=v1")
            .header("x-actor-id", "u1")
            .header("accept", "application/json")
            .body(axum::body::Body::from(r#"{"title":"New"}"#))
            .unwrap();
        let GateInput(request) = GateInput::from_request(req, &()).await.unwrap();
        assert_eq!(request.method, Method::PATCH);
        assert_eq!(request.version.as_deref(), Some("v1"));
        assert_eq!(request.actor.map(|a| a.id), Some("u1".to_string()));
        assert_eq!(request.payload.get("title"), Some(&json!("New")));
        assert!(request.expects_json);
    }
}
