//! Per-request input shared by the read and write paths.

use crate::policy::Actor;
use crate::query::RawFilters;
use axum::http::{header, HeaderMap, Method};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Header selecting a gate version when the `version` parameter is absent.
pub const VERSION_HEADER: &str = "x-query-version";

#[derive(Clone, Debug)]
pub struct GateRequest {
    pub method: Method,
    pub filters: RawFilters,
    pub sort: Option<String>,
    pub per_page: Option<i64>,
    pub page: Option<u64>,
    pub cursor: Option<String>,
    pub pagination: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    /// Query parameters not consumed above.
    pub params: BTreeMap<String, String>,
    pub headers: HeaderMap,
    pub actor: Option<Actor>,
    pub payload: Map<String, Value>,
    pub expects_json: bool,
}

impl Default for GateRequest {
    fn default() -> Self {
        Self {
            method: Method::GET,
            filters: RawFilters::new(),
            sort: None,
            per_page: None,
            page: None,
            cursor: None,
            pagination: None,
            version: None,
            model: None,
            params: BTreeMap::new(),
            headers: HeaderMap::new(),
            actor: None,
            payload: Map::new(),
            expects_json: true,
        }
    }
}

/// `filter[status][in][]` -> ("filter", ["status", "in", ""]).
fn bracket_segments(key: &str) -> Option<(&str, Vec<&str>)> {
    let open = key.find('[')?;
    let base = &key[..open];
    let mut rest = &key[open..];
    let mut segments = Vec::new();
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped.find(']')?;
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    rest.is_empty().then_some((base, segments))
}

fn non_blank(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_string())
}

pub fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(non_blank)
        .map(Actor::new)
}

impl GateRequest {
    /// Parse a raw query string (`filter[..]`, `sort`, `per_page`, ...).
    pub fn from_query(query: &str) -> Self {
        let mut request = GateRequest::default();
        // (field, operator, values, array form)
        let mut filters: Vec<(String, String, Vec<Value>, bool)> = Vec::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            if let Some(("filter", segments)) = bracket_segments(&key) {
                let (field, operator, array) = match segments.as_slice() {
                    [field] => (*field, "eq", false),
                    [field, ""] => (*field, "eq", true),
                    [field, op] => (*field, *op, false),
                    [field, op, ""] => (*field, *op, true),
                    _ => {
                        tracing::debug!(key = %key, "ignoring malformed filter parameter");
                        continue;
                    }
                };
                let value = Value::String(value.into_owned());
                match filters.iter_mut().find(|(f, o, _, _)| f == field && o == operator) {
                    Some(entry) if array => {
                        entry.2.push(value);
                        entry.3 = true;
                    }
                    Some(entry) => entry.2 = vec![value],
                    None => filters.push((field.to_string(), operator.to_string(), vec![value], array)),
                }
                continue;
            }
            match &*key {
                "sort" => request.sort = non_blank(&value),
                "per_page" => request.per_page = value.trim().parse().ok(),
                "page" => request.page = value.trim().parse().ok(),
                "cursor" => request.cursor = non_blank(&value),
                "pagination" => request.pagination = non_blank(&value),
                "version" => request.version = non_blank(&value),
                "model" => request.model = non_blank(&value),
                _ => {
                    request.params.insert(key.to_string(), value.to_string());
                }
            }
        }
        for (field, operator, mut values, array) in filters {
            let value = if array {
                Value::Array(values)
            } else {
                values.pop().unwrap_or(Value::Null)
            };
            request.filters.push(field, operator, value);
        }
        request
    }

    /// Attach method and headers: actor, version header and JSON expectations.
    pub fn with_headers(mut self, method: Method, headers: HeaderMap) -> Self {
        self.method = method;
        self.actor = actor_from_headers(&headers);
        if self.version.is_none() {
            self.version = headers
                .get(VERSION_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(non_blank);
        }
        self.expects_json = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("json") || accept.contains("*/*"));
        self.headers = headers;
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Normalized read-path parameters and the actor, stable across parameter order. Used for cache keys.
    pub fn cache_fingerprint(&self) -> Value {
        serde_json::json!({
            "actor": self.actor.as_ref().map(|a| a.id.as_str()),
            "filters": self.filters.to_json(),
            "sort": self.sort,
            "per_page": self.per_page,
            "page": self.page,
            "cursor": self.cursor,
            "pagination": self.pagination,
            "params": self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn parses_filters_and_controls() {
        let req = GateRequest::from_query(
            "filter%5Bstatus%5D%5Beq%5D=published&filter[id][in][]=1&filter[id][in][]=2\
             &filter[title]=Hi&sort=created_at:desc&per_page=5&page=2&pagination=classic&utm=x",
        );
        assert_eq!(
            req.filters.to_json(),
            json!({
                "status": {"eq": "published"},
                "id": {"in": ["1", "2"]},
                "title": {"eq": "Hi"}
            })
        );
        assert_eq!(req.sort.as_deref(), Some("created_at:desc"));
        assert_eq!(req.per_page, Some(5));
        assert_eq!(req.page, Some(2));
        assert_eq!(req.params.get("utm").map(String::as_str), Some("x"));
    }

    #[test]
    fn headers_supply_actor_and_version() {
        let mut headers = HeaderMap::new();
        headers.insert(ACTOR_HEADER, HeaderValue::from_static(" u7 "));
        headers.insert(VERSION_HEADER, HeaderValue::from_static("2024-01-01"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let req = GateRequest::from_query("").with_headers(Method::DELETE, headers);
        assert_eq!(req.actor, Some(Actor::new("u7")));
        assert_eq!(req.version.as_deref(), Some("2024-01-01"));
        assert!(req.expects_json);

        let req = GateRequest::from_query("version=v2").with_headers(Method::GET, HeaderMap::new());
        assert_eq!(req.version.as_deref(), Some("v2"));
        assert!(!req.expects_json);
    }

    #[test]
    fn bracket_parsing_rejects_garbage() {
        assert_eq!(bracket_segments("filter[a][b]"), Some(("filter", vec!["a", "b"])));
        assert_eq!(bracket_segments("filter[a"), None);
        assert_eq!(bracket_segments("filter[a]x"), None);
        assert_eq!(bracket_segments("plain"), None);
    }
}
