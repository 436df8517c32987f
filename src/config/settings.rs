//! Runtime settings: route prefix, pagination defaults, cache prefix and document options.

use crate::query::PaginationDefaults;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Route prefix, without slashes.
    pub prefix: String,
    pub per_page: u64,
    pub max_per_page: u64,
    pub cache_prefix: String,
    /// Request body limit in bytes.
    pub body_limit: usize,
    pub openapi: OpenApiSettings,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            prefix: "query".into(),
            per_page: 15,
            max_per_page: 100,
            cache_prefix: "query-gate".into(),
            body_limit: DEFAULT_BODY_LIMIT,
            openapi: OpenApiSettings::default(),
        }
    }
}

impl GateSettings {
    /// Read `QUERY_GATE_*` variables, after loading a `.env` file when one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        let docs = OpenApiSettings::default();
        Self {
            prefix: env_or("QUERY_GATE_PREFIX", &defaults.prefix).trim_matches('/').to_string(),
            per_page: env_parse("QUERY_GATE_PER_PAGE", defaults.per_page),
            max_per_page: env_parse("QUERY_GATE_MAX_PER_PAGE", defaults.max_per_page),
            cache_prefix: env_or("QUERY_GATE_CACHE_PREFIX", &defaults.cache_prefix),
            body_limit: env_parse("QUERY_GATE_BODY_LIMIT", defaults.body_limit),
            openapi: OpenApiSettings {
                title: env_or("QUERY_GATE_DOCS_TITLE", &docs.title),
                version: env_or("QUERY_GATE_DOCS_VERSION", &docs.version),
                output: std::env::var("QUERY_GATE_DOCS_OUTPUT").ok(),
                format: env_or("QUERY_GATE_DOCS_FORMAT", &docs.format),
                ..docs
            },
        }
    }

    pub fn pagination_defaults(&self) -> PaginationDefaults {
        PaginationDefaults {
            per_page: self.per_page,
            max_per_page: self.max_per_page,
        }
    }

    /// `/{prefix}` with a leading slash, or empty when mounted at the root.
    pub fn route_base(&self) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", prefix)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenApiSettings {
    pub title: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<ServerSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,
    /// Export target path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// `json` or `yaml`.
    pub format: String,
    /// Document modifiers applied in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,
}

impl Default for OpenApiSettings {
    fn default() -> Self {
        Self {
            title: "Query Gate API".into(),
            version: "1.0.0".into(),
            description: None,
            servers: Vec::new(),
            auth: None,
            output: None,
            format: "json".into(),
            modifiers: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Security scheme: `http` (bearer/basic), `apiKey` or `oauth2`. Other types produce no scheme.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `header`, `query` or `cookie`.
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Raw OAuth2 flow definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flows: Option<Value>,
}
