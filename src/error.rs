//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Problems detected while building or loading gate definitions. Always a server misconfiguration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid http method '{method}' for action '{action}'")]
    InvalidMethod { action: String, method: String },
    #[error("invalid status code {status} for action '{action}'")]
    InvalidStatus { action: String, status: u16 },
    #[error("action name must not be empty")]
    EmptyActionName,
    #[error("cache ttl must be a positive number of seconds on {entity}")]
    InvalidCacheTtl { entity: String },
    #[error("unknown pagination mode: {0}")]
    InvalidPaginationMode(String),
    #[error("unsupported operator '{operator}' on filter '{field}'")]
    UnsupportedOperator { field: String, operator: String },
    #[error("empty field name in {section} of {entity}")]
    EmptyField { entity: String, section: &'static str },
    #[error("entity type must not be empty")]
    EmptyEntity,
    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),
    #[error("duplicate alias: {0}")]
    DuplicateAlias(String),
    #[error("duplicate version '{version}' on {entity}")]
    DuplicateVersion { entity: String, version: String },
    #[error("unknown default version '{version}' on {entity}")]
    UnknownDefaultVersion { entity: String, version: String },
    #[error("unknown middleware: {0}")]
    UnknownMiddleware(String),
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),
    #[error("config load: {0}")]
    Load(String),
}

/// Field-keyed validation failures. The first recorded message is the headline.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    first: Option<String>,
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        let message = message.into();
        if self.first.is_none() {
            self.first = Some(message.clone());
        }
        self.errors.entry(field.into()).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn first_message(&self) -> Option<&str> {
        self.first.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&[String]> {
        self.errors.get(name).map(Vec::as_slice)
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.first_message().unwrap_or("the given data was invalid"))
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Validation(ValidationErrors),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("cache: {0}")]
    Cache(String),
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl AppError {
    /// Shorthand for a single-field validation failure (422).
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(ValidationErrors::single(field, message))
    }

    pub fn status(&self) -> StatusCode {
        self.status_and_code().0
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_error"),
            AppError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error"),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let details = match &self {
            AppError::Validation(errors) => serde_json::to_value(errors.fields()).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_message_follows_insertion_order() {
        let mut errors = ValidationErrors::new();
        errors.add("title", "The title field is required.");
        errors.add("body", "The body field must be a string.");
        assert_eq!(errors.first_message(), Some("The title field is required."));
        assert_eq!(errors.to_string(), "The title field is required.");
        assert_eq!(errors.field("body").map(<[String]>::len), Some(1));
    }

    #[test]
    fn status_mapping_matches_taxonomy() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::invalid("f", "m").status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::MethodNotAllowed("x".into()).status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            AppError::Config(ConfigError::EmptyActionName).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
