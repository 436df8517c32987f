//! Write path: action contract, handler results and the action executor.

mod executor;

pub use executor::{ActionExecutor, ActionOutcome, ActionStage};

use crate::error::AppError;
use crate::request::GateRequest;
use crate::response::success_one;
use crate::store::{EntitySource, EntityStore};
use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// What a handler produced.
pub enum ActionResponse {
    /// Wrapped in the `{"data": ...}` envelope.
    Entity(Value),
    /// Sent as-is.
    Json(Value),
    NoContent,
    /// A fully formed response, returned verbatim.
    Raw(Response),
}

impl ActionResponse {
    pub(crate) fn into_response_with(self, status: StatusCode) -> Response {
        match self {
            ActionResponse::Entity(v) => success_one(status, v).into_response(),
            ActionResponse::Json(v) => (status, Json(v)).into_response(),
            ActionResponse::NoContent => status.into_response(),
            ActionResponse::Raw(response) => response,
        }
    }
}

impl std::fmt::Debug for ActionResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionResponse::Entity(v) => f.debug_tuple("Entity").field(v).finish(),
            ActionResponse::Json(v) => f.debug_tuple("Json").field(v).finish(),
            ActionResponse::NoContent => f.write_str("NoContent"),
            ActionResponse::Raw(r) => f.debug_tuple("Raw").field(&r.status()).finish(),
        }
    }
}

/// Everything a handler may need: the resolved entity, the validated payload and store access.
pub struct ActionInvocation {
    pub action: String,
    pub request: GateRequest,
    pub entity: Option<Value>,
    pub payload: Map<String, Value>,
    pub source: EntitySource,
    pub store: Arc<dyn EntityStore>,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, invocation: ActionInvocation) -> Result<ActionResponse, AppError>;
}

/// Adapts an async closure into an [`ActionHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ActionResponse, AppError>> + Send + 'static,
{
    async fn handle(&self, invocation: ActionInvocation) -> Result<ActionResponse, AppError> {
        (self.0)(invocation).await
    }
}
