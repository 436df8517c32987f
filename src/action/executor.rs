//! Action executor: resolve the action, resolve the entity, validate, authorize, dispatch.

use super::{ActionInvocation, ActionResponse};
use crate::cache::CacheGroups;
use crate::error::AppError;
use crate::gate::{ActionKind, CompiledAction, CompiledGate};
use crate::policy::PolicyChecker;
use crate::request::GateRequest;
use crate::service::Validator;
use crate::sql::SelectQuery;
use crate::store::EntityStore;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionStage {
    ResolveActionConfig,
    ResolveEntity,
    ValidatePayload,
    Authorize,
    Dispatch,
}

/// Handler result plus the status it is sent with.
#[derive(Debug)]
pub struct ActionOutcome {
    pub response: ActionResponse,
    pub status: StatusCode,
}

impl IntoResponse for ActionOutcome {
    fn into_response(self) -> Response {
        self.response.into_response_with(self.status)
    }
}

#[derive(Clone)]
pub struct ActionExecutor {
    store: Arc<dyn EntityStore>,
    validator: Arc<dyn Validator>,
    policy: Arc<dyn PolicyChecker>,
    groups: Option<CacheGroups>,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn EntityStore>, validator: Arc<dyn Validator>, policy: Arc<dyn PolicyChecker>) -> Self {
        Self {
            store,
            validator,
            policy,
            groups: None,
        }
    }

    /// Flush the gate's invalidation group after successful mutations.
    pub fn with_cache_groups(mut self, groups: CacheGroups) -> Self {
        self.groups = Some(groups);
        self
    }

    pub async fn execute(
        &self,
        gate: &CompiledGate,
        action_name: &str,
        identifier: Option<&str>,
        request: GateRequest,
    ) -> Result<ActionOutcome, AppError> {
        let mut stage = ActionStage::ResolveActionConfig;
        let action = gate.action(action_name).ok_or_else(|| {
            AppError::MethodNotAllowed(format!("action '{}' is not available on {}", action_name, gate.entity))
        })?;

        stage = advance(stage, ActionStage::ResolveEntity, action);
        let entity = self.resolve_entity(gate, action, identifier, &request).await?;

        stage = advance(stage, ActionStage::ValidatePayload, action);
        let payload = if action.rules.is_empty() {
            request.payload.clone()
        } else {
            self.validator.validate(&request.payload, &action.rules)?
        };

        stage = advance(stage, ActionStage::Authorize, action);
        self.authorize(action, &request, entity.as_ref())?;

        advance(stage, ActionStage::Dispatch, action);
        let key = entity
            .as_ref()
            .and_then(|e| e.get(&gate.source.primary_key))
            .cloned()
            .or_else(|| identifier.map(|id| Value::String(id.to_string())));
        let expects_json = request.expects_json;
        let response = match &action.handler {
            Some(handler) => {
                handler
                    .handle(ActionInvocation {
                        action: action.name.clone(),
                        request,
                        entity,
                        payload,
                        source: gate.source.clone(),
                        store: self.store.clone(),
                    })
                    .await?
            }
            None => self.default_handler(gate, action.kind, entity, key, &payload, expects_json).await?,
        };

        if action.kind.is_mutation() {
            if let (Some(groups), Some(group)) = (&self.groups, gate.cache_group()) {
                groups.flush(&group).await?;
            }
        }

        let status = match (&response, action.status) {
            (ActionResponse::Raw(_), _) => StatusCode::OK,
            (_, Some(status)) => status,
            (ActionResponse::NoContent, None) => StatusCode::NO_CONTENT,
            (_, None) if action.kind == ActionKind::Create => StatusCode::CREATED,
            _ => StatusCode::OK,
        };
        debug!(entity = %gate.entity, action = %action.name, status = %status, "action dispatched");
        Ok(ActionOutcome { response, status })
    }

    async fn resolve_entity(
        &self,
        gate: &CompiledGate,
        action: &CompiledAction,
        identifier: Option<&str>,
        request: &GateRequest,
    ) -> Result<Option<Value>, AppError> {
        if action.kind == ActionKind::Create || !action.requires_identifier {
            return Ok(None);
        }
        let id = identifier
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("the {} action requires an identifier", action.name)))?;
        let mut query = SelectQuery::new();
        if let Some(base) = &gate.base_query {
            if let Some(replacement) = base(&mut query, request) {
                query = replacement;
            }
        }
        self.store
            .find(&gate.source, &query, &Value::String(id.to_string()))
            .await?
            .map(Some)
            .ok_or_else(|| AppError::NotFound(format!("{} {}", gate.entity, id)))
    }

    /// The hook decides when it answers; otherwise every ability must pass.
    fn authorize(&self, action: &CompiledAction, request: &GateRequest, entity: Option<&Value>) -> Result<(), AppError> {
        let denied = || AppError::Forbidden("This action is unauthorized.".to_string());
        match action.authorize.as_ref().and_then(|hook| hook(request, entity)) {
            Some(true) => return Ok(()),
            Some(false) => return Err(denied()),
            None => {}
        }
        for ability in &action.abilities {
            if !self.policy.check(ability, request.actor.as_ref(), entity) {
                debug!(action = %action.name, ability = %ability, "policy denied");
                return Err(denied());
            }
        }
        Ok(())
    }

    async fn default_handler(
        &self,
        gate: &CompiledGate,
        kind: ActionKind,
        entity: Option<Value>,
        key: Option<Value>,
        payload: &Map<String, Value>,
        expects_json: bool,
    ) -> Result<ActionResponse, AppError> {
        let source = &gate.source;
        let not_found = || AppError::NotFound(gate.entity.clone());
        match kind {
            ActionKind::Create => Ok(ActionResponse::Entity(self.store.insert(source, payload).await?)),
            ActionKind::Update => {
                let key = key.ok_or_else(not_found)?;
                let row = self.store.update(source, &key, payload).await?.ok_or_else(not_found)?;
                Ok(ActionResponse::Entity(row))
            }
            ActionKind::Delete => {
                let key = key.ok_or_else(not_found)?;
                let deleted = self.store.delete(source, &key).await?;
                if expects_json {
                    Ok(ActionResponse::Json(json!({ "deleted": deleted })))
                } else {
                    Ok(ActionResponse::NoContent)
                }
            }
            ActionKind::Custom => Ok(ActionResponse::Entity(entity.unwrap_or(Value::Null))),
        }
    }
}

fn advance(from: ActionStage, to: ActionStage, action: &CompiledAction) -> ActionStage {
    tracing::trace!(action = %action.name, from = ?from, to = ?to, "action stage");
    to
}
