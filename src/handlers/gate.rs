//! Gate handlers: listing, actions, changelog and the API document.

use crate::config::GateRegistry;
use crate::error::AppError;
use crate::extractors::GateInput;
use crate::gate::{ActionKind, CompiledGate, GateDefinition};
use crate::openapi::build_document;
use crate::request::GateRequest;
use crate::response::success_with_meta;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

fn definition<'a>(gates: &'a GateRegistry, key: &str) -> Result<&'a GateDefinition, AppError> {
    gates
        .get(key)
        .ok_or_else(|| AppError::NotFound(format!("no query gate for '{}'", key)))
}

/// Resolve the requested version and run the gate's middleware.
fn open_gate(state: &AppState, key: &str, request: &GateRequest) -> Result<Arc<CompiledGate>, AppError> {
    let gate = definition(&state.gates, key)?.compiled(request.version.as_deref())?;
    state.middleware.run(&gate.middleware, request)?;
    Ok(gate)
}

async fn list_gate(state: &AppState, key: &str, request: GateRequest) -> Result<Response, AppError> {
    let gate = open_gate(state, key, &request)?;
    let listing = state.listing.list(&gate, &request).await?;
    Ok(Json(listing).into_response())
}

async fn run_action(
    state: &AppState,
    key: &str,
    kinds: &[ActionKind],
    identifier: Option<&str>,
    request: GateRequest,
) -> Result<Response, AppError> {
    let gate = open_gate(state, key, &request)?;
    let action = gate
        .actions
        .iter()
        .find(|a| kinds.contains(&a.kind) && a.method == request.method)
        .ok_or_else(|| {
            AppError::MethodNotAllowed(format!("{} is not supported on {}", request.method, gate.entity))
        })?;
    let name = action.name.clone();
    Ok(state.actions.execute(&gate, &name, identifier, request).await?.into_response())
}

/// `GET /{prefix}?model=posts`: the gate comes from the `model` parameter.
pub async fn list_by_model(
    State(state): State<AppState>,
    GateInput(request): GateInput,
) -> Result<Response, AppError> {
    let model = request
        .model
        .clone()
        .ok_or_else(|| AppError::BadRequest("the model parameter is required".into()))?;
    list_gate(&state, &model, request).await
}

/// `/{prefix}/{alias}`: GET lists; the create action's method creates.
pub async fn collection(
    State(state): State<AppState>,
    Path(alias): Path<String>,
    GateInput(request): GateInput,
) -> Result<Response, AppError> {
    if request.method == Method::GET {
        return list_gate(&state, &alias, request).await;
    }
    run_action(&state, &alias, &[ActionKind::Create], None, request).await
}

/// `/{prefix}/{alias}/{id}`: update or delete, picked by method.
pub async fn member(
    State(state): State<AppState>,
    Path((alias, id)): Path<(String, String)>,
    GateInput(request): GateInput,
) -> Result<Response, AppError> {
    run_action(&state, &alias, &[ActionKind::Update, ActionKind::Delete], Some(&id), request).await
}

async fn dispatch_named(
    state: &AppState,
    alias: &str,
    action: &str,
    identifier: Option<&str>,
    request: GateRequest,
) -> Result<Response, AppError> {
    let gate = open_gate(state, alias, &request)?;
    let declared = gate.action(action).ok_or_else(|| {
        AppError::MethodNotAllowed(format!("action '{}' is not available on {}", action, gate.entity))
    })?;
    if declared.method != request.method {
        return Err(AppError::MethodNotAllowed(format!(
            "action '{}' expects {}",
            action, declared.method
        )));
    }
    Ok(state.actions.execute(&gate, action, identifier, request).await?.into_response())
}

/// `/{prefix}/{alias}/actions/{action}`
pub async fn action(
    State(state): State<AppState>,
    Path((alias, action)): Path<(String, String)>,
    GateInput(request): GateInput,
) -> Result<Response, AppError> {
    dispatch_named(&state, &alias, &action, None, request).await
}

/// `/{prefix}/{alias}/actions/{action}/{id}`
pub async fn action_on(
    State(state): State<AppState>,
    Path((alias, action, id)): Path<(String, String, String)>,
    GateInput(request): GateInput,
) -> Result<Response, AppError> {
    dispatch_named(&state, &alias, &action, Some(&id), request).await
}

/// `{"data": [{version, changes}], "meta": {entity, default_version}}`
pub async fn changelog(State(state): State<AppState>, Path(alias): Path<String>) -> Result<Response, AppError> {
    let def = definition(&state.gates, &alias)?;
    let meta = json!({
        "entity": def.entity(),
        "default_version": def.default_version(),
    });
    Ok(success_with_meta(StatusCode::OK, def.changelog(), meta).into_response())
}

pub async fn document(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(build_document(&state.gates, &state.settings, &state.modifiers)?))
}
