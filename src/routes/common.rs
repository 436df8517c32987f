//! Common routes: health, readiness, version.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::time::Duration;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    gates: usize,
    cache: &'static str,
}

const READY_PROBE_KEY: &str = "ready-probe";

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn ready(State(state): State<AppState>) -> Result<Json<ReadyBody>, (StatusCode, Json<ReadyBody>)> {
    let key = format!("{}:{}", state.settings.cache_prefix, READY_PROBE_KEY);
    let probe = state
        .cache
        .put(&key, serde_json::Value::Bool(true), Duration::from_secs(5))
        .await;
    if let Err(e) = probe {
        tracing::warn!(error = %e, "cache unavailable");
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                gates: state.gates.len(),
                cache: "unavailable",
            }),
        ));
    }
    Ok(Json(ReadyBody {
        status: "ok",
        gates: state.gates.len(),
        cache: "ok",
    }))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, /ready, /version.
pub fn common_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}
