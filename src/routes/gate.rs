//! Gate routes mounted under the configured prefix.

use crate::handlers::gate::{action, action_on, changelog, collection, document, list_by_model, member};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub fn gate_routes(state: AppState) -> Router {
    let base = state.settings.route_base();
    let root = if base.is_empty() { "/".to_string() } else { base.clone() };
    Router::new()
        .route(&root, get(list_by_model))
        .route(&format!("{}/openapi.json", base), get(document))
        .route(&format!("{}/:alias", base), any(collection))
        .route(&format!("{}/:alias/changelog", base), get(changelog))
        .route(&format!("{}/:alias/:id", base), any(member))
        .route(&format!("{}/:alias/actions/:action", base), any(action))
        .route(&format!("{}/:alias/actions/:action/:id", base), any(action_on))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(state.settings.body_limit)),
        )
        .with_state(state)
}
