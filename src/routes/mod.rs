//! Route builders.

pub mod common;
pub mod gate;

pub use common::common_routes;
pub use gate::gate_routes;

use crate::state::AppState;
use axum::Router;

/// Gate routes plus the common health routes.
pub fn router(state: AppState) -> Router {
    gate_routes(state.clone()).merge(common_routes(state))
}
