//! Query Gate: declarative query exposure for entity types.
//!
//! A gate declares which filters, operators, sorts, columns and actions an
//! entity exposes. Requests are parsed against it, shaped into store queries
//! and served as filterable, sortable, paginated endpoints with an OpenAPI
//! document derived from the same definitions.

pub mod action;
pub mod cache;
pub mod case;
pub mod config;
pub mod error;
pub mod extractors;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod policy;
pub mod query;
pub mod request;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use action::{ActionExecutor, ActionHandler, ActionInvocation, ActionOutcome, ActionResponse};
pub use cache::{CacheGroups, CacheStore, MemoryCache};
pub use config::{load_from_path, resolve, validate, FullConfig, GateRegistry, GateSettings};
pub use error::{AppError, ConfigError, ValidationErrors};
pub use gate::{ActionDefinition, CompiledGate, GateDefinition, Gated, QueryGate, VersionOverlay};
pub use middleware::{GateMiddleware, MiddlewareRegistry};
pub use openapi::{build_document, export_document, DocumentFormat, ModifierRegistry};
pub use policy::{Actor, AllowAll, PolicyChecker, PolicyRegistry};
pub use query::{PaginationMode, QueryExecutor};
pub use request::GateRequest;
pub use routes::{common_routes, gate_routes, router};
pub use service::{ListingService, RuleValidator, Validator};
pub use state::AppState;
pub use store::{EntitySource, EntityStore, MemoryStore, PgStore};
