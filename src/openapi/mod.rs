//! API documentation: generation, modifier chain and export.

mod export;
mod extender;
mod generator;

pub use export::{export_document, DocumentFormat};
pub use extender::{DocumentModifier, ModifierRegistry};
pub use generator::{field_schema, gate_metadata, generate, prune_empty, rules_schema, DocumentNames};

use crate::config::{GateRegistry, GateSettings};
use crate::error::AppError;
use serde_json::Value;

/// Generate, then run the configured modifier chain.
pub fn build_document(
    gates: &GateRegistry,
    settings: &GateSettings,
    modifiers: &ModifierRegistry,
) -> Result<Value, AppError> {
    let document = generate(gates, settings)?;
    Ok(modifiers.extend(document, gates, settings))
}
