//! Post-processing chain over a generated document.

use crate::config::{GateRegistry, GateSettings};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub trait DocumentModifier: Send + Sync {
    fn modify(&self, document: Value, gates: &GateRegistry, settings: &GateSettings) -> Value;
}

impl<F> DocumentModifier for F
where
    F: Fn(Value, &GateRegistry, &GateSettings) -> Value + Send + Sync,
{
    fn modify(&self, document: Value, gates: &GateRegistry, settings: &GateSettings) -> Value {
        self(document, gates, settings)
    }
}

/// Modifiers by name; `settings.openapi.modifiers` picks which run and in what order.
#[derive(Clone, Default)]
pub struct ModifierRegistry {
    modifiers: HashMap<String, Arc<dyn DocumentModifier>>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, modifier: impl DocumentModifier + 'static) -> Self {
        self.modifiers.insert(name.into(), Arc::new(modifier));
        self
    }

    /// Run the configured chain. A modifier that returns a non-object resets the document to `{}`.
    pub fn extend(&self, mut document: Value, gates: &GateRegistry, settings: &GateSettings) -> Value {
        for name in &settings.openapi.modifiers {
            let Some(modifier) = self.modifiers.get(name) else {
                tracing::debug!(modifier = %name, "ignoring unknown document modifier");
                continue;
            };
            document = modifier.modify(document, gates, settings);
            if !document.is_object() {
                tracing::warn!(modifier = %name, "document modifier returned a non-object; resetting document");
                document = json!({});
            }
        }
        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(modifiers: &[&str]) -> GateSettings {
        let mut settings = GateSettings::default();
        settings.openapi.modifiers = modifiers.iter().map(|m| m.to_string()).collect();
        settings
    }

    #[test]
    fn applies_in_configured_order_and_skips_unknown() {
        let registry = ModifierRegistry::new()
            .register("stamp", |mut doc: Value, _: &GateRegistry, _: &GateSettings| {
                doc["x-stamp"] = json!("a");
                doc
            })
            .register("restamp", |mut doc: Value, _: &GateRegistry, _: &GateSettings| {
                let prev = doc["x-stamp"].as_str().unwrap_or_default().to_string();
                doc["x-stamp"] = json!(format!("{}b", prev));
                doc
            });
        let doc = registry.extend(
            json!({"openapi": "3.1.0"}),
            &GateRegistry::new(),
            &settings(&["stamp", "missing", "restamp"]),
        );
        assert_eq!(doc["x-stamp"], "ab");
    }

    #[test]
    fn non_object_result_resets_document() {
        let registry = ModifierRegistry::new()
            .register("broken", |_: Value, _: &GateRegistry, _: &GateSettings| Value::Null)
            .register("tag", |mut doc: Value, _: &GateRegistry, _: &GateSettings| {
                doc["tagged"] = json!(true);
                doc
            });
        let doc = registry.extend(
            json!({"openapi": "3.1.0"}),
            &GateRegistry::new(),
            &settings(&["broken", "tag"]),
        );
        assert_eq!(doc, json!({"tagged": true}));
    }
}
