//! Load gate configuration from JSON or YAML and turn it into built gates.

use crate::config::resolved::GateRegistry;
use crate::config::types::{FullConfig, GateConfig, VersionConfig};
use crate::config::validate;
use crate::error::ConfigError;
use crate::gate::{ActionDefinition, OverlayFields, QueryGate};
use crate::query::PaginationMode;
use std::path::Path;

/// Parse a config file. `.yaml`/`.yml` files are read as YAML, everything else as JSON.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let config = if yaml {
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?
    } else {
        load_from_str(&text)?
    };
    tracing::info!(path = %path.display(), "gate config loaded");
    Ok(config)
}

pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

fn apply_version(mut overlay: OverlayFields, version: &VersionConfig) -> OverlayFields {
    if let Some(filters) = &version.filters {
        overlay.filters = Some(filters.clone());
    }
    if let Some(operators) = &version.allowed_operators {
        overlay.operators = Some(operators.clone());
    }
    if let Some(select) = &version.select {
        overlay.select = Some(select.clone());
    }
    if let Some(sorts) = &version.sorts {
        overlay.sorts = Some(sorts.clone());
    }
    if let Some(actions) = &version.actions {
        overlay.actions = Some(
            actions
                .iter()
                .map(|(name, config)| ActionDefinition::from_config(name, config.as_ref()))
                .collect(),
        );
    }
    overlay
}

/// Builder equivalent of one config entry. Closure-backed features are not expressible here.
pub fn gate_from_config(config: &GateConfig) -> Result<QueryGate, ConfigError> {
    let mut gate = QueryGate::make(config.entity.clone());
    if let Some(alias) = &config.alias {
        gate = gate.alias(alias.clone());
    }
    if let Some(table) = &config.table {
        gate = gate.table(table.clone());
    }
    if let Some(pk) = &config.primary_key {
        gate = gate.primary_key(pk.clone());
    }
    for name in &config.middleware {
        gate = gate.middleware(name.clone());
    }
    if let Some(filters) = &config.filters {
        gate = gate.filters(filters.iter().map(|(field, rules)| (field.to_string(), rules.to_vec())));
    }
    for (field, operators) in config.allowed_operators.iter().flatten() {
        gate = gate.allowed_operators(field.clone(), operators);
    }
    if let Some(select) = &config.select {
        gate = gate.select(select.clone());
    }
    if let Some(sorts) = &config.sorts {
        gate = gate.sorts(sorts.clone());
    }
    if let Some(mode) = &config.pagination {
        gate = gate.pagination(mode.parse::<PaginationMode>()?);
    }
    if let Some(cache) = &config.cache {
        gate = gate.cache(cache.ttl);
        if let Some(name) = &cache.name {
            gate = gate.cache_name(name.clone());
        }
    }
    for (name, action) in config.actions.iter().flatten() {
        gate = gate.action(ActionDefinition::from_config(name, action.as_ref()));
    }
    for version in &config.versions {
        gate = gate.version(version.id.clone(), |overlay| apply_version(overlay, version));
    }
    if let Some(default) = &config.default_version {
        gate = gate.default_version(default.clone());
    }
    Ok(gate)
}

/// Validate, build every gate and register it.
pub fn resolve(config: &FullConfig) -> Result<GateRegistry, ConfigError> {
    validate(config)?;
    let mut registry = GateRegistry::new();
    for entry in &config.gates {
        registry.register(gate_from_config(entry)?.build()?)?;
    }
    tracing::info!(gates = registry.len(), "gates resolved");
    Ok(registry)
}
