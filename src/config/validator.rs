//! Config validation: cross-gate uniqueness and settings consistency.

use crate::config::FullConfig;
use crate::error::ConfigError;
use crate::query::PaginationMode;
use std::collections::HashSet;

pub const DOCUMENT_FORMATS: [&str; 2] = ["json", "yaml"];

/// Checks that span gates. Per-gate rules are enforced when each gate is built.
pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let format = config.settings.openapi.format.to_ascii_lowercase();
    if !DOCUMENT_FORMATS.contains(&format.as_str()) {
        return Err(ConfigError::UnsupportedFormat(config.settings.openapi.format.clone()));
    }

    let mut entities = HashSet::new();
    let mut aliases = HashSet::new();
    for gate in &config.gates {
        let entity = gate.entity.trim();
        if entity.is_empty() {
            return Err(ConfigError::EmptyEntity);
        }
        if !entities.insert(entity) {
            return Err(ConfigError::DuplicateEntity(entity.to_string()));
        }
        if aliases.contains(entity) {
            return Err(ConfigError::DuplicateAlias(entity.to_string()));
        }
        if let Some(alias) = gate.alias.as_deref().map(str::trim).filter(|a| !a.is_empty() && *a != entity) {
            if entities.contains(alias) || !aliases.insert(alias) {
                return Err(ConfigError::DuplicateAlias(alias.to_string()));
            }
        }
        if let Some(mode) = &gate.pagination {
            mode.parse::<PaginationMode>()?;
        }
        if let Some(cache) = &gate.cache {
            if cache.ttl == 0 {
                return Err(ConfigError::InvalidCacheTtl {
                    entity: entity.to_string(),
                });
            }
        }
    }
    Ok(())
}
