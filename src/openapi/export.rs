//! Document rendering and file export.

use crate::error::{AppError, ConfigError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DocumentFormat {
    #[default]
    Json,
    Yaml,
}

impl FromStr for DocumentFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(DocumentFormat::Json),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl DocumentFormat {
    pub fn render(self, document: &Value) -> Result<String, AppError> {
        match self {
            DocumentFormat::Json => Ok(serde_json::to_string_pretty(document)?),
            DocumentFormat::Yaml => serde_yaml::to_string(document)
                .map_err(|e| AppError::Config(ConfigError::Load(format!("yaml encode: {}", e)))),
        }
    }
}

/// Write the rendered document, creating parent directories as needed.
pub fn export_document(document: &Value, path: impl AsRef<Path>, format: DocumentFormat) -> Result<PathBuf, AppError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format.render(document)?)?;
    tracing::info!(path = %path.display(), format = ?format, "document exported");
    Ok(path.to_path_buf())
}
