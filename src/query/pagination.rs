//! Pagination mode and page-size resolution.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    #[default]
    Classic,
    Cursor,
    None,
}

impl PaginationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PaginationMode::Classic => "classic",
            PaginationMode::Cursor => "cursor",
            PaginationMode::None => "none",
        }
    }

    /// Lenient form for request input: anything unrecognised is classic.
    pub fn normalize(token: Option<&str>) -> Self {
        token
            .and_then(|t| t.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for PaginationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" => Ok(PaginationMode::Classic),
            "cursor" => Ok(PaginationMode::Cursor),
            "none" => Ok(PaginationMode::None),
            other => Err(ConfigError::InvalidPaginationMode(other.to_string())),
        }
    }
}

impl fmt::Display for PaginationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationDefaults {
    pub per_page: u64,
    pub max_per_page: u64,
}

impl Default for PaginationDefaults {
    fn default() -> Self {
        Self {
            per_page: 15,
            max_per_page: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaginationPlan {
    #[serde(rename = "type")]
    pub mode: PaginationMode,
    pub per_page: Option<u64>,
    pub cursor: Option<String>,
}

/// Normalize a requested mode and page size against the configured defaults.
pub fn resolve(
    mode: Option<&str>,
    requested_per_page: Option<i64>,
    cursor: Option<&str>,
    defaults: PaginationDefaults,
) -> PaginationPlan {
    let mode = PaginationMode::normalize(mode);
    if mode == PaginationMode::None {
        return PaginationPlan {
            mode,
            per_page: None,
            cursor: None,
        };
    }
    let default = defaults.per_page.max(1);
    let max = defaults.max_per_page.max(default);
    let per_page = match requested_per_page {
        Some(n) if n < 1 => 1,
        Some(n) => (n as u64).min(max),
        None => default.min(max),
    };
    let cursor = match mode {
        PaginationMode::Cursor => cursor.map(str::to_string),
        _ => None,
    };
    PaginationPlan {
        mode,
        per_page: Some(per_page),
        cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_classic_with_default_size() {
        let plan = resolve(None, None, None, PaginationDefaults::default());
        assert_eq!(
            plan,
            PaginationPlan {
                mode: PaginationMode::Classic,
                per_page: Some(15),
                cursor: None
            }
        );
    }

    #[test]
    fn cursor_mode_clamps_and_keeps_token() {
        let plan = resolve(Some("cursor"), Some(500), Some("abc"), PaginationDefaults::default());
        assert_eq!(plan.mode, PaginationMode::Cursor);
        assert_eq!(plan.per_page, Some(100));
        assert_eq!(plan.cursor.as_deref(), Some("abc"));
    }

    #[test]
    fn none_mode_is_unbounded_and_other_modes_drop_cursor() {
        let plan = resolve(Some("none"), Some(5), Some("abc"), PaginationDefaults::default());
        assert_eq!(plan.per_page, None);
        assert_eq!(plan.cursor, None);
        let plan = resolve(Some("weird"), Some(0), Some("abc"), PaginationDefaults::default());
        assert_eq!(plan.mode, PaginationMode::Classic);
        assert_eq!(plan.per_page, Some(1));
        assert_eq!(plan.cursor, None);
    }

    #[test]
    fn max_is_floored_at_default() {
        let defaults = PaginationDefaults {
            per_page: 50,
            max_per_page: 10,
        };
        assert_eq!(resolve(None, Some(40), None, defaults).per_page, Some(40));
    }
}
