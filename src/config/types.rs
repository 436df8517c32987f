//! Raw config types matching the JSON gate file: settings plus one entry per exposed entity.

use crate::config::GateSettings;
use crate::gate::CachePolicy;
use crate::service::RuleMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn is_false(b: &bool) -> bool {
    !*b
}

/// One action entry. `null` in the file means "all defaults".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<RuleMap>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub abilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_identifier: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Closures only exist on programmatic gates; reported, never loaded.
    #[serde(default, skip_deserializing, skip_serializing_if = "is_false")]
    pub has_handler: bool,
    #[serde(default, skip_deserializing, skip_serializing_if = "is_false")]
    pub has_authorize: bool,
}

/// A version overlay: only the fields it sets replace the previous state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionConfig {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RuleMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_operators: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub raw_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<BTreeMap<String, Option<ActionConfig>>>,
}

/// Serializable form of a gate definition. Unset fields are omitted on output.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub middleware: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<RuleMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_operators: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub raw_filters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CachePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<BTreeMap<String, Option<ActionConfig>>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<VersionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,
    #[serde(default, skip_deserializing, skip_serializing_if = "is_false")]
    pub base_query: bool,
}

/// Everything in one struct: the file format of `load_from_path`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub settings: GateSettings,
    #[serde(default)]
    pub gates: Vec<GateConfig>,
}
