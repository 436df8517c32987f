//! Rule-token validation for filter values and action payloads.

use crate::error::ValidationErrors;
use regex::Regex;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{OnceLock, RwLock};

/// Split rule tokens on `|`, except `regex:` tokens which may contain pipes.
pub fn normalize_rules<I, S>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Vec::new();
    for token in tokens {
        let token = token.as_ref().trim();
        if token.starts_with("regex:") || token.starts_with("not_regex:") {
            out.push(token.to_string());
            continue;
        }
        out.extend(
            token
                .split('|')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    out
}

/// Ordered field -> rule tokens. Serializes as a JSON object in declaration order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleMap(Vec<(String, Vec<String>)>);

impl RuleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position on replace.
    pub fn insert(&mut self, field: impl Into<String>, rules: Vec<String>) {
        let field = field.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = rules,
            None => self.0.push((field, rules)),
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<String>> {
        let pos = self.0.iter().position(|(f, _)| f == field)?;
        Some(self.0.remove(pos).1)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.iter().find(|(f, _)| f == field).map(|(_, r)| r.as_slice())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(f, r)| (f.as_str(), r.as_slice()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(f, _)| f.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for RuleMap {
    fn from_iter<T: IntoIterator<Item = (K, Vec<String>)>>(iter: T) -> Self {
        let mut map = RuleMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for RuleMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, rules) in &self.0 {
            map.serialize_entry(field, rules)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RuleMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuleMapVisitor;

        impl<'de> Visitor<'de> for RuleMapVisitor {
            type Value = RuleMap;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of field to rule string or list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RuleMap, A::Error> {
                let mut out = RuleMap::new();
                while let Some((field, rules)) = access.next_entry::<String, RuleTokens>()? {
                    out.insert(field, rules.0);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(RuleMapVisitor)
    }
}

/// `"required|string"`, `["required", "string"]` or `null`.
struct RuleTokens(Vec<String>);

impl<'de> Deserialize<'de> for RuleTokens {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(RuleTokens(match v {
            Value::Null => Vec::new(),
            Value::String(s) => normalize_rules([s]),
            Value::Array(items) => normalize_rules(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>(),
            ),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "rules must be a string or list, got {}",
                    other
                )))
            }
        }))
    }
}

/// Validator collaborator: returns the ruled keys that are present, or field-keyed errors.
pub trait Validator: Send + Sync {
    fn validate(&self, data: &Map<String, Value>, rules: &RuleMap) -> Result<Map<String, Value>, ValidationErrors>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, data: &Map<String, Value>, rules: &RuleMap) -> Result<Map<String, Value>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut validated = Map::new();
        for (field, tokens) in rules.iter() {
            let value = data.get(field);
            if let Some(message) = check_field(field, value, tokens) {
                errors.add(field, message);
                continue;
            }
            if let Some(v) = value {
                validated.insert(field.to_string(), v.clone());
            }
        }
        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }
}

fn is_blank(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(_) => false,
    }
}

fn has_rule(tokens: &[String], name: &str) -> bool {
    tokens.iter().any(|t| t == name)
}

/// First failing rule's message for one field, if any.
fn check_field(field: &str, value: Option<&Value>, tokens: &[String]) -> Option<String> {
    if has_rule(tokens, "required") && is_blank(value) {
        return Some(format!("The {} field is required.", field));
    }
    let value = value?;
    if value.is_null() && has_rule(tokens, "nullable") {
        return None;
    }
    let numeric = has_rule(tokens, "integer") || has_rule(tokens, "numeric");
    for token in tokens {
        let (name, arg) = match token.split_once(':') {
            Some((n, a)) => (n, Some(a)),
            None => (token.as_str(), None),
        };
        let failed = match name {
            "required" | "nullable" | "sometimes" | "bail" => None,
            "string" => (!value.is_string()).then(|| format!("The {} field must be a string.", field)),
            "integer" | "int" => {
                (!is_integer(value)).then(|| format!("The {} field must be an integer.", field))
            }
            "numeric" | "decimal" => {
                number_of(value).is_none().then(|| format!("The {} field must be a number.", field))
            }
            "boolean" | "bool" => {
                (!is_boolean(value)).then(|| format!("The {} field must be true or false.", field))
            }
            "array" => (!value.is_array()).then(|| format!("The {} field must be an array.", field)),
            "date" => (!is_date(value)).then(|| format!("The {} field must be a valid date.", field)),
            "datetime" => {
                (!is_datetime(value)).then(|| format!("The {} field must be a valid date-time.", field))
            }
            "email" => (!is_email(value)).then(|| format!("The {} field must be a valid email address.", field)),
            "uuid" => (!value.as_str().is_some_and(|s| uuid::Uuid::parse_str(s).is_ok()))
                .then(|| format!("The {} field must be a valid UUID.", field)),
            "url" => (!is_url(value)).then(|| format!("The {} field must be a valid URL.", field)),
            "min" | "max" | "size" => size_rule(field, value, name, arg, numeric),
            "in" => (!in_list(value, arg)).then(|| format!("The selected {} is invalid.", field)),
            "not_in" => in_list(value, arg).then(|| format!("The selected {} is invalid.", field)),
            "regex" => (!matches_pattern(value, arg)).then(|| format!("The {} field format is invalid.", field)),
            "alpha" => (!chars_all(value, |c| c.is_alphabetic()))
                .then(|| format!("The {} field must only contain letters.", field)),
            "alpha_num" => (!chars_all(value, |c| c.is_alphanumeric()))
                .then(|| format!("The {} field must only contain letters and numbers.", field)),
            "alpha_dash" => (!chars_all(value, |c| c.is_alphanumeric() || c == '-' || c == '_'))
                .then(|| format!("The {} field must only contain letters, numbers, dashes, and underscores.", field)),
            other => {
                tracing::debug!(rule = %other, field = %field, "unknown validation rule ignored");
                None
            }
        };
        if failed.is_some() {
            return failed;
        }
    }
    None
}

fn number_of(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn is_integer(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::String(s) => s.trim().parse::<i64>().is_ok(),
        _ => false,
    }
}

fn is_boolean(v: &Value) -> bool {
    match v {
        Value::Bool(_) => true,
        Value::Number(n) => matches!(n.as_i64(), Some(0) | Some(1)),
        Value::String(s) => matches!(s.as_str(), "0" | "1" | "true" | "false"),
        _ => false,
    }
}

fn is_date(v: &Value) -> bool {
    let Some(s) = v.as_str() else { return false };
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || is_datetime(v)
}

fn is_datetime(v: &Value) -> bool {
    let Some(s) = v.as_str() else { return false };
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
}

fn is_email(v: &Value) -> bool {
    let Some(s) = v.as_str() else { return false };
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

fn is_url(v: &Value) -> bool {
    v.as_str()
        .and_then(|s| url::Url::parse(s).ok())
        .is_some_and(|u| u.has_host())
}

fn chars_all(v: &Value, f: impl Fn(char) -> bool) -> bool {
    v.as_str().is_some_and(|s| s.chars().all(f))
}

fn as_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn in_list(v: &Value, arg: Option<&str>) -> bool {
    let needle = as_text(v);
    arg.unwrap_or_default().split(',').any(|option| option.trim() == needle)
}

fn matches_pattern(v: &Value, arg: Option<&str>) -> bool {
    let Some(pattern) = arg else { return false };
    let pattern = match pattern.strip_prefix('/').and_then(|p| p.rsplit_once('/')) {
        Some((inner, _flags)) => inner,
        None => pattern,
    };
    compiled_pattern(pattern).is_some_and(|re| re.is_match(&as_text(v)))
}

/// Compiled `regex:` patterns shared across validations. `None` marks a pattern that failed to compile.
fn patterns() -> &'static RwLock<HashMap<String, Option<Regex>>> {
    static PATTERNS: OnceLock<RwLock<HashMap<String, Option<Regex>>>> = OnceLock::new();
    PATTERNS.get_or_init(Default::default)
}

fn compiled_pattern(pattern: &str) -> Option<Regex> {
    if let Some(cached) = patterns().read().ok().and_then(|p| p.get(pattern).cloned()) {
        return cached;
    }
    let compiled = match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern = %pattern, error = %e, "invalid regex rule");
            None
        }
    };
    if let Ok(mut cache) = patterns().write() {
        cache.insert(pattern.to_string(), compiled.clone());
    }
    compiled
}

/// `min`/`max`/`size` measure numbers by value, strings by length and arrays by count.
fn size_rule(field: &str, v: &Value, name: &str, arg: Option<&str>, numeric: bool) -> Option<String> {
    let limit: f64 = arg.and_then(|a| a.trim().parse().ok())?;
    let shown = arg.unwrap_or_default().trim();
    let (measure, unit) = match v {
        Value::Array(items) => (items.len() as f64, " items"),
        Value::Number(n) => (n.as_f64()?, ""),
        Value::String(s) if numeric => (s.trim().parse().ok()?, ""),
        Value::String(s) => (s.chars().count() as f64, " characters"),
        _ => return None,
    };
    let ok = match name {
        "min" => measure >= limit,
        "max" => measure <= limit,
        _ => measure == limit,
    };
    if ok {
        return None;
    }
    Some(match name {
        "min" => format!("The {} field must be at least {}{}.", field, shown, unit),
        "max" => format!("The {} field must not be greater than {}{}.", field, shown, unit),
        _ => format!("The {} field must be {}{}.", field, shown, unit),
    })
}
