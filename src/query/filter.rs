//! Filter parsing: raw `field -> operator -> value` input to validated instructions.

use super::{is_safe_identifier, FilterOperator};
use crate::error::AppError;
use crate::service::{RuleMap, Validator};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field -> permitted operators. A field absent from the map may use the whole catalog.
pub type OperatorMap = BTreeMap<String, Vec<FilterOperator>>;

/// Raw filter input in request order: field -> [(operator token, value)].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawFilters(Vec<(String, Vec<(String, Value)>)>);

impl RawFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, operator: impl Into<String>, value: Value) {
        let field = field.into();
        let entry = (operator.into(), value);
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some((_, ops)) => ops.push(entry),
            None => self.0.push((field, vec![entry])),
        }
    }

    /// Nested JSON object form: `{"status": {"eq": "published"}}`. A bare value means `eq`.
    pub fn from_json(value: &Value) -> Self {
        let mut out = Self::new();
        if let Value::Object(fields) = value {
            for (field, ops) in fields {
                match ops {
                    Value::Object(ops) => {
                        for (op, v) in ops {
                            out.push(field.clone(), op.clone(), v.clone());
                        }
                    }
                    other => out.push(field.clone(), "eq", other.clone()),
                }
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[(String, Value)])> {
        self.0.iter().map(|(f, ops)| (f.as_str(), ops.as_slice()))
    }

    /// Canonical JSON form, used for cache keys.
    pub fn to_json(&self) -> Value {
        let mut fields = Map::new();
        for (field, ops) in &self.0 {
            let mut m = Map::new();
            for (op, v) in ops {
                m.insert(op.clone(), v.clone());
            }
            fields.insert(field.clone(), Value::Object(m));
        }
        Value::Object(fields)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    Null,
    Scalar(Value),
    List(Vec<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterInstruction {
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
}

pub struct FilterParser<'a> {
    rules: &'a RuleMap,
    operators: &'a OperatorMap,
    raw_fields: Vec<&'a str>,
    validator: &'a dyn Validator,
}

fn is_null_token(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().eq_ignore_ascii_case("null"),
        _ => false,
    }
}

/// Comma-delimited string or (nested) array to a deduplicated ordered list of tokens.
pub fn coerce_list(value: &Value) -> Vec<Value> {
    fn collect(value: &Value, out: &mut Vec<Value>) {
        match value {
            Value::Null => {}
            Value::String(s) => {
                for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                    out.push(Value::String(part.to_string()));
                }
            }
            Value::Array(items) => {
                for item in items {
                    collect(item, out);
                }
            }
            other => out.push(other.clone()),
        }
    }
    let mut all = Vec::new();
    collect(value, &mut all);
    let mut out: Vec<Value> = Vec::with_capacity(all.len());
    for v in all {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

impl<'a> FilterParser<'a> {
    pub fn new(rules: &'a RuleMap, operators: &'a OperatorMap, validator: &'a dyn Validator) -> Self {
        Self {
            rules,
            operators,
            raw_fields: Vec::new(),
            validator,
        }
    }

    /// Fields handled by custom predicate functions count as declared.
    pub fn with_raw_fields(mut self, fields: impl IntoIterator<Item = &'a str>) -> Self {
        self.raw_fields.extend(fields);
        self
    }

    fn field_allowed(&self, field: &str) -> bool {
        if self.rules.is_empty() && self.raw_fields.is_empty() {
            return true;
        }
        self.rules.contains(field) || self.raw_fields.contains(&field)
    }

    pub fn parse(&self, raw: &RawFilters) -> Result<Vec<FilterInstruction>, AppError> {
        let mut out = Vec::new();
        for (field, ops) in raw.iter() {
            if !is_safe_identifier(field) || !self.field_allowed(field) {
                return Err(AppError::invalid(
                    format!("filter.{}", field),
                    format!("Filtering by {} is not allowed.", field),
                ));
            }
            for (token, raw_value) in ops {
                let Some(operator) = FilterOperator::parse(token) else {
                    tracing::debug!(field = %field, operator = %token, "dropping unknown filter operator");
                    continue;
                };
                if let Some(allowed) = self.operators.get(field) {
                    if !allowed.contains(&operator) {
                        tracing::debug!(field = %field, operator = %operator, "dropping operator not allowed on field");
                        continue;
                    }
                }
                let value = normalize(field, operator, raw_value)?;
                self.validate(field, &value)?;
                out.push(FilterInstruction {
                    field: field.to_string(),
                    operator,
                    value,
                });
            }
        }
        Ok(out)
    }

    fn validate(&self, field: &str, value: &FilterValue) -> Result<(), AppError> {
        let Some(tokens) = self.rules.get(field).filter(|t| !t.is_empty()) else {
            return Ok(());
        };
        let rules: RuleMap = std::iter::once((field, tokens.to_vec())).collect();
        let values: &[Value] = match value {
            FilterValue::Null => return Ok(()),
            FilterValue::Scalar(v) => std::slice::from_ref(v),
            FilterValue::List(items) => items,
        };
        for v in values {
            let mut data = Map::new();
            data.insert(field.to_string(), v.clone());
            self.validator.validate(&data, &rules)?;
        }
        Ok(())
    }
}

fn normalize(field: &str, operator: FilterOperator, raw: &Value) -> Result<FilterValue, AppError> {
    match operator {
        FilterOperator::In => {
            let list = coerce_list(raw);
            if list.is_empty() {
                return Err(AppError::invalid(
                    field,
                    format!("The {} filter must receive at least one value.", field),
                ));
            }
            Ok(FilterValue::List(list))
        }
        FilterOperator::Between => {
            let list = coerce_list(raw);
            if list.len() != 2 {
                return Err(AppError::invalid(
                    field,
                    format!("The {} filter requires exactly two values.", field),
                ));
            }
            Ok(FilterValue::List(list))
        }
        _ => {
            let scalar = match raw {
                Value::Array(items) if items.len() == 1 => &items[0],
                Value::Array(_) | Value::Object(_) => {
                    return Err(AppError::invalid(
                        field,
                        format!("The {} filter expects a single value.", field),
                    ))
                }
                other => other,
            };
            if is_null_token(scalar) {
                Ok(FilterValue::Null)
            } else {
                Ok(FilterValue::Scalar(scalar.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{normalize_rules, RuleValidator};
    use serde_json::json;

    fn rules(pairs: &[(&str, &str)]) -> RuleMap {
        pairs.iter().map(|(f, r)| (*f, normalize_rules([*r]))).collect()
    }

    fn raw(v: Value) -> RawFilters {
        RawFilters::from_json(&v)
    }

    #[test]
    fn unknown_operators_are_dropped() {
        let rules = rules(&[("status", "string")]);
        let ops = OperatorMap::new();
        let parsed = FilterParser::new(&rules, &ops, &RuleValidator)
            .parse(&raw(json!({"status": {"contains": "x", "EQ": "draft"}})))
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].operator, FilterOperator::Eq);
        assert_eq!(parsed[0].value, FilterValue::Scalar(json!("draft")));
    }

    #[test]
    fn allow_list_drops_other_operators() {
        let rules = rules(&[("status", "required|string")]);
        let mut ops = OperatorMap::new();
        ops.insert("status".into(), vec![FilterOperator::Eq]);
        let parsed = FilterParser::new(&rules, &ops, &RuleValidator)
            .parse(&raw(json!({"status": {"neq": "published"}})))
            .unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn in_coerces_and_dedups() {
        let rules = RuleMap::new();
        let ops = OperatorMap::new();
        let parsed = FilterParser::new(&rules, &ops, &RuleValidator)
            .parse(&raw(json!({"id": {"in": "3, 1,3,,2"}})))
            .unwrap();
        assert_eq!(parsed[0].value, FilterValue::List(vec![json!("3"), json!("1"), json!("2")]));
    }

    #[test]
    fn empty_in_and_short_between_are_unprocessable() {
        let rules = RuleMap::new();
        let ops = OperatorMap::new();
        let parser = FilterParser::new(&rules, &ops, &RuleValidator);
        let err = parser.parse(&raw(json!({"id": {"in": " , "}}))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        let err = parser.parse(&raw(json!({"id": {"between": ["1"]}}))).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn undeclared_field_is_rejected_when_rules_exist() {
        let rules = rules(&[("status", "string")]);
        let ops = OperatorMap::new();
        let err = FilterParser::new(&rules, &ops, &RuleValidator)
            .parse(&raw(json!({"secret": {"eq": "x"}})))
            .unwrap_err();
        assert_eq!(err.to_string(), "Filtering by secret is not allowed.");
    }

    #[test]
    fn values_are_validated_per_element() {
        let rules = rules(&[("views", "integer")]);
        let ops = OperatorMap::new();
        let parser = FilterParser::new(&rules, &ops, &RuleValidator);
        assert!(parser.parse(&raw(json!({"views": {"between": "1,10"}}))).is_ok());
        let err = parser.parse(&raw(json!({"views": {"in": "1,x"}}))).unwrap_err();
        assert_eq!(err.to_string(), "The views field must be an integer.");
    }

    #[test]
    fn null_token_and_unsafe_names() {
        let rules = RuleMap::new();
        let ops = OperatorMap::new();
        let parser = FilterParser::new(&rules, &ops, &RuleValidator);
        let parsed = parser.parse(&raw(json!({"deleted_at": {"eq": "NULL"}}))).unwrap();
        assert_eq!(parsed[0].value, FilterValue::Null);
        assert!(parser.parse(&raw(json!({"id; drop": {"eq": "1"}}))).is_err());
    }
}
