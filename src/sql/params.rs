//! Value typing for filters and conversion of serde_json::Value to types sqlx can bind.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::{Database, Type};

/// How a filter value should be typed before it reaches the store. Derived from validation rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    #[default]
    Text,
    Integer,
    Number,
    Boolean,
    Date,
    DateTime,
    /// Compared as jsonb on both sides (keyset cursors).
    Json,
}

impl ValueKind {
    /// First type-bearing rule wins; anything else is text.
    pub fn from_rules(rules: &[String]) -> Self {
        for rule in rules {
            let name = rule.split(':').next().unwrap_or_default().trim();
            match name {
                "integer" | "int" => return ValueKind::Integer,
                "numeric" | "decimal" => return ValueKind::Number,
                "boolean" | "bool" => return ValueKind::Boolean,
                "date" => return ValueKind::Date,
                "datetime" | "date_format" => return ValueKind::DateTime,
                _ => {}
            }
        }
        ValueKind::Text
    }

    /// Convert query-string text into the typed JSON value. Unparseable input is left as-is.
    pub fn coerce(self, value: &Value) -> Value {
        let Some(s) = value.as_str() else {
            return value.clone();
        };
        let s = s.trim();
        match self {
            ValueKind::Integer => s
                .parse::<i64>()
                .map(|n| Value::Number(n.into()))
                .unwrap_or_else(|_| value.clone()),
            ValueKind::Number => {
                if let Ok(n) = s.parse::<i64>() {
                    return Value::Number(n.into());
                }
                s.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone())
            }
            ValueKind::Boolean => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Value::Bool(true),
                "false" | "0" | "no" | "off" => Value::Bool(false),
                _ => value.clone(),
            },
            ValueKind::Text | ValueKind::Date | ValueKind::DateTime | ValueKind::Json => value.clone(),
        }
    }

    /// PostgreSQL cast applied to JSON-path expressions, where the column type is unknown.
    pub fn cast(self) -> Option<&'static str> {
        match self {
            ValueKind::Integer => Some("bigint"),
            ValueKind::Number => Some("numeric"),
            ValueKind::Boolean => Some("boolean"),
            ValueKind::Date => Some("date"),
            ValueKind::DateTime => Some("timestamptz"),
            ValueKind::Text | ValueKind::Json => None,
        }
    }
}

/// A value that can be bound to a PostgreSQL query. Each variant reports its own type to the driver.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(Value),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    PgBindValue::I64(i)
                } else {
                    PgBindValue::F64(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => match uuid::Uuid::parse_str(s) {
                Ok(u) => PgBindValue::Uuid(u),
                Err(_) => PgBindValue::String(s.clone()),
            },
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    /// Bind according to the filter kind: json kinds always travel as jsonb.
    pub fn from_kind(v: &Value, kind: ValueKind) -> Self {
        match kind {
            ValueKind::Json => PgBindValue::Json(v.clone()),
            _ => Self::from_json(&kind.coerce(v)),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, BoxDynError> {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf),
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf),
            PgBindValue::String(s) => <String as Encode<Postgres>>::encode_by_ref(s, buf),
            PgBindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf),
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Null | PgBindValue::String(_) => <String as Type<Postgres>>::type_info(),
            PgBindValue::Bool(_) => <bool as Type<Postgres>>::type_info(),
            PgBindValue::I64(_) => <i64 as Type<Postgres>>::type_info(),
            PgBindValue::F64(_) => <f64 as Type<Postgres>>::type_info(),
            PgBindValue::Uuid(_) => <uuid::Uuid as Type<Postgres>>::type_info(),
            PgBindValue::Json(_) => <Value as Type<Postgres>>::type_info(),
        })
    }
}

impl Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }

    fn compatible(_ty: &PgTypeInfo) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_follows_first_typed_rule() {
        let rules = vec!["required".to_string(), "integer".to_string(), "min:1".to_string()];
        assert_eq!(ValueKind::from_rules(&rules), ValueKind::Integer);
        assert_eq!(ValueKind::from_rules(&["string".to_string()]), ValueKind::Text);
        assert_eq!(ValueKind::from_rules(&[]), ValueKind::Text);
    }

    #[test]
    fn coerce_parses_numbers_and_booleans() {
        assert_eq!(ValueKind::Integer.coerce(&json!("42")), json!(42));
        assert_eq!(ValueKind::Integer.coerce(&json!("4x")), json!("4x"));
        assert_eq!(ValueKind::Number.coerce(&json!("1.5")), json!(1.5));
        assert_eq!(ValueKind::Boolean.coerce(&json!("true")), json!(true));
        assert_eq!(ValueKind::Text.coerce(&json!("42")), json!("42"));
    }

    #[test]
    fn bind_value_from_json() {
        assert_eq!(PgBindValue::from_json(&json!(3)), PgBindValue::I64(3));
        assert_eq!(PgBindValue::from_json(&json!("abc")), PgBindValue::String("abc".into()));
        assert_eq!(
            PgBindValue::from_kind(&json!("x"), ValueKind::Json),
            PgBindValue::Json(json!("x"))
        );
    }
}
