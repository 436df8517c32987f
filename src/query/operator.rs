//! The fixed operator catalog.

use crate::sql::Comparison;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    In,
    Between,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 9] = [
        FilterOperator::Eq,
        FilterOperator::Neq,
        FilterOperator::Lt,
        FilterOperator::Lte,
        FilterOperator::Gt,
        FilterOperator::Gte,
        FilterOperator::Like,
        FilterOperator::In,
        FilterOperator::Between,
    ];

    /// Case-insensitive lookup; `None` for anything outside the catalog.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|op| op.as_str() == token)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Neq => "neq",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Like => "like",
            FilterOperator::In => "in",
            FilterOperator::Between => "between",
        }
    }

    /// Takes a list of values rather than a scalar.
    pub fn is_multi(self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::Between)
    }

    pub fn comparison(self) -> Option<Comparison> {
        match self {
            FilterOperator::Eq => Some(Comparison::Eq),
            FilterOperator::Neq => Some(Comparison::Neq),
            FilterOperator::Lt => Some(Comparison::Lt),
            FilterOperator::Lte => Some(Comparison::Lte),
            FilterOperator::Gt => Some(Comparison::Gt),
            FilterOperator::Gte => Some(Comparison::Gte),
            FilterOperator::Like | FilterOperator::In | FilterOperator::Between => None,
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_closed() {
        assert_eq!(FilterOperator::parse("EQ"), Some(FilterOperator::Eq));
        assert_eq!(FilterOperator::parse(" between "), Some(FilterOperator::Between));
        assert_eq!(FilterOperator::parse("contains"), None);
        assert_eq!(FilterOperator::parse(""), None);
    }
}
