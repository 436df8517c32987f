//! Read path: request parsing, query shaping and the query executor.

mod apply;
mod executor;
mod filter;
mod operator;
mod pagination;
mod sort;

pub use apply::{apply_filters, apply_select, apply_sorts};
pub use executor::{QueryContext, QueryExecutor, QueryStage};
pub use filter::{coerce_list, FilterInstruction, FilterParser, FilterValue, OperatorMap, RawFilters};
pub use operator::FilterOperator;
pub use pagination::{resolve as resolve_pagination, PaginationDefaults, PaginationMode, PaginationPlan};
pub use sort::{parse_sort, SortInstruction};

use regex::Regex;
use std::sync::OnceLock;

/// Column or dotted JSON path safe to quote into SQL.
pub fn is_safe_identifier(name: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

#[cfg(test)]
mod tests {
    use super::is_safe_identifier;

    #[test]
    fn identifiers() {
        assert!(is_safe_identifier("status"));
        assert!(is_safe_identifier("meta.author.name"));
        assert!(!is_safe_identifier("status; drop table posts"));
        assert!(!is_safe_identifier("1abc"));
        assert!(!is_safe_identifier("a..b"));
        assert!(!is_safe_identifier(""));
    }
}
