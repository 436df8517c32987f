//! Sort expressions: `field:dir,field2:dir`.

use crate::sql::SortDirection;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortInstruction {
    pub field: String,
    pub direction: SortDirection,
}

/// Blank input yields no instructions. Unknown directions fall back to ascending.
pub fn parse_sort(expression: Option<&str>) -> Vec<SortInstruction> {
    let Some(expression) = expression else {
        return Vec::new();
    };
    expression
        .split(',')
        .filter_map(|segment| {
            let (field, direction) = match segment.split_once(':') {
                Some((f, d)) => (f.trim(), d.trim()),
                None => (segment.trim(), ""),
            };
            if field.is_empty() {
                return None;
            }
            let direction = if direction.eq_ignore_ascii_case("desc") {
                SortDirection::Desc
            } else {
                SortDirection::Asc
            };
            Some(SortInstruction {
                field: field.to_string(),
                direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(expr: &str) -> Vec<(String, SortDirection)> {
        parse_sort(Some(expr))
            .into_iter()
            .map(|s| (s.field, s.direction))
            .collect()
    }

    #[test]
    fn blank_is_empty() {
        assert!(parse_sort(None).is_empty());
        assert!(parse_sort(Some("  ")).is_empty());
    }

    #[test]
    fn directions_and_defaults() {
        assert_eq!(
            pairs("created_at:desc, title ,views:sideways,:desc"),
            vec![
                ("created_at".to_string(), SortDirection::Desc),
                ("title".to_string(), SortDirection::Asc),
                ("views".to_string(), SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn parsing_is_idempotent() {
        let expr = "b:DESC,a";
        assert_eq!(parse_sort(Some(expr)), parse_sort(Some(expr)));
    }
}
