//! Appliers: validated instructions to query-builder calls.

use super::{is_safe_identifier, FilterInstruction, FilterOperator, FilterValue, SortInstruction};
use crate::gate::CompiledGate;
use crate::sql::QueryBuilder;
use serde_json::Value;

fn like_pattern(value: &Value) -> String {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if raw.contains('%') {
        raw
    } else {
        format!("%{}%", raw)
    }
}

pub fn apply_filters(builder: &mut dyn QueryBuilder, gate: &CompiledGate, instructions: &[FilterInstruction]) {
    for instruction in instructions {
        let field = instruction.field.as_str();
        if let Some(raw) = gate.raw_filters.get(field) {
            raw(&mut *builder, instruction);
            continue;
        }
        let kind = gate.kind_for(field);
        match (instruction.operator, &instruction.value) {
            (FilterOperator::Eq, FilterValue::Null) => builder.where_null(field),
            (FilterOperator::Neq, FilterValue::Null) => builder.where_not_null(field),
            (FilterOperator::Like, FilterValue::Scalar(v)) => builder.where_like(field, &like_pattern(v)),
            (FilterOperator::In, FilterValue::List(values)) if !values.is_empty() => {
                builder.where_in(field, values.iter().map(|v| kind.coerce(v)).collect(), kind)
            }
            (FilterOperator::Between, FilterValue::List(values)) if values.len() == 2 => {
                builder.where_between(field, kind.coerce(&values[0]), kind.coerce(&values[1]), kind)
            }
            (op, FilterValue::Scalar(v)) => match op.comparison() {
                Some(cmp) => builder.where_compare(field, cmp, kind.coerce(v), kind),
                None => tracing::debug!(field, operator = %op, "filter value shape does not fit operator"),
            },
            (op, _) => tracing::debug!(field, operator = %op, "skipping filter without a usable value"),
        }
    }
}

/// Unsafe names and names outside a non-empty allow-list are dropped.
pub fn apply_sorts(builder: &mut dyn QueryBuilder, gate: &CompiledGate, sorts: &[SortInstruction]) {
    for sort in sorts {
        if !is_safe_identifier(&sort.field) {
            tracing::debug!(field = %sort.field, "dropping unsafe sort field");
            continue;
        }
        if !gate.sorts.is_empty() && !gate.sorts.contains(&sort.field) {
            tracing::debug!(field = %sort.field, "dropping sort field not in allow-list");
            continue;
        }
        builder.order_by(&sort.field, sort.direction);
    }
}

pub fn apply_select(builder: &mut dyn QueryBuilder, gate: &CompiledGate) {
    if gate.select.is_empty() {
        return;
    }
    let columns: Vec<String> = gate
        .select
        .iter()
        .filter(|c| is_safe_identifier(c))
        .cloned()
        .collect();
    builder.select(&columns);
}
