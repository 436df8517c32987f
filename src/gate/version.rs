//! Versioned overlays and their changelog.

use super::action::{ActionDefinition, Rules};
use super::RawFilterFn;
use crate::query::{FilterInstruction, FilterOperator};
use crate::service::RuleMap;
use crate::sql::QueryBuilder;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The versionable part of a gate. Unset fields are `None`; a version is a snapshot of these.
#[derive(Clone, Default)]
pub struct OverlayFields {
    pub(crate) filters: Option<RuleMap>,
    pub(crate) operators: Option<BTreeMap<String, Vec<String>>>,
    pub(crate) raw_filters: Option<BTreeMap<String, RawFilterFn>>,
    pub(crate) select: Option<Vec<String>>,
    pub(crate) sorts: Option<Vec<String>>,
    pub(crate) actions: Option<Vec<ActionDefinition>>,
}

/// Builder handed to `QueryGate::version`, prefilled with the state at declaration time.
pub type VersionOverlay = OverlayFields;

impl OverlayFields {
    pub fn filter(mut self, field: impl Into<String>, rules: impl Into<Rules>) -> Self {
        self.filters
            .get_or_insert_with(RuleMap::new)
            .insert(field, rules.into().0);
        self
    }

    /// Replace the whole filter map.
    pub fn filters<I, K, R>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Into<Rules>,
    {
        self.filters = Some(filters.into_iter().map(|(k, r)| (k, r.into().0)).collect());
        self
    }

    pub fn without_filter(mut self, field: &str) -> Self {
        if let Some(filters) = &mut self.filters {
            filters.remove(field);
        }
        if let Some(ops) = &mut self.operators {
            ops.remove(field);
        }
        self
    }

    pub fn allowed_operators<I, S>(mut self, field: impl Into<String>, operators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.operators.get_or_insert_with(BTreeMap::new).insert(
            field.into(),
            operators.into_iter().map(|s| s.as_ref().to_string()).collect(),
        );
        self
    }

    /// Custom predicate builder for a field; bypasses standard operator translation.
    pub fn raw_filter<F>(mut self, field: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn QueryBuilder, &FilterInstruction) + Send + Sync + 'static,
    {
        self.raw_filters
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), Arc::new(f));
        self
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn sorts<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sorts = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Add or replace an action by name.
    pub fn action(mut self, action: ActionDefinition) -> Self {
        let actions = self.actions.get_or_insert_with(Vec::new);
        match actions.iter_mut().find(|a| a.name == action.name) {
            Some(existing) => *existing = action,
            None => actions.push(action),
        }
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = ActionDefinition>) -> Self {
        for action in actions {
            self = self.action(action);
        }
        self
    }

    pub fn without_action(mut self, name: &str) -> Self {
        if let Some(actions) = &mut self.actions {
            actions.retain(|a| a.name != name);
        }
        self
    }

    pub(crate) fn filter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .filters
            .as_ref()
            .map(|f| f.keys().map(str::to_string).collect())
            .unwrap_or_default();
        if let Some(raw) = &self.raw_filters {
            for field in raw.keys() {
                if !names.contains(field) {
                    names.push(field.clone());
                }
            }
        }
        names
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangelogEntry {
    pub version: String,
    pub changes: Vec<String>,
}

fn added_removed(label: &str, before: &[String], after: &[String], out: &mut Vec<String>) {
    for item in after {
        if !before.contains(item) {
            out.push(format!("Added {}: {}", label, item));
        }
    }
    for item in before {
        if !after.contains(item) {
            out.push(format!("Removed {}: {}", label, item));
        }
    }
}

fn operator_tokens(fields: &OverlayFields) -> BTreeMap<String, BTreeSet<String>> {
    fields
        .operators
        .as_ref()
        .map(|ops| {
            ops.iter()
                .map(|(field, tokens)| {
                    let set = tokens
                        .iter()
                        .filter_map(|t| FilterOperator::parse(t))
                        .map(|op| op.as_str().to_string())
                        .collect();
                    (field.clone(), set)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Change lines between two adjacent snapshots.
pub(crate) fn diff(before: &OverlayFields, after: &OverlayFields) -> Vec<String> {
    let mut out = Vec::new();
    added_removed("filter", &before.filter_names(), &after.filter_names(), &mut out);

    let ops_before = operator_tokens(before);
    let ops_after = operator_tokens(after);
    let fields: BTreeSet<&String> = ops_before.keys().chain(ops_after.keys()).collect();
    let empty = BTreeSet::new();
    for field in fields {
        let b = ops_before.get(field).unwrap_or(&empty);
        let a = ops_after.get(field).unwrap_or(&empty);
        for op in a.difference(b) {
            out.push(format!("Added operator: {}.{}", field, op));
        }
        for op in b.difference(a) {
            out.push(format!("Removed operator: {}.{}", field, op));
        }
    }

    let empty_list = Vec::new();
    added_removed(
        "select",
        before.select.as_ref().unwrap_or(&empty_list),
        after.select.as_ref().unwrap_or(&empty_list),
        &mut out,
    );
    added_removed(
        "sort",
        before.sorts.as_ref().unwrap_or(&empty_list),
        after.sorts.as_ref().unwrap_or(&empty_list),
        &mut out,
    );
    let names = |f: &OverlayFields| -> Vec<String> {
        f.actions
            .as_ref()
            .map(|a| a.iter().map(|a| a.name.clone()).collect())
            .unwrap_or_default()
    };
    added_removed("action", &names(before), &names(after), &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_reports_each_section() {
        let before = OverlayFields::default()
            .filter("title", "string")
            .allowed_operators("title", ["eq"])
            .sorts(["id"]);
        let after = before
            .clone()
            .filter("status", "string")
            .allowed_operators("title", ["eq", "like"])
            .select(["id", "title"])
            .sorts(["created_at"])
            .action(ActionDefinition::new("publish"));
        assert_eq!(
            diff(&before, &after),
            vec![
                "Added filter: status",
                "Added operator: title.like",
                "Added select: id",
                "Added select: title",
                "Added sort: created_at",
                "Removed sort: id",
                "Added action: publish",
            ]
        );
    }

    #[test]
    fn removing_a_filter_is_reported() {
        let before = OverlayFields::default().filter("a", "string").filter("b", "string");
        let after = before.clone().without_filter("a");
        assert_eq!(diff(&before, &after), vec!["Removed filter: a"]);
    }
}
