//! Authorization collaborator: abilities checked against the current actor and entity.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// The caller a request acts on behalf of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub trait PolicyChecker: Send + Sync {
    fn check(&self, ability: &str, actor: Option<&Actor>, entity: Option<&Value>) -> bool;
}

/// Permits every ability.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl PolicyChecker for AllowAll {
    fn check(&self, _ability: &str, _actor: Option<&Actor>, _entity: Option<&Value>) -> bool {
        true
    }
}

type AbilityFn = Arc<dyn Fn(Option<&Actor>, Option<&Value>) -> bool + Send + Sync>;

/// Ability name -> predicate. Abilities nobody defined are denied.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    abilities: HashMap<String, AbilityFn>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define<F>(mut self, ability: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&Actor>, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        self.abilities.insert(ability.into(), Arc::new(f));
        self
    }
}

impl PolicyChecker for PolicyRegistry {
    fn check(&self, ability: &str, actor: Option<&Actor>, entity: Option<&Value>) -> bool {
        match self.abilities.get(ability) {
            Some(f) => f(actor, entity),
            None => {
                tracing::debug!(ability = %ability, "undefined ability denied");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_checks_owner() {
        let policies = PolicyRegistry::new().define("update", |actor, entity| {
            match (actor, entity.and_then(|e| e.get("author_id")).and_then(Value::as_str)) {
                (Some(a), Some(owner)) => a.id == owner,
                _ => false,
            }
        });
        let post = json!({"id": 1, "author_id": "u1"});
        assert!(policies.check("update", Some(&Actor::new("u1")), Some(&post)));
        assert!(!policies.check("update", Some(&Actor::new("u2")), Some(&post)));
        assert!(!policies.check("delete", Some(&Actor::new("u1")), Some(&post)));
        assert!(AllowAll.check("anything", None, None));
    }
}
