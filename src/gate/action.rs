//! Action definitions: one named mutation on an entity.

use crate::action::{ActionHandler, ActionInvocation, ActionResponse, FnHandler};
use crate::config::ActionConfig;
use crate::error::{AppError, ConfigError};
use crate::request::GateRequest;
use crate::service::{normalize_rules, RuleMap};
use axum::http::{Method, StatusCode};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Fine-grained authorization: `Some(true)` allows, `Some(false)` forbids, `None` defers to policies.
pub type AuthorizeFn = Arc<dyn Fn(&GateRequest, Option<&Value>) -> Option<bool> + Send + Sync>;

const ALLOWED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Custom,
}

impl ActionKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "create" => ActionKind::Create,
            "update" => ActionKind::Update,
            "delete" => ActionKind::Delete,
            _ => ActionKind::Custom,
        }
    }

    pub fn default_method(self) -> Method {
        match self {
            ActionKind::Create | ActionKind::Custom => Method::POST,
            ActionKind::Update => Method::PATCH,
            ActionKind::Delete => Method::DELETE,
        }
    }

    pub fn is_mutation(self) -> bool {
        !matches!(self, ActionKind::Custom)
    }
}

/// Builder for one action. Validated when the owning gate is built.
#[derive(Clone)]
pub struct ActionDefinition {
    pub(crate) name: String,
    pub(crate) method: Option<String>,
    pub(crate) rules: Option<RuleMap>,
    pub(crate) abilities: Vec<String>,
    pub(crate) authorize: Option<AuthorizeFn>,
    pub(crate) handler: Option<Arc<dyn ActionHandler>>,
    pub(crate) requires_identifier: Option<bool>,
    pub(crate) status: Option<u16>,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            method: None,
            rules: None,
            abilities: Vec::new(),
            authorize: None,
            handler: None,
            requires_identifier: None,
            status: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn rule(mut self, field: impl Into<String>, rules: impl Into<super::Rules>) -> Self {
        self.rules
            .get_or_insert_with(RuleMap::new)
            .insert(field, rules.into().0);
        self
    }

    pub fn rules<I, K, R>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Into<super::Rules>,
    {
        self.rules = Some(rules.into_iter().map(|(k, r)| (k, r.into().0)).collect());
        self
    }

    /// Policy ability checked against the actor and entity; all abilities must pass.
    pub fn ability(mut self, ability: impl Into<String>) -> Self {
        let ability = ability.into();
        if !self.abilities.contains(&ability) {
            self.abilities.push(ability);
        }
        self
    }

    pub fn authorize<F>(mut self, f: F) -> Self
    where
        F: Fn(&GateRequest, Option<&Value>) -> Option<bool> + Send + Sync + 'static,
    {
        self.authorize = Some(Arc::new(f));
        self
    }

    pub fn handler(mut self, handler: impl ActionHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Async closure handler.
    pub fn handle<F, Fut>(self, f: F) -> Self
    where
        F: Fn(ActionInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionResponse, AppError>> + Send + 'static,
    {
        self.handler(FnHandler(f))
    }

    /// Opt out of entity resolution (bulk operations).
    pub fn without_identifier(mut self) -> Self {
        self.requires_identifier = Some(false);
        self
    }

    pub fn requires_identifier(mut self, required: bool) -> Self {
        self.requires_identifier = Some(required);
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn compile(&self) -> Result<CompiledAction, ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyActionName);
        }
        let kind = ActionKind::from_name(&self.name);
        let method = match &self.method {
            Some(token) => parse_method(&self.name, token)?,
            None => kind.default_method(),
        };
        let status = match self.status {
            Some(code) => Some(parse_status(&self.name, code)?),
            None => None,
        };
        Ok(CompiledAction {
            name: self.name.clone(),
            kind,
            method,
            rules: self.rules.clone().unwrap_or_default(),
            abilities: self.abilities.clone(),
            authorize: self.authorize.clone(),
            handler: self.handler.clone(),
            requires_identifier: self.requires_identifier.unwrap_or(kind != ActionKind::Create),
            status,
        })
    }

    pub(crate) fn to_config(&self) -> ActionConfig {
        ActionConfig {
            method: self.method.clone(),
            rules: self.rules.clone(),
            abilities: self.abilities.clone(),
            requires_identifier: self.requires_identifier,
            status: self.status,
            has_handler: self.handler.is_some(),
            has_authorize: self.authorize.is_some(),
        }
    }

    pub(crate) fn from_config(name: &str, config: Option<&ActionConfig>) -> Self {
        let mut action = ActionDefinition::new(name);
        if let Some(c) = config {
            action.method = c.method.clone();
            action.rules = c.rules.clone();
            action.abilities = c.abilities.clone();
            action.requires_identifier = c.requires_identifier;
            action.status = c.status;
        }
        action
    }
}

fn parse_method(action: &str, token: &str) -> Result<Method, ConfigError> {
    let upper = token.trim().to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&upper.as_str()) {
        return Err(ConfigError::InvalidMethod {
            action: action.to_string(),
            method: token.to_string(),
        });
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| ConfigError::InvalidMethod {
        action: action.to_string(),
        method: token.to_string(),
    })
}

fn parse_status(action: &str, code: u16) -> Result<StatusCode, ConfigError> {
    if !(100..=599).contains(&code) {
        return Err(ConfigError::InvalidStatus {
            action: action.to_string(),
            status: code,
        });
    }
    StatusCode::from_u16(code).map_err(|_| ConfigError::InvalidStatus {
        action: action.to_string(),
        status: code,
    })
}

/// An action ready for dispatch.
#[derive(Clone)]
pub struct CompiledAction {
    pub name: String,
    pub kind: ActionKind,
    pub method: Method,
    pub rules: RuleMap,
    pub abilities: Vec<String>,
    pub authorize: Option<AuthorizeFn>,
    pub handler: Option<Arc<dyn ActionHandler>>,
    pub requires_identifier: bool,
    pub status: Option<StatusCode>,
}

impl std::fmt::Debug for CompiledAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledAction")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("method", &self.method)
            .field("rules", &self.rules)
            .field("abilities", &self.abilities)
            .field("requires_identifier", &self.requires_identifier)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Rule tokens accepted by builders: `"required|string"` or a list of tokens.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Rules(pub Vec<String>);

impl From<&str> for Rules {
    fn from(s: &str) -> Self {
        Rules(normalize_rules([s]))
    }
}

impl From<String> for Rules {
    fn from(s: String) -> Self {
        Rules(normalize_rules([s]))
    }
}

impl From<Vec<&str>> for Rules {
    fn from(v: Vec<&str>) -> Self {
        Rules(normalize_rules(v))
    }
}

impl From<Vec<String>> for Rules {
    fn from(v: Vec<String>) -> Self {
        Rules(normalize_rules(v))
    }
}

impl<const N: usize> From<[&str; N]> for Rules {
    fn from(v: [&str; N]) -> Self {
        Rules(normalize_rules(v))
    }
}

impl From<()> for Rules {
    fn from(_: ()) -> Self {
        Rules::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_action_name() {
        let create = ActionDefinition::new("create").compile().unwrap();
        assert_eq!(create.method, Method::POST);
        assert!(!create.requires_identifier);
        let delete = ActionDefinition::new(" delete ").compile().unwrap();
        assert_eq!(delete.kind, ActionKind::Delete);
        assert_eq!(delete.method, Method::DELETE);
        assert!(delete.requires_identifier);
        let publish = ActionDefinition::new("publish").method("put").status(202).compile().unwrap();
        assert_eq!(publish.method, Method::PUT);
        assert_eq!(publish.status, Some(StatusCode::ACCEPTED));
    }

    #[test]
    fn invalid_definitions_are_config_errors() {
        assert!(matches!(
            ActionDefinition::new("  ").compile(),
            Err(ConfigError::EmptyActionName)
        ));
        assert!(matches!(
            ActionDefinition::new("archive").method("TRACE").compile(),
            Err(ConfigError::InvalidMethod { .. })
        ));
        assert!(matches!(
            ActionDefinition::new("archive").status(99).compile(),
            Err(ConfigError::InvalidStatus { status: 99, .. })
        ));
    }
}
