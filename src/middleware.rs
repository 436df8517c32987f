//! Named request guards a gate lists in `middleware`, run in order before dispatch.

use crate::config::GateRegistry;
use crate::error::{AppError, ConfigError};
use crate::request::GateRequest;
use std::collections::HashMap;
use std::sync::Arc;

pub trait GateMiddleware: Send + Sync {
    fn handle(&self, request: &GateRequest) -> Result<(), AppError>;
}

impl<F> GateMiddleware for F
where
    F: Fn(&GateRequest) -> Result<(), AppError> + Send + Sync,
{
    fn handle(&self, request: &GateRequest) -> Result<(), AppError> {
        self(request)
    }
}

/// Rejects requests without an actor.
pub struct Authenticated;

impl GateMiddleware for Authenticated {
    fn handle(&self, request: &GateRequest) -> Result<(), AppError> {
        match request.actor {
            Some(_) => Ok(()),
            None => Err(AppError::Forbidden("authentication required".into())),
        }
    }
}

#[derive(Clone)]
pub struct MiddlewareRegistry {
    entries: HashMap<String, Arc<dyn GateMiddleware>>,
}

impl Default for MiddlewareRegistry {
    fn default() -> Self {
        let mut entries: HashMap<String, Arc<dyn GateMiddleware>> = HashMap::new();
        entries.insert("authenticated".into(), Arc::new(Authenticated));
        Self { entries }
    }
}

impl MiddlewareRegistry {
    /// Registry with the built-in `authenticated` guard.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, middleware: impl GateMiddleware + 'static) -> Self {
        self.entries.insert(name.into(), Arc::new(middleware));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// First failing guard wins. An unknown name is a misconfiguration.
    pub fn run(&self, names: &[String], request: &GateRequest) -> Result<(), AppError> {
        for name in names {
            let middleware = self
                .entries
                .get(name)
                .ok_or_else(|| ConfigError::UnknownMiddleware(name.clone()))?;
            middleware.handle(request)?;
        }
        Ok(())
    }

    /// Fail at startup instead of on the first request.
    pub fn check(&self, gates: &GateRegistry) -> Result<(), ConfigError> {
        for gate in gates.iter() {
            if let Some(name) = gate.middleware().iter().find(|n| !self.contains(n)) {
                return Err(ConfigError::UnknownMiddleware(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Actor;
    use axum::http::StatusCode;

    #[test]
    fn runs_guards_in_order() {
        let registry = MiddlewareRegistry::new().register("json-only", |r: &GateRequest| {
            if r.expects_json {
                Ok(())
            } else {
                Err(AppError::BadRequest("json required".into()))
            }
        });
        let names = vec!["authenticated".to_string(), "json-only".to_string()];
        let err = registry.run(&names, &GateRequest::default()).unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let request = GateRequest {
            actor: Some(Actor::new("1")),
            expects_json: false,
            ..GateRequest::default()
        };
        let err = registry.run(&names, &request).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_names_are_config_errors() {
        let err = MiddlewareRegistry::new()
            .run(&["throttle".to_string()], &GateRequest::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::UnknownMiddleware(_))));
    }
}
