//! Action registry: maps an action name to the work it performs.
//!
//! Built once at startup by binding each name to a closure over an injected
//! integration service. Every action is a zero-argument async operation that
//! resolves to a terminal [`TaskStatus`] (normally `Completed` or `Failed`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::tasks::TaskStatus;

pub type ActionFuture = BoxFuture<'static, Result<TaskStatus, ActionError>>;

/// A registered action.
pub type Action = Arc<dyn Fn() -> ActionFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum ActionError {
    /// No action is registered under the task's action name.
    #[error("Function {0} not registered")]
    NotRegistered(String),

    /// The integration behind the action failed unexpectedly.
    #[error("{service}: {message}")]
    Service { service: String, message: String },

    #[error("action panicked: {0}")]
    Panicked(String),
}

impl ActionError {
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }
}

/// Registry of all available actions.
pub struct ActionRegistry {
    actions: HashMap<String, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    /// Register an action, replacing any previous one with the same name.
    pub fn register<F, Fut>(&mut self, name: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskStatus, ActionError>> + Send + 'static,
    {
        let action: Action = Arc::new(move || f().boxed());
        if self.actions.insert(name.to_string(), action).is_some() {
            tracing::warn!("Action '{name}' registered twice, keeping the last one");
        }
        tracing::debug!("Registered action: {name}");
    }

    pub fn get(&self, name: &str) -> Option<Action> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
