//! Handler routing
//!
//! Routes are keyed by what the update is:
//! - `Command(name)`: slash commands
//! - `Text(state)`: free text, routed by the state of the message awaiting it
//! - `Callback(action)`: inline button presses

use super::callback::CallbackData;
use super::context::Context;
use super::event::{Event, EventKind};
use crate::session::Session;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Update handler
#[async_trait]
pub trait Handler: Send + Sync {
    /// Handle one update. Errors are translated into a general error message.
    async fn handle(&self, ctx: &mut Context) -> anyhow::Result<()>;
}

/// Routing key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey {
    /// Slash command by name
    Command(String),
    /// Free text while in the named state
    Text(String),
    /// Callback by action
    Callback(String),
}

/// Maps updates to handlers
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<RouteKey, Arc<dyn Handler>>,
    default_text: Option<Arc<dyn Handler>>,
}

impl Router {
    /// Empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slash command handler
    #[must_use]
    pub fn command(mut self, name: &str, handler: impl Handler + 'static) -> Self {
        self.routes
            .insert(RouteKey::Command(name.to_lowercase()), Arc::new(handler));
        self
    }

    /// Register a free-text handler for a state
    #[must_use]
    pub fn text(mut self, state: &str, handler: impl Handler + 'static) -> Self {
        self.routes
            .insert(RouteKey::Text(state.to_string()), Arc::new(handler));
        self
    }

    /// Register a callback handler for an action
    #[must_use]
    pub fn callback(mut self, action: &str, handler: impl Handler + 'static) -> Self {
        self.routes
            .insert(RouteKey::Callback(action.to_string()), Arc::new(handler));
        self
    }

    /// Handler for free text no state claims
    #[must_use]
    pub fn default_text(mut self, handler: impl Handler + 'static) -> Self {
        self.default_text = Some(Arc::new(handler));
        self
    }

    /// Number of keyed routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True when no keyed route is registered
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Pick the handler for an update
    pub fn resolve(&self, event: &Event, session: &Session) -> Option<(RouteKey, Arc<dyn Handler>)> {
        match &event.kind {
            EventKind::Command { name, .. } => self.lookup(RouteKey::Command(name.clone())),
            EventKind::Text { .. } => {
                let state = match session.last_awaiting_text() {
                    Some(msg_id) => session.state_of(msg_id).0,
                    None => session.main_state(),
                };
                let key = RouteKey::Text(state.name.clone());
                self.lookup(key.clone()).or_else(|| {
                    self.default_text
                        .as_ref()
                        .map(|handler| (key, Arc::clone(handler)))
                })
            }
            EventKind::Callback { data, .. } => match CallbackData::parse(data) {
                Ok(callback) => self.lookup(RouteKey::Callback(callback.action)),
                Err(e) => {
                    debug!(data = %data, error = %e, "Malformed callback payload");
                    None
                }
            },
            EventKind::Other { .. } => None,
        }
    }

    fn lookup(&self, key: RouteKey) -> Option<(RouteKey, Arc<dyn Handler>)> {
        let handler = self.routes.get(&key)?.clone();
        Some((key, handler))
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .field("default_text", &self.default_text.is_some())
            .finish()
    }
}
