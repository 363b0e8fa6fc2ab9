//! Dispatch Pipeline
//!
//! Every inbound update runs through the same steps:
//! 1. Identify the sender (updates without one are dropped)
//! 2. Load the session (bounded by a timeout), then wait for its lock
//! 3. Run the middleware chain
//! 4. Route to a handler and run it with panics contained
//! 5. Translate failures into a localized error message
//! 6. Acknowledge callbacks the handler left unanswered
//! 7. Disable correspondents that blocked the bot

mod callback;
mod context;
mod event;
mod locale;
mod middleware;
mod router;

pub use callback::{CallbackData, MAX_CALLBACK_LEN};
pub use context::Context;
pub use event::{Event, EventKind};
pub use locale::Locale;
pub use middleware::{
    truncate_for_log, AuditLogMiddleware, CleanupMiddleware, Middleware, MAX_LOG_TEXT_CHARS,
};
pub use router::{Handler, RouteKey, Router};

use crate::error::{self, Error};
use crate::record::{CorrespondentId, Identity};
use crate::session::SessionManager;
use crate::transport::{OutgoingMessage, Transport, TransportError};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Pipeline settings, resolved once at startup
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound for loading or creating the session
    pub obtain_timeout: Duration,
    /// Delete the correspondent's own messages after reading them
    pub delete_inbound: bool,
    /// Write an audit log line per update
    pub log_updates: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            obtain_timeout: Duration::from_secs(5),
            delete_inbound: false,
            log_updates: true,
        }
    }
}

/// How an update ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No sender; nothing was done
    Dropped,
    /// The session could not be obtained in time
    SessionUnavailable,
    /// A middleware stopped the chain
    ShortCircuited,
    /// No handler matched
    Unrouted,
    /// The handler completed
    Handled,
    /// The handler failed or panicked
    Failed,
}

/// Update dispatcher
pub struct Pipeline {
    manager: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    router: Router,
    middlewares: Vec<Arc<dyn Middleware>>,
    locale: Arc<Locale>,
    config: DispatchConfig,
}

impl Pipeline {
    /// Start building a pipeline
    pub fn builder(
        manager: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(manager, transport)
    }

    /// Session manager backing the pipeline
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Run one update through the pipeline
    pub async fn dispatch(&self, event: Event) -> Outcome {
        let Some(sender) = event.sender.clone() else {
            warn!(
                chat_id = event.chat_id,
                kind = event.kind_name(),
                "Update without sender dropped"
            );
            return Outcome::Dropped;
        };

        // Waiting behind an earlier update of the same correspondent is not bounded.
        let resolve = self.manager.resolve(&sender);
        let handle = match tokio::time::timeout(self.config.obtain_timeout, resolve).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                error!(correspondent = sender.id, error = %e, "Failed to obtain session");
                self.report_unavailable(&event, &sender).await;
                return Outcome::SessionUnavailable;
            }
            Err(_) => {
                let e = Error::Timeout(format!("loading session for {}", sender.id));
                error!(correspondent = sender.id, error = %e, "Failed to obtain session");
                self.report_unavailable(&event, &sender).await;
                return Outcome::SessionUnavailable;
            }
        };
        let session = self.manager.enter(handle, &sender).await;

        let mut ctx = Context::new(event, session, self.transport.clone(), self.locale.clone());
        let outcome = self.run(&mut ctx).await;

        if ctx.event().is_callback() && !ctx.was_answered() {
            if let Err(e) = ctx.answer(None).await {
                debug!(correspondent = sender.id, error = %e, "Callback acknowledgement failed");
            }
        }

        if ctx.finish() {
            warn!(correspondent = sender.id, "Correspondent blocked the bot, disabling");
            if let Err(e) = self.manager.disable(sender.id).await {
                error!(correspondent = sender.id, error = %e, "Failed to disable correspondent");
            }
        }
        outcome
    }

    async fn run(&self, ctx: &mut Context) -> Outcome {
        for middleware in &self.middlewares {
            if !middleware.process(ctx).await {
                debug!(
                    correspondent = ctx.chat_id(),
                    middleware = middleware.name(),
                    "Middleware stopped the chain"
                );
                return Outcome::ShortCircuited;
            }
        }

        let Some((route, handler)) = self.router.resolve(ctx.event(), ctx.session()) else {
            debug!(
                correspondent = ctx.chat_id(),
                kind = ctx.event().kind_name(),
                state = %ctx.session().main_state().name,
                "No handler for update"
            );
            return Outcome::Unrouted;
        };

        let result = AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await;
        let failure = match result {
            Ok(Ok(())) => return Outcome::Handled,
            Ok(Err(e)) if error::is_blocked(&e) => {
                ctx.mark_blocked();
                warn!(
                    correspondent = ctx.chat_id(),
                    route = ?route,
                    "Handler stopped: correspondent blocked the bot"
                );
                return Outcome::Failed;
            }
            Ok(Err(e)) => {
                warn!(
                    correspondent = ctx.chat_id(),
                    route = ?route,
                    state = %ctx.session().main_state().name,
                    error = %format_args!("{e:#}"),
                    "Handler failed"
                );
                Error::Handler(format!("{e:#}"))
            }
            Err(panic) => {
                let fault = Error::handler_fault(panic);
                if let Error::HandlerFault { message, backtrace } = &fault {
                    error!(
                        correspondent = ctx.chat_id(),
                        route = ?route,
                        state = %ctx.session().main_state().name,
                        panic = %message,
                        backtrace = %backtrace,
                        "Handler panicked"
                    );
                }
                fault
            }
        };

        self.report_failure(ctx, &failure).await;
        Outcome::Failed
    }

    /// Replace the previous error message with a fresh general error
    async fn report_failure(&self, ctx: &mut Context, failure: &Error) {
        if ctx.is_blocked() {
            return;
        }
        if let Some(previous) = ctx.session_mut().take_error_message().await {
            if let Err(e) = ctx.delete(&[previous]).await {
                debug!(
                    correspondent = ctx.chat_id(),
                    error = %e,
                    "Previous error message not deleted"
                );
            }
        }

        let text = OutgoingMessage::text(self.locale.general_error(ctx.language()));
        match ctx.send(&text).await {
            Ok(error_id) => {
                ctx.session_mut().set_error_message(error_id).await;
                debug!(
                    correspondent = ctx.chat_id(),
                    message_id = error_id,
                    cause = %failure,
                    "Error message sent"
                );
            }
            Err(e) => {
                warn!(correspondent = ctx.chat_id(), error = %e, "Failed to send error message");
            }
        }
    }

    /// Tell the chat something went wrong when there is no session to record it in
    async fn report_unavailable(&self, event: &Event, sender: &Identity) {
        let language = sender.language_code.as_deref();
        let text = OutgoingMessage::text(self.locale.general_error(language));
        let chat: CorrespondentId = event.chat_id;
        match self.transport.send(chat, &text).await {
            Ok(_) => {}
            Err(TransportError::Blocked) => {
                warn!(correspondent = sender.id, "Correspondent blocked the bot, disabling");
                if let Err(e) = self.manager.disable(sender.id).await {
                    error!(correspondent = sender.id, error = %e, "Failed to disable correspondent");
                }
            }
            Err(e) => warn!(chat_id = chat, error = %e, "Failed to send error message"),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("router", &self.router)
            .field(
                "middlewares",
                &self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    manager: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    router: Router,
    middlewares: Vec<Arc<dyn Middleware>>,
    locale: Locale,
    config: DispatchConfig,
}

impl PipelineBuilder {
    /// Builder with an empty router and default settings
    pub fn new(manager: Arc<SessionManager>, transport: Arc<dyn Transport>) -> Self {
        Self {
            manager,
            transport,
            router: Router::new(),
            middlewares: Vec::new(),
            locale: Locale::default(),
            config: DispatchConfig::default(),
        }
    }

    /// Set the router
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    /// Append a middleware after the built-in ones
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Set the localized texts
    #[must_use]
    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Set the pipeline settings
    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline. Audit logging (when enabled) and cleanup run first.
    pub fn build(self) -> Pipeline {
        error::install_panic_hook();
        let mut middlewares: Vec<Arc<dyn Middleware>> =
            Vec::with_capacity(self.middlewares.len() + 2);
        if self.config.log_updates {
            middlewares.push(Arc::new(AuditLogMiddleware));
        }
        middlewares.push(Arc::new(CleanupMiddleware::new(self.config.delete_inbound)));
        middlewares.extend(self.middlewares);

        Pipeline {
            manager: self.manager,
            transport: self.transport,
            router: self.router,
            middlewares,
            locale: Arc::new(self.locale),
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests;
