//! Middleware chain
//!
//! Middlewares run in registration order before the handler. Returning
//! `false` stops the chain and skips the handler.

use super::context::Context;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Maximum number of characters of inbound text written to the audit log
pub const MAX_LOG_TEXT_CHARS: usize = 64;

/// Pre-handler step
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Inspect or act on the update. `false` short-circuits the chain.
    async fn process(&self, ctx: &mut Context) -> bool;
}

/// Removes the outstanding error message and, optionally, the inbound message
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupMiddleware {
    /// Delete the correspondent's own message after reading it
    pub delete_inbound: bool,
}

impl CleanupMiddleware {
    /// Create the middleware
    pub fn new(delete_inbound: bool) -> Self {
        Self { delete_inbound }
    }
}

#[async_trait]
impl Middleware for CleanupMiddleware {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn process(&self, ctx: &mut Context) -> bool {
        let mut stale = Vec::with_capacity(2);
        if let Some(error_id) = ctx.session_mut().take_error_message().await {
            stale.push(error_id);
        }
        if self.delete_inbound && ctx.event().is_inbound_message() {
            stale.push(ctx.event().message_id());
        }
        if stale.is_empty() {
            return true;
        }
        let result = ctx.delete(&stale).await;
        if let Err(e) = result {
            warn!(
                correspondent = ctx.chat_id(),
                messages = ?stale,
                error = %e,
                "Cleanup delete failed"
            );
        } else {
            debug!(correspondent = ctx.chat_id(), messages = ?stale, "Cleaned up messages");
        }
        true
    }
}

/// Writes one structured log line per update
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogMiddleware;

#[async_trait]
impl Middleware for AuditLogMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn process(&self, ctx: &mut Context) -> bool {
        let event = ctx.event();
        let session = ctx.session();
        let identity = session.identity();
        info!(
            correspondent = identity.id,
            username = identity.username.as_deref().unwrap_or(""),
            language = identity.language_code.as_deref().unwrap_or(""),
            kind = event.kind_name(),
            message_id = event.message_id(),
            state = %session.main_state().name,
            text = %truncate_for_log(&event.log_text()),
            "Inbound update"
        );
        true
    }
}

/// Truncate to [`MAX_LOG_TEXT_CHARS`] characters on a char boundary
pub fn truncate_for_log(text: &str) -> String {
    match text.char_indices().nth(MAX_LOG_TEXT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
