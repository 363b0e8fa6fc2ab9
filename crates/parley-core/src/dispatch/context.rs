//! Per-update handler context
//!
//! A [`Context`] owns the locked [`Session`] for the whole pipeline run and
//! wraps the transport so that message-role bookkeeping happens together
//! with the platform call.

use super::callback::CallbackData;
use super::event::{Event, EventKind};
use super::locale::Locale;
use crate::error::Result;
use crate::record::{CorrespondentId, MessageId, StateChange};
use crate::session::Session;
use crate::transport::{OutgoingMessage, Transport, TransportError};
use std::sync::Arc;
use tracing::debug;

/// Everything a middleware or handler needs for one update
pub struct Context {
    event: Event,
    callback: Option<CallbackData>,
    session: Session,
    transport: Arc<dyn Transport>,
    locale: Arc<Locale>,
    answered: bool,
    blocked: bool,
}

impl Context {
    pub(crate) fn new(
        event: Event,
        session: Session,
        transport: Arc<dyn Transport>,
        locale: Arc<Locale>,
    ) -> Self {
        let callback = match &event.kind {
            EventKind::Callback { data, .. } => CallbackData::parse(data).ok(),
            _ => None,
        };
        Self {
            event,
            callback,
            session,
            transport,
            locale,
            answered: false,
            blocked: false,
        }
    }

    /// The update being handled
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Parsed callback payload, for valid callback events
    pub fn callback(&self) -> Option<&CallbackData> {
        self.callback.as_ref()
    }

    /// Command arguments or callback arguments (empty otherwise)
    pub fn args(&self) -> &str {
        match (&self.event.kind, &self.callback) {
            (EventKind::Command { args, .. }, _) => args,
            (EventKind::Callback { .. }, Some(callback)) => &callback.args,
            _ => "",
        }
    }

    /// Locked session of the sender
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Mutable session of the sender
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// Chat to reply into (private chats share the correspondent id)
    pub fn chat_id(&self) -> CorrespondentId {
        self.session.id()
    }

    /// Localized texts
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Client language reported by the sender
    pub fn language(&self) -> Option<&str> {
        self.session.identity().language_code.as_deref()
    }

    /// Whether any transport call reported that the correspondent blocked the bot
    pub fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub(crate) fn was_answered(&self) -> bool {
        self.answered
    }

    pub(crate) fn mark_blocked(&mut self) {
        self.blocked = true;
    }

    /// Release the session lock, reporting whether the correspondent is unreachable
    pub(crate) fn finish(self) -> bool {
        self.blocked
    }

    fn track<T>(&mut self, result: std::result::Result<T, TransportError>) -> Result<T> {
        if matches!(result, Err(TransportError::Blocked)) {
            self.blocked = true;
        }
        Ok(result?)
    }

    /// Send a message without touching any role slot
    pub async fn send(&mut self, message: &OutgoingMessage) -> Result<MessageId> {
        let result = self.transport.send(self.chat_id(), message).await;
        self.track(result)
    }

    /// Send a new main message and move it into `change`
    pub async fn send_main(
        &mut self,
        message: &OutgoingMessage,
        change: StateChange,
    ) -> Result<MessageId> {
        let main_id = self.send(message).await?;
        self.session.commit_send(change, main_id, 0).await;
        Ok(main_id)
    }

    /// Send a header followed by a main message, recording both in one commit
    pub async fn send_with_head(
        &mut self,
        head: &OutgoingMessage,
        main: &OutgoingMessage,
        change: StateChange,
    ) -> Result<MessageId> {
        let head_id = self.send(head).await?;
        let main_id = self.send(main).await?;
        self.session.commit_send(change, main_id, head_id).await;
        Ok(main_id)
    }

    /// Replace the main message in place, falling back to a fresh send when
    /// there is none or it no longer exists.
    pub async fn edit_main(
        &mut self,
        message: &OutgoingMessage,
        change: StateChange,
    ) -> Result<MessageId> {
        let main_id = self.session.messages().main_id();
        if main_id == 0 {
            return self.send_main(message, change).await;
        }
        let result = self.transport.edit(self.chat_id(), main_id, message).await;
        match result {
            Ok(()) => {}
            Err(TransportError::NotModified) => {
                debug!(
                    correspondent = self.chat_id(),
                    message_id = main_id,
                    "Main message not modified"
                );
            }
            Err(TransportError::NotFound) => {
                debug!(
                    correspondent = self.chat_id(),
                    message_id = main_id,
                    "Main message gone, sending anew"
                );
                self.session.forget_message(main_id).await;
                return self.send_main(message, change).await;
            }
            Err(e) => return self.track(Err(e)),
        }
        self.session.set_state(main_id, change).await;
        Ok(main_id)
    }

    /// Send a notification, replacing (and deleting) the previous one
    pub async fn notify(&mut self, message: &OutgoingMessage) -> Result<MessageId> {
        let id = self.send(message).await?;
        let previous = self.session.set_notification_message(id).await;
        if previous != 0 {
            self.delete(&[previous]).await?;
        }
        Ok(id)
    }

    /// Delete messages and forget their state and role slots.
    ///
    /// Messages that are already gone count as deleted.
    pub async fn delete(&mut self, message_ids: &[MessageId]) -> Result<()> {
        let ids: Vec<MessageId> = message_ids.iter().copied().filter(|id| *id != 0).collect();
        if ids.is_empty() {
            return Ok(());
        }
        let result = self.transport.delete_messages(self.chat_id(), &ids).await;
        match result {
            Ok(()) | Err(TransportError::NotFound) => {}
            Err(e) => return self.track(Err(e)),
        }
        for id in ids {
            self.session.forget_message(id).await;
        }
        Ok(())
    }

    /// Acknowledge the callback with an optional toast. No-op for other events.
    pub async fn answer(&mut self, text: Option<&str>) -> Result<()> {
        let EventKind::Callback { query_id, .. } = &self.event.kind else {
            return Ok(());
        };
        if self.answered {
            return Ok(());
        }
        let result = self.transport.answer_callback(query_id, text).await;
        self.answered = true;
        self.track(result)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("event", &self.event)
            .field("session", &self.session)
            .field("answered", &self.answered)
            .field("blocked", &self.blocked)
            .finish()
    }
}
