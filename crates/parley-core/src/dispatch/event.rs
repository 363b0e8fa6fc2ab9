//! Inbound events, normalized away from the chat platform

use crate::record::{CorrespondentId, Identity, MessageId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// `/name args` text message
    Command {
        /// Inbound message id
        message_id: MessageId,
        /// Command name, lowercase, without the slash or `@bot` suffix
        name: String,
        /// Everything after the first whitespace, trimmed
        args: String,
    },
    /// Free text message
    Text {
        /// Inbound message id
        message_id: MessageId,
        /// Message text
        text: String,
    },
    /// Inline button press
    Callback {
        /// Platform query id, needed to acknowledge the press
        query_id: String,
        /// Message carrying the button (0 when inaccessible)
        message_id: MessageId,
        /// Raw callback payload
        data: String,
    },
    /// Any other message (media, service messages)
    Other {
        /// Inbound message id
        message_id: MessageId,
    },
}

/// An inbound update addressed to one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Chat the update arrived in (used for replies when no session is available)
    pub chat_id: CorrespondentId,
    /// Identity snapshot of the sender, if the platform provided one
    pub sender: Option<Identity>,
    /// Payload
    pub kind: EventKind,
}

impl Event {
    /// Build an event from a message, classifying commands by their leading `/`
    pub fn message(
        chat_id: CorrespondentId,
        sender: Option<Identity>,
        message_id: MessageId,
        text: Option<&str>,
    ) -> Self {
        let kind = match text {
            Some(text) => match parse_command(text) {
                Some((name, args)) => EventKind::Command {
                    message_id,
                    name,
                    args,
                },
                None => EventKind::Text {
                    message_id,
                    text: text.to_string(),
                },
            },
            None => EventKind::Other { message_id },
        };
        Self {
            chat_id,
            sender,
            kind,
        }
    }

    /// Build an event from an inline button press
    pub fn callback(
        chat_id: CorrespondentId,
        sender: Option<Identity>,
        query_id: impl Into<String>,
        message_id: MessageId,
        data: impl Into<String>,
    ) -> Self {
        Self {
            chat_id,
            sender,
            kind: EventKind::Callback {
                query_id: query_id.into(),
                message_id,
                data: data.into(),
            },
        }
    }

    /// Message the event refers to
    pub fn message_id(&self) -> MessageId {
        match &self.kind {
            EventKind::Command { message_id, .. }
            | EventKind::Text { message_id, .. }
            | EventKind::Callback { message_id, .. }
            | EventKind::Other { message_id } => *message_id,
        }
    }

    /// Short kind label for logs
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            EventKind::Command { .. } => "command",
            EventKind::Text { .. } => "text",
            EventKind::Callback { .. } => "callback",
            EventKind::Other { .. } => "other",
        }
    }

    /// Textual payload: message text, command name or callback data
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EventKind::Command { name, .. } => Some(name),
            EventKind::Text { text, .. } => Some(text),
            EventKind::Callback { data, .. } => Some(data),
            EventKind::Other { .. } => None,
        }
    }

    /// Payload as it should appear in the audit log. Commands keep their arguments.
    pub fn log_text(&self) -> Cow<'_, str> {
        match &self.kind {
            EventKind::Command { name, args, .. } if args.is_empty() => {
                Cow::Owned(format!("/{name}"))
            }
            EventKind::Command { name, args, .. } => Cow::Owned(format!("/{name} {args}")),
            _ => Cow::Borrowed(self.text().unwrap_or("")),
        }
    }

    /// Whether this is an inline button press
    pub fn is_callback(&self) -> bool {
        matches!(self.kind, EventKind::Callback { .. })
    }

    /// Whether the event was caused by a message the correspondent sent
    pub fn is_inbound_message(&self) -> bool {
        !self.is_callback() && self.message_id() != 0
    }
}

fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_lowercase(), args.to_string()))
}
