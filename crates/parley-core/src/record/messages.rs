//! Message role slots

use super::MessageId;
use serde::{Deserialize, Serialize};

/// The main/head/notification/error slots plus the history of former mains.
///
/// A slot value of 0 means empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageRoles {
    main_id: MessageId,
    head_id: MessageId,
    notification_id: MessageId,
    error_id: MessageId,
    #[serde(default)]
    history: Vec<MessageId>,
}

impl MessageRoles {
    /// Current main message
    pub fn main_id(&self) -> MessageId {
        self.main_id
    }

    /// Current header message
    pub fn head_id(&self) -> MessageId {
        self.head_id
    }

    /// Current notification message
    pub fn notification_id(&self) -> MessageId {
        self.notification_id
    }

    /// Outstanding error display
    pub fn error_id(&self) -> MessageId {
        self.error_id
    }

    /// Former main messages in send order
    pub fn history(&self) -> &[MessageId] {
        &self.history
    }

    /// Rotate the main slot. The previous main goes to history when both ids are set.
    pub(crate) fn rotate(&mut self, new_main_id: MessageId, new_head_id: MessageId) {
        if new_main_id != 0 {
            if self.main_id != 0 && self.main_id != new_main_id {
                self.history.push(self.main_id);
            }
            self.main_id = new_main_id;
        }
        self.head_id = new_head_id;
    }

    /// Replace the error slot, returning the previous value
    pub(crate) fn replace_error(&mut self, id: MessageId) -> MessageId {
        std::mem::replace(&mut self.error_id, id)
    }

    /// Replace the notification slot, returning the previous value
    pub(crate) fn replace_notification(&mut self, id: MessageId) -> MessageId {
        std::mem::replace(&mut self.notification_id, id)
    }

    /// Clear every slot that points at a deleted message.
    ///
    /// History is append-only and keeps the id.
    pub(crate) fn release(&mut self, id: MessageId) -> bool {
        if id == 0 {
            return false;
        }
        let mut changed = false;
        for slot in [
            &mut self.main_id,
            &mut self.head_id,
            &mut self.notification_id,
            &mut self.error_id,
        ] {
            if *slot == id {
                *slot = 0;
                changed = true;
            }
        }
        changed
    }
}
