//! Session handles
//!
//! [`SessionRef`] is a cheap, unlocked reference to a cached record.
//! [`Session`] holds the record's exclusive lock for its whole lifetime and
//! is the only way to mutate it; every mutation queues a diff.

use super::cache::SharedRecord;
use super::write_behind::WriteBehind;
use crate::record::{
    CorrespondentId, FieldGroup, Identity, MessageId, MessageRoles, Record, RecordDiff, State,
    StateChange,
};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Unlocked handle to a cached record
#[derive(Clone)]
pub struct SessionRef {
    id: CorrespondentId,
    record: SharedRecord,
    writer: Arc<WriteBehind>,
}

impl SessionRef {
    pub(crate) fn new(id: CorrespondentId, record: SharedRecord, writer: Arc<WriteBehind>) -> Self {
        Self { id, record, writer }
    }

    /// Correspondent id
    pub fn id(&self) -> CorrespondentId {
        self.id
    }

    /// Wait for the record lock
    pub async fn lock(&self) -> Session {
        Session {
            record: self.record.clone().lock_owned().await,
            writer: self.writer.clone(),
        }
    }

    /// Copy of the record, taken under the lock
    pub async fn snapshot(&self) -> Record {
        self.record.lock().await.clone()
    }
}

impl std::fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRef").field("id", &self.id).finish()
    }
}

/// Locked, mutable view of one correspondent's record
pub struct Session {
    record: OwnedMutexGuard<Record>,
    writer: Arc<WriteBehind>,
}

impl Session {
    /// Correspondent id
    pub fn id(&self) -> CorrespondentId {
        self.record.id()
    }

    /// Read-only view of the whole record
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Identity as last observed
    pub fn identity(&self) -> &Identity {
        &self.record.identity
    }

    /// Message role slots
    pub fn messages(&self) -> &MessageRoles {
        &self.record.messages
    }

    /// Main conversational state
    pub fn main_state(&self) -> &State {
        self.record.state.main()
    }

    /// State of a message and whether it is an explicit override
    pub fn state_of(&self, msg_id: MessageId) -> (&State, bool) {
        self.record.state.state_of(msg_id)
    }

    /// Most recently prompted message awaiting free text
    pub fn last_awaiting_text(&self) -> Option<MessageId> {
        self.record.state.last_awaiting_text()
    }

    /// Whether the correspondent is marked unreachable
    pub fn is_disabled(&self) -> bool {
        self.record.disabled
    }

    /// Change the state of a message (0 addresses the main state)
    pub async fn set_state(&mut self, msg_id: MessageId, change: StateChange) {
        if self.record.state.set_state(msg_id, change) {
            self.persist(&[FieldGroup::State]).await;
        }
    }

    /// Rotate the main/head slots and move the new main into `change`, atomically
    pub async fn commit_send(
        &mut self,
        change: StateChange,
        new_main_id: MessageId,
        new_head_id: MessageId,
    ) {
        let groups = self.record.commit_send(change, new_main_id, new_head_id);
        self.persist(&groups).await;
    }

    /// Replace the error slot, returning the previous id (0 if empty)
    pub async fn set_error_message(&mut self, msg_id: MessageId) -> MessageId {
        let previous = self.record.messages.replace_error(msg_id);
        if previous != msg_id {
            self.persist(&[FieldGroup::Messages]).await;
        }
        previous
    }

    /// Clear the error slot, returning the outstanding error message
    pub async fn take_error_message(&mut self) -> Option<MessageId> {
        match self.set_error_message(0).await {
            0 => None,
            id => Some(id),
        }
    }

    /// Replace the notification slot, returning the previous id (0 if empty)
    pub async fn set_notification_message(&mut self, msg_id: MessageId) -> MessageId {
        let previous = self.record.messages.replace_notification(msg_id);
        if previous != msg_id {
            self.persist(&[FieldGroup::Messages]).await;
        }
        previous
    }

    /// Forget a deleted message: its state override and any slot pointing at it
    pub async fn forget_message(&mut self, msg_id: MessageId) {
        let mut groups = Vec::new();
        if self.record.state.forget(msg_id) {
            groups.push(FieldGroup::State);
        }
        if self.record.messages.release(msg_id) {
            groups.push(FieldGroup::Messages);
        }
        if !groups.is_empty() {
            self.persist(&groups).await;
        }
    }

    pub(crate) async fn observe(&mut self, identity: &Identity) {
        let groups = self.record.observe(identity);
        self.persist(&groups).await;
    }

    pub(crate) async fn mark_disabled(&mut self) {
        if !self.record.disabled {
            self.record.disabled = true;
            self.persist(&[FieldGroup::Disabled]).await;
        }
    }

    async fn persist(&self, groups: &[FieldGroup]) {
        let diff = RecordDiff::capture(&self.record, groups);
        self.writer.submit(self.record.id(), diff).await;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.record.id())
            .field("state", &self.record.state.main().name)
            .finish()
    }
}
