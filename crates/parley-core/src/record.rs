//! Record - per-correspondent persisted state
//!
//! A [`Record`] holds everything the engine knows about one correspondent:
//! - identity and display info, refreshed on every inbound event
//! - conversational state ([`StateTracker`])
//! - message role slots ([`MessageRoles`])
//! - timestamps and the disabled flag
//!
//! Records are mutated only through a locked [`crate::session::Session`].

mod diff;
mod messages;
mod state;

pub use diff::{FieldGroup, RecordDiff};
pub use messages::MessageRoles;
pub use state::{State, StateChange, StateTracker};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Correspondent identity assigned by the chat platform (never 0)
pub type CorrespondentId = i64;

/// Platform message id (0 means none)
pub type MessageId = i32;

/// Who the correspondent is, as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Platform id
    pub id: CorrespondentId,
    /// Whether the correspondent is a bot
    #[serde(default)]
    pub is_bot: bool,
    /// IETF language tag reported by the client
    #[serde(default)]
    pub language_code: Option<String>,
    /// First name
    #[serde(default)]
    pub first_name: String,
    /// Last name
    #[serde(default)]
    pub last_name: Option<String>,
    /// Handle without the leading `@`
    #[serde(default)]
    pub username: Option<String>,
    /// Premium subscriber flag
    #[serde(default)]
    pub is_premium: bool,
}

impl Identity {
    /// Identity with only an id and first name
    pub fn new(id: CorrespondentId, first_name: impl Into<String>) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            ..Self::default()
        }
    }

    /// Set the language code
    #[must_use]
    pub fn with_language(mut self, code: impl Into<String>) -> Self {
        self.language_code = Some(code.into());
        self
    }

    /// Set the handle
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// "First Last" display name
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }
}

/// Record timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// First contact
    pub created_at: DateTime<Utc>,
    /// Most recent inbound event
    pub last_seen_at: DateTime<Utc>,
}

impl Stats {
    fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last_seen_at: now,
        }
    }
}

/// Full state for one correspondent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identity (the id never changes)
    pub identity: Identity,
    /// Conversational state
    pub state: StateTracker,
    /// Message role slots
    pub messages: MessageRoles,
    /// Timestamps
    pub stats: Stats,
    /// Set when the correspondent became unreachable
    #[serde(default)]
    pub disabled: bool,
}

impl Record {
    /// Default record for a first-contact correspondent
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            state: StateTracker::default(),
            messages: MessageRoles::default(),
            stats: Stats::now(),
            disabled: false,
        }
    }

    /// Correspondent id
    pub fn id(&self) -> CorrespondentId {
        self.identity.id
    }

    /// Record a new main (and header) message and move it into `change`.
    ///
    /// The old main id goes to history, the slots rotate, and the state
    /// change is applied to the new main id in one step.
    pub fn commit_send(
        &mut self,
        change: StateChange,
        new_main_id: MessageId,
        new_head_id: MessageId,
    ) -> Vec<FieldGroup> {
        self.messages.rotate(new_main_id, new_head_id);
        let mut groups = vec![FieldGroup::Messages];
        if self.state.set_state(new_main_id, change) {
            groups.push(FieldGroup::State);
        }
        groups
    }

    /// Overwrite display fields with a fresher observation.
    ///
    /// Returns the groups that changed.
    pub(crate) fn observe(&mut self, identity: &Identity) -> Vec<FieldGroup> {
        let mut groups = vec![FieldGroup::Stats];
        self.stats.last_seen_at = Utc::now();
        let mut fresh = identity.clone();
        fresh.id = self.identity.id;
        if fresh != self.identity {
            self.identity = fresh;
            groups.push(FieldGroup::Identity);
        }
        if self.disabled {
            self.disabled = false;
            groups.push(FieldGroup::Disabled);
        }
        groups
    }
}
