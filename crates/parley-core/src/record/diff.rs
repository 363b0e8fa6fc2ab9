//! Sparse record diffs for write-behind persistence

use super::{Identity, MessageRoles, Record, StateTracker, Stats};
use serde::{Deserialize, Serialize};

/// Independently persisted part of a [`Record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    /// Identity and display info
    Identity,
    /// Main state, overrides, awaiting-text queue
    State,
    /// Message role slots and history
    Messages,
    /// Timestamps
    Stats,
    /// Disabled flag
    Disabled,
}

/// Only the field groups changed by one mutation.
///
/// Each present group is a full snapshot of that group, so applying diffs in
/// submission order converges to the in-memory record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordDiff {
    /// New identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// New state tracker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StateTracker>,
    /// New message roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<MessageRoles>,
    /// New stats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    /// New disabled flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

impl RecordDiff {
    /// Snapshot the given groups of a record
    pub fn capture(record: &Record, groups: &[FieldGroup]) -> Self {
        let mut diff = Self::default();
        for group in groups {
            match group {
                FieldGroup::Identity => diff.identity = Some(record.identity.clone()),
                FieldGroup::State => diff.state = Some(record.state.clone()),
                FieldGroup::Messages => diff.messages = Some(record.messages.clone()),
                FieldGroup::Stats => diff.stats = Some(record.stats.clone()),
                FieldGroup::Disabled => diff.disabled = Some(record.disabled),
            }
        }
        diff
    }

    /// Diff that only flips the disabled flag
    pub fn disabled(disabled: bool) -> Self {
        Self {
            disabled: Some(disabled),
            ..Self::default()
        }
    }

    /// True when no group is present
    pub fn is_empty(&self) -> bool {
        self.identity.is_none()
            && self.state.is_none()
            && self.messages.is_none()
            && self.stats.is_none()
            && self.disabled.is_none()
    }

    /// Field groups carried by this diff
    pub fn groups(&self) -> Vec<FieldGroup> {
        let mut groups = Vec::new();
        if self.identity.is_some() {
            groups.push(FieldGroup::Identity);
        }
        if self.state.is_some() {
            groups.push(FieldGroup::State);
        }
        if self.messages.is_some() {
            groups.push(FieldGroup::Messages);
        }
        if self.stats.is_some() {
            groups.push(FieldGroup::Stats);
        }
        if self.disabled.is_some() {
            groups.push(FieldGroup::Disabled);
        }
        groups
    }

    /// Apply to a record. The identity id is never overwritten.
    pub fn apply_to(&self, record: &mut Record) {
        if let Some(identity) = &self.identity {
            let id = record.identity.id;
            record.identity = identity.clone();
            record.identity.id = id;
        }
        if let Some(state) = &self.state {
            record.state = state.clone();
        }
        if let Some(messages) = &self.messages {
            record.messages = messages.clone();
        }
        if let Some(stats) = &self.stats {
            record.stats = stats.clone();
        }
        if let Some(disabled) = self.disabled {
            record.disabled = disabled;
        }
    }
}
