//! Conversational state tracking
//!
//! A correspondent has one main state plus optional per-message overrides.
//! Messages whose state accepts free text are queued in `awaiting_text`,
//! most recent last, so a free-text reply can be routed to the latest prompt.

use super::MessageId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named conversational state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct State {
    /// State name, used as the text routing key
    pub name: String,
    /// Whether a message in this state expects a free-text reply
    #[serde(default)]
    pub awaits_text: bool,
}

impl State {
    /// Name of the first-contact state
    pub const INITIAL: &'static str = "initial";

    /// State that does not accept free text
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            awaits_text: false,
        }
    }

    /// State that expects a free-text reply
    pub fn awaiting_text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            awaits_text: true,
        }
    }

    /// The first-contact state every new record starts in
    pub fn initial() -> Self {
        Self::new(Self::INITIAL)
    }

    /// State name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for State {
    fn default() -> Self {
        Self::initial()
    }
}

/// Requested state transition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StateChange {
    /// Leave the state untouched
    #[default]
    Keep,
    /// Drop the override, reverting the message to the main state
    Clear,
    /// Set the given state
    Set(State),
}

impl From<State> for StateChange {
    fn from(state: State) -> Self {
        StateChange::Set(state)
    }
}

/// Main state, per-message overrides and the awaiting-text queue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateTracker {
    main: State,
    #[serde(default)]
    per_message: HashMap<MessageId, State>,
    #[serde(default)]
    awaiting_text: Vec<MessageId>,
}

impl StateTracker {
    /// Apply a transition. Message id 0 addresses the main state.
    ///
    /// Returns `false` when nothing changed.
    pub fn set_state(&mut self, msg_id: MessageId, change: StateChange) -> bool {
        match change {
            StateChange::Keep => false,
            StateChange::Set(state) => {
                let awaits_text = state.awaits_text;
                if msg_id == 0 {
                    self.main = state;
                } else {
                    self.per_message.insert(msg_id, state);
                }
                if awaits_text {
                    self.push_awaiting(msg_id);
                } else {
                    self.remove_awaiting(msg_id);
                }
                true
            }
            StateChange::Clear => {
                if msg_id == 0 {
                    self.main = State::initial();
                } else {
                    self.per_message.remove(&msg_id);
                }
                self.remove_awaiting(msg_id);
                true
            }
        }
    }

    /// State of a message and whether it is an explicit override.
    ///
    /// Message id 0 always yields the main state with `true`.
    pub fn state_of(&self, msg_id: MessageId) -> (&State, bool) {
        if msg_id == 0 {
            return (&self.main, true);
        }
        match self.per_message.get(&msg_id) {
            Some(state) => (state, true),
            None => (&self.main, false),
        }
    }

    /// Main conversational state
    pub fn main(&self) -> &State {
        &self.main
    }

    /// Most recently prompted message still awaiting free text
    pub fn last_awaiting_text(&self) -> Option<MessageId> {
        self.awaiting_text.last().copied()
    }

    /// Awaiting-text queue, most recent last
    pub fn awaiting_text(&self) -> &[MessageId] {
        &self.awaiting_text
    }

    /// Number of per-message overrides
    pub fn override_count(&self) -> usize {
        self.per_message.len()
    }

    /// Drop everything known about a deleted message.
    ///
    /// Returns `false` when the message had no override.
    pub fn forget(&mut self, msg_id: MessageId) -> bool {
        if msg_id == 0 {
            return false;
        }
        let had_override = self.per_message.remove(&msg_id).is_some();
        self.remove_awaiting(msg_id);
        had_override
    }

    fn push_awaiting(&mut self, msg_id: MessageId) {
        if self.awaiting_text.last() == Some(&msg_id) {
            return;
        }
        self.remove_awaiting(msg_id);
        self.awaiting_text.push(msg_id);
    }

    fn remove_awaiting(&mut self, msg_id: MessageId) {
        self.awaiting_text.retain(|id| *id != msg_id);
    }
}
