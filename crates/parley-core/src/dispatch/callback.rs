//! Callback payloads
//!
//! Buttons carry `action` or `action:args`. The action selects the handler;
//! the arguments are opaque to the router.

use crate::error::{Error, Result};

/// Maximum payload size accepted by Telegram
pub const MAX_CALLBACK_LEN: usize = 64;

/// Parsed callback payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackData {
    /// Handler selector
    pub action: String,
    /// Everything after the first `:` (empty when absent)
    pub args: String,
}

impl CallbackData {
    /// Split a payload on its first `:`.
    ///
    /// The action must be non-empty ASCII alphanumerics, `_` or `-`.
    pub fn parse(data: &str) -> Result<Self> {
        let (action, args) = data.split_once(':').unwrap_or((data, ""));
        validate_action(action)?;
        Ok(Self {
            action: action.to_string(),
            args: args.to_string(),
        })
    }

    /// Build a payload from an action and optional arguments
    pub fn encode(action: &str, args: &str) -> Result<String> {
        validate_action(action)?;
        let data = if args.is_empty() {
            action.to_string()
        } else {
            format!("{action}:{args}")
        };
        if data.len() > MAX_CALLBACK_LEN {
            return Err(Error::Validation(format!(
                "callback payload is {} bytes, limit is {MAX_CALLBACK_LEN}",
                data.len()
            )));
        }
        Ok(data)
    }
}

fn validate_action(action: &str) -> Result<()> {
    if action.is_empty() {
        return Err(Error::Validation("callback action is empty".to_string()));
    }
    if let Some(bad) = action
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::Validation(format!(
            "invalid character {bad:?} in callback action"
        )));
    }
    Ok(())
}
