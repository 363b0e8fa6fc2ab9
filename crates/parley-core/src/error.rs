//! Error types for parley-core
//!
//! Validation and synchronous transport failures are returned to the caller.
//! Write-behind failures are logged inside the queue and never reach the
//! request path; handler failures are translated by the dispatch pipeline.

use crate::record::CorrespondentId;
use crate::transport::TransportError;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::sync::Once;
use thiserror::Error;

thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Zero or otherwise invalid argument passed to a manager or tracker operation
    #[error("validation error: {0}")]
    Validation(String),

    /// A non-creating lookup missed
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with this identity is already stored
    #[error("record {0} already exists")]
    AlreadyExists(CorrespondentId),

    /// Chat-platform transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Synchronous storage failure (find, insert)
    #[error("storage error: {0}")]
    Storage(String),

    /// Asynchronous write-behind failure, dropped after retries
    #[error("write-behind for {id} failed after {attempts} attempts: {message}")]
    StorageWrite {
        /// Correspondent whose diff was dropped
        id: CorrespondentId,
        /// Attempts made before giving up
        attempts: u32,
        /// Last underlying error
        message: String,
    },

    /// Uncontrolled failure (panic) raised while a handler was running
    #[error("handler fault: {message}")]
    HandlerFault {
        /// Panic payload rendered as text
        message: String,
        /// Backtrace of the panicking frame, when the panic hook is installed
        backtrace: String,
    },

    /// A handler returned an error
    #[error("handler error: {0}")]
    Handler(String),

    /// Operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the write-behind queue should retry after this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_) | Error::Timeout(_))
    }

    /// Whether the correspondent has blocked the bot.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Blocked))
    }

    /// Build a [`Error::HandlerFault`] from a caught panic payload.
    ///
    /// Must be called on the thread that caught the panic; the backtrace
    /// recorded by [`install_panic_hook`] for that thread is taken.
    pub fn handler_fault(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        let backtrace = PANIC_BACKTRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| "unavailable".to_string());
        Error::HandlerFault { message, backtrace }
    }
}

/// Chain a panic hook that records the backtrace of every panic on the
/// panicking thread. Idempotent; the previous hook still runs.
pub fn install_panic_hook() {
    static INSTALLED: Once = Once::new();
    INSTALLED.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            let _ = PANIC_BACKTRACE.try_with(|slot| {
                if let Ok(mut slot) = slot.try_borrow_mut() {
                    *slot = Some(backtrace);
                }
            });
            previous(info);
        }));
    });
}

/// Returns true when any error in the chain is a blocked-by-correspondent transport error.
pub fn is_blocked(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<Error>()
            .map(Error::is_blocked)
            .unwrap_or(false)
            || matches!(
                cause.downcast_ref::<TransportError>(),
                Some(TransportError::Blocked)
            )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::Storage("disk full".to_string()).is_retryable());
        assert!(Error::Timeout("find".to_string()).is_retryable());
        assert!(!Error::NotFound("42".to_string()).is_retryable());
        assert!(!Error::AlreadyExists(42).is_retryable());
    }

    #[test]
    fn test_handler_fault_from_str_payload() {
        let err = Error::handler_fault(Box::new("boom"));
        match err {
            Error::HandlerFault { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[inline(never)]
    fn parse_menu_page() {
        panic!("page out of range")
    }

    #[test]
    fn test_handler_fault_backtrace_points_at_panic() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(parse_menu_page).unwrap_err();
        match Error::handler_fault(payload) {
            Error::HandlerFault { message, backtrace } => {
                assert_eq!(message, "page out of range");
                assert!(backtrace.contains("parse_menu_page"), "{backtrace}");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Taken once: a payload without a recorded panic has no backtrace.
        match Error::handler_fault(Box::new("boom")) {
            Error::HandlerFault { backtrace, .. } => assert_eq!(backtrace, "unavailable"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_handler_fault_from_string_payload() {
        let err = Error::handler_fault(Box::new(String::from("index out of bounds")));
        assert!(err.to_string().contains("index out of bounds"));
    }

    #[test]
    fn test_is_blocked_through_anyhow() {
        let direct = anyhow::Error::new(TransportError::Blocked);
        assert!(is_blocked(&direct));

        let wrapped = anyhow::Error::new(Error::Transport(TransportError::Blocked));
        assert!(is_blocked(&wrapped));

        let with_context = anyhow::Error::new(Error::Transport(TransportError::Blocked))
            .context("sending menu");
        assert!(is_blocked(&with_context));

        let other = anyhow::Error::new(TransportError::NotFound);
        assert!(!is_blocked(&other));
    }
}
