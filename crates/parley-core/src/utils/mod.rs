//! Utility modules for parley-core
//!
//! - retry: Retry logic with exponential backoff

mod retry;

pub use retry::{retry_with_backoff, RetryConfig, RetryError};
