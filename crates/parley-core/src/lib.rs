//! Parley Core - Session and State Engine
//!
//! This crate provides the conversational core of a Parley bot:
//! - Record: per-correspondent identity, state, message roles and stats
//! - Store: durable record storage (SQLite, in-memory)
//! - Session: bounded TTL cache with per-record locks and write-behind persistence
//! - Dispatch: middleware chain, routing, fault containment and error translation
//! - Transport: the contract a chat-platform client must satisfy
//! - Utils: retry with exponential backoff

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod error;
pub mod record;
pub mod session;
pub mod store;
pub mod transport;
pub mod utils;

pub use dispatch::{
    AuditLogMiddleware, CallbackData, CleanupMiddleware, Context, DispatchConfig, Event,
    EventKind, Handler, Locale, Middleware, Outcome, Pipeline, PipelineBuilder, RouteKey, Router,
};
pub use error::{Error, Result};
pub use record::{
    CorrespondentId, FieldGroup, Identity, MessageId, MessageRoles, Record, RecordDiff, State,
    StateChange, StateTracker, Stats,
};
pub use session::{
    CacheConfig, Session, SessionConfig, SessionManager, SessionRef, WriteBehind,
    WriteBehindConfig,
};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use transport::{Button, OutgoingMessage, ParseMode, Transport, TransportError};
pub use utils::{retry_with_backoff, RetryConfig, RetryError};
