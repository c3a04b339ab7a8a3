//! Correlation of out-of-band inbound messages with waiting executions.
//!
//! A scenario that expects a later message (a status update, a cancel
//! request) registers a [`CorrelationHandler`] naming the keys that message
//! will carry. The router offers every inbound message to the
//! [`CorrelationRegistry`] before ordinary scenario matching, and the first
//! handler the message satisfies receives it through its
//! [`CorrelationHandle`].

mod handler;
mod key;
mod registry;

use thiserror::Error;

pub use handler::{CorrelationHandle, CorrelationHandler, HandlerId, HandlerState};
pub(crate) use handler::{ExtractorSlot, Resolution, SharedState};
pub use key::{CorrelationKey, CorrelationKeySet, HeaderExtractor, JsonFieldExtractor, KeyExtractor, ParsedMessage};
pub use registry::{CorrelationMatch, CorrelationRegistry, DEFAULT_CORRELATION_TIMEOUT};

/// Errors raised by correlation handlers and the registry.
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CorrelationError {
    /// A waiting handler already watches the same key set.
    #[error("correlation keys {0} are already awaited")]
    DuplicateKey(CorrelationKeySet),
    /// The handler watches no keys and would match every message.
    #[error("correlation handler must watch at least one key")]
    EmptyKeys,
    /// No matching message arrived before the handler expired.
    #[error("correlation handler timed out")]
    TimedOut,
    /// The handler was cancelled before a matching message arrived.
    #[error("correlation handler cancelled")]
    Cancelled,
    /// Registration happened outside a Tokio runtime, so no timer can be armed.
    #[error("correlation handlers require a Tokio runtime")]
    NoRuntime,
}
