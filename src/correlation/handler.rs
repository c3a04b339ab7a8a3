//! One-shot correlation handlers and the handles scenarios wait on.

use std::{
    any::TypeId,
    fmt,
    mem,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use tokio::sync::oneshot;

use super::{CorrelationError, CorrelationKeySet, HeaderExtractor, KeyExtractor};
use crate::{execution::ExecutionId, message::Message};

/// Identifier assigned to a registered handler.
///
/// Identifiers increase in registration order, which the registry relies on
/// to give earlier handlers precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    /// Create a [`HandlerId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "HandlerId({})", self.0) }
}

/// Lifecycle state of a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum HandlerState {
    /// Registered and awaiting a matching message.
    Waiting = 0,
    /// Resolved by an inbound message.
    Matched = 1,
    /// Expired before a matching message arrived.
    TimedOut = 2,
    /// Withdrawn by its owner or by shutdown.
    Cancelled = 3,
}

impl HandlerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Matched,
            2 => Self::TimedOut,
            3 => Self::Cancelled,
            _ => Self::Waiting,
        }
    }

    /// Whether the handler can no longer change state.
    #[must_use]
    pub fn is_terminal(self) -> bool { self != Self::Waiting }
}

/// State cell shared between the registry entry and the waiting handle.
///
/// Only the registry writes it, and only while holding its table lock.
/// Waiters read it without locking.
#[derive(Debug)]
pub(crate) struct SharedState(AtomicU8);

impl SharedState {
    pub(crate) fn waiting() -> Arc<Self> { Arc::new(Self(AtomicU8::new(HandlerState::Waiting as u8))) }

    pub(crate) fn get(&self) -> HandlerState { HandlerState::from_u8(self.0.load(Ordering::Acquire)) }

    pub(crate) fn set(&self, state: HandlerState) { self.0.store(state as u8, Ordering::Release); }
}

/// How a handler was resolved, delivered through its single-slot channel.
#[derive(Debug)]
pub(crate) enum Resolution {
    Matched(Message),
    TimedOut,
    Cancelled,
}

/// Identity of an extractor, used to share extracted values between
/// handlers during a single lookup.
///
/// Stateless extractors are identified by type, so every handler using
/// [`HeaderExtractor`] or [`crate::correlation::JsonFieldExtractor`] shares
/// one slot. Stateful ones are identified by their allocation, which stays
/// alive while any handler holds it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ExtractorSlot {
    Type(TypeId),
    Instance(usize),
}

impl ExtractorSlot {
    fn of<E: KeyExtractor>(extractor: &Arc<E>) -> Self {
        if mem::size_of::<E>() == 0 {
            Self::Type(TypeId::of::<E>())
        } else {
            Self::Instance(Arc::as_ptr(extractor).addr())
        }
    }
}

/// Description of the message an execution wants to wait for.
///
/// ```
/// use std::time::Duration;
///
/// use scenario_sim::{
///     correlation::{CorrelationHandler, CorrelationKeySet, JsonFieldExtractor},
///     execution::ExecutionId,
/// };
///
/// let handler = CorrelationHandler::new(
///     ExecutionId::new(1),
///     CorrelationKeySet::new().with("referenceId", "42"),
/// )
/// .with_extractor(JsonFieldExtractor)
/// .with_timeout(Duration::from_millis(100));
/// assert_eq!(handler.keys().len(), 1);
/// ```
#[derive(Clone)]
pub struct CorrelationHandler {
    pub(crate) execution_id: ExecutionId,
    pub(crate) keys: CorrelationKeySet,
    pub(crate) extractor: Arc<dyn KeyExtractor>,
    pub(crate) slot: ExtractorSlot,
    pub(crate) timeout: Option<Duration>,
}

impl CorrelationHandler {
    /// Wait on behalf of `execution_id` for a message carrying `keys` in its
    /// headers.
    #[must_use]
    pub fn new(execution_id: ExecutionId, keys: impl Into<CorrelationKeySet>) -> Self {
        Self {
            execution_id,
            keys: keys.into(),
            extractor: Arc::new(HeaderExtractor),
            slot: ExtractorSlot::Type(TypeId::of::<HeaderExtractor>()),
            timeout: None,
        }
    }

    /// Use `extractor` instead of reading headers.
    #[must_use]
    pub fn with_extractor<E: KeyExtractor>(mut self, extractor: E) -> Self {
        let extractor = Arc::new(extractor);
        self.slot = ExtractorSlot::of(&extractor);
        self.extractor = extractor;
        self
    }

    /// Override the registry's default timeout for this handler.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execution that owns this handler.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId { self.execution_id }

    /// Keys an inbound message must carry.
    #[must_use]
    pub fn keys(&self) -> &CorrelationKeySet { &self.keys }

    /// Whether `message` satisfies every watched key.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.keys.satisfied_by(message, self.extractor.as_ref())
    }
}

impl fmt::Debug for CorrelationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationHandler")
            .field("execution_id", &self.execution_id)
            .field("keys", &self.keys)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Waiting side of a registered handler.
///
/// Dropping the handle without waiting leaves the registry entry in place
/// until it is matched, cancelled or times out; a match against a dropped
/// handle is skipped.
#[derive(Debug)]
pub struct CorrelationHandle {
    id: HandlerId,
    state: Arc<SharedState>,
    slot: oneshot::Receiver<Resolution>,
}

impl CorrelationHandle {
    pub(crate) fn new(
        id: HandlerId,
        state: Arc<SharedState>,
        slot: oneshot::Receiver<Resolution>,
    ) -> Self {
        Self { id, state, slot }
    }

    /// Identifier assigned by the registry.
    #[must_use]
    pub fn id(&self) -> HandlerId { self.id }

    /// Current lifecycle state of the handler.
    #[must_use]
    pub fn state(&self) -> HandlerState { self.state.get() }

    /// Suspend until the handler resolves.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::TimedOut`] if the handler expired and
    /// [`CorrelationError::Cancelled`] if it was cancelled or the registry was
    /// dropped.
    pub async fn wait(self) -> Result<Message, CorrelationError> {
        match self.slot.await {
            Ok(Resolution::Matched(message)) => Ok(message),
            Ok(Resolution::TimedOut) => Err(CorrelationError::TimedOut),
            Ok(Resolution::Cancelled) | Err(_) => Err(CorrelationError::Cancelled),
        }
    }
}
