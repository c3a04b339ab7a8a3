//! Process-wide table of handlers awaiting correlated messages.
//!
//! Every state transition (match, timeout, cancel) removes the entry from the
//! table and resolves it while the table lock is held, so exactly one of them
//! wins for any handler. The loser finds the entry gone and does nothing.
//!
//! Handlers are indexed by their first key. A lookup reads each indexed key
//! name once per extractor and only tests the handlers filed under the
//! values it finds.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{runtime::Handle, sync::oneshot, task::AbortHandle};
use tracing::debug;

use super::{
    CorrelationError,
    CorrelationHandle,
    CorrelationHandler,
    CorrelationKey,
    CorrelationKeySet,
    ExtractorSlot,
    HandlerId,
    HandlerState,
    KeyExtractor,
    ParsedMessage,
    Resolution,
    SharedState,
};
use crate::{execution::ExecutionId, message::Message, metrics};

/// Timeout applied to handlers that do not set their own.
pub const DEFAULT_CORRELATION_TIMEOUT: Duration = Duration::from_secs(30);

struct Pending {
    handler: CorrelationHandler,
    state: Arc<SharedState>,
    slot: oneshot::Sender<Resolution>,
    timer: Option<AbortHandle>,
}

impl Pending {
    /// Record the terminal state and notify the waiter.
    fn resolve(self, state: HandlerState, resolution: Resolution) {
        self.state.set(state);
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The waiter may already be gone; the transition still stands.
        let _ = self.slot.send(resolution);
    }

    fn anchor(&self) -> Option<&CorrelationKey> { self.handler.keys.iter().next() }
}

/// A key name read during lookups, with the extractor that reads it.
struct KeyReader {
    extractor: Arc<dyn KeyExtractor>,
    handlers: usize,
}

#[derive(Default)]
struct Table {
    // Ordered by id, which follows registration order.
    pending: BTreeMap<HandlerId, Pending>,
    by_anchor: HashMap<CorrelationKey, BTreeSet<HandlerId>>,
    readers: HashMap<(ExtractorSlot, String), KeyReader>,
}

impl Table {
    fn insert(&mut self, id: HandlerId, pending: Pending) {
        if let Some(anchor) = pending.anchor() {
            self.by_anchor.entry(anchor.clone()).or_default().insert(id);
            self.readers
                .entry((pending.handler.slot, anchor.name().to_owned()))
                .or_insert_with(|| KeyReader {
                    extractor: Arc::clone(&pending.handler.extractor),
                    handlers: 0,
                })
                .handlers += 1;
        }
        self.pending.insert(id, pending);
    }

    fn remove(&mut self, id: HandlerId) -> Option<Pending> {
        let pending = self.pending.remove(&id)?;
        if let Some(anchor) = pending.anchor() {
            if let Some(ids) = self.by_anchor.get_mut(anchor) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_anchor.remove(anchor);
                }
            }
            let reader_key = (pending.handler.slot, anchor.name().to_owned());
            if let Some(reader) = self.readers.get_mut(&reader_key) {
                reader.handlers -= 1;
                if reader.handlers == 0 {
                    self.readers.remove(&reader_key);
                }
            }
        }
        Some(pending)
    }

    fn take_all(&mut self) -> BTreeMap<HandlerId, Pending> {
        self.by_anchor.clear();
        self.readers.clear();
        std::mem::take(&mut self.pending)
    }

    /// Whether a live handler already watches exactly `keys`.
    fn watches(&self, keys: &CorrelationKeySet) -> bool {
        let Some(anchor) = keys.iter().next() else {
            return false;
        };
        self.by_anchor.get(anchor).is_some_and(|ids| {
            ids.iter()
                .filter_map(|id| self.pending.get(id))
                .any(|pending| pending.handler.keys == *keys && !pending.slot.is_closed())
        })
    }

    /// Handlers whose first key the message carries, in registration order.
    fn candidates(&self, lookup: &mut Lookup<'_, '_>) -> BTreeSet<HandlerId> {
        let mut found = BTreeSet::new();
        for ((slot, name), reader) in &self.readers {
            let Some(value) = lookup.value(*slot, reader.extractor.as_ref(), name) else {
                continue;
            };
            if let Some(ids) = self.by_anchor.get(&CorrelationKey::new(name.as_str(), value)) {
                found.extend(ids.iter().copied());
            }
        }
        found
    }
}

/// Values extracted from one message, computed at most once per extractor
/// and key name.
struct Lookup<'m, 'p> {
    parsed: &'p ParsedMessage<'m>,
    values: HashMap<(ExtractorSlot, String), Option<String>>,
}

impl<'m, 'p> Lookup<'m, 'p> {
    fn new(parsed: &'p ParsedMessage<'m>) -> Self {
        Self {
            parsed,
            values: HashMap::new(),
        }
    }

    fn value(&mut self, slot: ExtractorSlot, extractor: &dyn KeyExtractor, name: &str) -> Option<&str> {
        let parsed = self.parsed;
        self.values
            .entry((slot, name.to_owned()))
            .or_insert_with(|| extractor.extract_parsed(name, parsed))
            .as_deref()
    }

    fn satisfies(&mut self, handler: &CorrelationHandler) -> bool {
        handler.keys.iter().all(|key| {
            self.value(handler.slot, handler.extractor.as_ref(), key.name()) == Some(key.value())
        })
    }
}

struct Inner {
    table: Mutex<Table>,
    next_id: AtomicU64,
    default_timeout: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Table> { self.table.lock().unwrap_or_else(PoisonError::into_inner) }
}

/// Outcome of a successful [`CorrelationRegistry::try_match`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrelationMatch {
    /// Handler that received the message.
    pub handler_id: HandlerId,
    /// Execution that owns the handler.
    pub execution_id: ExecutionId,
}

/// Concurrent registry of pending [`CorrelationHandler`]s.
///
/// Cloning the registry yields another reference to the same table.
#[derive(Clone)]
pub struct CorrelationRegistry {
    inner: Arc<Inner>,
}

impl Default for CorrelationRegistry {
    fn default() -> Self { Self::new(DEFAULT_CORRELATION_TIMEOUT) }
}

impl CorrelationRegistry {
    /// Create an empty registry whose handlers expire after `default_timeout`
    /// unless they specify their own.
    #[must_use]
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                table: Mutex::new(Table::default()),
                next_id: AtomicU64::new(1),
                default_timeout,
            }),
        }
    }

    /// Register `handler` in the waiting state and arm its timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CorrelationError::EmptyKeys`] if the handler watches no keys,
    /// [`CorrelationError::DuplicateKey`] if a waiting handler already watches
    /// the same key set, and [`CorrelationError::NoRuntime`] when called
    /// outside a Tokio runtime.
    pub fn register(&self, handler: CorrelationHandler) -> Result<CorrelationHandle, CorrelationError> {
        if handler.keys.is_empty() {
            return Err(CorrelationError::EmptyKeys);
        }
        let runtime = Handle::try_current().map_err(|_| CorrelationError::NoRuntime)?;
        let timeout = handler.timeout.unwrap_or(self.inner.default_timeout);

        let mut table = self.inner.lock();
        if table.watches(&handler.keys) {
            return Err(CorrelationError::DuplicateKey(handler.keys));
        }

        let id = HandlerId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        let state = SharedState::waiting();
        let weak = Arc::downgrade(&self.inner);
        let timer = runtime.spawn(expire_after(weak, id, timeout)).abort_handle();

        debug!(handler = %id, execution_id = %handler.execution_id, keys = %handler.keys, "correlation handler registered");
        table.insert(
            id,
            Pending {
                handler,
                state: Arc::clone(&state),
                slot: tx,
                timer: Some(timer),
            },
        );
        Ok(CorrelationHandle::new(id, state, rx))
    }

    /// Deliver `message` to the earliest-registered handler it satisfies.
    ///
    /// The chosen handler moves to [`HandlerState::Matched`] and leaves the
    /// registry before the lock is released, so no second message can match
    /// it. Candidates whose waiter has been dropped are cancelled and
    /// skipped. Returns `None` when no waiting handler matches.
    pub fn try_match(&self, message: &Message) -> Option<CorrelationMatch> {
        let parsed = ParsedMessage::new(message);
        let mut lookup = Lookup::new(&parsed);

        let mut table = self.inner.lock();
        let candidates = table.candidates(&mut lookup);
        let mut chosen = None;
        for id in candidates {
            let Some(pending) = table.pending.get(&id) else {
                continue;
            };
            if pending.slot.is_closed() {
                if let Some(pending) = table.remove(id) {
                    debug!(handler = %id, "dropping abandoned correlation handler");
                    pending.resolve(HandlerState::Cancelled, Resolution::Cancelled);
                }
                continue;
            }
            if lookup.satisfies(&pending.handler) {
                chosen = Some(id);
                break;
            }
        }

        let Some((handler_id, pending)) = chosen.and_then(|id| table.remove(id).map(|pending| (id, pending)))
        else {
            drop(table);
            metrics::inc_correlation(metrics::CorrelationOutcome::Unmatched);
            return None;
        };
        let found = CorrelationMatch {
            handler_id,
            execution_id: pending.handler.execution_id,
        };
        pending.resolve(HandlerState::Matched, Resolution::Matched(message.clone()));
        drop(table);

        debug!(handler = %found.handler_id, execution_id = %found.execution_id, "correlation handler matched");
        metrics::inc_correlation(metrics::CorrelationOutcome::Matched);
        Some(found)
    }

    /// Cancel a waiting handler.
    ///
    /// Returns `false` if the handler already matched, expired, or was never
    /// registered.
    pub fn cancel(&self, id: HandlerId) -> bool {
        resolve(&self.inner, id, HandlerState::Cancelled)
    }

    /// Expire a waiting handler.
    ///
    /// Invoked by the timer armed in [`register`](Self::register); calling it
    /// directly is equivalent to the timer firing early. Returns `false` if
    /// the handler was already resolved.
    pub fn timeout(&self, id: HandlerId) -> bool { resolve(&self.inner, id, HandlerState::TimedOut) }

    /// Cancel every handler owned by `execution_id`, returning how many were
    /// still waiting.
    pub fn cancel_execution(&self, execution_id: ExecutionId) -> usize {
        let mut table = self.inner.lock();
        let ids: Vec<HandlerId> = table
            .pending
            .iter()
            .filter(|(_, pending)| pending.handler.execution_id == execution_id)
            .map(|(id, _)| *id)
            .collect();
        let mut count = 0;
        for id in ids {
            if let Some(pending) = table.remove(id) {
                pending.resolve(HandlerState::Cancelled, Resolution::Cancelled);
                count += 1;
            }
        }
        count
    }

    /// Cancel every waiting handler. Used on shutdown.
    pub fn clear(&self) -> usize {
        let mut table = self.inner.lock();
        let drained = table.take_all();
        let count = drained.len();
        for pending in drained.into_values() {
            pending.resolve(HandlerState::Cancelled, Resolution::Cancelled);
        }
        drop(table);
        if count > 0 {
            debug!(count, "cancelled outstanding correlation handlers");
        }
        count
    }

    /// Whether the handler is still waiting.
    #[must_use]
    pub fn contains(&self, id: HandlerId) -> bool { self.inner.lock().pending.contains_key(&id) }

    /// Identifiers and key sets of all waiting handlers in registration order.
    #[must_use]
    pub fn pending(&self) -> Vec<(HandlerId, CorrelationKeySet)> {
        self.inner
            .lock()
            .pending
            .iter()
            .map(|(id, pending)| (*id, pending.handler.keys.clone()))
            .collect()
    }

    /// Number of waiting handlers.
    #[must_use]
    pub fn len(&self) -> usize { self.inner.lock().pending.len() }

    /// Whether no handler is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.inner.lock().pending.is_empty() }
}

fn resolve(inner: &Inner, id: HandlerId, state: HandlerState) -> bool {
    let resolution = match state {
        HandlerState::TimedOut => Resolution::TimedOut,
        _ => Resolution::Cancelled,
    };
    {
        let mut table = inner.lock();
        let Some(pending) = table.remove(id) else {
            return false;
        };
        pending.resolve(state, resolution);
    }
    metrics::inc_correlation(if state == HandlerState::TimedOut {
        metrics::CorrelationOutcome::TimedOut
    } else {
        metrics::CorrelationOutcome::Cancelled
    });
    debug!(handler = %id, ?state, "correlation handler resolved");
    true
}

async fn expire_after(inner: Weak<Inner>, id: HandlerId, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    if let Some(inner) = inner.upgrade() {
        resolve(&inner, id, HandlerState::TimedOut);
    }
}
