//! Delivery confirmation tracking.
//!
//! The protocol has no acknowledgement primitive; delivery of a locally
//! sent message is inferred from the hub echoing it back. The tracker keeps
//! at most one pending record per message id, and a periodic sweep reports
//! entries that were never echoed.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::core::constants::{DEFAULT_DELIVERY_TIMEOUT, DELIVERY_SWEEP_INTERVAL};
use crate::core::MessageId;
use crate::envelope::{Envelope, MessageType, Payload};

/// A locally sent message awaiting its echo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Room the message was sent to.
    pub room: String,
    /// Message text.
    pub text: String,
    /// When the message was sent.
    pub sent_at: Instant,
}

/// Outcome of correlating an inbound message against the pending map.
#[derive(Debug)]
pub enum Correlation {
    /// The message is not an echo of a local send.
    NotEcho,
    /// The id was not pending (already confirmed, timed out, or foreign).
    NotPending,
    /// The echo matched the pending record.
    Confirmed(PendingMessage),
    /// The id matched but room or text differed; the record was popped and
    /// the message stays in its prior state.
    Mismatch(PendingMessage),
}

/// Handler invoked for each entry the timeout sweep removes.
pub type TimeoutHandler = Arc<dyn Fn(MessageId, PendingMessage) + Send + Sync>;

struct TrackerInner {
    timeout: Duration,
    pending: Mutex<HashMap<MessageId, PendingMessage>>,
    on_timeout: Mutex<Option<TimeoutHandler>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Optimistic tracker for locally sent messages pending echo confirmation.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct DeliveryTracker {
    inner: Arc<TrackerInner>,
}

impl Default for DeliveryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DELIVERY_TIMEOUT)
    }
}

impl DeliveryTracker {
    /// Create a tracker with the given confirmation timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                timeout,
                pending: Mutex::new(HashMap::new()),
                on_timeout: Mutex::new(None),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Register the handler the timeout sweep reports through.
    pub fn set_timeout_handler(&self, handler: TimeoutHandler) {
        *self
            .inner
            .on_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Insert (or overwrite) a pending record for the id, stamped now.
    ///
    /// Starts the sweep task lazily on first use.
    pub fn add(&self, id: MessageId, room: impl Into<String>, text: impl Into<String>) {
        self.pending().insert(
            id,
            PendingMessage {
                room: room.into(),
                text: text.into(),
                sent_at: Instant::now(),
            },
        );
        self.ensure_sweeper();
    }

    /// Atomically remove and return the record for the id.
    ///
    /// Idempotent: a second confirm for the same id returns `None`.
    pub fn confirm(&self, id: &MessageId) -> Option<PendingMessage> {
        self.pending().remove(id)
    }

    /// Correlate an inbound message against the pending map.
    ///
    /// An inbound MSG whose source equals `local_source` and whose id pops a
    /// pending record is the hub's echo of a local send. Room and text are
    /// cross-checked against the popped record; both sides are expected to
    /// carry normalized room names.
    pub fn correlate(&self, envelope: &Envelope, local_source: &[u8]) -> Correlation {
        if envelope.kind() != MessageType::Msg || envelope.header.source != local_source {
            return Correlation::NotEcho;
        }

        let pending = match self.confirm(&envelope.header.id) {
            Some(pending) => pending,
            None => return Correlation::NotPending,
        };

        let room = envelope.header.room.as_deref().unwrap_or("");
        let text = match &envelope.payload {
            Payload::Msg(text) => text.as_str(),
            _ => "",
        };

        if pending.room == room && pending.text == text {
            Correlation::Confirmed(pending)
        } else {
            warn!(id = %envelope.header.id, "echo mismatch for pending message");
            Correlation::Mismatch(pending)
        }
    }

    /// Remove and return every entry older than the timeout.
    pub fn take_timed_out(&self, now: Instant) -> Vec<(MessageId, PendingMessage)> {
        let mut pending = self.pending();
        let expired: Vec<MessageId> = pending
            .iter()
            .filter(|(_, p)| now.duration_since(p.sent_at) > self.inner.timeout)
            .map(|(id, _)| *id)
            .collect();
        expired
            .into_iter()
            .filter_map(|id| pending.remove(&id).map(|p| (id, p)))
            .collect()
    }

    /// Number of pending records.
    pub fn len(&self) -> usize {
        self.pending().len()
    }

    /// Whether no records are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all pending records.
    pub fn clear(&self) {
        self.pending().clear();
    }

    /// Stop the sweep task, if running.
    pub fn stop(&self) {
        if let Some(handle) = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    // Poisoning cannot leave the map in a bad state; every critical
    // section is a plain insert, remove, or read.
    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, PendingMessage>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_sweeper(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        // The task holds a weak reference so an abandoned tracker winds
        // down instead of being kept alive by its own sweep.
        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        *sweeper = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(DELIVERY_SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let inner = match weak.upgrade() {
                    Some(inner) => inner,
                    None => return,
                };
                let tracker = DeliveryTracker { inner };
                let handler = tracker
                    .inner
                    .on_timeout
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                for (id, pending) in tracker.take_timed_out(Instant::now()) {
                    if let Some(handler) = &handler {
                        let result =
                            catch_unwind(AssertUnwindSafe(|| handler(id, pending.clone())));
                        if result.is_err() {
                            error!(%id, "panic in delivery timeout handler");
                        }
                    }
                }
            }
        }));
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if let Some(handle) = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
