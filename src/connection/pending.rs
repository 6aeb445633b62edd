//! In-flight request table.
//!
//! One [`PendingMessages`] per connection tracks every request awaiting
//! its response: id allocation, one-shot settlement, per-entry
//! timeouts, and mass-cancellation. See ARCHITECTURE.md Section 5.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::MessageId;

// ============================================================================
// Types
// ============================================================================

/// One in-flight request.
struct PendingEntry {
    /// One-shot settlement slot; consumed exactly once.
    resolver: oneshot::Sender<Result<Value>>,

    /// Handshake-phase requests are exempt from user-traffic cancel.
    is_internal: bool,

    /// Timer task, aborted on settlement.
    timeout: Option<JoinHandle<()>>,
}

impl PendingEntry {
    /// Settles the entry and stops its timer.
    fn settle(self, result: Result<Value>) {
        if let Some(timer) = self.timeout {
            timer.abort();
        }
        let _ = self.resolver.send(result);
    }

    /// Drops the entry without settling it.
    ///
    /// The waiting [`PendingRequest`] observes a cancelled error.
    fn abandon(self) {
        if let Some(timer) = self.timeout {
            timer.abort();
        }
    }
}

struct PendingInner {
    next_id: AtomicU64,
    entries: Mutex<FxHashMap<MessageId, PendingEntry>>,
}

// ============================================================================
// PendingMessages
// ============================================================================

/// Table of outstanding requests keyed by message id.
///
/// Ids are unique within one table: a monotonic counter, rendered as a
/// string. Settlement removes the entry synchronously, so resolve,
/// reject, timeout, and cancel deliver at most one completion per
/// entry; whichever arrives first wins.
#[derive(Clone)]
pub struct PendingMessages {
    inner: Arc<PendingInner>,
}

impl PendingMessages {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PendingInner {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(FxHashMap::default()),
            }),
        }
    }

    /// Allocates a fresh entry.
    ///
    /// A positive `timeout` schedules a timer that rejects the entry
    /// with [`Error::ResponseTimeout`] and removes it. `is_internal`
    /// tags handshake-phase requests (ARCHITECTURE.md Section 5.3).
    pub fn create(
        &self,
        timeout: Option<Duration>,
        is_internal: bool,
    ) -> (MessageId, PendingRequest) {
        let id = MessageId::from_seq(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (resolver, receiver) = oneshot::channel();

        let timer = timeout.filter(|deadline| !deadline.is_zero()).map(|deadline| {
            let table = self.clone();
            let id = id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                // Presence is re-checked inside reject: if the response
                // won the race this is a no-op.
                let timeout_ms = deadline.as_millis() as u64;
                let error = Error::response_timeout(id.clone(), timeout_ms);
                table.reject(&id, error);
            })
        });

        self.inner.entries.lock().insert(
            id.clone(),
            PendingEntry {
                resolver,
                is_internal,
                timeout: timer,
            },
        );

        trace!(message_id = %id, internal = is_internal, "pending entry created");
        (id, PendingRequest { receiver })
    }

    /// Fulfils the entry for `id` with `data`.
    ///
    /// A late response for an unknown id is discarded silently.
    pub fn resolve(&self, id: &MessageId, data: Value) {
        if let Some(entry) = self.take(id) {
            entry.settle(Ok(data));
        } else {
            trace!(message_id = %id, "response for unknown request discarded");
        }
    }

    /// Fails the entry for `id` with `error`.
    pub fn reject(&self, id: &MessageId, error: Error) {
        if let Some(entry) = self.take(id) {
            entry.settle(Err(error));
        }
    }

    /// Removes the entry for `id` without settling it.
    ///
    /// Used when the caller abandons the request; the waiter observes a
    /// cancelled error through the dropped resolver.
    pub fn remove(&self, id: &MessageId) {
        if let Some(entry) = self.take(id) {
            entry.abandon();
        }
    }

    /// Mass-fails outstanding user entries with `error`.
    ///
    /// Internal (handshake) entries are left in place: a lifecycle
    /// hook's own request must survive the teardown that triggered the
    /// cancel. They are settled individually by the termination path.
    pub fn cancel(&self, error: &Error) {
        let cancelled: Vec<PendingEntry> = {
            let mut entries = self.inner.entries.lock();
            let ids: Vec<MessageId> = entries
                .iter()
                .filter(|(_, entry)| !entry.is_internal)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| entries.remove(&id))
                .collect()
        };

        let count = cancelled.len();
        for entry in cancelled {
            entry.settle(Err(error.clone()));
        }

        if count > 0 {
            debug!(count, "cancelled pending requests");
        }
    }

    /// Returns the number of outstanding entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` if no entries are outstanding.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    fn take(&self, id: &MessageId) -> Option<PendingEntry> {
        self.inner.entries.lock().remove(id)
    }
}

impl Default for PendingMessages {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PendingRequest
// ============================================================================

/// The awaitable half of a pending entry.
///
/// Resolves with the response payload or the entry's failure. If the
/// entry is removed without settlement, the future resolves with a
/// cancelled error.
pub struct PendingRequest {
    receiver: oneshot::Receiver<Result<Value>>,
}

impl Future for PendingRequest {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|settled| {
            settled.unwrap_or_else(|_| {
                Err(Error::cancelled("request abandoned before completion"))
            })
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
