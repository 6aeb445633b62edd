//! Set-once completion slot observable by multiple awaiters.
//!
//! The connect and disconnect attempts in ARCHITECTURE.md Section 4 are
//! single-shot: the first settlement wins, and every caller that joined
//! the attempt observes the same outcome.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

// ============================================================================
// Resolvable
// ============================================================================

/// A one-shot completion slot.
///
/// Unlike a oneshot channel, the value can be awaited by any number of
/// tasks and inspected after settlement. Settling twice is a no-op: the
/// first value sticks.
#[derive(Debug)]
pub struct Resolvable<T> {
    inner: Arc<ResolvableInner<T>>,
}

#[derive(Debug)]
struct ResolvableInner<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Clone for Resolvable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Resolvable<T> {
    /// Creates an unresolved slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ResolvableInner {
                slot: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Creates a slot that is already settled with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let slot = Self::new();
        slot.resolve(value);
        slot
    }

    /// Settles the slot with `value`.
    ///
    /// Returns `false` if the slot was already settled; the earlier
    /// value is kept.
    pub fn resolve(&self, value: T) -> bool {
        {
            let mut slot = self.inner.slot.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Returns `true` once the slot has been settled.
    #[inline]
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    /// Returns a copy of the settled value without waiting.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.inner.slot.lock().clone()
    }

    /// Waits until the slot is settled and returns a copy of the value.
    pub async fn wait(&self) -> T {
        loop {
            // Arm the notification before checking the slot so a resolve
            // between the check and the await cannot be missed.
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.inner.slot.lock().clone() {
                return value;
            }

            notified.await;
        }
    }
}

impl<T: Clone> Default for Resolvable<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
