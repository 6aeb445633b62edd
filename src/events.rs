//! Typed signals with multi-subscriber fan-out.
//!
//! The connection exposes three named signals (`connected`,
//! `disconnected`, `event`). Each is a [`Signal`]: a registry of boxed
//! callbacks invoked in subscription order. A panicking listener is
//! isolated and reported through `tracing`; the remaining listeners
//! still run.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};

use parking_lot::Mutex;
use tracing::error;

// ============================================================================
// Signal
// ============================================================================

/// A named signal carrying payloads of type `T`.
pub struct Signal<T> {
    name: &'static str,
    listeners: Mutex<Vec<Box<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Signal<T> {
    /// Creates an empty signal.
    #[must_use]
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener.
    ///
    /// Listeners are called with a reference to the payload, in the
    /// order they subscribed. They must not subscribe to the same
    /// signal from inside the callback.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Box::new(listener));
    }

    /// Invokes every listener with `payload`.
    ///
    /// A panic in one listener is caught and logged so the rest of the
    /// fan-out is unaffected.
    pub(crate) fn emit(&self, payload: &T) {
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            if catch_unwind(AssertUnwindSafe(|| listener(payload))).is_err() {
                error!(signal = self.name, "event listener panicked");
            }
        }
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
