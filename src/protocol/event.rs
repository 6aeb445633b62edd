//! Opaque event frames.
//!
//! Events are server-initiated notifications. The connection inspects
//! only the routing tags (`listenerId` / `eventType`) and forwards the
//! frame verbatim; see ARCHITECTURE.md Section 2.3.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// EventFrame
// ============================================================================

/// One server-initiated event, carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventFrame(Value);

impl EventFrame {
    /// Wraps a raw inbound frame.
    #[inline]
    #[must_use]
    pub fn new(frame: Value) -> Self {
        Self(frame)
    }

    /// Returns `true` if the value carries an event routing tag.
    #[inline]
    #[must_use]
    pub(crate) fn matches(frame: &Value) -> bool {
        frame
            .as_object()
            .is_some_and(|object| object.contains_key("listenerId") || object.contains_key("eventType"))
    }

    /// Returns the `listenerId` tag, if present.
    #[inline]
    #[must_use]
    pub fn listener_id(&self) -> Option<&str> {
        self.0.get("listenerId").and_then(Value::as_str)
    }

    /// Returns the `eventType` tag, if present.
    #[inline]
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.0.get("eventType").and_then(Value::as_str)
    }

    /// Returns the whole frame.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.0
    }

    /// Unwraps the frame.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> Value {
        self.0
    }
}

// ============================================================================
// Tests
// ============================================================================
