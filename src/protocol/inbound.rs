//! Inbound frame dispatch.
//!
//! Classification rules from ARCHITECTURE.md Section 2.4: a frame with
//! `responseId` is a response, a frame with `listenerId` or `eventType`
//! is an event, anything else is dropped by the caller.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use super::event::EventFrame;
use super::response::ResponseFrame;

// ============================================================================
// InboundMessage
// ============================================================================

/// One classified inbound frame.
#[derive(Debug, Clone)]
pub enum InboundMessage {
    /// A response to an outstanding request.
    Response(ResponseFrame),

    /// A server-initiated event.
    Event(EventFrame),
}

impl InboundMessage {
    /// Classifies a raw frame.
    ///
    /// Returns `None` for frames carrying no recognized tag and for
    /// responses whose `responseId` is malformed.
    #[must_use]
    pub fn classify(frame: Value) -> Option<Self> {
        let object = frame.as_object()?;

        if object.contains_key("responseId") {
            return serde_json::from_value(frame).ok().map(Self::Response);
        }

        if EventFrame::matches(&frame) {
            return Some(Self::Event(EventFrame::new(frame)));
        }

        None
    }
}

// ============================================================================
// Tests
// ============================================================================
