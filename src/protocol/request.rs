//! Outbound request payloads and frames.
//!
//! See ARCHITECTURE.md Section 2.1 for the wire format.

// ============================================================================
// Imports
// ============================================================================

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::MessageId;

// ============================================================================
// RequestPayload
// ============================================================================

/// The caller-supplied portion of an outbound request.
///
/// The message id and send time are filled in when the frame is built:
/// ids come from the pending-message table, send times are stamped at
/// send.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
///
/// let payload = RequestPayload::new("Session.execute")
///     .with_args(json!({ "script": "1 + 1" }))
///     .with_command_id(12);
/// ```
#[derive(Debug, Clone)]
pub struct RequestPayload {
    /// Command name, opaque to this crate.
    pub command: String,

    /// Command arguments, forwarded verbatim.
    pub args: Value,

    /// Optional caller-side command sequence number.
    pub command_id: Option<u64>,

    /// Optional caller-side start time (unix-ms).
    pub start_time: Option<u64>,
}

impl RequestPayload {
    /// Creates a payload with empty arguments.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Value::Null,
            command_id: None,
            start_time: None,
        }
    }

    /// Sets the command arguments.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Sets the caller-side command sequence number.
    #[inline]
    #[must_use]
    pub fn with_command_id(mut self, command_id: u64) -> Self {
        self.command_id = Some(command_id);
        self
    }

    /// Sets the caller-side start time (unix-ms).
    #[inline]
    #[must_use]
    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

// ============================================================================
// RequestFrame
// ============================================================================

/// A complete outbound request frame.
///
/// # Format
///
/// ```json
/// {
///   "messageId": "7",
///   "command": "Session.execute",
///   "args": { "script": "1 + 1" },
///   "sendTime": 1735689600123,
///   "commandId": 12
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    /// Correlation id allocated by the pending-message table.
    pub message_id: MessageId,

    /// Command name.
    pub command: String,

    /// Command arguments.
    pub args: Value,

    /// Unix-ms timestamp stamped when the frame was built.
    pub send_time: u64,

    /// Optional caller-side command sequence number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u64>,

    /// Optional caller-side start time (unix-ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
}

impl RequestFrame {
    /// Builds a frame from a payload, stamping the send time.
    #[must_use]
    pub fn new(message_id: MessageId, payload: RequestPayload) -> Self {
        Self {
            message_id,
            command: payload.command,
            args: payload.args,
            send_time: unix_millis(),
            command_id: payload.command_id,
            start_time: payload.start_time,
        }
    }
}

/// Current wall-clock time as unix milliseconds.
#[inline]
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
