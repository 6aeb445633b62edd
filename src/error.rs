//! Error types for the core client.
//!
//! This module defines all error types used throughout the crate.
//! The remapping rules for inbound errors are in ARCHITECTURE.md
//! Section 6.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use core_client::{ConnectionToCore, RequestPayload, Result};
//!
//! async fn example(connection: &ConnectionToCore) -> Result<()> {
//!     let payload = RequestPayload::new("Session.ping");
//!     let data = connection.send_request(payload).await?;
//!     println!("{data}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Connection | [`Error::Disconnected`], [`Error::ConnectionTimeout`] |
//! | Request | [`Error::ResponseTimeout`], [`Error::Cancelled`] |
//! | Transport | [`Error::Transport`] |
//! | Remote | [`Error::Remote`] |
//! | Hooks | [`Error::Hook`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! [`Error`] is `Clone`: a single connect failure fans out to every
//! caller awaiting the shared connect attempt, so external errors are
//! captured as messages at the boundary rather than wrapped.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::MessageId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The connection to the core is gone.
    ///
    /// Raised when link loss is observed and when disconnect-adjacent
    /// inbound errors are remapped (ARCHITECTURE.md Section 6.2).
    #[error("Disconnected from core at {host}")]
    Disconnected {
        /// Host of the transport this connection was using.
        host: String,
    },

    /// Link setup did not complete within the deadline.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// A request deadline elapsed before its response arrived.
    ///
    /// Rejects only the owning pending entry.
    #[error("Request {message_id} timed out after {timeout_ms}ms")]
    ResponseTimeout {
        /// The request id that timed out.
        message_id: MessageId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A pending request was abandoned before completion.
    #[error("Request cancelled: {reason}")]
    Cancelled {
        /// Description of why the request was given up on.
        reason: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The transport failed to set up the link or to send a frame.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// An error-shaped payload delivered by the core.
    ///
    /// Delivered verbatim unless the disconnect-adjacent remapping
    /// rules apply (ARCHITECTURE.md Section 6.2).
    #[error("{0}")]
    Remote(RemoteError),

    // ========================================================================
    // Hook Errors
    // ========================================================================
    /// A lifecycle hook reported a failure.
    #[error("Lifecycle hook failed: {message}")]
    Hook {
        /// Description of the hook failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {message}")]
    Io {
        /// The underlying IO failure, captured as text.
        message: String,
    },

    /// JSON serialization error.
    #[error("JSON error: {message}")]
    Json {
        /// The underlying serde failure, captured as text.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a disconnected error for the given host.
    #[inline]
    pub fn disconnected(host: impl Into<String>) -> Self {
        Self::Disconnected { host: host.into() }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(message_id: MessageId, timeout_ms: u64) -> Self {
        Self::ResponseTimeout {
            message_id,
            timeout_ms,
        }
    }

    /// Creates a cancelled error.
    #[inline]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a hook failure error.
    #[inline]
    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error reports a lost connection.
    #[inline]
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }

    /// Returns `true` if this is a cancellation-kind error.
    ///
    /// Cancellation-kind errors are produced when a request is
    /// superseded by teardown rather than failing on its own merits;
    /// `send_request` swallows them while a disconnect is in progress.
    #[inline]
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Cancelled { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::ResponseTimeout { .. }
        )
    }
}

// ============================================================================
// External Conversions
// ============================================================================

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        Self::Transport {
            message: err.to_string(),
        }
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// An error-shaped payload received from the core.
///
/// The wire format is a JSON object carrying a `name`, usually a
/// `message` and/or `stack`, and arbitrary extra fields which are kept
/// in [`RemoteError::data`]. See ARCHITECTURE.md Section 2.2 for the
/// shape rules and the recognized names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteError {
    /// Error class name as reported by the core.
    pub name: String,

    /// Human-readable description.
    #[serde(default)]
    pub message: String,

    /// Remote stack trace, if the core included one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    /// Marker set by the core on errors caused by its own teardown.
    ///
    /// Scrubbed before delivery; observable only on the wire.
    #[serde(
        rename = "isDisconnecting",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_disconnecting: Option<bool>,

    /// Any additional fields the core attached.
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl RemoteError {
    /// Name reported when the remote session is already gone.
    pub const SESSION_CLOSED: &'static str = "SessionClosedOrMissingError";

    /// Name reported when the remote browser failed to launch.
    pub const BROWSER_LAUNCH: &'static str = "BrowserLaunchError";

    /// Name reported when remote dependencies are missing.
    pub const DEPENDENCIES_MISSING: &'static str = "DependenciesMissingError";

    /// Creates a remote error with a name and message.
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            is_disconnecting: None,
            data: Map::new(),
        }
    }

    /// Returns `true` if this error reports a closed or missing session.
    #[inline]
    #[must_use]
    pub fn is_session_closed(&self) -> bool {
        self.name == Self::SESSION_CLOSED
    }

    /// Returns `true` if this error must reach the caller verbatim even
    /// while a disconnect is in progress.
    ///
    /// Launch and dependency failures describe the remote environment,
    /// not the link, so remapping them would hide the actual problem.
    #[inline]
    #[must_use]
    pub fn survives_disconnect(&self) -> bool {
        self.name == Self::BROWSER_LAUNCH || self.name == Self::DEPENDENCIES_MISSING
    }

    /// Removes the `isDisconnecting` marker, returning whether it was set.
    #[inline]
    pub fn scrub_disconnecting_marker(&mut self) -> bool {
        self.is_disconnecting.take().unwrap_or(false)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}: {}", self.name, self.message)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_disconnected_display() {
        let err = Error::disconnected("localhost:1818");
        assert_eq!(err.to_string(), "Disconnected from core at localhost:1818");
    }

    #[test]
    fn test_response_timeout_display() {
        let err = Error::response_timeout(MessageId::new("4"), 50);
        assert_eq!(err.to_string(), "Request 4 timed out after 50ms");
    }

    #[test]
    fn test_is_cancellation() {
        assert!(Error::disconnected("host").is_cancellation());
        assert!(Error::cancelled("superseded").is_cancellation());
        assert!(!Error::response_timeout(MessageId::new("1"), 10).is_cancellation());
        assert!(!Error::transport("broken pipe").is_cancellation());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(5000).is_timeout());
        assert!(Error::response_timeout(MessageId::new("1"), 10).is_timeout());
        assert!(!Error::disconnected("host").is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "socket missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.to_string().contains("socket missing"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json { .. }));
    }

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::new("ScriptError", "boom");
        assert_eq!(err.to_string(), "ScriptError: boom");

        let bare = RemoteError::new("ScriptError", "");
        assert_eq!(bare.to_string(), "ScriptError");
    }

    #[test]
    fn test_remote_error_predicates() {
        assert!(RemoteError::new(RemoteError::SESSION_CLOSED, "").is_session_closed());
        assert!(RemoteError::new(RemoteError::BROWSER_LAUNCH, "").survives_disconnect());
        assert!(RemoteError::new(RemoteError::DEPENDENCIES_MISSING, "").survives_disconnect());
        assert!(!RemoteError::new("ScriptError", "").survives_disconnect());
    }

    #[test]
    fn test_scrub_disconnecting_marker() {
        let mut err = RemoteError::new("X", "closing");
        err.is_disconnecting = Some(true);

        assert!(err.scrub_disconnecting_marker());
        assert!(err.is_disconnecting.is_none());
        assert!(!err.scrub_disconnecting_marker());
    }

    #[test]
    fn test_remote_error_extra_fields_roundtrip() {
        let json_str = r#"{
            "name": "ScriptError",
            "message": "boom",
            "line": 14,
            "column": 2
        }"#;

        let err: RemoteError = serde_json::from_str(json_str).expect("parse");
        assert_eq!(err.name, "ScriptError");
        assert_eq!(err.data.get("line").and_then(Value::as_u64), Some(14));

        let back = serde_json::to_value(&err).expect("serialize");
        assert_eq!(back.get("column").and_then(Value::as_u64), Some(2));
    }
}
