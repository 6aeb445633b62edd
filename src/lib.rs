//! Client library for a remote automation Core.
//!
//! One logical connection multiplexes request/response traffic and
//! server-initiated events over a single bidirectional, framed
//! transport. The connection handles lazy establishment, handshake
//! hooks, orderly teardown, abrupt termination, per-request timeouts,
//! and remapping of disconnect-adjacent errors.
//!
//! # Architecture
//!
//! The crate follows a client-server model (see ARCHITECTURE.md):
//!
//! - **Local end (this crate)**: sends command frames, matches
//!   responses by message id, forwards events.
//! - **Remote end (the Core)**: executes commands, pushes events.
//!
//! Key design principles:
//!
//! - One [`ConnectionToCore`] owns one [`Transport`] and one pending
//!   table; clones share the logical connection.
//! - Commands and events are opaque JSON; this crate routes, it does
//!   not interpret.
//! - Requests auto-connect: the first `send_request` establishes the
//!   connection on demand.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use core_client::{ConnectionToCore, RequestPayload, Result, WebSocketTransport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let transport = Arc::new(WebSocketTransport::new("ws://localhost:1818"));
//!     let connection = ConnectionToCore::new(transport);
//!
//!     connection.on_event(|event| {
//!         println!("core event: {}", event.payload());
//!     });
//!
//!     let payload = RequestPayload::new("Session.create").with_args(json!({}));
//!     let session = connection.send_request(payload).await?;
//!     println!("session: {session}");
//!
//!     connection.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`ConnectionToCore`], [`PendingMessages`], options |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Typed signals with multi-subscriber fan-out |
//! | [`identifiers`] | Type-safe id wrappers |
//! | [`protocol`] | Wire frame types (internal format) |
//! | [`resolvable`] | Set-once completion slots |
//! | [`transport`] | Transport capability and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Connection lifecycle and the in-flight request table.
///
/// Use [`ConnectionToCore::new`] with any [`Transport`] implementation.
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Typed signals with multi-subscriber fan-out.
pub mod events;

/// Type-safe identifiers for protocol entities.
pub mod identifiers;

/// Wire frame types.
///
/// Internal module defining request/response/event structures.
pub mod protocol;

/// Set-once completion slots observable by multiple awaiters.
pub mod resolvable;

/// Transport capability and implementations.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{
    ConnectionOptions, ConnectionToCore, DEFAULT_CONNECT_TIMEOUT, PendingMessages, PendingRequest,
    SessionProbe,
};

// Error types
pub use error::{Error, RemoteError, Result};

// Event types
pub use events::Signal;

// Identifier types
pub use identifiers::MessageId;

// Protocol types
pub use protocol::{EventFrame, RequestFrame, RequestPayload, ResponseFrame};

// Transport types
pub use transport::{ChannelPeer, ChannelTransport, Transport, TransportSignal, WebSocketTransport};
