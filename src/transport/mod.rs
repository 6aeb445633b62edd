//! Transport layer.
//!
//! The connection talks to the core through the [`Transport`]
//! capability. A transport carries outbound request frames, delivers
//! inbound frames, and reports link state changes through a signal
//! channel the connection consumes exclusively.
//!
//! See ARCHITECTURE.md Section 3 for the contract.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | In-memory transport pair for tests and embedding |
//! | `websocket` | WebSocket client transport |

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::protocol::RequestFrame;

// ============================================================================
// Submodules
// ============================================================================

/// In-memory transport pair.
pub mod channel;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelPeer, ChannelTransport};
pub use websocket::WebSocketTransport;

// ============================================================================
// TransportSignal
// ============================================================================

/// A link-state or message notification from a transport.
#[derive(Debug, Clone)]
pub enum TransportSignal {
    /// The link was established.
    Connected,

    /// The link was lost.
    ///
    /// Reports unexpected loss only: a teardown the connection drove
    /// through [`Transport::disconnect`] must not be signalled back,
    /// or a late-draining signal could terminate the next generation.
    Disconnected,

    /// One inbound frame arrived.
    Message(Value),
}

// ============================================================================
// Transport
// ============================================================================

/// Bidirectional framed channel to a remote core.
///
/// A connection owns its transport exclusively while connected: it
/// drives `connect`/`disconnect`, writes the connected flag, and is the
/// only consumer of the signal channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Identifies the remote endpoint; used in error messages.
    fn host(&self) -> &str;

    /// Returns the current link flag.
    fn is_connected(&self) -> bool;

    /// Writes the link flag.
    ///
    /// The owning connection marks the transport connected after a
    /// completed handshake and disconnected during teardown.
    fn set_connected(&self, connected: bool);

    /// Performs link setup within the deadline.
    ///
    /// Transports whose link is established out of band keep the
    /// default no-op.
    async fn connect(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    /// Performs link teardown.
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Enqueues one outbound request frame.
    ///
    /// # Errors
    ///
    /// Rejects with [`Error::Transport`](crate::Error::Transport) when
    /// the frame could not be handed to the link.
    async fn send(&self, frame: RequestFrame) -> Result<()>;

    /// Hands over the signal channel.
    ///
    /// Returns `None` after the first call; the receiving half belongs
    /// to exactly one connection.
    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<TransportSignal>>;
}
