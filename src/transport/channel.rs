//! In-memory transport pair.
//!
//! [`ChannelTransport`] implements [`Transport`] over unbounded
//! channels; the matching [`ChannelPeer`] plays the core side. Used by
//! the test suites and for embedding an in-process core.
//!
//! See ARCHITECTURE.md Section 3.4.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, RemoteError, Result};
use crate::identifiers::MessageId;
use crate::protocol::RequestFrame;

use super::{Transport, TransportSignal};

// ============================================================================
// ChannelTransport
// ============================================================================

/// Transport half of an in-memory pair.
///
/// Outbound frames flow to the [`ChannelPeer`]; inbound frames and
/// link-state changes are whatever the peer injects.
pub struct ChannelTransport {
    host: String,
    connected: AtomicBool,
    link_open: Arc<AtomicBool>,
    requests_tx: mpsc::UnboundedSender<RequestFrame>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    signals: Mutex<Option<mpsc::UnboundedReceiver<TransportSignal>>>,
}

impl ChannelTransport {
    /// Creates a connected pair of endpoints.
    #[must_use]
    pub fn pair(host: impl Into<String>) -> (Self, ChannelPeer) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let link_open = Arc::new(AtomicBool::new(true));

        let transport = Self {
            host: host.into(),
            connected: AtomicBool::new(false),
            link_open: Arc::clone(&link_open),
            requests_tx,
            signal_tx: signal_tx.clone(),
            signals: Mutex::new(Some(signal_rx)),
        };

        let peer = ChannelPeer {
            requests_rx,
            signal_tx,
            link_open,
        };

        (transport, peer)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    async fn connect(&self, _timeout: Duration) -> Result<()> {
        if !self.link_open.load(Ordering::Acquire) {
            return Err(Error::transport("peer closed the link"));
        }

        self.connected.store(true, Ordering::Release);
        let _ = self.signal_tx.send(TransportSignal::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        // Controller-driven teardown: no `Disconnected` signal, that
        // would read as link loss.
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, frame: RequestFrame) -> Result<()> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(Error::transport("not connected"));
        }
        if !self.link_open.load(Ordering::Acquire) {
            return Err(Error::transport("peer closed the link"));
        }

        self.requests_tx
            .send(frame)
            .map_err(|_| Error::transport("peer is gone"))
    }

    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<TransportSignal>> {
        self.signals.lock().take()
    }
}

// ============================================================================
// ChannelPeer
// ============================================================================

/// Core half of an in-memory pair.
///
/// Receives the frames the connection sends and injects responses,
/// events, and link-loss signals.
pub struct ChannelPeer {
    requests_rx: mpsc::UnboundedReceiver<RequestFrame>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    link_open: Arc<AtomicBool>,
}

impl ChannelPeer {
    /// Receives the next outbound request frame.
    ///
    /// Returns `None` once the transport half is dropped.
    pub async fn next_request(&mut self) -> Option<RequestFrame> {
        self.requests_rx.recv().await
    }

    /// Injects a raw inbound frame.
    pub fn inject(&self, frame: Value) {
        let _ = self.signal_tx.send(TransportSignal::Message(frame));
    }

    /// Responds to a request with a payload.
    pub fn respond(&self, response_id: MessageId, data: Value) {
        self.inject(json!({ "responseId": response_id, "data": data }));
    }

    /// Responds to a request with an error-shaped payload.
    pub fn respond_error(&self, response_id: MessageId, error: &RemoteError) {
        let data = serde_json::to_value(error).unwrap_or_else(|_| {
            json!({ "name": error.name.clone(), "message": error.message.clone() })
        });
        self.inject(json!({ "responseId": response_id, "data": data }));
    }

    /// Emits a server-initiated event.
    pub fn emit_event(&self, event: Value) {
        self.inject(event);
    }

    /// Severs the link.
    ///
    /// Subsequent sends from the transport half fail and the connection
    /// observes a `Disconnected` signal.
    pub fn drop_link(&self) {
        if self.link_open.swap(false, Ordering::AcqRel) {
            debug!("channel peer dropped the link");
            let _ = self.signal_tx.send(TransportSignal::Disconnected);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
