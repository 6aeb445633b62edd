//! WebSocket client transport.
//!
//! Dials the core's WebSocket endpoint and pumps the socket from a
//! dedicated I/O task. Outbound sends travel through a command channel
//! carrying a one-shot ack so callers observe write failures.
//!
//! See ARCHITECTURE.md Section 3.3.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, from_str, to_string};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::RequestFrame;

use super::{Transport, TransportSignal};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the I/O task.
enum IoCommand {
    /// Write one serialized frame; ack the result.
    Send {
        text: String,
        ack: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop the task.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket connection to a remote core.
///
/// The transport is reusable: after the link drops, a later `connect`
/// dials again and spawns a fresh I/O task.
pub struct WebSocketTransport {
    url: String,
    host: String,
    connected: Arc<AtomicBool>,
    commands: Mutex<Option<mpsc::UnboundedSender<IoCommand>>>,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    signals: Mutex<Option<mpsc::UnboundedReceiver<TransportSignal>>>,
}

impl WebSocketTransport {
    /// Creates a transport for the given `ws://` or `wss://` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        Self {
            host: host_of(&url),
            url,
            connected: Arc::new(AtomicBool::new(false)),
            commands: Mutex::new(None),
            signal_tx,
            signals: Mutex::new(Some(signal_rx)),
        }
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Socket I/O loop.
    ///
    /// Runs until the remote closes, the socket errors, or a shutdown
    /// command arrives; then clears the connected flag and emits
    /// `Disconnected`.
    async fn run_io_loop(
        ws_stream: WsStream,
        mut commands: mpsc::UnboundedReceiver<IoCommand>,
        signal_tx: mpsc::UnboundedSender<TransportSignal>,
        connected: Arc<AtomicBool>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();
        // A controller-driven shutdown is not link loss; only the
        // remote-close and error exits report `Disconnected`.
        let mut signal_link_loss = true;

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match from_str::<Value>(&text) {
                                Ok(frame) => {
                                    let _ = signal_tx.send(TransportSignal::Message(frame));
                                }
                                Err(parse_error) => {
                                    warn!(error = %parse_error, "failed to parse inbound frame");
                                }
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("websocket closed by remote");
                            break;
                        }

                        Some(Err(socket_error)) => {
                            error!(error = %socket_error, "websocket error");
                            break;
                        }

                        None => {
                            debug!("websocket stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong, Frame.
                        _ => {}
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(IoCommand::Send { text, ack }) => {
                            let result = ws_write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(Error::from);
                            let _ = ack.send(result);
                        }

                        Some(IoCommand::Shutdown) => {
                            debug!("shutdown command received");
                            signal_link_loss = false;
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("command channel closed");
                            signal_link_loss = false;
                            break;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::Release);
        if signal_link_loss {
            let _ = signal_tx.send(TransportSignal::Disconnected);
        }
        debug!("websocket io loop terminated");
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn host(&self) -> &str {
        &self.host
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    async fn connect(&self, connect_timeout: Duration) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let (ws_stream, _response) = timeout(connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))??;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.commands.lock() = Some(command_tx);
        self.connected.store(true, Ordering::Release);
        let _ = self.signal_tx.send(TransportSignal::Connected);

        tokio::spawn(Self::run_io_loop(
            ws_stream,
            command_rx,
            self.signal_tx.clone(),
            Arc::clone(&self.connected),
        ));

        debug!(url = %self.url, "websocket connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(commands) = self.commands.lock().take() {
            let _ = commands.send(IoCommand::Shutdown);
        }
        self.connected.store(false, Ordering::Release);
        Ok(())
    }

    async fn send(&self, frame: RequestFrame) -> Result<()> {
        let text = to_string(&frame)?;

        let commands = self
            .commands
            .lock()
            .clone()
            .ok_or_else(|| Error::transport("websocket is not connected"))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        commands
            .send(IoCommand::Send {
                text,
                ack: ack_tx,
            })
            .map_err(|_| Error::transport("websocket io loop is gone"))?;

        trace!(message_id = %frame.message_id, "frame queued");
        ack_rx
            .await
            .map_err(|_| Error::transport("websocket closed before the frame was written"))?
    }

    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<TransportSignal>> {
        self.signals.lock().take()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Strips the scheme and path from a WebSocket URL.
fn host_of(url: &str) -> String {
    let without_scheme = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================
