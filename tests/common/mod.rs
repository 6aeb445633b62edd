//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use core_client::{
    ChannelPeer, ChannelTransport, RequestFrame, Result, Transport, TransportSignal,
};

/// Transport wrapper that counts link operations and can slow the dial
/// down to make lifecycle races deterministic.
pub struct CountingTransport {
    inner: ChannelTransport,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl CountingTransport {
    pub fn pair(host: &str) -> (Arc<Self>, ChannelPeer) {
        Self::build(host, None)
    }

    pub fn pair_with_connect_delay(host: &str, delay: Duration) -> (Arc<Self>, ChannelPeer) {
        Self::build(host, Some(delay))
    }

    fn build(host: &str, connect_delay: Option<Duration>) -> (Arc<Self>, ChannelPeer) {
        let (inner, peer) = ChannelTransport::pair(host);
        let transport = Arc::new(Self {
            inner,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            connect_delay,
        });
        (transport, peer)
    }

    pub fn connect_calls(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    fn host(&self) -> &str {
        self.inner.host()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn set_connected(&self, connected: bool) {
        self.inner.set_connected(connected);
    }

    async fn connect(&self, timeout: Duration) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.connect(timeout).await
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.inner.disconnect().await
    }

    async fn send(&self, frame: RequestFrame) -> Result<()> {
        self.inner.send(frame).await
    }

    fn take_signals(&self) -> Option<mpsc::UnboundedReceiver<TransportSignal>> {
        self.inner.take_signals()
    }
}

/// Services every request with `{ "echo": <command> }`.
pub fn spawn_echo_core(mut peer: ChannelPeer) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = peer.next_request().await {
            let command = frame.command.clone();
            peer.respond(frame.message_id, json!({ "echo": command }));
        }
    })
}

/// Polls `condition` until it holds or the deadline passes.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Duration::from_secs(2);
    let poll = Duration::from_millis(5);
    let started = std::time::Instant::now();
    while !condition() {
        assert!(
            started.elapsed() < deadline,
            "condition not reached within {deadline:?}"
        );
        tokio::time::sleep(poll).await;
    }
}
