//! Connection lifecycle state machine.
//!
//! [`ConnectionToCore`] multiplexes request/response and event traffic
//! over one [`Transport`] and manages the logical connection: lazy
//! establishment, handshake hooks, orderly teardown, and abrupt
//! termination.
//!
//! See ARCHITECTURE.md Section 4 for the lifecycle contract.
//!
//! # Lifecycle
//!
//! ```text
//!            connect / auto-connect          disconnect
//!   (idle) ───────────────────────► (connected) ─────────► (closed)
//!      ▲                                 │
//!      │                                 │ transport `Disconnected`
//!      └──────── fresh connect ◄─────────┴──► termination path
//! ```
//!
//! All controller state lives behind one mutex that is never held
//! across an await point; transport signals are pumped by a single
//! task, so inbound dispatch is serialized per connection.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{self, BoxFuture, Either};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::events::Signal;
use crate::identifiers::MessageId;
use crate::protocol::{EventFrame, InboundMessage, RequestFrame, RequestPayload, ResponseData, ResponseFrame};
use crate::resolvable::Resolvable;
use crate::transport::{Transport, TransportSignal};

use super::options::ConnectionOptions;
use super::pending::PendingMessages;

// ============================================================================
// Types
// ============================================================================

/// Injected `has_active_sessions` predicate.
///
/// Consulted by the handshake-abort check: an explicit connect racing a
/// teardown fails loudly only when the caller still has outstanding
/// work. Defaults to `false`.
pub type SessionProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// A user-supplied lifecycle hook.
///
/// Hooks receive a handle to the connection so they can exchange
/// handshake requests with the core; requests sent from inside a hook
/// are internal (ARCHITECTURE.md Section 4.4).
pub type LifecycleHook =
    Arc<dyn Fn(ConnectionToCore) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Which hook gate to toggle while a hook runs.
#[derive(Clone, Copy)]
enum HookGate {
    Connect,
    Disconnect,
}

#[derive(Default)]
struct Hooks {
    after_connect: Option<LifecycleHook>,
    before_disconnect: Option<LifecycleHook>,
}

// ============================================================================
// Connection State
// ============================================================================

/// Mutable lifecycle state, one generation at a time.
#[derive(Default)]
struct ConnectionState {
    /// Shared connect attempt; present from the first `connect` call
    /// until a completed disconnect clears it.
    connect: Option<Resolvable<Result<()>>>,

    /// When the current connect attempt started.
    connect_started_at: Option<Instant>,

    /// Whether the first connect was triggered by `send_request`.
    did_auto_connect: bool,

    /// Shared disconnect attempt; its presence is the disconnecting
    /// signal. Created once per generation.
    disconnect: Option<Resolvable<()>>,

    /// When the teardown started.
    disconnect_started_at: Option<Instant>,

    /// Fatal error supplied to `disconnect_with_error`, if any.
    disconnect_error: Option<Error>,

    /// Latched on the first teardown observation of this generation,
    /// whether orderly or abrupt.
    terminated: bool,

    /// True only while the `after_connect` hook runs.
    sending_connect: bool,

    /// True only while the `before_disconnect` hook runs.
    sending_disconnect: bool,

    /// Id of the connect hook's in-flight internal request.
    connect_message_id: Option<MessageId>,

    /// Id of the disconnect hook's in-flight internal request.
    disconnect_message_id: Option<MessageId>,
}

struct ConnectionInner {
    transport: Arc<dyn Transport>,
    pending: PendingMessages,
    options: ConnectionOptions,
    state: Mutex<ConnectionState>,
    hooks: Mutex<Hooks>,
    session_probe: Mutex<Option<SessionProbe>>,
    connected_signal: Signal<()>,
    disconnected_signal: Signal<Option<Error>>,
    event_signal: Signal<EventFrame>,
}

// ============================================================================
// ConnectionToCore
// ============================================================================

/// Client connection controller for a remote core.
///
/// Cheap to clone; all clones share one logical connection. Requests
/// auto-connect on first use, responses are matched to requests by
/// message id, and server-initiated events fan out on the `event`
/// signal.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use core_client::{ConnectionToCore, RequestPayload, Result, WebSocketTransport};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let transport = Arc::new(WebSocketTransport::new("ws://localhost:1818"));
///     let connection = ConnectionToCore::new(transport);
///
///     let payload = RequestPayload::new("Session.create").with_args(json!({}));
///     let session = connection.send_request(payload).await?;
///     println!("session: {session}");
///
///     connection.disconnect().await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct ConnectionToCore {
    inner: Arc<ConnectionInner>,
}

// ============================================================================
// ConnectionToCore - Construction
// ============================================================================

impl ConnectionToCore {
    /// Creates a connection with default options.
    ///
    /// Must be called within a tokio runtime: the signal pump task is
    /// spawned here.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, ConnectionOptions::default())
    }

    /// Creates a connection with explicit options.
    #[must_use]
    pub fn with_options(transport: Arc<dyn Transport>, options: ConnectionOptions) -> Self {
        let mut state = ConnectionState::default();
        if options.skip_handshake && transport.is_connected() {
            // Adopted link: start this generation already connected.
            state.connect = Some(Resolvable::resolved(Ok(())));
            state.connect_started_at = Some(Instant::now());
        }

        let signals = transport.take_signals();
        let connection = Self {
            inner: Arc::new(ConnectionInner {
                transport,
                pending: PendingMessages::new(),
                options,
                state: Mutex::new(state),
                hooks: Mutex::new(Hooks::default()),
                session_probe: Mutex::new(None),
                connected_signal: Signal::new("connected"),
                disconnected_signal: Signal::new("disconnected"),
                event_signal: Signal::new("event"),
            }),
        };

        match signals {
            Some(receiver) => connection.spawn_signal_pump(receiver),
            None => warn!(
                host = connection.inner.transport.host(),
                "transport signals already taken; inbound frames will not be routed"
            ),
        }

        connection
    }

    fn spawn_signal_pump(
        &self,
        mut signals: tokio::sync::mpsc::UnboundedReceiver<TransportSignal>,
    ) {
        // Weak so the pump does not keep a dropped connection alive
        // through the transport it owns.
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(inner) = inner.upgrade() else { break };
                let connection = ConnectionToCore { inner };
                match signal {
                    TransportSignal::Message(frame) => connection.on_message(frame),
                    TransportSignal::Disconnected => connection.on_connection_terminated().await,
                    TransportSignal::Connected => {
                        trace!(host = connection.inner.transport.host(), "transport link up");
                    }
                }
            }
            debug!("transport signal channel closed");
        });
    }
}

// ============================================================================
// ConnectionToCore - Accessors
// ============================================================================

impl ConnectionToCore {
    /// Returns the transport host.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &str {
        self.inner.transport.host()
    }

    /// Returns the transport's connected flag.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns `true` while a teardown is in progress or finished for
    /// this generation.
    #[inline]
    #[must_use]
    pub fn is_disconnecting(&self) -> bool {
        self.inner.state.lock().disconnect.is_some()
    }

    /// Installs the `after_connect` hook.
    pub fn set_after_connect<F, Fut>(&self, hook: F)
    where
        F: Fn(ConnectionToCore) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inner.hooks.lock().after_connect = Some(Arc::new(move |connection| {
            Box::pin(hook(connection))
        }));
    }

    /// Installs the `before_disconnect` hook.
    ///
    /// The hook runs in both the orderly and the abrupt teardown path
    /// and must therefore be idempotent.
    pub fn set_before_disconnect<F, Fut>(&self, hook: F)
    where
        F: Fn(ConnectionToCore) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.inner.hooks.lock().before_disconnect = Some(Arc::new(move |connection| {
            Box::pin(hook(connection))
        }));
    }

    /// Installs the active-session probe.
    pub fn set_session_probe(&self, probe: impl Fn() -> bool + Send + Sync + 'static) {
        *self.inner.session_probe.lock() = Some(Arc::new(probe));
    }

    /// Subscribes to the `connected` signal.
    pub fn on_connected(&self, listener: impl Fn(&()) + Send + Sync + 'static) {
        self.inner.connected_signal.subscribe(listener);
    }

    /// Subscribes to the `disconnected` signal.
    ///
    /// The payload is the fatal error the teardown was started with,
    /// if any.
    pub fn on_disconnected(&self, listener: impl Fn(&Option<Error>) + Send + Sync + 'static) {
        self.inner.disconnected_signal.subscribe(listener);
    }

    /// Subscribes to the `event` signal.
    pub fn on_event(&self, listener: impl Fn(&EventFrame) + Send + Sync + 'static) {
        self.inner.event_signal.subscribe(listener);
    }

    fn has_active_sessions(&self) -> bool {
        let probe = self.inner.session_probe.lock().clone();
        probe.is_some_and(|probe| probe())
    }
}

// ============================================================================
// ConnectionToCore - Connect
// ============================================================================

impl ConnectionToCore {
    /// Establishes the logical connection.
    ///
    /// Idempotent: every call joins the same attempt and observes the
    /// same outcome. A failed attempt stays failed until a completed
    /// disconnect opens a new generation.
    ///
    /// # Errors
    ///
    /// Returns the transport's connect failure, a disconnected error
    /// when a teardown raced an explicit connect with active sessions,
    /// or the `after_connect` hook's failure.
    pub async fn connect(&self) -> Result<()> {
        self.connect_with_timeout(self.inner.options.connect_timeout)
            .await
    }

    /// Establishes the logical connection under an explicit deadline.
    pub async fn connect_with_timeout(&self, timeout: Duration) -> Result<()> {
        self.connect_internal(false, timeout).await
    }

    async fn connect_internal(&self, is_auto_connect: bool, timeout: Duration) -> Result<()> {
        let (attempt, is_driver) = {
            let mut state = self.inner.state.lock();
            match &state.connect {
                Some(attempt) => (attempt.clone(), false),
                None => {
                    let attempt = Resolvable::new();
                    state.connect = Some(attempt.clone());
                    state.connect_started_at = Some(Instant::now());
                    state.did_auto_connect = is_auto_connect;
                    // A fresh connect opens a new generation.
                    state.disconnect = None;
                    state.disconnect_started_at = None;
                    state.disconnect_error = None;
                    state.terminated = false;
                    state.connect_message_id = None;
                    state.disconnect_message_id = None;
                    (attempt, true)
                }
            }
        };

        if is_driver {
            // Driven from a spawned task so a caller that drops its
            // future cannot strand the other waiters mid-handshake.
            let connection = self.clone();
            let driver_attempt = attempt.clone();
            tokio::spawn(async move {
                let result = connection
                    .drive_connect(&driver_attempt, is_auto_connect, timeout)
                    .await;
                driver_attempt.resolve(result);
            });
        }

        attempt.wait().await
    }

    /// Runs the handshake; only ever executed by the call that created
    /// the attempt.
    async fn drive_connect(
        &self,
        attempt: &Resolvable<Result<()>>,
        is_auto_connect: bool,
        timeout: Duration,
    ) -> Result<()> {
        let transport = &self.inner.transport;
        debug!(host = transport.host(), auto = is_auto_connect, "connecting to core");

        transport.connect(timeout).await?;

        // Handshake-abort check: an explicit connect that raced a
        // teardown while sessions are still active must fail loudly
        // rather than succeed into a dying connection.
        let teardown_started = {
            let state = self.inner.state.lock();
            state.disconnect.is_some() || state.terminated
        };
        if teardown_started && !is_auto_connect && self.has_active_sessions() {
            return Err(Error::disconnected(transport.host()));
        }

        // A parallel teardown may have pre-resolved the attempt; the
        // handshake hook only runs for a live attempt.
        if !attempt.is_resolved() {
            let hook = self.inner.hooks.lock().after_connect.clone();
            if let Some(hook) = hook {
                self.run_hook(hook, HookGate::Connect).await?;
            }
        }

        let elapsed_ms = self
            .inner
            .state
            .lock()
            .connect_started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();
        debug!(host = transport.host(), elapsed_ms, "connected to core");

        self.inner.connected_signal.emit(&());
        transport.set_connected(true);
        Ok(())
    }
}

// ============================================================================
// ConnectionToCore - Disconnect
// ============================================================================

impl ConnectionToCore {
    /// Tears down the logical connection.
    ///
    /// Idempotent: re-entrant calls await the first attempt and return
    /// cleanly; only the first caller observes teardown failures.
    ///
    /// # Errors
    ///
    /// Returns the `before_disconnect` hook's failure or the
    /// transport's disconnect failure. The teardown is observably
    /// complete either way.
    pub async fn disconnect(&self) -> Result<()> {
        self.disconnect_internal(None).await
    }

    /// Tears down the logical connection, recording a fatal error.
    ///
    /// The error is delivered as the `disconnected` signal payload.
    pub async fn disconnect_with_error(&self, fatal_error: Error) -> Result<()> {
        self.disconnect_internal(Some(fatal_error)).await
    }

    async fn disconnect_internal(&self, fatal_error: Option<Error>) -> Result<()> {
        // Sampled outside the state lock: the probe is user code.
        let active_sessions = self.has_active_sessions();

        let attempt = {
            let mut state = self.inner.state.lock();
            if let Some(existing) = &state.disconnect {
                let existing = existing.clone();
                drop(state);
                existing.wait().await;
                return Ok(());
            }

            let attempt = Resolvable::new();
            state.disconnect = Some(attempt.clone());
            state.disconnect_started_at = Some(Instant::now());
            state.disconnect_error = fatal_error;

            // Let a parallel connect finish silently unless the
            // handshake-abort check is going to reject it instead.
            if let Some(connect) = &state.connect {
                if state.did_auto_connect || !active_sessions {
                    connect.resolve(Ok(()));
                }
            }

            attempt
        };

        // Driven from a spawned task so a caller that drops its future
        // cannot leave the teardown half-done.
        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let connection = self.clone();
        let driver_attempt = attempt.clone();
        tokio::spawn(async move {
            let result = connection.drive_disconnect().await;
            // Teardown is observably complete even when a step failed.
            driver_attempt.resolve(());
            let _ = result_tx.send(result);
        });

        result_rx.await.unwrap_or(Ok(()))
    }

    async fn drive_disconnect(&self) -> Result<()> {
        let transport = &self.inner.transport;
        debug!(host = transport.host(), "disconnecting from core");

        // Cancel before the hook runs so it observes an empty queue of
        // user requests; its own internal requests are exempt.
        self.inner
            .pending
            .cancel(&Error::disconnected(transport.host()));

        let hook = self.inner.hooks.lock().before_disconnect.clone();
        if let Some(hook) = hook {
            self.run_hook(hook, HookGate::Disconnect).await?;
        }

        // Always-signal: the disconnected emission precedes the
        // transport teardown so observers hear about it even when the
        // link refuses to close cleanly. Listeners still observe the
        // transport marked connected.
        if self.mark_terminated() {
            let fatal_error = self.inner.state.lock().disconnect_error.clone();
            self.inner.disconnected_signal.emit(&fatal_error);
        }
        transport.set_connected(false);

        transport.disconnect().await?;

        // Allow a later connect to open a fresh generation.
        let elapsed_ms = {
            let mut state = self.inner.state.lock();
            state.connect = None;
            state
                .disconnect_started_at
                .map(|started| started.elapsed().as_millis() as u64)
                .unwrap_or_default()
        };
        debug!(host = transport.host(), elapsed_ms, "disconnected from core");
        Ok(())
    }

    /// Latches the termination flag; returns `true` on the transition.
    fn mark_terminated(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.terminated {
            false
        } else {
            state.terminated = true;
            true
        }
    }
}

// ============================================================================
// ConnectionToCore - Requests
// ============================================================================

impl ConnectionToCore {
    /// Sends a request and awaits its response payload.
    ///
    /// Connects first when no connection exists yet (auto-connect);
    /// requests sent from inside a lifecycle hook skip that step and
    /// are treated as internal handshake traffic.
    ///
    /// # Errors
    ///
    /// - the auto-connect failure, if establishing the connection fails
    /// - [`Error::Transport`](crate::Error::Transport) if the send fails
    ///   before a response arrived
    /// - the remote error carried by the response, after the remapping
    ///   rules of ARCHITECTURE.md Section 6.2
    ///
    /// A request cancelled by a concurrent disconnect resolves with
    /// `Value::Null` instead of an error.
    pub async fn send_request(&self, payload: RequestPayload) -> Result<Value> {
        self.send_request_internal(payload, None).await
    }

    /// Sends a request with a response deadline.
    ///
    /// # Errors
    ///
    /// As [`send_request`](Self::send_request), plus
    /// [`Error::ResponseTimeout`](crate::Error::ResponseTimeout) when
    /// the deadline elapses first.
    pub async fn send_request_with_timeout(
        &self,
        payload: RequestPayload,
        timeout: Duration,
    ) -> Result<Value> {
        self.send_request_internal(payload, Some(timeout)).await
    }

    async fn send_request_internal(
        &self,
        payload: RequestPayload,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        // Sampled at entry: a hook-issued request stays internal even
        // if the gate drops while it is in flight.
        let (is_connect, is_disconnect) = {
            let state = self.inner.state.lock();
            (state.sending_connect, state.sending_disconnect)
        };

        if !is_connect && !is_disconnect {
            self.connect_internal(true, self.inner.options.connect_timeout)
                .await?;
        }

        let is_internal = is_connect || is_disconnect;
        let (message_id, response) = self.inner.pending.create(timeout, is_internal);
        if is_internal {
            let mut state = self.inner.state.lock();
            if is_connect {
                state.connect_message_id = Some(message_id.clone());
            } else {
                state.disconnect_message_id = Some(message_id.clone());
            }
        }

        let frame = RequestFrame::new(message_id.clone(), payload);
        trace!(message_id = %message_id, command = %frame.command, "sending request");

        // Await the response and the send together: send failures
        // surface, but a response that lands first wins and a late
        // send error is irrelevant.
        let send = self.inner.transport.send(frame);
        let outcome = match future::select(response, send).await {
            Either::Left((settled, _send)) => settled,
            Either::Right((sent, response)) => match sent {
                Ok(()) => response.await,
                Err(send_error) => Err(send_error),
            },
        };

        if is_internal {
            let mut state = self.inner.state.lock();
            if is_connect && state.connect_message_id.as_ref() == Some(&message_id) {
                state.connect_message_id = None;
            }
            if is_disconnect && state.disconnect_message_id.as_ref() == Some(&message_id) {
                state.disconnect_message_id = None;
            }
        }

        match outcome {
            Ok(data) => Ok(data),
            Err(error) => {
                if error.is_cancellation() && self.is_disconnecting() {
                    // Superseded by teardown: the caller gets an empty
                    // result, not a cancellation error.
                    return Ok(Value::Null);
                }
                self.inner.pending.remove(&message_id);
                Err(error)
            }
        }
    }
}

// ============================================================================
// ConnectionToCore - Inbound Dispatch
// ============================================================================

impl ConnectionToCore {
    /// Routes one raw inbound frame.
    fn on_message(&self, frame: Value) {
        match InboundMessage::classify(frame) {
            Some(InboundMessage::Response(response)) => self.on_response(response),
            Some(InboundMessage::Event(event)) => self.dispatch_event(event),
            None => trace!("dropping unrecognized inbound frame"),
        }
    }

    /// Settles the pending entry matching a response.
    fn on_response(&self, frame: ResponseFrame) {
        let ResponseFrame { response_id, data } = frame;

        match ResponseData::classify(data) {
            ResponseData::Payload(value) => self.inner.pending.resolve(&response_id, value),
            ResponseData::Error(mut remote) => {
                let marked_disconnecting = remote.scrub_disconnecting_marker();
                let disconnect_adjacent = self.is_disconnecting()
                    || remote.is_session_closed()
                    || marked_disconnecting;

                let error = if disconnect_adjacent && !remote.survives_disconnect() {
                    Error::disconnected(self.inner.transport.host())
                } else {
                    Error::Remote(remote)
                };

                self.inner.pending.reject(&response_id, error);
            }
        }
    }

    /// Forwards a server-initiated event verbatim.
    fn dispatch_event(&self, frame: EventFrame) {
        self.inner.event_signal.emit(&frame);
    }

    /// Transport-level `Disconnected` observer.
    ///
    /// Runs at most once per generation; the orderly disconnect path
    /// shares the latch so the two paths cannot double-teardown.
    async fn on_connection_terminated(&self) {
        if !self.mark_terminated() {
            return;
        }

        let transport = &self.inner.transport;
        debug!(host = transport.host(), "connection terminated by transport");
        transport.set_connected(false);

        let (connect_message_id, disconnect_message_id, did_auto_connect, fatal_error) = {
            let state = self.inner.state.lock();
            (
                state.connect_message_id.clone(),
                state.disconnect_message_id.clone(),
                state.did_auto_connect,
                state.disconnect_error.clone(),
            )
        };

        self.inner.disconnected_signal.emit(&fatal_error);

        // Settle an in-flight internal connect request: an implicit
        // connect accepts the silent close, an explicit one is told.
        if let Some(id) = connect_message_id {
            if did_auto_connect {
                self.inner.pending.resolve(&id, Value::Null);
            } else {
                self.inner
                    .pending
                    .reject(&id, Error::disconnected(transport.host()));
            }
        }

        // The teardown the disconnect hook was waiting on has happened
        // by other means.
        if let Some(id) = disconnect_message_id {
            self.inner.pending.resolve(&id, Value::Null);
        }

        self.inner
            .pending
            .cancel(&Error::disconnected(transport.host()));

        let hook = self.inner.hooks.lock().before_disconnect.clone();
        if let Some(hook) = hook {
            if let Err(hook_error) = self.run_hook(hook, HookGate::Disconnect).await {
                warn!(
                    host = transport.host(),
                    error = %hook_error,
                    "disconnect hook failed after connection loss"
                );
            }
        }
    }
}

// ============================================================================
// ConnectionToCore - Hook Driver
// ============================================================================

impl ConnectionToCore {
    /// Runs a lifecycle hook with its gate held for the whole duration.
    async fn run_hook(&self, hook: LifecycleHook, gate: HookGate) -> Result<()> {
        self.set_gate(gate, true);
        let result = hook(self.clone()).await;
        self.set_gate(gate, false);
        result
    }

    fn set_gate(&self, gate: HookGate, value: bool) {
        let mut state = self.inner.state.lock();
        match gate {
            HookGate::Connect => state.sending_connect = value,
            HookGate::Disconnect => state.sending_disconnect = value,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
