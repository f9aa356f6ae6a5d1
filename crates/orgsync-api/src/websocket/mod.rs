//! Persistent Socket.IO push channel with bounded auto-reconnect.
//!
//! One [`TransportChannel`] owns the connection for a whole session. It
//! opens a link through a [`Connector`], performs the Engine.IO and
//! namespace handshake, answers heartbeats, and fans inbound events out
//! through a [`tokio::sync::broadcast`] channel. Streams returned by
//! [`TransportChannel::on`] keep working across reconnects.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use orgsync_api::websocket::{ReconnectConfig, TransportChannel, WsConnector};
//!
//! let connector = WsConnector::new(&"http://localhost:3000".parse()?)?;
//! let channel = TransportChannel::new(connector, "/office-management", ReconnectConfig::default());
//! let mut created = channel.on("staff_created");
//! channel.connect();
//!
//! while let Some(payload) = created.next().await {
//!     println!("staff created: {payload}");
//! }
//! ```

pub mod codec;
mod connector;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::Error;
use codec::{EnginePacket, SocketPacket};
pub use connector::{Connector, Link, WsConnector};

// ── Constants ────────────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound on open + namespace join before the attempt counts as failed.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Synthetic lifecycle events published on the event bus.
pub const CONNECT_EVENT: &str = "connect";
pub const DISCONNECT_EVENT: &str = "disconnect";

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// The retry schedule ran out. Only an explicit `connect()` leaves this state.
    GivenUp,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// `true` while a connection loop is running.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Connected | Self::Reconnecting { .. }
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::GivenUp => f.write_str("given up"),
        }
    }
}

// ── ReconnectConfig ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay before every attempt.
    #[default]
    Fixed,
    /// `delay * 2^(attempt - 1)`, capped at `max_delay`.
    Exponential,
}

/// Retry schedule applied after an unexpected disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before each reconnection attempt. Default: 1s.
    pub delay: Duration,

    /// Upper bound for exponential backoff. Default: 30s.
    pub max_delay: Duration,

    /// Attempts before giving up. `None` retries forever. Default: 5.
    pub max_attempts: Option<u32>,

    pub backoff: Backoff,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(5),
            backoff: Backoff::Fixed,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

// ── PushEvent ────────────────────────────────────────────────────────

/// One named event delivered by the server (or a synthetic lifecycle event).
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub name: String,
    pub payload: Value,
}

// ── TransportChannel ─────────────────────────────────────────────────

/// Handle to the session's single push connection.
///
/// Cheaply cloneable. [`connect`](Self::connect) spawns the connection
/// loop; [`shutdown`](Self::shutdown) tears it down for good.
#[derive(Clone)]
pub struct TransportChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    connector: Arc<dyn Connector>,
    namespace: String,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<Arc<PushEvent>>,
    /// Writer for the live link; `None` whenever not connected.
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    /// Guards loop ownership and every state transition.
    run: Mutex<RunSlot>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct RunSlot {
    generation: u64,
    cancel: Option<CancellationToken>,
}

impl TransportChannel {
    pub fn new(
        connector: impl Connector,
        namespace: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self::with_connector(Arc::new(connector), namespace, reconnect)
    }

    pub fn with_connector(
        connector: Arc<dyn Connector>,
        namespace: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                connector,
                namespace: namespace.into(),
                reconnect,
                state,
                events,
                outbound: Mutex::new(None),
                run: Mutex::new(RunSlot::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    /// Start connecting unless a connection loop is already running.
    ///
    /// Idempotent. From `Disconnected` or `GivenUp` this is the explicit
    /// recovery trigger.
    pub fn connect(&self) {
        let mut run = self.inner.lock_run();
        let current = *self.inner.state.borrow();
        if current.is_active() {
            trace!(state = ?current, "connect() ignored, loop already running");
            return;
        }
        if self.inner.shutdown.is_cancelled() {
            warn!("connect() after shutdown ignored");
            return;
        }

        run.generation += 1;
        let generation = run.generation;
        let cancel = self.inner.shutdown.child_token();
        run.cancel = Some(cancel.clone());
        self.inner.state.send_replace(ConnectionState::Connecting);
        drop(run);

        info!(namespace = %self.inner.namespace, "connecting push channel");
        tokio::spawn(connection_loop(Arc::clone(&self.inner), generation, cancel));
    }

    /// Close the connection deliberately. No automatic retry follows.
    pub fn disconnect(&self) {
        let mut run = self.inner.lock_run();
        if let Some(cancel) = run.cancel.take() {
            cancel.cancel();
        }
        run.generation += 1;
        self.inner.lock_outbound().take();
        if self.inner.state.send_replace(ConnectionState::Disconnected) == ConnectionState::Connected {
            self.inner.publish(DISCONNECT_EVENT, Value::Null);
        }
        debug!("push channel disconnected");
    }

    /// Disconnect and refuse any further `connect()`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.disconnect();
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Every inbound event, lifecycle events included.
    pub fn events(&self) -> broadcast::Receiver<Arc<PushEvent>> {
        self.inner.events.subscribe()
    }

    /// Payloads of every delivery of `event`, from now on.
    ///
    /// The stream survives reconnects. It ends once the channel is shut
    /// down and every handle and the connection loop have been dropped.
    pub fn on(&self, event: impl Into<String>) -> BoxStream<'static, Value> {
        let name = event.into();
        let stream = BroadcastStream::new(self.inner.events.subscribe()).filter_map(move |item| {
            match item {
                Ok(evt) if evt.name == name => Some(evt.payload.clone()),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(event = %name, skipped, "event subscriber lagged");
                    None
                }
            }
        });
        Box::pin(stream)
    }

    /// Emit `event` to the server. Best effort: dropped with a warning
    /// when not connected, never retried.
    pub fn send(&self, event: &str, payload: &Value) {
        if !self.current_state().is_connected() {
            warn!(event, "socket not connected, cannot emit event");
            return;
        }
        let Some(tx) = self.inner.lock_outbound().clone() else {
            warn!(event, "socket not connected, cannot emit event");
            return;
        };
        let frame = codec::encode_event(&self.inner.namespace, event, payload);
        if let Err(e) = tx.try_send(frame) {
            warn!(event, error = %e, "failed to queue outbound event");
        }
    }
}

impl ChannelInner {
    fn lock_run(&self) -> MutexGuard<'_, RunSlot> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbound(&self) -> MutexGuard<'_, Option<mpsc::Sender<String>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_run().generation == generation
    }

    /// Apply a transition on behalf of loop `generation`. Stale loops
    /// (superseded by `disconnect()` or a newer `connect()`) are ignored.
    fn transition(&self, generation: u64, next: ConnectionState) -> bool {
        let run = self.lock_run();
        if run.generation != generation {
            return false;
        }
        self.state.send_replace(next);
        true
    }

    fn publish(&self, name: &str, payload: Value) {
        // No subscribers is fine.
        let _ = self.events.send(Arc::new(PushEvent {
            name: name.to_owned(),
            payload,
        }));
    }
}

// ── Connection loop ──────────────────────────────────────────────────

/// connect → serve → on drop, wait → reconnect, until the schedule runs out.
async fn connection_loop(inner: Arc<ChannelInner>, generation: u64, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = run_session(&inner, generation) => result,
        };

        match result {
            // Established, then dropped: the retry budget starts over.
            Ok(()) => attempt = 0,
            Err(e) => warn!(error = %e, attempt, "push connection attempt failed"),
        }

        if let Some(max) = inner.reconnect.max_attempts {
            if attempt >= max {
                error!(max_attempts = max, "push reconnection limit reached, giving up");
                inner.transition(generation, ConnectionState::GivenUp);
                break;
            }
        }

        attempt += 1;
        if !inner.transition(generation, ConnectionState::Reconnecting { attempt }) {
            break;
        }
        let delay = inner.reconnect.delay_for(attempt);
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!(generation, "push connection loop exiting");
}

/// One link lifetime. `Err` if the handshake never completed, `Ok` once an
/// established connection ends.
async fn run_session(inner: &ChannelInner, generation: u64) -> Result<(), Error> {
    let timeout_secs = HANDSHAKE_TIMEOUT.as_secs();
    let (outbound, mut inbound, heartbeat) = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        let Link {
            outbound,
            mut inbound,
        } = inner.connector.open().await?;
        let heartbeat = handshake(&inner.namespace, &outbound, &mut inbound).await?;
        Ok::<_, Error>((outbound, inbound, heartbeat))
    })
    .await
    .map_err(|_| Error::Timeout { timeout_secs })??;

    *inner.lock_outbound() = Some(outbound.clone());
    if !inner.transition(generation, ConnectionState::Connected) {
        inner.lock_outbound().take();
        return Ok(());
    }
    info!(namespace = %inner.namespace, "push channel connected");
    inner.publish(CONNECT_EVENT, Value::Null);

    serve(inner, &outbound, &mut inbound, heartbeat).await;

    inner.lock_outbound().take();
    if inner.is_current(generation) {
        info!("push connection lost");
        inner.publish(DISCONNECT_EVENT, Value::Null);
    }
    Ok(())
}

/// Wait for the Engine `open`, join the namespace, wait for its ack.
/// Returns the heartbeat window announced in `open`.
async fn handshake(
    namespace: &str,
    outbound: &mpsc::Sender<String>,
    inbound: &mut mpsc::Receiver<String>,
) -> Result<Duration, Error> {
    let closed = || Error::WebSocketClosed {
        code: 1006,
        reason: "link closed during handshake".into(),
    };

    let mut heartbeat = None;
    loop {
        let frame = inbound.recv().await.ok_or_else(closed)?;
        match codec::decode(&frame) {
            Ok(EnginePacket::Open(open)) => {
                debug!(
                    sid = %open.sid,
                    ping_interval = open.ping_interval,
                    ping_timeout = open.ping_timeout,
                    "engine session opened"
                );
                heartbeat = Some(open.heartbeat_window());
                outbound
                    .send(codec::encode_connect(namespace))
                    .await
                    .map_err(|_| closed())?;
            }
            Ok(EnginePacket::Ping) => {
                outbound.send(codec::PONG.to_owned()).await.map_err(|_| closed())?;
            }
            Ok(EnginePacket::Message(SocketPacket::Connect { namespace: ns, .. }))
                if ns == namespace =>
            {
                return heartbeat
                    .ok_or_else(|| Error::Protocol("namespace ack before engine open".into()));
            }
            Ok(EnginePacket::Message(SocketPacket::ConnectError { data, .. })) => {
                return Err(Error::Protocol(format!("namespace {namespace} refused: {data}")));
            }
            Ok(EnginePacket::Close) => return Err(closed()),
            Ok(other) => trace!(?other, "ignoring packet during handshake"),
            Err(e) => debug!(error = %e, "skipping malformed handshake frame"),
        }
    }
}

/// Read until the link ends, the server closes, it drops our namespace,
/// or nothing arrives for a whole `heartbeat` window.
async fn serve(
    inner: &ChannelInner,
    outbound: &mpsc::Sender<String>,
    inbound: &mut mpsc::Receiver<String>,
    heartbeat: Duration,
) {
    loop {
        let frame = match tokio::time::timeout(heartbeat, inbound.recv()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(_) => {
                warn!(
                    window_ms = u64::try_from(heartbeat.as_millis()).unwrap_or(u64::MAX),
                    "no heartbeat from server, dropping link"
                );
                return;
            }
        };
        match codec::decode(&frame) {
            Ok(EnginePacket::Ping) => {
                if outbound.send(codec::PONG.to_owned()).await.is_err() {
                    return;
                }
            }
            Ok(EnginePacket::Message(SocketPacket::Event {
                namespace,
                name,
                payload,
            })) if namespace == inner.namespace => {
                trace!(event = %name, "push event");
                inner.publish(&name, payload);
            }
            Ok(EnginePacket::Message(SocketPacket::Disconnect { namespace }))
                if namespace == inner.namespace =>
            {
                info!("server closed the namespace");
                return;
            }
            Ok(EnginePacket::Close) => {
                info!("server closed the engine session");
                return;
            }
            Ok(other) => trace!(?other, "ignoring packet"),
            Err(e) => debug!(error = %e, "skipping malformed frame"),
        }
    }
}
