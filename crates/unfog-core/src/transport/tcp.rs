//! Framed TCP link between a phone process and a watch process.
//!
//! One side listens, the other connects and keeps reconnecting after a fixed
//! delay. After the Hello/HelloAck handshake the link is reachable:
//! immediate sends go out as `SettingsUpdate` frames, and the persisted
//! outbox is flushed as a `SettingsContext` frame. The outbox is also flushed
//! whenever a durable send happens while connected. It is only cleared when
//! the peer acknowledges the envelope id; a link that drops before the ack
//! leaves the snapshot queued for the next connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::outbox::Outbox;
use super::{Delivery, DeviceRole, EventSender, TransportChannel, TransportEvent};
use crate::error::{Error, Result};
use crate::protocol::{
    self, ContextAck, ContextEnvelope, ErrorPayload, Frame, HelloPayload, MessageType,
};
use crate::settings::SyncPayload;

/// How long the peer has to complete the handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between keep-alive pings on an idle link.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Where the link comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpEndpoint {
    /// Accept the peer on this address
    Listen(SocketAddr),
    /// Dial the peer at this address
    Connect(SocketAddr),
}

/// Settings for a TCP transport.
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Which device this process is
    pub role: DeviceRole,
    /// Name announced in the handshake
    pub device_name: String,
    /// Listen or connect
    pub endpoint: TcpEndpoint,
    /// Delay between connection attempts (connecting side)
    pub reconnect_delay: Duration,
}

enum Outbound {
    Frame(Frame),
    FlushOutbox,
}

struct Shared {
    reachable: AtomicBool,
    writer: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    outbox: Arc<Outbox>,
    events: EventSender,
    hello: HelloPayload,
    peer: Mutex<Option<HelloPayload>>,
    /// Snapshot sent on the current connection and not yet acknowledged
    in_flight: Mutex<Option<ContextEnvelope>>,
}

impl Shared {
    fn install_writer(&self, tx: mpsc::UnboundedSender<Outbound>, peer: HelloPayload) {
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        *self.peer.lock().unwrap_or_else(PoisonError::into_inner) = Some(peer);
        self.reachable.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::ReachabilityChanged(true));
    }

    fn clear_writer(&self) {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if self.reachable.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(TransportEvent::ReachabilityChanged(false));
        }
    }

    fn writer(&self) -> Option<mpsc::UnboundedSender<Outbound>> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Envelope for the pending snapshot, unless it is already awaiting an ack.
    fn begin_flush(&self) -> Option<ContextEnvelope> {
        let pending = self.outbox.peek()?;
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.as_ref().is_some_and(|sent| sent.settings == pending) {
            return None;
        }
        let envelope = ContextEnvelope::new(pending);
        *in_flight = Some(envelope.clone());
        Some(envelope)
    }

    fn acknowledge(&self, id: uuid::Uuid) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let envelope = match in_flight.take() {
            Some(envelope) if envelope.id == id => envelope,
            other => {
                tracing::debug!("Ignoring ack for superseded snapshot {}", id);
                *in_flight = other;
                return;
            }
        };
        drop(in_flight);

        match self.outbox.clear_if(&envelope.settings) {
            Ok(true) => tracing::debug!("Peer confirmed {:?}", envelope.settings.fields()),
            Ok(false) => tracing::debug!("Newer snapshot queued while awaiting ack"),
            Err(e) => tracing::warn!("Snapshot delivered but outbox not cleared: {}", e),
        }
    }
}

/// TCP implementation of [`TransportChannel`].
#[derive(Clone)]
pub struct TcpTransport {
    shared: Arc<Shared>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("local_addr", &self.local_addr)
            .field("reachable", &self.shared.reachable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TcpTransport {
    /// Bring the link up and report activation on `events`.
    ///
    /// A listening transport that cannot bind reports a failed activation
    /// and stays unreachable; the caller keeps working locally.
    pub async fn start(
        config: TcpTransportConfig,
        outbox: Arc<Outbox>,
        events: EventSender,
    ) -> (Self, JoinHandle<()>) {
        let hello = HelloPayload {
            device_name: config.device_name.clone(),
            role: config.role,
            device_id: uuid::Uuid::new_v4(),
            protocol_version: protocol::version_string(),
        };
        let shared = Arc::new(Shared {
            reachable: AtomicBool::new(false),
            writer: Mutex::new(None),
            outbox,
            events,
            hello,
            peer: Mutex::new(None),
            in_flight: Mutex::new(None),
        });
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (local_addr, task) = match config.endpoint {
            TcpEndpoint::Listen(addr) => match TcpListener::bind(addr).await {
                Ok(listener) => {
                    let local_addr = listener.local_addr().ok();
                    tracing::info!("Listening for peer on {}", local_addr.unwrap_or(addr));
                    let _ = shared.events.send(TransportEvent::activated());
                    let task = tokio::spawn(run_listener(
                        listener,
                        Arc::clone(&shared),
                        shutdown_rx,
                    ));
                    (local_addr, task)
                }
                Err(e) => {
                    tracing::warn!("Cannot listen on {}: {}", addr, e);
                    let _ = shared
                        .events
                        .send(TransportEvent::activation_failed(format!(
                            "cannot listen on {addr}: {e}"
                        )));
                    (None, tokio::spawn(async {}))
                }
            },
            TcpEndpoint::Connect(addr) => {
                let _ = shared.events.send(TransportEvent::activated());
                let task = tokio::spawn(run_connector(
                    addr,
                    config.reconnect_delay,
                    Arc::clone(&shared),
                    shutdown_rx,
                ));
                (None, task)
            }
        };

        (
            Self {
                shared,
                local_addr,
                shutdown_tx,
            },
            task,
        )
    }

    /// Address the listening side is bound to.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Handshake details of the connected peer.
    #[must_use]
    pub fn peer(&self) -> Option<HelloPayload> {
        self.shared
            .peer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The outbox durable sends go to.
    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.shared.outbox
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl TransportChannel for TcpTransport {
    fn is_reachable(&self) -> bool {
        self.shared.reachable.load(Ordering::SeqCst)
    }

    fn send_immediate(&self, payload: &SyncPayload) -> Result<()> {
        if !self.is_reachable() {
            return Err(Error::PeerUnreachable);
        }
        let frame = Frame::json(MessageType::SettingsUpdate, payload)?;
        let tx = self.shared.writer().ok_or(Error::PeerUnreachable)?;
        tx.send(Outbound::Frame(frame))
            .map_err(|_| Error::SendFailed("connection closed".to_string()))
    }

    fn send_durable(&self, payload: &SyncPayload) -> Result<()> {
        self.shared.outbox.replace(payload.clone())?;
        if let Some(tx) = self.shared.writer() {
            let _ = tx.send(Outbound::FlushOutbox);
        }
        Ok(())
    }
}

async fn run_listener(
    listener: TcpListener,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                tracing::debug!("Connection from {}", peer_addr);
                match serve_connection(stream, false, &shared, &mut shutdown_rx).await {
                    Ok(true) => break,
                    Ok(false) => tracing::info!("Peer {} disconnected", peer_addr),
                    Err(e) => tracing::warn!("Link to {} closed: {}", peer_addr, e),
                }
            }
            Err(e) => tracing::warn!("Failed to accept connection: {}", e),
        }
    }
    tracing::debug!("Listener stopped");
}

async fn run_connector(
    addr: SocketAddr,
    reconnect_delay: Duration,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        let connected = tokio::select! {
            _ = shutdown_rx.recv() => break,
            connected = TcpStream::connect(addr) => connected,
        };

        match connected {
            Ok(stream) => match serve_connection(stream, true, &shared, &mut shutdown_rx).await {
                Ok(true) => break,
                Ok(false) => tracing::info!("Peer {} disconnected", addr),
                Err(e) => tracing::warn!("Link to {} closed: {}", addr, e),
            },
            Err(e) => tracing::debug!("Peer {} not available: {}", addr, e),
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            () = tokio::time::sleep(reconnect_delay) => {}
        }
    }
    tracing::debug!("Connector stopped");
}

/// Run one connection to completion.
///
/// Returns `Ok(true)` if shutdown was requested, `Ok(false)` if the peer
/// went away cleanly.
async fn serve_connection(
    stream: TcpStream,
    initiator: bool,
    shared: &Arc<Shared>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Result<bool> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.into_split();

    let peer = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        handshake(&mut reader, &mut writer, initiator, &shared.hello),
    )
    .await
    .map_err(|_| Error::ProtocolError("handshake timed out".to_string()))??;

    if peer.role == shared.hello.role {
        tracing::warn!(
            "Peer '{}' also claims to be the {}; syncing anyway",
            peer.device_name,
            peer.role
        );
    }
    tracing::info!("Connected to {} ({})", peer.device_name, peer.role);

    let (tx, rx) = mpsc::unbounded_channel();
    let _ = tx.send(Outbound::FlushOutbox);
    shared.install_writer(tx.clone(), peer);

    let mut writer_task = tokio::spawn(write_loop(writer, rx, Arc::clone(shared)));
    let mut reader_task = tokio::spawn(read_loop(reader, tx, Arc::clone(shared)));

    let outcome = tokio::select! {
        biased;
        _ = shutdown_rx.recv() => Ok(true),
        result = &mut writer_task => flatten(result),
        result = &mut reader_task => flatten(result),
    };

    writer_task.abort();
    reader_task.abort();
    shared.clear_writer();

    match outcome {
        Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        other => other,
    }
}

fn flatten(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<bool> {
    match result {
        Ok(Ok(())) => Ok(false),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(Error::Internal(format!("link task panicked: {e}"))),
    }
}

async fn handshake(
    reader: &mut OwnedReadHalf,
    writer: &mut OwnedWriteHalf,
    initiator: bool,
    hello: &HelloPayload,
) -> Result<HelloPayload> {
    if initiator {
        Frame::json(MessageType::Hello, hello)?.write_to(writer).await?;
        expect_hello(reader, MessageType::HelloAck).await
    } else {
        let peer = expect_hello(reader, MessageType::Hello).await?;
        Frame::json(MessageType::HelloAck, hello)?.write_to(writer).await?;
        Ok(peer)
    }
}

async fn expect_hello(reader: &mut OwnedReadHalf, expected: MessageType) -> Result<HelloPayload> {
    let frame = Frame::read_from(reader).await?;
    if frame.kind != expected {
        return Err(Error::UnexpectedMessage {
            expected: format!("{expected:?}"),
            actual: format!("{:?}", frame.kind),
        });
    }
    let peer: HelloPayload = frame.parse()?;
    protocol::check_version(&peer.protocol_version)?;
    Ok(peer)
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) -> Result<()> {
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await;

    loop {
        let outbound = tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => return Ok(()),
            },
            _ = keepalive.tick() => Outbound::Frame(Frame::empty(MessageType::Ping)),
        };

        match outbound {
            Outbound::Frame(frame) => frame.write_to(&mut writer).await?,
            Outbound::FlushOutbox => {
                let Some(envelope) = shared.begin_flush() else {
                    continue;
                };
                Frame::json(MessageType::SettingsContext, &envelope)?
                    .write_to(&mut writer)
                    .await?;
                tracing::debug!(
                    "Sent pending snapshot {:?}, awaiting ack",
                    envelope.settings.fields()
                );
            }
        }
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: mpsc::UnboundedSender<Outbound>,
    shared: Arc<Shared>,
) -> Result<()> {
    loop {
        let frame = Frame::read_from(&mut reader).await?;

        match frame.kind {
            MessageType::SettingsUpdate => match frame.parse::<SyncPayload>() {
                Ok(payload) => deliver(&shared, payload, Delivery::Immediate),
                Err(e) => tracing::warn!("Dropping malformed settings frame: {}", e),
            },
            MessageType::SettingsContext => match frame.parse::<ContextEnvelope>() {
                Ok(envelope) => {
                    deliver(&shared, envelope.settings, Delivery::Durable);
                    let ack = Frame::json(MessageType::ContextAck, &ContextAck { id: envelope.id })?;
                    let _ = tx.send(Outbound::Frame(ack));
                }
                Err(e) => tracing::warn!("Dropping malformed snapshot frame: {}", e),
            },
            MessageType::ContextAck => match frame.parse::<ContextAck>() {
                Ok(ack) => shared.acknowledge(ack.id),
                Err(e) => tracing::warn!("Ignoring malformed ack: {}", e),
            },
            MessageType::Ping => {
                let _ = tx.send(Outbound::Frame(Frame::empty(MessageType::Pong)));
            }
            MessageType::Pong => {}
            MessageType::Error => {
                let message = frame
                    .parse::<ErrorPayload>()
                    .map_or_else(|_| "unknown error".to_string(), |e| e.message);
                return Err(Error::ProtocolError(format!("peer reported: {message}")));
            }
            other @ (MessageType::Hello | MessageType::HelloAck) => {
                return Err(Error::UnexpectedMessage {
                    expected: "settings frame".to_string(),
                    actual: format!("{other:?}"),
                });
            }
        }
    }
}

fn deliver(shared: &Shared, payload: SyncPayload, delivery: Delivery) {
    tracing::debug!("Received {:?} ({:?})", payload.fields(), delivery);
    let _ = shared
        .events
        .send(TransportEvent::Received { payload, delivery });
}
