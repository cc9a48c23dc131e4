//! Framed TCP link between two local processes' worth of stores.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{spawn_with, wait_activated, wait_for_settings, wait_until, Device, WAIT};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use unfog_core::protocol::{self, ContextAck, ContextEnvelope, Frame, HelloPayload, MessageType};
use unfog_core::settings::{SyncPayload, Tempo};
use unfog_core::storage::MemoryStore;
use unfog_core::transport::{
    event_channel, ActivationOutcome, DeviceRole, Outbox, TcpEndpoint, TcpTransport, TcpTransportConfig,
    TransportChannel, TransportEvent,
};

fn config(role: DeviceRole, endpoint: TcpEndpoint) -> TcpTransportConfig {
    TcpTransportConfig {
        role,
        device_name: format!("test {role}"),
        endpoint,
        reconnect_delay: Duration::from_millis(50),
    }
}

async fn start_device(
    role: DeviceRole,
    endpoint: TcpEndpoint,
    outbox: Arc<Outbox>,
) -> (TcpTransport, Device) {
    let (tx, rx) = event_channel();
    let (transport, _task) = TcpTransport::start(config(role, endpoint), outbox, tx).await;
    let device = spawn_with(
        Box::new(MemoryStore::new()),
        Arc::new(transport.clone()),
        rx,
    );
    wait_activated(&device.handle).await;
    (transport, device)
}

async fn start_watch() -> (TcpTransport, Device, SocketAddr) {
    let listen = TcpEndpoint::Listen("127.0.0.1:0".parse().unwrap());
    let (transport, device) =
        start_device(DeviceRole::Watch, listen, Arc::new(Outbox::in_memory())).await;
    let addr = transport.local_addr().expect("bound address");
    (transport, device, addr)
}

async fn wait_reachable(transport: &TcpTransport) {
    wait_until(|| async move { transport.is_reachable() }).await;
}

/// Accept one connection and answer the handshake as a bare watch.
async fn accept_as_watch(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("phone connects")
        .unwrap();

    let hello = Frame::read_from(&mut stream).await.unwrap();
    assert_eq!(hello.kind, MessageType::Hello);

    let ours = HelloPayload {
        device_name: "bare watch".into(),
        role: DeviceRole::Watch,
        device_id: uuid::Uuid::nil(),
        protocol_version: protocol::version_string(),
    };
    Frame::json(MessageType::HelloAck, &ours)
        .unwrap()
        .write_to(&mut stream)
        .await
        .unwrap();
    stream
}

async fn next_snapshot(stream: &mut TcpStream) -> ContextEnvelope {
    tokio::time::timeout(WAIT, async {
        loop {
            let frame = Frame::read_from(stream).await.unwrap();
            if frame.kind == MessageType::SettingsContext {
                return frame.parse().unwrap();
            }
        }
    })
    .await
    .expect("snapshot frame")
}

#[tokio::test]
async fn test_live_update_over_tcp() {
    let (watch_link, watch, addr) = start_watch().await;
    let (phone_link, phone) = start_device(
        DeviceRole::Phone,
        TcpEndpoint::Connect(addr),
        Arc::new(Outbox::in_memory()),
    )
    .await;
    wait_reachable(&phone_link).await;
    wait_reachable(&watch_link).await;

    phone.handle.set_tempo(79).await.unwrap();
    wait_for_settings(&watch.handle, |s| s.tempo.bpm() == 79).await;

    watch.handle.set_memo_text("Turn off the stove").await.unwrap();
    let settings = wait_for_settings(&phone.handle, |s| s.memo_text == "Turn off the stove").await;
    assert_eq!(settings.tempo.bpm(), 79);

    let peer = phone_link.peer().expect("handshake completed");
    assert_eq!(peer.role, DeviceRole::Watch);

    phone_link.shutdown();
    watch_link.shutdown();
}

#[tokio::test]
async fn test_persisted_outbox_is_flushed_on_connect() {
    let dir = TempDir::new().unwrap();
    let queued = SyncPayload::tempo(Tempo::new(30).unwrap());
    {
        let outbox = Outbox::open_in(dir.path()).unwrap();
        outbox.replace(queued.clone()).unwrap();
    }

    let (watch_link, watch, addr) = start_watch().await;
    let outbox = Arc::new(Outbox::open_in(dir.path()).unwrap());
    assert_eq!(outbox.peek(), Some(queued));

    let (phone_link, _phone) = start_device(
        DeviceRole::Phone,
        TcpEndpoint::Connect(addr),
        Arc::clone(&outbox),
    )
    .await;

    wait_for_settings(&watch.handle, |s| s.tempo.bpm() == 30).await;
    let pending = &outbox;
    wait_until(|| async move { pending.is_empty() }).await;
    assert!(Outbox::open_in(dir.path()).unwrap().is_empty());

    phone_link.shutdown();
    watch_link.shutdown();
}

#[tokio::test]
async fn test_connector_waits_for_listener() {
    // Reserve a port, then free it so nothing is listening yet.
    let addr = {
        let reserved = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        reserved.local_addr().unwrap()
    };

    let (phone_link, phone) = start_device(
        DeviceRole::Phone,
        TcpEndpoint::Connect(addr),
        Arc::new(Outbox::in_memory()),
    )
    .await;
    phone.handle.set_memo_text("queued while apart").await.unwrap();
    assert!(!phone_link.is_reachable());

    let (watch_link, watch) = start_device(
        DeviceRole::Watch,
        TcpEndpoint::Listen(addr),
        Arc::new(Outbox::in_memory()),
    )
    .await;

    wait_for_settings(&watch.handle, |s| s.memo_text == "queued while apart").await;

    phone_link.shutdown();
    watch_link.shutdown();
}

#[tokio::test]
async fn test_bind_failure_reports_activation_failure() {
    let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = taken.local_addr().unwrap();

    let (tx, mut rx) = event_channel();
    let (transport, _task) = TcpTransport::start(
        config(DeviceRole::Watch, TcpEndpoint::Listen(addr)),
        Arc::new(Outbox::in_memory()),
        tx,
    )
    .await;

    let event = rx.recv().await.unwrap();
    assert!(matches!(
        event,
        TransportEvent::Activation(ActivationOutcome::Failed(_))
    ));
    assert!(!transport.is_reachable());
    assert!(transport.send_immediate(&SyncPayload::memo_text("x")).is_err());
}

#[tokio::test]
async fn test_snapshot_kept_until_acknowledged() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let queued = SyncPayload::tempo(Tempo::new(30).unwrap());
    let outbox = Arc::new(Outbox::in_memory());
    outbox.replace(queued.clone()).unwrap();

    let (tx, _rx) = event_channel();
    let (phone_link, _task) = TcpTransport::start(
        config(DeviceRole::Phone, TcpEndpoint::Connect(addr)),
        Arc::clone(&outbox),
        tx,
    )
    .await;

    // The link drops after the snapshot is written but before any ack.
    let mut stream = accept_as_watch(&listener).await;
    let first = next_snapshot(&mut stream).await;
    assert_eq!(first.settings, queued);
    drop(stream);
    assert_eq!(outbox.peek(), Some(queued.clone()));

    // On reconnect the same snapshot is sent again under a new id.
    let mut stream = accept_as_watch(&listener).await;
    let second = next_snapshot(&mut stream).await;
    assert_eq!(second.settings, queued);
    assert_ne!(second.id, first.id);
    assert_eq!(outbox.peek(), Some(queued));

    // A stale id is ignored; the current one clears the slot.
    Frame::json(MessageType::ContextAck, &ContextAck { id: first.id })
        .unwrap()
        .write_to(&mut stream)
        .await
        .unwrap();
    Frame::json(MessageType::ContextAck, &ContextAck { id: second.id })
        .unwrap()
        .write_to(&mut stream)
        .await
        .unwrap();

    let pending = &outbox;
    wait_until(|| async move { pending.is_empty() }).await;

    phone_link.shutdown();
}
