//! Common test utilities for `unfog` integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use unfog_core::settings::{SyncPayload, SyncedSettings};
use unfog_core::storage::{KeyValueStore, MemoryStore};
use unfog_core::store::{ActivationState, SharedStateStore, StoreActor, StoreHandle};
use unfog_core::transport::{
    Delivery, EventReceiver, LoopbackEndpoint, LoopbackLink, TransportChannel,
};

/// How long helpers wait for something to happen.
pub const WAIT: Duration = Duration::from_secs(5);

/// One simulated device.
pub struct Device {
    pub handle: StoreHandle,
    pub task: JoinHandle<SharedStateStore>,
}

/// Spawn a store for one loopback endpoint.
pub fn spawn_device(endpoint: LoopbackEndpoint, storage: Box<dyn KeyValueStore>) -> Device {
    let (channel, events) = endpoint.into_parts();
    spawn_with(storage, channel, events)
}

/// Spawn a store over any channel.
pub fn spawn_with(
    storage: Box<dyn KeyValueStore>,
    channel: Arc<dyn TransportChannel>,
    events: EventReceiver,
) -> Device {
    let store = SharedStateStore::load(storage, channel);
    let (handle, task) = StoreActor::spawn(store, events);
    Device { handle, task }
}

/// A phone and a watch over an activated but unreachable loopback link.
pub async fn activated_pair() -> (LoopbackLink, Device, Device) {
    let (link, phone, watch) = LoopbackLink::pair();
    let phone = spawn_device(phone, Box::new(MemoryStore::new()));
    let watch = spawn_device(watch, Box::new(MemoryStore::new()));

    link.activate();
    wait_activated(&phone.handle).await;
    wait_activated(&watch.handle).await;

    (link, phone, watch)
}

/// Wait until the store has processed a successful activation.
pub async fn wait_activated(handle: &StoreHandle) {
    wait_until(|| async move {
        handle.activation().await.expect("store running") == ActivationState::Activated
    })
    .await;
}

/// Wait until the store's settings satisfy `check`.
pub async fn wait_for_settings(
    handle: &StoreHandle,
    check: impl Fn(&SyncedSettings) -> bool,
) -> SyncedSettings {
    let mut last = None;
    let reached = tokio::time::timeout(WAIT, async {
        loop {
            let settings = handle.snapshot().await.expect("store running");
            if check(&settings) {
                return settings;
            }
            last = Some(settings);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    reached.unwrap_or_else(|_| panic!("settings never matched, last seen {last:?}"))
}

/// Poll `condition` until it holds or [`WAIT`] passes.
pub async fn wait_until<F, Fut>(condition: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// A channel that records what the store tries to send.
#[derive(Default)]
pub struct RecordingChannel {
    reachable: AtomicBool,
    sent: Mutex<Vec<(Delivery, SyncPayload)>>,
}

impl RecordingChannel {
    pub fn reachable() -> Arc<Self> {
        let channel = Self::default();
        channel.reachable.store(true, Ordering::SeqCst);
        Arc::new(channel)
    }

    pub fn sent(&self) -> Vec<(Delivery, SyncPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

impl TransportChannel for RecordingChannel {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn send_immediate(&self, payload: &SyncPayload) -> unfog_core::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((Delivery::Immediate, payload.clone()));
        Ok(())
    }

    fn send_durable(&self, payload: &SyncPayload) -> unfog_core::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((Delivery::Durable, payload.clone()));
        Ok(())
    }
}
