//! In-process phone/watch link.
//!
//! [`LoopbackLink::pair`] returns a controller and two endpoints. Payloads
//! sent by one endpoint arrive as [`TransportEvent`]s on the other. The link
//! starts unreachable; while it is down, durable sends wait in a depth-1
//! outbox per direction and are flushed when [`LoopbackLink::set_reachable`]
//! brings it back up.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::outbox::Outbox;
use super::{
    event_channel, Delivery, DeviceRole, EventReceiver, EventSender, TransportChannel,
    TransportEvent,
};
use crate::error::{Error, Result};
use crate::settings::SyncPayload;

/// A payload handed to the link, as seen by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentPayload {
    /// How it was sent
    pub delivery: Delivery,
    /// What was sent
    pub payload: SyncPayload,
}

#[derive(Debug)]
struct Side {
    events: EventSender,
    outbox: Outbox,
    sent: Mutex<Vec<SentPayload>>,
    failing_immediate: AtomicU64,
}

impl Side {
    fn new(events: EventSender) -> Self {
        Self {
            events,
            outbox: Outbox::in_memory(),
            sent: Mutex::new(Vec::new()),
            failing_immediate: AtomicU64::new(0),
        }
    }
}

#[derive(Debug)]
struct LinkState {
    reachable: AtomicBool,
    phone: Side,
    watch: Side,
}

impl LinkState {
    fn side(&self, role: DeviceRole) -> &Side {
        match role {
            DeviceRole::Phone => &self.phone,
            DeviceRole::Watch => &self.watch,
        }
    }

    fn deliver(&self, to: DeviceRole, payload: SyncPayload, delivery: Delivery) {
        if self
            .side(to)
            .events
            .send(TransportEvent::Received { payload, delivery })
            .is_err()
        {
            tracing::debug!("Loopback: {} endpoint dropped, payload discarded", to);
        }
    }
}

/// Controller for a loopback pair.
#[derive(Debug, Clone)]
pub struct LoopbackLink {
    state: Arc<LinkState>,
}

/// One device's end of a loopback link.
#[derive(Debug)]
pub struct LoopbackEndpoint {
    channel: Arc<LoopbackChannel>,
    events: EventReceiver,
}

impl LoopbackEndpoint {
    /// The channel to hand to the store.
    #[must_use]
    pub fn channel(&self) -> Arc<LoopbackChannel> {
        Arc::clone(&self.channel)
    }

    /// Split into the channel and the receiver of inbound events.
    #[must_use]
    pub fn into_parts(self) -> (Arc<LoopbackChannel>, EventReceiver) {
        (self.channel, self.events)
    }
}

/// [`TransportChannel`] implementation for one loopback endpoint.
#[derive(Debug)]
pub struct LoopbackChannel {
    role: DeviceRole,
    state: Arc<LinkState>,
}

impl LoopbackLink {
    /// Create an unreachable link and its phone and watch endpoints.
    #[must_use]
    pub fn pair() -> (Self, LoopbackEndpoint, LoopbackEndpoint) {
        let (phone_tx, phone_rx) = event_channel();
        let (watch_tx, watch_rx) = event_channel();
        let state = Arc::new(LinkState {
            reachable: AtomicBool::new(false),
            phone: Side::new(phone_tx),
            watch: Side::new(watch_tx),
        });

        let endpoint = |role, events| LoopbackEndpoint {
            channel: Arc::new(LoopbackChannel {
                role,
                state: Arc::clone(&state),
            }),
            events,
        };
        let phone = endpoint(DeviceRole::Phone, phone_rx);
        let watch = endpoint(DeviceRole::Watch, watch_rx);

        (Self { state }, phone, watch)
    }

    /// Report successful activation to both endpoints.
    pub fn activate(&self) {
        self.activate_side(DeviceRole::Phone);
        self.activate_side(DeviceRole::Watch);
    }

    /// Report successful activation to one endpoint.
    pub fn activate_side(&self, role: DeviceRole) {
        let _ = self
            .state
            .side(role)
            .events
            .send(TransportEvent::activated());
    }

    /// Report failed activation to one endpoint.
    pub fn fail_activation(&self, role: DeviceRole, reason: &str) {
        let _ = self
            .state
            .side(role)
            .events
            .send(TransportEvent::activation_failed(reason));
    }

    /// Bring the link up or down.
    ///
    /// Going up notifies both endpoints and flushes each direction's pending
    /// snapshot to the receiving side.
    pub fn set_reachable(&self, reachable: bool) {
        let was = self.state.reachable.swap(reachable, Ordering::SeqCst);
        if was == reachable {
            return;
        }

        tracing::debug!("Loopback: link {}", if reachable { "up" } else { "down" });
        for role in [DeviceRole::Phone, DeviceRole::Watch] {
            let _ = self
                .state
                .side(role)
                .events
                .send(TransportEvent::ReachabilityChanged(reachable));
        }

        if reachable {
            for from in [DeviceRole::Phone, DeviceRole::Watch] {
                if let Ok(Some(payload)) = self.state.side(from).outbox.take() {
                    self.state.deliver(from.peer(), payload, Delivery::Durable);
                }
            }
        }
    }

    /// Whether the link is up.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.state.reachable.load(Ordering::SeqCst)
    }

    /// Make the next `count` immediate sends from `role` fail as if the peer
    /// dropped off mid-send.
    pub fn fail_next_immediate(&self, role: DeviceRole, count: u64) {
        self.state
            .side(role)
            .failing_immediate
            .store(count, Ordering::SeqCst);
    }

    /// Everything `role` has handed to the link so far.
    #[must_use]
    pub fn sent_by(&self, role: DeviceRole) -> Vec<SentPayload> {
        self.state
            .side(role)
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The snapshot waiting to go out from `role`.
    #[must_use]
    pub fn pending_from(&self, role: DeviceRole) -> Option<SyncPayload> {
        self.state.side(role).outbox.peek()
    }
}

impl LoopbackChannel {
    /// Which device this endpoint belongs to.
    #[must_use]
    pub const fn role(&self) -> DeviceRole {
        self.role
    }

    fn record(&self, delivery: Delivery, payload: &SyncPayload) {
        self.state
            .side(self.role)
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentPayload {
                delivery,
                payload: payload.clone(),
            });
    }
}

impl TransportChannel for LoopbackChannel {
    fn is_reachable(&self) -> bool {
        self.state.reachable.load(Ordering::SeqCst)
    }

    fn send_immediate(&self, payload: &SyncPayload) -> Result<()> {
        if !self.is_reachable() {
            return Err(Error::PeerUnreachable);
        }

        let failing = &self.state.side(self.role).failing_immediate;
        if failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::SendFailed("simulated transient failure".to_string()));
        }

        self.record(Delivery::Immediate, payload);
        self.state
            .deliver(self.role.peer(), payload.clone(), Delivery::Immediate);
        Ok(())
    }

    fn send_durable(&self, payload: &SyncPayload) -> Result<()> {
        self.record(Delivery::Durable, payload);
        if self.is_reachable() {
            self.state
                .deliver(self.role.peer(), payload.clone(), Delivery::Durable);
            return Ok(());
        }
        self.state
            .side(self.role)
            .outbox
            .replace(payload.clone())
            .map(|_| ())
    }
}
