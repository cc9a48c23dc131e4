//! Device-to-device transport channels.
//!
//! The settings store only depends on the [`TransportChannel`] contract:
//!
//! - `is_reachable`: a live, low-latency path to the peer exists right now
//! - `send_immediate`: best effort, fails if the peer is not live
//! - `send_durable`: replaces the single pending snapshot and is delivered
//!   once the peer becomes reachable
//!
//! Everything the channel reports back (activation result, inbound payloads,
//! reachability changes) arrives as a [`TransportEvent`] on an `mpsc`
//! channel, so the store can process it on its own task.
//!
//! Implementations:
//!
//! - [`loopback`]: in-process phone/watch pair for tests and demos
//! - [`offline`]: never reachable, durable sends go to the persisted outbox
//! - [`tcp`]: framed TCP link between two processes

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::settings::SyncPayload;

pub mod loopback;
pub mod offline;
pub mod outbox;
pub mod tcp;

pub use loopback::{LoopbackChannel, LoopbackEndpoint, LoopbackLink};
pub use offline::OfflineTransport;
pub use outbox::Outbox;
pub use tcp::{TcpEndpoint, TcpTransport, TcpTransportConfig};

/// Sender half used by transports to report events.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Receiver half consumed by the store's owning task.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Create a transport event channel.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// The link to the peer device.
pub trait TransportChannel: Send + Sync {
    /// Whether a live path to the peer exists right now.
    fn is_reachable(&self) -> bool;

    /// Send without durability or retry.
    ///
    /// # Errors
    ///
    /// Fails if the peer is unreachable or the write could not be queued.
    fn send_immediate(&self, payload: &SyncPayload) -> Result<()>;

    /// Replace the pending snapshot; delivered once the peer is reachable.
    ///
    /// # Errors
    ///
    /// Fails if the snapshot could not be queued.
    fn send_durable(&self, payload: &SyncPayload) -> Result<()>;
}

/// Which device a process is running as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// The phone companion app
    #[default]
    Phone,
    /// The watch app
    Watch,
}

impl DeviceRole {
    /// The role of the other device.
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Phone => Self::Watch,
            Self::Watch => Self::Phone,
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phone => write!(f, "phone"),
            Self::Watch => write!(f, "watch"),
        }
    }
}

/// How an inbound payload was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Sent while both devices were live
    Immediate,
    /// Flushed from the peer's pending snapshot
    Durable,
}

/// Result of bringing the transport up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// The channel is usable
    Activated,
    /// The channel will never become usable in this process
    Failed(String),
}

/// Everything a transport reports to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Activation finished; sent exactly once before any send
    Activation(ActivationOutcome),
    /// A payload arrived from the peer
    Received {
        /// The fields the peer sent
        payload: SyncPayload,
        /// Delivery path
        delivery: Delivery,
    },
    /// The live path to the peer appeared or went away
    ReachabilityChanged(bool),
}

impl TransportEvent {
    /// Successful activation.
    #[must_use]
    pub const fn activated() -> Self {
        Self::Activation(ActivationOutcome::Activated)
    }

    /// Failed activation.
    #[must_use]
    pub fn activation_failed(reason: impl Into<String>) -> Self {
        Self::Activation(ActivationOutcome::Failed(reason.into()))
    }
}
