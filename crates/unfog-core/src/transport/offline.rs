//! Transport for processes that never talk to the peer directly.
//!
//! One-shot commands edit the settings and exit. They activate immediately,
//! are never reachable, and park durable sends in the persisted outbox where
//! the next TCP session picks them up.

use std::sync::Arc;

use super::outbox::Outbox;
use super::{EventSender, TransportChannel, TransportEvent};
use crate::error::{Error, Result};
use crate::settings::SyncPayload;

/// A channel that only ever queues.
#[derive(Debug, Clone)]
pub struct OfflineTransport {
    outbox: Arc<Outbox>,
}

impl OfflineTransport {
    /// Create the transport and report activation on `events`.
    #[must_use]
    pub fn start(outbox: Arc<Outbox>, events: &EventSender) -> Self {
        let _ = events.send(TransportEvent::activated());
        Self { outbox }
    }

    /// The outbox durable sends go to.
    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }
}

impl TransportChannel for OfflineTransport {
    fn is_reachable(&self) -> bool {
        false
    }

    fn send_immediate(&self, _payload: &SyncPayload) -> Result<()> {
        Err(Error::PeerUnreachable)
    }

    fn send_durable(&self, payload: &SyncPayload) -> Result<()> {
        if let Some(replaced) = self.outbox.replace(payload.clone())? {
            tracing::debug!(
                "Offline: replaced pending {:?} with {:?}",
                replaced.fields(),
                payload.fields()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Tempo;
    use crate::transport::event_channel;

    #[test]
    fn test_offline_activates_and_queues() {
        let (tx, mut rx) = event_channel();
        let transport = OfflineTransport::start(Arc::new(Outbox::in_memory()), &tx);

        assert_eq!(rx.try_recv().unwrap(), TransportEvent::activated());
        assert!(!transport.is_reachable());

        let payload = SyncPayload::tempo(Tempo::new(79).unwrap());
        assert!(transport.send_immediate(&payload).is_err());
        transport.send_durable(&payload).unwrap();
        assert_eq!(transport.outbox().peek(), Some(payload));
    }
}
