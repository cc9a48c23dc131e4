//! The shared state store.
//!
//! [`SharedStateStore`] is the single owner of a device's
//! [`SyncedSettings`]. Every change goes through it:
//!
//! 1. the in-memory value is updated,
//! 2. the field is persisted under its fixed key,
//! 3. for local changes only, the field is propagated to the peer.
//!
//! Updates received from the peer are applied and persisted but never sent
//! back (one hop), and only when they differ from the current value.
//!
//! ## Propagation
//!
//! - transport not activated: skip, the change stays local
//! - peer reachable: immediate send, falling back to durable on failure
//! - otherwise: durable send (replaces the pending snapshot)
//!
//! ## Known limitation
//!
//! Conflicts are resolved by last writer wins with value equality as the only
//! echo guard. If both devices change the same field within one round trip
//! and the values keep alternating, the devices can swap values instead of
//! converging.
//!
//! The store is synchronous and not thread-safe by itself; [`StoreActor`]
//! runs it on a single task and marshals transport events onto that task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::settings::{DisplayOrder, SettingsField, SyncPayload, SyncedSettings, Tempo};
use crate::storage::{KeyValueStore, KEY_DISPLAY_ORDER, KEY_MEMO_TEXT, KEY_TEMPO};
use crate::transport::{ActivationOutcome, Delivery, TransportChannel, TransportEvent};

pub mod actor;

pub use actor::{StoreActor, StoreCommand, StoreHandle};

/// Default capacity of the store event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Where a change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// The user on this device
    Local,
    /// The peer device
    Remote,
}

/// Transport activation as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationState {
    /// Waiting for the transport to report
    Pending,
    /// Sends are allowed
    Activated,
    /// Local-only operation for the rest of the process
    Failed(String),
}

impl ActivationState {
    /// Whether sends are allowed.
    #[must_use]
    pub const fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }
}

/// How a local change left the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationRoute {
    /// Delivered to a live peer
    Immediate,
    /// Queued as the pending snapshot
    Durable,
    /// Immediate send failed, queued instead
    DurableFallback,
}

/// Observable store activity, for diagnostics and UI refresh.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// A field changed
    Changed {
        /// Which field
        field: SettingsField,
        /// Local or remote
        origin: ChangeOrigin,
        /// Settings after the change
        settings: SyncedSettings,
    },
    /// A change could not be persisted and will not survive a restart
    PersistenceFailed {
        /// Which field
        field: SettingsField,
        /// Storage error
        message: String,
        /// When it happened
        at: DateTime<Utc>,
    },
    /// A local change was handed to the transport
    Propagated {
        /// Fields sent
        fields: Vec<SettingsField>,
        /// Route taken
        route: PropagationRoute,
    },
    /// A local change was not sent
    PropagationSkipped {
        /// Fields not sent
        fields: Vec<SettingsField>,
        /// Why
        reason: String,
    },
    /// Transport activation finished
    Activation(ActivationState),
    /// The peer became reachable or unreachable
    Reachability(bool),
}

/// Construction options for [`SharedStateStore`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Tempo used when none is stored
    pub default_tempo: Tempo,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            default_tempo: Tempo::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl StoreOptions {
    /// Options taken from the `[metronome]` and `[sync]` config sections.
    ///
    /// An out-of-range `default_tempo` falls back to the built-in default.
    #[must_use]
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            default_tempo: Tempo::new(config.metronome.default_tempo).unwrap_or_default(),
            event_capacity: config.sync.event_capacity,
        }
    }
}

/// Counters for store activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Fields changed by the user
    pub local_changes: u64,
    /// Fields changed by the peer
    pub remote_changes: u64,
    /// Remote fields equal to the current value
    pub remote_unchanged: u64,
    /// Remote fields rejected as invalid
    pub remote_rejected: u64,
    /// Successful immediate sends
    pub immediate_sends: u64,
    /// Durable sends (direct or fallback)
    pub durable_sends: u64,
    /// Immediate sends that fell back to durable
    pub fallbacks: u64,
    /// Propagations skipped (not activated or both sends failed)
    pub skipped: u64,
    /// Writes to storage that failed
    pub persistence_failures: u64,
}

/// Single owner of the synchronized settings on one device.
pub struct SharedStateStore {
    settings: SyncedSettings,
    storage: Box<dyn KeyValueStore>,
    transport: Arc<dyn TransportChannel>,
    activation: ActivationState,
    events: broadcast::Sender<StoreEvent>,
    stats: StoreStats,
}

impl std::fmt::Debug for SharedStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStateStore")
            .field("settings", &self.settings)
            .field("activation", &self.activation)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl SharedStateStore {
    /// Build the store from persisted values, falling back to defaults.
    pub fn load(storage: Box<dyn KeyValueStore>, transport: Arc<dyn TransportChannel>) -> Self {
        Self::load_with_options(storage, transport, &StoreOptions::default())
    }

    /// Like [`load`](Self::load) with a custom fallback tempo and event
    /// channel capacity.
    pub fn load_with_options(
        storage: Box<dyn KeyValueStore>,
        transport: Arc<dyn TransportChannel>,
        options: &StoreOptions,
    ) -> Self {
        let settings = SyncedSettings {
            tempo: read_tempo(&*storage, options.default_tempo),
            display_order: read_display_order(&*storage),
            memo_text: read_memo_text(&*storage),
        };
        tracing::debug!(
            "Loaded settings: tempo {}, order {}, memo {} chars",
            settings.tempo,
            settings.display_order,
            settings.memo_text.chars().count()
        );

        let (events, _) = broadcast::channel(options.event_capacity.max(1));
        Self {
            settings,
            storage,
            transport,
            activation: ActivationState::Pending,
            events,
            stats: StoreStats::default(),
        }
    }

    /// Current settings.
    #[must_use]
    pub fn settings(&self) -> &SyncedSettings {
        &self.settings
    }

    /// A copy of the current settings.
    #[must_use]
    pub fn snapshot(&self) -> SyncedSettings {
        self.settings.clone()
    }

    /// Transport activation state.
    #[must_use]
    pub fn activation(&self) -> &ActivationState {
        &self.activation
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Sender side of the event channel, for handing out subscriptions.
    #[must_use]
    pub fn event_sender(&self) -> broadcast::Sender<StoreEvent> {
        self.events.clone()
    }

    /// Set the metronome tempo.
    ///
    /// Returns `false` if the tempo was already current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTempo`] for zero or out-of-range values; the
    /// beat interval is `60 / bpm`.
    pub fn set_tempo(&mut self, bpm: u32) -> Result<bool> {
        let tempo = Tempo::new(bpm)?;
        if !self.write_tempo(tempo, ChangeOrigin::Local) {
            return Ok(false);
        }
        self.propagate(&SyncPayload::tempo(tempo));
        Ok(true)
    }

    /// Set the tool display order.
    ///
    /// Returns `false` if the order was already current.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyDisplayOrder`] if the order has no tools, which
    /// includes an order built only from blank tokens.
    pub fn set_display_order(&mut self, order: DisplayOrder) -> Result<bool> {
        if order.is_empty() {
            return Err(Error::EmptyDisplayOrder);
        }
        if !self.write_display_order(order.clone(), ChangeOrigin::Local) {
            return Ok(false);
        }
        self.propagate(&SyncPayload::display_order(order));
        Ok(true)
    }

    /// Set the memo text. Any text, including empty, is accepted.
    ///
    /// Returns `false` if the text was already current.
    pub fn set_memo_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        if !self.write_memo_text(text.clone(), ChangeOrigin::Local) {
            return false;
        }
        self.propagate(&SyncPayload::memo_text(text));
        true
    }

    /// Send all three fields to the peer, changed or not.
    pub fn push_full_snapshot(&mut self) {
        let payload = self.settings.to_payload();
        self.propagate(&payload);
    }

    /// Apply fields received from the peer.
    ///
    /// Only fields present in `payload` and different from the current value
    /// are written. Nothing is propagated. Returns the fields that changed.
    pub fn apply_remote_update(&mut self, payload: &SyncPayload) -> Vec<SettingsField> {
        let mut changed = Vec::new();

        if let Some(bpm) = payload.tempo_bpm {
            match u32::try_from(bpm).ok().and_then(|bpm| Tempo::new(bpm).ok()) {
                Some(tempo) => {
                    if self.write_tempo(tempo, ChangeOrigin::Remote) {
                        changed.push(SettingsField::Tempo);
                    } else {
                        self.stats.remote_unchanged += 1;
                    }
                }
                None => {
                    tracing::warn!(
                        "Ignoring remote tempo {} (accepted {}..={} BPM)",
                        bpm,
                        crate::MIN_TEMPO_BPM,
                        crate::MAX_TEMPO_BPM
                    );
                    self.stats.remote_rejected += 1;
                }
            }
        }

        if let Some(order) = &payload.display_order {
            if order.is_empty() {
                tracing::warn!("Ignoring empty remote display order");
                self.stats.remote_rejected += 1;
            } else if self.write_display_order(order.clone(), ChangeOrigin::Remote) {
                changed.push(SettingsField::DisplayOrder);
            } else {
                self.stats.remote_unchanged += 1;
            }
        }

        if let Some(text) = &payload.memo_text {
            if self.write_memo_text(text.clone(), ChangeOrigin::Remote) {
                changed.push(SettingsField::MemoText);
            } else {
                self.stats.remote_unchanged += 1;
            }
        }

        changed
    }

    /// Process one event from the transport.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Activation(outcome) => self.on_activation(outcome),
            TransportEvent::Received { payload, delivery } => {
                let changed = self.apply_remote_update(&payload);
                tracing::debug!(
                    "Remote {} update {:?}: changed {:?}",
                    match delivery {
                        Delivery::Immediate => "immediate",
                        Delivery::Durable => "durable",
                    },
                    payload.fields(),
                    changed
                );
            }
            TransportEvent::ReachabilityChanged(reachable) => {
                tracing::info!(
                    "Peer is {}",
                    if reachable { "reachable" } else { "unreachable" }
                );
                self.emit(StoreEvent::Reachability(reachable));
            }
        }
    }

    fn on_activation(&mut self, outcome: ActivationOutcome) {
        if self.activation != ActivationState::Pending {
            tracing::warn!("Ignoring repeated activation report: {:?}", outcome);
            return;
        }

        self.activation = match outcome {
            ActivationOutcome::Activated => {
                tracing::info!("Transport activated");
                ActivationState::Activated
            }
            ActivationOutcome::Failed(reason) => {
                tracing::warn!(
                    "Transport activation failed, continuing local-only: {}",
                    reason
                );
                ActivationState::Failed(reason)
            }
        };
        self.emit(StoreEvent::Activation(self.activation.clone()));
    }

    fn write_tempo(&mut self, tempo: Tempo, origin: ChangeOrigin) -> bool {
        if self.settings.tempo == tempo {
            return false;
        }
        self.settings.tempo = tempo;
        self.persist(SettingsField::Tempo, Value::from(tempo.bpm()));
        self.record_change(SettingsField::Tempo, origin);
        true
    }

    fn write_display_order(&mut self, order: DisplayOrder, origin: ChangeOrigin) -> bool {
        if self.settings.display_order == order {
            return false;
        }
        let wire = order.to_wire();
        self.settings.display_order = order;
        self.persist(SettingsField::DisplayOrder, Value::from(wire));
        self.record_change(SettingsField::DisplayOrder, origin);
        true
    }

    fn write_memo_text(&mut self, text: String, origin: ChangeOrigin) -> bool {
        if self.settings.memo_text == text {
            return false;
        }
        self.settings.memo_text.clone_from(&text);
        self.persist(SettingsField::MemoText, Value::from(text));
        self.record_change(SettingsField::MemoText, origin);
        true
    }

    fn persist(&mut self, field: SettingsField, value: Value) {
        if let Err(e) = self.storage.set(field.storage_key(), value) {
            tracing::error!("Failed to persist {}: {}", field, e);
            self.stats.persistence_failures += 1;
            self.emit(StoreEvent::PersistenceFailed {
                field,
                message: e.to_string(),
                at: Utc::now(),
            });
        }
    }

    fn record_change(&mut self, field: SettingsField, origin: ChangeOrigin) {
        match origin {
            ChangeOrigin::Local => self.stats.local_changes += 1,
            ChangeOrigin::Remote => self.stats.remote_changes += 1,
        }
        tracing::info!(
            "{} {} changed: {}",
            match origin {
                ChangeOrigin::Local => "Local",
                ChangeOrigin::Remote => "Remote",
            },
            field,
            match field {
                SettingsField::Tempo => self.settings.tempo.to_string(),
                SettingsField::DisplayOrder => self.settings.display_order.to_wire(),
                SettingsField::MemoText => format!("{} chars", self.settings.memo_text.chars().count()),
            }
        );
        self.emit(StoreEvent::Changed {
            field,
            origin,
            settings: self.settings.clone(),
        });
    }

    fn propagate(&mut self, payload: &SyncPayload) {
        let fields = payload.fields();

        match &self.activation {
            ActivationState::Activated => {}
            ActivationState::Pending => {
                tracing::debug!("Transport not activated yet, keeping {:?} local", fields);
                self.skip(fields, "transport not activated".to_string());
                return;
            }
            ActivationState::Failed(reason) => {
                tracing::warn!("Sync unavailable ({}), keeping {:?} local", reason, fields);
                let reason = format!("activation failed: {reason}");
                self.skip(fields, reason);
                return;
            }
        }

        let mut route = PropagationRoute::Durable;
        if self.transport.is_reachable() {
            match self.transport.send_immediate(payload) {
                Ok(()) => {
                    tracing::debug!("Sent {:?} immediately", fields);
                    self.stats.immediate_sends += 1;
                    self.emit(StoreEvent::Propagated {
                        fields,
                        route: PropagationRoute::Immediate,
                    });
                    return;
                }
                Err(e) => {
                    tracing::warn!("Immediate send failed, queuing instead: {}", e);
                    self.stats.fallbacks += 1;
                    route = PropagationRoute::DurableFallback;
                }
            }
        }

        match self.transport.send_durable(payload) {
            Ok(()) => {
                tracing::debug!("Queued {:?} for the peer", fields);
                self.stats.durable_sends += 1;
                self.emit(StoreEvent::Propagated { fields, route });
            }
            Err(e) => {
                tracing::warn!("Could not queue {:?} for the peer: {}", fields, e);
                self.skip(fields, e.to_string());
            }
        }
    }

    fn skip(&mut self, fields: Vec<SettingsField>, reason: String) {
        self.stats.skipped += 1;
        self.emit(StoreEvent::PropagationSkipped { fields, reason });
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn read_value(storage: &dyn KeyValueStore, key: &str) -> Option<Value> {
    match storage.get(key) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to read '{}', using default: {}", key, e);
            None
        }
    }
}

fn read_tempo(storage: &dyn KeyValueStore, fallback: Tempo) -> Tempo {
    let Some(value) = read_value(storage, KEY_TEMPO) else {
        return fallback;
    };
    value
        .as_u64()
        .and_then(|bpm| u32::try_from(bpm).ok())
        .and_then(|bpm| Tempo::new(bpm).ok())
        .unwrap_or_else(|| {
            tracing::warn!("Stored tempo {} is not usable, using {}", value, fallback);
            fallback
        })
}

fn read_display_order(storage: &dyn KeyValueStore) -> DisplayOrder {
    read_value(storage, KEY_DISPLAY_ORDER)
        .and_then(|value| value.as_str().map(DisplayOrder::parse))
        .filter(|order| !order.is_empty())
        .unwrap_or_default()
}

fn read_memo_text(storage: &dyn KeyValueStore) -> String {
    read_value(storage, KEY_MEMO_TEXT)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ToolSlot;
    use crate::storage::MemoryStore;
    use crate::transport::{DeviceRole, LoopbackLink, OfflineTransport, Outbox};
    use serde_json::json;

    struct FailingStore;

    impl KeyValueStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<Value>> {
            Err(Error::Persistence("disk unavailable".into()))
        }

        fn set(&mut self, _key: &str, _value: Value) -> Result<()> {
            Err(Error::Persistence("disk unavailable".into()))
        }
    }

    fn offline_store() -> (SharedStateStore, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::in_memory());
        let (tx, mut rx) = crate::transport::event_channel();
        let transport = OfflineTransport::start(Arc::clone(&outbox), &tx);
        let mut store = SharedStateStore::load(Box::new(MemoryStore::new()), Arc::new(transport));
        while let Ok(event) = rx.try_recv() {
            store.handle_transport_event(event);
        }
        (store, outbox)
    }

    #[test]
    fn test_load_defaults() {
        let (_link, phone, _watch) = LoopbackLink::pair();
        let store = SharedStateStore::load(Box::new(MemoryStore::new()), phone.channel());

        assert_eq!(store.settings().tempo.bpm(), crate::DEFAULT_TEMPO_BPM);
        assert_eq!(store.settings().display_order, DisplayOrder::default());
        assert_eq!(store.settings().memo_text, "");
        assert_eq!(store.activation(), &ActivationState::Pending);
    }

    #[test]
    fn test_load_persisted_values() {
        let storage = MemoryStore::with_values([
            (KEY_TEMPO, json!(79)),
            (KEY_DISPLAY_ORDER, json!("Memo Aid, Metronome")),
            (KEY_MEMO_TEXT, json!("Lock the door")),
        ]);
        let (_link, phone, _watch) = LoopbackLink::pair();
        let store = SharedStateStore::load(Box::new(storage), phone.channel());

        assert_eq!(store.settings().tempo.bpm(), 79);
        assert_eq!(
            store.settings().display_order.slots(),
            &[ToolSlot::MemoAid, ToolSlot::Metronome]
        );
        assert_eq!(store.settings().memo_text, "Lock the door");
    }

    #[test]
    fn test_load_replaces_unusable_values() {
        let storage = MemoryStore::with_values([
            (KEY_TEMPO, json!(0)),
            (KEY_DISPLAY_ORDER, json!(" , ")),
            (KEY_MEMO_TEXT, json!(42)),
        ]);
        let (_link, phone, _watch) = LoopbackLink::pair();
        let store = SharedStateStore::load(Box::new(storage), phone.channel());

        assert_eq!(store.settings(), &SyncedSettings::default());
    }

    #[test]
    fn test_load_uses_configured_default_tempo() {
        let (_link, phone, _watch) = LoopbackLink::pair();
        let options = StoreOptions {
            default_tempo: Tempo::new(79).unwrap(),
            ..StoreOptions::default()
        };
        let store =
            SharedStateStore::load_with_options(Box::new(MemoryStore::new()), phone.channel(), &options);

        assert_eq!(store.settings().tempo.bpm(), 79);
    }

    #[test]
    fn test_set_rejects_invalid_values() {
        let (mut store, outbox) = offline_store();

        assert!(matches!(store.set_tempo(0), Err(Error::InvalidTempo(0))));
        assert!(matches!(
            store.set_display_order(DisplayOrder::parse(",")),
            Err(Error::EmptyDisplayOrder)
        ));
        assert_eq!(store.settings(), &SyncedSettings::default());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_set_same_value_is_noop() {
        let (mut store, outbox) = offline_store();

        assert!(!store.set_tempo(crate::DEFAULT_TEMPO_BPM).unwrap());
        assert!(!store.set_memo_text(""));
        assert_eq!(store.stats().local_changes, 0);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_local_change_is_persisted_and_queued() {
        let (mut store, outbox) = offline_store();

        assert!(store.set_memo_text("Water the plants"));

        assert_eq!(
            outbox.peek(),
            Some(SyncPayload::memo_text("Water the plants"))
        );
        assert_eq!(store.stats().durable_sends, 1);
    }

    #[test]
    fn test_persistence_failure_is_surfaced() {
        let (_link, phone, _watch) = LoopbackLink::pair();
        let mut store = SharedStateStore::load(Box::new(FailingStore), phone.channel());
        let mut events = store.subscribe();

        assert!(store.set_tempo(79).unwrap());

        assert_eq!(store.settings().tempo.bpm(), 79);
        assert_eq!(store.stats().persistence_failures, 1);
        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let StoreEvent::PersistenceFailed { field, .. } = event {
                assert_eq!(field, SettingsField::Tempo);
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[test]
    fn test_repeated_activation_is_ignored() {
        let (link, phone, _watch) = LoopbackLink::pair();
        let (channel, mut events) = phone.into_parts();
        let mut store = SharedStateStore::load(Box::new(MemoryStore::new()), channel);

        link.fail_activation(DeviceRole::Phone, "no companion");
        link.activate_side(DeviceRole::Phone);
        while let Ok(event) = events.try_recv() {
            store.handle_transport_event(event);
        }

        assert_eq!(
            store.activation(),
            &ActivationState::Failed("no companion".into())
        );
    }

    #[test]
    fn test_remote_invalid_fields_are_ignored() {
        let (mut store, outbox) = offline_store();
        let payload = SyncPayload {
            tempo_bpm: Some(0),
            display_order: Some(DisplayOrder::parse("")),
            memo_text: Some("Keys".into()),
        };

        let changed = store.apply_remote_update(&payload);

        assert_eq!(changed, vec![SettingsField::MemoText]);
        assert_eq!(store.settings().tempo, Tempo::default());
        assert_eq!(store.stats().remote_rejected, 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_remote_tempo_outside_u32_is_ignored() {
        let (mut store, _outbox) = offline_store();

        for bpm in [-79, 5_000_000_000] {
            let payload = SyncPayload {
                tempo_bpm: Some(bpm),
                ..SyncPayload::default()
            };
            assert!(store.apply_remote_update(&payload).is_empty());
        }

        assert_eq!(store.settings().tempo, Tempo::default());
        assert_eq!(store.stats().remote_rejected, 2);
    }

    #[test]
    fn test_blank_display_order_is_rejected() {
        let (mut store, outbox) = offline_store();
        let blank = DisplayOrder::new(vec![ToolSlot::Other("  ".into())]);

        assert!(matches!(
            store.set_display_order(blank),
            Err(Error::EmptyDisplayOrder)
        ));
        assert_eq!(store.settings().display_order, DisplayOrder::default());
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_push_full_snapshot() {
        let (mut store, outbox) = offline_store();
        store.set_tempo(30).unwrap();
        store.push_full_snapshot();

        let pending = outbox.peek().unwrap();
        assert_eq!(pending.tempo_bpm, Some(30));
        assert_eq!(pending.display_order, Some(DisplayOrder::default()));
        assert_eq!(pending.memo_text.as_deref(), Some(""));
    }
}
