//! Runs a [`SharedStateStore`] on its own task.
//!
//! UI code talks to the store through a cloneable [`StoreHandle`]; the
//! transport delivers its events on an [`EventReceiver`]. Both are drained by
//! one task, so every read and write of the settings happens in one place.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::{ActivationState, SharedStateStore, StoreEvent, StoreStats};
use crate::error::{Error, Result};
use crate::settings::{DisplayOrder, SettingsField, SyncPayload, SyncedSettings};
use crate::transport::EventReceiver;

const COMMAND_CAPACITY: usize = 32;

/// Requests handled by the store task.
#[derive(Debug)]
pub enum StoreCommand {
    /// Set the tempo
    SetTempo {
        /// Beats per minute
        bpm: u32,
        /// Whether the value changed
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Set the display order
    SetDisplayOrder {
        /// New order
        order: DisplayOrder,
        /// Whether the value changed
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Set the memo text
    SetMemoText {
        /// New text
        text: String,
        /// Whether the value changed
        reply: oneshot::Sender<bool>,
    },
    /// Apply a payload as if it came from the peer
    ApplyRemote {
        /// Fields to apply
        payload: SyncPayload,
        /// Fields that changed
        reply: oneshot::Sender<Vec<SettingsField>>,
    },
    /// Send all fields to the peer
    PushSnapshot {
        /// Done
        reply: oneshot::Sender<()>,
    },
    /// Read the current settings
    Snapshot {
        /// Current settings
        reply: oneshot::Sender<SyncedSettings>,
    },
    /// Read the activation state
    Activation {
        /// Current state
        reply: oneshot::Sender<ActivationState>,
    },
    /// Read the counters
    Stats {
        /// Current counters
        reply: oneshot::Sender<StoreStats>,
    },
    /// Stop the task
    Shutdown,
}

/// Owner task for a [`SharedStateStore`].
pub struct StoreActor {
    store: SharedStateStore,
    commands: mpsc::Receiver<StoreCommand>,
    transport_events: EventReceiver,
}

impl StoreActor {
    /// Move `store` onto a new task.
    ///
    /// The task ends when every handle is dropped or [`StoreHandle::shutdown`]
    /// is called, and returns the store so callers can inspect it.
    pub fn spawn(
        store: SharedStateStore,
        transport_events: EventReceiver,
    ) -> (StoreHandle, JoinHandle<SharedStateStore>) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let handle = StoreHandle {
            commands: tx,
            events: store.event_sender(),
        };
        let actor = Self {
            store,
            commands,
            transport_events,
        };
        (handle, tokio::spawn(actor.run()))
    }

    async fn run(mut self) -> SharedStateStore {
        let mut transport_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(StoreCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                event = self.transport_events.recv(), if transport_open => {
                    match event {
                        Some(event) => self.store.handle_transport_event(event),
                        None => {
                            tracing::debug!("Transport event channel closed");
                            transport_open = false;
                        }
                    }
                }
            }
        }

        // Apply whatever already arrived before handing the store back.
        while let Ok(event) = self.transport_events.try_recv() {
            self.store.handle_transport_event(event);
        }

        tracing::debug!("Store task stopped");
        self.store
    }

    fn handle_command(&mut self, command: StoreCommand) {
        match command {
            StoreCommand::SetTempo { bpm, reply } => {
                let _ = reply.send(self.store.set_tempo(bpm));
            }
            StoreCommand::SetDisplayOrder { order, reply } => {
                let _ = reply.send(self.store.set_display_order(order));
            }
            StoreCommand::SetMemoText { text, reply } => {
                let _ = reply.send(self.store.set_memo_text(text));
            }
            StoreCommand::ApplyRemote { payload, reply } => {
                let _ = reply.send(self.store.apply_remote_update(&payload));
            }
            StoreCommand::PushSnapshot { reply } => {
                self.store.push_full_snapshot();
                let _ = reply.send(());
            }
            StoreCommand::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            StoreCommand::Activation { reply } => {
                let _ = reply.send(self.store.activation().clone());
            }
            StoreCommand::Stats { reply } => {
                let _ = reply.send(self.store.stats());
            }
            StoreCommand::Shutdown => {}
        }
    }
}

/// Cloneable access to a running [`StoreActor`].
#[derive(Debug, Clone)]
pub struct StoreHandle {
    commands: mpsc::Sender<StoreCommand>,
    events: broadcast::Sender<StoreEvent>,
}

impl StoreHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> StoreCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::StoreClosed)?;
        rx.await.map_err(|_| Error::StoreClosed)
    }

    /// Set the tempo. See [`SharedStateStore::set_tempo`].
    ///
    /// # Errors
    ///
    /// Returns the store's validation error, or [`Error::StoreClosed`].
    pub async fn set_tempo(&self, bpm: u32) -> Result<bool> {
        self.request(|reply| StoreCommand::SetTempo { bpm, reply })
            .await?
    }

    /// Set the display order. See [`SharedStateStore::set_display_order`].
    ///
    /// # Errors
    ///
    /// Returns the store's validation error, or [`Error::StoreClosed`].
    pub async fn set_display_order(&self, order: DisplayOrder) -> Result<bool> {
        self.request(|reply| StoreCommand::SetDisplayOrder { order, reply })
            .await?
    }

    /// Set the memo text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn set_memo_text(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| StoreCommand::SetMemoText { text, reply })
            .await
    }

    /// Apply a payload as if it had arrived from the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn apply_remote_update(&self, payload: SyncPayload) -> Result<Vec<SettingsField>> {
        self.request(|reply| StoreCommand::ApplyRemote { payload, reply })
            .await
    }

    /// Send all fields to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn push_full_snapshot(&self) -> Result<()> {
        self.request(|reply| StoreCommand::PushSnapshot { reply })
            .await
    }

    /// Current settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn snapshot(&self) -> Result<SyncedSettings> {
        self.request(|reply| StoreCommand::Snapshot { reply }).await
    }

    /// Transport activation state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn activation(&self) -> Result<ActivationState> {
        self.request(|reply| StoreCommand::Activation { reply })
            .await
    }

    /// Activity counters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreClosed`] if the task has stopped.
    pub async fn stats(&self) -> Result<StoreStats> {
        self.request(|reply| StoreCommand::Stats { reply }).await
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Ask the task to stop. Pending commands ahead of this one still run.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(StoreCommand::Shutdown).await;
    }
}
