//! Single-slot store-and-forward buffer.
//!
//! The outbox holds at most one pending [`SyncPayload`]. Queuing a new
//! payload replaces the old one outright; it is a last-value slot, not a log.
//! When backed by a file the slot survives process restarts, so a snapshot
//! queued by a short-lived command is delivered by the next sync session.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::settings::SyncPayload;
use crate::storage::write_json_atomic;

/// File name of the persisted outbox inside the data directory.
pub const OUTBOX_FILE: &str = "outbox.json";

/// A payload waiting for the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSnapshot {
    /// Fields to deliver
    pub payload: SyncPayload,
    /// When the payload was queued
    pub queued_at: DateTime<Utc>,
}

/// Depth-1 pending snapshot, optionally persisted.
#[derive(Debug, Default)]
pub struct Outbox {
    /// Backing file, `None` for in-memory only
    path: Option<PathBuf>,
    slot: Mutex<Option<PendingSnapshot>>,
}

impl Outbox {
    /// Create an in-memory outbox.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a persisted outbox, loading any snapshot left by a previous run.
    ///
    /// An unreadable file is discarded with a warning: a lost snapshot only
    /// delays convergence until the next local change.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be opened.
    pub fn open(path: PathBuf) -> Result<Self> {
        let slot = if path.exists() {
            let file = fs::File::open(&path).map_err(|e| {
                Error::Persistence(format!("Failed to open outbox at {}: {}", path.display(), e))
            })?;
            match serde_json::from_reader::<_, PendingSnapshot>(BufReader::new(file)) {
                Ok(pending) => {
                    tracing::debug!(
                        "Loaded pending snapshot queued at {} ({:?})",
                        pending.queued_at,
                        pending.payload.fields()
                    );
                    Some(pending)
                }
                Err(e) => {
                    tracing::warn!("Discarding unreadable outbox {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            path: Some(path),
            slot: Mutex::new(slot),
        })
    }

    /// Open the persisted outbox inside a data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be opened.
    pub fn open_in(dir: &Path) -> Result<Self> {
        Self::open(dir.join(OUTBOX_FILE))
    }

    /// Queue a payload, replacing whatever was pending.
    ///
    /// Returns the replaced payload, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if a persisted outbox cannot be written. The
    /// in-memory slot is updated regardless.
    pub fn replace(&self, payload: SyncPayload) -> Result<Option<SyncPayload>> {
        let pending = PendingSnapshot {
            payload,
            queued_at: Utc::now(),
        };
        let mut slot = self.lock();
        let previous = slot.replace(pending.clone()).map(|p| p.payload);
        drop(slot);

        if let Some(path) = &self.path {
            write_json_atomic(path, &pending)?;
        }
        Ok(previous)
    }

    /// The pending payload, without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<SyncPayload> {
        self.lock().as_ref().map(|p| p.payload.clone())
    }

    /// The pending snapshot with its queue time.
    #[must_use]
    pub fn pending(&self) -> Option<PendingSnapshot> {
        self.lock().clone()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Remove and return the pending payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted file cannot be removed.
    pub fn take(&self) -> Result<Option<SyncPayload>> {
        let taken = self.lock().take().map(|p| p.payload);
        if taken.is_some() {
            self.remove_file()?;
        }
        Ok(taken)
    }

    /// Clear the slot only if it still holds `delivered`.
    ///
    /// Used after a flush so a snapshot queued during the write is kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted file cannot be removed.
    pub fn clear_if(&self, delivered: &SyncPayload) -> Result<bool> {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|p| &p.payload == delivered) {
            *slot = None;
            drop(slot);
            self.remove_file()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn remove_file(&self) -> Result<()> {
        match &self.path {
            Some(path) if path.exists() => fs::remove_file(path).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to remove outbox {}: {}",
                    path.display(),
                    e
                ))
            }),
            _ => Ok(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<PendingSnapshot>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DisplayOrder, Tempo};
    use tempfile::TempDir;

    #[test]
    fn test_replace_keeps_only_latest() {
        let outbox = Outbox::in_memory();
        let first = SyncPayload::tempo(Tempo::new(30).unwrap());
        let second = SyncPayload::memo_text("Call Anna");

        assert_eq!(outbox.replace(first.clone()).unwrap(), None);
        assert_eq!(outbox.replace(second.clone()).unwrap(), Some(first));
        assert_eq!(outbox.peek(), Some(second));
    }

    #[test]
    fn test_take_empties_slot() {
        let outbox = Outbox::in_memory();
        outbox
            .replace(SyncPayload::display_order(DisplayOrder::default()))
            .unwrap();

        assert!(outbox.take().unwrap().is_some());
        assert!(outbox.is_empty());
        assert_eq!(outbox.take().unwrap(), None);
    }

    #[test]
    fn test_clear_if_ignores_newer_snapshot() {
        let outbox = Outbox::in_memory();
        let flushed = SyncPayload::tempo(Tempo::new(50).unwrap());
        outbox.replace(flushed.clone()).unwrap();
        outbox.replace(SyncPayload::tempo(Tempo::new(79).unwrap())).unwrap();

        assert!(!outbox.clear_if(&flushed).unwrap());
        assert_eq!(outbox.peek().and_then(|p| p.tempo_bpm), Some(79));
    }

    #[test]
    fn test_persisted_snapshot_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let payload = SyncPayload::tempo(Tempo::new(79).unwrap());

        {
            let outbox = Outbox::open_in(temp_dir.path()).unwrap();
            outbox.replace(payload.clone()).unwrap();
        }

        let reopened = Outbox::open_in(temp_dir.path()).unwrap();
        assert_eq!(reopened.peek(), Some(payload.clone()));

        assert!(reopened.clear_if(&payload).unwrap());
        assert!(!temp_dir.path().join(OUTBOX_FILE).exists());
    }

    #[test]
    fn test_unreadable_file_is_discarded() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(OUTBOX_FILE), "garbage").unwrap();

        let outbox = Outbox::open_in(temp_dir.path()).unwrap();
        assert!(outbox.is_empty());
    }
}
