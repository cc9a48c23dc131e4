//! # UNFOG Core Library
//!
//! `unfog-core` keeps the UNFOG assistive tools in step between a phone and
//! a watch. Both devices hold the same three settings (metronome tempo, tool
//! display order and memo text) and reconcile them over an intermittently
//! reachable link using last-writer-wins with a single pending snapshot.
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`memo`] - Spoken memo aid playback
//! - [`metronome`] - Beat scheduling for haptic/audio cueing
//! - [`protocol`] - Wire framing for the TCP transport
//! - [`settings`] - The synchronized settings model
//! - [`storage`] - Persistent key-value backends
//! - [`store`] - The shared state store and its owning task
//! - [`transport`] - Device-to-device transport channels
//!
//! ## Example
//!
//! ```rust,ignore
//! use unfog_core::storage::MemoryStore;
//! use unfog_core::store::{SharedStateStore, StoreActor};
//! use unfog_core::transport::LoopbackLink;
//!
//! let (link, phone, _watch) = LoopbackLink::pair();
//! let (channel, events) = phone.into_parts();
//! let store = SharedStateStore::load(Box::new(MemoryStore::new()), channel);
//! let (handle, _task) = StoreActor::spawn(store, events);
//!
//! link.activate();
//! handle.set_tempo(79).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod memo;
pub mod metronome;
pub mod protocol;
pub mod settings;
pub mod storage;
pub mod store;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version for the framed TCP link
pub const PROTOCOL_VERSION: (u8, u8) = (1, 0);

/// Default TCP port for the settings link
pub const DEFAULT_SYNC_PORT: u16 = 52550;

/// Tempo used when nothing has been stored yet
pub const DEFAULT_TEMPO_BPM: u32 = 50;

/// Lowest accepted tempo
pub const MIN_TEMPO_BPM: u32 = 1;

/// Highest accepted tempo
pub const MAX_TEMPO_BPM: u32 = 300;

/// Display order used when nothing has been stored yet
pub const DEFAULT_DISPLAY_ORDER: &str = "Metronome,Memo Aid";

/// Default speech language for the memo aid
pub const DEFAULT_SPEECH_LANGUAGE: &str = "en-US";
