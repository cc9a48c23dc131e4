//! Error types for UNFOG.
//!
//! This module provides a unified error type for all UNFOG operations,
//! with specific error variants for the ways settings sync can degrade.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for UNFOG operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for UNFOG.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport session failed to activate (E001)
    #[error("transport activation failed: {0}")]
    ActivationFailed(String),

    /// Peer is not reachable for an immediate send (E002)
    #[error("peer is not reachable")]
    PeerUnreachable,

    /// Immediate or durable send failed (E003)
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Backing key-value storage could not be read or written (E004)
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Tempo outside the accepted range (E005)
    #[error("tempo {0} BPM is outside the accepted range {min}..={max}", min = crate::MIN_TEMPO_BPM, max = crate::MAX_TEMPO_BPM)]
    InvalidTempo(u32),

    /// Display order with no tool tokens (E006)
    #[error("display order must contain at least one tool")]
    EmptyDisplayOrder,

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// Unexpected message type
    #[error("unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessage {
        /// Expected message type
        expected: String,
        /// Actual message type received
        actual: String,
    },

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// The store task has shut down
    #[error("settings store is no longer running")]
    StoreClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::ActivationFailed(_) => Some("E001"),
            Self::PeerUnreachable => Some("E002"),
            Self::SendFailed(_) => Some("E003"),
            Self::Persistence(_) => Some("E004"),
            Self::InvalidTempo(_) => Some("E005"),
            Self::EmptyDisplayOrder => Some("E006"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable by the durable fallback.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::PeerUnreachable | Self::SendFailed(_))
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ActivationFailed(_) => Some(
                "Settings are still saved on this device.\n\
                 Check that the peer address in config.toml is correct and restart sync.",
            ),
            Self::Persistence(_) => Some(
                "Changes were applied but could not be saved and will be lost on restart.\n\
                 Check free space and permissions of the data directory:\n\
                   unfog config path",
            ),
            Self::InvalidTempo(_) => Some("Pick a preset: 30 (slow), 50 (medium) or 79 (fast)."),
            Self::EmptyDisplayOrder => Some("List tools separated by commas, e.g. \"Metronome,Memo Aid\"."),
            _ => None,
        }
    }
}
