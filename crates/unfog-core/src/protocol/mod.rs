//! Wire framing for the TCP settings link.
//!
//! ## Frame Format
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      UNFG Frame                            │
//! ├────────────┬────────────┬────────────┬─────────────────────┤
//! │   Magic    │  Version   │    Kind    │    Body length      │
//! │  4 bytes   │  2 bytes   │   1 byte   │  4 bytes, BE        │
//! ├────────────┴────────────┴────────────┴─────────────────────┤
//! │                      JSON body                             │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! A frame whose major version differs from ours is rejected before its body
//! is read.
//!
//! ## Delivery
//!
//! `SettingsUpdate` bodies are a bare [`SyncPayload`], e.g. `{"tempoBpm":79}`,
//! and are fire-and-forget. `SettingsContext` bodies wrap the payload in a
//! [`ContextEnvelope`] carrying an id; the receiver answers with a
//! `ContextAck` holding the same id, and only then may the sender drop its
//! pending snapshot.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::settings::SyncPayload;
use crate::transport::DeviceRole;

/// Protocol magic bytes: "UNFG"
pub const MAGIC: [u8; 4] = *b"UNFG";

/// Frame header size in bytes
pub const HEADER_SIZE: usize = 11;

/// Largest accepted body (1 MiB)
pub const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Frame kinds on the settings link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Initial handshake (connecting side)
    Hello = 0x01,
    /// Handshake response (listening side)
    HelloAck = 0x02,
    /// Settings sent while both devices are live
    SettingsUpdate = 0x10,
    /// Pending snapshot flushed after (re)connecting
    SettingsContext = 0x11,
    /// Receipt for a `SettingsContext`
    ContextAck = 0x12,
    /// Keep-alive
    Ping = 0x30,
    /// Keep-alive response
    Pong = 0x31,
    /// Fatal error, the sender closes the link
    Error = 0xFF,
}

impl MessageType {
    const ALL: [Self; 8] = [
        Self::Hello,
        Self::HelloAck,
        Self::SettingsUpdate,
        Self::SettingsContext,
        Self::ContextAck,
        Self::Ping,
        Self::Pong,
        Self::Error,
    ];

    /// Look up a kind by its wire byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| *kind as u8 == byte)
    }
}

/// One message on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the body holds
    pub kind: MessageType,
    /// JSON body, empty for keep-alives
    pub body: Vec<u8>,
}

impl Frame {
    /// A frame without a body.
    #[must_use]
    pub const fn empty(kind: MessageType) -> Self {
        Self {
            kind,
            body: Vec::new(),
        }
    }

    /// A frame whose body is `value` as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: Serialize>(kind: MessageType, value: &T) -> Result<Self> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Self { kind, body })
    }

    /// Decode the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a valid `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::Serialization(format!("bad {:?} body: {e}", self.kind))
        })
    }

    /// Header and body as one buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the body exceeds [`MAX_BODY_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.body.len())
            .ok()
            .filter(|len| *len as usize <= MAX_BODY_SIZE)
            .ok_or_else(|| {
                Error::ProtocolError(format!("body too large: {} bytes", self.body.len()))
            })?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.body.len());
        bytes.extend_from_slice(&MAGIC);
        bytes.push(crate::PROTOCOL_VERSION.0);
        bytes.push(crate::PROTOCOL_VERSION.1);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    /// Read the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the stream ends mid-frame and
    /// [`Error::ProtocolError`] for a malformed header.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).await?;
        let (kind, length) = parse_header(&header)?;

        let mut body = vec![0u8; length];
        reader.read_exact(&mut body).await?;
        Ok(Self { kind, body })
    }

    /// Write the frame and flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is too large or the write fails.
    pub async fn write_to<W>(&self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()?).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn parse_header(header: &[u8; HEADER_SIZE]) -> Result<(MessageType, usize)> {
    let (magic, rest) = header.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(Error::ProtocolError("invalid magic bytes".to_string()));
    }

    let major = rest[0];
    if major != crate::PROTOCOL_VERSION.0 {
        return Err(Error::ProtocolError(format!(
            "frame version {}.{} is not supported",
            rest[0], rest[1]
        )));
    }

    let kind = MessageType::from_byte(rest[2])
        .ok_or_else(|| Error::ProtocolError(format!("unknown message type: {:#x}", rest[2])))?;

    let length = u32::from_be_bytes([rest[3], rest[4], rest[5], rest[6]]) as usize;
    if length > MAX_BODY_SIZE {
        return Err(Error::ProtocolError(format!("body too large: {length} bytes")));
    }

    Ok((kind, length))
}

/// Hello / HelloAck body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Device name
    pub device_name: String,
    /// Which device this is
    pub role: DeviceRole,
    /// Per-process identifier
    pub device_id: Uuid,
    /// Protocol version string
    pub protocol_version: String,
}

/// `SettingsContext` body: the pending snapshot and the id to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEnvelope {
    /// Echoed back in the [`ContextAck`]
    pub id: Uuid,
    /// The snapshot
    pub settings: SyncPayload,
}

impl ContextEnvelope {
    /// Wrap a snapshot under a fresh id.
    #[must_use]
    pub fn new(settings: SyncPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
        }
    }
}

/// `ContextAck` body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextAck {
    /// Id of the envelope that was received
    pub id: Uuid,
}

/// Error frame body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable reason
    pub message: String,
}

/// Protocol version as sent in [`HelloPayload::protocol_version`].
#[must_use]
pub fn version_string() -> String {
    format!("{}.{}", crate::PROTOCOL_VERSION.0, crate::PROTOCOL_VERSION.1)
}

/// Check that a peer speaks a compatible protocol (same major version).
///
/// # Errors
///
/// Returns an error if the version string is malformed or the major differs.
pub fn check_version(peer_version: &str) -> Result<()> {
    let major = peer_version
        .split('.')
        .next()
        .and_then(|m| m.parse::<u8>().ok())
        .ok_or_else(|| Error::ProtocolError(format!("malformed version '{peer_version}'")))?;

    if major == crate::PROTOCOL_VERSION.0 {
        Ok(())
    } else {
        Err(Error::ProtocolError(format!(
            "incompatible protocol version {peer_version}, expected {}",
            version_string()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Tempo;

    async fn read_back(bytes: Vec<u8>) -> Result<Frame> {
        let mut cursor = std::io::Cursor::new(bytes);
        Frame::read_from(&mut cursor).await
    }

    #[test]
    fn test_message_type_from_byte() {
        assert_eq!(MessageType::from_byte(0x10), Some(MessageType::SettingsUpdate));
        assert_eq!(MessageType::from_byte(0x12), Some(MessageType::ContextAck));
        assert_eq!(MessageType::from_byte(0x99), None);
    }

    #[test]
    fn test_header_layout() {
        let bytes = Frame::empty(MessageType::Pong).to_bytes().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], b"UNFG");
        assert_eq!(bytes[6], 0x31);
        assert_eq!(&bytes[7..11], &[0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_settings_frame_over_stream() {
        let payload = SyncPayload::tempo(Tempo::new(79).unwrap());
        let mut buffer = Vec::new();
        Frame::json(MessageType::SettingsUpdate, &payload)
            .unwrap()
            .write_to(&mut buffer)
            .await
            .unwrap();

        let frame = read_back(buffer).await.unwrap();
        assert_eq!(frame.kind, MessageType::SettingsUpdate);
        assert_eq!(frame.body, br#"{"tempoBpm":79}"#);
        assert_eq!(frame.parse::<SyncPayload>().unwrap(), payload);
    }

    #[tokio::test]
    async fn test_context_envelope_and_ack_share_id() {
        let envelope = ContextEnvelope::new(SyncPayload::memo_text("Keys"));
        let bytes = Frame::json(MessageType::SettingsContext, &envelope)
            .unwrap()
            .to_bytes()
            .unwrap();

        let received: ContextEnvelope = read_back(bytes).await.unwrap().parse().unwrap();
        assert_eq!(received, envelope);

        let ack = Frame::json(MessageType::ContextAck, &ContextAck { id: received.id }).unwrap();
        assert_eq!(ack.parse::<ContextAck>().unwrap().id, envelope.id);
    }

    #[tokio::test]
    async fn test_rejects_bad_magic() {
        let mut bytes = Frame::empty(MessageType::Ping).to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(read_back(bytes).await, Err(Error::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_rejects_other_major_version() {
        let mut bytes = Frame::empty(MessageType::Ping).to_bytes().unwrap();
        bytes[4] = crate::PROTOCOL_VERSION.0 + 1;
        assert!(matches!(read_back(bytes).await, Err(Error::ProtocolError(_))));
    }

    #[tokio::test]
    async fn test_rejects_oversized_body() {
        let mut bytes = Frame::empty(MessageType::SettingsUpdate).to_bytes().unwrap();
        #[allow(clippy::cast_possible_truncation)]
        let too_big = (MAX_BODY_SIZE as u32 + 1).to_be_bytes();
        bytes[7..11].copy_from_slice(&too_big);
        assert!(read_back(bytes).await.is_err());

        let frame = Frame {
            kind: MessageType::SettingsUpdate,
            body: vec![b' '; MAX_BODY_SIZE + 1],
        };
        assert!(frame.to_bytes().is_err());
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let mut bytes = Frame {
            kind: MessageType::SettingsUpdate,
            body: br#"{"memoText":"hi"}"#.to_vec(),
        }
        .to_bytes()
        .unwrap();
        bytes.truncate(bytes.len() - 3);

        assert!(matches!(read_back(bytes).await, Err(Error::Io(_))));
    }

    #[test]
    fn test_check_version() {
        assert!(check_version("1.0").is_ok());
        assert!(check_version("1.7").is_ok());
        assert!(check_version("2.0").is_err());
        assert!(check_version("latest").is_err());
    }
}
