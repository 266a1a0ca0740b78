//! Wire-level message content types for the LinkChat protocol.
//!
//! A [`WireMessage`] is pure content: it carries no sender address and no
//! timestamp.  The link is point-to-point, so the receiving side attributes
//! every decoded message to the one connected peer, and the sending side
//! attributes its own messages to the local identity.  Attribution and
//! timestamps are applied by the message router, never encoded.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the frame header in bytes: 1 type tag + 4 payload length.
pub const HEADER_SIZE: usize = 5;

/// Default upper bound on the payload length field (16 MiB).
///
/// A declared length above this bound is treated as stream corruption, not as
/// an oversized message: once the length field cannot be trusted, neither can
/// the byte alignment of anything that follows.
pub const DEFAULT_MAX_PAYLOAD_LEN: u32 = 16 * 1024 * 1024;

// ── Frame type tags ───────────────────────────────────────────────────────────

/// Frame type tag byte, the first byte of every frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    Text = 0x01,
    Audio = 0x02,
    Image = 0x03,
}

impl TryFrom<u8> for FrameType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameType::Text),
            0x02 => Ok(FrameType::Audio),
            0x03 => Ok(FrameType::Image),
            _ => Err(()),
        }
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// Decoded 5-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Identifies how the payload bytes are interpreted.
    pub frame_type: FrameType,
    /// Length of the payload in bytes (not including this header).
    pub payload_len: u32,
}

// ── Message content ───────────────────────────────────────────────────────────

/// All message content that can travel over a LinkChat connection.
///
/// `Image` is reserved: inbound frames decode so that a newer peer does not
/// corrupt the stream for an older one, but there is no encode path yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    /// UTF-8 text message body.
    Text { body: String },
    /// Opaque audio clip bytes; the codec never inspects them.
    Audio { payload: Vec<u8> },
    /// Opaque image bytes (reserved; decode-only).
    Image { payload: Vec<u8> },
}

impl WireMessage {
    /// Returns the [`FrameType`] discriminant for this message.
    pub fn frame_type(&self) -> FrameType {
        match self {
            WireMessage::Text { .. } => FrameType::Text,
            WireMessage::Audio { .. } => FrameType::Audio,
            WireMessage::Image { .. } => FrameType::Image,
        }
    }
}
