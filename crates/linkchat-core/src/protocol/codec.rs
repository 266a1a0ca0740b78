//! Binary codec for encoding and decoding LinkChat frames.
//!
//! Wire format:
//! ```text
//! [type:1][payload_len:4][payload:N]
//! ```
//! Total header size: 5 bytes.  The length field is big-endian.
//! Text payload is the UTF-8 bytes of the body; Audio and Image payloads are
//! raw blobs with no further structure at this layer.
//!
//! The codec is pure and stateless.  Stream readers call [`decode_header`]
//! on the first 5 bytes, read exactly `payload_len` more, then call
//! [`decode_payload`].  [`decode_message`] is a one-shot convenience over a
//! contiguous buffer.

use thiserror::Error;

use crate::protocol::messages::{
    FrameHeader, FrameType, WireMessage, DEFAULT_MAX_PAYLOAD_LEN, HEADER_SIZE,
};

/// Errors that can occur during frame encoding or decoding.
///
/// `FrameTooLarge` and `UnknownFrameType` indicate a corrupted stream: byte
/// alignment cannot be recovered once the header cannot be trusted, so the
/// connection that produced them must be torn down rather than resynced.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The type tag byte is not a recognized value.
    #[error("unknown frame type: 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The declared payload length exceeds the configured maximum.
    #[error("frame too large: declared {declared} bytes, maximum is {max}")]
    FrameTooLarge { declared: u32, max: u32 },

    /// The payload could not be parsed (UTF-8 error in a text frame).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The message variant has no encode path.
    #[error("no encode path for {0} messages")]
    NotImplemented(&'static str),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a [`WireMessage`] into a complete frame including the 5-byte header.
///
/// # Errors
///
/// Returns [`CodecError::NotImplemented`] for `Image`: the variant is
/// reserved for decode compatibility and must never be sent.
pub fn encode_message(msg: &WireMessage) -> Result<Vec<u8>, CodecError> {
    let payload: &[u8] = match msg {
        WireMessage::Text { body } => body.as_bytes(),
        WireMessage::Audio { payload } => payload,
        WireMessage::Image { .. } => return Err(CodecError::NotImplemented("Image")),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(msg.frame_type() as u8);
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes and validates the 5-byte frame header at the start of `bytes`.
///
/// # Errors
///
/// - [`CodecError::InsufficientData`] if fewer than 5 bytes are available.
/// - [`CodecError::UnknownFrameType`] for an unrecognized tag.
/// - [`CodecError::FrameTooLarge`] if the declared length exceeds `max_payload_len`.
pub fn decode_header(bytes: &[u8], max_payload_len: u32) -> Result<FrameHeader, CodecError> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let tag = bytes[0];
    let frame_type = FrameType::try_from(tag).map_err(|_| CodecError::UnknownFrameType(tag))?;

    let payload_len = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    if payload_len > max_payload_len {
        return Err(CodecError::FrameTooLarge {
            declared: payload_len,
            max: max_payload_len,
        });
    }

    Ok(FrameHeader {
        frame_type,
        payload_len,
    })
}

/// Decodes `payload` according to `frame_type`.
///
/// The caller must pass exactly `payload_len` bytes as read off the stream.
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] if a text payload is not valid UTF-8.
pub fn decode_payload(frame_type: FrameType, payload: &[u8]) -> Result<WireMessage, CodecError> {
    match frame_type {
        FrameType::Text => {
            let body = std::str::from_utf8(payload)
                .map_err(|e| CodecError::MalformedPayload(format!("invalid UTF-8: {e}")))?
                .to_string();
            Ok(WireMessage::Text { body })
        }
        FrameType::Audio => Ok(WireMessage::Audio {
            payload: payload.to_vec(),
        }),
        FrameType::Image => Ok(WireMessage::Image {
            payload: payload.to_vec(),
        }),
    }
}

/// Decodes one [`WireMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
/// Uses [`DEFAULT_MAX_PAYLOAD_LEN`] as the size bound.
///
/// # Errors
///
/// Returns [`CodecError`] if the bytes are malformed or incomplete.
///
/// # Examples
///
/// ```rust
/// use linkchat_core::protocol::{decode_message, encode_message, WireMessage};
///
/// let msg = WireMessage::Text { body: "hi".to_string() };
/// let bytes = encode_message(&msg).unwrap();
/// let (decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<(WireMessage, usize), CodecError> {
    let header = decode_header(bytes, DEFAULT_MAX_PAYLOAD_LEN)?;

    let total = HEADER_SIZE + header.payload_len as usize;
    if bytes.len() < total {
        return Err(CodecError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }

    let msg = decode_payload(header.frame_type, &bytes[HEADER_SIZE..total])?;
    Ok((msg, total))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
