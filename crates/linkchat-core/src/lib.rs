//! # linkchat-core
//!
//! Shared library for LinkChat containing the wire protocol codec and the
//! domain entities for one point-to-point chat session.
//!
//! This crate is used by the session engine and by anything embedding it.
//! It has zero dependencies on OS APIs, UI frameworks, or network sockets.
//!
//! - **`protocol`** – How bytes travel over the link.  Each message becomes a
//!   type-tagged, length-prefixed binary frame (5-byte header + payload) and
//!   is decoded back into typed content on the other end.
//!
//! - **`domain`** – Pure business types: peer identity (equality by address),
//!   attributed chat messages, the connection lifecycle state, and the pure
//!   fold that produces the immutable [`SessionSnapshot`] consumed by a
//!   presentation layer.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `linkchat_core::PeerIdentity` instead of the full module path.
pub use domain::message::{AudioMessage, ChatMessage, ImageMessage, TextMessage};
pub use domain::peer::{PeerAddress, PeerIdentity};
pub use domain::session::{project, ConnectionState, FailureReason, SessionSnapshot};
pub use protocol::codec::{decode_header, decode_message, decode_payload, encode_message, CodecError};
pub use protocol::messages::{FrameHeader, FrameType, WireMessage, DEFAULT_MAX_PAYLOAD_LEN, HEADER_SIZE};
