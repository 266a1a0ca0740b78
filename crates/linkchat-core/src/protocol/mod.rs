//! Protocol module containing message content types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_header, decode_message, decode_payload, encode_message, CodecError};
pub use messages::*;
