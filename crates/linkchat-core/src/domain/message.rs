//! Attributed chat messages.
//!
//! A [`ChatMessage`] is what the session log stores: wire content plus the
//! sender's address and the local receive/send timestamp.  Whether a message
//! "is mine" is always derived by comparing the sender address to the local
//! identity, never stored as a flag, so attribution cannot drift from the
//! identity that produced the message.

use serde::{Deserialize, Serialize};

use crate::domain::peer::PeerAddress;

/// A text chat entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextMessage {
    /// Address of the device that produced the message.
    pub sender: PeerAddress,
    /// UTF-8 message body.
    pub body: String,
    /// Milliseconds since the Unix epoch when the router logged the message.
    pub sent_at_ms: u64,
}

/// A voice clip chat entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMessage {
    pub sender: PeerAddress,
    /// Opaque clip bytes as captured or received; the core never decodes them.
    pub payload: Vec<u8>,
    /// Clip duration reported by the capture device.  `None` for clips
    /// received over the wire, since the frame carries only the raw payload.
    pub duration_hint_ms: Option<u32>,
    pub sent_at_ms: u64,
}

/// An image chat entry (reserved; the send path never constructs one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub sender: PeerAddress,
    pub payload: Vec<u8>,
    pub sent_at_ms: u64,
}

/// One entry in the session message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatMessage {
    Text(TextMessage),
    Audio(AudioMessage),
    Image(ImageMessage),
}

impl ChatMessage {
    /// Address of the device that produced this message.
    pub fn sender(&self) -> &PeerAddress {
        match self {
            ChatMessage::Text(m) => &m.sender,
            ChatMessage::Audio(m) => &m.sender,
            ChatMessage::Image(m) => &m.sender,
        }
    }

    /// When the router logged this message, in milliseconds since the epoch.
    pub fn sent_at_ms(&self) -> u64 {
        match self {
            ChatMessage::Text(m) => m.sent_at_ms,
            ChatMessage::Audio(m) => m.sent_at_ms,
            ChatMessage::Image(m) => m.sent_at_ms,
        }
    }

    /// Returns `true` if this message originated on the device identified by
    /// `local`.
    pub fn is_from(&self, local: &PeerAddress) -> bool {
        self.sender() == local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(sender: &str, body: &str) -> ChatMessage {
        ChatMessage::Text(TextMessage {
            sender: PeerAddress::new(sender),
            body: body.to_string(),
            sent_at_ms: 1_700_000_000_000,
        })
    }

    #[test]
    fn test_attribution_is_derived_from_sender_address() {
        let local = PeerAddress::new("AA:BB");
        let mine = text("AA:BB", "hi");
        let theirs = text("CC:DD", "hello");
        assert!(mine.is_from(&local));
        assert!(!theirs.is_from(&local));
    }

    #[test]
    fn test_sender_accessor_covers_every_variant() {
        let addr = PeerAddress::new("AA:BB");
        let audio = ChatMessage::Audio(AudioMessage {
            sender: addr.clone(),
            payload: vec![1, 2, 3],
            duration_hint_ms: Some(1200),
            sent_at_ms: 0,
        });
        let image = ChatMessage::Image(ImageMessage {
            sender: addr.clone(),
            payload: vec![],
            sent_at_ms: 0,
        });
        assert_eq!(audio.sender(), &addr);
        assert_eq!(image.sender(), &addr);
    }
}
