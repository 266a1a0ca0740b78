//! Connection lifecycle state and the session snapshot projection.
//!
//! LinkChat supports exactly one active peer connection, so the connection
//! state is a single value rather than a per-peer registry.  The state moves
//! through:
//!
//! ```text
//! Idle ──startListening──► Listening ──peerConnected──► Connected
//! Idle ──connectTo──────► Connecting ──succeeded─────► Connected
//!                          Connecting ──failed────────► Failed(reason)
//! Connected ──disconnect / stream error──► Disconnecting ──► Idle
//! Failed ──acknowledged by next startListening/connectTo──► (new attempt)
//! ```
//!
//! [`project`] folds the connection state, the optional peer, and the message
//! log into one immutable [`SessionSnapshot`].  The fold is pure so the
//! presentation layer can be driven entirely by value.

use serde::{Deserialize, Serialize};

use crate::domain::message::ChatMessage;
use crate::domain::peer::PeerIdentity;

/// Why a connection or connection attempt ended abnormally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The transport reported an I/O failure, or the peer went away.
    /// Peer-initiated graceful closes are reported the same way.
    Transport(String),
    /// The byte stream violated the frame protocol; alignment is lost.
    Protocol(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Transport(detail) => write!(f, "transport failure: {detail}"),
            FailureReason::Protocol(detail) => write!(f, "protocol violation: {detail}"),
        }
    }
}

/// Lifecycle state of the single active connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Idle,
    /// An acceptor is open, waiting for one inbound peer.
    Listening,
    /// An outbound attempt to a chosen peer is in flight.
    Connecting,
    /// A duplex stream is established and the read loop is running.
    Connected,
    /// Teardown in progress; transient on the way back to `Idle`.
    Disconnecting,
    /// The attempt or session ended abnormally.  Terminal until the caller
    /// acknowledges it by starting a new attempt.
    Failed(FailureReason),
}

impl ConnectionState {
    /// Returns `true` while an attempt or session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Listening
                | ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Disconnecting
        )
    }

    /// Short lowercase label for logs and DTOs.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Listening => "listening",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Failed(_) => "failed",
        }
    }
}

/// Immutable point-in-time view handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The connected (or connecting) peer, when one is known.
    pub peer: Option<PeerIdentity>,
    /// Current lifecycle state.
    pub connection_state: ConnectionState,
    /// The session's message log in arrival order.
    pub messages: Vec<ChatMessage>,
}

/// Folds the current state, peer, and log into a [`SessionSnapshot`].
///
/// Pure function: recomputed and republished by the router on every state or
/// log change; consumers receive owned values and never mutate shared state.
pub fn project(
    connection_state: ConnectionState,
    peer: Option<PeerIdentity>,
    messages: &[ChatMessage],
) -> SessionSnapshot {
    SessionSnapshot {
        peer,
        connection_state,
        messages: messages.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::TextMessage;
    use crate::domain::peer::PeerAddress;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
    }

    #[test]
    fn test_is_active_covers_in_flight_states() {
        assert!(!ConnectionState::Idle.is_active());
        assert!(ConnectionState::Listening.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(ConnectionState::Disconnecting.is_active());
        assert!(!ConnectionState::Failed(FailureReason::Transport("gone".into())).is_active());
    }

    #[test]
    fn test_project_copies_log_and_state() {
        let peer = PeerIdentity::new(Some("Phone-B".to_string()), "AA:BB");
        let log = vec![ChatMessage::Text(TextMessage {
            sender: PeerAddress::new("AA:BB"),
            body: "hi".to_string(),
            sent_at_ms: 42,
        })];

        let snapshot = project(ConnectionState::Connected, Some(peer.clone()), &log);

        assert_eq!(snapshot.connection_state, ConnectionState::Connected);
        assert_eq!(snapshot.peer, Some(peer));
        assert_eq!(snapshot.messages, log);
    }

    #[test]
    fn test_project_with_no_peer_and_empty_log() {
        let snapshot = project(ConnectionState::Idle, None, &[]);
        assert_eq!(snapshot, SessionSnapshot::default());
    }

    #[test]
    fn test_failure_reason_display_includes_detail() {
        let reason = FailureReason::Protocol("unknown frame type: 0x7F".to_string());
        assert_eq!(
            reason.to_string(),
            "protocol violation: unknown frame type: 0x7F"
        );
    }
}
