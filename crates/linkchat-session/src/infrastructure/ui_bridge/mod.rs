//! Presentation command bridge.
//!
//! Thin glue between an embedding UI and the [`ChatSession`]: command
//! functions that delegate to the session, and DTOs that flatten the domain
//! types into JSON-friendly shapes.  Every command returns the same
//! [`CommandResult`] envelope so the frontend can always check `success`
//! without a try/catch around the call.
//!
//! Any change to a DTO struct here must be reflected in the embedding UI's
//! type definitions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use linkchat_core::{ChatMessage, PeerIdentity, SessionSnapshot};

use crate::application::ChatSession;

// ── Shared application state ──────────────────────────────────────────────────

/// Application state shared between UI commands.
///
/// Wrapped in `Arc` and handed to every command; the [`ChatSession`] is
/// internally synchronized, so no outer lock is needed.
pub struct AppState {
    pub session: ChatSession,
}

impl AppState {
    pub fn new(session: ChatSession) -> Arc<Self> {
        Arc::new(Self { session })
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// DTO for a peer shown in the device list or chat header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDto {
    pub name: Option<String>,
    pub address: String,
}

impl From<&PeerIdentity> for PeerDto {
    fn from(p: &PeerIdentity) -> Self {
        Self {
            name: p.name.clone(),
            address: p.address.to_string(),
        }
    }
}

impl From<PeerDto> for PeerIdentity {
    fn from(dto: PeerDto) -> Self {
        PeerIdentity::new(dto.name, dto.address)
    }
}

/// DTO for one chat bubble.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    /// `"text"`, `"audio"`, or `"image"`.
    pub kind: String,
    /// Text body; present for text messages only.
    pub body: Option<String>,
    /// Payload size in bytes; present for audio and image messages.
    pub payload_len: Option<usize>,
    /// Clip duration, when the capture device reported one.
    pub duration_hint_ms: Option<u32>,
    /// Whether the local user sent this message (drives bubble alignment).
    pub is_local: bool,
    pub sent_at_ms: u64,
}

/// DTO for the whole session view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDto {
    pub connection_state: String,
    pub peer: Option<PeerDto>,
    pub messages: Vec<MessageDto>,
}

/// Flattens a [`SessionSnapshot`] for the local device `local`.
fn snapshot_dto(snapshot: &SessionSnapshot, local: &PeerIdentity) -> SnapshotDto {
    let messages = snapshot
        .messages
        .iter()
        .map(|m| {
            let is_local = m.is_from(&local.address);
            match m {
                ChatMessage::Text(t) => MessageDto {
                    kind: "text".to_string(),
                    body: Some(t.body.clone()),
                    payload_len: None,
                    duration_hint_ms: None,
                    is_local,
                    sent_at_ms: t.sent_at_ms,
                },
                ChatMessage::Audio(a) => MessageDto {
                    kind: "audio".to_string(),
                    body: None,
                    payload_len: Some(a.payload.len()),
                    duration_hint_ms: a.duration_hint_ms,
                    is_local,
                    sent_at_ms: a.sent_at_ms,
                },
                ChatMessage::Image(i) => MessageDto {
                    kind: "image".to_string(),
                    body: None,
                    payload_len: Some(i.payload.len()),
                    duration_hint_ms: None,
                    is_local,
                    sent_at_ms: i.sent_at_ms,
                },
            }
        })
        .collect();

    SnapshotDto {
        connection_state: snapshot.connection_state.label().to_string(),
        peer: snapshot.peer.as_ref().map(PeerDto::from),
        messages,
    }
}

/// Unified response wrapper used by UI commands.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

fn from_result<T: Serialize>(result: Result<T, impl std::fmt::Display>) -> CommandResult<T> {
    match result {
        Ok(v) => CommandResult::ok(v),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current session view.
pub async fn get_snapshot(state: Arc<AppState>) -> CommandResult<SnapshotDto> {
    let snapshot = state.session.snapshot();
    CommandResult::ok(snapshot_dto(&snapshot, state.session.local()))
}

/// Starts listening for an inbound peer.
pub async fn start_listening(state: Arc<AppState>) -> CommandResult<()> {
    from_result(state.session.start_listening().await)
}

/// Dials the chosen peer.
pub async fn connect_to(state: Arc<AppState>, peer: PeerDto) -> CommandResult<()> {
    from_result(state.session.connect_to(peer.into()).await)
}

/// Disconnects or cancels the current attempt.
pub async fn disconnect(state: Arc<AppState>) -> CommandResult<()> {
    from_result(state.session.disconnect().await)
}

/// Sends a text message.
pub async fn send_text(state: Arc<AppState>, body: String) -> CommandResult<()> {
    from_result(state.session.send_text(body).await)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::audio::mock::MockAudioAdapter;
    use crate::infrastructure::transport::connection_manager::LinkConfig;
    use crate::infrastructure::transport::memory::MemoryHub;

    fn make_state() -> Arc<AppState> {
        let hub = MemoryHub::new();
        let local = PeerIdentity::new(Some("Phone-A".to_string()), "AA:BB");
        let transport = Arc::new(hub.endpoint(local.clone()));
        let audio = Arc::new(MockAudioAdapter::new());
        let session = ChatSession::new(local, transport, audio, LinkConfig::default());
        AppState::new(session)
    }

    #[tokio::test]
    async fn test_get_snapshot_starts_idle_and_empty() {
        let state = make_state();
        let result = get_snapshot(state).await;
        assert!(result.success);
        let dto = result.data.unwrap();
        assert_eq!(dto.connection_state, "idle");
        assert!(dto.peer.is_none());
        assert!(dto.messages.is_empty());
    }

    #[tokio::test]
    async fn test_send_text_without_connection_reports_error() {
        let state = make_state();
        let result = send_text(state, "hi".to_string()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not connected"));
    }

    #[tokio::test]
    async fn test_disconnect_while_idle_reports_error() {
        let state = make_state();
        let result = disconnect(state).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_start_listening_succeeds_and_snapshot_reflects_it() {
        let state = make_state();
        let result = start_listening(Arc::clone(&state)).await;
        assert!(result.success, "listen failed: {:?}", result.error);

        let snapshot = get_snapshot(state).await.data.unwrap();
        assert_eq!(snapshot.connection_state, "listening");
    }

    #[tokio::test]
    async fn test_connect_to_unknown_peer_eventually_fails() {
        let state = make_state();
        let result = connect_to(
            Arc::clone(&state),
            PeerDto {
                name: None,
                address: "00:00".to_string(),
            },
        )
        .await;
        // The command itself succeeds; the failure surfaces in the snapshot.
        assert!(result.success);

        let mut rx = state.session.snapshots();
        let snapshot = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            rx.wait_for(|s| {
                matches!(
                    s.connection_state,
                    linkchat_core::ConnectionState::Failed(_)
                )
            }),
        )
        .await
        .expect("timed out")
        .expect("channel closed")
        .clone();
        assert_eq!(snapshot.connection_state.label(), "failed");
    }

    #[test]
    fn test_message_dto_distinguishes_kinds() {
        use linkchat_core::{AudioMessage, PeerAddress, TextMessage};

        let local = PeerIdentity::new(Some("Phone-A".to_string()), "AA:BB");
        let snapshot = SessionSnapshot {
            peer: None,
            connection_state: linkchat_core::ConnectionState::Connected,
            messages: vec![
                ChatMessage::Text(TextMessage {
                    sender: PeerAddress::new("AA:BB"),
                    body: "mine".to_string(),
                    sent_at_ms: 1,
                }),
                ChatMessage::Audio(AudioMessage {
                    sender: PeerAddress::new("CC:DD"),
                    payload: vec![0; 64],
                    duration_hint_ms: Some(900),
                    sent_at_ms: 2,
                }),
            ],
        };

        let dto = snapshot_dto(&snapshot, &local);
        assert_eq!(dto.messages[0].kind, "text");
        assert!(dto.messages[0].is_local);
        assert_eq!(dto.messages[0].body.as_deref(), Some("mine"));
        assert_eq!(dto.messages[1].kind, "audio");
        assert!(!dto.messages[1].is_local);
        assert_eq!(dto.messages[1].payload_len, Some(64));
        assert_eq!(dto.messages[1].duration_hint_ms, Some(900));
    }

    #[test]
    fn test_command_result_ok_and_err_shapes() {
        let ok: CommandResult<i32> = CommandResult::ok(42);
        assert!(ok.success);
        assert_eq!(ok.data.unwrap(), 42);
        assert!(ok.error.is_none());

        let err: CommandResult<i32> = CommandResult::err("boom");
        assert!(!err.success);
        assert!(err.data.is_none());
        assert_eq!(err.error.unwrap(), "boom");
    }
}
