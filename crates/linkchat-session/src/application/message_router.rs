//! MessageRouter: turns wire frames into an attributed, ordered message log.
//!
//! The router is the only writer of the session log.  Outbound submissions
//! pass through a send gate so the order frames hit the wire is the order
//! they land in the log; inbound frames are appended in wire order by the
//! single pump task.  Every state or log change republishes an immutable
//! [`SessionSnapshot`] on a `watch` channel, which is the only surface a
//! presentation layer observes.
//!
//! Inbound audio payloads are additionally handed to the audio adapter's
//! receive-side registration, on a spawned task so a slow device never
//! stalls frame delivery.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use linkchat_core::{
    encode_message, project, AudioMessage, ChatMessage, ConnectionState, PeerAddress,
    PeerIdentity, SessionSnapshot, TextMessage, WireMessage,
};

use crate::infrastructure::audio::{AudioAdapter, AudioClip};
use crate::infrastructure::transport::connection_manager::{
    CloseReason, ConnectionManager, LinkEvent, SessionError,
};

/// Returns the current time as milliseconds since the Unix epoch.
fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Routes messages between the caller, the wire, and the session log.
pub struct MessageRouter {
    local: PeerAddress,
    manager: ConnectionManager,
    audio: Arc<dyn AudioAdapter>,
    /// The session log.  Appended by submissions and by the pump; read only
    /// to produce snapshots.
    log: Mutex<Vec<ChatMessage>>,
    /// Peer the pump last saw a `PeerConnected` for; attribution source for
    /// inbound frames.
    peer: Mutex<Option<PeerIdentity>>,
    /// Orders concurrent submissions so wire order equals log order.
    send_gate: tokio::sync::Mutex<()>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl MessageRouter {
    /// Creates a router and returns it with the snapshot receiver.
    pub fn new(
        local: PeerAddress,
        manager: ConnectionManager,
        audio: Arc<dyn AudioAdapter>,
    ) -> (Arc<Self>, watch::Receiver<SessionSnapshot>) {
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let router = Arc::new(Self {
            local,
            manager,
            audio,
            log: Mutex::new(Vec::new()),
            peer: Mutex::new(None),
            send_gate: tokio::sync::Mutex::new(()),
            snapshot_tx,
        });
        (router, snapshot_rx)
    }

    /// Sends a text message and appends the local echo to the log.
    ///
    /// The echo is optimistic: the underlying stream delivers in order or
    /// fails the whole connection, so a successful write is as good as
    /// delivered.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when no session is established.
    pub async fn submit_text(&self, body: String) -> Result<(), SessionError> {
        let frame = encode_message(&WireMessage::Text { body: body.clone() })?;
        let _gate = self.send_gate.lock().await;
        self.manager.send_bytes(&frame).await?;
        self.append(ChatMessage::Text(TextMessage {
            sender: self.local.clone(),
            body,
            sent_at_ms: current_timestamp_ms(),
        }));
        Ok(())
    }

    /// Sends a captured voice clip and appends the local echo to the log.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when no session is established.
    pub async fn submit_audio(&self, clip: AudioClip) -> Result<(), SessionError> {
        let frame = encode_message(&WireMessage::Audio {
            payload: clip.payload.clone(),
        })?;
        let _gate = self.send_gate.lock().await;
        self.manager.send_bytes(&frame).await?;
        self.append(ChatMessage::Audio(AudioMessage {
            sender: self.local.clone(),
            payload: clip.payload,
            duration_hint_ms: clip.duration_hint_ms,
            sent_at_ms: current_timestamp_ms(),
        }));
        Ok(())
    }

    /// Clears the log for a new session.  Called when a connection attempt
    /// begins; the previous session's messages stay visible until then.
    pub fn reset(&self) {
        self.log.lock().expect("log lock poisoned").clear();
        *self.peer.lock().expect("peer lock poisoned") = None;
        self.publish();
    }

    /// A copy of the current log, in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.lock().expect("log lock poisoned").clone()
    }

    /// Subscribes to snapshot updates.
    pub fn watch_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The pump: consumes link events and state changes until the event
    /// channel closes.  Spawned once per session scope.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<LinkEvent>,
        mut state_rx: watch::Receiver<ConnectionState>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
            }
        }
        debug!("message router pump stopped");
    }

    fn handle_event(&self, event: LinkEvent) {
        match event {
            LinkEvent::PeerConnected { peer } => {
                *self.peer.lock().expect("peer lock poisoned") = Some(peer);
                self.publish();
            }
            LinkEvent::FrameReceived(msg) => self.handle_inbound(msg),
            LinkEvent::LinkClosed { reason } => {
                if let CloseReason::Transport(detail) | CloseReason::Protocol(detail) = &reason {
                    debug!("session ended: {detail}");
                }
                self.publish();
            }
        }
    }

    /// Attributes one inbound frame to the connected peer and logs it.
    fn handle_inbound(&self, msg: WireMessage) {
        let sender = {
            let peer = self.peer.lock().expect("peer lock poisoned");
            match peer.as_ref() {
                Some(p) => p.address.clone(),
                None => {
                    // A frame with no preceding PeerConnected would be a
                    // manager bug; do not invent an attribution for it.
                    warn!("dropping frame received outside a session");
                    return;
                }
            }
        };
        let sent_at_ms = current_timestamp_ms();

        let entry = match msg {
            WireMessage::Text { body } => ChatMessage::Text(TextMessage {
                sender,
                body,
                sent_at_ms,
            }),
            WireMessage::Audio { payload } => {
                // Register the clip so playback can be requested against it,
                // off the pump so a slow device cannot hold up routing.
                let audio = Arc::clone(&self.audio);
                let clip = payload.clone();
                tokio::spawn(async move {
                    audio.clip_received(&clip).await;
                });
                ChatMessage::Audio(AudioMessage {
                    sender,
                    payload,
                    duration_hint_ms: None,
                    sent_at_ms,
                })
            }
            WireMessage::Image { payload } => ChatMessage::Image(linkchat_core::ImageMessage {
                sender,
                payload,
                sent_at_ms,
            }),
        };
        self.append(entry);
    }

    fn append(&self, entry: ChatMessage) {
        self.log.lock().expect("log lock poisoned").push(entry);
        self.publish();
    }

    /// Recomputes and republishes the snapshot from current state, peer, and
    /// log.
    fn publish(&self) {
        let state = self.manager.state();
        let peer = self.peer.lock().expect("peer lock poisoned").clone();
        let log = self.log.lock().expect("log lock poisoned");
        let snapshot = project(state, peer, &log);
        drop(log);
        self.snapshot_tx.send_replace(snapshot);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
