//! ChatSession: the single entry point a presentation layer drives.
//!
//! Wires one [`ConnectionManager`] to one [`MessageRouter`] and the audio
//! adapter, and exposes the session operations: listen/connect/disconnect,
//! text sends, the press-and-hold voice clip flow (begin capture, finish and
//! send), playback controls for received clips, and the snapshot channel.
//!
//! One instance exists per session scope and is passed around explicitly;
//! there is no global current session.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use linkchat_core::{PeerIdentity, SessionSnapshot};

use crate::application::message_router::MessageRouter;
use crate::infrastructure::audio::{AudioAdapter, AudioClip, CaptureHandle, PlaybackHandle};
use crate::infrastructure::transport::connection_manager::{
    ConnectionManager, LinkConfig, SessionError,
};
use crate::infrastructure::transport::Transport;

/// A point-to-point chat session engine.
pub struct ChatSession {
    local: PeerIdentity,
    manager: ConnectionManager,
    router: Arc<MessageRouter>,
    audio: Arc<dyn AudioAdapter>,
    snapshots: watch::Receiver<SessionSnapshot>,
    pump: JoinHandle<()>,
}

impl ChatSession {
    /// Builds a session engine over the given transport and audio adapter.
    ///
    /// Must be called within a Tokio runtime; the router pump is spawned
    /// here and lives until the session is dropped.
    pub fn new(
        local: PeerIdentity,
        transport: Arc<dyn Transport>,
        audio: Arc<dyn AudioAdapter>,
        config: LinkConfig,
    ) -> Self {
        let (manager, events) = ConnectionManager::new(local.clone(), transport, config);
        let (router, snapshots) = MessageRouter::new(
            local.address.clone(),
            manager.clone(),
            Arc::clone(&audio),
        );
        let pump = tokio::spawn(Arc::clone(&router).run(events, manager.watch_state()));

        Self {
            local,
            manager,
            router,
            audio,
            snapshots,
            pump,
        }
    }

    /// The identity this session listens and sends as.
    pub fn local(&self) -> &PeerIdentity {
        &self.local
    }

    /// Waits for one inbound peer.  Clears the previous session's log once
    /// the attempt is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] unless the session
    /// is at rest (`Idle` or acknowledging a `Failed`).
    pub async fn start_listening(&self) -> Result<(), SessionError> {
        self.manager.start_listening().await?;
        self.router.reset();
        Ok(())
    }

    /// Dials the given peer.  Clears the previous session's log once the
    /// attempt is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] unless the session
    /// is at rest.
    pub async fn connect_to(&self, peer: PeerIdentity) -> Result<(), SessionError> {
        self.manager.connect_to(peer).await?;
        self.router.reset();
        Ok(())
    }

    /// Disconnects the session or cancels the in-flight attempt.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] when nothing is in
    /// flight.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.manager.disconnect().await
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] with no established session.
    pub async fn send_text(&self, body: impl Into<String>) -> Result<(), SessionError> {
        self.router.submit_text(body.into()).await
    }

    /// Starts recording a voice clip.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Audio`] when the capture device fails.
    pub async fn begin_voice_clip(&self) -> Result<CaptureHandle, SessionError> {
        Ok(self.audio.begin_capture().await?)
    }

    /// Stops recording and sends the finished clip to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Audio`] when the capture device fails, or
    /// [`SessionError::NotConnected`] when the session ended while recording.
    pub async fn finish_voice_clip(&self, handle: CaptureHandle) -> Result<(), SessionError> {
        let clip: AudioClip = self.audio.end_capture(handle).await?;
        self.router.submit_audio(clip).await
    }

    /// Starts playback of a received clip's payload.
    pub async fn play_clip(&self, payload: &[u8]) -> Result<PlaybackHandle, SessionError> {
        Ok(self.audio.begin_playback(payload).await?)
    }

    /// Stops an in-progress playback.
    pub async fn stop_clip(&self, handle: PlaybackHandle) -> Result<(), SessionError> {
        Ok(self.audio.stop_playback(handle).await?)
    }

    /// Seeks an in-progress playback.
    pub async fn seek_clip(
        &self,
        handle: PlaybackHandle,
        position_ms: u32,
    ) -> Result<(), SessionError> {
        Ok(self.audio.seek(handle, position_ms).await?)
    }

    /// Subscribes to session snapshots; a new value arrives on every state
    /// or log change.
    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// The latest snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
