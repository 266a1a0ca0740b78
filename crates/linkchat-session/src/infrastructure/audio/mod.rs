//! Audio adapter boundary.
//!
//! The session engine never touches audio hardware.  It consumes an
//! [`AudioAdapter`]: capture produces an opaque [`AudioClip`], playback
//! consumes opaque bytes, and inbound clips are registered so a presentation
//! layer can request playback against them later.  Payload bytes are never
//! inspected by the core.
//!
//! Adapter calls are issued from caller tasks or dedicated forwarding tasks,
//! never from the connection's read loop, so a slow device cannot stall
//! transport I/O.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod mock;

/// Handle to an in-progress capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureHandle(Uuid);

impl CaptureHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CaptureHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to an in-progress playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(Uuid);

impl PlaybackHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlaybackHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlaybackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A finished capture: opaque payload plus what the device knows about it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioClip {
    /// Encoded clip bytes; format is a contract between the two devices'
    /// adapters, not this engine.
    pub payload: Vec<u8>,
    /// Clip duration as reported by the capture device.
    pub duration_hint_ms: Option<u32>,
}

/// Error type for audio adapter operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no capture in progress for handle {0}")]
    UnknownCaptureHandle(CaptureHandle),
    #[error("no playback in progress for handle {0}")]
    UnknownPlaybackHandle(PlaybackHandle),
    #[error("capture device unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("playback device unavailable: {0}")]
    PlaybackUnavailable(String),
}

/// Boundary trait for the platform's recorder and player.
#[async_trait]
pub trait AudioAdapter: Send + Sync {
    /// Starts recording and returns a handle for the in-progress capture.
    async fn begin_capture(&self) -> Result<CaptureHandle, AudioError>;

    /// Stops recording and returns the finished clip.
    async fn end_capture(&self, handle: CaptureHandle) -> Result<AudioClip, AudioError>;

    /// Starts playing the given clip bytes.
    async fn begin_playback(&self, payload: &[u8]) -> Result<PlaybackHandle, AudioError>;

    /// Stops an in-progress playback.
    async fn stop_playback(&self, handle: PlaybackHandle) -> Result<(), AudioError>;

    /// Moves an in-progress playback to `position_ms`.
    async fn seek(&self, handle: PlaybackHandle, position_ms: u32) -> Result<(), AudioError>;

    /// Registers a clip that arrived from the peer so playback can later be
    /// requested against it.
    async fn clip_received(&self, payload: &[u8]);
}
