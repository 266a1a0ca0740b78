//! Mock audio adapter for tests and for the headless binary.
//!
//! Serves a configurable clip from `end_capture`, records every inbound clip
//! registration, and tracks playback handles so tests can assert the whole
//! voice-message flow without a real recorder.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{AudioAdapter, AudioClip, AudioError, CaptureHandle, PlaybackHandle};

#[derive(Default)]
struct State {
    next_clip: AudioClip,
    captures: HashSet<CaptureHandle>,
    playbacks: HashMap<PlaybackHandle, PlaybackState>,
    received: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PlaybackState {
    position_ms: u32,
}

/// A mock implementation of [`AudioAdapter`].
#[derive(Default)]
pub struct MockAudioAdapter {
    state: Mutex<State>,
}

impl MockAudioAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clip that the next `end_capture` will return.
    pub fn set_next_clip(&self, clip: AudioClip) {
        self.state.lock().expect("lock poisoned").next_clip = clip;
    }

    /// Payloads registered through `clip_received`, in arrival order.
    pub fn received_clips(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("lock poisoned").received.clone()
    }

    /// Current seek position of a playback, if it is still running.
    pub fn playback_position(&self, handle: PlaybackHandle) -> Option<u32> {
        self.state
            .lock()
            .expect("lock poisoned")
            .playbacks
            .get(&handle)
            .map(|p| p.position_ms)
    }

    /// Number of captures started and not yet ended.
    pub fn open_captures(&self) -> usize {
        self.state.lock().expect("lock poisoned").captures.len()
    }
}

#[async_trait]
impl AudioAdapter for MockAudioAdapter {
    async fn begin_capture(&self) -> Result<CaptureHandle, AudioError> {
        let handle = CaptureHandle::new();
        self.state
            .lock()
            .expect("lock poisoned")
            .captures
            .insert(handle);
        Ok(handle)
    }

    async fn end_capture(&self, handle: CaptureHandle) -> Result<AudioClip, AudioError> {
        let mut state = self.state.lock().expect("lock poisoned");
        if !state.captures.remove(&handle) {
            return Err(AudioError::UnknownCaptureHandle(handle));
        }
        Ok(state.next_clip.clone())
    }

    async fn begin_playback(&self, _payload: &[u8]) -> Result<PlaybackHandle, AudioError> {
        let handle = PlaybackHandle::new();
        self.state
            .lock()
            .expect("lock poisoned")
            .playbacks
            .insert(handle, PlaybackState { position_ms: 0 });
        Ok(handle)
    }

    async fn stop_playback(&self, handle: PlaybackHandle) -> Result<(), AudioError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state
            .playbacks
            .remove(&handle)
            .map(|_| ())
            .ok_or(AudioError::UnknownPlaybackHandle(handle))
    }

    async fn seek(&self, handle: PlaybackHandle, position_ms: u32) -> Result<(), AudioError> {
        let mut state = self.state.lock().expect("lock poisoned");
        match state.playbacks.get_mut(&handle) {
            Some(playback) => {
                playback.position_ms = position_ms;
                Ok(())
            }
            None => Err(AudioError::UnknownPlaybackHandle(handle)),
        }
    }

    async fn clip_received(&self, payload: &[u8]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .received
            .push(payload.to_vec());
    }
}
