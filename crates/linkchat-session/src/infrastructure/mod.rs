//! Infrastructure layer for the session engine.
//!
//! Contains the adapters that touch the outside world: transport providers
//! and the connection manager, peer discovery, the audio device boundary,
//! file-system config storage, and the presentation command bridge.

pub mod audio;
pub mod discovery;
pub mod storage;
pub mod transport;
pub mod ui_bridge;
