//! ConnectionManager: owns the single active connection's lifecycle.
//!
//! One manager exists per session scope.  It runs both connection roles:
//! `start_listening` opens an acceptor and waits for one inbound peer,
//! `connect_to` dials out.  Once a stream is established the manager starts
//! exactly one read loop, keeps the write half behind a mutex so concurrent
//! senders interleave at frame granularity only, and publishes every state
//! change on a `watch` channel plus lifecycle/frame events on an `mpsc`
//! channel.
//!
//! The manager is a cheap handle over shared state; background tasks hold
//! clones of it.  Teardown is guarded by a generation counter: every
//! accepted transition into or out of an attempt bumps the generation, and a
//! task holding a stale generation becomes a no-op.  That makes `disconnect`
//! racing a read error (or a second `disconnect`) harmless, and guarantees
//! the close event for a session is emitted exactly once.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use linkchat_core::protocol::codec::{decode_header, decode_payload, CodecError};
use linkchat_core::protocol::messages::{WireMessage, DEFAULT_MAX_PAYLOAD_LEN, HEADER_SIZE};
use linkchat_core::{ConnectionState, FailureReason, PeerIdentity};

use crate::infrastructure::audio::AudioError;
use crate::infrastructure::transport::{
    Acceptor, Link, LinkReader, LinkWriter, Transport, TransportError,
};

/// Error type for session operations exposed to callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The operation is not legal in the current lifecycle state.  The state
    /// is left untouched; the caller must not assume a new session started.
    #[error("cannot {operation} while {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: &'static str,
    },

    /// A send was attempted with no established connection.
    #[error("not connected to a peer")]
    NotConnected,

    /// The transport provider reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The audio adapter reported a failure.
    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Why an established session (or a failed attempt) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The local caller asked for the disconnect.
    LocalRequest,
    /// The transport failed or the peer went away; graceful peer closes are
    /// not distinguished from abrupt I/O errors.
    Transport(String),
    /// The byte stream violated the frame protocol.
    Protocol(String),
}

/// Events emitted by the connection manager, consumed by the message router.
#[derive(Debug)]
pub enum LinkEvent {
    /// A duplex stream was established with the given peer.
    PeerConnected { peer: PeerIdentity },
    /// One frame was decoded off the stream, in wire order.
    FrameReceived(WireMessage),
    /// The session or attempt ended.  Emitted at most once per attempt.
    LinkClosed { reason: CloseReason },
}

/// Tunables for one connection manager.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Upper bound accepted for an inbound frame's payload length field.
    pub max_payload_len: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
        }
    }
}

/// Lifecycle state plus the resources tied to the current attempt/session.
struct Inner {
    state: ConnectionState,
    peer: Option<PeerIdentity>,
    /// Bumped on every accepted transition into or out of an attempt.
    generation: u64,
    attempt_task: Option<JoinHandle<()>>,
    read_task: Option<JoinHandle<()>>,
}

struct Shared {
    local: PeerIdentity,
    transport: Arc<dyn Transport>,
    config: LinkConfig,
    inner: Mutex<Inner>,
    /// Write half of the live stream.  Kept outside `inner` so a slow write
    /// never blocks state transitions; writes serialize on this lock, which
    /// keeps them frame-atomic.
    writer: Mutex<Option<Box<dyn LinkWriter>>>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: mpsc::Sender<LinkEvent>,
}

/// The connection manager handle.  Clones share one underlying session.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a manager and returns it together with the event receiver.
    pub fn new(
        local: PeerIdentity,
        transport: Arc<dyn Transport>,
        config: LinkConfig,
    ) -> (Self, mpsc::Receiver<LinkEvent>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let mgr = Self {
            shared: Arc::new(Shared {
                local,
                transport,
                config,
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    peer: None,
                    generation: 0,
                    attempt_task: None,
                    read_task: None,
                }),
                writer: Mutex::new(None),
                state_tx,
                event_tx,
            }),
        };
        (mgr, event_rx)
    }

    /// The local identity this manager listens as.
    pub fn local(&self) -> &PeerIdentity {
        &self.shared.local
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribes to lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// The currently connected (or targeted) peer, if any.
    pub async fn peer(&self) -> Option<PeerIdentity> {
        self.shared.inner.lock().await.peer.clone()
    }

    /// Opens an acceptor and waits for one inbound peer.
    ///
    /// Legal from `Idle`, or from `Failed` as the acknowledgement that clears
    /// the failure.  The acceptor is bound before this returns, so a peer
    /// told "I am listening" can dial immediately; only the accept itself
    /// runs in the background.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] from any other
    /// state, or [`SessionError::Transport`] when the acceptor cannot be
    /// bound (also observable as a `Failed` state).
    pub async fn start_listening(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        self.ensure_at_rest(&inner, "start listening")?;

        let acceptor = match self.shared.transport.listen(&self.shared.local).await {
            Ok(acceptor) => acceptor,
            Err(e) => {
                let detail = e.to_string();
                warn!("failed to open acceptor: {detail}");
                self.set_state(
                    &mut inner,
                    ConnectionState::Failed(FailureReason::Transport(detail.clone())),
                );
                let _ = self
                    .shared
                    .event_tx
                    .send(LinkEvent::LinkClosed {
                        reason: CloseReason::Transport(detail),
                    })
                    .await;
                return Err(SessionError::Transport(e));
            }
        };

        inner.generation += 1;
        let generation = inner.generation;
        inner.peer = None;
        self.set_state(&mut inner, ConnectionState::Listening);
        info!("listening as {}", self.shared.local.address);

        let this = self.clone();
        inner.attempt_task = Some(tokio::spawn(async move {
            this.run_listen_attempt(generation, acceptor).await;
        }));
        Ok(())
    }

    /// Dials the given peer.
    ///
    /// Legal from `Idle` or `Failed`, like [`start_listening`](Self::start_listening).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] from any other state.
    pub async fn connect_to(&self, peer: PeerIdentity) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        self.ensure_at_rest(&inner, "connect")?;

        inner.generation += 1;
        let generation = inner.generation;
        inner.peer = Some(peer.clone());
        self.set_state(&mut inner, ConnectionState::Connecting);
        info!("connecting to {}", peer.address);

        let this = self.clone();
        inner.attempt_task = Some(tokio::spawn(async move {
            this.run_connect_attempt(generation, peer).await;
        }));
        Ok(())
    }

    /// Tears down the current session or cancels the current attempt.
    ///
    /// From `Listening`/`Connecting` the attempt is cancelled and the state
    /// returns to `Idle` without ever reaching `Connected`.  From `Connected`
    /// the stream is closed, which also unblocks the read loop.  A race with
    /// a concurrent transport-triggered close is resolved by the generation
    /// guard; whichever side wins performs the single teardown.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidStateTransition`] when nothing is in
    /// flight (`Idle`, `Failed`).
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let mut inner = self.shared.inner.lock().await;
        match inner.state.clone() {
            ConnectionState::Listening | ConnectionState::Connecting => {
                inner.generation += 1;
                if let Some(task) = inner.attempt_task.take() {
                    task.abort();
                }
                inner.peer = None;
                self.set_state(&mut inner, ConnectionState::Idle);
                info!("connection attempt cancelled");
                Ok(())
            }
            ConnectionState::Connected => {
                let generation = inner.generation;
                drop(inner);
                self.teardown(generation, CloseReason::LocalRequest, true)
                    .await;
                Ok(())
            }
            state => Err(SessionError::InvalidStateTransition {
                operation: "disconnect",
                state: state.label(),
            }),
        }
    }

    /// Writes one encoded frame through the serialized write path.
    ///
    /// Concurrent callers are ordered by the writer lock, so two frames can
    /// never interleave their bytes on the wire.  A write failure tears the
    /// session down the same way a read failure does.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotConnected`] when no stream is established,
    /// or [`SessionError::Transport`] when the write fails.
    pub async fn send_bytes(&self, frame: &[u8]) -> Result<(), SessionError> {
        let mut writer = self.shared.writer.lock().await;
        let Some(w) = writer.as_mut() else {
            return Err(SessionError::NotConnected);
        };
        match w.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let detail = e.to_string();
                // The stream is dead; drop the handle before teardown.
                *writer = None;
                drop(writer);
                let generation = self.shared.inner.lock().await.generation;
                self.teardown(generation, CloseReason::Transport(detail), true)
                    .await;
                Err(SessionError::Transport(e))
            }
        }
    }

    // ── Attempt tasks ─────────────────────────────────────────────────────────

    async fn run_listen_attempt(self, generation: u64, mut acceptor: Box<dyn Acceptor>) {
        // Exactly one accept; dropping the acceptor afterwards closes it.
        match acceptor.accept().await {
            Ok((link, peer)) => self.install_link(generation, link, peer).await,
            Err(e) => self.fail_attempt(generation, e).await,
        }
    }

    async fn run_connect_attempt(self, generation: u64, peer: PeerIdentity) {
        match self.shared.transport.connect(&peer).await {
            Ok(link) => self.install_link(generation, link, peer).await,
            Err(e) => self.fail_attempt(generation, e).await,
        }
    }

    /// Promotes a fresh stream to the active session and starts the read loop.
    async fn install_link(&self, generation: u64, link: Link, peer: PeerIdentity) {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            // The attempt was cancelled while the stream was being set up;
            // dropping the link closes it.
            debug!("discarding stream from cancelled attempt");
            return;
        }

        *self.shared.writer.lock().await = Some(link.writer);
        inner.peer = Some(peer.clone());
        inner.attempt_task = None;
        self.set_state(&mut inner, ConnectionState::Connected);
        info!("connected to {}", peer.display_name());

        // Publish the connect event before the read loop can produce frames,
        // so consumers always see PeerConnected first.
        let _ = self
            .shared
            .event_tx
            .send(LinkEvent::PeerConnected { peer })
            .await;

        let this = self.clone();
        inner.read_task = Some(tokio::spawn(async move {
            this.run_read_loop(generation, link.reader).await;
        }));
    }

    /// Records a failed attempt: `Connecting`/`Listening` to `Failed(reason)`.
    async fn fail_attempt(&self, generation: u64, error: TransportError) {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        inner.generation += 1;
        inner.attempt_task = None;
        inner.peer = None;
        let detail = error.to_string();
        warn!("connection attempt failed: {detail}");
        self.set_state(
            &mut inner,
            ConnectionState::Failed(FailureReason::Transport(detail.clone())),
        );
        let _ = self
            .shared
            .event_tx
            .send(LinkEvent::LinkClosed {
                reason: CloseReason::Transport(detail),
            })
            .await;
    }

    // ── Read loop ─────────────────────────────────────────────────────────────

    /// The single continuous read loop for an established session.
    ///
    /// Reads exactly one header, then exactly `payload_len` bytes, per frame.
    /// Any transport or protocol error ends the loop through the one shared
    /// teardown path.
    async fn run_read_loop(self, generation: u64, mut reader: Box<dyn LinkReader>) {
        loop {
            let mut header_buf = [0u8; HEADER_SIZE];
            if let Err(e) = reader.read_exact(&mut header_buf).await {
                self.teardown(generation, CloseReason::Transport(e.to_string()), false)
                    .await;
                return;
            }

            let header = match decode_header(&header_buf, self.shared.config.max_payload_len) {
                Ok(h) => h,
                Err(e) => {
                    self.teardown(generation, CloseReason::Protocol(e.to_string()), false)
                        .await;
                    return;
                }
            };

            let mut payload = vec![0u8; header.payload_len as usize];
            if !payload.is_empty() {
                if let Err(e) = reader.read_exact(&mut payload).await {
                    self.teardown(generation, CloseReason::Transport(e.to_string()), false)
                        .await;
                    return;
                }
            }

            match decode_payload(header.frame_type, &payload) {
                Ok(msg) => {
                    debug!("received {:?} frame", header.frame_type);
                    if self
                        .shared
                        .event_tx
                        .send(LinkEvent::FrameReceived(msg))
                        .await
                        .is_err()
                    {
                        // Receiver dropped; the session scope is gone.
                        return;
                    }
                }
                Err(e) => {
                    self.teardown(generation, CloseReason::Protocol(e.to_string()), false)
                        .await;
                    return;
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// The single exit path for an established session.
    ///
    /// Idempotent per generation: the loser of a close race observes a bumped
    /// generation and returns without touching anything.  Transport reasons
    /// (including local requests) land back in `Idle`; protocol corruption
    /// lands in `Failed` because the stream's framing can no longer be
    /// trusted.
    ///
    /// `abort_read` must be `false` when the caller IS the read loop; the
    /// loop returns right after this call, and aborting it here would cancel
    /// the teardown itself at the next await point.
    async fn teardown(&self, generation: u64, reason: CloseReason, abort_read: bool) {
        let mut inner = self.shared.inner.lock().await;
        if inner.generation != generation {
            return;
        }
        inner.generation += 1;
        self.set_state(&mut inner, ConnectionState::Disconnecting);

        if let Some(task) = inner.read_task.take() {
            if abort_read {
                // Unblocks a read parked on a dead stream.
                task.abort();
            }
        }
        if let Some(task) = inner.attempt_task.take() {
            task.abort();
        }

        if let Some(mut w) = self.shared.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }

        let next = match &reason {
            CloseReason::Protocol(detail) => {
                warn!("session failed: {detail}");
                ConnectionState::Failed(FailureReason::Protocol(detail.clone()))
            }
            CloseReason::Transport(detail) => {
                info!("session closed: {detail}");
                ConnectionState::Idle
            }
            CloseReason::LocalRequest => {
                info!("session closed by local request");
                ConnectionState::Idle
            }
        };
        self.set_state(&mut inner, next);
        drop(inner);

        let _ = self
            .shared
            .event_tx
            .send(LinkEvent::LinkClosed { reason })
            .await;
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn ensure_at_rest(&self, inner: &Inner, operation: &'static str) -> Result<(), SessionError> {
        match inner.state {
            ConnectionState::Idle | ConnectionState::Failed(_) => Ok(()),
            ref state => Err(SessionError::InvalidStateTransition {
                operation,
                state: state.label(),
            }),
        }
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        inner.state = state.clone();
        self.shared.state_tx.send_replace(state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::memory::MemoryHub;
    use linkchat_core::encode_message;
    use std::time::Duration;
    use tokio::time::timeout;

    fn identity(name: &str, addr: &str) -> PeerIdentity {
        PeerIdentity::new(Some(name.to_string()), addr)
    }

    fn make_manager(
        hub: &MemoryHub,
        name: &str,
        addr: &str,
    ) -> (ConnectionManager, mpsc::Receiver<LinkEvent>) {
        let id = identity(name, addr);
        let transport = hub.endpoint(id.clone());
        ConnectionManager::new(id, Arc::new(transport), LinkConfig::default())
    }

    async fn wait_for_state(
        mgr: &ConnectionManager,
        pred: impl Fn(&ConnectionState) -> bool,
    ) -> ConnectionState {
        let mut rx = mgr.watch_state();
        let state = timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed")
            .clone();
        state
    }

    #[tokio::test]
    async fn test_new_manager_starts_idle() {
        let hub = MemoryHub::new();
        let (mgr, _events) = make_manager(&hub, "Phone-A", "AA:BB");
        assert_eq!(mgr.state(), ConnectionState::Idle);
        assert_eq!(mgr.peer().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_from_idle_is_invalid_transition() {
        let hub = MemoryHub::new();
        let (mgr, _events) = make_manager(&hub, "Phone-A", "AA:BB");
        let result = mgr.disconnect().await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidStateTransition {
                operation: "disconnect",
                ..
            })
        ));
        assert_eq!(mgr.state(), ConnectionState::Idle, "state must be untouched");
    }

    #[tokio::test]
    async fn test_send_bytes_from_idle_is_not_connected() {
        let hub = MemoryHub::new();
        let (mgr, _events) = make_manager(&hub, "Phone-A", "AA:BB");
        let result = mgr.send_bytes(&[0x01, 0, 0, 0, 0]).await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_and_listen_establish_a_session() {
        let hub = MemoryHub::new();
        let (listener, mut listener_events) = make_manager(&hub, "Phone-B", "CC:DD");
        let (dialer, mut dialer_events) = make_manager(&hub, "Phone-A", "AA:BB");

        listener.start_listening().await.expect("listen");
        wait_for_state(&listener, |s| *s == ConnectionState::Listening).await;

        dialer
            .connect_to(identity("Phone-B", "CC:DD"))
            .await
            .expect("connect");

        wait_for_state(&dialer, |s| *s == ConnectionState::Connected).await;
        wait_for_state(&listener, |s| *s == ConnectionState::Connected).await;

        // Both sides report the right peer.
        assert_eq!(dialer.peer().await.unwrap().address.as_str(), "CC:DD");
        assert_eq!(listener.peer().await.unwrap().address.as_str(), "AA:BB");

        // Both sides emitted PeerConnected first.
        let ev = listener_events.recv().await.unwrap();
        assert!(matches!(ev, LinkEvent::PeerConnected { .. }));
        let ev = dialer_events.recv().await.unwrap();
        assert!(matches!(ev, LinkEvent::PeerConnected { .. }));
    }

    #[tokio::test]
    async fn test_start_listening_while_listening_is_invalid() {
        let hub = MemoryHub::new();
        let (mgr, _events) = make_manager(&hub, "Phone-A", "AA:BB");
        mgr.start_listening().await.expect("first listen");
        let result = mgr.start_listening().await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidStateTransition { .. })
        ));
        assert_eq!(mgr.state(), ConnectionState::Listening);
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_invalid() {
        let hub = MemoryHub::new();
        let (listener, _le) = make_manager(&hub, "Phone-B", "CC:DD");
        let (dialer, _de) = make_manager(&hub, "Phone-A", "AA:BB");
        listener.start_listening().await.unwrap();
        dialer
            .connect_to(identity("Phone-B", "CC:DD"))
            .await
            .unwrap();
        wait_for_state(&dialer, |s| *s == ConnectionState::Connected).await;

        let result = dialer.connect_to(identity("other", "EE:FF")).await;
        assert!(matches!(
            result,
            Err(SessionError::InvalidStateTransition { .. })
        ));
        assert_eq!(dialer.state(), ConnectionState::Connected);
        // The established peer is unchanged.
        assert_eq!(dialer.peer().await.unwrap().address.as_str(), "CC:DD");
    }

    #[tokio::test]
    async fn test_failed_connect_lands_in_failed_until_acknowledged() {
        let hub = MemoryHub::new();
        let (mgr, mut events) = make_manager(&hub, "Phone-A", "AA:BB");

        // Nothing listens on this address.
        mgr.connect_to(identity("ghost", "00:00")).await.unwrap();
        let state = wait_for_state(&mgr, |s| matches!(s, ConnectionState::Failed(_))).await;
        assert!(matches!(
            state,
            ConnectionState::Failed(FailureReason::Transport(_))
        ));

        // The failure was surfaced exactly once.
        let ev = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            ev,
            LinkEvent::LinkClosed {
                reason: CloseReason::Transport(_)
            }
        ));

        // A new attempt acknowledges the failure.
        mgr.start_listening().await.expect("listen must clear Failed");
        assert_eq!(mgr.state(), ConnectionState::Listening);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_blocked_connect_without_reaching_connected() {
        let hub = MemoryHub::new();
        // Register an acceptor that is never driven, so connect blocks.
        let stalled = identity("stalled", "EE:FF");
        let stalled_transport = hub.endpoint(stalled.clone());
        let _acceptor = stalled_transport.listen(&stalled).await.expect("bind");

        let (mgr, _events) = make_manager(&hub, "Phone-A", "AA:BB");
        let mut seen = mgr.watch_state();
        let observer = tokio::spawn(async move {
            let mut states = Vec::new();
            while seen.changed().await.is_ok() {
                let s = seen.borrow().clone();
                let done = s == ConnectionState::Idle;
                states.push(s);
                if done {
                    break;
                }
            }
            states
        });

        mgr.connect_to(stalled).await.unwrap();
        wait_for_state(&mgr, |s| *s == ConnectionState::Connecting).await;
        mgr.disconnect().await.expect("cancel");
        assert_eq!(mgr.state(), ConnectionState::Idle);
        assert_eq!(mgr.peer().await, None);

        let states = observer.await.unwrap();
        assert!(
            !states.contains(&ConnectionState::Connected),
            "Connected must never be observed, got {states:?}"
        );
    }

    #[tokio::test]
    async fn test_peer_drop_mid_session_idles_with_single_close_event() {
        let hub = MemoryHub::new();
        let (listener, _le) = make_manager(&hub, "Phone-B", "CC:DD");
        let (dialer, mut events) = make_manager(&hub, "Phone-A", "AA:BB");
        listener.start_listening().await.unwrap();
        dialer
            .connect_to(identity("Phone-B", "CC:DD"))
            .await
            .unwrap();
        wait_for_state(&dialer, |s| *s == ConnectionState::Connected).await;
        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::PeerConnected { .. }
        ));

        // The peer tears its side down, which closes the stream under us.
        listener.disconnect().await.unwrap();

        wait_for_state(&dialer, |s| *s == ConnectionState::Idle).await;
        let ev = timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            ev,
            LinkEvent::LinkClosed {
                reason: CloseReason::Transport(_)
            }
        ));

        // Exactly one close event: the channel stays silent afterwards.
        let silent = timeout(Duration::from_millis(200), events.recv()).await;
        assert!(silent.is_err(), "no second close event may be emitted");
    }

    #[tokio::test]
    async fn test_frames_are_decoded_in_wire_order() {
        let hub = MemoryHub::new();
        let (listener, mut events) = make_manager(&hub, "Phone-B", "CC:DD");
        listener.start_listening().await.unwrap();

        // Drive the dialing side manually with a raw endpoint.
        let raw = hub.endpoint(identity("Phone-A", "AA:BB"));
        let mut link = raw.connect(&identity("Phone-B", "CC:DD")).await.unwrap();

        let first = encode_message(&WireMessage::Text { body: "one".into() }).unwrap();
        let second = encode_message(&WireMessage::Audio {
            payload: vec![0, 1, 2, 3],
        })
        .unwrap();
        link.writer.write_all(&first).await.unwrap();
        link.writer.write_all(&second).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::PeerConnected { .. }
        ));
        let ev1 = events.recv().await.unwrap();
        let ev2 = events.recv().await.unwrap();
        assert!(matches!(
            ev1,
            LinkEvent::FrameReceived(WireMessage::Text { ref body }) if body == "one"
        ));
        assert!(matches!(
            ev2,
            LinkEvent::FrameReceived(WireMessage::Audio { ref payload }) if payload == &[0, 1, 2, 3]
        ));
    }

    #[tokio::test]
    async fn test_unknown_frame_tag_fails_the_session() {
        let hub = MemoryHub::new();
        let (listener, mut events) = make_manager(&hub, "Phone-B", "CC:DD");
        listener.start_listening().await.unwrap();

        let raw = hub.endpoint(identity("Phone-A", "AA:BB"));
        let mut link = raw.connect(&identity("Phone-B", "CC:DD")).await.unwrap();

        // A tag the protocol does not define, with a zero-length payload.
        link.writer
            .write_all(&[0x7F, 0x00, 0x00, 0x00, 0x00])
            .await
            .unwrap();

        let state = wait_for_state(&listener, |s| matches!(s, ConnectionState::Failed(_))).await;
        assert!(matches!(
            state,
            ConnectionState::Failed(FailureReason::Protocol(_))
        ));

        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::PeerConnected { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::LinkClosed {
                reason: CloseReason::Protocol(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_fails_the_session() {
        let hub = MemoryHub::new();
        let (listener, _events) = make_manager(&hub, "Phone-B", "CC:DD");
        listener.start_listening().await.unwrap();

        let raw = hub.endpoint(identity("Phone-A", "AA:BB"));
        let mut link = raw.connect(&identity("Phone-B", "CC:DD")).await.unwrap();

        let mut frame = vec![0x02];
        frame.extend_from_slice(&(DEFAULT_MAX_PAYLOAD_LEN + 1).to_be_bytes());
        link.writer.write_all(&frame).await.unwrap();

        let state = wait_for_state(&listener, |s| matches!(s, ConnectionState::Failed(_))).await;
        assert!(matches!(
            state,
            ConnectionState::Failed(FailureReason::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_unblocks_the_peer_read_loop() {
        let hub = MemoryHub::new();
        let (listener, _le) = make_manager(&hub, "Phone-B", "CC:DD");
        let (dialer, _de) = make_manager(&hub, "Phone-A", "AA:BB");
        listener.start_listening().await.unwrap();
        dialer
            .connect_to(identity("Phone-B", "CC:DD"))
            .await
            .unwrap();
        wait_for_state(&dialer, |s| *s == ConnectionState::Connected).await;
        wait_for_state(&listener, |s| *s == ConnectionState::Connected).await;

        dialer.disconnect().await.unwrap();
        assert_eq!(dialer.state(), ConnectionState::Idle);

        // The listener's blocked read observes the closure and idles too.
        wait_for_state(&listener, |s| *s == ConnectionState::Idle).await;
    }
}
