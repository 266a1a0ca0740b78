//! UDP announce-based discovery provider.
//!
//! The sample provider for LAN use, paired with the TCP transport.  Peers
//! periodically broadcast an announce datagram on the discovery port; this
//! provider listens for them and reports each sender as a candidate peer.
//! The advertised chat port is combined with the datagram's source IP to
//! form the peer address handed to the transport layer.
//!
//! Datagram layout (all integers big-endian):
//!
//! ```text
//! [magic:4 = "LCHT"][version:1][chat_port:2][name_len:2][name:N]
//! ```
//!
//! The receive loop runs as a blocking task on a dedicated thread to avoid
//! tying up the async runtime with synchronous socket I/O.  The socket has a
//! 500 ms read timeout; on each timeout the loop checks a running flag so
//! `stop_scan` takes effect promptly.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use linkchat_core::PeerIdentity;

use super::{DiscoveryError, DiscoveryProvider};

const ANNOUNCE_MAGIC: [u8; 4] = *b"LCHT";
const ANNOUNCE_VERSION: u8 = 0x01;
/// magic + version + chat_port + name_len
const ANNOUNCE_MIN_LEN: usize = 4 + 1 + 2 + 2;

/// Configuration for the UDP announce provider.
#[derive(Debug, Clone)]
pub struct UdpDiscoveryConfig {
    /// UDP port announce datagrams arrive on.
    pub discovery_port: u16,
    /// Address to bind the listening socket to.
    pub bind_address: String,
}

impl Default for UdpDiscoveryConfig {
    fn default() -> Self {
        Self {
            discovery_port: 52101,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

/// Listens for announce broadcasts and reports the senders.
pub struct UdpAnnounceProvider {
    config: UdpDiscoveryConfig,
    /// Running flag of the most recent scan; cleared by `stop_scan`.
    running: Mutex<Option<Arc<AtomicBool>>>,
}

impl UdpAnnounceProvider {
    pub fn new(config: UdpDiscoveryConfig) -> Self {
        Self {
            config,
            running: Mutex::new(None),
        }
    }
}

#[async_trait]
impl DiscoveryProvider for UdpAnnounceProvider {
    async fn start_scan(&self) -> Result<mpsc::Receiver<PeerIdentity>, DiscoveryError> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.discovery_port)
            .parse()
            .map_err(|e| DiscoveryError::Unavailable(format!("bad bind address: {e}")))?;
        let socket = UdpSocket::bind(addr)
            .map_err(|e| DiscoveryError::Unavailable(format!("cannot bind {addr}: {e}")))?;
        socket
            .set_read_timeout(Some(Duration::from_millis(500)))
            .map_err(|e| DiscoveryError::Unavailable(format!("cannot set read timeout: {e}")))?;

        let running = Arc::new(AtomicBool::new(true));
        *self.running.lock().expect("lock poisoned") = Some(Arc::clone(&running));

        let (tx, rx) = mpsc::channel(64);
        std::thread::Builder::new()
            .name("linkchat-discovery".to_string())
            .spawn(move || scan_loop(socket, tx, running))
            .map_err(|e| DiscoveryError::Unavailable(format!("cannot spawn scan thread: {e}")))?;

        info!("discovery scan listening on UDP {addr}");
        Ok(rx)
    }

    async fn stop_scan(&self) {
        if let Some(running) = self.running.lock().expect("lock poisoned").take() {
            running.store(false, Ordering::Relaxed);
        }
    }
}

/// The receive loop executed on the discovery thread.
fn scan_loop(socket: UdpSocket, tx: mpsc::Sender<PeerIdentity>, running: Arc<AtomicBool>) {
    let mut buf = vec![0u8; 2048];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                error!("discovery recv error: {e}");
                continue;
            }
        };

        match parse_announce(&buf[..len], src) {
            Some(peer) => {
                debug!("announce from {src}: {}", peer.display_name());
                if tx.blocking_send(peer).is_err() {
                    // Receiver dropped; the scan owner is gone.
                    break;
                }
            }
            None => {
                debug!("ignoring malformed datagram from {src}");
            }
        }
    }

    info!("discovery scan stopped");
}

/// Builds the announce datagram a peer broadcasts about itself.
pub fn encode_announce(display_name: &str, chat_port: u16) -> Vec<u8> {
    let name = display_name.as_bytes();
    let name_len = name.len().min(u16::MAX as usize);

    let mut buf = Vec::with_capacity(ANNOUNCE_MIN_LEN + name_len);
    buf.extend_from_slice(&ANNOUNCE_MAGIC);
    buf.push(ANNOUNCE_VERSION);
    buf.extend_from_slice(&chat_port.to_be_bytes());
    buf.extend_from_slice(&(name_len as u16).to_be_bytes());
    buf.extend_from_slice(&name[..name_len]);
    buf
}

/// Parses an announce datagram into the peer it describes.
///
/// Returns `None` for anything that is not a well-formed announce; stray
/// traffic on the discovery port is expected and ignored.
fn parse_announce(datagram: &[u8], src: SocketAddr) -> Option<PeerIdentity> {
    if datagram.len() < ANNOUNCE_MIN_LEN || datagram[..4] != ANNOUNCE_MAGIC {
        return None;
    }
    if datagram[4] != ANNOUNCE_VERSION {
        return None;
    }

    let chat_port = u16::from_be_bytes([datagram[5], datagram[6]]);
    let name_len = u16::from_be_bytes([datagram[7], datagram[8]]) as usize;
    if datagram.len() < ANNOUNCE_MIN_LEN + name_len {
        return None;
    }

    let name = std::str::from_utf8(&datagram[ANNOUNCE_MIN_LEN..ANNOUNCE_MIN_LEN + name_len])
        .ok()?
        .to_string();
    let name = (!name.is_empty()).then_some(name);

    Some(PeerIdentity::new(
        name,
        format!("{}:{}", src.ip(), chat_port),
    ))
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────
