//! LinkChat headless entry point.
//!
//! Wires the session engine to its LAN sample providers and runs until
//! Ctrl-C:
//!
//! ```text
//! main()
//!  └─ load_config()          -- TOML config, defaults on first run
//!  └─ ChatSession::new()     -- connection manager + router + audio boundary
//!  └─ background tasks
//!       ├─ discovery scan    (UDP announce listener thread)
//!       ├─ snapshot logger   (prints state transitions and message counts)
//!       └─ Ctrl-C handler
//! ```
//!
//! The audio boundary is wired to the mock adapter here: a platform build
//! swaps in its recorder/player implementation of `AudioAdapter`, exactly
//! like a radio transport swaps in for `TcpTransport`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use linkchat_core::PeerIdentity;
use linkchat_session::application::ChatSession;
use linkchat_session::infrastructure::audio::mock::MockAudioAdapter;
use linkchat_session::infrastructure::discovery::udp::{
    encode_announce, UdpAnnounceProvider, UdpDiscoveryConfig,
};
use linkchat_session::infrastructure::discovery::Discovery;
use linkchat_session::infrastructure::storage::config::load_config;
use linkchat_session::infrastructure::transport::connection_manager::LinkConfig;
use linkchat_session::infrastructure::transport::tcp::TcpTransport;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().unwrap_or_default();

    // Structured logging; RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.device.log_level.clone())),
        )
        .init();

    info!("LinkChat starting as \"{}\"", config.device.display_name);

    let local = PeerIdentity::new(
        Some(config.device.display_name.clone()),
        format!("{}:{}", config.network.bind_address, config.network.chat_port),
    );
    let session = ChatSession::new(
        local,
        Arc::new(TcpTransport::new()),
        Arc::new(MockAudioAdapter::new()),
        LinkConfig {
            max_payload_len: config.limits.max_payload_len,
        },
    );

    // ── Discovery scan ────────────────────────────────────────────────────────
    let discovery = Discovery::new(Arc::new(UdpAnnounceProvider::new(UdpDiscoveryConfig {
        discovery_port: config.network.discovery_port,
        bind_address: config.network.bind_address.clone(),
    })));
    match discovery.scan().await {
        Ok(mut scan) => {
            tokio::spawn(async move {
                while let Some(peer) = scan.next().await {
                    info!("discovered peer: {} ({})", peer.display_name(), peer.address);
                }
            });
        }
        Err(e) => {
            // The session still works against peers with known addresses.
            error!("discovery unavailable: {e}");
        }
    }

    // ── Announce broadcast ────────────────────────────────────────────────────
    // Periodically tell scanning peers we exist and which port we chat on.
    {
        let datagram = encode_announce(&config.device.display_name, config.network.chat_port);
        let discovery_port = config.network.discovery_port;
        tokio::spawn(async move {
            let socket = match std::net::UdpSocket::bind("0.0.0.0:0") {
                Ok(s) => s,
                Err(e) => {
                    warn!("cannot open announce socket: {e}");
                    return;
                }
            };
            if let Err(e) = socket.set_broadcast(true) {
                warn!("cannot enable broadcast: {e}");
                return;
            }
            loop {
                if let Err(e) = socket.send_to(&datagram, ("255.255.255.255", discovery_port)) {
                    warn!("announce failed: {e}");
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
    }

    // ── Snapshot logger ───────────────────────────────────────────────────────
    let mut snapshots = session.snapshots();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow().clone();
            info!(
                "session: {} peer={} messages={}",
                snapshot.connection_state.label(),
                snapshot
                    .peer
                    .as_ref()
                    .map(|p| p.display_name().to_string())
                    .unwrap_or_else(|| "-".to_string()),
                snapshot.messages.len()
            );
        }
    });

    // Accept one inbound peer by default; a UI would choose between this and
    // connect_to from a discovery pick.
    session.start_listening().await?;

    info!("LinkChat ready.  Press Ctrl-C to exit.");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    if session.snapshot().connection_state.is_active() {
        if let Err(e) = session.disconnect().await {
            error!("disconnect on shutdown failed: {e}");
        }
    }

    info!("LinkChat stopped");
    Ok(())
}
