//! Peer discovery.
//!
//! Discovery is independent of connection state: it produces a stream of
//! candidate [`PeerIdentity`] values found over time, which the caller feeds
//! into `connect_to` once the user picks one.  The platform scan primitives
//! live behind [`DiscoveryProvider`]; [`Discovery`] adds the policy the
//! engine guarantees: deduplication by address within one scan, and a hard
//! error when the platform cannot search at all, so "found nothing yet" is
//! never confused with "cannot search".

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use linkchat_core::{PeerAddress, PeerIdentity};

pub mod udp;

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The platform capability is missing or could not be started.
    #[error("discovery unavailable: {0}")]
    Unavailable(String),
}

/// Platform scan primitives.
///
/// `start_scan` returns a channel of raw sightings; the same device may be
/// reported many times.  `stop_scan` ends the underlying scan; the sighting
/// channel closes afterwards.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    async fn start_scan(&self) -> Result<mpsc::Receiver<PeerIdentity>, DiscoveryError>;
    async fn stop_scan(&self);
}

/// Policy wrapper over a [`DiscoveryProvider`].
pub struct Discovery {
    provider: Arc<dyn DiscoveryProvider>,
}

impl Discovery {
    pub fn new(provider: Arc<dyn DiscoveryProvider>) -> Self {
        Self { provider }
    }

    /// Starts one scan.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::Unavailable`] when the provider cannot scan.
    pub async fn scan(&self) -> Result<PeerScan, DiscoveryError> {
        let rx = self.provider.start_scan().await?;
        Ok(PeerScan {
            provider: Arc::clone(&self.provider),
            rx,
            seen: HashSet::new(),
        })
    }
}

/// One in-progress scan: a deduplicated stream of peers.
pub struct PeerScan {
    provider: Arc<dyn DiscoveryProvider>,
    rx: mpsc::Receiver<PeerIdentity>,
    seen: HashSet<PeerAddress>,
}

impl PeerScan {
    /// Returns the next peer not yet seen in this scan, or `None` once the
    /// scan has stopped.
    pub async fn next(&mut self) -> Option<PeerIdentity> {
        while let Some(peer) = self.rx.recv().await {
            if self.seen.insert(peer.address.clone()) {
                return Some(peer);
            }
            debug!("duplicate sighting of {} ignored", peer.address);
        }
        None
    }

    /// Stops the scan.  Sightings already queued are discarded.
    pub async fn stop(self) {
        self.provider.stop_scan().await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str, addr: &str) -> PeerIdentity {
        PeerIdentity::new(Some(name.to_string()), addr)
    }

    #[tokio::test]
    async fn test_scan_deduplicates_by_address() {
        let mut provider = MockDiscoveryProvider::new();
        provider.expect_start_scan().returning(|| {
            let (tx, rx) = mpsc::channel(8);
            tokio::spawn(async move {
                tx.send(peer("Phone-B", "AA:BB")).await.unwrap();
                tx.send(peer("Phone-B", "AA:BB")).await.unwrap();
                tx.send(peer("Phone-B (renamed)", "AA:BB")).await.unwrap();
                tx.send(peer("Tablet", "CC:DD")).await.unwrap();
            });
            Ok(rx)
        });

        let discovery = Discovery::new(Arc::new(provider));
        let mut scan = discovery.scan().await.expect("scan must start");

        let first = scan.next().await.expect("first peer");
        let second = scan.next().await.expect("second peer");
        assert_eq!(first.address.as_str(), "AA:BB");
        assert_eq!(second.address.as_str(), "CC:DD");

        // The sender is dropped, so the deduplicated stream ends.
        assert_eq!(scan.next().await, None);
    }

    #[tokio::test]
    async fn test_unavailable_provider_fails_the_scan() {
        let mut provider = MockDiscoveryProvider::new();
        provider
            .expect_start_scan()
            .returning(|| Err(DiscoveryError::Unavailable("radio off".to_string())));

        let discovery = Discovery::new(Arc::new(provider));
        let result = discovery.scan().await;
        assert!(
            matches!(result, Err(DiscoveryError::Unavailable(_))),
            "a missing capability must be reported, not an empty scan"
        );
    }

    #[tokio::test]
    async fn test_stop_forwards_to_the_provider() {
        let mut provider = MockDiscoveryProvider::new();
        provider.expect_start_scan().returning(|| {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        });
        provider.expect_stop_scan().times(1).return_const(());

        let discovery = Discovery::new(Arc::new(provider));
        let scan = discovery.scan().await.expect("scan must start");
        scan.stop().await;
    }
}
