//! Peer identity entities.
//!
//! A peer is identified by an opaque, stable address string supplied by the
//! underlying transport (a radio MAC, a `host:port` pair; the core never
//! parses it).  Display names are advisory and may be absent; two identities
//! are the same peer exactly when their addresses match.

use serde::{Deserialize, Serialize};

/// Opaque stable peer address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(pub String);

impl PeerAddress {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A discovered or connected peer device.
///
/// Equality and hashing consider only the address, so a rescan that learns a
/// previously anonymous device's name does not produce a "new" peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerIdentity {
    /// Advertised display name, if the device exposed one.
    pub name: Option<String>,
    /// Transport-level address; the stable identity of the peer.
    pub address: PeerAddress,
}

impl PeerIdentity {
    pub fn new(name: Option<String>, address: impl Into<String>) -> Self {
        Self {
            name,
            address: PeerAddress::new(address),
        }
    }

    /// Name to show a user: the advertised name, or the address as fallback.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.address.as_str())
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeerIdentity {}

impl std::hash::Hash for PeerIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
