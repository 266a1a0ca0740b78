//! Transport provider boundary.
//!
//! The session engine never opens sockets or radios itself.  It consumes a
//! [`Transport`] implementation that can open an acceptor bound to the local
//! identity, dial a peer by address, and hand back a split duplex stream.
//! The split matters: the read half is moved into the connection's read loop
//! while the write half stays behind the serialized write path, so the two
//! directions never contend.
//!
//! Two providers ship with this crate:
//!
//! - [`tcp::TcpTransport`] for `host:port` addresses over the LAN.
//! - [`memory::MemoryHub`] for in-process rendezvous in tests.

use async_trait::async_trait;
use thiserror::Error;

use linkchat_core::PeerIdentity;

pub mod connection_manager;
pub mod memory;
pub mod tcp;

/// Error type for transport provider operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The acceptor could not be bound to the local identity.
    #[error("failed to bind acceptor for {local}: {source}")]
    BindFailed {
        local: String,
        #[source]
        source: std::io::Error,
    },

    /// The outbound connection attempt failed.
    #[error("failed to connect to {peer}: {source}")]
    ConnectFailed {
        peer: String,
        #[source]
        source: std::io::Error,
    },

    /// The peer closed the stream.
    #[error("connection closed by peer")]
    Closed,

    /// An I/O error occurred on an established stream.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read half of an established duplex stream.
#[async_trait]
pub trait LinkReader: Send {
    /// Reads exactly `buf.len()` bytes, blocking until they arrive.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] on end-of-stream and
    /// [`TransportError::Io`] for other failures.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError>;
}

/// Write half of an established duplex stream.
#[async_trait]
pub trait LinkWriter: Send {
    /// Writes the whole buffer, blocking until it is accepted by the stream.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError>;

    /// Signals end-of-stream to the peer.  A second call is a no-op.
    async fn shutdown(&mut self) -> Result<(), TransportError>;
}

/// An established duplex stream, split into its two directions.
pub struct Link {
    pub reader: Box<dyn LinkReader>,
    pub writer: Box<dyn LinkWriter>,
}

/// A bound acceptor waiting for one inbound connection.
#[async_trait]
pub trait Acceptor: Send {
    /// Accepts exactly one inbound connection and reports who dialed in.
    ///
    /// The session engine drops the acceptor immediately afterwards; there is
    /// no multi-peer fan-in.
    async fn accept(&mut self) -> Result<(Link, PeerIdentity), TransportError>;
}

/// A transport capable of producing point-to-point duplex streams.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens an acceptor bound to the local identity's address.
    async fn listen(&self, local: &PeerIdentity) -> Result<Box<dyn Acceptor>, TransportError>;

    /// Dials the given peer's address.
    async fn connect(&self, peer: &PeerIdentity) -> Result<Link, TransportError>;
}
