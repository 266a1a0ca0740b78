//! TCP transport provider.
//!
//! The sample provider for LAN use: peer addresses are `host:port` strings.
//! A real short-range radio transport implements the same traits against its
//! platform SDK; the session engine does not care which one it is handed.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::info;

use linkchat_core::PeerIdentity;

use super::{Acceptor, Link, LinkReader, LinkWriter, Transport, TransportError};

/// Transport over TCP sockets.
#[derive(Debug, Default)]
pub struct TcpTransport;

impl TcpTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self, local: &PeerIdentity) -> Result<Box<dyn Acceptor>, TransportError> {
        let listener = TcpListener::bind(local.address.as_str()).await.map_err(|source| {
            TransportError::BindFailed {
                local: local.address.to_string(),
                source,
            }
        })?;
        info!("acceptor bound on {}", local.address);
        Ok(Box::new(TcpAcceptor { listener }))
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<Link, TransportError> {
        let stream = TcpStream::connect(peer.address.as_str()).await.map_err(|source| {
            TransportError::ConnectFailed {
                peer: peer.address.to_string(),
                source,
            }
        })?;
        Ok(split_stream(stream))
    }
}

struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<(Link, PeerIdentity), TransportError> {
        let (stream, remote) = self.listener.accept().await.map_err(TransportError::Io)?;
        info!("accepted inbound connection from {remote}");
        // TCP carries no display name; the peer is known by address only.
        let peer = PeerIdentity::new(None, remote.to_string());
        Ok((split_stream(stream), peer))
    }
}

fn split_stream(stream: TcpStream) -> Link {
    let (reader, writer) = stream.into_split();
    Link {
        reader: Box::new(TcpLinkReader { inner: reader }),
        writer: Box::new(TcpLinkWriter { inner: writer }),
    }
}

struct TcpLinkReader {
    inner: OwnedReadHalf,
}

#[async_trait]
impl LinkReader for TcpLinkReader {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

struct TcpLinkWriter {
    inner: OwnedWriteHalf,
}

#[async_trait]
impl LinkWriter for TcpLinkWriter {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(buf).await.map_err(TransportError::Io)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await.map_err(TransportError::Io)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
