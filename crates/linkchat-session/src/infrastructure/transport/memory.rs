//! In-process transport for tests.
//!
//! A [`MemoryHub`] is a rendezvous point: endpoints register an acceptor
//! under their address, and `connect` hands the two sides the halves of a
//! `tokio::io::duplex` pipe.  Closing either half behaves like a dropped
//! radio link, so session teardown paths can be exercised without sockets.
//!
//! The hub is always compiled in (not gated on `cfg(test)`) so integration
//! tests in `tests/` can drive the full engine through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};

use linkchat_core::PeerIdentity;

use super::{Acceptor, Link, LinkReader, LinkWriter, Transport, TransportError};

const PIPE_CAPACITY: usize = 64 * 1024;

/// A pending dial waiting for the listening side to accept.
struct PendingConnect {
    initiator: PeerIdentity,
    reply: oneshot::Sender<Link>,
}

/// Shared rendezvous state for a set of in-process endpoints.  Clones share
/// the same address space.
#[derive(Clone, Default)]
pub struct MemoryHub {
    listeners: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<PendingConnect>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport endpoint that dials and listens through this hub
    /// as `local`.
    pub fn endpoint(&self, local: PeerIdentity) -> MemoryTransport {
        MemoryTransport {
            hub: self.clone(),
            local,
        }
    }

    fn refused(peer: &PeerIdentity) -> TransportError {
        TransportError::ConnectFailed {
            peer: peer.address.to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no acceptor registered for address",
            ),
        }
    }
}

/// One endpoint of a [`MemoryHub`].
pub struct MemoryTransport {
    hub: MemoryHub,
    local: PeerIdentity,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self, local: &PeerIdentity) -> Result<Box<dyn Acceptor>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .listeners
            .lock()
            .expect("hub lock poisoned")
            .insert(local.address.to_string(), tx.clone());
        Ok(Box::new(MemoryAcceptor {
            hub: self.hub.clone(),
            address: local.address.to_string(),
            tx,
            rx,
        }))
    }

    async fn connect(&self, peer: &PeerIdentity) -> Result<Link, TransportError> {
        let pending_tx = {
            let listeners = self.hub.listeners.lock().expect("hub lock poisoned");
            listeners
                .get(peer.address.as_str())
                .cloned()
                .ok_or_else(|| MemoryHub::refused(peer))?
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        pending_tx
            .send(PendingConnect {
                initiator: self.local.clone(),
                reply: reply_tx,
            })
            .map_err(|_| MemoryHub::refused(peer))?;

        // Blocks until the listening side accepts; cancelling the dialing
        // task drops the receiver and the pending entry dies with it.
        reply_rx.await.map_err(|_| MemoryHub::refused(peer))
    }
}

struct MemoryAcceptor {
    hub: MemoryHub,
    address: String,
    /// Clone of the registered sender, used to recognise our own
    /// registration on drop.
    tx: mpsc::UnboundedSender<PendingConnect>,
    rx: mpsc::UnboundedReceiver<PendingConnect>,
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    async fn accept(&mut self) -> Result<(Link, PeerIdentity), TransportError> {
        let pending = self.rx.recv().await.ok_or(TransportError::Closed)?;

        let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
        let _ = pending.reply.send(split_link(far));
        Ok((split_link(near), pending.initiator))
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        // Deregister so later dials see a refused connection, matching a
        // closed listener socket.  Only our own registration is removed; a
        // newer acceptor may already have re-bound the address.
        let mut listeners = self.hub.listeners.lock().expect("hub lock poisoned");
        if listeners
            .get(&self.address)
            .is_some_and(|current| current.same_channel(&self.tx))
        {
            listeners.remove(&self.address);
        }
    }
}

fn split_link(stream: DuplexStream) -> Link {
    let (reader, writer) = tokio::io::split(stream);
    Link {
        reader: Box::new(MemoryLinkReader { inner: reader }),
        writer: Box::new(MemoryLinkWriter { inner: writer }),
    }
}

struct MemoryLinkReader {
    inner: ReadHalf<DuplexStream>,
}

#[async_trait]
impl LinkReader for MemoryLinkReader {
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

struct MemoryLinkWriter {
    inner: WriteHalf<DuplexStream>,
}

#[async_trait]
impl LinkWriter for MemoryLinkWriter {
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(buf).await.map_err(TransportError::Io)
    }

    async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner.shutdown().await.map_err(TransportError::Io)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
