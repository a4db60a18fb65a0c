// Outbound path: transport plus the currently selected peer
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use osc_core::OscMessage;
use osc_transport::Transport;
use parking_lot::RwLock;
use tracing::trace;

use crate::error::{Result, SessionError};

/// Remote endpoint messages are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    addr: SocketAddr,
}

impl Peer {
    pub fn new(addr: SocketAddr) -> Self {
        Peer { addr }
    }

    /// Resolve `ip` and `port` as typed on the console.
    pub fn resolve(ip: &str, port: &str) -> Result<Self> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|_| SessionError::Usage(format!("invalid port {port:?}")))?;
        let addr = (ip, port)
            .to_socket_addrs()
            .map_err(|e| SessionError::Usage(format!("cannot resolve {ip}: {e}")))?
            .next()
            .ok_or_else(|| SessionError::Usage(format!("cannot resolve {ip}")))?;
        Ok(Peer { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.addr.ip(), self.addr.port())
    }
}

/// Shared by the console thread and every effect timer.
pub struct Link {
    transport: Arc<dyn Transport>,
    peer: RwLock<Option<Peer>>,
}

impl Link {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Link {
            transport,
            peer: RwLock::new(None),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn peer(&self) -> Option<Peer> {
        *self.peer.read()
    }

    /// Swap the peer, returning the previous one.
    pub fn set_peer(&self, peer: Option<Peer>) -> Option<Peer> {
        std::mem::replace(&mut *self.peer.write(), peer)
    }

    /// Encode and send to the current peer (or the transport default).
    pub fn send(&self, message: &OscMessage) -> Result<()> {
        let peer = self.peer();
        let bytes = message.to_bytes();
        self.transport.send(&bytes, peer.map(|p| p.addr()))?;
        trace!(address = %message.address, tags = %message.type_tags(), len = bytes.len(), "sent");
        Ok(())
    }
}
