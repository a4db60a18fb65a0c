// In-process transport: datagrams travel over crossbeam channels
use crate::traits::{not_open, Transport};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::io::{ErrorKind, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub data: Vec<u8>,
    /// Destination for outbound datagrams, origin for inbound ones.
    pub peer: Option<SocketAddr>,
}

/// Transport end handed to the session.
pub struct MemoryTransport {
    open: AtomicBool,
    outbound: Sender<Datagram>,
    inbound: Receiver<Datagram>,
    default_destination: Option<SocketAddr>,
    poll_interval: Duration,
}

/// The far side of a [`MemoryTransport`]: sees what was sent and injects
/// what should be received.
pub struct MemoryPeer {
    sent: Receiver<Datagram>,
    inject: Sender<Datagram>,
}

impl MemoryTransport {
    pub fn pair() -> (MemoryTransport, MemoryPeer) {
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        let transport = MemoryTransport {
            open: AtomicBool::new(false),
            outbound: out_tx,
            inbound: in_rx,
            default_destination: None,
            poll_interval: Duration::from_millis(10),
        };
        let peer = MemoryPeer {
            sent: out_rx,
            inject: in_tx,
        };
        (transport, peer)
    }

    pub fn with_default_destination(mut self, addr: SocketAddr) -> Self {
        self.default_destination = Some(addr);
        self
    }
}

impl Transport for MemoryTransport {
    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn send(&self, data: &[u8], peer: Option<SocketAddr>) -> Result<usize> {
        if !self.is_open() {
            return Err(not_open());
        }
        let peer = peer.or(self.default_destination);
        if peer.is_none() {
            return Err(std::io::Error::new(ErrorKind::NotConnected, "no peer selected"));
        }
        self.outbound
            .send(Datagram { data: data.to_vec(), peer })
            .map_err(|_| std::io::Error::new(ErrorKind::BrokenPipe, "memory peer dropped"))?;
        Ok(data.len())
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        if !self.is_open() {
            return Err(not_open());
        }
        match self.inbound.recv_timeout(self.poll_interval) {
            Ok(datagram) => {
                // Oversized datagrams are truncated, as with a real socket
                let n = datagram.data.len().min(buf.len());
                buf[..n].copy_from_slice(&datagram.data[..n]);
                let origin = datagram.peer.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 0)));
                Ok(Some((n, origin)))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(self.poll_interval);
                Ok(None)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Next datagram the transport sent, waiting up to `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Datagram> {
        self.sent.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Datagram> {
        self.sent.try_recv().ok()
    }

    /// Everything sent so far, without waiting.
    pub fn drain(&self) -> Vec<Datagram> {
        self.sent.try_iter().collect()
    }

    pub fn inject(&self, data: Vec<u8>, origin: SocketAddr) {
        let _ = self.inject.send(Datagram { data, peer: Some(origin) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> SocketAddr {
        "192.168.1.20:10023".parse().unwrap()
    }

    #[test]
    fn closed_transport_rejects_io() {
        let (transport, _peer) = MemoryTransport::pair();
        let mut buf = [0u8; 8];
        assert_eq!(transport.send(b"x", Some(origin())).unwrap_err().kind(), ErrorKind::NotConnected);
        assert_eq!(transport.receive(&mut buf).unwrap_err().kind(), ErrorKind::NotConnected);
    }

    #[test]
    fn sends_reach_peer_with_destination() {
        let (transport, peer) = MemoryTransport::pair();
        let transport = transport.with_default_destination(origin());
        transport.open().unwrap();

        transport.send(b"abcd", None).unwrap();
        let datagram = peer.try_recv().unwrap();
        assert_eq!(datagram.data, b"abcd");
        assert_eq!(datagram.peer, Some(origin()));
    }

    #[test]
    fn injected_datagrams_are_received() {
        let (transport, peer) = MemoryTransport::pair();
        transport.open().unwrap();

        let mut buf = [0u8; 8];
        assert!(transport.receive(&mut buf).unwrap().is_none());

        peer.inject(b"/a\0\0".to_vec(), origin());
        let (n, from) = transport.receive(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..n], b"/a\0\0");
        assert_eq!(from, origin());
    }
}
