// UDP transport implementation with broadcast and socket buffer tuning
use crate::traits::{not_open, Transport};
use nix::sys::socket::{setsockopt, sockopt};
use parking_lot::RwLock;
use std::io::{ErrorKind, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65536;

/// Socket configuration, normally filled from the command line.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    pub local_ip: IpAddr,
    pub local_port: u16,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: Option<u16>,
    pub broadcast: bool,
    /// How long `receive` blocks before reporting an idle poll.
    pub poll_interval: Duration,
    /// SO_RCVBUF applied on open.
    pub recv_buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        UdpConfig {
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: 0,
            remote_ip: None,
            remote_port: None,
            broadcast: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
        }
    }
}

impl UdpConfig {
    /// Where a send without an explicit peer goes: the configured remote,
    /// else the limited broadcast address when broadcasting is enabled.
    pub fn default_destination(&self) -> Option<SocketAddr> {
        let port = self.remote_port?;
        match self.remote_ip {
            Some(ip) => Some(SocketAddr::new(ip, port)),
            None if self.broadcast => Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), port)),
            None => None,
        }
    }
}

pub struct UdpTransport {
    config: UdpConfig,
    socket: RwLock<Option<UdpSocket>>,
}

impl UdpTransport {
    pub fn new(config: UdpConfig) -> Self {
        UdpTransport {
            config,
            socket: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &UdpConfig {
        &self.config
    }

    /// Address actually bound, useful when the local port was 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.read().as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Set socket receive buffer size (SO_RCVBUF)
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<()> {
        if let Some(ref socket) = *self.socket.read() {
            setsockopt(socket, sockopt::RcvBuf, &size)
                .map_err(|e| std::io::Error::new(ErrorKind::Other, e))?;
        }
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn open(&self) -> Result<()> {
        let mut guard = self.socket.write();
        if guard.is_some() {
            return Ok(());
        }

        let socket = UdpSocket::bind(SocketAddr::new(self.config.local_ip, self.config.local_port))?;
        socket.set_broadcast(self.config.broadcast)?;
        socket.set_read_timeout(Some(self.config.poll_interval))?;
        info!(local = ?socket.local_addr().ok(), broadcast = self.config.broadcast, "udp socket bound");
        *guard = Some(socket);
        drop(guard);

        if let Err(e) = self.set_recv_buffer_size(self.config.recv_buffer_size) {
            warn!(error = %e, "could not set receive buffer size");
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.socket.write().take().is_some() {
            debug!("udp socket closed");
        }
        Ok(())
    }

    fn send(&self, data: &[u8], peer: Option<SocketAddr>) -> Result<usize> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or_else(not_open)?;
        let target = peer
            .or_else(|| self.config.default_destination())
            .ok_or_else(|| std::io::Error::new(ErrorKind::NotConnected, "no peer selected"))?;
        socket.send_to(data, target)
    }

    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        let guard = self.socket.read();
        let socket = guard.as_ref().ok_or_else(not_open)?;
        match socket.recv_from(buf) {
            Ok((n, origin)) => Ok(Some((n, origin))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn is_open(&self) -> bool {
        self.socket.read().is_some()
    }
}
