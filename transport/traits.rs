// Transport abstraction - allows pluggable datagram backends
use std::io::Result;
use std::net::SocketAddr;

/// A datagram endpoint shared between the console thread, the receive
/// thread and effect timers, hence `&self` everywhere.
pub trait Transport: Send + Sync {
    /// Bind and get ready to send/receive.
    fn open(&self) -> Result<()>;

    /// Release the socket. Any blocked `receive` returns within one poll
    /// interval.
    fn close(&self) -> Result<()>;

    /// Hand one datagram to the OS. `peer = None` selects the configured
    /// default destination, if any.
    fn send(&self, data: &[u8], peer: Option<SocketAddr>) -> Result<usize>;

    /// Wait up to the poll interval for one datagram. `Ok(None)` means the
    /// poll interval elapsed without traffic.
    fn receive(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>>;

    fn is_open(&self) -> bool;
}

pub(crate) fn not_open() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotConnected, "transport is not open")
}
