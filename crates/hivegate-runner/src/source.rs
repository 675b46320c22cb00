//! Inbound datagram sources.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;

/// Size of the receive buffer. Larger datagrams are truncated and then
/// fail length validation.
pub const RECV_BUFFER_SIZE: usize = 256;

/// Result of one bounded wait for input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A datagram of this many bytes is in the buffer.
    Datagram(usize),
    /// The wait timed out or was interrupted.
    Idle,
}

/// Something the gateway can read datagrams from.
///
/// `recv_datagram` must return within a bounded time so the loop can observe
/// shutdown requests. An `Err` is fatal and stops the gateway.
pub trait DatagramSource {
    /// Wait for the next datagram and copy it into `buf`.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Readiness>;
}

impl<S: DatagramSource + ?Sized> DatagramSource for Box<S> {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Readiness> {
        (**self).recv_datagram(buf)
    }
}

/// A bound UDP socket with a read timeout as the readiness wait.
#[derive(Debug)]
pub struct UdpSource {
    socket: UdpSocket,
}

impl UdpSource {
    /// Bind `addr`; each receive waits at most `timeout`.
    pub fn bind(addr: impl ToSocketAddrs, timeout: Duration) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(timeout))?;
        Ok(UdpSource { socket })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramSource for UdpSource {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<Readiness> {
        match self.socket.recv_from(buf) {
            Ok((len, peer)) => {
                tracing::trace!("{} bytes from {}", len, peer);
                Ok(Readiness::Datagram(len))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(Readiness::Idle)
            }
            Err(e) => Err(e),
        }
    }
}
