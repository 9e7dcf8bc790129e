//! UDP socket adapter.
//!
//! [`UdpTransport`] is the default [`Transport`]: a non-blocking std UDP
//! socket bound with address reuse, used for both directions of a
//! connection. [`TokioUdpTransport`] is the same socket registered with
//! tokio, for the concurrent node.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
#[cfg(feature = "transport")]
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::trace;

use crate::core::Transport;

/// Bind a non-blocking IPv4 UDP socket on `0.0.0.0:port` with `SO_REUSEADDR`.
///
/// Address reuse lets a restarted instance rebind the same port at once.
/// Port 0 binds an ephemeral port.
pub fn bind_reusable(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Non-blocking UDP [`Transport`].
#[derive(Debug, Default)]
pub struct UdpTransport {
    socket: Option<UdpSocket>,
}

impl UdpTransport {
    /// Create an unbound transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the local address, if bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket()?.local_addr()
    }

    fn socket(&self) -> io::Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not bound"))
    }
}

impl Transport for UdpTransport {
    fn bind(&mut self, port: u16) -> io::Result<()> {
        self.close();
        self.socket = Some(bind_reusable(port)?);
        Ok(())
    }

    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
        self.socket()?.send_to(bytes, addr)
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket()?.recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            // Windows reports ICMP port-unreachable on the next receive.
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => {
                trace!("ignoring connection reset on datagram socket");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

/// Non-blocking UDP [`Transport`] registered with the tokio reactor.
///
/// Operations never await; [`TokioUdpTransport::socket`] exposes the socket
/// so a task can wait for readiness without holding the transport.
#[cfg(feature = "transport")]
#[derive(Debug, Default)]
pub struct TokioUdpTransport {
    socket: Option<Arc<tokio::net::UdpSocket>>,
}

#[cfg(feature = "transport")]
impl TokioUdpTransport {
    /// Create an unbound transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the bound socket.
    pub fn socket(&self) -> Option<Arc<tokio::net::UdpSocket>> {
        self.socket.clone()
    }

    /// Get the local address, if bound.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.bound()?.local_addr()
    }

    fn bound(&self) -> io::Result<&tokio::net::UdpSocket> {
        self.socket
            .as_deref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket not bound"))
    }
}

/// Binding must happen inside a tokio runtime.
#[cfg(feature = "transport")]
impl Transport for TokioUdpTransport {
    fn bind(&mut self, port: u16) -> io::Result<()> {
        self.close();
        let socket = tokio::net::UdpSocket::from_std(bind_reusable(port)?)?;
        self.socket = Some(Arc::new(socket));
        Ok(())
    }

    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
        match self.bound()?.try_send_to(bytes, addr) {
            Ok(sent) => Ok(sent),
            // Full send buffer: the datagram is lost like any other
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                trace!(%addr, "send buffer full, datagram dropped");
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.bound()?.try_recv_from(buf) {
            Ok((len, addr)) => Ok(Some((len, addr))),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(ref e) if e.kind() == io::ErrorKind::ConnectionReset => {
                trace!("ignoring connection reset on datagram socket");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        self.socket = None;
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}
