//! Collaborator traits.
//!
//! The protocol core never touches sockets or application memory directly.
//! It talks to a [`Transport`] for datagram I/O and to a
//! [`PayloadSource`]/[`PayloadSink`] pair for the application payload.

use std::io;
use std::net::SocketAddr;

/// Datagram transport capability.
///
/// Every method must return promptly: `try_recv` is non-blocking and
/// `send_to` must either complete or fail without waiting on the network.
///
/// # Example
///
/// ```ignore
/// struct Loopback { queue: VecDeque<Vec<u8>>, open: bool }
///
/// impl Transport for Loopback {
///     fn bind(&mut self, _port: u16) -> io::Result<()> {
///         self.open = true;
///         Ok(())
///     }
///
///     fn send_to(&mut self, _addr: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
///         self.queue.push_back(bytes.to_vec());
///         Ok(bytes.len())
///     }
///
///     fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
///         // ...
///     }
///
///     fn close(&mut self) {
///         self.open = false;
///     }
///
///     fn is_open(&self) -> bool {
///         self.open
///     }
/// }
/// ```
pub trait Transport {
    /// Bind the local port. Address reuse semantics are expected so a
    /// restarted instance can rebind immediately.
    fn bind(&mut self, port: u16) -> io::Result<()>;

    /// Send one datagram.
    fn send_to(&mut self, addr: SocketAddr, bytes: &[u8]) -> io::Result<usize>;

    /// Receive one datagram into `buf` if one is pending.
    ///
    /// Returns `Ok(None)` when nothing is available.
    fn try_recv(&mut self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>>;

    /// Release the underlying resource. Must be idempotent.
    fn close(&mut self);

    /// Whether a resource is currently held.
    fn is_open(&self) -> bool;
}

/// Produces the outgoing application payload.
pub trait PayloadSource {
    /// Fill `buf` (exactly the agreed payload size) with the next payload.
    fn produce_outgoing_payload(&mut self, buf: &mut [u8]);
}

/// Consumes the incoming application payload.
pub trait PayloadSink {
    /// Called with each accepted payload, and with the cleared payload when
    /// the link is lost and values are not retained.
    fn consume_incoming_payload(&mut self, payload: &[u8]);
}

impl<F> PayloadSource for F
where
    F: FnMut(&mut [u8]),
{
    fn produce_outgoing_payload(&mut self, buf: &mut [u8]) {
        self(buf)
    }
}

impl<F> PayloadSink for F
where
    F: FnMut(&[u8]),
{
    fn consume_incoming_payload(&mut self, payload: &[u8]) {
        self(payload)
    }
}
