//! Netflux - Transport Layer
//!
//! This module owns everything between the protocol state and the network:
//!
//! - **Frame encoding/decoding**: [`Frame`], [`FrameCodec`] and the wire layout
//! - **Connection lifecycle**: [`ConnectionManager`] with cold-start detection,
//!   address reuse and time-driven recovery
//! - **Sockets**: [`UdpTransport`], a non-blocking [`crate::core::Transport`] adapter
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │     Link (sequence, watchdog, stats)    │
//! ├─────────────────────────────────────────┤
//! │         Transport Layer                 │  ← This module
//! │   frames, connection lifecycle, socket  │
//! ├─────────────────────────────────────────┤
//! │              UDP                        │
//! └─────────────────────────────────────────┘
//! ```

mod connection;
mod error;
mod frame;
mod socket;

#[cfg(test)]
pub(crate) mod mock;

pub use connection::*;
pub use error::*;
pub use frame::*;
pub use socket::*;
