//! # Netflux
//!
//! Netflux is a soft-real-time, UDP-based exchange protocol for automation
//! devices (PLCs, PCs) that need fast bidirectional data exchange without
//! TCP overhead or a fieldbus stack. It provides:
//!
//! - **Loss detection, not retransmission**: 8-bit sequence numbers with
//!   wraparound-safe duplicate and reordering rejection
//! - **Liveness**: every frame echoes the partner's last accepted sequence
//!   number, and a watchdog declares the link down after a silence interval
//! - **Tuning signals**: send/receive intervals, jitter, round-trip time and
//!   loss counters
//! - **Unattended recovery**: cold-start detection, address reuse and
//!   time-driven rebinding after transport faults
//!
//! ## Wire Format
//!
//! ```text
//! +----------+----------+---------------------------+
//! | sequence | feedback | payload (fixed, agreed)   |
//! |  1 byte  |  1 byte  | 0..=1461 bytes            |
//! +----------+----------+---------------------------+
//! ```
//!
//! ## Feature Flags
//!
//! - `transport` (default): the concurrent tokio [`node`] driver
//!
//! ## Modules
//!
//! - [`core`]: Constants, errors, status codes and collaborator traits
//! - [`transport`]: Frame codec, UDP sockets and the connection manager
//! - [`link`]: Sequence tracking, watchdog, statistics and the I/O-free session
//! - [`engine`]: Cooperative single-threaded driver
//! - [`node`]: Concurrent sender/receiver tasks (requires `transport` feature)
//! - [`config`]: Serde configuration and validation
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Instant;
//! use netflux::prelude::*;
//!
//! // Two sessions exchanging frames without any socket
//! let settings = NetfluxConfig { payload_size: 4, ..Default::default() }.validate()?;
//! let mut plc = settings.session();
//! let mut pc = settings.session();
//!
//! let mut frame = Vec::new();
//! let seq = plc.compose(&mut |buf: &mut [u8]| buf.copy_from_slice(&[1, 2, 3, 4]), &mut frame)?;
//! plc.record_sent(seq, Instant::now());
//!
//! let outcome = pc.ingest(&frame, Instant::now(), &mut |_: &[u8]| {});
//! assert!(outcome.is_accepted());
//! assert_eq!(pc.received_payload().as_bytes(), &[1, 2, 3, 4]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod core;
pub mod engine;
pub mod link;
pub mod transport;

// Concurrent driver (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod node;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{NetfluxConfig, Settings};
    pub use crate::core::*;
    pub use crate::engine::{Engine, Polled};
    pub use crate::link::{
        FrameCounters, IngestOutcome, LinkEvent, LinkState, SeqVerdict, Session, StatsSnapshot,
    };
    pub use crate::transport::{
        ConnectionManager, ConnectionPhase, FrameCodec, FrameError, TransportError,
        TransportHandle, UdpTransport,
    };

    #[cfg(feature = "transport")]
    pub use crate::node::Node;
    #[cfg(feature = "transport")]
    pub use crate::transport::TokioUdpTransport;
}

// Re-export commonly used items at crate root
pub use crate::config::{NetfluxConfig, Settings};
pub use crate::core::{ConfigError, NetfluxError, StatusCode};
pub use crate::engine::Engine;

#[cfg(feature = "transport")]
pub use crate::node::Node;
