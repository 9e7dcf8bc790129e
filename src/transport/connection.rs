//! Connection lifecycle management.
//!
//! The [`ConnectionManager`] exclusively owns the transport resource and
//! drives it through its lifecycle:
//!
//! ```text
//! ColdStart ──▶ Initializing ──▶ Bound ──▶ { Sending, Receiving }
//!                    ▲                              │
//!                    │ retry interval elapsed       │ transport fault
//!                    └──────── ErrorRecovering ◀────┘
//! ```
//!
//! Nothing here blocks or sleeps. Recovery is time-driven: every call is
//! given the current instant, and a rebind is attempted on the first call
//! after the retry interval has elapsed.

use std::fmt;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::core::{StatusCode, Transport};

use super::error::{TransportError, TransportResult};

/// Connection lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionPhase {
    /// Nothing has been checked yet in this epoch.
    #[default]
    ColdStart,
    /// Binding the transport.
    Initializing,
    /// Transport bound and idle.
    Bound,
    /// Last operation was a send.
    Sending,
    /// Last operation was a receive.
    Receiving,
    /// Waiting out the retry interval after a fault.
    ErrorRecovering,
}

impl ConnectionPhase {
    /// Check if the transport can be used.
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            ConnectionPhase::Bound | ConnectionPhase::Sending | ConnectionPhase::Receiving
        )
    }
}

/// Process epoch.
///
/// A value drawn once per process. A transport handle records the epoch in
/// which it was bound; a handle from any other epoch is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epoch(u64);

impl Epoch {
    /// The epoch of the running process.
    pub fn current() -> Self {
        static CURRENT: OnceLock<u64> = OnceLock::new();
        Self(*CURRENT.get_or_init(rand::random::<u64>))
    }

    /// Create an epoch from a raw value (e.g. one persisted across a restart).
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Owned transport resource, stamped with the epoch it was bound in.
///
/// Dropping the handle releases the transport.
#[derive(Debug)]
pub struct TransportHandle<T: Transport> {
    transport: T,
    bound_in: Option<Epoch>,
}

impl<T: Transport> TransportHandle<T> {
    /// Wrap a transport that has never been bound.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            bound_in: None,
        }
    }

    /// Wrap a transport that was bound in `epoch` and may still be open.
    pub fn restore(transport: T, epoch: Epoch) -> Self {
        Self {
            transport,
            bound_in: Some(epoch),
        }
    }

    /// The epoch the transport was bound in.
    pub fn bound_in(&self) -> Option<Epoch> {
        self.bound_in
    }

    /// Check if the handle was bound in `epoch` and is still open.
    pub fn is_live(&self, epoch: Epoch) -> bool {
        self.bound_in == Some(epoch) && self.transport.is_open()
    }

    /// Get the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn release(&mut self) {
        if self.transport.is_open() {
            self.transport.close();
        }
        self.bound_in = None;
    }
}

impl<T: Transport> Drop for TransportHandle<T> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Transport lifecycle manager with cold-start detection and auto-recovery.
#[derive(Debug)]
pub struct ConnectionManager<T: Transport> {
    handle: TransportHandle<T>,
    epoch: Epoch,
    local_port: u16,
    retry_interval: Duration,
    phase: ConnectionPhase,
    status: StatusCode,
    retries: u32,
    last_error: Option<StatusCode>,
    retry_at: Option<Instant>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager for `handle` in the current process epoch.
    pub fn new(handle: TransportHandle<T>, local_port: u16, retry_interval: Duration) -> Self {
        Self {
            handle,
            epoch: Epoch::current(),
            local_port,
            retry_interval,
            phase: ConnectionPhase::ColdStart,
            status: StatusCode::Idle,
            retries: 0,
            last_error: None,
            retry_at: None,
        }
    }

    /// Override the epoch used for cold-start detection.
    pub fn with_epoch(mut self, epoch: Epoch) -> Self {
        self.epoch = epoch;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Status of the last operation.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Consecutive faults since the last completed send or received datagram.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// The most recent fault, if any.
    pub fn last_error(&self) -> Option<StatusCode> {
        self.last_error
    }

    /// Check if the transport is bound and usable.
    pub fn is_ready(&self) -> bool {
        self.phase.is_ready()
    }

    /// Epoch used for cold-start detection.
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Local port.
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Get the transport handle.
    pub fn handle(&self) -> &TransportHandle<T> {
        &self.handle
    }

    /// Make the transport ready, binding or rebinding it as needed.
    pub fn ensure_ready(&mut self, now: Instant) -> TransportResult<()> {
        match self.phase {
            ConnectionPhase::Bound | ConnectionPhase::Sending | ConnectionPhase::Receiving => {
                Ok(())
            }
            ConnectionPhase::ColdStart => self.cold_start(now),
            ConnectionPhase::Initializing => self.try_bind(now),
            ConnectionPhase::ErrorRecovering => {
                if let Some(retry_at) = self.retry_at {
                    if now < retry_at {
                        self.status = StatusCode::RecoveryInProgress;
                        return Err(TransportError::NotReady(StatusCode::RecoveryInProgress));
                    }
                }
                debug!(retries = self.retries, "retry interval elapsed, rebinding");
                self.handle.release();
                self.phase = ConnectionPhase::Initializing;
                self.try_bind(now)
            }
        }
    }

    /// Receive one pending datagram, if any.
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        now: Instant,
    ) -> TransportResult<Option<(usize, SocketAddr)>> {
        self.ensure_ready(now)?;
        match self.handle.transport.try_recv(buf) {
            Ok(received) => {
                self.phase = ConnectionPhase::Receiving;
                self.status = StatusCode::Receiving;
                if received.is_some() {
                    self.retries = 0;
                }
                Ok(received)
            }
            Err(e) => {
                self.enter_recovery(StatusCode::ReceiveError, now);
                warn!(error = %e, "receive failed");
                Err(TransportError::Receive(e))
            }
        }
    }

    /// Send one datagram.
    pub fn send(&mut self, addr: SocketAddr, bytes: &[u8], now: Instant) -> TransportResult<usize> {
        self.ensure_ready(now)?;
        self.phase = ConnectionPhase::Sending;
        self.status = StatusCode::Sending;
        match self.handle.transport.send_to(addr, bytes) {
            Ok(sent) => {
                self.status = StatusCode::SendComplete;
                self.retries = 0;
                Ok(sent)
            }
            Err(e) => {
                self.enter_recovery(StatusCode::SendError, now);
                warn!(error = %e, %addr, "send failed");
                Err(TransportError::Send(e))
            }
        }
    }

    /// Release the transport. The next call goes through cold start again.
    pub fn close(&mut self) {
        self.handle.release();
        self.phase = ConnectionPhase::ColdStart;
        self.status = StatusCode::Idle;
        self.retry_at = None;
    }

    /// Give up ownership of the transport, e.g. to hand it to a new instance.
    pub fn into_handle(self) -> TransportHandle<T> {
        self.handle
    }

    fn cold_start(&mut self, now: Instant) -> TransportResult<()> {
        if self.handle.is_live(self.epoch) {
            debug!(epoch = %self.epoch, "transport survived from this epoch");
            self.phase = ConnectionPhase::Bound;
            return Ok(());
        }
        if self.handle.transport.is_open() {
            warn!(
                port = self.local_port,
                "releasing transport left over from a previous epoch"
            );
        }
        self.handle.release();
        self.phase = ConnectionPhase::Initializing;
        self.try_bind(now)
    }

    fn try_bind(&mut self, now: Instant) -> TransportResult<()> {
        self.status = StatusCode::Initializing;
        match self.handle.transport.bind(self.local_port) {
            Ok(()) => {
                self.handle.bound_in = Some(self.epoch);
                self.phase = ConnectionPhase::Bound;
                self.status = StatusCode::Idle;
                self.retry_at = None;
                info!(port = self.local_port, retries = self.retries, "transport bound");
                Ok(())
            }
            Err(e) => {
                self.enter_recovery(StatusCode::BindError, now);
                warn!(port = self.local_port, error = %e, "bind failed");
                Err(TransportError::Bind(e))
            }
        }
    }

    fn enter_recovery(&mut self, code: StatusCode, now: Instant) {
        self.phase = ConnectionPhase::ErrorRecovering;
        self.status = code;
        self.last_error = Some(code);
        self.retries = self.retries.saturating_add(1);
        self.retry_at = Some(now + self.retry_interval);
    }
}
