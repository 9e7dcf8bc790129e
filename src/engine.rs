//! Cooperative driver.
//!
//! An [`Engine`] is driven by an external fixed-period loop, one call per
//! cycle, on one thread. Nothing blocks: the transport is polled, never
//! awaited, and recovery after a fault is time-driven.
//!
//! Each cycle has two phases, and the type system enforces their order:
//!
//! ```text
//! engine.poll(now, sink)      ingest datagrams, classify, run the watchdog
//!       │
//!       ▼
//! Polled::flush(now, source)  compose one frame and send it (rate-limited)
//! ```
//!
//! ```no_run
//! use std::time::Instant;
//! use netflux::prelude::*;
//!
//! let settings = NetfluxConfig::default().validate()?;
//! let mut engine = Engine::new(settings, UdpTransport::new());
//! let mut outgoing = |buf: &mut [u8]| buf.fill(0x55);
//! let mut incoming = |payload: &[u8]| println!("{payload:02x?}");
//!
//! loop {
//!     let now = Instant::now();
//!     let status = engine.poll(now, &mut incoming).flush(now, &mut outgoing);
//!     if status.is_error() {
//!         eprintln!("{status}");
//!     }
//!     std::thread::sleep(std::time::Duration::from_millis(1));
//! }
//! # Ok::<(), netflux::core::ConfigError>(())
//! ```

use std::time::Instant;

use tracing::{debug, trace};

use crate::config::{NetfluxConfig, Settings};
use crate::core::{
    ConfigError, MAX_DATAGRAMS_PER_POLL, MAX_FRAME_SIZE, PayloadSink, PayloadSource, StatusCode,
    Transport,
};
use crate::link::{FrameCounters, IngestOutcome, LinkEvent, LinkState, Session, StatsSnapshot};
use crate::transport::{ConnectionManager, TransportError, TransportHandle};

/// Single-threaded protocol engine.
#[derive(Debug)]
pub struct Engine<T: Transport> {
    settings: Settings,
    session: Session,
    connection: ConnectionManager<T>,
    status: StatusCode,
    last_flush: Option<Instant>,
    recv_buf: Vec<u8>,
    send_buf: Vec<u8>,
}

impl<T: Transport> Engine<T> {
    /// Create an engine over a transport that has not been bound yet.
    pub fn new(settings: Settings, transport: T) -> Self {
        Self::with_handle(settings, TransportHandle::new(transport))
    }

    /// Create an engine over an existing handle.
    ///
    /// A handle bound earlier in this process is reused as-is; any other
    /// handle is released and rebound on the first cycle.
    pub fn with_handle(settings: Settings, handle: TransportHandle<T>) -> Self {
        Self {
            session: settings.session(),
            connection: ConnectionManager::new(
                handle,
                settings.local_port,
                settings.retry_interval,
            ),
            settings,
            status: StatusCode::Idle,
            last_flush: None,
            recv_buf: vec![0; MAX_FRAME_SIZE + 1],
            send_buf: Vec::with_capacity(settings.codec.frame_size()),
        }
    }

    /// Validate `config` and create an engine.
    ///
    /// On error the transport is dropped untouched.
    pub fn from_config(config: &NetfluxConfig, transport: T) -> Result<Self, ConfigError> {
        let settings = config.validate()?;
        Ok(Self::new(settings, transport))
    }

    /// Receive phase of a cycle.
    ///
    /// Ingests up to [`MAX_DATAGRAMS_PER_POLL`] pending datagrams, hands
    /// accepted payloads to `sink` and evaluates the watchdog.
    pub fn poll<K: PayloadSink + ?Sized>(&mut self, now: Instant, sink: &mut K) -> Polled<'_, T> {
        let mut received = 0;
        let mut accepted = 0;
        let mut link = None;
        let mut status = StatusCode::Receiving;

        while received < MAX_DATAGRAMS_PER_POLL {
            let len = match self.connection.receive(&mut self.recv_buf, now) {
                Ok(Some((len, from))) => {
                    trace!(%from, len, "datagram");
                    len
                }
                Ok(None) => break,
                Err(e) => {
                    status = e.status();
                    break;
                }
            };
            received += 1;

            match self.session.ingest(&self.recv_buf[..len], now, sink) {
                IngestOutcome::Accepted { link: event, .. } => {
                    accepted += 1;
                    link = event.or(link);
                }
                IngestOutcome::Rejected(_) => {}
                IngestOutcome::Malformed(e) => status = TransportError::from(e).status(),
            }
        }

        if let Some(event) = self.session.evaluate_watchdog(now, sink) {
            link = Some(event);
        }
        self.settle(status);

        Polled {
            engine: self,
            received,
            accepted,
            link,
        }
    }

    /// Run a full cycle: poll, then flush.
    pub fn cycle<K, S>(&mut self, now: Instant, source: &mut S, sink: &mut K) -> StatusCode
    where
        K: PayloadSink + ?Sized,
        S: PayloadSource + ?Sized,
    {
        self.poll(now, sink).flush(now, source)
    }

    fn flush<S: PayloadSource + ?Sized>(&mut self, now: Instant, source: &mut S) -> StatusCode {
        if let Some(last) = self.last_flush {
            if now.saturating_duration_since(last) < self.settings.send_interval {
                return self.status;
            }
        }
        if let Err(e) = self.connection.ensure_ready(now) {
            // Keep the fault reported by the receive phase
            if self.status.is_error() {
                return self.status;
            }
            return self.settle(e.status());
        }
        self.last_flush = Some(now);

        self.status = StatusCode::PreparingData;
        let seq = match self.session.compose(source, &mut self.send_buf) {
            Ok(seq) => seq,
            Err(e) => return self.settle(TransportError::from(e).status()),
        };

        match self.connection.send(self.settings.remote, &self.send_buf, now) {
            Ok(_) => {
                self.session.record_sent(seq, now);
                self.settle(StatusCode::SendComplete)
            }
            Err(e) => {
                if matches!(e, TransportError::Send(_)) {
                    self.session.record_send_error();
                }
                debug!(seq, error = %e, "frame not sent");
                self.settle(e.status())
            }
        }
    }

    /// Record the outcome of an operation.
    ///
    /// Errors are reported as-is; otherwise a down link reports
    /// [`StatusCode::WatchdogTimeout`] until the next accepted frame.
    fn settle(&mut self, outcome: StatusCode) -> StatusCode {
        self.status = if !outcome.is_error() && self.session.link_state() == LinkState::Down {
            StatusCode::WatchdogTimeout
        } else {
            outcome
        };
        self.status
    }

    /// Status after the last phase.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.session.stats().snapshot()
    }

    /// Clear statistics.
    pub fn reset_stats(&mut self) {
        self.session.reset_stats();
    }

    /// Frame counters.
    pub fn counters(&self) -> FrameCounters {
        self.session.counters()
    }

    /// Link state.
    pub fn link_state(&self) -> LinkState {
        self.session.link_state()
    }

    /// Payload visible to the application.
    pub fn received_payload(&self) -> &[u8] {
        self.session.received_payload().as_bytes()
    }

    /// Protocol state.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Connection manager.
    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    /// Settings in use.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Release the transport.
    pub fn close(&mut self) {
        self.connection.close();
        self.status = StatusCode::Idle;
    }

    /// Take the transport handle, e.g. to pass it to a restarted engine.
    pub fn into_handle(self) -> TransportHandle<T> {
        self.connection.into_handle()
    }
}

/// An engine whose receive phase has run this cycle.
#[must_use = "a polled engine must be flushed to send this cycle's frame"]
#[derive(Debug)]
pub struct Polled<'a, T: Transport> {
    engine: &'a mut Engine<T>,
    received: usize,
    accepted: usize,
    link: Option<LinkEvent>,
}

impl<T: Transport> Polled<'_, T> {
    /// Send phase of the cycle.
    ///
    /// Composes and sends one frame unless less than the send interval has
    /// passed since the last one. Returns the resulting status.
    pub fn flush<S: PayloadSource + ?Sized>(self, now: Instant, source: &mut S) -> StatusCode {
        self.engine.flush(now, source)
    }

    /// Datagrams read in this poll.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Frames accepted in this poll.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    /// Link transition observed in this poll.
    pub fn link_event(&self) -> Option<LinkEvent> {
        self.link
    }

    /// Status after the receive phase.
    pub fn status(&self) -> StatusCode {
        self.engine.status
    }
}
