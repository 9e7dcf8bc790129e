//! Protocol state of one connection, without I/O.
//!
//! A [`Session`] takes received datagrams and produces outgoing ones. It
//! never touches a socket, so both drivers (the cooperative
//! [`Engine`](crate::engine::Engine) and the concurrent `Node`) share it.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::core::{PayloadSink, PayloadSource};
use crate::transport::{FrameCodec, FrameError};

use super::sequence::{SeqVerdict, SequenceTracker};
use super::stats::Statistics;
use super::watchdog::{LinkEvent, LinkState, ReceivedPayload, Watchdog};

/// Per-connection frame counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FrameCounters {
    /// Partner frames accepted.
    pub accepted: u64,
    /// Partner frames rejected as duplicates.
    pub duplicates: u64,
    /// Partner frames rejected as stale.
    pub stale: u64,
    /// Datagrams that were not valid frames.
    pub malformed: u64,
    /// Frames sent.
    pub sent: u64,
    /// Failed sends.
    pub send_errors: u64,
}

impl FrameCounters {
    /// Datagrams received but not applied.
    pub fn rejected(&self) -> u64 {
        self.duplicates + self.stale + self.malformed
    }
}

/// Result of ingesting one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Payload applied.
    Accepted {
        /// Sequence classification.
        verdict: SeqVerdict,
        /// Round-trip sample, if the feedback echoed a tracked number.
        rtt: Option<Duration>,
        /// Link transition caused by this frame.
        link: Option<LinkEvent>,
    },
    /// Valid frame, but a duplicate or stale one.
    Rejected(SeqVerdict),
    /// Not a valid frame.
    Malformed(FrameError),
}

impl IngestOutcome {
    /// Check if the payload was applied.
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// Sans-io protocol state.
#[derive(Debug, Clone)]
pub struct Session {
    codec: FrameCodec,
    tracker: SequenceTracker,
    watchdog: Watchdog,
    stats: Statistics,
    received: ReceivedPayload,
    counters: FrameCounters,
    outgoing: Vec<u8>,
}

impl Session {
    /// Create a session.
    pub fn new(codec: FrameCodec, watchdog: Watchdog, stats_window: usize) -> Self {
        Self {
            codec,
            tracker: SequenceTracker::new(),
            watchdog,
            stats: Statistics::new(stats_window),
            received: ReceivedPayload::new(codec.payload_size()),
            counters: FrameCounters::default(),
            outgoing: vec![0; codec.payload_size()],
        }
    }

    /// Decode, classify and apply one datagram.
    pub fn ingest<K: PayloadSink + ?Sized>(
        &mut self,
        datagram: &[u8],
        now: Instant,
        sink: &mut K,
    ) -> IngestOutcome {
        let frame = match self.codec.decode(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                self.counters.malformed += 1;
                debug!(error = %e, len = datagram.len(), "dropping malformed frame");
                return IngestOutcome::Malformed(e);
            }
        };
        trace!(seq = frame.sequence, feedback = frame.feedback, "frame received");

        let verdict = self.tracker.classify(frame.sequence);
        match verdict {
            SeqVerdict::Duplicate => {
                self.counters.duplicates += 1;
                debug!(seq = frame.sequence, "duplicate frame");
                return IngestOutcome::Rejected(verdict);
            }
            SeqVerdict::Stale => {
                self.counters.stale += 1;
                debug!(
                    seq = frame.sequence,
                    last = self.tracker.feedback(),
                    "stale frame"
                );
                return IngestOutcome::Rejected(verdict);
            }
            SeqVerdict::Discontinuity(lost) => {
                debug!(seq = frame.sequence, lost, "sequence gap");
            }
            SeqVerdict::Resync => {
                debug!(seq = frame.sequence, "partner sequence re-seeded");
            }
            SeqVerdict::Accept => {}
        }

        self.counters.accepted += 1;
        self.received.store(frame.payload);
        sink.consume_incoming_payload(frame.payload);

        let rtt = self
            .stats
            .record_receive(frame.sequence, frame.feedback, verdict, now);
        let link = self.watchdog.on_accept(now);
        if link.is_some() {
            info!(seq = frame.sequence, "link up");
        }

        IngestOutcome::Accepted { verdict, rtt, link }
    }

    /// Evaluate the watchdog and apply the retention policy on timeout.
    pub fn evaluate_watchdog<K: PayloadSink + ?Sized>(
        &mut self,
        now: Instant,
        sink: &mut K,
    ) -> Option<LinkEvent> {
        let event = self.watchdog.evaluate(now)?;
        let keep = self.watchdog.keep_last_values();
        warn!(
            interval_ms = self.watchdog.interval().as_millis() as u64,
            keep_last_values = keep,
            "watchdog timeout, link down"
        );
        self.tracker.invalidate();
        if self.received.on_link_lost(keep) {
            sink.consume_incoming_payload(self.received.as_bytes());
        }
        Some(event)
    }

    /// Encode the next outgoing frame into `out`.
    ///
    /// Fills the payload from `source`, stamps the next local sequence
    /// number and the current feedback value. Returns the sequence number
    /// used. Call [`Session::record_sent`] once the frame is on the wire.
    pub fn compose<S: PayloadSource + ?Sized>(
        &mut self,
        source: &mut S,
        out: &mut Vec<u8>,
    ) -> Result<u8, FrameError> {
        source.produce_outgoing_payload(&mut self.outgoing);
        let seq = self.tracker.local_seq().wrapping_add(1);
        self.codec
            .encode_into(seq, self.tracker.feedback(), &self.outgoing, out)?;
        self.tracker.next_local_seq();
        Ok(seq)
    }

    /// Record a frame that was sent.
    pub fn record_sent(&mut self, seq: u8, now: Instant) {
        self.counters.sent += 1;
        self.stats.record_send(seq, now);
        trace!(seq, "frame sent");
    }

    /// Record a frame that could not be sent.
    pub fn record_send_error(&mut self) {
        self.counters.send_errors += 1;
    }

    /// Frame counters.
    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Statistics engine.
    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Clear statistics. Sequence and link state are kept.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Link state.
    pub fn link_state(&self) -> LinkState {
        self.watchdog.state()
    }

    /// Watchdog.
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Sequence tracker.
    pub fn tracker(&self) -> &SequenceTracker {
        &self.tracker
    }

    /// Payload visible to the application.
    pub fn received_payload(&self) -> &ReceivedPayload {
        &self.received
    }

    /// Frame codec.
    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }
}
