//! Statistics engine.
//!
//! Turns send and accept events into tuning signals:
//!
//! - mean send and receive intervals over a trailing window, and their
//!   jitter (sample standard deviation)
//! - round-trip time, measured when the partner echoes one of our sequence
//!   numbers in its feedback field, smoothed per RFC 6298
//! - partner loss (sequence gaps) and feedback loss (gaps in the echoed
//!   stream)
//!
//! Counters only grow until [`Statistics::reset`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::{RTT_RETENTION, SEQUENCE_SPACE};

use super::sequence::SeqVerdict;

const _: () = assert!(RTT_RETENTION <= SEQUENCE_SPACE / 2);

/// RFC 6298 smoothing factors.
mod constants {
    /// Alpha for SRTT smoothing (1/8).
    pub const SRTT_ALPHA: f64 = 0.125;

    /// Beta for RTTVAR smoothing (1/4).
    pub const RTTVAR_BETA: f64 = 0.25;

    /// Variance multiplier.
    pub const K: u32 = 4;
}

/// Which event produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// A frame was sent.
    Sent,
    /// A partner frame was accepted.
    Received,
}

/// One entry of the sample history.
///
/// Records the sequence state as it was right after the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSample {
    /// When the event happened.
    pub timestamp: Instant,
    /// Event type.
    pub kind: SampleKind,
    /// Last local sequence number sent.
    pub own_seq: u8,
    /// Last accepted partner sequence number.
    pub partner_seq: u8,
    /// Last feedback value received from the partner.
    pub feedback_seq: u8,
}

/// Point-in-time copy of the aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Mean time between our sends.
    pub avg_own_interval: Duration,
    /// Mean time between accepted partner frames.
    pub avg_partner_interval: Duration,
    /// Spread of our send intervals.
    pub own_jitter: Duration,
    /// Spread of partner arrival intervals.
    pub partner_jitter: Duration,
    /// Most recent round-trip sample.
    pub last_rtt: Option<Duration>,
    /// Smoothed round-trip time.
    pub smoothed_rtt: Option<Duration>,
    /// Round-trip variance.
    pub rtt_variance: Option<Duration>,
    /// Partner frames lost (sum of sequence gaps).
    pub total_partner_lost_packets: u64,
    /// Gaps in the feedback stream.
    pub total_feedback_lost_packets: u64,
    /// Times the partner sequence was re-seeded.
    pub resync_events: u64,
    /// Frames sent.
    pub frames_sent: u64,
    /// Partner frames accepted.
    pub frames_accepted: u64,
}

impl StatsSnapshot {
    /// A watchdog interval that tolerates the observed arrival jitter.
    ///
    /// Three mean intervals or mean plus four deviations, whichever is
    /// larger. `None` until at least one interval has been measured.
    pub fn recommended_watchdog_interval(&self) -> Option<Duration> {
        if self.avg_partner_interval.is_zero() {
            return None;
        }
        let by_mean = self.avg_partner_interval * 3;
        let by_jitter = self.avg_partner_interval + self.partner_jitter * constants::K;
        Some(by_mean.max(by_jitter))
    }

    /// Fraction of partner frames lost, in `[0, 1]`.
    pub fn partner_loss_ratio(&self) -> f64 {
        let total = self.frames_accepted + self.total_partner_lost_packets;
        if total == 0 {
            return 0.0;
        }
        self.total_partner_lost_packets as f64 / total as f64
    }
}

/// Trailing window of intervals between consecutive events.
#[derive(Debug, Clone)]
struct IntervalRing {
    capacity: usize,
    last_at: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl IntervalRing {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            last_at: None,
            intervals: VecDeque::with_capacity(capacity),
        }
    }

    fn mark(&mut self, at: Instant) {
        if let Some(last) = self.last_at {
            if self.intervals.len() == self.capacity {
                self.intervals.pop_front();
            }
            self.intervals.push_back(at.saturating_duration_since(last));
        }
        self.last_at = Some(at);
    }

    /// Start a new chain without recording the gap.
    fn restart(&mut self, at: Instant) {
        self.last_at = Some(at);
    }

    fn mean(&self) -> Duration {
        if self.intervals.is_empty() {
            return Duration::ZERO;
        }
        self.intervals.iter().sum::<Duration>() / self.intervals.len() as u32
    }

    fn std_dev(&self) -> Duration {
        let n = self.intervals.len();
        if n < 2 {
            return Duration::ZERO;
        }
        let mean = self.mean().as_secs_f64();
        let sum_sq: f64 = self
            .intervals
            .iter()
            .map(|d| (d.as_secs_f64() - mean).powi(2))
            .sum();
        Duration::from_secs_f64((sum_sq / (n - 1) as f64).sqrt())
    }
}

/// RFC 6298 smoothed round-trip estimator.
#[derive(Debug, Clone, Default)]
struct RttEstimator {
    /// Smoothed RTT in seconds.
    srtt: f64,
    /// RTT variance in seconds.
    rttvar: f64,
    initialized: bool,
}

impl RttEstimator {
    fn update(&mut self, sample: Duration) {
        let sample = sample.as_secs_f64();
        if !self.initialized {
            self.srtt = sample;
            self.rttvar = sample / 2.0;
            self.initialized = true;
            return;
        }
        self.rttvar = (1.0 - constants::RTTVAR_BETA) * self.rttvar
            + constants::RTTVAR_BETA * (self.srtt - sample).abs();
        self.srtt = (1.0 - constants::SRTT_ALPHA) * self.srtt + constants::SRTT_ALPHA * sample;
    }

    fn srtt(&self) -> Option<Duration> {
        self.initialized.then(|| Duration::from_secs_f64(self.srtt))
    }

    fn rttvar(&self) -> Option<Duration> {
        self.initialized.then(|| Duration::from_secs_f64(self.rttvar))
    }
}

/// Statistics engine for one connection.
#[derive(Debug, Clone)]
pub struct Statistics {
    window: usize,
    samples: VecDeque<StatsSample>,
    own: IntervalRing,
    partner: IntervalRing,
    /// Sent sequence numbers awaiting an echo, oldest first.
    awaiting_echo: VecDeque<(u8, Instant)>,
    rtt: RttEstimator,
    last_rtt: Option<Duration>,
    own_seq: u8,
    partner_seq: u8,
    last_feedback: Option<u8>,
    partner_lost: u64,
    feedback_lost: u64,
    resyncs: u64,
    sent: u64,
    accepted: u64,
}

impl Statistics {
    /// Create an engine averaging over the last `window` intervals.
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            own: IntervalRing::new(window),
            partner: IntervalRing::new(window),
            awaiting_echo: VecDeque::with_capacity(RTT_RETENTION),
            rtt: RttEstimator::default(),
            last_rtt: None,
            own_seq: 0,
            partner_seq: 0,
            last_feedback: None,
            partner_lost: 0,
            feedback_lost: 0,
            resyncs: 0,
            sent: 0,
            accepted: 0,
        }
    }

    /// Record a sent frame carrying local sequence `seq`.
    pub fn record_send(&mut self, seq: u8, at: Instant) {
        self.own.mark(at);
        self.sent += 1;
        self.own_seq = seq;

        if self.awaiting_echo.len() == RTT_RETENTION {
            self.awaiting_echo.pop_front();
        }
        self.awaiting_echo.push_back((seq, at));

        self.push_sample(SampleKind::Sent, at);
    }

    /// Record a classified partner frame.
    ///
    /// Rejected frames are ignored. Returns a round-trip sample when the
    /// feedback value echoes a sequence number we are still tracking.
    pub fn record_receive(
        &mut self,
        partner_seq: u8,
        feedback_seq: u8,
        verdict: SeqVerdict,
        at: Instant,
    ) -> Option<Duration> {
        if !verdict.is_accepted() {
            return None;
        }
        self.accepted += 1;
        self.partner_seq = partner_seq;

        if verdict == SeqVerdict::Resync {
            self.resyncs += 1;
            self.partner.restart(at);
        } else {
            self.partner.mark(at);
            self.partner_lost += u64::from(verdict.lost());
            if let Some(previous) = self.last_feedback {
                let gap = feedback_seq.wrapping_sub(previous);
                if (2..128).contains(&gap) {
                    self.feedback_lost += u64::from(gap - 1);
                }
            }
        }
        self.last_feedback = Some(feedback_seq);

        let rtt = self.match_echo(feedback_seq, at);
        self.push_sample(SampleKind::Received, at);
        rtt
    }

    fn match_echo(&mut self, feedback_seq: u8, at: Instant) -> Option<Duration> {
        let position = self
            .awaiting_echo
            .iter()
            .position(|&(seq, _)| seq == feedback_seq)?;
        let (_, sent_at) = self.awaiting_echo[position];
        // Anything sent before the echoed frame can no longer be matched
        self.awaiting_echo.drain(..=position);

        let rtt = at.saturating_duration_since(sent_at);
        self.rtt.update(rtt);
        self.last_rtt = Some(rtt);
        Some(rtt)
    }

    fn push_sample(&mut self, kind: SampleKind, at: Instant) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(StatsSample {
            timestamp: at,
            kind,
            own_seq: self.own_seq,
            partner_seq: self.partner_seq,
            feedback_seq: self.last_feedback.unwrap_or(0),
        });
    }

    /// Copy of the current aggregates.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            avg_own_interval: self.own.mean(),
            avg_partner_interval: self.partner.mean(),
            own_jitter: self.own.std_dev(),
            partner_jitter: self.partner.std_dev(),
            last_rtt: self.last_rtt,
            smoothed_rtt: self.rtt.srtt(),
            rtt_variance: self.rtt.rttvar(),
            total_partner_lost_packets: self.partner_lost,
            total_feedback_lost_packets: self.feedback_lost,
            resync_events: self.resyncs,
            frames_sent: self.sent,
            frames_accepted: self.accepted,
        }
    }

    /// Clear all aggregates and history.
    pub fn reset(&mut self) {
        *self = Self::new(self.window);
    }

    /// Recent events, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &StatsSample> {
        self.samples.iter()
    }

    /// Number of sent frames still awaiting an echo.
    pub fn awaiting_echo(&self) -> usize {
        self.awaiting_echo.len()
    }

    /// Trailing window length.
    pub fn window(&self) -> usize {
        self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_empty_snapshot() {
        let stats = Statistics::new(8);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot, StatsSnapshot::default());
        assert_eq!(snapshot.recommended_watchdog_interval(), None);
        assert_eq!(snapshot.partner_loss_ratio(), 0.0);
    }

    #[test]
    fn test_send_intervals() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        for (i, seq) in (1..=5u8).enumerate() {
            stats.record_send(seq, start + ms(5 * i as u64));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frames_sent, 5);
        assert_eq!(snapshot.avg_own_interval, ms(5));
        assert_eq!(snapshot.own_jitter, Duration::ZERO);
    }

    #[test]
    fn test_jitter_is_sample_std_dev() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        // Intervals 2ms, 4ms: mean 3ms, sample std dev sqrt(2) ms
        for (at, seq) in [(0, 1u8), (2, 2), (6, 3)] {
            stats.record_receive(seq, 0, SeqVerdict::Accept, start + ms(at));
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.avg_partner_interval, ms(3));
        let jitter_us = snapshot.partner_jitter.as_secs_f64() * 1e6;
        assert!((jitter_us - 1414.2).abs() < 1.0, "jitter {jitter_us}us");
    }

    #[test]
    fn test_window_bounds_history() {
        let start = Instant::now();
        let mut stats = Statistics::new(4);
        // Early slow intervals fall out of the window
        stats.record_send(1, start);
        stats.record_send(2, start + ms(100));
        for i in 0..4u64 {
            stats.record_send(3 + i as u8, start + ms(101 + i));
        }

        assert_eq!(stats.snapshot().avg_own_interval, ms(1));
        assert_eq!(stats.samples().count(), 4);
    }

    #[test]
    fn test_rtt_only_on_exact_echo() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_send(1, start);
        stats.record_send(2, start + ms(5));

        // Feedback for a value never sent yields nothing
        assert_eq!(stats.record_receive(10, 0, SeqVerdict::Accept, start + ms(6)), None);
        assert_eq!(stats.snapshot().last_rtt, None);

        let rtt = stats.record_receive(11, 2, SeqVerdict::Accept, start + ms(8));
        assert_eq!(rtt, Some(ms(3)));
        assert_eq!(stats.snapshot().last_rtt, Some(ms(3)));
        assert_eq!(stats.snapshot().smoothed_rtt, Some(ms(3)));

        // Echo of an older number is no longer tracked
        assert_eq!(stats.record_receive(12, 1, SeqVerdict::Accept, start + ms(9)), None);
        assert_eq!(stats.awaiting_echo(), 0);
    }

    #[test]
    fn test_repeated_echo_measured_once() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_send(7, start);

        assert!(stats.record_receive(1, 7, SeqVerdict::Accept, start + ms(2)).is_some());
        assert!(stats.record_receive(2, 7, SeqVerdict::Accept, start + ms(3)).is_none());
        assert_eq!(stats.snapshot().last_rtt, Some(ms(2)));
    }

    #[test]
    fn test_rtt_never_negative() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_send(3, start + ms(10));

        // Clock reads earlier than the send: saturates to zero
        let rtt = stats.record_receive(1, 3, SeqVerdict::Accept, start);
        assert_eq!(rtt, Some(Duration::ZERO));
    }

    #[test]
    fn test_unechoed_entries_evicted() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        for i in 0..(RTT_RETENTION as u64 + 10) {
            stats.record_send(i as u8, start + ms(i));
        }
        assert_eq!(stats.awaiting_echo(), RTT_RETENTION);

        // Sequence 0 was sent first and has been evicted
        assert_eq!(stats.record_receive(1, 0, SeqVerdict::Accept, start + ms(500)), None);
    }

    #[test]
    fn test_partner_loss_from_discontinuity() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_receive(9, 0, SeqVerdict::Accept, start);
        stats.record_receive(11, 0, SeqVerdict::Discontinuity(1), start + ms(1));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_partner_lost_packets, 1);
        assert_eq!(snapshot.frames_accepted, 2);
        assert!((snapshot.partner_loss_ratio() - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_frames_ignored() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_send(1, start);
        stats.record_receive(9, 0, SeqVerdict::Accept, start);

        assert_eq!(stats.record_receive(9, 1, SeqVerdict::Duplicate, start + ms(1)), None);
        assert_eq!(stats.record_receive(8, 1, SeqVerdict::Stale, start + ms(1)), None);
        assert_eq!(stats.snapshot().frames_accepted, 1);
        assert_eq!(stats.awaiting_echo(), 1);
    }

    #[test]
    fn test_feedback_loss() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        let feedback = [1u8, 2, 2, 5, 250, 254, 3];
        for (i, fb) in feedback.iter().enumerate() {
            stats.record_receive(i as u8, *fb, SeqVerdict::Accept, start + ms(i as u64));
        }
        // 2->5 loses 2, 5->250 is not a forward gap, 250->254 loses 3, 254->3 loses 4
        assert_eq!(stats.snapshot().total_feedback_lost_packets, 9);
    }

    #[test]
    fn test_resync_counts_no_loss() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_receive(10, 0, SeqVerdict::Accept, start);
        stats.record_receive(11, 0, SeqVerdict::Accept, start + ms(1));
        stats.record_receive(200, 90, SeqVerdict::Resync, start + ms(900));

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.resync_events, 1);
        assert_eq!(snapshot.total_partner_lost_packets, 0);
        assert_eq!(snapshot.total_feedback_lost_packets, 0);
        // The outage gap is not an interval
        assert_eq!(snapshot.avg_partner_interval, ms(1));
    }

    #[test]
    fn test_counters_monotonic_until_reset() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        let mut previous = stats.snapshot();
        for i in 0..600u64 {
            let seq = (i * 2) as u8;
            let verdict = if i == 0 {
                SeqVerdict::Accept
            } else {
                SeqVerdict::Discontinuity(1)
            };
            stats.record_send(i as u8, start + ms(i));
            stats.record_receive(seq, i as u8, verdict, start + ms(i));

            let current = stats.snapshot();
            assert!(current.total_partner_lost_packets >= previous.total_partner_lost_packets);
            assert!(current.total_feedback_lost_packets >= previous.total_feedback_lost_packets);
            assert!(current.frames_sent > previous.frames_sent);
            previous = current;
        }
        assert_eq!(previous.total_partner_lost_packets, 599);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(stats.samples().count(), 0);
    }

    #[test]
    fn test_samples_track_state() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        stats.record_send(4, start);
        stats.record_receive(20, 4, SeqVerdict::Accept, start + ms(1));

        let samples: Vec<_> = stats.samples().copied().collect();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].kind, SampleKind::Sent);
        assert_eq!(samples[1].kind, SampleKind::Received);
        assert_eq!(samples[1].own_seq, 4);
        assert_eq!(samples[1].partner_seq, 20);
        assert_eq!(samples[1].feedback_seq, 4);
    }

    #[test]
    fn test_recommended_watchdog() {
        let start = Instant::now();
        let mut stats = Statistics::new(8);
        for i in 0..5u64 {
            stats.record_receive(i as u8, 0, SeqVerdict::Accept, start + ms(2 * i));
        }
        assert_eq!(stats.snapshot().recommended_watchdog_interval(), Some(ms(6)));
    }
}
