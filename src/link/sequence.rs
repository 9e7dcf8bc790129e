//! Sequence tracking.
//!
//! Each endpoint keeps an 8-bit outgoing counter and the window of partner
//! sequence numbers ending at the last accepted one. Inbound numbers are
//! classified by their signed wraparound distance from the window head:
//!
//! ```text
//!   d = (seq - head) mod 256, mapped into [-128, 127]
//!
//!   d == 0           Duplicate
//!   -127 ..= -1      Stale (already superseded)
//!   d == 1           Accept
//!   2 ..= 127        Discontinuity(d - 1), accepted
//!   d == -128        Resync (antipode: direction is ambiguous)
//! ```
//!
//! After [`SequenceTracker::invalidate`] (called when the link is declared
//! down) the next non-duplicate number is classified `Resync` and adopted as
//! the new seed, so a restarted partner does not produce a burst of false
//! loss.

use crate::core::{SEQUENCE_SPACE, SEQUENCE_WINDOW};

/// Classification of an inbound partner sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqVerdict {
    /// Next in order (or the first ever seen).
    Accept,
    /// Same as the last accepted number.
    Duplicate,
    /// Behind the last accepted number.
    Stale,
    /// Accepted, with this many numbers missing before it.
    Discontinuity(u8),
    /// Accepted as a new seed; gap of unknown size.
    Resync,
}

impl SeqVerdict {
    /// Check if the frame is accepted and its payload applied.
    pub fn is_accepted(self) -> bool {
        matches!(
            self,
            SeqVerdict::Accept | SeqVerdict::Discontinuity(_) | SeqVerdict::Resync
        )
    }

    /// Number of partner frames known to be lost.
    pub fn lost(self) -> u8 {
        match self {
            SeqVerdict::Discontinuity(lost) => lost,
            _ => 0,
        }
    }
}

// Forward distances (1..=127) and backward ones must never overlap.
const _: () = assert!(SEQUENCE_WINDOW * 2 == SEQUENCE_SPACE && SEQUENCE_WINDOW <= 128);

/// Bitmap of which of the last 128 partner numbers were received.
///
/// Bit `i` stands for `head - i`. The window always covers exactly the 128
/// numbers ending at `head`, in wraparound order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceWindow {
    head: u8,
    bits: u128,
}

impl SequenceWindow {
    /// Window size in sequence numbers.
    pub const WIDTH: usize = SEQUENCE_WINDOW;

    /// Most recent accepted number.
    pub fn head(&self) -> u8 {
        self.head
    }

    /// Check if `seq` was received and still lies in the window.
    pub fn contains(&self, seq: u8) -> bool {
        let offset = self.head.wrapping_sub(seq) as usize;
        offset < Self::WIDTH && (self.bits >> offset) & 1 == 1
    }

    /// Number of received frames within the window.
    pub fn received(&self) -> u32 {
        self.bits.count_ones()
    }

    /// Number of missing frames within the window, counted from the seed.
    pub fn missing(&self) -> u32 {
        if self.bits == 0 {
            return 0;
        }
        let span = Self::WIDTH as u32 - self.bits.leading_zeros();
        span - self.received()
    }

    fn seed(&mut self, seq: u8) {
        self.head = seq;
        self.bits = 1;
    }

    fn advance(&mut self, distance: u8) {
        let distance = distance as u32;
        self.bits = if distance as usize >= Self::WIDTH {
            1
        } else {
            (self.bits << distance) | 1
        };
        self.head = self.head.wrapping_add(distance as u8);
    }
}

/// Local and partner sequence state of one connection.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    local: u8,
    window: SequenceWindow,
    seeded: bool,
    resync_pending: bool,
}

impl SequenceTracker {
    /// Create an unseeded tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a partner sequence number and update state if accepted.
    pub fn classify(&mut self, seq: u8) -> SeqVerdict {
        if !self.seeded {
            self.window.seed(seq);
            self.seeded = true;
            return SeqVerdict::Accept;
        }

        let distance = seq.wrapping_sub(self.window.head) as i8;
        if distance == 0 {
            return SeqVerdict::Duplicate;
        }
        if self.resync_pending || distance == i8::MIN {
            self.window.seed(seq);
            self.resync_pending = false;
            return SeqVerdict::Resync;
        }
        if distance < 0 {
            return SeqVerdict::Stale;
        }

        self.window.advance(distance as u8);
        match distance {
            1 => SeqVerdict::Accept,
            d => SeqVerdict::Discontinuity(d as u8 - 1),
        }
    }

    /// Advance the local counter and return the new value.
    pub fn next_local_seq(&mut self) -> u8 {
        self.local = self.local.wrapping_add(1);
        self.local
    }

    /// Last local sequence number handed out.
    pub fn local_seq(&self) -> u8 {
        self.local
    }

    /// Last accepted partner number, if any. This is the feedback value.
    pub fn last_accepted(&self) -> Option<u8> {
        self.seeded.then_some(self.window.head)
    }

    /// Feedback byte for the next outgoing frame.
    pub fn feedback(&self) -> u8 {
        self.window.head
    }

    /// Check if a partner number has been accepted yet.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Check if the next number will be adopted as a new seed.
    pub fn is_resync_pending(&self) -> bool {
        self.resync_pending
    }

    /// Distrust the current window; the next new number re-seeds it.
    pub fn invalidate(&mut self) {
        if self.seeded {
            self.resync_pending = true;
        }
    }

    /// Partner window.
    pub fn window(&self) -> &SequenceWindow {
        &self.window
    }
}
