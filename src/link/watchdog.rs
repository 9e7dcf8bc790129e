//! Link supervision.
//!
//! ```text
//! Idle ──accept──▶ Up ──silence > interval──▶ Down
//!                   ▲                           │
//!                   └─────────accept────────────┘
//! ```
//!
//! The watchdog compares elapsed time against the interval, so it tolerates
//! irregular evaluation. It never comes back up on its own.

use std::time::{Duration, Instant};

/// Health of the link as seen by the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    /// No frame accepted yet.
    #[default]
    Idle,
    /// Frames arriving within the watchdog interval.
    Up,
    /// Watchdog interval elapsed with no accepted frame.
    Down,
}

/// A transition of the link state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkEvent {
    /// The link came up (first frame or recovery).
    Up,
    /// The link went down.
    Down,
}

/// Watchdog over accepted frames.
#[derive(Debug, Clone)]
pub struct Watchdog {
    interval: Duration,
    keep_last_values: bool,
    state: LinkState,
    last_accepted_at: Option<Instant>,
}

impl Watchdog {
    /// Create a watchdog in the `Idle` state.
    pub fn new(interval: Duration, keep_last_values: bool) -> Self {
        Self {
            interval,
            keep_last_values,
            state: LinkState::Idle,
            last_accepted_at: None,
        }
    }

    /// Record an accepted frame.
    ///
    /// Returns [`LinkEvent::Up`] if the link was not already up.
    pub fn on_accept(&mut self, now: Instant) -> Option<LinkEvent> {
        self.last_accepted_at = Some(now);
        if self.state == LinkState::Up {
            return None;
        }
        self.state = LinkState::Up;
        Some(LinkEvent::Up)
    }

    /// Check for a timeout.
    ///
    /// Returns [`LinkEvent::Down`] exactly once per outage, when the time
    /// since the last accepted frame exceeds the interval.
    pub fn evaluate(&mut self, now: Instant) -> Option<LinkEvent> {
        if self.state != LinkState::Up {
            return None;
        }
        let last = self.last_accepted_at?;
        if now.saturating_duration_since(last) > self.interval {
            self.state = LinkState::Down;
            return Some(LinkEvent::Down);
        }
        None
    }

    /// Instant after which the link will be declared down, while it is up.
    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            LinkState::Up => self.last_accepted_at.map(|at| at + self.interval),
            _ => None,
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Check if the link is up.
    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    /// When the last frame was accepted.
    pub fn last_accepted_at(&self) -> Option<Instant> {
        self.last_accepted_at
    }

    /// Configured interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the visible payload survives a timeout.
    pub fn keep_last_values(&self) -> bool {
        self.keep_last_values
    }
}

/// The partner payload as the application sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPayload {
    bytes: Vec<u8>,
    valid: bool,
}

impl ReceivedPayload {
    /// Create a zeroed slot of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            valid: false,
        }
    }

    /// Replace the contents with an accepted payload.
    pub fn store(&mut self, payload: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(payload);
        self.valid = true;
    }

    /// Apply the retention policy on link loss.
    ///
    /// Returns `true` if the contents were cleared.
    pub fn on_link_lost(&mut self, keep: bool) -> bool {
        if keep {
            return false;
        }
        self.bytes.fill(0);
        self.valid = false;
        true
    }

    /// Current contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Check if the contents come from a frame rather than a reset.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Slot size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the slot holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
