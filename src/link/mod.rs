//! Netflux - Link Layer
//!
//! Protocol state of a point-to-point link, free of I/O:
//!
//! - **Sequence tracking**: [`SequenceTracker`] classifies partner sequence
//!   numbers under 8-bit wraparound
//! - **Supervision**: [`Watchdog`] drives the link state and the visible
//!   payload's retention policy
//! - **Statistics**: [`Statistics`] derives intervals, jitter, round-trip time
//!   and loss counts
//! - **Session**: [`Session`] ties them to the frame codec

mod sequence;
mod session;
mod stats;
mod watchdog;

pub use sequence::*;
pub use session::*;
pub use stats::*;
pub use watchdog::*;
