//! Protocol constants.
//!
//! Wire-level values are fixed by the protocol and MUST NOT be changed.
//! `DEFAULT_*` values are only used when a configuration omits a field.

use std::time::Duration;

// =============================================================================
// WIRE FORMAT
// =============================================================================

/// Header size: sequence byte + feedback byte.
pub const HEADER_SIZE: usize = 2;

/// Offset of the sequence number in a frame.
pub const SEQUENCE_OFFSET: usize = 0;

/// Offset of the feedback sequence number in a frame.
pub const FEEDBACK_OFFSET: usize = 1;

/// Largest payload a frame may carry (one datagram under common MTU budgets).
pub const MAX_PAYLOAD_SIZE: usize = 1461;

/// Largest datagram a session can produce.
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

// =============================================================================
// SEQUENCE SPACE
// =============================================================================

/// Number of distinct sequence values (8-bit counter).
pub const SEQUENCE_SPACE: usize = 256;

/// Width of the partner sequence window (half the sequence space).
pub const SEQUENCE_WINDOW: usize = 128;

/// Maximum number of own sequence numbers retained for RTT matching.
///
/// Kept below the sequence space so a retained value is never aliased by a
/// newer send of the same value.
pub const RTT_RETENTION: usize = 128;

// =============================================================================
// CYCLE LIMITS
// =============================================================================

/// Upper bound of datagrams ingested by a single `poll`.
pub const MAX_DATAGRAMS_PER_POLL: usize = 64;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default local UDP port.
pub const DEFAULT_LOCAL_PORT: u16 = 2000;

/// Default remote UDP port.
pub const DEFAULT_REMOTE_PORT: u16 = 2000;

/// Default remote address.
pub const DEFAULT_REMOTE_ADDRESS: &str = "127.0.0.1";

/// Default send interval.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(5);

/// Default watchdog interval.
pub const DEFAULT_WATCHDOG_INTERVAL: Duration = Duration::from_millis(30);

/// Default delay between recovery attempts after a transport fault.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// Default application payload size.
pub const DEFAULT_PAYLOAD_SIZE: usize = 20;

/// Default number of interval samples kept by the statistics engine.
pub const DEFAULT_STATS_WINDOW: usize = 64;
