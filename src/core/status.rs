//! Status codes exposed to the caller.

use std::fmt;

/// Status of a connection, as surfaced after every engine operation.
///
/// Codes are stable: `code()` values may be mapped onto PLC status words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusCode {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// Transport is being (re)bound.
    Initializing,
    /// Outgoing payload is being composed.
    PreparingData,
    /// A datagram is being handed to the transport.
    Sending,
    /// The last send completed.
    SendComplete,
    /// Inbound datagrams were processed.
    Receiving,
    /// Binding the local port failed.
    BindError,
    /// Sending a datagram failed.
    SendError,
    /// Receiving a datagram failed.
    ReceiveError,
    /// A payload exceeded the agreed size.
    PayloadTooLarge,
    /// The remote address or a port is invalid.
    InvalidAddress,
    /// A malformed frame was dropped.
    MalformedFrame,
    /// No frame was accepted within the watchdog interval.
    WatchdogTimeout,
    /// Waiting out the retry interval after a transport fault.
    RecoveryInProgress,
    /// The configuration was rejected.
    InvalidConfig,
}

impl StatusCode {
    /// Numeric code.
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Idle => 0,
            StatusCode::Initializing => 1,
            StatusCode::PreparingData => 2,
            StatusCode::Sending => 3,
            StatusCode::SendComplete => 4,
            StatusCode::Receiving => 5,
            StatusCode::BindError => 100,
            StatusCode::SendError => 101,
            StatusCode::ReceiveError => 102,
            StatusCode::PayloadTooLarge => 103,
            StatusCode::InvalidAddress => 104,
            StatusCode::MalformedFrame => 105,
            StatusCode::WatchdogTimeout => 106,
            StatusCode::RecoveryInProgress => 107,
            StatusCode::InvalidConfig => 108,
        }
    }

    /// Whether this code reports a fault.
    pub fn is_error(self) -> bool {
        self.code() >= 100
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}
