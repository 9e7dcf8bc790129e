//! Transport layer error types.
//!
//! Transport faults are never fatal: the connection manager recovers from
//! them locally. Frame errors are protocol violations: the frame is dropped
//! and counted.

use std::io;

use thiserror::Error;

use crate::core::StatusCode;

use super::frame::FrameError;

/// Transport layer errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Frame parsing or composition error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Binding the local port failed.
    #[error("bind failed: {0}")]
    Bind(#[source] io::Error),

    /// Sending a datagram failed.
    #[error("send failed: {0}")]
    Send(#[source] io::Error),

    /// Receiving a datagram failed.
    #[error("receive failed: {0}")]
    Receive(#[source] io::Error),

    /// The transport is not ready; carries the current status.
    #[error("transport not ready: {0}")]
    NotReady(StatusCode),
}

impl TransportError {
    /// Status code reported for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            TransportError::Frame(FrameError::PayloadTooLarge { .. }) => {
                StatusCode::PayloadTooLarge
            }
            TransportError::Frame(_) => StatusCode::MalformedFrame,
            TransportError::Bind(_) => StatusCode::BindError,
            TransportError::Send(_) => StatusCode::SendError,
            TransportError::Receive(_) => StatusCode::ReceiveError,
            TransportError::NotReady(status) => *status,
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
