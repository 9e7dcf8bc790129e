//! Error types for Netflux.

use thiserror::Error;

use crate::transport::TransportError;

use super::status::StatusCode;

/// Errors detected while validating a configuration.
///
/// These are fatal to the connection instance being built: no transport
/// operation is attempted until the configuration is corrected.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Remote address is not a valid IP address.
    #[error("invalid remote address: {0}")]
    InvalidAddress(String),

    /// A port is zero where a concrete port is required.
    #[error("invalid port: {0}")]
    InvalidPort(&'static str),

    /// Payload size exceeds the configured or protocol maximum.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Requested size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// An interval is zero.
    #[error("invalid interval: {0} must be non-zero")]
    InvalidInterval(&'static str),

    /// Statistics window too small to produce intervals.
    #[error("invalid statistics window: {0} (must be at least 2)")]
    InvalidWindow(usize),

    /// Configuration text could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration file could not be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Status code reported for this configuration error.
    pub fn status(&self) -> StatusCode {
        match self {
            ConfigError::InvalidAddress(_) | ConfigError::InvalidPort(_) => {
                StatusCode::InvalidAddress
            }
            ConfigError::PayloadTooLarge { .. } => StatusCode::PayloadTooLarge,
            ConfigError::InvalidInterval(_)
            | ConfigError::InvalidWindow(_)
            | ConfigError::Parse(_)
            | ConfigError::Io(_) => StatusCode::InvalidConfig,
        }
    }
}

/// Top-level Netflux errors.
#[derive(Debug, Error)]
pub enum NetfluxError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
