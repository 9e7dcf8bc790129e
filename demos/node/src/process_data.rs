//! Example application record.
//!
//! Twenty bytes, little-endian, the layout both partners agree on:
//!
//! ```text
//! offset  type  field
//!      0  f32   setpoint
//!      4  f32   actual
//!      8  u32   counter
//!     12  u32   mode
//!     16  u32   flags
//! ```

use thiserror::Error;

/// Encoded size of a [`ProcessData`] record.
pub const RECORD_SIZE: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record too short: expected {RECORD_SIZE} bytes, got {0}")]
    TooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessData {
    pub setpoint: f32,
    pub actual: f32,
    pub counter: u32,
    pub mode: u32,
    pub flags: u32,
}

impl ProcessData {
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.setpoint.to_le_bytes());
        out[4..8].copy_from_slice(&self.actual.to_le_bytes());
        out[8..12].copy_from_slice(&self.counter.to_le_bytes());
        out[12..16].copy_from_slice(&self.mode.to_le_bytes());
        out[16..20].copy_from_slice(&self.flags.to_le_bytes());
        out
    }

    /// Write into a payload buffer, truncating or zero-padding to its size.
    pub fn write_to(&self, buf: &mut [u8]) {
        let bytes = self.to_bytes();
        let len = buf.len().min(RECORD_SIZE);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf[len..].fill(0);
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < RECORD_SIZE {
            return Err(RecordError::TooShort(bytes.len()));
        }
        let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
        Ok(Self {
            setpoint: f32::from_le_bytes(word(0)),
            actual: f32::from_le_bytes(word(4)),
            counter: u32::from_le_bytes(word(8)),
            mode: u32::from_le_bytes(word(12)),
            flags: u32::from_le_bytes(word(16)),
        })
    }
}
