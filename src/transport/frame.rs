//! Frame encoding and decoding.
//!
//! Wire format:
//! ```text
//! +----------+----------+------------------------------+
//! | Sequence | Feedback | Payload                      |
//! | 1 byte   | 1 byte   | payload_size bytes (fixed)   |
//! +----------+----------+------------------------------+
//! ```
//!
//! The payload length is agreed out of band and is the same for every frame
//! of a session. Multi-byte fields inside the payload use one fixed byte
//! order chosen by the application; it is never negotiated on the wire.

use thiserror::Error;

use crate::core::{FEEDBACK_OFFSET, HEADER_SIZE, MAX_PAYLOAD_SIZE, SEQUENCE_OFFSET};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram is shorter than the session frame size.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Datagram length differs from the session frame size.
    #[error("frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Session frame size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Payload exceeds the maximum payload size.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Payload size.
        size: usize,
        /// Maximum allowed.
        max: usize,
    },
}

/// An owned frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender's own sequence number.
    pub sequence: u8,
    /// Last partner sequence number the sender accepted.
    pub feedback: u8,
    /// Application payload.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame.
    pub fn new(sequence: u8, feedback: u8, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            feedback,
            payload,
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.push(self.sequence);
        buf.push(self.feedback);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse a frame whose payload may be anything up to `max_payload` bytes.
    pub fn decode(bytes: &[u8], max_payload: usize) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() > max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: max_payload,
            });
        }
        Ok(Self {
            sequence: bytes[SEQUENCE_OFFSET],
            feedback: bytes[FEEDBACK_OFFSET],
            payload: payload.to_vec(),
        })
    }
}

/// A frame borrowed from a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'a> {
    /// Sender's own sequence number.
    pub sequence: u8,
    /// Last partner sequence number the sender accepted.
    pub feedback: u8,
    /// Application payload.
    pub payload: &'a [u8],
}

impl FrameView<'_> {
    /// Copy into an owned [`Frame`].
    pub fn to_owned_frame(&self) -> Frame {
        Frame::new(self.sequence, self.feedback, self.payload.to_vec())
    }
}

/// Session frame codec with a fixed payload size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    payload_size: usize,
    max_payload_size: usize,
}

impl FrameCodec {
    /// Create a codec for `payload_size` bytes per frame.
    pub fn new(payload_size: usize, max_payload_size: usize) -> Result<Self, FrameError> {
        let max = max_payload_size.min(MAX_PAYLOAD_SIZE);
        if payload_size > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload_size,
                max,
            });
        }
        Ok(Self {
            payload_size,
            max_payload_size: max,
        })
    }

    /// Agreed payload size.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Maximum payload size.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Size of every frame of this session.
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.payload_size
    }

    /// Encode a frame into `out`, replacing its contents.
    pub fn encode_into(
        &self,
        sequence: u8,
        feedback: u8,
        payload: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), FrameError> {
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        if payload.len() != self.payload_size {
            return Err(FrameError::LengthMismatch {
                expected: self.frame_size(),
                actual: HEADER_SIZE + payload.len(),
            });
        }
        out.clear();
        out.reserve(self.frame_size());
        out.push(sequence);
        out.push(feedback);
        out.extend_from_slice(payload);
        Ok(())
    }

    /// Decode a datagram. The datagram must be exactly one session frame.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<FrameView<'a>, FrameError> {
        let expected = self.frame_size();
        if bytes.len() < expected {
            return Err(FrameError::TooShort {
                expected,
                actual: bytes.len(),
            });
        }
        if bytes.len() > HEADER_SIZE + self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: bytes.len() - HEADER_SIZE,
                max: self.max_payload_size,
            });
        }
        if bytes.len() != expected {
            return Err(FrameError::LengthMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        Ok(FrameView {
            sequence: bytes[SEQUENCE_OFFSET],
            feedback: bytes[FEEDBACK_OFFSET],
            payload: &bytes[HEADER_SIZE..],
        })
    }
}
