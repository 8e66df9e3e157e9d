//! Error types for the hdcp-core crate.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// The buffer is too short to carry even the fields needed to determine
    /// the expected message length.
    TooShort { min: usize, actual: usize },
    /// The delivered byte count does not exactly match the message's
    /// declared length.
    SizeMismatch { expected: usize, actual: usize },
    /// The first byte is not a known message ID.
    UnknownId(u8),
    /// A stream-manage message declared zero or too many streams.
    InvalidStreamCount(u16),
    /// A receiver-ID list declared more devices than the wire format allows.
    DeviceCountOutOfRange(u8),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::TooShort { min, actual } => {
                write!(
                    f,
                    "message too short: need at least {min} bytes, got {actual}"
                )
            }
            MessageError::SizeMismatch { expected, actual } => {
                write!(
                    f,
                    "message size mismatch: expected {expected} bytes, got {actual}"
                )
            }
            MessageError::UnknownId(id) => write!(f, "unknown message id: 0x{id:02x}"),
            MessageError::InvalidStreamCount(k) => write!(f, "invalid stream count: {k}"),
            MessageError::DeviceCountOutOfRange(n) => {
                write!(f, "device count out of range: {n}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MessageError {}
