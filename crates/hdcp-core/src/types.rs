//! Newtype wrappers for protocol byte fields.
//!
//! These types keep the 5-byte receiver identity and the packed capability
//! fields from being confused with the raw nonce and key arrays they travel
//! next to on the wire.

use core::fmt;

use crate::constants::{RECEIVER_ID_SIZE, RXCAPS_SIZE, TXCAPS_SIZE};

/// Protocol version advertised in the capability fields.
pub const CAPS_VERSION: u8 = 0x02;

/// Helper to write lowercase hex without the `hex` crate.
fn fmt_hex(bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

/// A 5-byte receiver identity, extracted from the receiver certificate and
/// used as the pairing-cache key and topology-list element.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct ReceiverId(pub(crate) [u8; RECEIVER_ID_SIZE]);

impl ReceiverId {
    pub const fn new(bytes: [u8; RECEIVER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; RECEIVER_ID_SIZE] {
        self.0
    }
}

impl AsRef<[u8]> for ReceiverId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for ReceiverId {
    type Error = InvalidLength;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; RECEIVER_ID_SIZE] = bytes.try_into().map_err(|_| InvalidLength {
            expected: RECEIVER_ID_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(&self.0, f)
    }
}

impl fmt::Debug for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReceiverId(")?;
        fmt_hex(&self.0, f)?;
        write!(f, ")")
    }
}

/// Transmitter capability field: `version(1) || reserved(2)`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct TxCaps(pub(crate) [u8; TXCAPS_SIZE]);

impl TxCaps {
    pub const fn new() -> Self {
        Self([CAPS_VERSION, 0x00, 0x00])
    }

    pub const fn from_bytes(bytes: [u8; TXCAPS_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; TXCAPS_SIZE] {
        self.0
    }

    /// The advertised protocol version (first byte).
    pub const fn version(self) -> u8 {
        self.0[0]
    }
}

impl Default for TxCaps {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for TxCaps {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TxCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxCaps(")?;
        fmt_hex(&self.0, f)?;
        write!(f, ")")
    }
}

/// Receiver capability field: `version(1) || reserved(14 bits) || repeater(1 bit)`.
#[derive(Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct RxCaps(pub(crate) [u8; RXCAPS_SIZE]);

impl RxCaps {
    pub const fn new(repeater: bool) -> Self {
        Self([CAPS_VERSION, 0x00, repeater as u8])
    }

    pub const fn from_bytes(bytes: [u8; RXCAPS_SIZE]) -> Self {
        Self(bytes)
    }

    pub const fn to_bytes(self) -> [u8; RXCAPS_SIZE] {
        self.0
    }

    /// The advertised protocol version (first byte).
    pub const fn version(self) -> u8 {
        self.0[0]
    }

    /// Whether the REPEATER bit (bit 0 of the last byte) is set.
    pub const fn is_repeater(self) -> bool {
        self.0[2] & 0x01 != 0
    }
}

impl AsRef<[u8]> for RxCaps {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RxCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RxCaps(")?;
        fmt_hex(&self.0, f)?;
        write!(f, ")")
    }
}

/// Error returned when a byte slice has the wrong length for a newtype.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLength {
    pub expected: usize,
    pub actual: usize,
}

impl fmt::Display for InvalidLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid length: expected {} bytes, got {}",
            self.expected, self.actual
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InvalidLength {}
