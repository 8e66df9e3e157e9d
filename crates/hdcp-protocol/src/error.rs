//! Protocol error types.
//!
//! Most handshake failures are handled internally by the engines (reset to
//! the initial state, sticky flag recorded); these errors cover the
//! host-visible operations that can be called at the wrong time or with
//! missing prerequisites.

use hdcp_core::MessageError;
use hdcp_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("engine is not enabled")]
    NotEnabled,

    #[error("no trust anchor loaded")]
    NoTrustAnchor,

    #[error("no public certificate loaded")]
    NoCertificate,

    #[error("no downstream peer present")]
    NoPeer,

    #[error("invalid operation in current state: {0}")]
    InvalidState(&'static str),

    #[error("topology too large: {0} downstream devices")]
    TopologyTooLarge(usize),

    #[error("stream sequence space exhausted")]
    SequenceExhausted,

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
