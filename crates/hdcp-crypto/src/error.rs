//! Crypto error types.

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no receiver private key loaded")]
    NoPrivateKey,

    #[error("invalid RSA key material: {0}")]
    InvalidKey(String),

    #[error("certificate signature verification failed")]
    SignatureVerificationFailed,

    #[error("master key encryption failed")]
    EncryptionFailed,

    #[error("master key decryption failed")]
    DecryptionFailed,

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
