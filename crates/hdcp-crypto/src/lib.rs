//! Cryptographic operations for the HDCP 2.2 authentication protocol.
//!
//! This crate provides the key-derivation functions shared by both sides of
//! the handshake, the pairing-key (`kh`/`Ekh`) operations, certificate
//! parsing with RSA signature verification and master-key wrapping, and the
//! [`CryptoProvider`] trait the protocol engines consume. A pure-software
//! provider ([`SoftwareCrypto`]) implements the trait from these primitives;
//! hardware-accelerated providers implement the same seam.

pub mod cert;
pub mod ekh;
pub mod error;
pub mod kdf;
pub mod provider;

pub use cert::{Certificate, ReceiverKey, TrustAnchor};
pub use error::CryptoError;
pub use provider::{
    CipherMode, CountingRandom, CryptoProvider, FixedRandom, OsRandom, RandomSource,
    SoftwareCrypto,
};
