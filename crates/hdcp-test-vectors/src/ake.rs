//! Authentication and key exchange vectors.
//!
//! Covers the AKE phase: transmitter/receiver nonces and capabilities, the
//! receiver certificate and its RSA private key, the master key `Km` both in
//! the clear and RSAES-OAEP-wrapped (with the masking seed that produced the
//! published ciphertext), the expected `H'`, and the pairing blob `Ekh(Km)`.

use serde::Deserialize;

/// The receiver's RSA private key in CRT form (each component 64 bytes).
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverPrivateKey {
    pub p: String,
    pub q: String,
    pub dp: String,
    pub dq: String,
    pub qinv: String,
}

/// The DCP trust-anchor public key (3072-bit modulus, exponent 3).
#[derive(Debug, Clone, Deserialize)]
pub struct TrustAnchorKey {
    pub modulus: String,
    pub exponent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AkeVectors {
    pub description: String,
    pub rtx: String,
    pub tx_caps: String,
    pub rrx: String,
    pub rx_caps: String,
    pub km: String,
    pub ekpub_km: String,
    pub masking_seed: String,
    pub h_prime: String,
    pub ekh_km: String,
    pub certificate: String,
    pub receiver_private_key: ReceiverPrivateKey,
    pub trust_anchor: TrustAnchorKey,
    pub lc128: String,
}

/// Load the embedded AKE vectors.
pub fn load() -> AkeVectors {
    serde_json::from_str(include_str!("../vectors/ake.json")).expect("ake.json is valid")
}
