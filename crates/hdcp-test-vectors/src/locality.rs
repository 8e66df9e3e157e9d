//! Locality check vectors: the transmitter nonce `Rn` and the expected `L'`
//! for the AKE session in [`crate::ake`].

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LocalityVectors {
    pub description: String,
    pub rn: String,
    pub l_prime: String,
}

/// Load the embedded locality-check vectors.
pub fn load() -> LocalityVectors {
    serde_json::from_str(include_str!("../vectors/locality.json")).expect("locality.json is valid")
}
