//! Session key exchange vectors: `Riv`, the session key `Ks`, and its
//! derived-key-masked form `Edkey(Ks)` for the AKE session in [`crate::ake`].

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionVectors {
    pub description: String,
    pub riv: String,
    pub ks: String,
    pub edkey_ks: String,
}

/// Load the embedded session-key-exchange vectors.
pub fn load() -> SessionVectors {
    serde_json::from_str(include_str!("../vectors/session.json")).expect("session.json is valid")
}
