//! Golden test vectors for the HDCP 2.2 protocol implementation.
//!
//! The vectors are the published values from the errata to the HDCP on HDMI
//! specification (appendix E): a complete no-stored-Km authentication between
//! one transmitter and one receiver, including the receiver's RSA key
//! material, so that key derivation, master-key wrapping, and certificate
//! verification can all be checked byte-for-byte.
//!
//! Each module corresponds to one JSON file and provides typed structs plus a
//! `load()` function that deserializes the embedded JSON via `include_str!`.
//! All byte fields are lowercase hex strings.
//!
//! # Usage
//!
//! ```rust
//! let ake = hdcp_test_vectors::ake::load();
//! assert_eq!(ake.rtx.len(), 16); // 8 bytes of hex
//! ```

pub mod ake;
pub mod locality;
pub mod session;

pub use ake::AkeVectors;
pub use locality::LocalityVectors;
pub use session::SessionVectors;

#[cfg(test)]
mod tests {
    #[test]
    fn deserialize_ake() {
        let v = super::ake::load();
        assert_eq!(v.rtx.len(), 16);
        assert_eq!(v.certificate.len(), 2 * 522);
        assert_eq!(v.receiver_private_key.p.len(), 128);
        assert_eq!(v.trust_anchor.modulus.len(), 2 * 384);
    }

    #[test]
    fn deserialize_locality() {
        let v = super::locality::load();
        assert_eq!(v.rn.len(), 16);
        assert_eq!(v.l_prime.len(), 64);
    }

    #[test]
    fn deserialize_session() {
        let v = super::session::load();
        assert_eq!(v.ks.len(), 32);
        assert_eq!(v.edkey_ks.len(), 32);
    }

    #[test]
    fn hex_fields_decode() {
        let v = super::ake::load();
        for field in [&v.rtx, &v.rrx, &v.km, &v.h_prime, &v.certificate] {
            assert!(hex::decode(field).is_ok(), "field is not valid hex");
        }
    }
}
