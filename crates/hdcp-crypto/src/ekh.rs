//! Pairing-key operations.
//!
//! `kh` is a 128-bit key private to the receiver, derived from its RSA
//! private-key material. The pairing blob is an AES pad XOR:
//!
//! ```text
//! Ekh(Km) = AES-128-E(kh, m) ^ Km        with m = Rtx || Rrx
//! ```
//!
//! Recovery is the same operation applied to the blob, so one function
//! serves both directions.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use sha2::{Digest, Sha256};

use hdcp_core::constants::{EKH_SIZE, KM_SIZE};

/// Derive `kh` from the receiver's 320-byte CRT private-key blob
/// (`p || q || dP || dQ || qInv`): the trailing 128 bits of its SHA-256.
pub fn derive_kh(private_key: &[u8]) -> [u8; EKH_SIZE] {
    let digest = Sha256::digest(private_key);
    let mut kh = [0u8; EKH_SIZE];
    kh.copy_from_slice(&digest[16..]);
    kh
}

/// Apply the pairing pad: encrypting `Km` yields `Ekh(Km)`, and applying it
/// to `Ekh(Km)` with the same `m` recovers `Km`.
pub fn ekh_pad(kh: &[u8; EKH_SIZE], m: &[u8; KM_SIZE], value: &[u8; KM_SIZE]) -> [u8; KM_SIZE] {
    let cipher = Aes128::new(GenericArray::from_slice(kh));
    let mut pad = GenericArray::clone_from_slice(m);
    cipher.encrypt_block(&mut pad);

    let mut out = *value;
    for (o, p) in out.iter_mut().zip(pad.as_slice()) {
        *o ^= p;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_is_its_own_inverse() {
        let kh = [0x42u8; 16];
        let m = [0x17u8; 16];
        let km = [0xca, 0x9f, 0x83, 0x95, 0x70, 0xd0, 0xd0, 0xf9, 0xcf, 0xe4, 0xeb, 0x54, 0x7e,
                  0x09, 0xfa, 0x3b];

        let blob = ekh_pad(&kh, &m, &km);
        assert_ne!(blob, km);
        assert_eq!(ekh_pad(&kh, &m, &blob), km);
    }

    #[test]
    fn pad_depends_on_m() {
        let kh = [0x42u8; 16];
        let km = [0x55u8; 16];
        assert_ne!(
            ekh_pad(&kh, &[0x01; 16], &km),
            ekh_pad(&kh, &[0x02; 16], &km)
        );
    }

    #[test]
    fn kh_is_deterministic_per_key() {
        let blob_a = [0x01u8; 320];
        let blob_b = [0x02u8; 320];
        assert_eq!(derive_kh(&blob_a), derive_kh(&blob_a));
        assert_ne!(derive_kh(&blob_a), derive_kh(&blob_b));
    }
}
