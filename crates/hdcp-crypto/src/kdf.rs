//! Key derivation and keyed hashes.
//!
//! Both endpoints derive the same key schedule from the master key and the
//! session nonces:
//!
//! ```text
//! dkey_i = AES-128-E(Km ^ (0^64 || Rn), Rtx || (Rrx ^ ctr_i))
//! Kd     = dkey0 || dkey1                       (Rn = 0 during AKE)
//! H'     = HMAC-SHA256(Rtx || RxCaps || TxCaps, key = Kd)
//! L'     = HMAC-SHA256(Rn, key = Kd ^ (0^192 || Rrx))
//! Edkey(Ks) = Ks ^ dkey2 ^ (0^64 || Rrx)        (Rn = locality nonce)
//! V      = HMAC-SHA256(ids || RxInfo || seq_num_V, key = Kd)
//! M'     = HMAC-SHA256(StreamID_Types || seq_num_M, key = SHA256(Kd))
//! ```
//!
//! `ctr_i` is a big-endian 64-bit counter; all XORs against 64-bit nonces
//! land on the least-significant (trailing) 8 bytes of the wider value.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::Aes128;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use hdcp_core::constants::{
    HPRIME_SIZE, KD_SIZE, KM_SIZE, KS_SIZE, LPRIME_SIZE, MPRIME_SIZE, RN_SIZE, RRX_SIZE, RTX_SIZE,
    RXCAPS_SIZE, RXINFO_SIZE, SEQ_NUM_M_SIZE, SEQ_NUM_V_SIZE, TXCAPS_SIZE,
};

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Derive `dkey_i` for counter value `ctr`.
///
/// `rn` must be all zeros for `ctr` 0 and 1 (AKE) and the locality nonce for
/// `ctr` 2 (session-key exchange).
pub fn derived_key(
    km: &[u8; KM_SIZE],
    rtx: &[u8; RTX_SIZE],
    rrx: &[u8; RRX_SIZE],
    rn: &[u8; RN_SIZE],
    ctr: u64,
) -> [u8; KM_SIZE] {
    let mut key = *km;
    for (k, r) in key[8..].iter_mut().zip(rn) {
        *k ^= r;
    }

    let mut block = [0u8; 16];
    block[..8].copy_from_slice(rtx);
    let ctr_be = ctr.to_be_bytes();
    for i in 0..8 {
        block[8 + i] = rrx[i] ^ ctr_be[i];
    }

    let cipher = Aes128::new(GenericArray::from_slice(&key));
    let mut out = GenericArray::clone_from_slice(&block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// Derive the 256-bit session derived key `Kd = dkey0 || dkey1`.
pub fn session_kd(
    km: &[u8; KM_SIZE],
    rtx: &[u8; RTX_SIZE],
    rrx: &[u8; RRX_SIZE],
) -> [u8; KD_SIZE] {
    let zero_rn = [0u8; RN_SIZE];
    let dkey0 = derived_key(km, rtx, rrx, &zero_rn, 0);
    let dkey1 = derived_key(km, rtx, rrx, &zero_rn, 1);
    let mut kd = [0u8; KD_SIZE];
    kd[..16].copy_from_slice(&dkey0);
    kd[16..].copy_from_slice(&dkey1);
    kd
}

/// The key-confirmation hash `H'`.
pub fn h_prime(
    kd: &[u8; KD_SIZE],
    rtx: &[u8; RTX_SIZE],
    rx_caps: &[u8; RXCAPS_SIZE],
    tx_caps: &[u8; TXCAPS_SIZE],
) -> [u8; HPRIME_SIZE] {
    let mut msg = [0u8; RTX_SIZE + RXCAPS_SIZE + TXCAPS_SIZE];
    msg[..8].copy_from_slice(rtx);
    msg[8..11].copy_from_slice(rx_caps);
    msg[11..].copy_from_slice(tx_caps);
    hmac_sha256(kd, &msg)
}

/// The locality proof `L'`.
pub fn l_prime(
    kd: &[u8; KD_SIZE],
    rn: &[u8; RN_SIZE],
    rrx: &[u8; RRX_SIZE],
) -> [u8; LPRIME_SIZE] {
    let mut key = *kd;
    for (k, r) in key[24..].iter_mut().zip(rrx) {
        *k ^= r;
    }
    hmac_sha256(&key, rn)
}

/// Mask or unmask the session key: `Ks <-> Edkey(Ks)`.
///
/// The operation is its own inverse, so the transmitter calls it with `Ks`
/// to build `Edkey(Ks)` and the receiver calls it with `Edkey(Ks)` to
/// recover `Ks`.
pub fn mask_session_key(
    value: &[u8; KS_SIZE],
    km: &[u8; KM_SIZE],
    rtx: &[u8; RTX_SIZE],
    rrx: &[u8; RRX_SIZE],
    rn: &[u8; RN_SIZE],
) -> [u8; KS_SIZE] {
    let dkey2 = derived_key(km, rtx, rrx, rn, 2);
    let mut out = *value;
    for (o, d) in out.iter_mut().zip(&dkey2) {
        *o ^= d;
    }
    for (o, r) in out[8..].iter_mut().zip(rrx) {
        *o ^= r;
    }
    out
}

/// The topology aggregate hash `V` over the downstream receiver-ID list.
///
/// `receiver_ids` is the concatenation of 5-byte IDs; `rx_info` and
/// `seq_num_v` are in their big-endian wire encoding.
pub fn topology_v(
    kd: &[u8; KD_SIZE],
    receiver_ids: &[u8],
    rx_info: &[u8; RXINFO_SIZE],
    seq_num_v: &[u8; SEQ_NUM_V_SIZE],
) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(kd).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(receiver_ids);
    mac.update(rx_info);
    mac.update(seq_num_v);
    mac.finalize().into_bytes().into()
}

/// The stream-management hash `M'`, keyed by `SHA256(Kd)`.
///
/// `stream_id_types` is the concatenation of 2-byte StreamID_Type entries.
pub fn stream_m(
    kd: &[u8; KD_SIZE],
    stream_id_types: &[u8],
    seq_num_m: &[u8; SEQ_NUM_M_SIZE],
) -> [u8; MPRIME_SIZE] {
    let key: [u8; 32] = Sha256::digest(kd).into();
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(&key).expect("HMAC-SHA256 accepts keys of any length");
    mac.update(stream_id_types);
    mac.update(seq_num_m);
    mac.finalize().into_bytes().into()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn session_key_mask_roundtrip(
            ks in proptest::array::uniform16(any::<u8>()),
            km in proptest::array::uniform16(any::<u8>()),
            rtx in proptest::array::uniform8(any::<u8>()),
            rrx in proptest::array::uniform8(any::<u8>()),
            rn in proptest::array::uniform8(any::<u8>()),
        ) {
            let masked = mask_session_key(&ks, &km, &rtx, &rrx, &rn);
            prop_assert_eq!(mask_session_key(&masked, &km, &rtx, &rrx, &rn), ks);
        }
    }
}
