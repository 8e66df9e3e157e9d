//! Locality-check and session-key-exchange messages.
//!
//! ```text
//! LC_Init          id(1) || Rn(8)
//! LC_Send_L_prime  id(1) || L'(32)
//! SKE_Send_Eks     id(1) || Edkey(Ks)(16) || Riv(8)
//! ```

use alloc::vec::Vec;

use super::check_len;
use crate::constants::{KS_SIZE, LPRIME_SIZE, RIV_SIZE, RN_SIZE};
use crate::error::MessageError;

/// Starts one locality-check round trip with a fresh transmitter nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcInit {
    pub rn: [u8; RN_SIZE],
}

impl LcInit {
    pub const LEN: usize = 1 + RN_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.rn);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut rn = [0u8; RN_SIZE];
        rn.copy_from_slice(&bytes[1..]);
        Ok(Self { rn })
    }
}

/// The receiver's locality proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LcSendLPrime {
    pub l_prime: [u8; LPRIME_SIZE],
}

impl LcSendLPrime {
    pub const LEN: usize = 1 + LPRIME_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.l_prime);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut l_prime = [0u8; LPRIME_SIZE];
        l_prime.copy_from_slice(&bytes[1..]);
        Ok(Self { l_prime })
    }
}

/// The masked session key and cipher initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkeSendEks {
    pub edkey_ks: [u8; KS_SIZE],
    pub riv: [u8; RIV_SIZE],
}

impl SkeSendEks {
    pub const LEN: usize = 1 + KS_SIZE + RIV_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.edkey_ks);
        out.extend_from_slice(&self.riv);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut edkey_ks = [0u8; KS_SIZE];
        edkey_ks.copy_from_slice(&bytes[1..17]);
        let mut riv = [0u8; RIV_SIZE];
        riv.copy_from_slice(&bytes[17..25]);
        Ok(Self { edkey_ks, riv })
    }
}
