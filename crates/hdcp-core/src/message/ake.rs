//! Authentication-and-key-exchange phase messages.
//!
//! Wire layouts (first byte is always the message ID):
//!
//! ```text
//! AKE_Init              id(1) || Rtx(8) || TxCaps(3)
//! AKE_Send_Cert         id(1) || cert(522) || Rrx(8) || RxCaps(3)
//! AKE_No_Stored_km      id(1) || Ekpub(Km)(128)
//! AKE_Stored_km         id(1) || Ekh(Km)(16) || m(16)
//! AKE_Send_H_prime      id(1) || H'(32)
//! AKE_Send_Pairing_Info id(1) || Ekh(Km)(16)
//! ```

use alloc::vec::Vec;

use super::check_len;
use crate::constants::{
    CERT_SIZE, EKH_SIZE, EKPUB_KM_SIZE, HPRIME_SIZE, KM_SIZE, RRX_SIZE, RTX_SIZE, RXCAPS_SIZE,
    TXCAPS_SIZE,
};
use crate::error::MessageError;
use crate::types::{RxCaps, TxCaps};

/// Starts (or restarts) authentication; carries the transmitter nonce and
/// capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeInit {
    pub rtx: [u8; RTX_SIZE],
    pub tx_caps: TxCaps,
}

impl AkeInit {
    pub const LEN: usize = 1 + RTX_SIZE + TXCAPS_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.rtx);
        out.extend_from_slice(self.tx_caps.as_ref());
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut rtx = [0u8; RTX_SIZE];
        rtx.copy_from_slice(&bytes[1..9]);
        let mut caps = [0u8; TXCAPS_SIZE];
        caps.copy_from_slice(&bytes[9..12]);
        Ok(Self {
            rtx,
            tx_caps: TxCaps::from_bytes(caps),
        })
    }
}

/// The receiver's certificate, nonce, and capabilities, produced in response
/// to AKE_Init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeSendCert {
    pub cert: [u8; CERT_SIZE],
    pub rrx: [u8; RRX_SIZE],
    pub rx_caps: RxCaps,
}

impl AkeSendCert {
    pub const LEN: usize = 1 + CERT_SIZE + RRX_SIZE + RXCAPS_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.cert);
        out.extend_from_slice(&self.rrx);
        out.extend_from_slice(self.rx_caps.as_ref());
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut cert = [0u8; CERT_SIZE];
        cert.copy_from_slice(&bytes[1..1 + CERT_SIZE]);
        let mut rrx = [0u8; RRX_SIZE];
        rrx.copy_from_slice(&bytes[523..531]);
        let mut caps = [0u8; RXCAPS_SIZE];
        caps.copy_from_slice(&bytes[531..534]);
        Ok(Self {
            cert,
            rrx,
            rx_caps: RxCaps::from_bytes(caps),
        })
    }
}

/// A fresh master key, RSAES-OAEP-encrypted to the receiver's public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeNoStoredKm {
    pub ekpub_km: [u8; EKPUB_KM_SIZE],
}

impl AkeNoStoredKm {
    pub const LEN: usize = 1 + EKPUB_KM_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ekpub_km);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut ekpub_km = [0u8; EKPUB_KM_SIZE];
        ekpub_km.copy_from_slice(&bytes[1..]);
        Ok(Self { ekpub_km })
    }
}

/// A previously paired master key: the receiver's own pairing blob plus the
/// nonce pair `m = Rtx || Rrx` it was derived under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeStoredKm {
    pub ekh_km: [u8; EKH_SIZE],
    pub m: [u8; KM_SIZE],
}

impl AkeStoredKm {
    pub const LEN: usize = 1 + EKH_SIZE + KM_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ekh_km);
        out.extend_from_slice(&self.m);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut ekh_km = [0u8; EKH_SIZE];
        ekh_km.copy_from_slice(&bytes[1..17]);
        let mut m = [0u8; KM_SIZE];
        m.copy_from_slice(&bytes[17..33]);
        Ok(Self { ekh_km, m })
    }
}

/// The receiver's key-confirmation hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeSendHPrime {
    pub h_prime: [u8; HPRIME_SIZE],
}

impl AkeSendHPrime {
    pub const LEN: usize = 1 + HPRIME_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.h_prime);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut h_prime = [0u8; HPRIME_SIZE];
        h_prime.copy_from_slice(&bytes[1..]);
        Ok(Self { h_prime })
    }
}

/// The pairing blob the transmitter caches for fast re-authentication.
/// Sent only on the no-stored-Km path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AkeSendPairingInfo {
    pub ekh_km: [u8; EKH_SIZE],
}

impl AkeSendPairingInfo {
    pub const LEN: usize = 1 + EKH_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ekh_km);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut ekh_km = [0u8; EKH_SIZE];
        ekh_km.copy_from_slice(&bytes[1..]);
        Ok(Self { ekh_km })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[test]
    fn ake_init_field_offsets() {
        let msg = Message::AkeInit(AkeInit {
            rtx: [0xf9, 0xf1, 0x30, 0xa8, 0x2d, 0x5b, 0xe5, 0xc3],
            tx_caps: TxCaps::new(),
        });
        let bytes = msg.encode();
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..9], &[0xf9, 0xf1, 0x30, 0xa8, 0x2d, 0x5b, 0xe5, 0xc3]);
        assert_eq!(&bytes[9..12], &[0x02, 0x00, 0x00]);
    }

    #[test]
    fn send_cert_field_offsets() {
        let msg = AkeSendCert {
            cert: [0xc0; CERT_SIZE],
            rrx: [0xe1; 8],
            rx_caps: RxCaps::new(false),
        };
        let mut bytes = alloc::vec![3u8];
        msg.encode_body(&mut bytes);
        assert_eq!(bytes.len(), AkeSendCert::LEN);
        assert!(bytes[1..523].iter().all(|&b| b == 0xc0));
        assert!(bytes[523..531].iter().all(|&b| b == 0xe1));
        assert_eq!(&bytes[531..], &[0x02, 0x00, 0x00]);
    }

    #[test]
    fn stored_km_splits_blob_and_nonces() {
        let bytes = {
            let mut b = alloc::vec![5u8];
            b.extend_from_slice(&[0xaa; 16]);
            b.extend_from_slice(&[0xbb; 16]);
            b
        };
        let msg = AkeStoredKm::decode_body(&bytes).unwrap();
        assert_eq!(msg.ekh_km, [0xaa; 16]);
        assert_eq!(msg.m, [0xbb; 16]);
    }

    #[test]
    fn wrong_id_byte_is_not_a_size_error() {
        // A correct-length buffer for one kind with another kind's ID byte
        // must fail on that kind's expected size, not be misread.
        let bytes = alloc::vec![8u8; AkeSendHPrime::LEN];
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::SizeMismatch {
                expected: AkeSendPairingInfo::LEN,
                actual: AkeSendHPrime::LEN,
            })
        );
    }
}
