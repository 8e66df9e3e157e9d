//! The handshake message set and its fixed-layout codec.
//!
//! Every message is a fixed byte layout whose first byte is the message ID.
//! Sizes are known from the message content alone, so decoding never guesses:
//! a buffer is rejected unless its length exactly matches the declared length
//! of the message it claims to carry.

pub mod ake;
pub mod repeater;
pub mod session;

use alloc::vec::Vec;

use crate::error::MessageError;

pub use ake::{
    AkeInit, AkeNoStoredKm, AkeSendCert, AkeSendHPrime, AkeSendPairingInfo, AkeStoredKm,
};
pub use repeater::{ReceiverIdList, RepeaterAck, RxInfo, StreamIdType, StreamManage, StreamReady};
pub use session::{LcInit, LcSendLPrime, SkeSendEks};

/// Handshake message identifiers (first byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    AkeInit = 2,
    AkeSendCert = 3,
    AkeNoStoredKm = 4,
    AkeStoredKm = 5,
    AkeSendHPrime = 7,
    AkeSendPairingInfo = 8,
    LcInit = 9,
    LcSendLPrime = 10,
    SkeSendEks = 11,
    RepeaterAuthSendReceiverIdList = 12,
    RepeaterAuthSendAck = 15,
    RepeaterAuthStreamManage = 16,
    RepeaterAuthStreamReady = 17,
}

impl MessageId {
    pub fn from_u8(value: u8) -> Result<Self, MessageError> {
        match value {
            2 => Ok(Self::AkeInit),
            3 => Ok(Self::AkeSendCert),
            4 => Ok(Self::AkeNoStoredKm),
            5 => Ok(Self::AkeStoredKm),
            7 => Ok(Self::AkeSendHPrime),
            8 => Ok(Self::AkeSendPairingInfo),
            9 => Ok(Self::LcInit),
            10 => Ok(Self::LcSendLPrime),
            11 => Ok(Self::SkeSendEks),
            12 => Ok(Self::RepeaterAuthSendReceiverIdList),
            15 => Ok(Self::RepeaterAuthSendAck),
            16 => Ok(Self::RepeaterAuthStreamManage),
            17 => Ok(Self::RepeaterAuthStreamReady),
            other => Err(MessageError::UnknownId(other)),
        }
    }
}

/// A decoded handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::large_enum_variant)]
pub enum Message {
    AkeInit(AkeInit),
    AkeSendCert(AkeSendCert),
    AkeNoStoredKm(AkeNoStoredKm),
    AkeStoredKm(AkeStoredKm),
    AkeSendHPrime(AkeSendHPrime),
    AkeSendPairingInfo(AkeSendPairingInfo),
    LcInit(LcInit),
    LcSendLPrime(LcSendLPrime),
    SkeSendEks(SkeSendEks),
    ReceiverIdList(ReceiverIdList),
    RepeaterAck(RepeaterAck),
    StreamManage(StreamManage),
    StreamReady(StreamReady),
}

impl Message {
    /// The message ID carried in the first byte.
    pub fn id(&self) -> MessageId {
        match self {
            Self::AkeInit(_) => MessageId::AkeInit,
            Self::AkeSendCert(_) => MessageId::AkeSendCert,
            Self::AkeNoStoredKm(_) => MessageId::AkeNoStoredKm,
            Self::AkeStoredKm(_) => MessageId::AkeStoredKm,
            Self::AkeSendHPrime(_) => MessageId::AkeSendHPrime,
            Self::AkeSendPairingInfo(_) => MessageId::AkeSendPairingInfo,
            Self::LcInit(_) => MessageId::LcInit,
            Self::LcSendLPrime(_) => MessageId::LcSendLPrime,
            Self::SkeSendEks(_) => MessageId::SkeSendEks,
            Self::ReceiverIdList(_) => MessageId::RepeaterAuthSendReceiverIdList,
            Self::RepeaterAck(_) => MessageId::RepeaterAuthSendAck,
            Self::StreamManage(_) => MessageId::RepeaterAuthStreamManage,
            Self::StreamReady(_) => MessageId::RepeaterAuthStreamReady,
        }
    }

    /// The exact encoded length of this message in bytes.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::AkeInit(_) => AkeInit::LEN,
            Self::AkeSendCert(_) => AkeSendCert::LEN,
            Self::AkeNoStoredKm(_) => AkeNoStoredKm::LEN,
            Self::AkeStoredKm(_) => AkeStoredKm::LEN,
            Self::AkeSendHPrime(_) => AkeSendHPrime::LEN,
            Self::AkeSendPairingInfo(_) => AkeSendPairingInfo::LEN,
            Self::LcInit(_) => LcInit::LEN,
            Self::LcSendLPrime(_) => LcSendLPrime::LEN,
            Self::SkeSendEks(_) => SkeSendEks::LEN,
            Self::ReceiverIdList(m) => m.encoded_len(),
            Self::RepeaterAck(_) => RepeaterAck::LEN,
            Self::StreamManage(m) => m.encoded_len(),
            Self::StreamReady(_) => StreamReady::LEN,
        }
    }

    /// Serialize to exactly [`Self::encoded_len`] bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.id() as u8);
        match self {
            Self::AkeInit(m) => m.encode_body(&mut out),
            Self::AkeSendCert(m) => m.encode_body(&mut out),
            Self::AkeNoStoredKm(m) => m.encode_body(&mut out),
            Self::AkeStoredKm(m) => m.encode_body(&mut out),
            Self::AkeSendHPrime(m) => m.encode_body(&mut out),
            Self::AkeSendPairingInfo(m) => m.encode_body(&mut out),
            Self::LcInit(m) => m.encode_body(&mut out),
            Self::LcSendLPrime(m) => m.encode_body(&mut out),
            Self::SkeSendEks(m) => m.encode_body(&mut out),
            Self::ReceiverIdList(m) => m.encode_body(&mut out),
            Self::RepeaterAck(m) => m.encode_body(&mut out),
            Self::StreamManage(m) => m.encode_body(&mut out),
            Self::StreamReady(m) => m.encode_body(&mut out),
        }
        debug_assert_eq!(out.len(), self.encoded_len());
        out
    }

    /// Deserialize a message, rejecting any buffer whose length does not
    /// exactly match the declared length of the identified message kind.
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.is_empty() {
            return Err(MessageError::TooShort { min: 1, actual: 0 });
        }
        let id = MessageId::from_u8(bytes[0])?;
        match id {
            MessageId::AkeInit => AkeInit::decode_body(bytes).map(Self::AkeInit),
            MessageId::AkeSendCert => AkeSendCert::decode_body(bytes).map(Self::AkeSendCert),
            MessageId::AkeNoStoredKm => AkeNoStoredKm::decode_body(bytes).map(Self::AkeNoStoredKm),
            MessageId::AkeStoredKm => AkeStoredKm::decode_body(bytes).map(Self::AkeStoredKm),
            MessageId::AkeSendHPrime => AkeSendHPrime::decode_body(bytes).map(Self::AkeSendHPrime),
            MessageId::AkeSendPairingInfo => {
                AkeSendPairingInfo::decode_body(bytes).map(Self::AkeSendPairingInfo)
            }
            MessageId::LcInit => LcInit::decode_body(bytes).map(Self::LcInit),
            MessageId::LcSendLPrime => LcSendLPrime::decode_body(bytes).map(Self::LcSendLPrime),
            MessageId::SkeSendEks => SkeSendEks::decode_body(bytes).map(Self::SkeSendEks),
            MessageId::RepeaterAuthSendReceiverIdList => {
                ReceiverIdList::decode_body(bytes).map(Self::ReceiverIdList)
            }
            MessageId::RepeaterAuthSendAck => {
                RepeaterAck::decode_body(bytes).map(Self::RepeaterAck)
            }
            MessageId::RepeaterAuthStreamManage => {
                StreamManage::decode_body(bytes).map(Self::StreamManage)
            }
            MessageId::RepeaterAuthStreamReady => {
                StreamReady::decode_body(bytes).map(Self::StreamReady)
            }
        }
    }
}

/// Check that a buffer holds exactly `expected` bytes.
pub(crate) fn check_len(bytes: &[u8], expected: usize) -> Result<(), MessageError> {
    if bytes.len() != expected {
        return Err(MessageError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RxCaps, TxCaps};

    #[test]
    fn unknown_id_rejected() {
        assert_eq!(
            Message::decode(&[0x00, 0x01]),
            Err(MessageError::UnknownId(0x00))
        );
        assert_eq!(Message::decode(&[0x06]), Err(MessageError::UnknownId(6)));
        assert_eq!(Message::decode(&[13]), Err(MessageError::UnknownId(13)));
        assert_eq!(Message::decode(&[14]), Err(MessageError::UnknownId(14)));
    }

    #[test]
    fn empty_buffer_rejected() {
        assert_eq!(
            Message::decode(&[]),
            Err(MessageError::TooShort { min: 1, actual: 0 })
        );
    }

    #[test]
    fn roundtrip_every_fixed_kind() {
        let messages = [
            Message::AkeInit(AkeInit {
                rtx: [0x11; 8],
                tx_caps: TxCaps::new(),
            }),
            Message::AkeSendCert(AkeSendCert {
                cert: [0x22; 522],
                rrx: [0x33; 8],
                rx_caps: RxCaps::new(true),
            }),
            Message::AkeNoStoredKm(AkeNoStoredKm {
                ekpub_km: [0x44; 128],
            }),
            Message::AkeStoredKm(AkeStoredKm {
                ekh_km: [0x55; 16],
                m: [0x66; 16],
            }),
            Message::AkeSendHPrime(AkeSendHPrime { h_prime: [0x77; 32] }),
            Message::AkeSendPairingInfo(AkeSendPairingInfo { ekh_km: [0x88; 16] }),
            Message::LcInit(LcInit { rn: [0x99; 8] }),
            Message::LcSendLPrime(LcSendLPrime { l_prime: [0xaa; 32] }),
            Message::SkeSendEks(SkeSendEks {
                edkey_ks: [0xbb; 16],
                riv: [0xcc; 8],
            }),
            Message::RepeaterAck(RepeaterAck { v: [0xdd; 16] }),
            Message::StreamReady(StreamReady { m_prime: [0xee; 32] }),
        ];
        for msg in messages {
            let bytes = msg.encode();
            assert_eq!(bytes.len(), msg.encoded_len(), "length for {:?}", msg.id());
            assert_eq!(bytes[0], msg.id() as u8);
            assert_eq!(Message::decode(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn fixed_sizes_match_wire_layout() {
        assert_eq!(AkeInit::LEN, 12);
        assert_eq!(AkeSendCert::LEN, 534);
        assert_eq!(AkeNoStoredKm::LEN, 129);
        assert_eq!(AkeStoredKm::LEN, 33);
        assert_eq!(AkeSendHPrime::LEN, 33);
        assert_eq!(AkeSendPairingInfo::LEN, 17);
        assert_eq!(LcInit::LEN, 9);
        assert_eq!(LcSendLPrime::LEN, 33);
        assert_eq!(SkeSendEks::LEN, 25);
        assert_eq!(RepeaterAck::LEN, 17);
        assert_eq!(StreamReady::LEN, 33);
    }

    #[test]
    fn truncated_and_padded_buffers_rejected() {
        let msg = Message::LcInit(LcInit { rn: [0x01; 8] });
        let mut bytes = msg.encode();

        bytes.pop();
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::SizeMismatch {
                expected: 9,
                actual: 8
            })
        );

        bytes.push(0x01);
        bytes.push(0xff);
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::SizeMismatch {
                expected: 9,
                actual: 10
            })
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn ake_init_roundtrip(rtx in proptest::array::uniform8(any::<u8>()),
                              caps in proptest::array::uniform3(any::<u8>())) {
            let msg = Message::AkeInit(AkeInit {
                rtx,
                tx_caps: crate::types::TxCaps::from_bytes(caps),
            });
            let bytes = msg.encode();
            prop_assert_eq!(bytes.len(), AkeInit::LEN);
            prop_assert_eq!(Message::decode(&bytes).unwrap(), msg);
        }

        #[test]
        fn stored_km_roundtrip(ekh in proptest::array::uniform16(any::<u8>()),
                               m in proptest::array::uniform16(any::<u8>())) {
            let msg = Message::AkeStoredKm(AkeStoredKm { ekh_km: ekh, m });
            let bytes = msg.encode();
            prop_assert_eq!(Message::decode(&bytes).unwrap(), msg);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..600)) {
            let _ = Message::decode(&bytes);
        }
    }
}
