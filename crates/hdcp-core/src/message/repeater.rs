//! Repeater topology and content-stream-management messages.
//!
//! ```text
//! RepeaterAuth_Send_ReceiverID_List  id(1) || RxInfo(2) || seq_num_V(3) || V'(16) || ids(5*n)
//! RepeaterAuth_Send_Ack              id(1) || V(16)
//! RepeaterAuth_Stream_Manage         id(1) || seq_num_M(3) || k(2) || StreamID_Type(2*k)
//! RepeaterAuth_Stream_Ready          id(1) || M'(32)
//! ```
//!
//! `RxInfo` bit layout (16-bit, big-endian on the wire):
//!
//! ```text
//! Bits 11-9: cascade depth
//! Bits  8-4: device count
//! Bit     3: max-devices-exceeded
//! Bit     2: max-cascade-exceeded
//! Bit     1: HDCP 2.0 repeater downstream
//! Bit     0: HDCP 1.x device downstream
//! ```

use alloc::vec::Vec;

use super::check_len;
use crate::constants::{
    MPRIME_SIZE, RECEIVER_ID_SIZE, RXINFO_SIZE, SEQ_NUM_M_SIZE, SEQ_NUM_V_SIZE, VPRIME_SIZE,
};
use crate::error::MessageError;
use crate::types::ReceiverId;

/// Largest device count expressible in the RxInfo field.
pub const RXINFO_MAX_DEVICE_COUNT: u8 = 31;

/// Largest stream count accepted in a stream-manage message.
pub const MAX_STREAM_COUNT: u16 = 15;

/// Packed repeater topology summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxInfo {
    pub depth: u8,
    pub device_count: u8,
    pub max_devices_exceeded: bool,
    pub max_cascade_exceeded: bool,
    pub hdcp2_0_repeater_downstream: bool,
    pub hdcp1_x_device_downstream: bool,
}

impl RxInfo {
    pub fn from_u16(value: u16) -> Self {
        Self {
            depth: ((value >> 9) & 0x07) as u8,
            device_count: ((value >> 4) & 0x1f) as u8,
            max_devices_exceeded: value & 0x08 != 0,
            max_cascade_exceeded: value & 0x04 != 0,
            hdcp2_0_repeater_downstream: value & 0x02 != 0,
            hdcp1_x_device_downstream: value & 0x01 != 0,
        }
    }

    pub fn to_u16(self) -> u16 {
        (u16::from(self.depth & 0x07) << 9)
            | (u16::from(self.device_count & 0x1f) << 4)
            | (u16::from(self.max_devices_exceeded) << 3)
            | (u16::from(self.max_cascade_exceeded) << 2)
            | (u16::from(self.hdcp2_0_repeater_downstream) << 1)
            | u16::from(self.hdcp1_x_device_downstream)
    }

    pub fn from_bytes(bytes: [u8; RXINFO_SIZE]) -> Self {
        Self::from_u16(u16::from_be_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; RXINFO_SIZE] {
        self.to_u16().to_be_bytes()
    }
}

/// Read a 24-bit big-endian sequence number.
fn read_seq_num(bytes: &[u8; 3]) -> u32 {
    (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2])
}

/// Write a 24-bit big-endian sequence number (upper byte of `value` ignored).
fn write_seq_num(value: u32) -> [u8; 3] {
    [(value >> 16) as u8, (value >> 8) as u8, value as u8]
}

/// The downstream topology propagated upstream by a repeater, carrying the
/// most-significant half of the aggregate hash `V`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverIdList {
    pub rx_info: RxInfo,
    pub seq_num_v: u32,
    pub v_prime: [u8; VPRIME_SIZE],
    pub ids: Vec<ReceiverId>,
}

impl ReceiverIdList {
    const HEADER_LEN: usize = 1 + RXINFO_SIZE + SEQ_NUM_V_SIZE + VPRIME_SIZE;

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.ids.len() * RECEIVER_ID_SIZE
    }

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.rx_info.to_bytes());
        out.extend_from_slice(&write_seq_num(self.seq_num_v));
        out.extend_from_slice(&self.v_prime);
        for id in &self.ids {
            out.extend_from_slice(id.as_ref());
        }
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(MessageError::TooShort {
                min: Self::HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let rx_info = RxInfo::from_bytes([bytes[1], bytes[2]]);
        if rx_info.device_count > RXINFO_MAX_DEVICE_COUNT {
            return Err(MessageError::DeviceCountOutOfRange(rx_info.device_count));
        }
        let expected = Self::HEADER_LEN + usize::from(rx_info.device_count) * RECEIVER_ID_SIZE;
        check_len(bytes, expected)?;

        let seq_num_v = read_seq_num(&[bytes[3], bytes[4], bytes[5]]);
        let mut v_prime = [0u8; VPRIME_SIZE];
        v_prime.copy_from_slice(&bytes[6..22]);

        let mut ids = Vec::with_capacity(usize::from(rx_info.device_count));
        for chunk in bytes[Self::HEADER_LEN..].chunks_exact(RECEIVER_ID_SIZE) {
            // Chunks are exactly RECEIVER_ID_SIZE by construction.
            ids.push(ReceiverId::try_from(chunk).expect("chunk is 5 bytes"));
        }

        Ok(Self {
            rx_info,
            seq_num_v,
            v_prime,
            ids,
        })
    }
}

/// The transmitter's acknowledgment of a validated topology, carrying the
/// least-significant half of `V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeaterAck {
    pub v: [u8; VPRIME_SIZE],
}

impl RepeaterAck {
    pub const LEN: usize = 1 + VPRIME_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.v);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut v = [0u8; VPRIME_SIZE];
        v.copy_from_slice(&bytes[1..]);
        Ok(Self { v })
    }
}

/// One content stream and the protection type it must be forwarded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamIdType {
    pub stream_id: u8,
    pub stream_type: u8,
}

/// The transmitter's content-stream-management request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamManage {
    pub seq_num_m: u32,
    pub streams: Vec<StreamIdType>,
}

impl StreamManage {
    const HEADER_LEN: usize = 1 + SEQ_NUM_M_SIZE + 2;

    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.streams.len() * 2
    }

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&write_seq_num(self.seq_num_m));
        out.extend_from_slice(&(self.streams.len() as u16).to_be_bytes());
        for s in &self.streams {
            out.push(s.stream_id);
            out.push(s.stream_type);
        }
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(MessageError::TooShort {
                min: Self::HEADER_LEN,
                actual: bytes.len(),
            });
        }
        let seq_num_m = read_seq_num(&[bytes[1], bytes[2], bytes[3]]);
        let k = u16::from_be_bytes([bytes[4], bytes[5]]);
        if k == 0 || k > MAX_STREAM_COUNT {
            return Err(MessageError::InvalidStreamCount(k));
        }
        let expected = Self::HEADER_LEN + usize::from(k) * 2;
        check_len(bytes, expected)?;

        let mut streams = Vec::with_capacity(usize::from(k));
        for chunk in bytes[Self::HEADER_LEN..].chunks_exact(2) {
            streams.push(StreamIdType {
                stream_id: chunk[0],
                stream_type: chunk[1],
            });
        }

        Ok(Self { seq_num_m, streams })
    }
}

/// The repeater's confirmation hash over the stream-manage parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamReady {
    pub m_prime: [u8; MPRIME_SIZE],
}

impl StreamReady {
    pub const LEN: usize = 1 + MPRIME_SIZE;

    pub(super) fn encode_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.m_prime);
    }

    pub(super) fn decode_body(bytes: &[u8]) -> Result<Self, MessageError> {
        check_len(bytes, Self::LEN)?;
        let mut m_prime = [0u8; MPRIME_SIZE];
        m_prime.copy_from_slice(&bytes[1..]);
        Ok(Self { m_prime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    // -----------------------------------------------------------------------
    // RxInfo packing
    // -----------------------------------------------------------------------

    #[test]
    fn rxinfo_pack_unpack() {
        let info = RxInfo {
            depth: 2,
            device_count: 3,
            max_devices_exceeded: false,
            max_cascade_exceeded: false,
            hdcp2_0_repeater_downstream: false,
            hdcp1_x_device_downstream: true,
        };
        let value = info.to_u16();
        assert_eq!(value, (2 << 9) | (3 << 4) | 1);
        assert_eq!(RxInfo::from_u16(value), info);
    }

    #[test]
    fn rxinfo_flag_bits() {
        assert_eq!(RxInfo::from_u16(0x08).max_devices_exceeded, true);
        assert_eq!(RxInfo::from_u16(0x04).max_cascade_exceeded, true);
        assert_eq!(RxInfo::from_u16(0x02).hdcp2_0_repeater_downstream, true);
        assert_eq!(RxInfo::from_u16(0x01).hdcp1_x_device_downstream, true);
        assert_eq!(RxInfo::from_u16(0x00), RxInfo::default());
    }

    #[test]
    fn rxinfo_field_saturation() {
        let info = RxInfo {
            depth: 7,
            device_count: 31,
            ..RxInfo::default()
        };
        let unpacked = RxInfo::from_u16(info.to_u16());
        assert_eq!(unpacked.depth, 7);
        assert_eq!(unpacked.device_count, 31);
    }

    #[test]
    fn rxinfo_wire_is_big_endian() {
        let info = RxInfo {
            depth: 1,
            ..RxInfo::default()
        };
        // depth=1 -> bit 9 -> 0x0200
        assert_eq!(info.to_bytes(), [0x02, 0x00]);
    }

    // -----------------------------------------------------------------------
    // Receiver-ID list
    // -----------------------------------------------------------------------

    fn sample_list(n: u8) -> ReceiverIdList {
        ReceiverIdList {
            rx_info: RxInfo {
                depth: 1,
                device_count: n,
                ..RxInfo::default()
            },
            seq_num_v: 0,
            v_prime: [0x5a; 16],
            ids: (0..n)
                .map(|i| ReceiverId::new([i, i, i, i, i]))
                .collect(),
        }
    }

    #[test]
    fn list_roundtrip() {
        let msg = Message::ReceiverIdList(sample_list(3));
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 22 + 3 * 5);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn list_length_must_match_device_count() {
        let mut bytes = Message::ReceiverIdList(sample_list(3)).encode();
        bytes.truncate(bytes.len() - 5); // drop one ID, keep count=3
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::SizeMismatch {
                expected: 37,
                actual: 32
            })
        );
    }

    #[test]
    fn empty_list_is_valid() {
        let msg = Message::ReceiverIdList(sample_list(0));
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 22);
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn seq_num_v_is_24_bit_big_endian() {
        let mut list = sample_list(0);
        list.seq_num_v = 0x0102_03;
        let bytes = Message::ReceiverIdList(list).encode();
        assert_eq!(&bytes[3..6], &[0x01, 0x02, 0x03]);
    }

    // -----------------------------------------------------------------------
    // Stream manage / ready
    // -----------------------------------------------------------------------

    #[test]
    fn stream_manage_roundtrip() {
        let msg = Message::StreamManage(StreamManage {
            seq_num_m: 5,
            streams: alloc::vec![StreamIdType {
                stream_id: 0,
                stream_type: 1
            }],
        });
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[1..4], &[0, 0, 5]);
        assert_eq!(&bytes[4..6], &[0, 1]); // k = 1
        assert_eq!(Message::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn stream_manage_zero_streams_rejected() {
        let bytes = [16u8, 0, 0, 0, 0, 0];
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::InvalidStreamCount(0))
        );
    }

    #[test]
    fn stream_manage_count_mismatch_rejected() {
        // k = 2 but only one StreamID_Type entry present.
        let bytes = [16u8, 0, 0, 0, 0, 2, 0, 1];
        assert_eq!(
            Message::decode(&bytes),
            Err(MessageError::SizeMismatch {
                expected: 10,
                actual: 8
            })
        );
    }
}
