//! Protocol constants: field sizes, message sizes, and handshake limits.

/// Transmitter nonce `Rtx` size in bytes.
pub const RTX_SIZE: usize = 8;

/// Receiver nonce `Rrx` size in bytes.
pub const RRX_SIZE: usize = 8;

/// Locality-check nonce `Rn` size in bytes.
pub const RN_SIZE: usize = 8;

/// Initialization vector `Riv` size in bytes.
pub const RIV_SIZE: usize = 8;

/// Master key `Km` size in bytes.
pub const KM_SIZE: usize = 16;

/// Session key `Ks` size in bytes.
pub const KS_SIZE: usize = 16;

/// Pairing blob `Ekh(Km)` size in bytes.
pub const EKH_SIZE: usize = 16;

/// Derived key `Kd` size in bytes (`dkey0 || dkey1`).
pub const KD_SIZE: usize = 32;

/// `H'` hash size in bytes.
pub const HPRIME_SIZE: usize = 32;

/// `L'` hash size in bytes.
pub const LPRIME_SIZE: usize = 32;

/// `M'` hash size in bytes.
pub const MPRIME_SIZE: usize = 32;

/// Size of the `V'` half carried in the receiver-ID-list message (the
/// most-significant 128 bits of `V`; the ack returns the other half).
pub const VPRIME_SIZE: usize = 16;

/// Transmitter capability field size in bytes.
pub const TXCAPS_SIZE: usize = 3;

/// Receiver capability field size in bytes.
pub const RXCAPS_SIZE: usize = 3;

/// Receiver ID size in bytes.
pub const RECEIVER_ID_SIZE: usize = 5;

/// Receiver certificate size in bytes:
/// `receiver_id(5) || modulus(128) || exponent(3) || reserved(2) || signature(384)`.
pub const CERT_SIZE: usize = 522;

/// Receiver RSA modulus size in bytes (1024-bit key).
pub const CERT_MODULUS_SIZE: usize = 128;

/// Receiver RSA public exponent field size in bytes.
pub const CERT_EXPONENT_SIZE: usize = 3;

/// DCP signature size in bytes (3072-bit trust anchor).
pub const CERT_SIGNATURE_SIZE: usize = 384;

/// Offset of the signature within the certificate; the signature covers
/// everything before it.
pub const CERT_SIGNED_LEN: usize = CERT_SIZE - CERT_SIGNATURE_SIZE;

/// RSAES-OAEP ciphertext size for the wrapped master key.
pub const EKPUB_KM_SIZE: usize = 128;

/// Repeater topology `RxInfo` field size in bytes.
pub const RXINFO_SIZE: usize = 2;

/// `seq_num_V` field size in bytes (24-bit big-endian).
pub const SEQ_NUM_V_SIZE: usize = 3;

/// `seq_num_M` field size in bytes (24-bit big-endian).
pub const SEQ_NUM_M_SIZE: usize = 3;

/// One `StreamID_Type` entry size in bytes.
pub const STREAM_ID_TYPE_SIZE: usize = 2;

/// Maximum downstream devices a repeater may report before the
/// max-devices-exceeded flag must be raised.
pub const MAX_DEVICE_COUNT: usize = 31;

/// Maximum cascade depth before the max-cascade-exceeded flag must be raised.
pub const MAX_CASCADE_DEPTH: u8 = 4;

/// Maximum locality-check initiations permitted per authentication session.
pub const MAX_LC_INIT_ATTEMPTS: u32 = 1024;

/// `seq_num_V` / `seq_num_M` wrap modulus (24-bit counters).
pub const SEQ_NUM_MODULUS: u32 = 1 << 24;

/// Size of the largest handshake message (AKE_Send_Cert).
pub const MAX_MESSAGE_SIZE: usize = 534;
