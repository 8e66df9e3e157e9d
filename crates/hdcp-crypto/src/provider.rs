//! The crypto provider seam between the protocol engines and the primitives.
//!
//! Engines never touch RSA, AES, or randomness directly; they call through
//! [`CryptoProvider`]. [`SoftwareCrypto`] implements the contract in pure
//! software from the functions in this crate; a hardware-backed provider
//! (cipher core, true-RNG, modular multiplier) implements the same trait.
//!
//! Randomness is injected via [`RandomSource`], so deterministic tests never
//! need conditional compilation: swap [`OsRandom`] for [`CountingRandom`] or
//! [`FixedRandom`] at construction time.

use hdcp_core::constants::{
    EKPUB_KM_SIZE, HPRIME_SIZE, KD_SIZE, KM_SIZE, KS_SIZE, LPRIME_SIZE, MPRIME_SIZE, RIV_SIZE,
    RN_SIZE, RRX_SIZE, RTX_SIZE, RXCAPS_SIZE, RXINFO_SIZE, SEQ_NUM_M_SIZE, SEQ_NUM_V_SIZE,
    TXCAPS_SIZE,
};

use crate::cert::{self, Certificate, ReceiverKey, TrustAnchor};
use crate::ekh;
use crate::error::CryptoError;
use crate::kdf;

/// Direction the content cipher runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherMode {
    Transmit,
    Receive,
}

/// Source of random bytes.
pub trait RandomSource {
    fn fill(&mut self, out: &mut [u8]);
}

/// Operating-system randomness via `rand`.
#[derive(Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&mut self, out: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(out);
    }
}

/// Deterministic source yielding an incrementing byte pattern. Test use only.
#[derive(Debug, Default)]
pub struct CountingRandom {
    next: u8,
}

impl CountingRandom {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RandomSource for CountingRandom {
    fn fill(&mut self, out: &mut [u8]) {
        for byte in out {
            *byte = self.next;
            self.next = self.next.wrapping_add(1);
        }
    }
}

/// Deterministic source replaying a fixed byte sequence, for reproducing
/// published vectors (e.g. the OAEP masking seed).
///
/// # Panics
///
/// Panics when more bytes are drawn than were supplied.
#[derive(Debug)]
pub struct FixedRandom {
    bytes: Vec<u8>,
    pos: usize,
}

impl FixedRandom {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl RandomSource for FixedRandom {
    fn fill(&mut self, out: &mut [u8]) {
        let end = self.pos + out.len();
        assert!(
            end <= self.bytes.len(),
            "FixedRandom exhausted: {} bytes requested past the end",
            end - self.bytes.len()
        );
        out.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
    }
}

/// Bridge from [`RandomSource`] to the `rand_core` traits the `rsa` crate
/// consumes for OAEP seed generation.
pub(crate) struct RngAdapter<'a>(pub &'a mut dyn RandomSource);

impl rand::RngCore for RngAdapter<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.fill(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.fill(dest);
        Ok(())
    }
}

impl rand::CryptoRng for RngAdapter<'_> {}

/// The operations the protocol engines require of a crypto implementation.
pub trait CryptoProvider {
    /// Verify a receiver certificate's signature against the trust anchor.
    fn verify_certificate(
        &self,
        cert: &Certificate<'_>,
        anchor: &TrustAnchor,
    ) -> Result<(), CryptoError>;

    /// RSAES-OAEP-wrap a master key to the certificate's public key.
    fn encrypt_km(
        &mut self,
        cert: &Certificate<'_>,
        km: &[u8; KM_SIZE],
    ) -> Result<[u8; EKPUB_KM_SIZE], CryptoError>;

    /// Unwrap a master key with the receiver's private key.
    fn decrypt_km(&self, ekpub_km: &[u8; EKPUB_KM_SIZE]) -> Result<[u8; KM_SIZE], CryptoError>;

    /// Apply the receiver's pairing pad; one call builds `Ekh(Km)` from `Km`
    /// and the symmetric call recovers `Km` from `Ekh(Km)`.
    fn compute_ekh(
        &self,
        m: &[u8; KM_SIZE],
        value: &[u8; KM_SIZE],
    ) -> Result<[u8; KM_SIZE], CryptoError>;

    /// Derive `Kd` and `H'` for the session. Returns `(Kd, H')`.
    fn compute_h_prime(
        &self,
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rx_caps: &[u8; RXCAPS_SIZE],
        tx_caps: &[u8; TXCAPS_SIZE],
    ) -> ([u8; KD_SIZE], [u8; HPRIME_SIZE]);

    /// The locality proof `L'`.
    fn compute_l_prime(
        &self,
        kd: &[u8; KD_SIZE],
        rn: &[u8; RN_SIZE],
        rrx: &[u8; RRX_SIZE],
    ) -> [u8; LPRIME_SIZE];

    /// Mask a session key into `Edkey(Ks)`.
    fn compute_edkey_ks(
        &self,
        ks: &[u8; KS_SIZE],
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rn: &[u8; RN_SIZE],
    ) -> [u8; KS_SIZE];

    /// Recover a session key from `Edkey(Ks)`.
    fn compute_ks(
        &self,
        edkey_ks: &[u8; KS_SIZE],
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rn: &[u8; RN_SIZE],
    ) -> [u8; KS_SIZE];

    /// The repeater topology aggregate hash `V`.
    fn compute_v(
        &self,
        kd: &[u8; KD_SIZE],
        receiver_ids: &[u8],
        rx_info: &[u8; RXINFO_SIZE],
        seq_num_v: &[u8; SEQ_NUM_V_SIZE],
    ) -> [u8; 32];

    /// The content-stream-management hash `M'`.
    fn compute_m(
        &self,
        kd: &[u8; KD_SIZE],
        stream_id_types: &[u8],
        seq_num_m: &[u8; SEQ_NUM_M_SIZE],
    ) -> [u8; MPRIME_SIZE];

    /// Fill `out` with random bytes.
    fn random_bytes(&mut self, out: &mut [u8]);

    /// Hand the negotiated session key and IV to the content cipher.
    fn load_cipher_session_key(&mut self, ks: &[u8; KS_SIZE], riv: &[u8; RIV_SIZE]);

    fn set_cipher_mode(&mut self, mode: CipherMode);

    fn enable_cipher(&mut self);

    /// Disable the cipher and drop any loaded session key.
    fn disable_cipher(&mut self);

    /// Whether a session key is loaded and the cipher is running.
    fn is_encryption_enabled(&self) -> bool;
}

#[derive(Debug)]
struct CipherState {
    mode: CipherMode,
    enabled: bool,
    session_key: Option<([u8; KS_SIZE], [u8; RIV_SIZE])>,
}

/// Pure-software [`CryptoProvider`].
pub struct SoftwareCrypto {
    rng: Box<dyn RandomSource>,
    receiver_key: Option<ReceiverKey>,
    cipher: CipherState,
}

impl SoftwareCrypto {
    /// A provider without a receiver private key (transmitter side).
    pub fn new(rng: Box<dyn RandomSource>) -> Self {
        Self {
            rng,
            receiver_key: None,
            cipher: CipherState {
                mode: CipherMode::Transmit,
                enabled: false,
                session_key: None,
            },
        }
    }

    /// A provider owning the receiver's private key (receiver side).
    pub fn with_receiver_key(rng: Box<dyn RandomSource>, key: ReceiverKey) -> Self {
        let mut provider = Self::new(rng);
        provider.receiver_key = Some(key);
        provider
    }

    /// The session key and IV currently loaded into the cipher front.
    pub fn loaded_session_key(&self) -> Option<&([u8; KS_SIZE], [u8; RIV_SIZE])> {
        self.cipher.session_key.as_ref()
    }

    pub fn cipher_mode(&self) -> CipherMode {
        self.cipher.mode
    }
}

impl core::fmt::Debug for SoftwareCrypto {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftwareCrypto")
            .field("has_receiver_key", &self.receiver_key.is_some())
            .field("cipher", &self.cipher)
            .finish_non_exhaustive()
    }
}

impl CryptoProvider for SoftwareCrypto {
    fn verify_certificate(
        &self,
        cert: &Certificate<'_>,
        anchor: &TrustAnchor,
    ) -> Result<(), CryptoError> {
        cert::verify_certificate(cert, anchor)
    }

    fn encrypt_km(
        &mut self,
        cert: &Certificate<'_>,
        km: &[u8; KM_SIZE],
    ) -> Result<[u8; EKPUB_KM_SIZE], CryptoError> {
        cert::encrypt_km(cert, km, self.rng.as_mut())
    }

    fn decrypt_km(&self, ekpub_km: &[u8; EKPUB_KM_SIZE]) -> Result<[u8; KM_SIZE], CryptoError> {
        let key = self.receiver_key.as_ref().ok_or(CryptoError::NoPrivateKey)?;
        key.decrypt_km(ekpub_km)
    }

    fn compute_ekh(
        &self,
        m: &[u8; KM_SIZE],
        value: &[u8; KM_SIZE],
    ) -> Result<[u8; KM_SIZE], CryptoError> {
        let key = self.receiver_key.as_ref().ok_or(CryptoError::NoPrivateKey)?;
        Ok(ekh::ekh_pad(key.kh(), m, value))
    }

    fn compute_h_prime(
        &self,
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rx_caps: &[u8; RXCAPS_SIZE],
        tx_caps: &[u8; TXCAPS_SIZE],
    ) -> ([u8; KD_SIZE], [u8; HPRIME_SIZE]) {
        let kd = kdf::session_kd(km, rtx, rrx);
        let h = kdf::h_prime(&kd, rtx, rx_caps, tx_caps);
        (kd, h)
    }

    fn compute_l_prime(
        &self,
        kd: &[u8; KD_SIZE],
        rn: &[u8; RN_SIZE],
        rrx: &[u8; RRX_SIZE],
    ) -> [u8; LPRIME_SIZE] {
        kdf::l_prime(kd, rn, rrx)
    }

    fn compute_edkey_ks(
        &self,
        ks: &[u8; KS_SIZE],
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rn: &[u8; RN_SIZE],
    ) -> [u8; KS_SIZE] {
        kdf::mask_session_key(ks, km, rtx, rrx, rn)
    }

    fn compute_ks(
        &self,
        edkey_ks: &[u8; KS_SIZE],
        km: &[u8; KM_SIZE],
        rtx: &[u8; RTX_SIZE],
        rrx: &[u8; RRX_SIZE],
        rn: &[u8; RN_SIZE],
    ) -> [u8; KS_SIZE] {
        kdf::mask_session_key(edkey_ks, km, rtx, rrx, rn)
    }

    fn compute_v(
        &self,
        kd: &[u8; KD_SIZE],
        receiver_ids: &[u8],
        rx_info: &[u8; RXINFO_SIZE],
        seq_num_v: &[u8; SEQ_NUM_V_SIZE],
    ) -> [u8; 32] {
        kdf::topology_v(kd, receiver_ids, rx_info, seq_num_v)
    }

    fn compute_m(
        &self,
        kd: &[u8; KD_SIZE],
        stream_id_types: &[u8],
        seq_num_m: &[u8; SEQ_NUM_M_SIZE],
    ) -> [u8; MPRIME_SIZE] {
        kdf::stream_m(kd, stream_id_types, seq_num_m)
    }

    fn random_bytes(&mut self, out: &mut [u8]) {
        self.rng.fill(out);
    }

    fn load_cipher_session_key(&mut self, ks: &[u8; KS_SIZE], riv: &[u8; RIV_SIZE]) {
        self.cipher.session_key = Some((*ks, *riv));
    }

    fn set_cipher_mode(&mut self, mode: CipherMode) {
        self.cipher.mode = mode;
    }

    fn enable_cipher(&mut self) {
        self.cipher.enabled = true;
    }

    fn disable_cipher(&mut self) {
        self.cipher.enabled = false;
        self.cipher.session_key = None;
    }

    fn is_encryption_enabled(&self) -> bool {
        self.cipher.enabled && self.cipher.session_key.is_some()
    }
}
