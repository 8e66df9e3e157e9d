//! Per-session authentication parameters.

use zeroize::{Zeroize, ZeroizeOnDrop};

use hdcp_core::constants::{
    EKH_SIZE, HPRIME_SIZE, KD_SIZE, KM_SIZE, KS_SIZE, LPRIME_SIZE, RIV_SIZE, RN_SIZE, RRX_SIZE,
    RTX_SIZE, RXCAPS_SIZE, TXCAPS_SIZE,
};

/// All key material and nonces negotiated during one authentication attempt.
///
/// Owned exclusively by one engine instance. Cleared (zeroed) at the start of
/// every attempt and on reset; nothing here survives except what the
/// transmitter explicitly promotes into its pairing cache.
#[derive(Default, Zeroize, ZeroizeOnDrop)]
pub struct SessionParams {
    pub rtx: [u8; RTX_SIZE],
    pub rrx: [u8; RRX_SIZE],
    pub tx_caps: [u8; TXCAPS_SIZE],
    pub rx_caps: [u8; RXCAPS_SIZE],
    pub km: [u8; KM_SIZE],
    pub kd: [u8; KD_SIZE],
    pub ks: [u8; KS_SIZE],
    pub riv: [u8; RIV_SIZE],
    pub rn: [u8; RN_SIZE],
    pub h_prime: [u8; HPRIME_SIZE],
    pub l_prime: [u8; LPRIME_SIZE],
    pub ekh_km: [u8; EKH_SIZE],
}

impl SessionParams {
    /// Zero every field in place.
    pub fn clear(&mut self) {
        self.zeroize();
    }
}

impl core::fmt::Debug for SessionParams {
    // Key material stays out of logs.
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionParams").finish_non_exhaustive()
    }
}
