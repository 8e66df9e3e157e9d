//! Receiver certificate handling and RSA operations.
//!
//! The certificate is a fixed 522-byte structure:
//!
//! ```text
//! receiver_id(5) || modulus(128) || exponent(3) || reserved(2) || signature(384)
//! ```
//!
//! The signature is RSASSA-PKCS1-v1_5 with SHA-256 over the first 138 bytes,
//! verified against the trust anchor (3072-bit modulus, exponent 3). The
//! master key is wrapped to the certificate's 1024-bit key with RSAES-OAEP
//! (SHA-256 for both the digest and the mask generation function).

use rsa::{BigUint, Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use hdcp_core::constants::{
    CERT_EXPONENT_SIZE, CERT_MODULUS_SIZE, CERT_SIGNED_LEN, CERT_SIZE, EKH_SIZE, EKPUB_KM_SIZE,
    KM_SIZE, RECEIVER_ID_SIZE,
};
use hdcp_core::types::ReceiverId;

use crate::ekh;
use crate::error::CryptoError;
use crate::provider::{RandomSource, RngAdapter};

/// Borrowed view over a raw certificate.
#[derive(Clone, Copy)]
pub struct Certificate<'a> {
    bytes: &'a [u8; CERT_SIZE],
}

impl<'a> Certificate<'a> {
    pub fn new(bytes: &'a [u8; CERT_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn receiver_id(&self) -> ReceiverId {
        ReceiverId::try_from(&self.bytes[..RECEIVER_ID_SIZE]).expect("slice is 5 bytes")
    }

    pub fn modulus(&self) -> &[u8] {
        &self.bytes[RECEIVER_ID_SIZE..RECEIVER_ID_SIZE + CERT_MODULUS_SIZE]
    }

    pub fn exponent(&self) -> &[u8] {
        let start = RECEIVER_ID_SIZE + CERT_MODULUS_SIZE;
        &self.bytes[start..start + CERT_EXPONENT_SIZE]
    }

    /// The signed prefix (everything before the signature).
    pub fn signed_part(&self) -> &[u8] {
        &self.bytes[..CERT_SIGNED_LEN]
    }

    pub fn signature(&self) -> &[u8] {
        &self.bytes[CERT_SIGNED_LEN..]
    }

    /// The receiver's RSA public key carried in the certificate.
    pub fn public_key(&self) -> Result<RsaPublicKey, CryptoError> {
        RsaPublicKey::new(
            BigUint::from_bytes_be(self.modulus()),
            BigUint::from_bytes_be(self.exponent()),
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}

impl core::fmt::Debug for Certificate<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Certificate")
            .field("receiver_id", &self.receiver_id())
            .finish_non_exhaustive()
    }
}

/// The fixed public key certificates are verified against.
#[derive(Clone)]
pub struct TrustAnchor {
    key: RsaPublicKey,
}

impl TrustAnchor {
    pub fn new(modulus: &[u8], exponent: &[u8]) -> Result<Self, CryptoError> {
        let key = RsaPublicKey::new_with_max_size(
            BigUint::from_bytes_be(modulus),
            BigUint::from_bytes_be(exponent),
            4096,
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { key })
    }
}

impl core::fmt::Debug for TrustAnchor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TrustAnchor").finish_non_exhaustive()
    }
}

/// Verify a certificate's DCP signature against the trust anchor.
pub fn verify_certificate(cert: &Certificate<'_>, anchor: &TrustAnchor) -> Result<(), CryptoError> {
    let digest = Sha256::digest(cert.signed_part());
    anchor
        .key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, cert.signature())
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// Wrap a master key to the certificate's public key.
pub fn encrypt_km(
    cert: &Certificate<'_>,
    km: &[u8; KM_SIZE],
    rng: &mut dyn RandomSource,
) -> Result<[u8; EKPUB_KM_SIZE], CryptoError> {
    let key = cert.public_key()?;
    let ciphertext = key
        .encrypt(&mut RngAdapter(rng), Oaep::new::<Sha256>(), km)
        .map_err(|_| CryptoError::EncryptionFailed)?;
    ciphertext
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            expected: EKPUB_KM_SIZE,
            actual: ciphertext.len(),
        })
}

/// The receiver's RSA private key plus the pairing key `kh` derived from it.
pub struct ReceiverKey {
    rsa: RsaPrivateKey,
    kh: [u8; EKH_SIZE],
}

impl ReceiverKey {
    /// Build from the 64-byte CRT components `p, q, dP, dQ, qInv`.
    ///
    /// Only `p` and `q` feed the RSA key (the public exponent is the
    /// protocol-fixed 65537); the full blob feeds `kh`.
    pub fn from_crt_components(
        p: &[u8; 64],
        q: &[u8; 64],
        dp: &[u8; 64],
        dq: &[u8; 64],
        qinv: &[u8; 64],
    ) -> Result<Self, CryptoError> {
        let mut blob = [0u8; 320];
        for (dst, src) in blob.chunks_exact_mut(64).zip([p, q, dp, dq, qinv]) {
            dst.copy_from_slice(src);
        }
        let kh = ekh::derive_kh(&blob);

        let rsa = RsaPrivateKey::from_p_q(
            BigUint::from_bytes_be(p),
            BigUint::from_bytes_be(q),
            BigUint::from(65537u32),
        )
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self { rsa, kh })
    }

    pub fn kh(&self) -> &[u8; EKH_SIZE] {
        &self.kh
    }

    /// Unwrap a master key encrypted to this receiver's public key.
    pub fn decrypt_km(&self, ekpub_km: &[u8; EKPUB_KM_SIZE]) -> Result<[u8; KM_SIZE], CryptoError> {
        let plaintext = self
            .rsa
            .decrypt(Oaep::new::<Sha256>(), ekpub_km)
            .map_err(|_| CryptoError::DecryptionFailed)?;
        plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength {
                expected: KM_SIZE,
                actual: plaintext.len(),
            })
    }
}

impl core::fmt::Debug for ReceiverKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReceiverKey").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_cert() -> [u8; CERT_SIZE] {
        let ake = hdcp_test_vectors::ake::load();
        hex::decode(&ake.certificate).unwrap().try_into().unwrap()
    }

    fn vector_anchor() -> TrustAnchor {
        let ake = hdcp_test_vectors::ake::load();
        TrustAnchor::new(
            &hex::decode(&ake.trust_anchor.modulus).unwrap(),
            &hex::decode(&ake.trust_anchor.exponent).unwrap(),
        )
        .unwrap()
    }

    fn vector_receiver_key() -> ReceiverKey {
        let ake = hdcp_test_vectors::ake::load();
        let k = &ake.receiver_private_key;
        let comp = |s: &str| -> [u8; 64] { hex::decode(s).unwrap().try_into().unwrap() };
        ReceiverKey::from_crt_components(
            &comp(&k.p),
            &comp(&k.q),
            &comp(&k.dp),
            &comp(&k.dq),
            &comp(&k.qinv),
        )
        .unwrap()
    }

    #[test]
    fn certificate_fields() {
        let bytes = vector_cert();
        let cert = Certificate::new(&bytes);
        assert_eq!(
            cert.receiver_id().to_bytes(),
            [0x8b, 0xa4, 0x47, 0x42, 0xfb]
        );
        assert_eq!(cert.exponent(), &[0x01, 0x00, 0x01]);
        assert_eq!(cert.signed_part().len(), 138);
        assert_eq!(cert.signature().len(), 384);
    }

    #[test]
    fn published_certificate_verifies() {
        let bytes = vector_cert();
        let cert = Certificate::new(&bytes);
        verify_certificate(&cert, &vector_anchor()).unwrap();
    }

    #[test]
    fn corrupted_certificate_rejected() {
        let mut bytes = vector_cert();
        bytes[1] ^= 0xff; // flip a receiver-ID byte inside the signed prefix
        let cert = Certificate::new(&bytes);
        assert!(matches!(
            verify_certificate(&cert, &vector_anchor()),
            Err(CryptoError::SignatureVerificationFailed)
        ));
    }

    #[test]
    fn corrupted_signature_rejected() {
        let mut bytes = vector_cert();
        bytes[CERT_SIZE - 1] ^= 0x01;
        let cert = Certificate::new(&bytes);
        assert!(verify_certificate(&cert, &vector_anchor()).is_err());
    }

    #[test]
    fn published_ekpub_km_decrypts_to_km() {
        let ake = hdcp_test_vectors::ake::load();
        let key = vector_receiver_key();
        let ekpub_km: [u8; 128] = hex::decode(&ake.ekpub_km).unwrap().try_into().unwrap();
        let km = key.decrypt_km(&ekpub_km).unwrap();
        assert_eq!(hex::encode(km), ake.km);
    }

    #[test]
    fn encrypt_with_published_seed_reproduces_vector() {
        use crate::provider::FixedRandom;

        let ake = hdcp_test_vectors::ake::load();
        let bytes = vector_cert();
        let cert = Certificate::new(&bytes);
        let km: [u8; 16] = hex::decode(&ake.km).unwrap().try_into().unwrap();
        let mut rng = FixedRandom::new(hex::decode(&ake.masking_seed).unwrap());

        let ciphertext = encrypt_km(&cert, &km, &mut rng).unwrap();
        assert_eq!(hex::encode(ciphertext), ake.ekpub_km);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let bytes = vector_cert();
        let cert = Certificate::new(&bytes);
        let key = vector_receiver_key();
        let km = [0x5au8; 16];
        let mut rng = crate::provider::CountingRandom::new();

        let ciphertext = encrypt_km(&cert, &km, &mut rng).unwrap();
        assert_eq!(key.decrypt_km(&ciphertext).unwrap(), km);
    }
}
