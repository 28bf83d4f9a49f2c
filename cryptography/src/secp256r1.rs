//! Secp256r1 implementation of the [Signer] and [Verifier] traits.
//!
//! Public keys are recorded in compressed form (SEC 1, Version 2.0, Section 2.3.3), signatures
//! are deterministic ([RFC 6979](https://datatracker.ietf.org/doc/html/rfc6979)) and normalized
//! to low-s form ([BIP 62](https://github.com/bitcoin/bips/blob/master/bip-0062.mediawiki#low-s-values-in-signatures)).
//!
//! A proposer address is the lowercase hex encoding of the first 20 bytes of the SHA-256
//! digest of the compressed public key.
//!
//! # Example
//! ```rust
//! use arbor_cryptography::{secp256r1::{PrivateKey, Secp256r1}, Signer, Verifier};
//!
//! let signer = PrivateKey::from_seed(7);
//! let signature = signer.sign(b"block id");
//! let verified = Secp256r1.verify(&signer.public_key(), b"block id", &signature).unwrap();
//! assert!(verified);
//! assert!(Secp256r1.address_matches(&signer.address(), &signer.public_key()));
//! ```

use crate::{sha256, Error, Signer, Verifier};
use bytes::Bytes;
use p256::{
    ecdsa::{
        signature::{Signer as _, Verifier as _},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::scalar::IsHigh,
};
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};

const PRIVATE_KEY_LENGTH: usize = 32;
const PUBLIC_KEY_LENGTH: usize = 33; // Y-Parity || X
const SIGNATURE_LENGTH: usize = 64; // R || S
const ADDRESS_LENGTH: usize = 20;

/// Derive the address for a compressed public key.
pub fn derive_address(public_key: &[u8]) -> Bytes {
    let digest = sha256::hash(public_key);
    Bytes::from(hex::encode(&digest[..ADDRESS_LENGTH]))
}

/// Secp256r1 private key.
#[derive(Clone)]
pub struct PrivateKey {
    signer: SigningKey,
    public_key: Bytes,
    address: Bytes,
}

impl PrivateKey {
    /// Create a fresh [PrivateKey] using the supplied RNG.
    pub fn from_rng<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::random(rng))
    }

    /// Create a [PrivateKey] from a seed.
    ///
    /// # Warning
    ///
    /// This function is insecure and should only be used for examples
    /// and testing.
    pub fn from_seed(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_rng(&mut rng)
    }

    /// Parse a 32-byte scalar.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, Error> {
        if raw.len() != PRIVATE_KEY_LENGTH {
            return Err(Error::InvalidPrivateKey);
        }
        let signer = SigningKey::from_slice(raw).map_err(|_| Error::InvalidPrivateKey)?;
        Ok(Self::from_signing_key(signer))
    }

    /// Serialize the scalar.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.signer.to_bytes())
    }

    fn from_signing_key(signer: SigningKey) -> Self {
        let public_key = Bytes::copy_from_slice(
            signer
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes(),
        );
        let address = derive_address(&public_key);
        Self {
            signer,
            public_key,
            address,
        }
    }
}

impl Signer for PrivateKey {
    fn address(&self) -> Bytes {
        self.address.clone()
    }

    fn public_key(&self) -> Bytes {
        self.public_key.clone()
    }

    fn sign(&self, message: &[u8]) -> Bytes {
        let signature: Signature = self.signer.sign(message);
        let signature = signature.normalize_s().unwrap_or(signature);
        Bytes::copy_from_slice(&signature.to_bytes())
    }
}

/// Secp256r1 verifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct Secp256r1;

impl Verifier for Secp256r1 {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, Error> {
        if public_key.len() != PUBLIC_KEY_LENGTH {
            return Err(Error::InvalidPublicKey);
        }
        if signature.len() != SIGNATURE_LENGTH {
            return Err(Error::InvalidSignature);
        }
        let verifier =
            VerifyingKey::from_sec1_bytes(public_key).map_err(|_| Error::InvalidPublicKey)?;
        let signature = Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;
        if signature.s().is_high().into() {
            // Reject any signatures with a `s` value in the upper half of the curve order.
            return Ok(false);
        }
        Ok(verifier.verify(message, &signature).is_ok())
    }

    fn address_matches(&self, address: &[u8], public_key: &[u8]) -> bool {
        !address.is_empty() && derive_address(public_key).as_ref() == address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_sign_verify() {
        let signer = PrivateKey::from_seed(0);
        let message = b"hello, world!";
        let signature = signer.sign(message);
        assert_eq!(signature.len(), SIGNATURE_LENGTH);
        assert_eq!(signer.public_key().len(), PUBLIC_KEY_LENGTH);
        assert!(Secp256r1
            .verify(&signer.public_key(), message, &signature)
            .unwrap());
    }

    #[test]
    fn test_deterministic_signatures() {
        let signer = PrivateKey::from_seed(1);
        assert_eq!(signer.sign(b"payload"), signer.sign(b"payload"));
    }

    #[test]
    fn test_wrong_message() {
        let signer = PrivateKey::from_seed(2);
        let signature = signer.sign(b"payload");
        assert!(!Secp256r1
            .verify(&signer.public_key(), b"other", &signature)
            .unwrap());
    }

    #[test]
    fn test_wrong_key() {
        let signer = PrivateKey::from_seed(3);
        let other = PrivateKey::from_seed(4);
        let signature = signer.sign(b"payload");
        assert!(!Secp256r1
            .verify(&other.public_key(), b"payload", &signature)
            .unwrap());
    }

    #[test_case(&[0u8; 32], Error::InvalidPublicKey; "short key")]
    #[test_case(&[0u8; 33], Error::InvalidPublicKey; "invalid point")]
    fn test_invalid_public_key(public_key: &[u8], expected: Error) {
        let signer = PrivateKey::from_seed(5);
        let signature = signer.sign(b"payload");
        assert_eq!(
            Secp256r1.verify(public_key, b"payload", &signature),
            Err(expected)
        );
    }

    #[test]
    fn test_invalid_signature_length() {
        let signer = PrivateKey::from_seed(6);
        assert_eq!(
            Secp256r1.verify(&signer.public_key(), b"payload", &[1u8; 63]),
            Err(Error::InvalidSignature)
        );
    }

    #[test]
    fn test_private_key_roundtrip() {
        let signer = PrivateKey::from_seed(8);
        let restored = PrivateKey::from_bytes(&signer.to_bytes()).unwrap();
        assert_eq!(restored.public_key(), signer.public_key());
        assert!(matches!(
            PrivateKey::from_bytes(&[0u8; 31]),
            Err(Error::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_address() {
        let signer = PrivateKey::from_seed(9);
        let other = PrivateKey::from_seed(10);
        assert_eq!(signer.address().len(), ADDRESS_LENGTH * 2);
        assert!(Secp256r1.address_matches(&signer.address(), &signer.public_key()));
        assert!(!Secp256r1.address_matches(&other.address(), &signer.public_key()));
        assert!(!Secp256r1.address_matches(b"", &signer.public_key()));
    }
}
