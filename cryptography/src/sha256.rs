//! SHA-256 digests.
//!
//! Ledger identifiers (block ids, transaction ids, and Merkle nodes) use [double_hash], SHA-256
//! applied twice.
//!
//! # Example
//! ```rust
//! use arbor_cryptography::{double_hash, hash};
//!
//! let once = hash(b"hello world");
//! let twice = double_hash(b"hello world");
//! assert_eq!(twice, hash(&once));
//! println!("digest: {}", twice);
//! ```

use crate::Error;
use arbor_codec::{EncodeSize, Error as CodecError, Read, Write};
use bytes::{Buf, BufMut};
use sha2::{Digest as _, Sha256};
use std::{
    fmt::{Debug, Display},
    ops::Deref,
};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LENGTH: usize = 32;

/// Generate a SHA-256 digest from a message.
pub fn hash(message: &[u8]) -> Digest {
    let array: [u8; DIGEST_LENGTH] = Sha256::digest(message).into();
    Digest::from(array)
}

/// Generate SHA-256(SHA-256(message)).
pub fn double_hash(message: &[u8]) -> Digest {
    hash(&hash(message))
}

/// Digest of a SHA-256 hashing operation.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Digest([u8; DIGEST_LENGTH]);

impl Write for Digest {
    fn write(&self, buf: &mut impl BufMut) {
        self.0.write(buf);
    }
}

impl EncodeSize for Digest {
    fn encode_size(&self) -> usize {
        DIGEST_LENGTH
    }
}

impl Read for Digest {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        <[u8; DIGEST_LENGTH]>::read(buf).map(Self)
    }
}

impl From<[u8; DIGEST_LENGTH]> for Digest {
    fn from(value: [u8; DIGEST_LENGTH]) -> Self {
        Self(value)
    }
}

impl TryFrom<&[u8]> for Digest {
    type Error = Error;
    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; DIGEST_LENGTH] =
            value.try_into().map_err(|_| Error::InvalidDigestLength)?;
        Ok(Self(array))
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Digest {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_codec::{Decode, Encode};

    const HELLO_DIGEST: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_hash() {
        assert_eq!(hex::encode(hash(b"hello world")), HELLO_DIGEST);
        assert_eq!(hash(b"hello world").to_string(), HELLO_DIGEST);
    }

    #[test]
    fn test_double_hash() {
        let msg = b"hello world";
        let expected = hash(hash(msg).as_ref());
        assert_eq!(double_hash(msg), expected);
        assert_ne!(double_hash(msg), hash(msg));
    }

    #[test]
    fn test_digest_codec() {
        let digest = hash(b"hello world");
        let encoded = digest.encode();
        assert_eq!(encoded.len(), DIGEST_LENGTH);
        assert_eq!(Digest::decode(encoded).unwrap(), digest);
    }

    #[test]
    fn test_digest_from_slice() {
        let digest = hash(b"hello world");
        assert_eq!(Digest::try_from(&digest[..]).unwrap(), digest);
        assert_eq!(
            Digest::try_from(&digest[..31]),
            Err(Error::InvalidDigestLength)
        );
    }
}
