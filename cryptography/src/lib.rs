//! Hash ledger content, sign block identifiers, and verify proposer signatures.
//!
//! The ledger treats signature schemes as opaque capabilities: a [Signer] produces the
//! proposer identity, public key, and signature recorded in a block, and a [Verifier]
//! checks them. [secp256r1] provides the default implementation of both.

use bytes::Bytes;
use thiserror::Error;

pub mod secp256r1;
pub mod sha256;
pub use sha256::{double_hash, hash, Digest};

/// Errors that can occur when interacting with cryptographic primitives.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid digest length")]
    InvalidDigestLength,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid signature encoding")]
    InvalidSignature,
}

/// Produces the identity and signature a proposer attaches to a block.
pub trait Signer: Send + Sync {
    /// Address recorded as the block proposer.
    fn address(&self) -> Bytes;

    /// Encoded public key recorded in the block.
    fn public_key(&self) -> Bytes;

    /// Sign a message.
    ///
    /// The message should not be hashed prior to calling this function. If a particular scheme
    /// requires a payload to be hashed before it is signed, it will be done internally.
    fn sign(&self, message: &[u8]) -> Bytes;
}

/// Verifies proposer identities and signatures found in blocks.
pub trait Verifier: Send + Sync {
    /// Verify that `signature` is valid for `message` under `public_key`.
    ///
    /// Returns an error if either the public key or the signature cannot be parsed and
    /// `Ok(false)` if both parse but the signature does not verify.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool, Error>;

    /// Returns whether `address` is the address derived from `public_key`.
    fn address_matches(&self, address: &[u8], public_key: &[u8]) -> bool;
}
