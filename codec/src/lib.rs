//! Serialize ledger records and block preimages.
//!
//! # Overview
//!
//! A small binary codec used for two purposes:
//! - Persisting blocks, transactions, and ledger metadata in a key-value store.
//! - Producing the canonical byte preimage that block identifiers are hashed over.
//!
//! Because the same encoding feeds a hash, it is fully deterministic: integers are
//! written big-endian at fixed width, variable-length byte strings and collections carry
//! a `u32` length prefix, and optional values carry a one-byte presence tag.
//!
//! # Example
//!
//! ```
//! use bytes::{Buf, BufMut, Bytes};
//! use arbor_codec::{Decode, Encode, EncodeSize, Error, Read, Write};
//!
//! #[derive(Debug, PartialEq)]
//! struct Entry {
//!     height: i64,
//!     parent: Option<Bytes>,
//! }
//!
//! impl Write for Entry {
//!     fn write(&self, buf: &mut impl BufMut) {
//!         self.height.write(buf);
//!         self.parent.write(buf);
//!     }
//! }
//!
//! impl EncodeSize for Entry {
//!     fn encode_size(&self) -> usize {
//!         self.height.encode_size() + self.parent.encode_size()
//!     }
//! }
//!
//! impl Read for Entry {
//!     fn read(buf: &mut impl Buf) -> Result<Self, Error> {
//!         let height = i64::read(buf)?;
//!         let parent = Option::<Bytes>::read(buf)?;
//!         Ok(Self { height, parent })
//!     }
//! }
//!
//! let entry = Entry { height: 7, parent: Some(Bytes::from_static(b"root")) };
//! let encoded = entry.encode();
//! assert_eq!(Entry::decode(encoded).unwrap(), entry);
//! ```

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{Decode, Encode, EncodeSize, Read, Write};
pub use error::Error;
