//! Ordered key-value stores with atomic batch writes.
//!
//! Every ledger table is a namespace (key prefix) inside a single [Store]. Changes are staged in
//! a [Batch] and applied with [Store::write], which either applies every change in the batch or
//! none of them. Two implementations are provided:
//!
//! - [memory::Memory]: a volatile store backed by a `BTreeMap`.
//! - [journal::Journal]: a durable store that appends each committed batch to a checksummed
//!   log and rebuilds its index by replaying the log on startup.

use bytes::Bytes;
use thiserror::Error;

mod batch;
pub use batch::Batch;
pub mod journal;
pub mod memory;

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] arbor_codec::Error),
    #[error("record too large: {0}")]
    RecordTooLarge(usize),
}

/// An ordered byte-keyed store that applies batches atomically.
pub trait Store: Send + Sync + 'static {
    /// Get the value stored at `key`, if any.
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error>;

    /// Returns whether a value is stored at `key`.
    fn has(&self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get(key)?.is_some())
    }

    /// Return every key-value pair whose key starts with `prefix`, in ascending key order.
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, Error>;

    /// Atomically apply every change staged in `batch`.
    fn write(&self, batch: Batch) -> Result<(), Error>;
}
