//! Support for batching changes to an underlying [Store].

use crate::{Error, Store};
use arbor_codec::{EncodeSize, Error as CodecError, Read, Write};
use bytes::{Buf, BufMut, Bytes};
use std::collections::BTreeMap;

/// A batch of changes which may be written to an underlying store with [Store::write].
///
/// Writes and deletes to a batch are not applied to the store until the batch is written
/// but are reflected in reads made through [Batch::get].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Batch {
    /// The diff of changes to the store.
    ///
    /// If the value is Some, the key is being created or updated.
    /// If the value is None, the key is being deleted.
    ///
    /// We use a BTreeMap instead of HashMap to allow for a deterministic iteration order.
    diff: BTreeMap<Bytes, Option<Bytes>>,
}

impl Batch {
    /// Returns a new, empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `value` at `key`.
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        self.diff.insert(key.into(), Some(value.into()));
    }

    /// Stage the removal of `key`.
    pub fn delete(&mut self, key: impl Into<Bytes>) {
        self.diff.insert(key.into(), None);
    }

    /// Returns the staged change for `key`, if any.
    ///
    /// `Some(None)` means the key is staged for deletion.
    pub fn staged(&self, key: &[u8]) -> Option<Option<&Bytes>> {
        self.diff.get(key).map(Option::as_ref)
    }

    /// Returns the value of `key` in the batch, or the value in `store` if the batch does not
    /// touch it.
    pub fn get<S: Store + ?Sized>(&self, store: &S, key: &[u8]) -> Result<Option<Bytes>, Error> {
        match self.staged(key) {
            Some(value) => Ok(value.cloned()),
            None => store.get(key),
        }
    }

    /// Discard every staged change.
    pub fn reset(&mut self) {
        self.diff.clear();
    }

    /// Number of staged changes.
    pub fn len(&self) -> usize {
        self.diff.len()
    }

    /// Returns whether no change is staged.
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }

    /// Iterate over staged changes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, Option<&Bytes>)> {
        self.diff.iter().map(|(key, value)| (key, value.as_ref()))
    }
}

impl IntoIterator for Batch {
    type Item = (Bytes, Option<Bytes>);
    type IntoIter = std::collections::btree_map::IntoIter<Bytes, Option<Bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.diff.into_iter()
    }
}

impl Write for Batch {
    fn write(&self, buf: &mut impl BufMut) {
        self.diff.write(buf);
    }
}

impl EncodeSize for Batch {
    fn encode_size(&self) -> usize {
        self.diff.encode_size()
    }
}

impl Read for Batch {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let diff = BTreeMap::<Bytes, Option<Bytes>>::read(buf)?;
        Ok(Self { diff })
    }
}
