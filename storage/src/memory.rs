//! A volatile [Store] backed by a `BTreeMap`.
//!
//! Clones share the same underlying map, so a store can be handed to several owners (for
//! example, to reopen a ledger over the same data in tests).

use crate::{Batch, Error, Store};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{collections::BTreeMap, ops::Bound, sync::Arc};

/// In-memory implementation of [Store].
#[derive(Clone, Default)]
pub struct Memory {
    data: Arc<Mutex<BTreeMap<Bytes, Bytes>>>,
}

impl Memory {
    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl Store for Memory {
    fn get(&self, key: &[u8]) -> Result<Option<Bytes>, Error> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Bytes, Bytes)>, Error> {
        let data = self.data.lock();
        Ok(scan_prefix(&data, prefix))
    }

    fn write(&self, batch: Batch) -> Result<(), Error> {
        let mut data = self.data.lock();
        apply(&mut data, batch);
        Ok(())
    }
}

/// Collect every entry of `data` whose key starts with `prefix`.
pub(crate) fn scan_prefix(data: &BTreeMap<Bytes, Bytes>, prefix: &[u8]) -> Vec<(Bytes, Bytes)> {
    data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Apply every change in `batch` to `data`.
pub(crate) fn apply(data: &mut BTreeMap<Bytes, Bytes>, batch: Batch) {
    for (key, value) in batch {
        match value {
            Some(value) => {
                data.insert(key, value);
            }
            None => {
                data.remove(&key);
            }
        }
    }
}
