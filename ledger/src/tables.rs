//! Key layout of the ledger tables and a staged view over them.
//!
//! Every table lives in the same [Store] under a one-byte prefix:
//!
//! | prefix | key                      | value                          |
//! |--------|--------------------------|--------------------------------|
//! | `M`    | (none)                   | [LedgerMeta]                   |
//! | `C`    | txid                     | confirmed [Transaction]        |
//! | `B`    | block id                 | header-only [Block]            |
//! | `P`    | block id                 | pending [Block] with its body  |
//! | `H`    | 20-digit zero-padded height | trunk block id at that height |
//! | `T`    | block id                 | decimal height of a branch tip |
//!
//! Mutations go through [Staged], which collects them in a single [Batch] and serves reads
//! from that batch before falling back to the caches and the store. Nothing is visible outside
//! the [Staged] (including the caches) until [Staged::commit] succeeds.

use crate::{
    block::{Block, Transaction},
    cache::BlockCaches,
    Error,
};
use arbor_codec::{Decode, Encode, EncodeSize, Error as CodecError, Read, Write};
use arbor_cryptography::Digest;
use arbor_storage::{Batch, Store};
use bytes::{Buf, BufMut, Bytes};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const META: u8 = b'M';
const CONFIRMED: u8 = b'C';
const BLOCKS: u8 = b'B';
const PENDING: u8 = b'P';
const HEIGHT: u8 = b'H';
const TIPS: u8 = b'T';

/// Key of the meta record.
pub const META_KEY: &[u8] = &[META];

/// Prefix of the blocks table.
pub const BLOCKS_PREFIX: &[u8] = &[BLOCKS];

/// Prefix of the branch-tip table.
pub const TIPS_PREFIX: &[u8] = &[TIPS];

fn prefixed(prefix: u8, key: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(prefix);
    out.extend_from_slice(key);
    Bytes::from(out)
}

pub fn confirmed_key(txid: &[u8]) -> Bytes {
    prefixed(CONFIRMED, txid)
}

pub fn block_key(blockid: &Digest) -> Bytes {
    prefixed(BLOCKS, blockid)
}

pub fn pending_key(blockid: &Digest) -> Bytes {
    prefixed(PENDING, blockid)
}

/// Heights are zero-padded so that keys sort numerically.
pub fn height_key(height: i64) -> Bytes {
    prefixed(HEIGHT, format!("{height:020}").as_bytes())
}

pub fn tip_key(blockid: &Digest) -> Bytes {
    prefixed(TIPS, blockid)
}

/// Decode a branch-tip entry.
pub fn decode_tip(key: &[u8], value: &[u8]) -> Result<(Digest, i64), Error> {
    let blockid = key
        .strip_prefix(TIPS_PREFIX)
        .and_then(|raw| Digest::try_from(raw).ok())
        .ok_or(Error::Corrupt("branch tip key"))?;
    let height = std::str::from_utf8(value)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .ok_or(Error::Corrupt("branch tip height"))?;
    Ok((blockid, height))
}

/// Root, tip, and trunk height of the ledger.
///
/// Held as an immutable snapshot: writers build a new value and swap it in after the batch that
/// persists it has been committed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerMeta {
    pub root_blockid: Option<Digest>,
    pub tip_blockid: Option<Digest>,
    pub trunk_height: i64,
}

impl Write for LedgerMeta {
    fn write(&self, buf: &mut impl BufMut) {
        self.root_blockid.write(buf);
        self.tip_blockid.write(buf);
        self.trunk_height.write(buf);
    }
}

impl EncodeSize for LedgerMeta {
    fn encode_size(&self) -> usize {
        self.root_blockid.encode_size()
            + self.tip_blockid.encode_size()
            + self.trunk_height.encode_size()
    }
}

impl Read for LedgerMeta {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            root_blockid: Option::<Digest>::read(buf)?,
            tip_blockid: Option::<Digest>::read(buf)?,
            trunk_height: i64::read(buf)?,
        })
    }
}

/// Read a header-only block directly from `store`.
pub fn load_block<S: Store>(store: &S, blockid: &Digest) -> Result<Option<Block>, Error> {
    match store.get(&block_key(blockid))? {
        Some(raw) => Ok(Some(Block::decode(raw)?)),
        None => Ok(None),
    }
}

/// Read a confirmed transaction directly from `store`.
pub fn load_transaction<S: Store>(store: &S, txid: &[u8]) -> Result<Option<Transaction>, Error> {
    match store.get(&confirmed_key(txid))? {
        Some(raw) => Ok(Some(Transaction::decode(raw)?)),
        None => Ok(None),
    }
}

/// Read the trunk block id at `height` directly from `store`.
pub fn load_height<S: Store>(store: &S, height: i64) -> Result<Option<Digest>, Error> {
    match store.get(&height_key(height))? {
        Some(raw) => Digest::try_from(raw.as_ref())
            .map(Some)
            .map_err(|_| Error::Corrupt("height index")),
        None => Ok(None),
    }
}

/// Pending changes to the ledger tables.
pub struct Staged<'a, S: Store> {
    store: &'a S,
    caches: &'a BlockCaches,
    batch: Batch,
    staged: HashMap<Digest, Option<Block>>,
    reowned: bool,
}

impl<'a, S: Store> Staged<'a, S> {
    pub fn new(store: &'a S, caches: &'a BlockCaches) -> Self {
        Self {
            store,
            caches,
            batch: Batch::new(),
            staged: HashMap::new(),
            reowned: false,
        }
    }

    /// Header of `blockid` as it would be after commit.
    pub fn block(&self, blockid: &Digest) -> Result<Option<Block>, Error> {
        if let Some(staged) = self.staged.get(blockid) {
            return Ok(staged.clone());
        }
        if let Some(cached) = self.caches.headers.get(blockid) {
            return Ok(Some(cached));
        }
        load_block(self.store, blockid)
    }

    /// Like [Staged::block], but a missing block is an error.
    pub fn require_block(&self, blockid: &Digest) -> Result<Block, Error> {
        self.block(blockid)?.ok_or(Error::BlockNotExist)
    }

    /// Persist the header of `block`, indexing its height if it is on the trunk.
    pub fn save_block(&mut self, block: &Block) {
        self.batch
            .put(block_key(&block.blockid), block.encode_header());
        let header = block.header();
        if header.in_trunk {
            self.put_height(header.height, &header.blockid);
        }
        self.staged.insert(header.blockid, Some(header));
    }

    /// Remove `block` and its height index entry (if it points at it).
    pub fn delete_block(&mut self, block: &Block) -> Result<(), Error> {
        self.batch.delete(block_key(&block.blockid));
        self.unindex(block)?;
        self.staged.insert(block.blockid, None);
        Ok(())
    }

    /// Remove the height index entry of `block` if it points at it.
    pub fn unindex(&mut self, block: &Block) -> Result<(), Error> {
        if self.height(block.height)? == Some(block.blockid) {
            self.batch.delete(height_key(block.height));
        }
        Ok(())
    }

    /// Trunk block id at `height` as it would be after commit.
    pub fn height(&self, height: i64) -> Result<Option<Digest>, Error> {
        match self.batch.get(self.store, &height_key(height))? {
            Some(raw) => Digest::try_from(raw.as_ref())
                .map(Some)
                .map_err(|_| Error::Corrupt("height index")),
            None => Ok(None),
        }
    }

    pub fn put_height(&mut self, height: i64, blockid: &Digest) {
        self.batch.put(height_key(height), Bytes::copy_from_slice(blockid));
    }

    /// Confirmed transaction as it would be after commit.
    pub fn transaction(&self, txid: &[u8]) -> Result<Option<Transaction>, Error> {
        match self.batch.get(self.store, &confirmed_key(txid))? {
            Some(raw) => Ok(Some(Transaction::decode(raw)?)),
            None => Ok(None),
        }
    }

    /// Store `tx` in the confirmed table.
    ///
    /// `previous` is the owner recorded before this write, if the transaction was already
    /// confirmed.
    pub fn put_transaction(&mut self, tx: &Transaction, previous: Option<Digest>) {
        if previous.is_some() && previous != tx.blockid {
            self.reowned = true;
        }
        self.batch
            .put(confirmed_key(&tx.txid), tx.encode().freeze());
    }

    pub fn put_tip(&mut self, blockid: &Digest, height: i64) {
        self.batch
            .put(tip_key(blockid), Bytes::from(height.to_string()));
    }

    pub fn delete_tip(&mut self, blockid: &Digest) {
        self.batch.delete(tip_key(blockid));
    }

    /// Branch tips as they would be after commit, ordered by block id.
    pub fn tips(&self) -> Result<Vec<(Digest, i64)>, Error> {
        let mut entries: BTreeMap<Bytes, Bytes> =
            self.store.scan(TIPS_PREFIX)?.into_iter().collect();
        for (key, value) in self.batch.iter() {
            if !key.starts_with(TIPS_PREFIX) {
                continue;
            }
            match value {
                Some(value) => entries.insert(key.clone(), value.clone()),
                None => entries.remove(key),
            };
        }
        entries
            .iter()
            .map(|(key, value)| decode_tip(key, value))
            .collect()
    }

    pub fn put_meta(&mut self, meta: &LedgerMeta) {
        self.batch.put(Bytes::from_static(META_KEY), meta.encode().freeze());
    }

    pub fn delete_pending(&mut self, blockid: &Digest) {
        self.batch.delete(pending_key(blockid));
    }

    /// Atomically write every staged change, then refresh the caches.
    pub fn commit(self) -> Result<(), Error> {
        let changes = self.batch.len();
        let caches = self.caches;
        let _fence = caches.commit();
        self.store.write(self.batch)?;
        if self.reowned {
            caches.blocks.clear();
        }
        for (blockid, header) in self.staged {
            caches.blocks.remove(&blockid);
            match header {
                Some(header) => caches.headers.put(blockid, header),
                None => caches.headers.remove(&blockid),
            }
        }
        debug!(changes, "committed ledger batch");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_cryptography::hash;
    use arbor_storage::memory::Memory;

    #[test]
    fn test_height_keys_sort() {
        assert!(height_key(9) < height_key(10));
        assert!(height_key(99) < height_key(100));
        assert_eq!(height_key(7).len(), 21);
    }

    #[test]
    fn test_prefixes_disjoint() {
        let prefixes = [META, CONFIRMED, BLOCKS, PENDING, HEIGHT, TIPS];
        for (i, a) in prefixes.iter().enumerate() {
            for b in &prefixes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_decode_tip() {
        let id = hash(b"tip");
        let (decoded, height) = decode_tip(&tip_key(&id), b"42").unwrap();
        assert_eq!(decoded, id);
        assert_eq!(height, 42);
        assert!(matches!(
            decode_tip(&tip_key(&id), b"x"),
            Err(Error::Corrupt(_))
        ));
        assert!(matches!(
            decode_tip(b"Tshort", b"1"),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn test_meta_codec() {
        let meta = LedgerMeta {
            root_blockid: Some(hash(b"root")),
            tip_blockid: Some(hash(b"tip")),
            trunk_height: 9,
        };
        assert_eq!(LedgerMeta::decode(meta.encode()).unwrap(), meta);
    }

    #[test]
    fn test_staged_isolation() {
        let store = Memory::default();
        let caches = BlockCaches::new(4, 4);
        let block = Block {
            blockid: hash(b"a"),
            height: 1,
            in_trunk: true,
            ..Default::default()
        };

        let mut staged = Staged::new(&store, &caches);
        staged.save_block(&block);
        staged.put_tip(&block.blockid, 1);

        // Visible through the staged view only
        assert_eq!(staged.block(&block.blockid).unwrap(), Some(block.clone()));
        assert_eq!(staged.height(1).unwrap(), Some(block.blockid));
        assert_eq!(staged.tips().unwrap(), vec![(block.blockid, 1)]);
        assert!(load_block(&store, &block.blockid).unwrap().is_none());
        assert!(caches.headers.is_empty());

        staged.commit().unwrap();
        assert_eq!(load_block(&store, &block.blockid).unwrap(), Some(block.clone()));
        assert_eq!(load_height(&store, 1).unwrap(), Some(block.blockid));
        assert_eq!(caches.headers.get(&block.blockid), Some(block));
    }

    #[test]
    fn test_save_block_strips_body() {
        let store = Memory::default();
        let caches = BlockCaches::new(4, 4);
        let tx = Transaction {
            txid: Bytes::from_static(b"tx"),
            ..Default::default()
        };
        let block = Block {
            blockid: hash(b"full"),
            height: 2,
            tx_count: 1,
            merkle_tree: vec![Some(tx.txid.clone())],
            transactions: vec![tx],
            ..Default::default()
        };

        let mut staged = Staged::new(&store, &caches);
        staged.save_block(&block);
        assert_eq!(staged.block(&block.blockid).unwrap(), Some(block.header()));
        staged.commit().unwrap();

        let stored = load_block(&store, &block.blockid).unwrap().unwrap();
        assert!(stored.transactions.is_empty());
        assert_eq!(stored, block.header());
        assert_eq!(stored.txids().collect::<Vec<_>>(), block.txids().collect::<Vec<_>>());
        assert_eq!(caches.headers.get(&block.blockid), Some(block.header()));
    }

    #[test]
    fn test_staged_delete() {
        let store = Memory::default();
        let caches = BlockCaches::new(4, 4);
        let block = Block {
            blockid: hash(b"a"),
            height: 3,
            in_trunk: true,
            ..Default::default()
        };
        let mut staged = Staged::new(&store, &caches);
        staged.save_block(&block);
        staged.put_tip(&block.blockid, 3);
        staged.commit().unwrap();

        let mut staged = Staged::new(&store, &caches);
        staged.delete_block(&block).unwrap();
        staged.delete_tip(&block.blockid);
        assert!(staged.block(&block.blockid).unwrap().is_none());
        assert!(staged.height(3).unwrap().is_none());
        assert!(staged.tips().unwrap().is_empty());
        staged.commit().unwrap();

        assert!(caches.headers.get(&block.blockid).is_none());
        assert!(load_block(&store, &block.blockid).unwrap().is_none());
        assert!(load_height(&store, 3).unwrap().is_none());
    }
}
