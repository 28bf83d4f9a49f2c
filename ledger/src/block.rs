//! Blocks, transactions, and quorum certificates as stored by the ledger.
//!
//! A [Block] is persisted twice over its lifetime: once in header-only form (its
//! `transactions` emptied, its `merkle_tree` kept so the body can be rebuilt) in the blocks
//! table, and once per [Transaction] in the confirmed table. The same encoding is used for
//! both and for pending blocks, which keep their body.

use arbor_codec::{Encode, EncodeSize, Error as CodecError, Read, Write};
use arbor_cryptography::{double_hash, Digest};
use bytes::{Buf, BufMut, Bytes};
use num_bigint::BigUint;
use std::collections::BTreeMap;

/// Version of the genesis block.
pub const ROOT_BLOCK_VERSION: i32 = 0;

/// Version of every other block.
pub const BLOCK_VERSION: i32 = 1;

/// A reference to an output of an earlier transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxInput {
    pub ref_txid: Bytes,
    pub ref_offset: u32,
    pub from_addr: Bytes,
    /// Big-endian unsigned amount.
    pub amount: Bytes,
}

/// A transfer to an address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOutput {
    /// Big-endian unsigned amount.
    pub amount: Bytes,
    pub to_addr: Bytes,
}

impl TxOutput {
    /// Create an output paying `amount` to `to_addr`.
    pub fn new(amount: &BigUint, to_addr: impl Into<Bytes>) -> Self {
        Self {
            amount: Bytes::from(amount.to_bytes_be()),
            to_addr: to_addr.into(),
        }
    }

    /// Decoded amount.
    pub fn value(&self) -> BigUint {
        BigUint::from_bytes_be(&self.amount)
    }
}

/// A transaction. Everything but `blockid` is opaque to the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub txid: Bytes,
    /// Block that currently owns this transaction. Rewritten when a reorganization moves
    /// ownership to a block on the new trunk.
    pub blockid: Option<Digest>,
    pub coinbase: bool,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    /// Payload consumed by contract and consensus layers (the genesis configuration for the
    /// root coinbase).
    pub desc: Bytes,
    pub timestamp: i64,
}

impl Transaction {
    /// Deterministic id over everything except `txid` and `blockid`.
    pub fn make_txid(&self) -> Bytes {
        let mut buf = Vec::with_capacity(self.content_size());
        self.write_content(&mut buf);
        Bytes::copy_from_slice(&double_hash(&buf))
    }

    fn write_content(&self, buf: &mut impl BufMut) {
        self.coinbase.write(buf);
        self.inputs.write(buf);
        self.outputs.write(buf);
        self.desc.write(buf);
        self.timestamp.write(buf);
    }

    fn content_size(&self) -> usize {
        self.coinbase.encode_size()
            + self.inputs.encode_size()
            + self.outputs.encode_size()
            + self.desc.encode_size()
            + self.timestamp.encode_size()
    }
}

/// A signature contained in a [QuorumCert].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QcSignature {
    pub address: Bytes,
    pub public_key: Bytes,
    pub sign: Bytes,
}

/// BFT quorum certificate justifying a block. Hashed over, never interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuorumCert {
    pub proposal_id: Bytes,
    pub proposal_msg: Bytes,
    pub kind: i32,
    pub view_number: i64,
    pub signatures: Vec<QcSignature>,
}

/// A block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub version: i32,
    pub nonce: i32,
    pub height: i64,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    /// Parent id. Only the genesis block has none.
    pub pre_hash: Option<Digest>,
    pub blockid: Digest,
    pub proposer: Bytes,
    pub pubkey: Bytes,
    pub sign: Bytes,
    /// Leaves (transaction ids, padded with `None`) followed by internal nodes.
    pub merkle_tree: Vec<Option<Bytes>>,
    /// Last element of `merkle_tree`, empty when there are no transactions.
    pub merkle_root: Bytes,
    pub tx_count: i32,
    /// Empty when the block is held in header-only form.
    pub transactions: Vec<Transaction>,
    /// Contract execution failures recorded in-block (txid to error).
    pub failed_txs: BTreeMap<String, String>,
    pub cur_term: i64,
    pub cur_block_num: i64,
    /// Proof-of-work difficulty, zero when unused.
    pub target_bits: i32,
    pub justify: Option<QuorumCert>,
    /// Whether the block is on the current trunk.
    pub in_trunk: bool,
    /// Trunk successor, if any.
    pub next_hash: Option<Digest>,
}

impl Block {
    /// Copy of this block without its body.
    pub fn header(&self) -> Block {
        Block {
            transactions: Vec::new(),
            ..self.clone()
        }
    }

    /// Ids of the transactions committed by this block, in order.
    ///
    /// Read from the Merkle leaves so it works on header-only blocks.
    pub fn txids(&self) -> impl Iterator<Item = &Bytes> {
        let count = usize::try_from(self.tx_count).unwrap_or(0);
        self.merkle_tree.iter().take(count).flatten()
    }

    /// Sum of every output of every coinbase transaction.
    pub fn coinbase_total(&self) -> BigUint {
        self.transactions
            .iter()
            .filter(|tx| tx.coinbase)
            .flat_map(|tx| tx.outputs.iter())
            .map(TxOutput::value)
            .sum()
    }

    /// Whether this block is the genesis block.
    pub fn is_root(&self) -> bool {
        self.pre_hash.is_none()
    }

    /// Encoded header, as stored in the blocks table.
    pub(crate) fn encode_header(&self) -> Bytes {
        if self.transactions.is_empty() {
            return self.encode().freeze();
        }
        self.header().encode().freeze()
    }
}

impl Write for TxInput {
    fn write(&self, buf: &mut impl BufMut) {
        self.ref_txid.write(buf);
        self.ref_offset.write(buf);
        self.from_addr.write(buf);
        self.amount.write(buf);
    }
}

impl EncodeSize for TxInput {
    fn encode_size(&self) -> usize {
        self.ref_txid.encode_size()
            + self.ref_offset.encode_size()
            + self.from_addr.encode_size()
            + self.amount.encode_size()
    }
}

impl Read for TxInput {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            ref_txid: Bytes::read(buf)?,
            ref_offset: u32::read(buf)?,
            from_addr: Bytes::read(buf)?,
            amount: Bytes::read(buf)?,
        })
    }
}

impl Write for TxOutput {
    fn write(&self, buf: &mut impl BufMut) {
        self.amount.write(buf);
        self.to_addr.write(buf);
    }
}

impl EncodeSize for TxOutput {
    fn encode_size(&self) -> usize {
        self.amount.encode_size() + self.to_addr.encode_size()
    }
}

impl Read for TxOutput {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            amount: Bytes::read(buf)?,
            to_addr: Bytes::read(buf)?,
        })
    }
}

impl Write for Transaction {
    fn write(&self, buf: &mut impl BufMut) {
        self.txid.write(buf);
        self.blockid.write(buf);
        self.write_content(buf);
    }
}

impl EncodeSize for Transaction {
    fn encode_size(&self) -> usize {
        self.txid.encode_size() + self.blockid.encode_size() + self.content_size()
    }
}

impl Read for Transaction {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            txid: Bytes::read(buf)?,
            blockid: Option::<Digest>::read(buf)?,
            coinbase: bool::read(buf)?,
            inputs: Vec::<TxInput>::read(buf)?,
            outputs: Vec::<TxOutput>::read(buf)?,
            desc: Bytes::read(buf)?,
            timestamp: i64::read(buf)?,
        })
    }
}

impl Write for QcSignature {
    fn write(&self, buf: &mut impl BufMut) {
        self.address.write(buf);
        self.public_key.write(buf);
        self.sign.write(buf);
    }
}

impl EncodeSize for QcSignature {
    fn encode_size(&self) -> usize {
        self.address.encode_size() + self.public_key.encode_size() + self.sign.encode_size()
    }
}

impl Read for QcSignature {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            address: Bytes::read(buf)?,
            public_key: Bytes::read(buf)?,
            sign: Bytes::read(buf)?,
        })
    }
}

impl Write for QuorumCert {
    fn write(&self, buf: &mut impl BufMut) {
        self.proposal_id.write(buf);
        self.proposal_msg.write(buf);
        self.kind.write(buf);
        self.view_number.write(buf);
        self.signatures.write(buf);
    }
}

impl EncodeSize for QuorumCert {
    fn encode_size(&self) -> usize {
        self.proposal_id.encode_size()
            + self.proposal_msg.encode_size()
            + self.kind.encode_size()
            + self.view_number.encode_size()
            + self.signatures.encode_size()
    }
}

impl Read for QuorumCert {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            proposal_id: Bytes::read(buf)?,
            proposal_msg: Bytes::read(buf)?,
            kind: i32::read(buf)?,
            view_number: i64::read(buf)?,
            signatures: Vec::<QcSignature>::read(buf)?,
        })
    }
}

impl Write for Block {
    fn write(&self, buf: &mut impl BufMut) {
        self.version.write(buf);
        self.nonce.write(buf);
        self.height.write(buf);
        self.timestamp.write(buf);
        self.pre_hash.write(buf);
        self.blockid.write(buf);
        self.proposer.write(buf);
        self.pubkey.write(buf);
        self.sign.write(buf);
        self.merkle_tree.write(buf);
        self.merkle_root.write(buf);
        self.tx_count.write(buf);
        self.transactions.write(buf);
        self.failed_txs.write(buf);
        self.cur_term.write(buf);
        self.cur_block_num.write(buf);
        self.target_bits.write(buf);
        self.justify.write(buf);
        self.in_trunk.write(buf);
        self.next_hash.write(buf);
    }
}

impl EncodeSize for Block {
    fn encode_size(&self) -> usize {
        self.version.encode_size()
            + self.nonce.encode_size()
            + self.height.encode_size()
            + self.timestamp.encode_size()
            + self.pre_hash.encode_size()
            + self.blockid.encode_size()
            + self.proposer.encode_size()
            + self.pubkey.encode_size()
            + self.sign.encode_size()
            + self.merkle_tree.encode_size()
            + self.merkle_root.encode_size()
            + self.tx_count.encode_size()
            + self.transactions.encode_size()
            + self.failed_txs.encode_size()
            + self.cur_term.encode_size()
            + self.cur_block_num.encode_size()
            + self.target_bits.encode_size()
            + self.justify.encode_size()
            + self.in_trunk.encode_size()
            + self.next_hash.encode_size()
    }
}

impl Read for Block {
    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(Self {
            version: i32::read(buf)?,
            nonce: i32::read(buf)?,
            height: i64::read(buf)?,
            timestamp: i64::read(buf)?,
            pre_hash: Option::<Digest>::read(buf)?,
            blockid: Digest::read(buf)?,
            proposer: Bytes::read(buf)?,
            pubkey: Bytes::read(buf)?,
            sign: Bytes::read(buf)?,
            merkle_tree: Vec::<Option<Bytes>>::read(buf)?,
            merkle_root: Bytes::read(buf)?,
            tx_count: i32::read(buf)?,
            transactions: Vec::<Transaction>::read(buf)?,
            failed_txs: BTreeMap::<String, String>::read(buf)?,
            cur_term: i64::read(buf)?,
            cur_block_num: i64::read(buf)?,
            target_bits: i32::read(buf)?,
            justify: Option::<QuorumCert>::read(buf)?,
            in_trunk: bool::read(buf)?,
            next_hash: Option::<Digest>::read(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_codec::Decode;
    use arbor_cryptography::hash;

    fn transaction(seed: &[u8], coinbase: bool, amount: u64) -> Transaction {
        let mut tx = Transaction {
            coinbase,
            outputs: vec![TxOutput::new(&BigUint::from(amount), &b"addr"[..])],
            desc: Bytes::copy_from_slice(seed),
            ..Default::default()
        };
        tx.txid = tx.make_txid();
        tx
    }

    #[test]
    fn test_block_codec() {
        let mut failed_txs = BTreeMap::new();
        failed_txs.insert("t1".to_string(), "out of gas".to_string());
        let block = Block {
            version: BLOCK_VERSION,
            height: 3,
            pre_hash: Some(hash(b"parent")),
            blockid: hash(b"block"),
            merkle_tree: vec![Some(Bytes::from_static(b"t1")), None],
            transactions: vec![transaction(b"a", false, 5)],
            tx_count: 1,
            failed_txs,
            justify: Some(QuorumCert {
                proposal_id: Bytes::from_static(b"p"),
                signatures: vec![QcSignature::default()],
                ..Default::default()
            }),
            in_trunk: true,
            next_hash: Some(hash(b"child")),
            ..Default::default()
        };
        let decoded = Block::decode(block.encode()).unwrap();
        assert_eq!(decoded, block);

        let header = Block::decode(block.encode_header()).unwrap();
        assert!(header.transactions.is_empty());
        assert_eq!(header.merkle_tree, block.merkle_tree);
    }

    #[test]
    fn test_make_txid_ignores_owner() {
        let mut tx = transaction(b"payload", false, 1);
        let txid = tx.txid.clone();
        tx.blockid = Some(hash(b"owner"));
        assert_eq!(tx.make_txid(), txid);

        tx.desc = Bytes::from_static(b"other");
        assert_ne!(tx.make_txid(), txid);
    }

    #[test]
    fn test_coinbase_total() {
        let block = Block {
            transactions: vec![
                transaction(b"a", true, 100),
                transaction(b"b", false, 7),
            ],
            ..Default::default()
        };
        assert_eq!(block.coinbase_total(), BigUint::from(100u32));
    }

    #[test]
    fn test_txids_from_leaves() {
        let block = Block {
            tx_count: 3,
            merkle_tree: vec![
                Some(Bytes::from_static(b"a")),
                Some(Bytes::from_static(b"b")),
                Some(Bytes::from_static(b"c")),
                None,
                Some(Bytes::from_static(b"ab")),
                Some(Bytes::from_static(b"cc")),
                Some(Bytes::from_static(b"root")),
            ],
            ..Default::default()
        };
        let txids: Vec<_> = block.txids().cloned().collect();
        assert_eq!(
            txids,
            vec![
                Bytes::from_static(b"a"),
                Bytes::from_static(b"b"),
                Bytes::from_static(b"c")
            ]
        );
    }
}
