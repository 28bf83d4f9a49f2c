use super::Ledger;
use crate::{
    block::{Block, Transaction},
    genesis::{GasPrice, InvokeRequest},
    tables::{self, pending_key},
    Error,
};
use arbor_codec::{Decode, Encode};
use arbor_cryptography::Digest;
use arbor_storage::{Batch, Store};
use num_bigint::BigUint;
use std::collections::BTreeMap;
use tracing::{debug, warn};

impl<S: Store> Ledger<S> {
    /// Returns whether `blockid` has been confirmed (and not truncated).
    pub fn exist_block(&self, blockid: &Digest) -> Result<bool, Error> {
        if self.caches.headers.get(blockid).is_some() {
            return Ok(true);
        }
        Ok(self.store.has(&tables::block_key(blockid))?)
    }

    /// Header of `blockid` (its transactions are not loaded).
    pub fn query_block_header(&self, blockid: &Digest) -> Result<Block, Error> {
        if let Some(header) = self.caches.headers.get(blockid) {
            return Ok(header);
        }
        let _fence = self.caches.fill();
        self.load_header(blockid)
    }

    /// Block `blockid` with its transactions.
    pub fn query_block(&self, blockid: &Digest) -> Result<Block, Error> {
        if let Some(block) = self.caches.blocks.get(blockid) {
            self.metrics.cache_hits.inc();
            return Ok(block);
        }
        self.metrics.cache_misses.inc();
        let _fence = self.caches.fill();
        let mut block = match self.caches.headers.get(blockid) {
            Some(header) => header,
            None => self.load_header(blockid)?,
        };
        let mut transactions = Vec::with_capacity(usize::try_from(block.tx_count).unwrap_or(0));
        for txid in block.txids() {
            let Some(tx) = tables::load_transaction(&self.store, txid)? else {
                warn!(blockid = %blockid, txid = hex::encode(txid), "transaction missing");
                return Err(Error::TxNotFound);
            };
            transactions.push(tx);
        }
        block.transactions = transactions;
        self.caches.blocks.put(*blockid, block.clone());
        Ok(block)
    }

    /// Read a header from the store and cache it. Callers hold the fill fence.
    fn load_header(&self, blockid: &Digest) -> Result<Block, Error> {
        let header = tables::load_block(&self.store, blockid)?.ok_or(Error::BlockNotExist)?;
        self.caches.headers.put(*blockid, header.clone());
        Ok(header)
    }

    /// Trunk block at `height`.
    pub fn query_block_by_height(&self, height: i64) -> Result<Block, Error> {
        let blockid = tables::load_height(&self.store, height)?.ok_or(Error::BlockNotExist)?;
        self.query_block(&blockid)
    }

    /// Trunk tip.
    pub fn query_last_block(&self) -> Result<Block, Error> {
        self.query_block_by_height(self.meta().trunk_height)
    }

    /// Returns whether `txid` has been confirmed.
    pub fn has_transaction(&self, txid: &[u8]) -> Result<bool, Error> {
        Ok(self.store.has(&tables::confirmed_key(txid))?)
    }

    /// Confirmed transaction `txid`.
    pub fn query_transaction(&self, txid: &[u8]) -> Result<Transaction, Error> {
        tables::load_transaction(&self.store, txid)?.ok_or(Error::TxNotFound)
    }

    /// Returns whether the block owning `txid` is on the trunk.
    ///
    /// Unknown transactions (or transactions whose owner is gone) are not on the trunk.
    pub fn is_tx_in_trunk(&self, txid: &[u8]) -> Result<bool, Error> {
        let Some(tx) = tables::load_transaction(&self.store, txid)? else {
            return Ok(false);
        };
        let Some(owner) = tx.blockid else {
            return Ok(false);
        };
        match self.query_block_header(&owner) {
            Ok(block) => Ok(block.in_trunk),
            Err(Error::BlockNotExist) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Header of the block owning `txid`.
    pub fn query_block_by_txid(&self, txid: &[u8]) -> Result<Block, Error> {
        let tx = tables::load_transaction(&self.store, txid)?.ok_or(Error::TxNotConfirmed)?;
        let owner = tx.blockid.ok_or(Error::TxNotConfirmed)?;
        self.query_block_header(&owner)
    }

    /// Summary of every stored block, grouped by height.
    ///
    /// Heights above the trunk height (left behind on branches) are included.
    pub fn dump(&self) -> Result<BTreeMap<i64, Vec<String>>, Error> {
        let mut layers: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for (_, raw) in self.store.scan(tables::BLOCKS_PREFIX)? {
            let block = Block::decode(raw)?;
            layers.entry(block.height).or_default().push(format!(
                "{{ID:{},TxCount:{},InTrunk:{},Tm:{},Miner:{}}}",
                block.blockid,
                block.tx_count,
                block.in_trunk,
                block.timestamp / 1_000_000_000,
                String::from_utf8_lossy(&block.proposer),
            ));
        }
        Ok(layers)
    }

    /// Store a block that has been received but not confirmed yet.
    pub fn save_pending_block(&self, block: &Block) -> Result<(), Error> {
        debug!(
            blockid = %block.blockid,
            tx_count = block.transactions.len(),
            "saving pending block"
        );
        let mut batch = Batch::new();
        batch.put(pending_key(&block.blockid), block.encode().freeze());
        self.store.write(batch)?;
        Ok(())
    }

    /// A block previously stored with [Ledger::save_pending_block].
    pub fn get_pending_block(&self, blockid: &Digest) -> Result<Block, Error> {
        match self.store.get(&pending_key(blockid))? {
            Some(raw) => Ok(Block::decode(raw)?),
            None => Err(Error::BlockNotExist),
        }
    }

    /// Coins issued so far: the genesis coinbase plus the award of every trunk block.
    ///
    /// Zero before the genesis block is confirmed.
    pub fn estimated_total(&self) -> BigUint {
        let Some(genesis) = self.genesis() else {
            return BigUint::default();
        };
        let trunk_height = self.meta().trunk_height;
        let mut total = genesis.coinbase_total();
        for height in 1..=trunk_height {
            total += genesis.calc_award(height);
        }
        total
    }

    /// Maximum block size in bytes.
    pub fn max_block_size(&self) -> Result<i64, Error> {
        Ok(self.require_genesis()?.max_block_size())
    }

    /// Number of blocks after which a block can no longer be reverted.
    pub fn irreversible_slide_window(&self) -> Result<i64, Error> {
        Ok(self.require_genesis()?.irreversible_slide_window())
    }

    /// Amount charged to create a contract account.
    pub fn new_account_resource_amount(&self) -> Result<i64, Error> {
        Ok(self.require_genesis()?.new_account_resource_amount())
    }

    /// Resource prices.
    pub fn gas_price(&self) -> Result<GasPrice, Error> {
        Ok(self.require_genesis()?.gas_price())
    }

    /// Whether the chain charges no fees.
    pub fn no_fee(&self) -> Result<bool, Error> {
        Ok(self.require_genesis()?.config().no_fee)
    }

    pub fn reserved_contracts(&self) -> Result<Vec<InvokeRequest>, Error> {
        Ok(self.require_genesis()?.reserved_contracts().to_vec())
    }

    pub fn forbidden_contract(&self) -> Result<InvokeRequest, Error> {
        Ok(self.require_genesis()?.forbidden_contract().clone())
    }

    pub fn group_chain_contract(&self) -> Result<InvokeRequest, Error> {
        Ok(self.require_genesis()?.group_chain_contract().clone())
    }
}
