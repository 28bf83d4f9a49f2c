//! The ledger state machine.

use crate::{
    cache::BlockCaches,
    genesis::GenesisBlock,
    metrics::Metrics,
    pow::MiningGate,
    tables::{self, LedgerMeta, Staged},
    Error,
};
use arbor_codec::Decode;
use arbor_storage::Store;
use parking_lot::{Mutex, RwLock};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tracing::debug;

mod confirm;
mod fork;
mod query;
mod truncate;
mod verify;

/// Configuration for a [Ledger].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of full blocks (with their transactions) to cache.
    pub block_cache_size: usize,

    /// Number of block headers to cache.
    pub header_cache_size: usize,

    /// Number of award periods to memoize.
    pub award_cache_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_cache_size: 100,
            header_cache_size: 100,
            award_cache_size: 1000,
        }
    }
}

/// Outcome of [Ledger::confirm_block].
#[derive(Debug, Default)]
pub struct ConfirmStatus {
    /// The block was committed.
    pub succ: bool,
    /// The block did not extend the previous tip.
    pub split: bool,
    /// The block was stored on a branch that is not the trunk.
    pub orphan: bool,
    /// The block made its branch the new trunk.
    pub trunk_switch: bool,
    /// Why the block was not committed.
    pub error: Option<Error>,
}

/// A fork-aware block ledger over a [Store].
///
/// Reads may run concurrently with each other and with a writer. Writers (confirmation,
/// trunk switches, truncation, and pruning) are serialized and observe a consistent
/// snapshot of the ledger for their whole duration.
pub struct Ledger<S: Store> {
    store: S,
    cfg: Config,

    meta: RwLock<Arc<LedgerMeta>>,
    write: Mutex<()>,
    genesis: RwLock<Option<Arc<GenesisBlock>>>,

    caches: BlockCaches,
    gate: Arc<MiningGate>,

    metrics: Metrics,
}

impl<S: Store> Ledger<S> {
    /// Open the ledger stored in `store`, registering its metrics with `registry`.
    ///
    /// An empty store yields an empty ledger, ready to confirm a genesis block.
    pub fn init(store: S, registry: &mut Registry, cfg: Config) -> Result<Self, Error> {
        let meta = match store.get(tables::META_KEY)? {
            Some(raw) => LedgerMeta::decode(raw)?,
            None => LedgerMeta::default(),
        };
        let ledger = Self {
            caches: BlockCaches::new(cfg.block_cache_size, cfg.header_cache_size),
            store,
            meta: RwLock::new(Arc::new(meta.clone())),
            write: Mutex::new(()),
            genesis: RwLock::new(None),
            gate: Arc::new(MiningGate::default()),
            metrics: Metrics::init(registry),
            cfg,
        };
        ledger.metrics.trunk_height.set(meta.trunk_height);

        // Load the genesis configuration of an existing ledger
        if let Some(root) = meta.root_blockid {
            let block = ledger.query_block(&root)?;
            let genesis = GenesisBlock::new(block, ledger.cfg.award_cache_size)?;
            *ledger.genesis.write() = Some(Arc::new(genesis));
        }
        debug!(
            root = ?meta.root_blockid,
            tip = ?meta.tip_blockid,
            trunk_height = meta.trunk_height,
            "initialized ledger"
        );
        Ok(ledger)
    }

    /// Snapshot of the root, tip, and trunk height.
    pub fn meta(&self) -> Arc<LedgerMeta> {
        self.meta.read().clone()
    }

    /// The genesis block, once confirmed.
    pub fn genesis(&self) -> Option<Arc<GenesisBlock>> {
        self.genesis.read().clone()
    }

    fn require_genesis(&self) -> Result<Arc<GenesisBlock>, Error> {
        self.genesis().ok_or(Error::GenesisNotLoaded)
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Gate polled by proof-of-work searches for blocks of this ledger.
    pub fn mining_gate(&self) -> Arc<MiningGate> {
        self.gate.clone()
    }

    /// Allow mining of a block at `height`.
    pub fn start_pow_mining(&self, height: i64) {
        self.gate.start(height);
    }

    /// Stop any search for a block at or below `height`.
    pub fn abort_pow_mining(&self, height: i64) {
        self.gate.abort(height);
    }

    /// Whether mining is currently allowed.
    pub fn is_enable_pow_mining(&self) -> bool {
        self.gate.is_enabled()
    }

    fn staged(&self) -> Staged<'_, S> {
        Staged::new(&self.store, &self.caches)
    }

    fn swap_meta(&self, meta: LedgerMeta) {
        self.metrics.trunk_height.set(meta.trunk_height);
        *self.meta.write() = Arc::new(meta);
    }
}
