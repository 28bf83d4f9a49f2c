use super::{ConfirmStatus, Ledger};
use crate::{block::Block, genesis::GenesisBlock, tables::LedgerMeta, Error};
use arbor_storage::Store;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of a successful confirmation, applied once the batch is committed.
struct Confirmed {
    status: ConfirmStatus,
    meta: LedgerMeta,
    genesis: Option<GenesisBlock>,
}

impl<S: Store> Ledger<S> {
    /// Confirm `block` (with its transactions) into the ledger.
    ///
    /// The block is placed on the trunk if it extends the tip or if its branch becomes longer
    /// than the trunk (switching the trunk over to that branch). Otherwise it is stored on its
    /// branch and the trunk is left untouched. Nothing is persisted unless the whole
    /// confirmation succeeds. A block that is already stored is rejected with
    /// [Error::BlockExist].
    pub fn confirm_block(&self, block: &Block, is_root: bool) -> ConfirmStatus {
        let _guard = self.write.lock();
        match self.confirm(block, is_root) {
            Ok(confirmed) => {
                let Confirmed {
                    status,
                    meta,
                    genesis,
                } = confirmed;
                debug!(
                    blockid = %block.blockid,
                    tip = ?meta.tip_blockid,
                    trunk_height = meta.trunk_height,
                    split = status.split,
                    orphan = status.orphan,
                    trunk_switch = status.trunk_switch,
                    "confirmed block"
                );
                self.swap_meta(meta);
                if let Some(genesis) = genesis {
                    *self.genesis.write() = Some(Arc::new(genesis));
                }
                self.metrics.confirmed.inc();
                if status.orphan {
                    self.metrics.orphans.inc();
                }
                if status.trunk_switch {
                    self.metrics.trunk_switches.inc();
                }
                status
            }
            Err(err) => {
                warn!(blockid = %block.blockid, ?err, "failed to confirm block");
                self.metrics.confirm_failures.inc();
                ConfirmStatus {
                    error: Some(err),
                    ..Default::default()
                }
            }
        }
    }

    fn confirm(&self, block: &Block, is_root: bool) -> Result<Confirmed, Error> {
        let coinbases = block.transactions.iter().filter(|tx| tx.coinbase).count();
        if coinbases > 1 {
            return Err(Error::CoinbaseCountExceeded);
        }

        let current = self.meta();
        let mut meta = (*current).clone();
        let mut block = block.clone();
        let mut status = ConfirmStatus {
            succ: true,
            ..Default::default()
        };
        let mut genesis = None;
        let mut staged = self.staged();
        if staged.block(&block.blockid)?.is_some() {
            return Err(Error::BlockExist);
        }

        // Transactions already owned by a trunk block at or below this height are duplicates
        let split_height;
        if is_root {
            if current.root_blockid.is_some() {
                return Err(Error::RootBlockAlreadyExist);
            }
            if block.pre_hash.is_some() {
                return Err(Error::RootHasParent);
            }
            block.height = 0;
            block.in_trunk = true;
            genesis = Some(GenesisBlock::new(
                block.clone(),
                self.cfg.award_cache_size,
            )?);
            meta = LedgerMeta {
                root_blockid: Some(block.blockid),
                tip_blockid: Some(block.blockid),
                trunk_height: 0,
            };
            split_height = 0;
        } else {
            let pre_hash = block.pre_hash.ok_or(Error::BlockNotExist)?;
            let mut parent = staged.require_block(&pre_hash)?;
            block.height = parent.height + 1;
            if current.tip_blockid == Some(pre_hash) {
                // Extend the trunk
                block.in_trunk = true;
                parent.next_hash = Some(block.blockid);
                staged.save_block(&parent);
                split_height = current.trunk_height;
                meta.tip_blockid = Some(block.blockid);
                meta.trunk_height += 1;
            } else if block.height > current.trunk_height {
                // The branch of the parent overtakes the trunk
                let old_tip = current.tip_blockid.ok_or(Error::BlockNotExist)?;
                let split = self.handle_fork(&mut staged, old_tip, pre_hash, Some(block.blockid))?;
                debug!(split = %split.blockid, height = split.height, "switched trunk");
                block.in_trunk = true;
                split_height = split.height;
                status.split = true;
                status.trunk_switch = true;
                meta.tip_blockid = Some(block.blockid);
                meta.trunk_height = block.height;
            } else {
                block.in_trunk = false;
                split_height = current.trunk_height;
                status.split = true;
                status.orphan = true;
            }
        }

        // Persist the header and make the block the tip of its branch
        staged.save_block(&block);
        if let Some(pre_hash) = block.pre_hash {
            staged.delete_tip(&pre_hash);
        }
        staged.put_tip(&block.blockid, block.height);

        for tx in &block.transactions {
            let Some(existing) = staged.transaction(&tx.txid)? else {
                let mut owned = tx.clone();
                owned.blockid = Some(block.blockid);
                staged.put_transaction(&owned, None);
                continue;
            };
            let owner = match existing.blockid {
                Some(owner) => staged.block(&owner)?,
                None => None,
            };
            let claim = match owner {
                // The previous owner was truncated away
                None => true,
                Some(owner) => {
                    if owner.in_trunk && block.in_trunk && owner.height <= split_height {
                        warn!(
                            txid = hex::encode(&tx.txid),
                            owner = %owner.blockid,
                            "transaction duplicated in trunk block"
                        );
                        return Err(Error::TxDuplicated);
                    }
                    block.in_trunk
                }
            };
            if claim {
                let mut owned = tx.clone();
                owned.blockid = Some(block.blockid);
                staged.put_transaction(&owned, existing.blockid);
            }
        }

        staged.delete_pending(&block.blockid);
        staged.put_meta(&meta);
        staged.commit()?;
        Ok(Confirmed {
            status,
            meta,
            genesis,
        })
    }
}
