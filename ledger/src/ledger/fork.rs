//! Trunk switching.
//!
//! ```text
//! P ---> P ---> P ---> P (old tip)
//!        |
//!        +----> Q ---> Q ---> Q (new tip)
//! ```
//!
//! Switching from the old tip to the new tip demotes every `P` above the split block, promotes
//! every `Q`, and moves the ownership of the transactions of each `Q` to it.

use super::Ledger;
use crate::{block::Block, tables::LedgerMeta, tables::Staged, Error};
use arbor_cryptography::Digest;
use arbor_storage::Store;
use tracing::{debug, info};

/// Walk both chains back to the block they share, using the staged view.
pub(super) fn ancestor<S: Store>(
    staged: &Staged<'_, S>,
    a: &Digest,
    b: &Digest,
) -> Result<Block, Error> {
    let parent = |block: &Block| -> Result<Block, Error> {
        let pre_hash = block.pre_hash.ok_or(Error::BlockNotExist)?;
        staged.require_block(&pre_hash)
    };
    let mut a = staged.require_block(a)?;
    let mut b = staged.require_block(b)?;
    while a.height > b.height {
        a = parent(&a)?;
    }
    while b.height > a.height {
        b = parent(&b)?;
    }
    while a.blockid != b.blockid {
        a = parent(&a)?;
        b = parent(&b)?;
    }
    Ok(a)
}

impl<S: Store> Ledger<S> {
    /// Make the chain ending at `new_tip` the trunk in place of the chain ending at `old_tip`.
    ///
    /// `next_hash` becomes the trunk successor of `new_tip`. Returns the split block.
    pub(super) fn handle_fork(
        &self,
        staged: &mut Staged<'_, S>,
        old_tip: Digest,
        new_tip: Digest,
        next_hash: Option<Digest>,
    ) -> Result<Block, Error> {
        let split = ancestor(staged, &old_tip, &new_tip)?.blockid;

        // Demote the old chain
        let mut cursor = old_tip;
        while cursor != split {
            let mut block = staged.require_block(&cursor)?;
            block.in_trunk = false;
            block.next_hash = None;
            staged.unindex(&block)?;
            staged.save_block(&block);
            cursor = block.pre_hash.ok_or(Error::BlockNotExist)?;
        }

        // Promote the new chain, linking each block to the one walked before it
        let mut next = next_hash;
        let mut cursor = new_tip;
        while cursor != split {
            let mut block = staged.require_block(&cursor)?;
            block.in_trunk = true;
            block.next_hash = next;
            staged.save_block(&block);
            self.reown(staged, &block)?;
            next = Some(cursor);
            cursor = block.pre_hash.ok_or(Error::BlockNotExist)?;
        }

        let mut split = staged.require_block(&split)?;
        split.in_trunk = true;
        split.next_hash = next;
        staged.save_block(&split);
        Ok(split)
    }

    /// Point every transaction of `block` at it.
    fn reown(&self, staged: &mut Staged<'_, S>, block: &Block) -> Result<(), Error> {
        for txid in block.txids() {
            let mut tx = staged.transaction(txid)?.ok_or(Error::TxNotFound)?;
            if tx.blockid == Some(block.blockid) {
                continue;
            }
            let previous = tx.blockid;
            tx.blockid = Some(block.blockid);
            debug!(
                txid = hex::encode(txid),
                previous = ?previous,
                owner = %block.blockid,
                "moved transaction to trunk block"
            );
            staged.put_transaction(&tx, previous);
        }
        Ok(())
    }

    /// Id of the most recent block shared by the chains ending at `a` and `b`.
    pub fn common_ancestor(&self, a: &Digest, b: &Digest) -> Result<Digest, Error> {
        let staged = self.staged();
        Ok(ancestor(&staged, a, b)?.blockid)
    }

    /// Make the chain ending at `target` the trunk, with `target` as its tip.
    ///
    /// Blocks of the previous trunk above the split block are kept on their branch. Returns the
    /// header of `target` as stored after the switch.
    pub fn switch_trunk(&self, target: &Digest) -> Result<Block, Error> {
        let _guard = self.write.lock();
        let current = self.meta();
        let tip = current.tip_blockid.ok_or(Error::BlockNotExist)?;
        let mut staged = self.staged();
        let split = self.handle_fork(&mut staged, tip, *target, None)?;
        let switched = staged.require_block(target)?;
        let meta = LedgerMeta {
            tip_blockid: Some(*target),
            trunk_height: switched.height,
            ..(*current).clone()
        };
        staged.put_meta(&meta);
        staged.commit()?;
        self.swap_meta(meta);
        self.metrics.trunk_switches.inc();
        info!(
            tip = %target,
            split = %split.blockid,
            trunk_height = switched.height,
            "switched trunk"
        );
        Ok(switched)
    }

    /// Blocks to revert to move from `current` to `dest` (newest first, down to the split block
    /// exclusive) and blocks to apply (newest first, down to the split block exclusive).
    pub fn find_undo_and_todo_blocks(
        &self,
        current: &Digest,
        dest: &Digest,
    ) -> Result<(Vec<Block>, Vec<Block>), Error> {
        if current == dest {
            return Ok((Vec::new(), Vec::new()));
        }
        let split = self.common_ancestor(current, dest)?;
        let walk = |from: &Digest| -> Result<Vec<Block>, Error> {
            let mut blocks = Vec::new();
            let mut cursor = *from;
            while cursor != split {
                let block = self.query_block(&cursor)?;
                cursor = block.pre_hash.ok_or(Error::BlockNotExist)?;
                blocks.push(block);
            }
            Ok(blocks)
        };
        Ok((walk(current)?, walk(dest)?))
    }
}
