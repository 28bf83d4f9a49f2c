use super::{fork::ancestor, Ledger};
use crate::{block::Block, tables::LedgerMeta, tables::Staged, Error};
use arbor_cryptography::Digest;
use arbor_storage::Store;
use tracing::{debug, info};

/// Branch tips above `height`, excluding `target`.
fn tips_above<S: Store>(
    staged: &Staged<'_, S>,
    target: &Digest,
    height: i64,
) -> Result<Vec<(Digest, i64)>, Error> {
    Ok(staged
        .tips()?
        .into_iter()
        .filter(|(blockid, tip_height)| blockid != target && *tip_height > height)
        .collect())
}

/// Delete blocks from `from` backwards while they are above `height`.
///
/// Returns the first block that was kept, if the walk reached one. A missing predecessor ends
/// the walk early.
fn remove_blocks<S: Store>(
    staged: &mut Staged<'_, S>,
    from: &Digest,
    height: i64,
) -> Result<Option<Block>, Error> {
    let mut cursor = staged.block(from)?;
    while let Some(block) = cursor {
        if block.height <= height {
            return Ok(Some(block));
        }
        debug!(blockid = %block.blockid, height = block.height, "removing block");
        staged.delete_block(&block)?;
        cursor = match block.pre_hash {
            Some(pre_hash) => staged.block(&pre_hash)?,
            None => None,
        };
    }
    Ok(None)
}

impl<S: Store> Ledger<S> {
    /// Branch tips whose height is strictly greater than `height`, excluding `target`.
    pub fn branch_tips(&self, target: &Digest, height: i64) -> Result<Vec<Digest>, Error> {
        let staged = self.staged();
        Ok(tips_above(&staged, target, height)?
            .into_iter()
            .map(|(blockid, _)| blockid)
            .collect())
    }

    /// Move the tip back to `target`, deleting every block above its height on every branch.
    ///
    /// `target` must be on the trunk. Use [Ledger::prune] to move the tip onto a branch.
    pub fn truncate(&self, target: &Digest) -> Result<(), Error> {
        let _guard = self.write.lock();
        let current = self.meta();
        let mut staged = self.staged();
        let mut target_block = staged.require_block(target)?;
        if !target_block.in_trunk {
            return Err(Error::BlockNotInTrunk);
        }

        for (tip, _) in tips_above(&staged, target, target_block.height)? {
            staged.delete_tip(&tip);
            let kept = remove_blocks(&mut staged, &tip, target_block.height)?;

            // A branch that forked below the target keeps its stub as a tip. The stub sits at
            // the target height and every block above it is removed, so it has no child left.
            if let Some(kept) = kept {
                if kept.blockid != *target && !kept.in_trunk {
                    staged.put_tip(&kept.blockid, kept.height);
                }
            }
        }

        target_block.next_hash = None;
        staged.save_block(&target_block);
        staged.put_tip(target, target_block.height);
        let meta = LedgerMeta {
            tip_blockid: Some(*target),
            trunk_height: target_block.height,
            ..(*current).clone()
        };
        staged.put_meta(&meta);
        staged.commit()?;
        self.swap_meta(meta);
        self.metrics.truncations.inc();
        info!(tip = %target, trunk_height = target_block.height, "truncated ledger");
        Ok(())
    }

    /// Make `target` the trunk tip and delete every branch above its height.
    ///
    /// Unlike [Ledger::truncate], `target` may be off the trunk: the trunk is first switched over
    /// to its chain. Each branch above the target is removed down to the block it shares with
    /// the target.
    pub fn prune(&self, target: &Digest) -> Result<(), Error> {
        let _guard = self.write.lock();
        let current = self.meta();
        let mut staged = self.staged();
        let mut target_block = staged.require_block(target)?;
        if !target_block.in_trunk {
            let tip = current.tip_blockid.ok_or(Error::BlockNotExist)?;
            self.handle_fork(&mut staged, tip, *target, None)?;
            target_block = staged.require_block(target)?;
        }

        // Resolve every split point before any branch is removed, as branches may share blocks
        let mut branches = Vec::new();
        for (tip, _) in tips_above(&staged, target, target_block.height)? {
            let shared = ancestor(&staged, &tip, target)?;
            branches.push((tip, shared.height));
        }
        for (tip, height) in branches {
            staged.delete_tip(&tip);
            remove_blocks(&mut staged, &tip, height)?;
        }

        target_block.next_hash = None;
        staged.save_block(&target_block);
        staged.put_tip(target, target_block.height);
        let meta = LedgerMeta {
            tip_blockid: Some(*target),
            trunk_height: target_block.height,
            ..(*current).clone()
        };
        staged.put_meta(&meta);
        staged.commit()?;
        self.swap_meta(meta);
        self.metrics.truncations.inc();
        info!(tip = %target, trunk_height = target_block.height, "pruned ledger");
        Ok(())
    }
}
