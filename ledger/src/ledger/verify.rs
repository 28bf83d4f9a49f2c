use super::Ledger;
use crate::{
    block::{Block, Transaction},
    id::make_block_id,
    merkle::verify_merkle,
    Error,
};
use arbor_cryptography::Verifier;
use arbor_storage::Store;
use tracing::warn;

impl<S: Store> Ledger<S> {
    /// Check the id, Merkle root, proposer address, and signature of `block`.
    pub fn verify_block<V: Verifier>(&self, verifier: &V, block: &Block) -> bool {
        let blockid = make_block_id(block);
        if blockid != block.blockid {
            warn!(expected = %block.blockid, computed = %blockid, "block id mismatch");
            return false;
        }
        if let Err(err) = verify_merkle(block) {
            warn!(blockid = %block.blockid, ?err, "invalid merkle tree");
            return false;
        }
        if !verifier.address_matches(&block.proposer, &block.pubkey) {
            warn!(blockid = %block.blockid, "proposer does not match public key");
            return false;
        }
        match verifier.verify(&block.pubkey, &block.blockid, &block.sign) {
            Ok(true) => true,
            Ok(false) => {
                warn!(blockid = %block.blockid, "invalid block signature");
                false
            }
            Err(err) => {
                warn!(blockid = %block.blockid, ?err, "malformed block signature");
                false
            }
        }
    }

    /// Check that a coinbase transaction pays exactly the award due at the height of `block`.
    ///
    /// Other transactions are left to the caller.
    pub fn is_valid_tx(&self, tx: &Transaction, block: &Block) -> Result<bool, Error> {
        if !tx.coinbase {
            return Ok(true);
        }
        let Some(output) = tx.outputs.first() else {
            warn!(txid = hex::encode(&tx.txid), "coinbase transaction has no outputs");
            return Ok(false);
        };
        let award = self.require_genesis()?.calc_award(block.height);
        let paid = output.value();
        if paid != award {
            warn!(
                txid = hex::encode(&tx.txid),
                %paid,
                %award,
                "invalid block award"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
