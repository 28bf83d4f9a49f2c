//! Assemble blocks from transactions.
//!
//! Every function fills in the Merkle tree and root, then computes the block id. A block is only
//! signed when it has a parent: the genesis block is never signed.

use crate::{
    block::{Block, QuorumCert, Transaction, BLOCK_VERSION, ROOT_BLOCK_VERSION},
    id::make_block_id,
    merkle::{make_merkle_tree, root},
    pow::{self, MiningGate},
    Error,
};
use arbor_cryptography::{Digest, Signer};
use std::collections::BTreeMap;
use tracing::debug;

/// Content of a block to be proposed.
#[derive(Clone, Debug, Default)]
pub struct Proposal {
    pub transactions: Vec<Transaction>,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: i64,
    pub cur_term: i64,
    pub cur_block_num: i64,
    pub pre_hash: Option<Digest>,
    /// Proof-of-work difficulty, zero to skip mining.
    pub target_bits: i32,
    pub justify: Option<QuorumCert>,
    pub failed_txs: BTreeMap<String, String>,
    /// Expected height, used by callers that run the block before confirming it.
    pub height: i64,
}

/// Assemble the unsigned genesis block.
pub fn format_root_block(transactions: Vec<Transaction>) -> Block {
    let merkle_tree = make_merkle_tree(&transactions);
    let mut block = Block {
        version: ROOT_BLOCK_VERSION,
        tx_count: transactions.len() as i32,
        merkle_root: root(&merkle_tree),
        merkle_tree,
        transactions,
        ..Default::default()
    };
    block.blockid = make_block_id(&block);
    block
}

/// Assemble and sign a block.
///
/// `target_bits` is ignored: use [format_miner_block] to mine.
pub fn format_block<S: Signer>(proposal: Proposal, signer: &S) -> Block {
    let mut block = assemble(
        Proposal {
            target_bits: 0,
            ..proposal
        },
        signer,
        true,
    );
    block.blockid = make_block_id(&block);
    sign(&mut block, signer);
    block
}

/// Assemble a block, mine it if `target_bits` is set, then sign it.
///
/// Mining polls `gate` and fails with [Error::MinerInterrupted] once it is disabled.
pub fn format_miner_block<S: Signer>(
    proposal: Proposal,
    signer: &S,
    gate: &MiningGate,
) -> Result<Block, Error> {
    let mut block = assemble(proposal, signer, true);
    block.blockid = make_block_id(&block);
    if block.target_bits != 0 {
        block = pow::search(block, gate)?;
    }
    sign(&mut block, signer);
    debug!(blockid = %block.blockid, height = block.height, "formatted miner block");
    Ok(block)
}

/// Assemble a block for speculative execution.
///
/// The Merkle tree holds the raw transaction ids and the block is never signed.
pub fn format_fake_block<S: Signer>(proposal: Proposal, signer: &S) -> Block {
    let mut block = assemble(
        Proposal {
            target_bits: 0,
            ..proposal
        },
        signer,
        false,
    );
    block.blockid = make_block_id(&block);
    block
}

fn assemble<S: Signer>(proposal: Proposal, signer: &S, merkle: bool) -> Block {
    let merkle_tree = if merkle {
        make_merkle_tree(&proposal.transactions)
    } else {
        proposal
            .transactions
            .iter()
            .map(|tx| Some(tx.txid.clone()))
            .collect()
    };
    Block {
        version: BLOCK_VERSION,
        height: proposal.height,
        timestamp: proposal.timestamp,
        pre_hash: proposal.pre_hash,
        proposer: signer.address(),
        pubkey: signer.public_key(),
        merkle_root: root(&merkle_tree),
        merkle_tree,
        tx_count: proposal.transactions.len() as i32,
        transactions: proposal.transactions,
        failed_txs: proposal.failed_txs,
        cur_term: proposal.cur_term,
        cur_block_num: proposal.cur_block_num,
        target_bits: proposal.target_bits,
        justify: proposal.justify,
        ..Default::default()
    }
}

fn sign<S: Signer>(block: &mut Block, signer: &S) {
    if block.pre_hash.is_some() {
        block.sign = signer.sign(&block.blockid);
    }
}
