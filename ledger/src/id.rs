//! Block identity.
//!
//! A block id is `double_hash` of a canonical preimage built from the header fields below, in
//! this order. Integers are big-endian at fixed width, byte strings carry a `u32` length prefix
//! (zero length for an empty field), and optional values carry a one-byte presence tag. Every
//! field is always written, so re-encoding an unchanged block always reproduces its id.
//!
//! ```text
//! version:i32 | nonce:i32 | tx_count:i32 | proposer:bytes | timestamp:i64 | pubkey:bytes
//! | pre_hash:option<digest> | merkle_root:bytes
//! | failed_txs: count:u32, then each error as bytes, ascending by txid
//! | cur_term:i64 | cur_block_num:i64 | target_bits:i32
//! | justify: option<proposal_id:bytes | proposal_msg:bytes | kind:i32 | view_number:i64
//!                   | count:u32 | (address:bytes | public_key:bytes | sign:bytes)*>
//! ```
//!
//! The height, signature, Merkle tree, body, and trunk flags are not part of the id.

use crate::block::Block;
use arbor_codec::{EncodeSize, Write};
use arbor_cryptography::{double_hash, Digest};

/// Compute the id of `block` from its header fields.
pub fn make_block_id(block: &Block) -> Digest {
    double_hash(&preimage(block))
}

/// Canonical bytes hashed into a block id.
pub fn preimage(block: &Block) -> Vec<u8> {
    let mut buf = Vec::with_capacity(preimage_size(block));
    block.version.write(&mut buf);
    block.nonce.write(&mut buf);
    block.tx_count.write(&mut buf);
    block.proposer.write(&mut buf);
    block.timestamp.write(&mut buf);
    block.pubkey.write(&mut buf);
    block.pre_hash.write(&mut buf);
    block.merkle_root.write(&mut buf);

    // Only the error text of failed transactions is committed, in txid order
    (block.failed_txs.len() as u32).write(&mut buf);
    for reason in block.failed_txs.values() {
        reason.write(&mut buf);
    }

    block.cur_term.write(&mut buf);
    block.cur_block_num.write(&mut buf);
    block.target_bits.write(&mut buf);
    block.justify.write(&mut buf);
    buf
}

fn preimage_size(block: &Block) -> usize {
    block.version.encode_size()
        + block.nonce.encode_size()
        + block.tx_count.encode_size()
        + block.proposer.encode_size()
        + block.timestamp.encode_size()
        + block.pubkey.encode_size()
        + block.pre_hash.encode_size()
        + block.merkle_root.encode_size()
        + 4
        + block
            .failed_txs
            .values()
            .map(EncodeSize::encode_size)
            .sum::<usize>()
        + block.cur_term.encode_size()
        + block.cur_block_num.encode_size()
        + block.target_bits.encode_size()
        + block.justify.encode_size()
}
