//! Merkle commitment over the ordered transaction ids of a block.
//!
//! The tree is stored flat: the leaves (transaction ids, padded with `None` up to the next power
//! of two) come first, followed by each layer of internal nodes, so the root is the last element.
//! For every pair of siblings:
//!
//! - a missing left child yields a missing parent,
//! - a missing right child yields `double_hash(left || left)`,
//! - otherwise the parent is `double_hash(left || right)`.
//!
//! The tree commits to the transactions as a whole. It is not meant for inclusion proofs.

use crate::{block::Block, block::Transaction, Error};
use arbor_cryptography::double_hash;
use bytes::Bytes;
use tracing::warn;

/// Build the flat tree for `txs`. Empty when there are no transactions.
pub fn make_merkle_tree(txs: &[Transaction]) -> Vec<Option<Bytes>> {
    if txs.is_empty() {
        return Vec::new();
    }
    let leaves = txs.len().next_power_of_two();
    let mut tree = Vec::with_capacity(leaves * 2 - 1);
    tree.extend(txs.iter().map(|tx| Some(tx.txid.clone())));
    tree.resize(leaves, None);

    // Each pair of nodes, starting from the leaves, produces the next node of the layer above
    let mut cursor = 0;
    while tree.len() < leaves * 2 - 1 {
        let parent = match (&tree[cursor], &tree[cursor + 1]) {
            (None, _) => None,
            (Some(left), None) => Some(join(left, left)),
            (Some(left), Some(right)) => Some(join(left, right)),
        };
        tree.push(parent);
        cursor += 2;
    }
    tree
}

fn join(left: &[u8], right: &[u8]) -> Bytes {
    let mut concat = Vec::with_capacity(left.len() + right.len());
    concat.extend_from_slice(left);
    concat.extend_from_slice(right);
    Bytes::copy_from_slice(&double_hash(&concat))
}

/// Root of a flat tree, empty for an empty tree.
pub fn root(tree: &[Option<Bytes>]) -> Bytes {
    tree.last().cloned().flatten().unwrap_or_default()
}

/// Rebuild the tree from `block.transactions` and compare its root with `block.merkle_root`.
pub fn verify_merkle(block: &Block) -> Result<(), Error> {
    let tree = make_merkle_tree(&block.transactions);
    if tree.is_empty() {
        warn!(blockid = %block.blockid, "cannot build merkle tree without transactions");
        return Err(Error::MerkleTreeEmpty);
    }
    let rebuilt = root(&tree);
    if rebuilt != block.merkle_root {
        warn!(
            blockid = %block.blockid,
            expected = hex::encode(&block.merkle_root),
            rebuilt = hex::encode(&rebuilt),
            "merkle root mismatch"
        );
        return Err(Error::MerkleRootMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn txs(ids: &[&'static [u8]]) -> Vec<Transaction> {
        ids.iter()
            .map(|id| Transaction {
                txid: Bytes::from_static(*id),
                ..Default::default()
            })
            .collect()
    }

    fn block(transactions: Vec<Transaction>) -> Block {
        let tree = make_merkle_tree(&transactions);
        Block {
            merkle_root: root(&tree),
            tx_count: transactions.len() as i32,
            merkle_tree: tree,
            transactions,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty() {
        assert!(make_merkle_tree(&[]).is_empty());
        assert!(root(&[]).is_empty());
    }

    #[test]
    fn test_single_transaction_is_root() {
        let tree = make_merkle_tree(&txs(&[b"only"]));
        assert_eq!(tree, vec![Some(Bytes::from_static(b"only"))]);
    }

    #[test_case(2, 3; "two")]
    #[test_case(3, 7; "three")]
    #[test_case(4, 7; "four")]
    #[test_case(5, 15; "five")]
    fn test_tree_size(count: usize, size: usize) {
        let all: [&'static [u8]; 5] = [b"a", b"b", b"c", b"d", b"e"];
        assert_eq!(make_merkle_tree(&txs(&all[..count])).len(), size);
    }

    #[test]
    fn test_padding_rules() {
        let tree = make_merkle_tree(&txs(&[b"a", b"b", b"c"]));
        assert_eq!(tree[3], None);
        assert_eq!(tree[4], Some(join(b"a", b"b")));
        assert_eq!(tree[5], Some(join(b"c", b"c")));
        let root = join(tree[4].as_ref().unwrap(), tree[5].as_ref().unwrap());
        assert_eq!(tree[6], Some(root));
    }

    #[test]
    fn test_missing_left_propagates() {
        let tree = make_merkle_tree(&txs(&[b"a", b"b", b"c", b"d", b"e"]));
        assert_eq!(tree.len(), 15);
        assert!(tree[5..8].iter().all(Option::is_none));

        // A lone left child is paired with itself, two padding leaves yield nothing
        let lone = join(b"e", b"e");
        assert_eq!(tree[10], Some(lone.clone()));
        assert_eq!(tree[11], None);
        assert_eq!(tree[13], Some(join(&lone, &lone)));
    }

    #[test]
    fn test_verify() {
        let block = block(txs(&[b"a", b"b", b"c"]));
        verify_merkle(&block).unwrap();
    }

    #[test]
    fn test_verify_empty() {
        assert!(matches!(
            verify_merkle(&block(Vec::new())),
            Err(Error::MerkleTreeEmpty)
        ));
    }

    #[test]
    fn test_mutation_changes_root() {
        let original = block(txs(&[b"tx-1", b"tx-2", b"tx-3", b"tx-4"]));
        for index in 0..4 {
            for position in 0..4 {
                let mut mutated = original.clone();
                let mut txid = mutated.transactions[index].txid.to_vec();
                txid[position] ^= 0x01;
                mutated.transactions[index].txid = Bytes::from(txid);
                assert!(matches!(
                    verify_merkle(&mutated),
                    Err(Error::MerkleRootMismatch)
                ));
            }
        }
    }

    #[test]
    fn test_order_matters() {
        let forward = block(txs(&[b"a", b"b"]));
        let mut reversed = forward.clone();
        reversed.transactions.reverse();
        assert!(verify_merkle(&reversed).is_err());
    }
}
