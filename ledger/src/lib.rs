//! Confirm blocks into a fork-aware ledger and keep a single trunk across competing branches.
//!
//! # Overview
//!
//! The [Ledger] stores every block it confirms, whether or not it ends up on the trunk (the
//! longest chain from the genesis block). When a branch grows past the trunk, the ledger switches
//! the trunk over to it: blocks walked off the old chain are flagged as off-trunk, blocks walked
//! onto the new one are flagged as on-trunk, and the ownership of every transaction they contain
//! is moved to the trunk copy. Each confirmation, switch, truncation, and prune is committed as a
//! single atomic [arbor_storage::Batch], so a crash never exposes a half-applied change.
//!
//! Blocks are identified by the double SHA-256 of a canonical encoding of their header (see
//! [id]) and commit to their transactions with a Merkle tree (see [merkle]). Optionally, a
//! block can carry a proof of work (see [pow]).
//!
//! # Example
//!
//! ```rust
//! use arbor_ledger::{block::{Transaction, TxOutput}, format, Config, Ledger};
//! use arbor_storage::memory::Memory;
//! use bytes::Bytes;
//! use num_bigint::BigUint;
//! use prometheus_client::registry::Registry;
//!
//! let mut registry = Registry::default();
//! let ledger = Ledger::init(Memory::default(), &mut registry, Config::default()).unwrap();
//!
//! let mut coinbase = Transaction {
//!     coinbase: true,
//!     outputs: vec![TxOutput::new(&BigUint::from(100u32), &b"founder"[..])],
//!     desc: Bytes::from_static(br#"{"award": "10", "maxblocksize": "16"}"#),
//!     ..Default::default()
//! };
//! coinbase.txid = coinbase.make_txid();
//!
//! let root = format::format_root_block(vec![coinbase]);
//! let status = ledger.confirm_block(&root, true);
//! assert!(status.succ);
//! assert_eq!(ledger.meta().tip_blockid, Some(root.blockid));
//! assert_eq!(ledger.max_block_size().unwrap(), 16 << 20);
//! ```

use thiserror::Error;

pub mod block;
pub mod cache;
pub mod format;
pub mod genesis;
pub mod id;
mod ledger;
pub use ledger::{Config, ConfirmStatus, Ledger};
pub mod merkle;
mod metrics;
pub mod pow;
pub mod tables;

/// Errors that can occur when interacting with the [Ledger].
#[derive(Debug, Error)]
pub enum Error {
    #[error("block does not exist")]
    BlockNotExist,
    #[error("block already exists")]
    BlockExist,
    #[error("block is not on the trunk")]
    BlockNotInTrunk,
    #[error("transaction not found")]
    TxNotFound,
    #[error("transaction duplicated in a trunk block")]
    TxDuplicated,
    #[error("transaction not confirmed")]
    TxNotConfirmed,
    #[error("ledger already has a genesis block")]
    RootBlockAlreadyExist,
    #[error("genesis block must not have a parent")]
    RootHasParent,
    #[error("block has more than one coinbase transaction")]
    CoinbaseCountExceeded,
    #[error("mining interrupted")]
    MinerInterrupted,
    #[error("nonce space exhausted")]
    NonceExhausted,
    #[error("invalid target bits: {0}")]
    InvalidTargetBits(i32),
    #[error("cannot build merkle tree without transactions")]
    MerkleTreeEmpty,
    #[error("merkle root mismatch")]
    MerkleRootMismatch,
    #[error("genesis block has no coinbase transaction")]
    GenesisTxMissing,
    #[error("genesis block not loaded")]
    GenesisNotLoaded,
    #[error("invalid genesis config: {0}")]
    InvalidGenesis(#[from] serde_json::Error),
    #[error("codec error: {0}")]
    Codec(#[from] arbor_codec::Error),
    #[error("storage error: {0}")]
    Storage(#[from] arbor_storage::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] arbor_cryptography::Error),
    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}
