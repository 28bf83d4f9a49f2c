//! Interruptible proof-of-work nonce search.
//!
//! A block satisfies a difficulty of `target_bits` when its id, read as a big-endian unsigned
//! integer, is below `2^(256 - target_bits)`. [search] increments the nonce until that holds,
//! polling a [MiningGate] every [CHECK_INTERVAL] attempts so that a miner can be preempted (for
//! example, when a competing block at the same height arrives from a peer).

use crate::{block::Block, id::make_block_id, Error};
use arbor_cryptography::Digest;
use parking_lot::Mutex;
use std::{sync::Arc, thread::JoinHandle};
use tracing::debug;

/// Number of hash attempts between two polls of the [MiningGate].
pub const CHECK_INTERVAL: u64 = 1_000;

/// Largest meaningful difficulty.
const MAX_TARGET_BITS: i32 = 256;

struct GateState {
    enabled: bool,
    height: i64,
}

/// Enables or preempts proof-of-work searches.
///
/// An abort only takes effect if it refers to a height at or above the height mining was last
/// started for, so a late abort for an older height cannot stop a newer search.
pub struct MiningGate {
    state: Mutex<GateState>,
}

impl Default for MiningGate {
    fn default() -> Self {
        Self {
            state: Mutex::new(GateState {
                enabled: true,
                height: 0,
            }),
        }
    }
}

impl MiningGate {
    /// Allow mining of a block at `height`.
    pub fn start(&self, height: i64) {
        let mut state = self.state.lock();
        state.enabled = true;
        state.height = height;
    }

    /// Stop mining if `height` is not older than the height mining was started for.
    pub fn abort(&self, height: i64) {
        let mut state = self.state.lock();
        if height >= state.height {
            state.enabled = false;
        }
    }

    /// Whether mining may continue.
    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }
}

/// Whether `blockid` meets a difficulty of `target_bits`.
pub fn is_proofed(blockid: &Digest, target_bits: i32) -> bool {
    if target_bits <= 0 {
        return true;
    }
    leading_zeros(blockid) >= target_bits as u32
}

fn leading_zeros(digest: &Digest) -> u32 {
    let mut zeros = 0;
    for byte in digest.iter() {
        if *byte != 0 {
            return zeros + byte.leading_zeros();
        }
        zeros += 8;
    }
    zeros
}

/// Search for a nonce that makes `block` meet its `target_bits`, updating its id.
pub fn search(mut block: Block, gate: &MiningGate) -> Result<Block, Error> {
    let bits = block.target_bits;
    if !(0..=MAX_TARGET_BITS).contains(&bits) {
        return Err(Error::InvalidTargetBits(bits));
    }
    for attempt in 0..=u64::from(u32::MAX) {
        if attempt % CHECK_INTERVAL == 0 && !gate.is_enabled() {
            debug!(attempt, height = block.height, "proof of work interrupted");
            return Err(Error::MinerInterrupted);
        }
        block.blockid = make_block_id(&block);
        if is_proofed(&block.blockid, bits) {
            debug!(attempt, nonce = block.nonce, blockid = %block.blockid, "proof of work found");
            return Ok(block);
        }
        block.nonce = block.nonce.wrapping_add(1);
    }
    Err(Error::NonceExhausted)
}

/// Run [search] on a dedicated thread.
pub fn spawn(block: Block, gate: Arc<MiningGate>) -> JoinHandle<Result<Block, Error>> {
    std::thread::spawn(move || search(block, &gate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn digest(prefix: &[u8]) -> Digest {
        let mut raw = [0xffu8; 32];
        raw[..prefix.len()].copy_from_slice(prefix);
        Digest::from(raw)
    }

    #[test_case(&[0x00, 0x01], 15, true; "exactly fifteen zeros")]
    #[test_case(&[0x00, 0x01], 16, false; "one short")]
    #[test_case(&[0x80], 1, false; "top bit set")]
    #[test_case(&[0x7f], 1, true; "top bit clear")]
    #[test_case(&[], 0, true; "no difficulty")]
    fn test_is_proofed(prefix: &[u8], bits: i32, expected: bool) {
        assert_eq!(is_proofed(&digest(prefix), bits), expected);
    }

    #[test]
    fn test_all_zero_digest() {
        let zero = Digest::from([0u8; 32]);
        assert!(is_proofed(&zero, 256));
    }

    #[test]
    fn test_search_finds_nonce() {
        let gate = MiningGate::default();
        let block = Block {
            target_bits: 8,
            ..Default::default()
        };
        let mined = search(block, &gate).unwrap();
        assert_eq!(mined.blockid[0], 0);
        assert_eq!(mined.blockid, make_block_id(&mined));
    }

    #[test]
    fn test_search_rejects_invalid_bits() {
        let gate = MiningGate::default();
        let block = Block {
            target_bits: 257,
            ..Default::default()
        };
        assert!(matches!(
            search(block, &gate),
            Err(Error::InvalidTargetBits(257))
        ));
    }

    #[test]
    fn test_search_interrupted() {
        let gate = MiningGate::default();
        gate.abort(0);
        let block = Block {
            target_bits: 8,
            ..Default::default()
        };
        assert!(matches!(search(block, &gate), Err(Error::MinerInterrupted)));
    }

    #[test]
    fn test_stale_abort_ignored() {
        let gate = MiningGate::default();
        gate.start(10);
        gate.abort(9);
        assert!(gate.is_enabled());
        gate.abort(10);
        assert!(!gate.is_enabled());
        gate.start(11);
        assert!(gate.is_enabled());
    }

    #[test]
    fn test_spawned_search_preempted() {
        let gate = Arc::new(MiningGate::default());
        gate.start(5);
        let block = Block {
            height: 5,
            target_bits: 250,
            ..Default::default()
        };
        let handle = spawn(block, gate.clone());
        gate.abort(5);
        let result = handle.join().unwrap();
        assert!(matches!(result, Err(Error::MinerInterrupted)));
    }
}
