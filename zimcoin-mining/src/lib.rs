//! Nonce search against a proof-of-work target.
//!
//! Ported from the reference implementation's `puzzle_solver`/`mine_block`:
//! build the header digest once, then clone it per candidate nonce rather
//! than rebuilding the whole pre-image from scratch on every attempt.

use std::sync::atomic::{AtomicBool, Ordering};

use primitive_types::U256;
use sha2::Digest;
use zimcoin_core::{block_header_digest, pow_target, Address, Block, BlockHash, Transaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MiningError {
    #[error("mining cancelled")]
    Cancelled,
}

/// Search for a nonce solving the proof-of-work puzzle for this header,
/// checking `cancel` between attempts. A node's miner actor sets `cancel`
/// when it needs to abandon the current block (e.g. a competing block just
/// arrived from the network).
pub fn mine_block(
    previous: BlockHash,
    height: u64,
    miner: Address,
    transactions: Vec<Transaction>,
    timestamp: u64,
    difficulty: u128,
    cancel: &AtomicBool,
) -> Result<Block, MiningError> {
    let header = block_header_digest(&previous, &miner, &transactions, timestamp, difficulty);
    let target = pow_target(difficulty);
    let nonce = puzzle_solver(&header, target, cancel)?;

    let mut id_hasher = header.clone();
    id_hasher.update(nonce.to_le_bytes());
    let block_id: BlockHash = id_hasher.finalize().into();

    tracing::debug!(height, nonce, difficulty, "block mined");

    Ok(Block {
        previous,
        height,
        miner,
        transactions,
        timestamp,
        difficulty,
        block_id,
        nonce,
    })
}

/// Find a nonce such that `header` extended with it, interpreted as a
/// big-endian 256-bit integer, is at most `target`.
fn puzzle_solver(header: &sha2::Sha256, target: U256, cancel: &AtomicBool) -> Result<u64, MiningError> {
    let mut nonce: u64 = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(MiningError::Cancelled);
        }

        let mut candidate = header.clone();
        candidate.update(nonce.to_le_bytes());
        let digest: [u8; 32] = candidate.finalize().into();

        if U256::from_big_endian(&digest) <= target {
            return Ok(nonce);
        }
        nonce = nonce.wrapping_add(1);
    }
}
