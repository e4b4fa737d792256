//! Chain state machine: append, undo and reorg over a sequence of blocks,
//! plus difficulty retargeting. Ported from the reference implementation's
//! `BlockchainState`/`verify_reorg`.

use zimcoin_core::{
    get_changes_for_undo, verify_and_get_changes, AccountMap, Block, BlockHash, CryptoProvider,
    ValidationError, BOOTSTRAP_DIFFICULTY, DIFFICULTY_RETARGET_WINDOW, GENESIS_PREVIOUS,
    TARGET_BLOCK_INTERVAL_SECS,
};

/// The longest known chain, the account states at its tip, and the running
/// sum of every block's difficulty on it.
#[derive(Debug, Clone)]
pub struct ChainState {
    pub longest_chain: Vec<Block>,
    pub user_states: AccountMap,
    pub total_difficulty: u128,
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainState {
    pub fn new() -> Self {
        ChainState {
            longest_chain: Vec::new(),
            user_states: AccountMap::new(),
            total_difficulty: 0,
        }
    }

    fn parent_block_id(&self) -> BlockHash {
        self.longest_chain.last().map(|b| b.block_id).unwrap_or(GENESIS_PREVIOUS)
    }

    /// Retarget difficulty so each block takes on average
    /// `TARGET_BLOCK_INTERVAL_SECS` to mine, looking back over the last
    /// `DIFFICULTY_RETARGET_WINDOW` blocks. Chains too short for a full
    /// window use the bootstrap difficulty.
    pub fn calculate_difficulty(&self) -> u128 {
        let len = self.longest_chain.len();
        if len <= DIFFICULTY_RETARGET_WINDOW {
            return BOOTSTRAP_DIFFICULTY;
        }

        let window = &self.longest_chain[len - DIFFICULTY_RETARGET_WINDOW..];
        let difficulty_for_period: u128 = window.iter().map(|b| b.difficulty).sum();

        let newest = &self.longest_chain[len - 1];
        let oldest = &self.longest_chain[len - DIFFICULTY_RETARGET_WINDOW - 1];
        let mut time_for_period = newest.timestamp.saturating_sub(oldest.timestamp) as u128;
        if time_for_period == 0 {
            time_for_period = 1;
        }

        (difficulty_for_period / time_for_period) * TARGET_BLOCK_INTERVAL_SECS as u128
    }

    /// Append `block` if it's a valid successor to the current tip. Leaves
    /// `self` untouched on failure.
    pub fn verify_and_apply_block<C: CryptoProvider>(
        &mut self,
        block: Block,
        crypto: &C,
    ) -> Result<(), ValidationError> {
        if block.height != self.longest_chain.len() as u64 {
            return Err(ValidationError::BadHeight);
        }
        if block.previous != self.parent_block_id() {
            return Err(ValidationError::BadPrevious);
        }
        if let Some(parent) = self.longest_chain.last() {
            if block.timestamp < parent.timestamp {
                return Err(ValidationError::BadTimestamp);
            }
        }

        let difficulty = self.calculate_difficulty();
        let updated_states = verify_and_get_changes(&block, difficulty, &self.user_states, crypto)?;

        self.total_difficulty += block.difficulty;
        self.user_states = updated_states;
        tracing::info!(height = block.height, block_id = ?block.block_id, "block accepted");
        self.longest_chain.push(block);
        Ok(())
    }

    /// Remove the tip block and roll account states back to before it.
    ///
    /// # Panics
    /// Panics if the chain is empty.
    pub fn undo_last_block(&mut self) {
        let removed = self.longest_chain.pop().expect("undo_last_block called on an empty chain");
        self.total_difficulty -= removed.difficulty;
        self.user_states = get_changes_for_undo(&removed, &self.user_states);
        tracing::info!(height = removed.height, "block undone");
    }
}

/// Replace the tip of `old_state` with `new_branch`, a chain of blocks
/// sharing an ancestor at `new_branch[0].height`. Succeeds only if the
/// resulting chain has strictly greater total difficulty; `old_state` is
/// never mutated, win or lose.
pub fn verify_reorg<C: CryptoProvider>(
    old_state: &ChainState,
    new_branch: Vec<Block>,
    crypto: &C,
) -> Result<ChainState, ValidationError> {
    let mut new_state = old_state.clone();
    let split_height = new_branch.first().map(|b| b.height).unwrap_or(0);

    while let Some(tip) = new_state.longest_chain.last() {
        if tip.height >= split_height {
            new_state.undo_last_block();
        } else {
            break;
        }
    }

    for block in new_branch {
        new_state.verify_and_apply_block(block, crypto)?;
    }

    if new_state.total_difficulty <= old_state.total_difficulty {
        return Err(ValidationError::InsufficientTotalDifficulty);
    }

    tracing::info!(
        new_height = new_state.longest_chain.len(),
        total_difficulty = new_state.total_difficulty,
        "reorg applied"
    );
    Ok(new_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_chain_state_bootstraps_at_default_difficulty() {
        let state = ChainState::new();
        assert_eq!(state.calculate_difficulty(), BOOTSTRAP_DIFFICULTY);
        assert_eq!(state.parent_block_id(), GENESIS_PREVIOUS);
    }

    #[test]
    fn undo_on_empty_chain_panics() {
        let result = std::panic::catch_unwind(|| ChainState::new().undo_last_block());
        assert!(result.is_err());
    }
}
