//! End-to-end chain scenarios, ported from the reference test suite's
//! `test2_chain.py`: difficulty retargeting, undo, previous-id validation,
//! the zero-time-delta edge case, and a reorg across branches.

use std::sync::atomic::AtomicBool;

use zimcoin_consensus::{verify_reorg, ChainState};
use zimcoin_core::{create_signed_transaction, Address, Block, CryptoProvider, ValidationError, GENESIS_PREVIOUS};
use zimcoin_crypto::{generate_keypair, DefaultCryptoProvider};

fn mine(
    previous: [u8; 32],
    height: u64,
    miner: Address,
    transactions: Vec<zimcoin_core::Transaction>,
    timestamp: u64,
    difficulty: u128,
) -> Block {
    let cancel = AtomicBool::new(false);
    zimcoin_mining::mine_block(previous, height, miner, transactions, timestamp, difficulty, &cancel)
        .expect("mining with no cancellation never fails")
}

fn append_empty_block(state: &mut ChainState, crypto: &DefaultCryptoProvider, miner: Address, timestamp: u64) {
    let difficulty = state.calculate_difficulty();
    let block = mine(state_parent(state), state.longest_chain.len() as u64, miner, vec![], timestamp, difficulty);
    state.verify_and_apply_block(block, crypto).unwrap();
}

fn state_parent(state: &ChainState) -> [u8; 32] {
    state.longest_chain.last().map(|b| b.block_id).unwrap_or(GENESIS_PREVIOUS)
}

/// S4: applies the reference's literal 13-block timestamp/difficulty
/// sequence to the retarget formula, then checks that a 14th block mined
/// at the now-stale difficulty of 840 is rejected.
#[test]
fn test_difficulty_calculation() {
    let crypto = DefaultCryptoProvider::new();
    let miner = generate_keypair();
    let miner_address = crypto.address_from_public_key(&miner.public_key);
    let mut state = ChainState::new();

    let sequence: [(u64, u128); 13] = [
        (0, 1000),
        (34, 1000),
        (60, 1000),
        (60, 1000),
        (100, 1000),
        (500, 1000),
        (600, 1000),
        (800, 1000),
        (805, 1000),
        (805, 1000),
        (900, 1000),
        (1500, 1320),
        (1600, 840),
    ];

    for (height, (timestamp, difficulty)) in sequence.into_iter().enumerate() {
        let block = mine(state_parent(&state), height as u64, miner_address, vec![], timestamp, difficulty);
        state.verify_and_apply_block(block, &crypto).unwrap();
    }

    let stale = mine(state_parent(&state), 13, miner_address, vec![], 1600, 840);
    assert_eq!(
        state.verify_and_apply_block(stale, &crypto),
        Err(ValidationError::IncorrectDifficulty)
    );
}

/// S1 and S2: building an 18-block chain with a handful of transfers
/// between Alice and Bob, then undoing the last two blocks, restores
/// prior balances, nonces, and total difficulty exactly.
#[test]
fn test_undo() {
    let crypto = DefaultCryptoProvider::new();
    let alice = generate_keypair();
    let bob = generate_keypair();
    let alice_address = crypto.address_from_public_key(&alice.public_key);
    let bob_address = crypto.address_from_public_key(&bob.public_key);

    let mut state = ChainState::new();
    for height in 0..15u64 {
        append_empty_block(&mut state, &crypto, alice_address, height * 120);
    }
    let total_difficulty_at_15 = state.total_difficulty;

    let tx = create_signed_transaction(&crypto, &alice.secret_key, bob_address, 3_000, 25, 0);
    let difficulty = state.calculate_difficulty();
    let block = mine(state_parent(&state), 15, bob_address, vec![tx], 15 * 120, difficulty);
    state.verify_and_apply_block(block, &crypto).unwrap();

    let tx1 = create_signed_transaction(&crypto, &bob.secret_key, alice_address, 1_000, 50, 0);
    let tx2 = create_signed_transaction(&crypto, &alice.secret_key, bob_address, 100, 50, 1);
    let difficulty = state.calculate_difficulty();
    let block = mine(state_parent(&state), 16, bob_address, vec![tx1, tx2], 16 * 120, difficulty);
    state.verify_and_apply_block(block, &crypto).unwrap();

    let difficulty = state.calculate_difficulty();
    let block = mine(state_parent(&state), 17, bob_address, vec![], 17 * 120, difficulty);
    state.verify_and_apply_block(block, &crypto).unwrap();

    assert_eq!(state.longest_chain.len(), 18);
    assert_eq!(state.user_states.get_or_default(&alice_address).balance, 147_850);
    assert_eq!(state.user_states.get_or_default(&alice_address).nonce, 1);
    assert_eq!(state.user_states.get_or_default(&bob_address).balance, 32_150);
    assert_eq!(state.user_states.get_or_default(&bob_address).nonce, 0);

    state.undo_last_block();
    state.undo_last_block();

    assert_eq!(state.longest_chain.len(), 16);
    assert_eq!(state.user_states.get_or_default(&alice_address).balance, 147_000);
    assert_eq!(state.user_states.get_or_default(&alice_address).nonce, 0);
    assert_eq!(state.user_states.get_or_default(&bob_address).balance, 13_000);
    assert_eq!(state.user_states.get_or_default(&bob_address).nonce, -1);
    assert_eq!(state.total_difficulty, total_difficulty_at_15 + 2_000);
}

/// S5: a block naming the wrong previous id is rejected, whether or not a
/// chain already exists, and regardless of whether the height matches.
#[test]
fn test_previous_validation() {
    let crypto = DefaultCryptoProvider::new();
    let alice = generate_keypair();
    let alice_address = crypto.address_from_public_key(&alice.public_key);
    let mut state = ChainState::new();

    let bad_genesis = mine([1u8; 32], 0, alice_address, vec![], 0, 1_000);
    assert_eq!(
        state.verify_and_apply_block(bad_genesis, &crypto),
        Err(ValidationError::BadPrevious)
    );

    let good = mine(GENESIS_PREVIOUS, 0, alice_address, vec![], 0, 1_000);
    state.verify_and_apply_block(good, &crypto).unwrap();

    let wrong_previous = mine(GENESIS_PREVIOUS, 1, alice_address, vec![], 120, 1_000);
    assert_eq!(
        state.verify_and_apply_block(wrong_previous, &crypto),
        Err(ValidationError::BadPrevious)
    );
}

/// S3: when every block in the retarget window shares the same timestamp,
/// the zero time delta is substituted with 1 second rather than causing a
/// division by zero.
#[test]
fn test_difficulty_with_zero_time() {
    let crypto = DefaultCryptoProvider::new();
    let miner = generate_keypair();
    let miner_address = crypto.address_from_public_key(&miner.public_key);
    let mut state = ChainState::new();

    for height in 0..11u64 {
        let difficulty = state.calculate_difficulty();
        let block = mine(state_parent(&state), height, miner_address, vec![], 0, difficulty);
        state.verify_and_apply_block(block, &crypto).unwrap();
    }

    assert_eq!(state.calculate_difficulty(), 1_200_000);
}

/// S6: builds a 15-block chain under Alice, then an alternative branch
/// from height 8 under Bob. Matching the original chain's per-block
/// difficulty keeps the alternative branch from strictly exceeding the
/// original total difficulty until one more block is added.
#[test]
fn test_reorg() {
    let crypto = DefaultCryptoProvider::new();
    let alice = generate_keypair();
    let bob = generate_keypair();
    let alice_address = crypto.address_from_public_key(&alice.public_key);
    let bob_address = crypto.address_from_public_key(&bob.public_key);

    let mut state = ChainState::new();
    for height in 0..15u64 {
        append_empty_block(&mut state, &crypto, alice_address, height * 120);
    }
    assert_eq!(state.user_states.get_or_default(&alice_address).balance, 150_000);

    let split_height = 8u64;
    let fork_point = state.longest_chain[(split_height - 1) as usize].block_id;

    // Same heights and difficulties as the chain it would replace, so its
    // total difficulty does not strictly exceed the original's.
    let mut weak_branch = Vec::new();
    let mut previous = fork_point;
    for height in split_height..15 {
        let difficulty = state.longest_chain[height as usize].difficulty;
        let block = mine(previous, height, bob_address, vec![], height * 120, difficulty);
        previous = block.block_id;
        weak_branch.push(block);
    }

    let failed = verify_reorg(&state, weak_branch.clone(), &crypto);
    assert_eq!(failed.unwrap_err(), ValidationError::InsufficientTotalDifficulty);
    assert_eq!(state.user_states.get_or_default(&alice_address).balance, 150_000);
    assert_eq!(state.user_states.get_or_default(&bob_address).balance, 0);

    // One more block tips the alternative branch's total difficulty
    // strictly above the original chain's.
    let difficulty = state.calculate_difficulty();
    let extra = mine(previous, 15, bob_address, vec![], 15 * 120, difficulty);
    let mut new_branch = weak_branch;
    new_branch.push(extra);

    let reorged = verify_reorg(&state, new_branch, &crypto).unwrap();
    assert_eq!(reorged.longest_chain.len(), 16);
    assert_eq!(reorged.user_states.get_or_default(&alice_address).balance, 80_000);
    assert_eq!(reorged.user_states.get_or_default(&bob_address).balance, 80_000);

    // the pre-reorg state is never mutated
    assert_eq!(state.longest_chain.len(), 15);
    assert_eq!(state.user_states.get_or_default(&alice_address).balance, 150_000);
    assert_eq!(state.user_states.get_or_default(&bob_address).balance, 0);
}
