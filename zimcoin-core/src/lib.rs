//! Data model and deterministic state-transition function for the Zimcoin
//! consensus core: addresses, account states, transactions and blocks.
//!
//! Cryptographic operations (ECDSA signing/verification, address derivation)
//! are not implemented here; they're reached through the [`CryptoProvider`]
//! trait so this crate stays agnostic of the concrete curve/library used —
//! `zimcoin-crypto` supplies the real implementation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// 20-byte account identifier: SHA-1 of the DER-encoded public key.
pub type Address = [u8; 20];
/// 32-byte transaction id.
pub type TxHash = [u8; 32];
/// 32-byte block id.
pub type BlockHash = [u8; 32];
/// DER (X.509 SubjectPublicKeyInfo) encoded public key bytes.
pub type EncodedPublicKey = Vec<u8>;

pub const MINING_REWARD: u64 = 10_000;
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 25;
pub const GENESIS_PREVIOUS: BlockHash = [0u8; 32];
pub const BOOTSTRAP_DIFFICULTY: u128 = 1_000;
pub const DIFFICULTY_RETARGET_WINDOW: usize = 10;
pub const TARGET_BLOCK_INTERVAL_SECS: u64 = 120;

/// The closed set of reasons a block or transaction can be rejected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("incorrect difficulty")]
    IncorrectDifficulty,
    #[error("bad block id")]
    BadBlockId,
    #[error("too many transactions")]
    TooManyTransactions,
    #[error("bad miner length")]
    BadMinerLength,
    #[error("insufficient proof-of-work")]
    InsufficientProofOfWork,
    #[error("bad sender hash")]
    BadSenderHash,
    #[error("bad recipient hash")]
    BadRecipientHash,
    #[error("bad amount")]
    BadAmount,
    #[error("bad fee")]
    BadFee,
    #[error("bad nonce")]
    BadNonce,
    #[error("bad txid")]
    BadTxid,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("bad height")]
    BadHeight,
    #[error("bad previous")]
    BadPrevious,
    #[error("bad timestamp")]
    BadTimestamp,
    #[error("insufficient total difficulty")]
    InsufficientTotalDifficulty,
}

/// Keyed cryptographic operations the core needs but doesn't implement
/// itself. `zimcoin-crypto::DefaultCryptoProvider` is the production
/// implementation (secp256k1 ECDSA, SHA-1 addressing); tests use a stub.
pub trait CryptoProvider: Send + Sync {
    /// Derive the DER-encoded public key corresponding to a secret key.
    fn public_key_from_secret(&self, secret_key: &[u8]) -> EncodedPublicKey;
    /// `SHA-1(DER(public_key))`.
    fn address_from_public_key(&self, der_public_key: &[u8]) -> Address;
    /// Sign `message` (already hashed by the caller) with `secret_key`, returning a DER signature.
    fn sign_message(&self, secret_key: &[u8], message: &[u8]) -> Vec<u8>;
    /// Verify a DER-encoded ECDSA signature over `message`.
    fn verify_signature(&self, der_public_key: &[u8], message: &[u8], der_signature: &[u8]) -> bool;
}

/// `(balance, nonce)` for one address. Absent addresses behave as if they
/// held `AccountState::default()` — callers should use
/// [`AccountMap::get_or_default`] rather than growing the map on reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountState {
    pub balance: u64,
    pub nonce: i64,
}

impl Default for AccountState {
    fn default() -> Self {
        AccountState { balance: 0, nonce: -1 }
    }
}

impl AccountState {
    /// Credit `amount`. Wrapping arithmetic: during `undo` replay a balance
    /// can transiently underflow below what a forward application would
    /// ever produce, but the final value after a matched earn/undo pair is
    /// always back in range, so wrapping u64 arithmetic reconstructs it
    /// exactly (see `earn_undo`).
    pub fn earn(self, amount: u64) -> Self {
        AccountState { balance: self.balance.wrapping_add(amount), ..self }
    }

    /// Inverse of [`earn`](Self::earn).
    pub fn earn_undo(self, amount: u64) -> Self {
        AccountState { balance: self.balance.wrapping_sub(amount), ..self }
    }

    /// Debit `amount` and advance the nonce by one.
    pub fn spend(self, amount: u64) -> Self {
        AccountState {
            balance: self.balance.wrapping_sub(amount),
            nonce: self.nonce + 1,
        }
    }

    /// Inverse of [`spend`](Self::spend).
    pub fn spend_undo(self, amount: u64) -> Self {
        AccountState {
            balance: self.balance.wrapping_add(amount),
            nonce: self.nonce - 1,
        }
    }
}

/// `Address -> AccountState`, with the defaulting rule from the data model:
/// an address that has never been touched is indistinguishable from one at
/// `AccountState::default()`.
#[derive(Debug, Clone, Default)]
pub struct AccountMap(HashMap<Address, AccountState>);

impl AccountMap {
    pub fn new() -> Self {
        AccountMap(HashMap::new())
    }

    pub fn get_or_default(&self, address: &Address) -> AccountState {
        self.0.get(address).copied().unwrap_or_default()
    }

    pub fn set(&mut self, address: Address, state: AccountState) {
        self.0.insert(address, state);
    }

    pub fn credit(&mut self, address: &Address, amount: u64) {
        let updated = self.get_or_default(address).earn(amount);
        self.0.insert(*address, updated);
    }

    pub fn credit_undo(&mut self, address: &Address, amount: u64) {
        let updated = self.get_or_default(address).earn_undo(amount);
        self.0.insert(*address, updated);
    }

    pub fn debit(&mut self, address: &Address, amount: u64) {
        let updated = self.get_or_default(address).spend(amount);
        self.0.insert(*address, updated);
    }

    pub fn debit_undo(&mut self, address: &Address, amount: u64) {
        let updated = self.get_or_default(address).spend_undo(amount);
        self.0.insert(*address, updated);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &AccountState)> {
        self.0.iter()
    }
}

impl PartialEq for AccountMap {
    fn eq(&self, other: &Self) -> bool {
        self.0
            .keys()
            .chain(other.0.keys())
            .all(|k| self.get_or_default(k) == other.get_or_default(k))
    }
}
impl Eq for AccountMap {}

/// A self-contained signed value transfer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub sender_hash: Address,
    pub recipient_hash: Address,
    pub sender_public_key: EncodedPublicKey,
    pub amount: u64,
    pub fee: u64,
    pub nonce: u64,
    pub signature: Vec<u8>,
    pub txid: TxHash,
}

impl Transaction {
    /// `SHA-256(recipient_hash ‖ amount_LE8 ‖ fee_LE8 ‖ nonce_LE8)`: the
    /// message the sender's signature commits to.
    pub fn signing_message(recipient_hash: &Address, amount: u64, fee: u64, nonce: u64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(recipient_hash);
        hasher.update(amount.to_le_bytes());
        hasher.update(fee.to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.finalize().into()
    }

    /// `SHA-256(sender_hash ‖ recipient_hash ‖ DER(sender_pk) ‖ amount_LE8 ‖ fee_LE8 ‖ nonce_LE8 ‖ signature)`.
    pub fn compute_txid(
        sender_hash: &Address,
        recipient_hash: &Address,
        sender_public_key: &[u8],
        amount: u64,
        fee: u64,
        nonce: u64,
        signature: &[u8],
    ) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(sender_hash);
        hasher.update(recipient_hash);
        hasher.update(sender_public_key);
        hasher.update(amount.to_le_bytes());
        hasher.update(fee.to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(signature);
        hasher.finalize().into()
    }

    /// The seven ordered checks from the data model. `sender_hash`/
    /// `recipient_hash` length is enforced structurally by the `Address`
    /// type and isn't re-checked here (see Open Questions in DESIGN.md).
    pub fn verify<C: CryptoProvider>(
        &self,
        sender_balance: u64,
        sender_previous_nonce: i64,
        crypto: &C,
    ) -> Result<(), ValidationError> {
        if self.sender_hash != crypto.address_from_public_key(&self.sender_public_key) {
            return Err(ValidationError::BadSenderHash);
        }
        if self.amount == 0 || self.amount > sender_balance {
            return Err(ValidationError::BadAmount);
        }
        if self.fee > self.amount {
            return Err(ValidationError::BadFee);
        }
        let expected_nonce = sender_previous_nonce
            .checked_add(1)
            .ok_or(ValidationError::BadNonce)?;
        if expected_nonce < 0 || self.nonce != expected_nonce as u64 {
            return Err(ValidationError::BadNonce);
        }
        let expected_txid = Self::compute_txid(
            &self.sender_hash,
            &self.recipient_hash,
            &self.sender_public_key,
            self.amount,
            self.fee,
            self.nonce,
            &self.signature,
        );
        if self.txid != expected_txid {
            return Err(ValidationError::BadTxid);
        }
        let message = Self::signing_message(&self.recipient_hash, self.amount, self.fee, self.nonce);
        if !crypto.verify_signature(&self.sender_public_key, &message, &self.signature) {
            return Err(ValidationError::InvalidSignature);
        }
        Ok(())
    }
}

/// Build and sign a [`Transaction`] from a sender secret key.
pub fn create_signed_transaction<C: CryptoProvider>(
    crypto: &C,
    sender_secret_key: &[u8],
    recipient_hash: Address,
    amount: u64,
    fee: u64,
    nonce: u64,
) -> Transaction {
    let sender_public_key = crypto.public_key_from_secret(sender_secret_key);
    let sender_hash = crypto.address_from_public_key(&sender_public_key);
    let message = Transaction::signing_message(&recipient_hash, amount, fee, nonce);
    let signature = crypto.sign_message(sender_secret_key, &message);
    let txid = Transaction::compute_txid(
        &sender_hash,
        &recipient_hash,
        &sender_public_key,
        amount,
        fee,
        nonce,
        &signature,
    );
    Transaction {
        sender_hash,
        recipient_hash,
        sender_public_key,
        amount,
        fee,
        nonce,
        signature,
        txid,
    }
}

/// A header plus an ordered list of up to 25 transactions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Block {
    pub previous: BlockHash,
    pub height: u64,
    pub miner: Address,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
    pub difficulty: u128,
    pub block_id: BlockHash,
    pub nonce: u64,
}

/// The incremental digest over everything in `block_id`'s pre-image except
/// the nonce. Mining clones this per candidate nonce instead of rebuilding
/// the whole pre-image from scratch each attempt.
pub fn block_header_digest(
    previous: &BlockHash,
    miner: &Address,
    transactions: &[Transaction],
    timestamp: u64,
    difficulty: u128,
) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(previous);
    hasher.update(miner);
    for tx in transactions {
        hasher.update(tx.txid);
    }
    hasher.update(timestamp.to_le_bytes());
    hasher.update(difficulty.to_le_bytes());
    hasher
}

pub fn compute_block_id(
    previous: &BlockHash,
    miner: &Address,
    transactions: &[Transaction],
    timestamp: u64,
    difficulty: u128,
    nonce: u64,
) -> BlockHash {
    let mut hasher = block_header_digest(previous, miner, transactions, timestamp, difficulty);
    hasher.update(nonce.to_le_bytes());
    hasher.finalize().into()
}

/// `floor(2**256 / difficulty)`, computed without ever materializing
/// `2**256` (which doesn't fit in a `U256`). Derived from
/// `floor((M+1)/d) = floor(M/d) + 1` iff `M mod d == d-1`, where
/// `M = U256::MAX`. `difficulty <= 1` is treated as "no limit" — every
/// 256-bit block id trivially satisfies it.
pub fn pow_target(difficulty: u128) -> primitive_types::U256 {
    use primitive_types::U256;
    if difficulty <= 1 {
        return U256::MAX;
    }
    let d = U256::from(difficulty);
    let max = U256::MAX;
    let q = max / d;
    let r = max % d;
    if r == d - U256::one() {
        q + U256::one()
    } else {
        q
    }
}

pub fn meets_difficulty(block_id: &BlockHash, difficulty: u128) -> bool {
    primitive_types::U256::from_big_endian(block_id) <= pow_target(difficulty)
}

/// The state transition from §4.3: apply `block` to a copy of `pre_state`.
/// Does not perform any of the block-level admissibility checks in
/// [`verify_and_get_changes`] — callers that skip those get an unchecked
/// transition (used by trusted replay paths).
pub fn apply_block<C: CryptoProvider>(
    pre_state: &AccountMap,
    block: &Block,
    crypto: &C,
) -> Result<AccountMap, ValidationError> {
    let mut state = pre_state.clone();
    state.credit(&block.miner, MINING_REWARD);
    for tx in &block.transactions {
        let sender = state.get_or_default(&tx.sender_hash);
        tx.verify(sender.balance, sender.nonce, crypto)?;
        state.credit(&block.miner, tx.fee);
        state.debit(&tx.sender_hash, tx.amount);
        state.credit(&tx.recipient_hash, tx.amount - tx.fee);
    }
    Ok(state)
}

/// Full block admissibility check (difficulty, block id, size, PoW) plus
/// the state transition. `pre_state` is left untouched on any failure.
pub fn verify_and_get_changes<C: CryptoProvider>(
    block: &Block,
    expected_difficulty: u128,
    pre_state: &AccountMap,
    crypto: &C,
) -> Result<AccountMap, ValidationError> {
    if block.difficulty != expected_difficulty {
        return Err(ValidationError::IncorrectDifficulty);
    }
    let expected_id = compute_block_id(
        &block.previous,
        &block.miner,
        &block.transactions,
        block.timestamp,
        block.difficulty,
        block.nonce,
    );
    if block.block_id != expected_id {
        return Err(ValidationError::BadBlockId);
    }
    if block.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK {
        return Err(ValidationError::TooManyTransactions);
    }
    if !meets_difficulty(&block.block_id, block.difficulty) {
        return Err(ValidationError::InsufficientProofOfWork);
    }
    apply_block(pre_state, block, crypto)
}

/// Exact inverse of the state transition, defined only for a `post_state`
/// genuinely produced by applying this same `block` — no re-verification is
/// performed.
pub fn get_changes_for_undo(block: &Block, post_state: &AccountMap) -> AccountMap {
    let mut state = post_state.clone();
    state.credit_undo(&block.miner, MINING_REWARD);
    for tx in &block.transactions {
        state.credit_undo(&block.miner, tx.fee);
        state.debit_undo(&tx.sender_hash, tx.amount);
        state.credit_undo(&tx.recipient_hash, tx.amount - tx.fee);
    }
    state
}
