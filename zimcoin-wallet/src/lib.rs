//! Key custody: secp256k1 keypair generation, password-based secret
//! encryption at rest (AES-256-GCM with a PBKDF2-derived key), and a
//! `create_signed_transaction` helper for building transactions from a
//! stored wallet. The Python reference hardcodes `MINER_ADDRESS` and never
//! persists keys; this exists because a CLI needs somewhere to keep a
//! secret key between invocations.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{anyhow, Result};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use zimcoin_core::{create_signed_transaction as build_signed_transaction, Address, Transaction};
use zimcoin_crypto::{address_from_string, address_to_string, generate_keypair, DefaultCryptoProvider};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub address: Address,
    pub public_key: Vec<u8>,
    pub encrypted_secret: Vec<u8>,
    pub nonce: [u8; 12],
}

pub struct WalletStore {
    root: PathBuf,
    crypto: DefaultCryptoProvider,
}

impl WalletStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            crypto: DefaultCryptoProvider::new(),
        })
    }

    pub fn create(&self, name: &str, password: &str) -> Result<Wallet> {
        let keys = generate_keypair();
        let address = self.crypto.address_from_public_key(&keys.public_key);
        let (encrypted_secret, nonce) = encrypt_secret(&keys.secret_key, password)?;
        let wallet = Wallet {
            name: name.to_string(),
            address,
            public_key: keys.public_key,
            encrypted_secret,
            nonce,
        };
        let path = self.root.join(format!("{name}.json"));
        fs::write(path, serde_json::to_vec_pretty(&wallet)?)?;
        Ok(wallet)
    }

    pub fn list(&self) -> Result<Vec<Wallet>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let bytes = fs::read(entry.path())?;
                let wallet: Wallet = serde_json::from_slice(&bytes)?;
                out.push(wallet);
            }
        }
        Ok(out)
    }

    pub fn load(&self, name: &str) -> Result<Wallet> {
        let path = self.root.join(format!("{name}.json"));
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn unlock_secret(&self, wallet: &Wallet, password: &str) -> Result<Vec<u8>> {
        decrypt_secret(&wallet.encrypted_secret, &wallet.nonce, password)
    }

    /// Build and sign a transaction spending from `wallet`, unlocked with
    /// `password`.
    pub fn create_signed_transaction(
        &self,
        wallet: &Wallet,
        password: &str,
        recipient: Address,
        amount: u64,
        fee: u64,
        nonce: u64,
    ) -> Result<Transaction> {
        let secret_key = self.unlock_secret(wallet, password)?;
        Ok(build_signed_transaction(&self.crypto, &secret_key, recipient, amount, fee, nonce))
    }
}

fn encrypt_secret(secret: &[u8], password: &str) -> Result<(Vec<u8>, [u8; 12])> {
    let mut salt = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    let mut key = [0u8; 32];
    pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), &salt, 10_000, &mut key);
    let cipher = Aes256Gcm::new_from_slice(&key)?;
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, secret).map_err(|e| anyhow!("encrypt failed: {e}"))?;
    let mut out = salt.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok((out, nonce_bytes))
}

fn decrypt_secret(ciphertext: &[u8], nonce: &[u8; 12], password: &str) -> Result<Vec<u8>> {
    if ciphertext.len() < 16 {
        return Err(anyhow!("ciphertext too short"));
    }
    let (salt, ct) = ciphertext.split_at(16);
    let mut key = [0u8; 32];
    pbkdf2_hmac::<sha2::Sha256>(password.as_bytes(), salt, 10_000, &mut key);
    let cipher = Aes256Gcm::new_from_slice(&key)?;
    let plaintext = cipher.decrypt(Nonce::from_slice(nonce), ct).map_err(|e| anyhow!("decrypt failed: {e}"))?;
    Ok(plaintext)
}

pub fn address_to_string_display(addr: &Address) -> String {
    address_to_string(addr)
}

pub fn address_from_display(s: &str) -> Result<Address> {
    address_from_string(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(dir.path().to_path_buf()).unwrap();
        let wallet = store.create("test", "pass").unwrap();
        let secret = store.unlock_secret(&wallet, "pass").unwrap();
        assert!(!secret.is_empty());
    }

    #[test]
    fn wrong_password_fails_to_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(dir.path().to_path_buf()).unwrap();
        let wallet = store.create("test", "pass").unwrap();
        assert!(store.unlock_secret(&wallet, "wrong").is_err());
    }

    #[test]
    fn create_signed_transaction_spends_from_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(dir.path().to_path_buf()).unwrap();
        let wallet = store.create("alice", "pass").unwrap();
        let recipient = [9u8; 20];
        let tx = store.create_signed_transaction(&wallet, "pass", recipient, 100, 1, 0).unwrap();
        assert_eq!(tx.recipient_hash, recipient);
        assert_eq!(tx.amount, 100);
    }

    #[test]
    fn listed_wallets_include_created_ones() {
        let dir = tempfile::tempdir().unwrap();
        let store = WalletStore::new(dir.path().to_path_buf()).unwrap();
        store.create("alice", "pass").unwrap();
        store.create("bob", "pass").unwrap();
        let wallets = store.list().unwrap();
        assert_eq!(wallets.len(), 2);
    }
}
