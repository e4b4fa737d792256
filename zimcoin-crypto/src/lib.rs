//! Production [`CryptoProvider`] for Zimcoin: secp256k1 ECDSA over a
//! pre-hashed SHA-256 message, DER (X.509 SubjectPublicKeyInfo) encoded
//! public keys, SHA-1 address derivation.

use anyhow::{anyhow, Result};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand_core::OsRng;
use sha1::{Digest as Sha1Digest, Sha1};
use zimcoin_core::{Address, CryptoProvider, EncodedPublicKey};

/// A freshly generated secp256k1 keypair.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub secret_key: Vec<u8>,
    pub public_key: EncodedPublicKey,
}

/// Generate a new secp256k1 keypair for a wallet.
pub fn generate_keypair() -> KeyMaterial {
    let signing_key = SigningKey::random(&mut OsRng);
    let verifying_key = VerifyingKey::from(&signing_key);
    let public_key = verifying_key
        .to_public_key_der()
        .expect("DER-encode a freshly generated public key")
        .as_bytes()
        .to_vec();
    KeyMaterial {
        secret_key: signing_key.to_bytes().to_vec(),
        public_key,
    }
}

pub struct DefaultCryptoProvider;

impl DefaultCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for DefaultCryptoProvider {
    fn public_key_from_secret(&self, secret_key: &[u8]) -> EncodedPublicKey {
        let signing_key = SigningKey::from_slice(secret_key).expect("valid secp256k1 secret key");
        let verifying_key = VerifyingKey::from(&signing_key);
        verifying_key
            .to_public_key_der()
            .expect("DER-encode secp256k1 public key")
            .as_bytes()
            .to_vec()
    }

    fn address_from_public_key(&self, der_public_key: &[u8]) -> Address {
        let digest = Sha1::digest(der_public_key);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        out
    }

    /// `message` is already a SHA-256 digest (see
    /// `Transaction::signing_message`); this signs it directly rather than
    /// hashing it again, matching `ec.ECDSA(utils.Prehashed(hashes.SHA256()))`.
    fn sign_message(&self, secret_key: &[u8], message: &[u8]) -> Vec<u8> {
        let signing_key = SigningKey::from_slice(secret_key).expect("valid secp256k1 secret key");
        let signature: Signature = signing_key
            .sign_prehash(message)
            .expect("sign a 32-byte prehashed message");
        signature.to_der().as_bytes().to_vec()
    }

    fn verify_signature(&self, der_public_key: &[u8], message: &[u8], der_signature: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_public_key_der(der_public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(der_signature) else {
            return false;
        };
        verifying_key.verify_prehash(message, &signature).is_ok()
    }
}

/// Base58 text encoding of an address, for wallets and CLI display.
pub fn address_to_string(address: &Address) -> String {
    bs58::encode(address).into_string()
}

pub fn address_from_string(s: &str) -> Result<Address> {
    let bytes = bs58::decode(s).into_vec()?;
    if bytes.len() != 20 {
        return Err(anyhow!("invalid address length: expected 20 bytes, got {}", bytes.len()));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}
