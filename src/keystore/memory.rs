//! In-process key store
//!
//! Self-contained backend for tests and dry runs: Ed25519 detached
//! signatures, and hybrid recipient envelopes (a random ChaCha20-Poly1305
//! data key, wrapped once per recipient). Unlike the gpg backend it can also
//! decrypt, which lets the layered-encryption properties be exercised end to
//! end without external key material.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{KeyStore, KeyStoreError, KeyStoreResult};
use crate::config::EncryptionConfig;

const NONCE_LEN: usize = 12;

struct MemoryKey {
    signing: SigningKey,
    secret: [u8; 32],
    passphrase: String,
}

/// Key store holding generated keys in memory
pub struct MemoryKeyStore {
    keys: BTreeMap<String, MemoryKey>,
}

/// One recipient's wrapped copy of the data key
#[derive(Debug, Serialize, Deserialize)]
struct WrappedKey {
    key_id: String,
    nonce: String,
    wrapped: String,
}

/// Serialized ciphertext envelope for one encryption layer
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u32,
    recipients: Vec<WrappedKey>,
    nonce: String,
    ciphertext: String,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self {
            keys: BTreeMap::new(),
        }
    }

    /// Generate and register a key under `key_id`
    pub fn add_key(&mut self, key_id: &str, passphrase: &str) {
        let mut rng = rand::thread_rng();
        let signing = SigningKey::generate(&mut rng);
        let mut secret = [0u8; 32];
        rng.fill_bytes(&mut secret);
        self.keys.insert(
            key_id.to_string(),
            MemoryKey {
                signing,
                secret,
                passphrase: passphrase.to_string(),
            },
        );
    }

    /// Seed keys for every id the encryption config names
    ///
    /// Keys are freshly generated per process; this backend never persists
    /// key material and is unsuitable outside tests and config dry runs.
    pub fn from_encryption_config(config: &EncryptionConfig) -> Self {
        let mut store = Self::new();
        store.add_key(&config.signing_key, &config.passphrase);
        for key_id in config.recipient_ids() {
            if !store.keys.contains_key(key_id) {
                store.add_key(key_id, &config.passphrase);
            }
        }
        store
    }

    /// Decrypt one envelope layer with the named recipient key
    pub fn decrypt(&self, data: &[u8], key_id: &str) -> KeyStoreResult<Vec<u8>> {
        let envelope: Envelope = serde_json::from_slice(data)
            .map_err(|e| KeyStoreError::Backend(format!("not an envelope: {}", e)))?;

        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| KeyStoreError::KeyNotFound(key_id.to_string()))?;

        let wrapped = envelope
            .recipients
            .iter()
            .find(|w| w.key_id == key_id)
            .ok_or_else(|| KeyStoreError::KeyNotFound(key_id.to_string()))?;

        let wrap_nonce = decode(&wrapped.nonce)?;
        let wrapped_key = decode(&wrapped.wrapped)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.secret));
        let data_key = cipher
            .decrypt(Nonce::from_slice(&wrap_nonce), wrapped_key.as_slice())
            .map_err(|_| KeyStoreError::Backend("data key unwrap failed".to_string()))?;

        let nonce = decode(&envelope.nonce)?;
        let ciphertext = decode(&envelope.ciphertext)?;
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&data_key));
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| KeyStoreError::Backend("payload decryption failed".to_string()))
    }

    fn key(&self, key_id: &str) -> KeyStoreResult<&MemoryKey> {
        self.keys
            .get(key_id)
            .ok_or_else(|| KeyStoreError::KeyNotFound(key_id.to_string()))
    }
}

impl Default for MemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for MemoryKeyStore {
    fn resolve(&self, key_id: &str) -> KeyStoreResult<()> {
        self.key(key_id).map(|_| ())
    }

    fn sign(&self, data: &[u8], key_id: &str, passphrase: &str) -> KeyStoreResult<Vec<u8>> {
        let key = self.key(key_id)?;
        if key.passphrase != passphrase {
            return Err(KeyStoreError::PassphraseInvalid(key_id.to_string()));
        }
        Ok(key.signing.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, data: &[u8], signature: &[u8], key_id: &str) -> KeyStoreResult<bool> {
        let key = self.key(key_id)?;
        let signature = match Signature::from_slice(signature) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };
        Ok(key
            .signing
            .verifying_key()
            .verify(data, &signature)
            .is_ok())
    }

    fn encrypt(&self, data: &[u8], recipients: &[String]) -> KeyStoreResult<Vec<u8>> {
        if recipients.is_empty() {
            return Err(KeyStoreError::NoRecipients);
        }

        let mut rng = rand::thread_rng();
        let mut data_key = [0u8; 32];
        rng.fill_bytes(&mut data_key);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&data_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), data)
            .map_err(|_| KeyStoreError::Backend("payload encryption failed".to_string()))?;

        let mut wrapped_keys = Vec::with_capacity(recipients.len());
        for key_id in recipients {
            let key = self.key(key_id)?;
            let mut wrap_nonce = [0u8; NONCE_LEN];
            rng.fill_bytes(&mut wrap_nonce);
            let cipher = ChaCha20Poly1305::new(Key::from_slice(&key.secret));
            let wrapped = cipher
                .encrypt(Nonce::from_slice(&wrap_nonce), data_key.as_slice())
                .map_err(|_| KeyStoreError::Backend("data key wrap failed".to_string()))?;
            wrapped_keys.push(WrappedKey {
                key_id: key_id.clone(),
                nonce: BASE64.encode(wrap_nonce),
                wrapped: BASE64.encode(wrapped),
            });
        }

        let envelope = Envelope {
            v: 1,
            recipients: wrapped_keys,
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        };
        serde_json::to_vec(&envelope)
            .map_err(|e| KeyStoreError::Backend(format!("envelope serialization: {}", e)))
    }
}

fn decode(text: &str) -> KeyStoreResult<Vec<u8>> {
    BASE64
        .decode(text)
        .map_err(|e| KeyStoreError::Backend(format!("envelope base64: {}", e)))
}
