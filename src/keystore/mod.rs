//! Key-store collaborator
//!
//! The pipeline treats key material as external capability: it can resolve a
//! key id, produce a detached signature, verify one, and encrypt a byte
//! buffer to a set of recipient key ids. Two backends exist: `gpg` spawns the
//! gpg binary, `memory` keeps self-contained in-process keys for tests and
//! dry runs (and is the only backend that can also decrypt, which the
//! layered-encryption tests rely on).

mod gpg;
mod memory;

pub use gpg::GpgKeyStore;
pub use memory::MemoryKeyStore;

use std::io;

use thiserror::Error;

use crate::config::{EncryptionConfig, KeystoreBackend};

/// Key-store failures
///
/// KeyNotFound and PassphraseInvalid are recoverable per artifact: the
/// artifact stays in its current stage and is retried on a later run.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid passphrase for key {0}")]
    PassphraseInvalid(String),

    #[error("no recipients supplied for encryption")]
    NoRecipients,

    #[error("keystore backend failure: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for key-store operations
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// External key-store capability
pub trait KeyStore {
    /// Check that a key id resolves to a usable key
    fn resolve(&self, key_id: &str) -> KeyStoreResult<()>;

    /// Detached signature over `data` with the given key and passphrase
    fn sign(&self, data: &[u8], key_id: &str, passphrase: &str) -> KeyStoreResult<Vec<u8>>;

    /// Verify a detached signature; Ok(false) means a well-formed but
    /// non-matching signature
    fn verify(&self, data: &[u8], signature: &[u8], key_id: &str) -> KeyStoreResult<bool>;

    /// Encrypt `data` so that any one of `recipients` can decrypt it
    fn encrypt(&self, data: &[u8], recipients: &[String]) -> KeyStoreResult<Vec<u8>>;
}

/// Build the key store selected by the configuration
pub fn from_config(config: &EncryptionConfig) -> Box<dyn KeyStore> {
    match config.keystore {
        KeystoreBackend::Gpg => Box::new(GpgKeyStore::new(
            config.gpg_binary.clone(),
            config.gpg_home.clone(),
        )),
        KeystoreBackend::Memory => Box::new(MemoryKeyStore::from_encryption_config(config)),
    }
}
