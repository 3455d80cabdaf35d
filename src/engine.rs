//! Signing and multi-layer encryption
//!
//! For each eligible artifact the engine computes a detached signature over
//! the plaintext, then folds the plaintext through the configured recipient
//! layers in list order, each layer wrapping the previous ciphertext. The
//! final result is built in a staging temp file and atomically renamed into
//! place; a failure at any layer leaves nothing visible to later stages.
//!
//! The engine never touches the ledger or the plaintext's lifetime: the
//! pipeline commits the ledger after the rename and then applies the
//! configured plaintext disposal policy.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::artifact::Artifact;
use crate::config::EncryptionConfig;
use crate::keystore::{KeyStore, KeyStoreError};

/// Suffix appended to the artifact file name for the installed ciphertext
pub const CIPHERTEXT_SUFFIX: &str = "enc";

/// Suffix appended for the detached signature
pub const SIGNATURE_SUFFIX: &str = "sig";

/// Encryption failures; all recoverable per artifact
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("key store error: {0}")]
    Key(#[from] KeyStoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot install ciphertext at {path}: {detail}")]
    Install { path: PathBuf, detail: String },

    #[error("artifact has no usable file name: {0}")]
    BadFileName(PathBuf),
}

/// Result of a successful encryption
#[derive(Debug, Clone)]
pub struct EncryptedArtifact {
    /// Installed ciphertext path
    pub ciphertext_path: PathBuf,

    /// Detached signature path
    pub signature_path: PathBuf,

    /// SHA-256 over the installed ciphertext (hex)
    pub ciphertext_sha256: String,

    /// Ciphertext size in bytes
    pub size_bytes: u64,
}

/// Produces signed, layer-encrypted artifacts
pub struct EncryptionEngine<'a> {
    keystore: &'a dyn KeyStore,
    config: &'a EncryptionConfig,
}

impl<'a> EncryptionEngine<'a> {
    pub fn new(keystore: &'a dyn KeyStore, config: &'a EncryptionConfig) -> Self {
        Self { keystore, config }
    }

    /// Sign and encrypt one artifact into the staging directory
    ///
    /// Signing happens first and over the plaintext; a signing failure aborts
    /// this artifact before any layer runs. The signature is installed before
    /// the ciphertext so the ciphertext rename is the single commit point: a
    /// stray signature without ciphertext is orphaned staging output that a
    /// later run simply overwrites.
    pub fn encrypt_artifact(&self, artifact: &Artifact) -> Result<EncryptedArtifact, EngineError> {
        let file_name = artifact
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| EngineError::BadFileName(artifact.path.clone()))?;

        let plaintext = fs::read(&artifact.path)?;

        let signature =
            self.keystore
                .sign(&plaintext, &self.config.signing_key, &self.config.passphrase)?;

        let mut data = plaintext;
        for (index, layer) in self.config.layers.iter().enumerate() {
            data = self.keystore.encrypt(&data, layer)?;
            debug!(
                artifact = %artifact.path.display(),
                layer = index,
                recipients = layer.len(),
                "applied encryption layer"
            );
        }

        fs::create_dir_all(&self.config.staging_dir)?;
        let ciphertext_path = self
            .config
            .staging_dir
            .join(format!("{}.{}", file_name, CIPHERTEXT_SUFFIX));
        let signature_path = self
            .config
            .staging_dir
            .join(format!("{}.{}", file_name, SIGNATURE_SUFFIX));

        self.install(&signature, &signature_path)?;
        let size_bytes = data.len() as u64;
        let ciphertext_sha256 = sha256_hex(&data);
        self.install(&data, &ciphertext_path)?;

        Ok(EncryptedArtifact {
            ciphertext_path,
            signature_path,
            ciphertext_sha256,
            size_bytes,
        })
    }

    /// Write bytes to a staging temp file, then atomically rename into place
    fn install(&self, bytes: &[u8], dest: &Path) -> Result<(), EngineError> {
        let mut temp = NamedTempFile::new_in(&self.config.staging_dir)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.persist(dest).map_err(|e| EngineError::Install {
            path: dest.to_path_buf(),
            detail: e.error.to_string(),
        })?;
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::config::PlaintextDisposal;
    use crate::keystore::MemoryKeyStore;
    use chrono::Utc;
    use tempfile::TempDir;

    fn encryption_config(staging: &Path, layers: Vec<Vec<String>>) -> EncryptionConfig {
        EncryptionConfig {
            staging_dir: staging.to_path_buf(),
            layers,
            signing_key: "signer".to_string(),
            passphrase: "pw".to_string(),
            plaintext_after_encrypt: PlaintextDisposal::Remove,
            keystore: crate::config::KeystoreBackend::Memory,
            gpg_binary: PathBuf::from("gpg"),
            gpg_home: None,
        }
    }

    fn keystore_for(config: &EncryptionConfig) -> MemoryKeyStore {
        let mut store = MemoryKeyStore::new();
        store.add_key(&config.signing_key, &config.passphrase);
        for id in config.recipient_ids() {
            store.add_key(id, &config.passphrase);
        }
        store
    }

    fn sample_artifact(dir: &TempDir, name: &str, contents: &[u8]) -> Artifact {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        Artifact {
            path,
            kind: ArtifactKind::Ttyrec,
            modified_at: Utc::now(),
            size_bytes: contents.len() as u64,
        }
    }

    #[test]
    fn test_encrypt_installs_ciphertext_and_signature() {
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let config = encryption_config(
            staging.path(),
            vec![vec!["a".to_string()], vec!["b".to_string()]],
        );
        let keystore = keystore_for(&config);
        let engine = EncryptionEngine::new(&keystore, &config);

        let artifact = sample_artifact(&source, "s.ttyrec", b"session bytes");
        let result = engine.encrypt_artifact(&artifact).unwrap();

        assert!(result.ciphertext_path.ends_with("s.ttyrec.enc"));
        assert!(result.signature_path.ends_with("s.ttyrec.sig"));
        assert!(result.ciphertext_path.exists());
        assert!(result.signature_path.exists());

        let installed = fs::read(&result.ciphertext_path).unwrap();
        assert_eq!(sha256_hex(&installed), result.ciphertext_sha256);
        assert_eq!(installed.len() as u64, result.size_bytes);

        // Signature covers the plaintext, not the ciphertext
        let sig = fs::read(&result.signature_path).unwrap();
        assert!(keystore.verify(b"session bytes", &sig, "signer").unwrap());
        assert!(!keystore.verify(&installed, &sig, "signer").unwrap());

        // The engine never disposes of the plaintext itself
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_signing_failure_produces_no_output() {
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let mut config = encryption_config(staging.path(), vec![vec!["a".to_string()]]);
        config.passphrase = "wrong".to_string();

        let mut keystore = MemoryKeyStore::new();
        keystore.add_key("signer", "pw");
        keystore.add_key("a", "pw");
        let engine = EncryptionEngine::new(&keystore, &config);

        let artifact = sample_artifact(&source, "s.ttyrec", b"bytes");
        assert!(matches!(
            engine.encrypt_artifact(&artifact),
            Err(EngineError::Key(KeyStoreError::PassphraseInvalid(_)))
        ));

        // No partial output visible in staging
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_layer_failure_leaves_no_partial_ciphertext() {
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let config = encryption_config(
            staging.path(),
            vec![vec!["a".to_string()], vec!["unknown".to_string()]],
        );

        let mut keystore = MemoryKeyStore::new();
        keystore.add_key("signer", "pw");
        keystore.add_key("a", "pw");
        let engine = EncryptionEngine::new(&keystore, &config);

        let artifact = sample_artifact(&source, "s.ttyrec", b"bytes");
        assert!(matches!(
            engine.encrypt_artifact(&artifact),
            Err(EngineError::Key(KeyStoreError::KeyNotFound(_)))
        ));
        assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
        assert!(artifact.path.exists());
    }

    #[test]
    fn test_reencryption_overwrites_previous_output() {
        // A run killed between ciphertext install and ledger commit retries
        // wholesale on the next run; the install must replace, not fail.
        let source = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();
        let config = encryption_config(staging.path(), vec![vec!["a".to_string()]]);
        let keystore = keystore_for(&config);
        let engine = EncryptionEngine::new(&keystore, &config);

        let artifact = sample_artifact(&source, "s.ttyrec", b"bytes");
        let first = engine.encrypt_artifact(&artifact).unwrap();
        let second = engine.encrypt_artifact(&artifact).unwrap();
        assert_eq!(first.ciphertext_path, second.ciphertext_path);
        assert!(second.ciphertext_path.exists());
    }
}
