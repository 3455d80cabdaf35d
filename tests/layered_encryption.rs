//! Layered-encryption recovery properties
//!
//! Ciphertexts produced by the engine with layers [[A, B], [C, D]] must only
//! be recoverable by peeling layers outermost-first, in strict reverse of the
//! encryption order, with any one key per layer sufficing. The in-memory key
//! store is the only backend that can decrypt, which is what makes these
//! properties checkable end to end.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tempfile::TempDir;

use coldstore::artifact::{Artifact, ArtifactKind};
use coldstore::config::{EncryptionConfig, KeystoreBackend, PlaintextDisposal};
use coldstore::engine::EncryptionEngine;
use coldstore::keystore::{KeyStore, KeyStoreError, MemoryKeyStore};

const PLAINTEXT: &[u8] = b"recorded session bytes";

fn two_layer_config(staging: &TempDir) -> EncryptionConfig {
    EncryptionConfig {
        staging_dir: staging.path().to_path_buf(),
        layers: vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
        ],
        signing_key: "signer".to_string(),
        passphrase: "pw".to_string(),
        plaintext_after_encrypt: PlaintextDisposal::Keep,
        keystore: KeystoreBackend::Memory,
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
    // A bystander key that is no layer's recipient
    store.add_key("bystander", &config.passphrase);
    store
}

/// Encrypt one artifact and return the installed ciphertext bytes
fn installed_ciphertext(
    store: &MemoryKeyStore,
    config: &EncryptionConfig,
) -> (Vec<u8>, Vec<u8>, TempDir) {
    let source = TempDir::new().unwrap();
    let path = source.path().join("s.ttyrec");
    fs::write(&path, PLAINTEXT).unwrap();
    let artifact = Artifact {
        path,
        kind: ArtifactKind::Ttyrec,
        modified_at: Utc::now(),
        size_bytes: PLAINTEXT.len() as u64,
    };

    let engine = EncryptionEngine::new(store, config);
    let encrypted = engine.encrypt_artifact(&artifact).unwrap();
    let ciphertext = fs::read(&encrypted.ciphertext_path).unwrap();
    let signature = fs::read(&encrypted.signature_path).unwrap();
    (ciphertext, signature, source)
}

#[test]
fn test_reverse_order_recovery_with_any_key_per_layer() {
    let staging = TempDir::new().unwrap();
    let config = two_layer_config(&staging);
    let store = keystore_for(&config);
    let (ciphertext, signature, _source) = installed_ciphertext(&store, &config);

    // The second configured layer is outermost; every key combination of
    // (outer, inner) recovers the plaintext
    for outer in ["c", "d"] {
        for inner in ["a", "b"] {
            let peeled = store.decrypt(&ciphertext, outer).unwrap();
            let recovered = store.decrypt(&peeled, inner).unwrap();
            assert_eq!(recovered, PLAINTEXT);
        }
    }

    // And the recovered plaintext matches the detached signature
    let recovered = store
        .decrypt(&store.decrypt(&ciphertext, "c").unwrap(), "a")
        .unwrap();
    assert!(store.verify(&recovered, &signature, "signer").unwrap());
}

#[test]
fn test_inner_key_cannot_open_the_outer_layer() {
    let staging = TempDir::new().unwrap();
    let config = two_layer_config(&staging);
    let store = keystore_for(&config);
    let (ciphertext, _, _source) = installed_ciphertext(&store, &config);

    // "a" belongs to the inner layer only; applied first it must fail
    assert!(matches!(
        store.decrypt(&ciphertext, "a"),
        Err(KeyStoreError::KeyNotFound(_))
    ));
}

#[test]
fn test_missing_layer_key_blocks_recovery() {
    let staging = TempDir::new().unwrap();
    let config = two_layer_config(&staging);
    let store = keystore_for(&config);
    let (ciphertext, _, _source) = installed_ciphertext(&store, &config);

    // Outer layer peels, but without any inner-layer key the plaintext is
    // unreachable
    let peeled = store.decrypt(&ciphertext, "d").unwrap();
    assert!(store.decrypt(&peeled, "c").is_err());
    assert!(store.decrypt(&peeled, "bystander").is_err());
}

#[test]
fn test_single_layer_round_trip() {
    let staging = TempDir::new().unwrap();
    let mut config = two_layer_config(&staging);
    config.layers = vec![vec!["a".to_string()]];
    let store = keystore_for(&config);
    let (ciphertext, _, _source) = installed_ciphertext(&store, &config);

    assert_eq!(store.decrypt(&ciphertext, "a").unwrap(), PLAINTEXT);
    assert!(store.decrypt(&ciphertext, "bystander").is_err());
}

#[test]
fn test_each_layer_changes_the_ciphertext() {
    let staging = TempDir::new().unwrap();
    let config = two_layer_config(&staging);
    let store = keystore_for(&config);
    let (ciphertext, _, _source) = installed_ciphertext(&store, &config);

    // Peeling one layer must not already expose the plaintext
    let peeled = store.decrypt(&ciphertext, "c").unwrap();
    assert_ne!(peeled, PLAINTEXT);
    assert_ne!(ciphertext, peeled);
}
