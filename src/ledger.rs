//! Persisted per-artifact stage ledger
//!
//! Stage transitions are strictly monotonic:
//! PLAINTEXT → ENCRYPTED → SYNCED → PURGED.
//!
//! The ledger is the source of truth for stage decisions. It is keyed by the
//! artifact's source path and decoupled from filesystem mtimes, so touching or
//! rewriting a file never re-enters an earlier stage. Writes are atomic
//! (temp file then rename) and a ledger update commits only after the
//! corresponding artifact write has been durably renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactKind;

/// Schema version for the ledger file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "coldstore/ledger@1";

/// Artifact lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// On local disk, not yet encrypted
    Plaintext,
    /// Signed and fully layer-encrypted, ciphertext installed
    Encrypted,
    /// Ciphertext transferred to the configured destination
    Synced,
    /// Local copies removed after confirmed durability
    Purged,
}

impl Stage {
    /// Check if a transition from this stage to the target is valid
    ///
    /// Only single forward steps are permitted; stages are never skipped,
    /// reordered, or revisited.
    pub fn can_transition_to(&self, target: Stage) -> bool {
        matches!(
            (self, target),
            (Stage::Plaintext, Stage::Encrypted)
                | (Stage::Encrypted, Stage::Synced)
                | (Stage::Synced, Stage::Purged)
        )
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Purged)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Plaintext => "PLAINTEXT",
            Stage::Encrypted => "ENCRYPTED",
            Stage::Synced => "SYNCED",
            Stage::Purged => "PURGED",
        };
        write!(f, "{}", s)
    }
}

/// Ledger record for a single artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Artifact type at first sight
    pub kind: ArtifactKind,

    /// Current stage
    pub stage: Stage,

    /// When the ciphertext was installed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_at: Option<DateTime<Utc>>,

    /// When the transport reported success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,

    /// When local copies were removed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purged_at: Option<DateTime<Utc>>,

    /// Installed ciphertext path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciphertext_path: Option<PathBuf>,

    /// Detached signature path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_path: Option<PathBuf>,

    /// SHA-256 of the installed ciphertext (hex)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ciphertext_sha256: Option<String>,
}

impl LedgerEntry {
    /// New entry at the Plaintext stage
    pub fn new(kind: ArtifactKind) -> Self {
        Self {
            kind,
            stage: Stage::Plaintext,
            encrypted_at: None,
            synced_at: None,
            purged_at: None,
            ciphertext_path: None,
            signature_path: None,
            ciphertext_sha256: None,
        }
    }
}

/// Errors for ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid stage transition for {path}: {from} -> {to}")]
    InvalidTransition {
        path: String,
        from: Stage,
        to: Stage,
    },

    #[error("I/O error on ledger {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger {path} is malformed: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk ledger file shape
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    schema_version: u32,
    schema_id: String,
    entries: BTreeMap<String, LedgerEntry>,
}

/// Persisted map from artifact path to its stage record
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    /// Open the ledger at `path`; a missing file yields an empty ledger
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let entries = match fs::read_to_string(path) {
            Ok(json) => {
                let file: LedgerFile =
                    serde_json::from_str(&json).map_err(|source| LedgerError::Malformed {
                        path: path.to_path_buf(),
                        source,
                    })?;
                file.entries
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Look up the entry for an artifact path
    pub fn get(&self, artifact_path: &Path) -> Option<&LedgerEntry> {
        self.entries.get(&key_for(artifact_path))
    }

    /// Current stage for an artifact path; unknown paths are Plaintext
    pub fn stage_of(&self, artifact_path: &Path) -> Stage {
        self.get(artifact_path)
            .map(|e| e.stage)
            .unwrap_or(Stage::Plaintext)
    }

    /// Advance an artifact to `target`, recording the stage timestamp
    ///
    /// Creates the entry at Plaintext if the path is unknown. Returns a
    /// mutable reference so the caller can attach stage detail (ciphertext
    /// path, digest) before saving.
    pub fn advance(
        &mut self,
        artifact_path: &Path,
        kind: ArtifactKind,
        target: Stage,
        at: DateTime<Utc>,
    ) -> Result<&mut LedgerEntry, LedgerError> {
        let key = key_for(artifact_path);
        // Reject before inserting, so a refused transition on an unknown
        // path leaves no stray entry behind for a later save to persist
        let from = self
            .entries
            .get(&key)
            .map(|e| e.stage)
            .unwrap_or(Stage::Plaintext);
        if !from.can_transition_to(target) {
            return Err(LedgerError::InvalidTransition {
                path: key,
                from,
                to: target,
            });
        }

        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| LedgerEntry::new(kind));

        entry.stage = target;
        match target {
            Stage::Plaintext => {}
            Stage::Encrypted => entry.encrypted_at = Some(at),
            Stage::Synced => entry.synced_at = Some(at),
            Stage::Purged => entry.purged_at = Some(at),
        }

        Ok(entry)
    }

    /// Write the ledger atomically (temp file, then rename)
    pub fn save(&self) -> Result<(), LedgerError> {
        let file = LedgerFile {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| LedgerError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        let io_err = |source| LedgerError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &json).map_err(io_err)?;
        fs::rename(&temp_path, &self.path).map_err(io_err)?;

        Ok(())
    }

    /// Iterate over all entries
    pub fn entries(&self) -> impl Iterator<Item = (&str, &LedgerEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of tracked artifacts
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger tracks no artifacts
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Non-purged entries whose recorded files no longer exist on disk
    ///
    /// A renamed or externally deleted artifact leaves its entry behind;
    /// these are reported for operator attention, never silently dropped.
    pub fn orphaned(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(path, entry)| {
                if entry.stage.is_terminal() {
                    return false;
                }
                let plaintext_present = Path::new(path).exists();
                let ciphertext_present = entry
                    .ciphertext_path
                    .as_deref()
                    .map(Path::exists)
                    .unwrap_or(false);
                !plaintext_present && !ciphertext_present
            })
            .map(|(path, _)| path.as_str())
            .collect()
    }
}

fn key_for(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_stage_order_is_monotonic() {
        assert!(Stage::Plaintext.can_transition_to(Stage::Encrypted));
        assert!(Stage::Encrypted.can_transition_to(Stage::Synced));
        assert!(Stage::Synced.can_transition_to(Stage::Purged));

        // No skips, no reordering, no re-entry
        assert!(!Stage::Plaintext.can_transition_to(Stage::Synced));
        assert!(!Stage::Plaintext.can_transition_to(Stage::Purged));
        assert!(!Stage::Encrypted.can_transition_to(Stage::Plaintext));
        assert!(!Stage::Encrypted.can_transition_to(Stage::Encrypted));
        assert!(!Stage::Synced.can_transition_to(Stage::Encrypted));
        assert!(!Stage::Purged.can_transition_to(Stage::Plaintext));
    }

    #[test]
    fn test_missing_file_is_empty_ledger() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::open(&dir.path().join("ledger.json")).unwrap();
        assert!(ledger.is_empty());
        assert_eq!(
            ledger.stage_of(Path::new("/var/a.ttyrec")),
            Stage::Plaintext
        );
    }

    #[test]
    fn test_advance_records_timestamps() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("ledger.json")).unwrap();
        let path = Path::new("/var/a.ttyrec");
        let now = Utc::now();

        let entry = ledger
            .advance(path, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .unwrap();
        assert_eq!(entry.stage, Stage::Encrypted);
        assert_eq!(entry.encrypted_at, Some(now));
        assert!(entry.synced_at.is_none());

        ledger
            .advance(path, ArtifactKind::Ttyrec, Stage::Synced, now)
            .unwrap();
        assert_eq!(ledger.stage_of(path), Stage::Synced);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("ledger.json")).unwrap();
        let path = Path::new("/var/a.ttyrec");
        let now = Utc::now();

        // Plaintext cannot jump to Synced, and the rejection must not
        // leave a stray entry behind
        let err = ledger
            .advance(path, ArtifactKind::Ttyrec, Stage::Synced, now)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTransition { .. }));
        assert!(ledger.is_empty());
        assert!(ledger.get(path).is_none());

        // Once Encrypted, encrypting again is refused
        ledger
            .advance(path, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .unwrap();
        assert!(ledger
            .advance(path, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("state/ledger.json");
        let artifact = Path::new("/var/a.ttyrec");
        let now = Utc::now();

        let mut ledger = Ledger::open(&ledger_path).unwrap();
        let entry = ledger
            .advance(artifact, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .unwrap();
        entry.ciphertext_sha256 = Some("ab".repeat(32));
        ledger.save().unwrap();

        let reloaded = Ledger::open(&ledger_path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.stage_of(artifact), Stage::Encrypted);
        assert_eq!(
            reloaded.get(artifact).unwrap().ciphertext_sha256,
            Some("ab".repeat(32))
        );
    }

    #[test]
    fn test_malformed_ledger_is_an_error() {
        let dir = TempDir::new().unwrap();
        let ledger_path = dir.path().join("ledger.json");
        fs::write(&ledger_path, "{not json").unwrap();

        let err = Ledger::open(&ledger_path).unwrap_err();
        assert!(matches!(err, LedgerError::Malformed { .. }));
    }

    #[test]
    fn test_orphaned_reports_missing_files() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::open(&dir.path().join("ledger.json")).unwrap();
        let now = Utc::now();

        let gone = dir.path().join("gone.ttyrec");
        ledger
            .advance(&gone, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .unwrap();

        let present = dir.path().join("present.ttyrec");
        fs::write(&present, b"data").unwrap();
        ledger
            .advance(&present, ArtifactKind::Ttyrec, Stage::Encrypted, now)
            .unwrap();

        let orphans = ledger.orphaned();
        assert_eq!(orphans.len(), 1);
        assert!(orphans[0].ends_with("gone.ttyrec"));
    }
}
