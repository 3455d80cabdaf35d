//! Local purge after confirmed durability
//!
//! Removes local copies (ciphertext, detached signature, and any retained
//! plaintext) once an artifact has been Synced and the removal delay has
//! elapsed. Purging is gated strictly on a configured destination: a
//! pipeline without one never deletes anything, regardless of elapsed time.
//! Already-missing files are skipped, so purging is idempotent.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use crate::ledger::LedgerEntry;

/// Files removed and bytes reclaimed by one purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeOutcome {
    pub files_removed: usize,
    pub bytes_reclaimed: u64,
}

/// Removes local copies of synced artifacts
pub struct RetentionReaper {
    enabled: bool,
}

impl RetentionReaper {
    /// `enabled` must only be true when a destination is configured
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Remove the local files recorded for one artifact
    ///
    /// The eligibility decision (Synced + removal delay elapsed) belongs to
    /// the stage advancer; this only executes the deletion. Returns Ok(None)
    /// when purging is disabled.
    pub fn purge(
        &self,
        artifact_path: &str,
        entry: &LedgerEntry,
    ) -> io::Result<Option<PurgeOutcome>> {
        if !self.enabled {
            return Ok(None);
        }

        let mut outcome = PurgeOutcome::default();

        for path in [
            entry.ciphertext_path.as_deref(),
            entry.signature_path.as_deref(),
            // Plaintext retained under the `keep` disposal policy
            Some(Path::new(artifact_path)),
        ]
        .into_iter()
        .flatten()
        {
            match fs::metadata(path) {
                Ok(meta) => {
                    fs::remove_file(path)?;
                    outcome.files_removed += 1;
                    outcome.bytes_reclaimed += meta.len();
                    debug!(path = %path.display(), "removed local copy");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use crate::ledger::Stage;
    use tempfile::TempDir;

    fn synced_entry(dir: &TempDir) -> (String, LedgerEntry) {
        let plaintext = dir.path().join("a.ttyrec");
        let ciphertext = dir.path().join("a.ttyrec.enc");
        let signature = dir.path().join("a.ttyrec.sig");
        fs::write(&plaintext, b"plain").unwrap();
        fs::write(&ciphertext, b"ct").unwrap();
        fs::write(&signature, b"sig").unwrap();

        let mut entry = LedgerEntry::new(ArtifactKind::Ttyrec);
        entry.stage = Stage::Synced;
        entry.ciphertext_path = Some(ciphertext);
        entry.signature_path = Some(signature);
        (plaintext.to_string_lossy().into_owned(), entry)
    }

    #[test]
    fn test_purge_removes_all_local_copies() {
        let dir = TempDir::new().unwrap();
        let (path, entry) = synced_entry(&dir);

        let reaper = RetentionReaper::new(true);
        let outcome = reaper.purge(&path, &entry).unwrap().unwrap();
        assert_eq!(outcome.files_removed, 3);
        assert_eq!(outcome.bytes_reclaimed, 10);

        assert!(!Path::new(&path).exists());
        assert!(!entry.ciphertext_path.as_ref().unwrap().exists());
        assert!(!entry.signature_path.as_ref().unwrap().exists());
    }

    #[test]
    fn test_purge_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let (path, entry) = synced_entry(&dir);

        let reaper = RetentionReaper::new(true);
        reaper.purge(&path, &entry).unwrap();
        let second = reaper.purge(&path, &entry).unwrap().unwrap();
        assert_eq!(second, PurgeOutcome::default());
    }

    #[test]
    fn test_disabled_reaper_never_deletes() {
        let dir = TempDir::new().unwrap();
        let (path, entry) = synced_entry(&dir);

        let reaper = RetentionReaper::new(false);
        assert!(reaper.purge(&path, &entry).unwrap().is_none());
        assert!(Path::new(&path).exists());
        assert!(entry.ciphertext_path.as_ref().unwrap().exists());
    }
}
