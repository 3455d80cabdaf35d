//! Stage transition decisions
//!
//! Pure decision logic: given an artifact's ledger record (and, while still
//! at the Plaintext stage, its on-disk age), decide which transition is due.
//! Execution lives in the engine, dispatcher, and reaper.

use chrono::{DateTime, Utc};

use crate::artifact::Artifact;
use crate::config::{SyncConfig, Thresholds};
use crate::ledger::{LedgerEntry, Stage};

/// The transition due for an artifact this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Sign and layer-encrypt the plaintext
    Encrypt,
    /// Transfer the ciphertext to the destination
    Sync,
    /// Remove local copies
    Purge,
}

/// Decides, per artifact, whether a stage transition is due
pub struct StageAdvancer<'a> {
    thresholds: &'a Thresholds,
    sync: Option<&'a SyncConfig>,
}

impl<'a> StageAdvancer<'a> {
    /// Thresholds are assumed validated (floors checked at config load)
    pub fn new(thresholds: &'a Thresholds, sync: Option<&'a SyncConfig>) -> Self {
        Self { thresholds, sync }
    }

    /// Whether a plaintext artifact has aged past its type threshold
    ///
    /// The boundary is inclusive: an artifact exactly `delay_days` old is
    /// eligible, one day younger is not.
    pub fn encryption_due(&self, artifact: &Artifact, now: DateTime<Utc>) -> bool {
        artifact.age_days(now) >= self.thresholds.delay_days(artifact.kind)
    }

    /// Next pending transition, or None when the artifact should be skipped
    ///
    /// `artifact` is only consulted at the Plaintext stage; later stages are
    /// driven entirely by the ledger record. With no destination configured
    /// both Sync and Purge are disabled, never reported as errors.
    pub fn next_action(
        &self,
        entry: &LedgerEntry,
        artifact: Option<&Artifact>,
        now: DateTime<Utc>,
    ) -> Option<PendingAction> {
        match entry.stage {
            Stage::Plaintext => artifact
                .filter(|a| self.encryption_due(a, now))
                .map(|_| PendingAction::Encrypt),
            Stage::Encrypted => self.sync.map(|_| PendingAction::Sync),
            Stage::Synced => {
                let sync = self.sync?;
                let synced_at = entry.synced_at?;
                if (now - synced_at).num_days() >= sync.removal_delay_days {
                    Some(PendingAction::Purge)
                } else {
                    None
                }
            }
            Stage::Purged => None,
        }
    }
}
