//! Run orchestration
//!
//! One coordinating batch run per invocation: acquire the exclusive run lock,
//! open the ledger, scan the source roots, and walk each artifact through as
//! many due transitions as this run allows. Every transition commits (artifact
//! rename, then ledger write) before the next begins, so termination at any
//! point leaves every artifact in a valid prior stage.
//!
//! Artifacts that already left the Plaintext stage may no longer exist on
//! disk; they are driven from the ledger alone in a second phase.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::advancer::{PendingAction, StageAdvancer};
use crate::artifact::Artifact;
use crate::config::{Config, PlaintextDisposal};
use crate::engine::EncryptionEngine;
use crate::error::{PipelineError, PipelineResult};
use crate::keystore::{self, KeyStore};
use crate::ledger::{Ledger, LedgerEntry, Stage};
use crate::lock::RunLock;
use crate::reaper::RetentionReaper;
use crate::scanner::Scanner;
use crate::signal::CancelFlag;
use crate::summary::RunSummary;
use crate::sync::SyncDispatcher;
use crate::transport::{CommandTransport, Transport};
use crate::validator::{ConfigValidator, ValidationReport};

/// A configured pipeline, ready to run
pub struct Pipeline {
    config: Config,
    keystore: Box<dyn KeyStore>,
    transport: Option<Box<dyn Transport>>,
    cancel: CancelFlag,
    reference_time: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Build a pipeline from validated configuration
    pub fn new(config: Config) -> Self {
        let keystore = keystore::from_config(&config.encryption);
        let transport = config
            .sync
            .as_ref()
            .map(|sync| Box::new(CommandTransport::new(sync)) as Box<dyn Transport>);
        Self {
            config,
            keystore,
            transport,
            cancel: CancelFlag::new(),
            reference_time: None,
        }
    }

    /// Use an externally installed cancellation flag
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the key store built from configuration
    pub fn with_keystore(mut self, keystore: Box<dyn KeyStore>) -> Self {
        self.keystore = keystore;
        self
    }

    /// Evaluate all age decisions against a fixed instant instead of wall
    /// clock time
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Dry-run validation of keys, staging, and destination
    pub fn validate(&self) -> ValidationReport {
        ConfigValidator::new(&self.config, self.keystore.as_ref(), self.transport.as_deref())
            .validate()
    }

    /// Execute one batch run
    ///
    /// Fatal errors (lock, ledger, configuration) abort with Err; recoverable
    /// per-artifact failures are recorded in the returned summary and the run
    /// continues with the next artifact.
    pub fn run(&self) -> PipelineResult<RunSummary> {
        let _lock = RunLock::acquire(&self.config.lock.path)?;
        let mut ledger = Ledger::open(&self.config.ledger.path)?;
        let mut summary = RunSummary::new();
        let now = self.reference_time.unwrap_or_else(Utc::now);

        let scanner = Scanner::new(&self.config.sources)?;
        let (artifacts, scan_failures) = scanner.scan_all();
        summary.scanned = artifacts.len();
        for failure in scan_failures {
            error!(error = %failure, "source root scan failed");
            summary.record_failure("<scan>", Stage::Plaintext, &failure);
        }

        let advancer = StageAdvancer::new(&self.config.thresholds, self.config.sync.as_ref());
        let engine = EncryptionEngine::new(self.keystore.as_ref(), &self.config.encryption);
        let dispatcher = SyncDispatcher::new(self.transport.as_deref());
        let reaper = RetentionReaper::new(self.config.sync.is_some());

        let mut visited = BTreeSet::new();

        // Phase 1: artifacts visible on disk
        for artifact in &artifacts {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            visited.insert(artifact.path.to_string_lossy().into_owned());
            self.process(
                &artifact.path,
                Some(artifact),
                &mut ledger,
                &advancer,
                &engine,
                &dispatcher,
                &reaper,
                now,
                &mut summary,
            )?;
        }

        // Phase 2: ledger entries whose plaintext is gone (disposed after
        // encryption, or removed externally) still advance toward Purged
        let pending: Vec<(String, LedgerEntry)> = ledger
            .entries()
            .filter(|(path, entry)| !visited.contains(*path) && !entry.stage.is_terminal())
            .map(|(path, entry)| (path.to_string(), entry.clone()))
            .collect();
        for (path, _) in pending {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            self.process(
                Path::new(&path),
                None,
                &mut ledger,
                &advancer,
                &engine,
                &dispatcher,
                &reaper,
                now,
                &mut summary,
            )?;
        }

        for orphan in ledger.orphaned() {
            warn!(artifact = orphan, "ledger entry has no file on disk");
        }

        summary.finish();
        info!(%summary, "run complete");
        Ok(summary)
    }

    /// Advance one artifact through every transition due this run
    ///
    /// Returns Err only for fatal ledger failures; everything else is
    /// recorded against the artifact and processing moves on.
    #[allow(clippy::too_many_arguments)]
    fn process(
        &self,
        path: &Path,
        artifact: Option<&Artifact>,
        ledger: &mut Ledger,
        advancer: &StageAdvancer<'_>,
        engine: &EncryptionEngine<'_>,
        dispatcher: &SyncDispatcher<'_>,
        reaper: &RetentionReaper,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let path_key = path.to_string_lossy().into_owned();
        let mut advanced = false;

        loop {
            let entry = match ledger.get(path) {
                Some(entry) => entry.clone(),
                None => match artifact {
                    Some(a) => LedgerEntry::new(a.kind),
                    None => return Ok(()),
                },
            };
            let kind = entry.kind;

            let action = match advancer.next_action(&entry, artifact, now) {
                Some(action) => action,
                None => break,
            };

            match action {
                PendingAction::Encrypt => {
                    let artifact = match artifact {
                        Some(a) => a,
                        None => break,
                    };
                    match engine.encrypt_artifact(artifact) {
                        Ok(encrypted) => {
                            let record = ledger.advance(path, kind, Stage::Encrypted, now)?;
                            record.ciphertext_path = Some(encrypted.ciphertext_path);
                            record.signature_path = Some(encrypted.signature_path);
                            record.ciphertext_sha256 = Some(encrypted.ciphertext_sha256);
                            ledger.save()?;
                            info!(
                                artifact = %path.display(),
                                from = %Stage::Plaintext,
                                to = %Stage::Encrypted,
                                "stage advanced"
                            );
                            self.dispose_plaintext(path, summary);
                        }
                        Err(e) => {
                            error!(artifact = %path.display(), error = %e, "encryption failed");
                            summary.record_failure(&path_key, Stage::Plaintext, &e);
                            break;
                        }
                    }
                    summary.encrypted += 1;
                }
                PendingAction::Sync => match dispatcher.ship(&path_key, &entry) {
                    Ok(true) => {
                        ledger.advance(path, kind, Stage::Synced, now)?;
                        ledger.save()?;
                        info!(
                            artifact = %path.display(),
                            from = %Stage::Encrypted,
                            to = %Stage::Synced,
                            "stage advanced"
                        );
                        summary.synced += 1;
                    }
                    Ok(false) => break,
                    Err(e) => {
                        error!(artifact = %path.display(), error = %e, "transfer failed");
                        summary.record_failure(&path_key, Stage::Encrypted, &e);
                        break;
                    }
                },
                PendingAction::Purge => match reaper.purge(&path_key, &entry) {
                    Ok(Some(outcome)) => {
                        ledger.advance(path, kind, Stage::Purged, now)?;
                        ledger.save()?;
                        info!(
                            artifact = %path.display(),
                            from = %Stage::Synced,
                            to = %Stage::Purged,
                            files = outcome.files_removed,
                            bytes = outcome.bytes_reclaimed,
                            "stage advanced"
                        );
                        summary.purged += 1;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(artifact = %path.display(), error = %e, "purge failed");
                        summary.record_failure(&path_key, Stage::Synced, &e);
                        break;
                    }
                },
            }
            advanced = true;
        }

        if !advanced && artifact.is_some() && ledger.stage_of(path) == Stage::Plaintext {
            summary.skipped += 1;
        }
        Ok(())
    }

    /// Apply the configured plaintext disposal policy after a ledger commit
    ///
    /// A disposal failure never rolls the stage back; the leftover plaintext
    /// is reported and removed by a later purge.
    fn dispose_plaintext(&self, path: &Path, summary: &mut RunSummary) {
        if self.config.encryption.plaintext_after_encrypt != PlaintextDisposal::Remove {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(artifact = %path.display(), error = %e, "plaintext removal failed");
                summary.record_failure(&path.to_string_lossy(), Stage::Encrypted, &e);
            }
        }
    }
}
