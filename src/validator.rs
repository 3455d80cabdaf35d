//! Configuration dry run
//!
//! Exercises every external dependency of a run without mutating anything:
//! a sign/verify round trip with the configured signing key, resolution of
//! every recipient key id across all layers, staging-directory writability,
//! and a destination reachability probe when one is configured. The report
//! names the first failing check and the offending identifier so an operator
//! can fix configuration before artifacts age into eligibility.

use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::config::Config;
use crate::keystore::KeyStore;
use crate::transport::Transport;

/// What a single check exercised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    Signing,
    Recipient,
    Staging,
    Destination,
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckCategory::Signing => "signing",
            CheckCategory::Recipient => "recipient",
            CheckCategory::Staging => "staging",
            CheckCategory::Destination => "destination",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of one check
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    pub category: CheckCategory,

    /// Key id, directory, or destination the check exercised
    pub subject: String,

    /// None when the check passed
    pub error: Option<String>,
}

/// All check outcomes for one validation pass
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<Check>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.error.is_none())
    }

    /// First failing check, in execution order
    pub fn first_failure(&self) -> Option<&Check> {
        self.checks.iter().find(|c| c.error.is_some())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            match &check.error {
                None => writeln!(f, "ok    {} {}", check.category, check.subject)?,
                Some(error) => {
                    writeln!(f, "FAIL  {} {}: {}", check.category, check.subject, error)?
                }
            }
        }
        if self.passed() {
            write!(f, "configuration ok")
        } else {
            write!(f, "configuration invalid")
        }
    }
}

/// Dry-run validator over a loaded configuration
pub struct ConfigValidator<'a> {
    config: &'a Config,
    keystore: &'a dyn KeyStore,
    transport: Option<&'a dyn Transport>,
}

impl<'a> ConfigValidator<'a> {
    pub fn new(
        config: &'a Config,
        keystore: &'a dyn KeyStore,
        transport: Option<&'a dyn Transport>,
    ) -> Self {
        Self {
            config,
            keystore,
            transport,
        }
    }

    /// Run every check; never stops at the first failure
    pub fn validate(&self) -> ValidationReport {
        let mut checks = Vec::new();

        checks.push(self.check_signing());
        for id in self.config.encryption.recipient_ids() {
            checks.push(Check {
                category: CheckCategory::Recipient,
                subject: id.to_string(),
                error: self.keystore.resolve(id).err().map(|e| e.to_string()),
            });
        }
        checks.push(self.check_staging());
        if let Some(transport) = self.transport {
            let destination = self
                .config
                .sync
                .as_ref()
                .map(|s| s.destination.clone())
                .unwrap_or_default();
            checks.push(Check {
                category: CheckCategory::Destination,
                subject: destination,
                error: transport.probe().err().map(|e| e.to_string()),
            });
        }

        ValidationReport { checks }
    }

    fn check_signing(&self) -> Check {
        let encryption = &self.config.encryption;
        let sample = b"coldstore config-test";
        let error = self
            .keystore
            .sign(sample, &encryption.signing_key, &encryption.passphrase)
            .and_then(|signature| {
                self.keystore
                    .verify(sample, &signature, &encryption.signing_key)
            })
            .map_err(|e| e.to_string())
            .and_then(|verified| {
                if verified {
                    Ok(())
                } else {
                    Err("signature did not verify".to_string())
                }
            })
            .err();

        Check {
            category: CheckCategory::Signing,
            subject: encryption.signing_key.clone(),
            error,
        }
    }

    /// Writability of the staging directory without creating it
    ///
    /// The directory may not exist yet on a fresh host; in that case the
    /// nearest existing ancestor must be writable, since a run will
    /// create_dir_all on its way through.
    fn check_staging(&self) -> Check {
        let staging = &self.config.encryption.staging_dir;
        let target = nearest_existing(staging);

        let error = NamedTempFile::new_in(target)
            .and_then(|mut file| file.write_all(b"probe").map(|_| file))
            .err()
            .map(|e| e.to_string());

        Check {
            category: CheckCategory::Staging,
            subject: staging.display().to_string(),
            error,
        }
    }
}

/// Closest ancestor of `path` that exists on disk
fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    loop {
        if current.exists() {
            return current;
        }
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
}
