//! Pipeline configuration
//!
//! Loaded from a single TOML file (default `/etc/coldstore/coldstore.toml`).
//! Validation is strict and runs before any artifact is touched: threshold
//! floors, encryption layer shape, and transport template placeholders are
//! all checked at load time and a violation is a fatal ConfigError.

mod defaults;

pub use defaults::{
    default_gpg_binary, default_ledger_path, default_lock_path, default_transport_command,
    DEFAULT_CONFIG_PATH, DEFAULT_REMOVAL_DELAY_DAYS, DEFAULT_TTYREC_DELAY_DAYS,
    LOG_DELAY_FLOOR_DAYS,
};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::ArtifactKind;
use crate::transport::{ARTIFACT_PLACEHOLDER, DESTINATION_PLACEHOLDER};

/// Configuration errors; all fatal, nothing is processed after one
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{kind} delay of {days} days is below the {floor}-day floor")]
    ThresholdBelowFloor {
        kind: ArtifactKind,
        days: i64,
        floor: i64,
    },

    #[error("{kind} delay of {days} days is negative")]
    NegativeThreshold { kind: ArtifactKind, days: i64 },

    #[error("no encryption layers configured")]
    NoLayers,

    #[error("encryption layer {index} has no recipients")]
    EmptyLayer { index: usize },

    #[error("signing key id is empty")]
    MissingSigningKey,

    #[error("keystore \"memory\" does not persist keys; plaintext_after_encrypt must be \"keep\"")]
    MemoryKeystoreRemovesPlaintext,

    #[error("transport command is empty")]
    EmptyTransportCommand,

    #[error("removal delay of {days} days is negative")]
    NegativeRemovalDelay { days: i64 },

    #[error("transport command is missing the {placeholder} placeholder")]
    MissingPlaceholder { placeholder: &'static str },

    #[error("invalid exclude pattern {pattern}: {source}")]
    BadExcludePattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("source root for {kind} is not readable: {path}: {source}")]
    UnreadableRoot {
        kind: ArtifactKind,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Source directory roots, one per artifact type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Root for `.ttyrec` session recordings
    pub ttyrec_dir: Option<PathBuf>,

    /// Root for `.log` per-user activity logs
    pub userlog_dir: Option<PathBuf>,

    /// Root for `.sqlite` per-user state databases
    pub sqlite_dir: Option<PathBuf>,

    /// Glob patterns to skip while scanning (relative to the roots)
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl SourcesConfig {
    /// Configured root for a kind, if any
    pub fn root_for(&self, kind: ArtifactKind) -> Option<&Path> {
        match kind {
            ArtifactKind::Ttyrec => self.ttyrec_dir.as_deref(),
            ArtifactKind::Userlog => self.userlog_dir.as_deref(),
            ArtifactKind::Sqlite => self.sqlite_dir.as_deref(),
        }
    }
}

/// Per-type minimum age before encryption eligibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    /// Days before a session recording becomes eligible
    #[serde(default = "default_ttyrec_days")]
    pub ttyrec_days: i64,

    /// Days before an activity log becomes eligible (floor 31)
    #[serde(default = "default_floor_days")]
    pub userlog_days: i64,

    /// Days before a state database becomes eligible (floor 31)
    #[serde(default = "default_floor_days")]
    pub sqlite_days: i64,
}

fn default_ttyrec_days() -> i64 {
    DEFAULT_TTYREC_DELAY_DAYS
}

fn default_floor_days() -> i64 {
    LOG_DELAY_FLOOR_DAYS
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ttyrec_days: DEFAULT_TTYREC_DELAY_DAYS,
            userlog_days: LOG_DELAY_FLOOR_DAYS,
            sqlite_days: LOG_DELAY_FLOOR_DAYS,
        }
    }
}

impl Thresholds {
    /// Configured delay for a kind
    pub fn delay_days(&self, kind: ArtifactKind) -> i64 {
        match kind {
            ArtifactKind::Ttyrec => self.ttyrec_days,
            ArtifactKind::Userlog => self.userlog_days,
            ArtifactKind::Sqlite => self.sqlite_days,
        }
    }

    /// Reject negative delays and floor violations
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in ArtifactKind::ALL {
            let days = self.delay_days(kind);
            if days < 0 {
                return Err(ConfigError::NegativeThreshold { kind, days });
            }
            let floor = kind.delay_floor_days();
            if days < floor {
                return Err(ConfigError::ThresholdBelowFloor { kind, days, floor });
            }
        }
        Ok(())
    }
}

/// What happens to the plaintext once its ciphertext is installed and the
/// ledger records Encrypted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaintextDisposal {
    /// Remove the plaintext immediately after the ledger commit
    #[default]
    Remove,
    /// Keep the plaintext until the artifact is purged as a whole
    Keep,
}

/// Key-store backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeystoreBackend {
    /// Spawn the gpg binary
    #[default]
    Gpg,
    /// Self-contained in-process keys; testing and dry runs only
    Memory,
}

/// Signing and layered-encryption settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Directory where ciphertexts are built and installed
    pub staging_dir: PathBuf,

    /// Ordered recipient layers; each layer wraps the previous ciphertext
    /// and any one key within a layer can later open that layer
    pub layers: Vec<Vec<String>>,

    /// Key id used for the detached signature over the plaintext
    pub signing_key: String,

    /// Passphrase for the signing key
    #[serde(default)]
    pub passphrase: String,

    /// Plaintext disposal policy after encryption
    #[serde(default)]
    pub plaintext_after_encrypt: PlaintextDisposal,

    /// Key-store backend
    #[serde(default)]
    pub keystore: KeystoreBackend,

    /// gpg binary (gpg backend only)
    #[serde(default = "default_gpg_binary")]
    pub gpg_binary: PathBuf,

    /// Alternate gpg home directory (gpg backend only)
    #[serde(default)]
    pub gpg_home: Option<PathBuf>,
}

impl EncryptionConfig {
    /// All recipient key ids across all layers, outermost last
    pub fn recipient_ids(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flatten().map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.signing_key.is_empty() {
            return Err(ConfigError::MissingSigningKey);
        }
        if self.layers.is_empty() {
            return Err(ConfigError::NoLayers);
        }
        for (index, layer) in self.layers.iter().enumerate() {
            if layer.is_empty() || layer.iter().all(String::is_empty) {
                return Err(ConfigError::EmptyLayer { index });
            }
        }
        // Memory keys die with the process; removing the plaintext after
        // encrypting to them would destroy the only recoverable copy
        if self.keystore == KeystoreBackend::Memory
            && self.plaintext_after_encrypt == PlaintextDisposal::Remove
        {
            return Err(ConfigError::MemoryKeystoreRemovesPlaintext);
        }
        Ok(())
    }
}

/// Offsite destination and transport command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Destination URI handed to the transport command
    pub destination: String,

    /// Transport command template; `{artifact}` and `{destination}` are
    /// substituted per transfer
    #[serde(default = "default_transport_command")]
    pub command: Vec<String>,

    /// Optional reachability probe for config-test; `{destination}` is
    /// substituted
    #[serde(default)]
    pub probe_command: Option<Vec<String>>,

    /// Days after a confirmed sync before local copies may be removed
    #[serde(default)]
    pub removal_delay_days: i64,
}

impl SyncConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.command.is_empty() {
            return Err(ConfigError::EmptyTransportCommand);
        }
        for placeholder in [ARTIFACT_PLACEHOLDER, DESTINATION_PLACEHOLDER] {
            if !self.command.iter().any(|arg| arg.contains(placeholder)) {
                return Err(ConfigError::MissingPlaceholder { placeholder });
            }
        }
        if self.removal_delay_days < 0 {
            return Err(ConfigError::NegativeRemovalDelay {
                days: self.removal_delay_days,
            });
        }
        Ok(())
    }
}

/// Ledger store location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

/// Run lock location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_path")]
    pub path: PathBuf,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            path: default_lock_path(),
        }
    }
}

/// Log output target; stderr when no file is configured
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub file: Option<PathBuf>,
}

/// External account-validator collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountFilterConfig {
    /// Command invoked with the account name as sole extra argument
    pub command: Vec<String>,

    /// Whether a failure exit (2-4) from the validator blocks the account
    #[serde(default)]
    pub deny_on_failure: bool,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    pub encryption: EncryptionConfig,

    /// Absent table disables both the Sync and Purge stages
    #[serde(default)]
    pub sync: Option<SyncConfig>,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub account_filter: Option<AccountFilterConfig>,
}

impl Config {
    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate thresholds, layer shape, and transport template
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.encryption.validate()?;
        if let Some(sync) = &self.sync {
            sync.validate()?;
        }
        Ok(())
    }
}
