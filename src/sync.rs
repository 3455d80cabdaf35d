//! Offsite synchronization stage
//!
//! Ships the installed ciphertext and its detached signature through the
//! transport for every Encrypted artifact without a Synced timestamp. With
//! no destination configured the dispatcher is disabled and every artifact
//! is a silent no-op, never an error.

use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::ledger::LedgerEntry;
use crate::transport::{Transport, TransportError};

/// Sync failures; recoverable per artifact
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("ledger entry for {0} has no installed ciphertext recorded")]
    MissingCiphertext(PathBuf),
}

/// Transfers encrypted artifacts to the configured destination
pub struct SyncDispatcher<'a> {
    transport: Option<&'a dyn Transport>,
}

impl<'a> SyncDispatcher<'a> {
    pub fn new(transport: Option<&'a dyn Transport>) -> Self {
        Self { transport }
    }

    /// Whether a destination is configured at all
    pub fn enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Ship one artifact's ciphertext and signature
    ///
    /// Returns Ok(false) when no destination is configured. The ciphertext
    /// goes first; the signature only ships once the ciphertext transfer has
    /// succeeded.
    pub fn ship(&self, artifact_path: &str, entry: &LedgerEntry) -> Result<bool, SyncError> {
        let transport = match self.transport {
            Some(t) => t,
            None => return Ok(false),
        };

        let ciphertext = entry
            .ciphertext_path
            .as_deref()
            .ok_or_else(|| SyncError::MissingCiphertext(PathBuf::from(artifact_path)))?;

        transport.send(ciphertext)?;
        debug!(artifact = artifact_path, "ciphertext transferred");

        if let Some(signature) = entry.signature_path.as_deref() {
            transport.send(signature)?;
            debug!(artifact = artifact_path, "signature transferred");
        }

        Ok(true)
    }
}
