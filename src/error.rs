//! Top-level pipeline error taxonomy
//!
//! Fatal classes abort the run before (Config) or at (Lock, Ledger, Io) the
//! point they occur and map to the process exit codes of the invocation
//! surface. Per-artifact recoverable failures never surface here; they are
//! captured in the run summary and the run continues.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::lock::LockError;

/// Fatal errors that abort an entire pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("run cancelled by signal")]
    Cancelled,
}

impl PipelineError {
    /// Process exit code for this error
    ///
    /// 1 = configuration invalid (no artifacts processed),
    /// 3 = lock or fatal I/O failure aborting the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Lock(_) => 3,
            PipelineError::Ledger(_) => 3,
            PipelineError::Io(_) => 3,
            PipelineError::Cancelled => 3,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
