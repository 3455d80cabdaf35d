//! coldstore - audit-artifact encryption and offsite retention pipeline
//!
//! This crate ages audit artifacts (session-recording transcripts, per-user
//! activity logs, per-user state databases) from plaintext on local disk
//! through signing, multi-layer recipient encryption, offsite synchronization
//! via an operator-supplied transport command, and eventual local purge.
//!
//! Each invocation is a batch run driven by a persisted per-artifact ledger,
//! so repeated runs are idempotent and a run terminated at any point leaves
//! every artifact in a valid prior stage.

pub mod account;
pub mod advancer;
pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod lock;
pub mod logging;
pub mod pipeline;
pub mod reaper;
pub mod scanner;
pub mod signal;
pub mod summary;
pub mod sync;
pub mod transport;
pub mod validator;

pub use artifact::{Artifact, ArtifactKind};
pub use config::{Config, ConfigError};
pub use error::PipelineError;
pub use ledger::{Ledger, LedgerEntry, Stage};
pub use pipeline::Pipeline;
pub use summary::RunSummary;
pub use validator::{ConfigValidator, ValidationReport};
