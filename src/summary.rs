//! End-of-run accounting
//!
//! Counts per stage, per-artifact failure records, and wall-clock duration,
//! rendered human-readable by default or as JSON with `--json`. The summary
//! also decides the run's exit code: any recorded failure makes the run a
//! partial failure even though it ran to completion.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::ledger::Stage;

/// One artifact that failed to advance this run
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    /// Artifact source path (or source root for scan failures)
    pub artifact: String,

    /// Stage the artifact was at when the failure occurred
    pub stage: Stage,

    /// Rendered error
    pub error: String,
}

/// Aggregated outcome of one pipeline run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub scanned: usize,
    pub encrypted: usize,
    pub synced: usize,
    pub purged: usize,
    pub skipped: usize,
    pub failures: Vec<FailureRecord>,
    pub duration_ms: u64,

    #[serde(skip)]
    started: Instant,
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            scanned: 0,
            encrypted: 0,
            synced: 0,
            purged: 0,
            skipped: 0,
            failures: Vec::new(),
            duration_ms: 0,
            started: Instant::now(),
        }
    }

    /// Record a recoverable per-artifact failure
    pub fn record_failure(&mut self, artifact: &str, stage: Stage, error: &dyn fmt::Display) {
        self.failures.push(FailureRecord {
            artifact: artifact.to_string(),
            stage,
            error: error.to_string(),
        });
    }

    /// Stamp the duration; call once, at the end of the run
    pub fn finish(&mut self) {
        self.duration_ms = self.started.elapsed().as_millis() as u64;
    }

    /// Whether every artifact processed without error
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// 0 when clean, 2 when any artifact failed but the run completed
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            2
        }
    }

    /// JSON rendering for `--json`
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scanned {}, encrypted {}, synced {}, purged {}, skipped {} ({} ms)",
            self.scanned, self.encrypted, self.synced, self.purged, self.skipped, self.duration_ms
        )?;
        if self.failures.is_empty() {
            write!(f, "no failures")?;
        } else {
            write!(f, "{} failure(s):", self.failures.len())?;
            for failure in &self.failures {
                write!(
                    f,
                    "\n  {} [{}]: {}",
                    failure.artifact, failure.stage, failure.error
                )?;
            }
        }
        Ok(())
    }
}
