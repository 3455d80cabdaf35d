//! Artifact records and type classification
//!
//! Artifacts are classified by extension convention: `.ttyrec` for recorded
//! terminal sessions, `.log` for per-user activity logs, `.sqlite` for
//! per-user state databases. Age is derived from the modification time and is
//! only consulted while an artifact is still at the Plaintext stage; all later
//! stage decisions come from the ledger.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Artifact type, by extension convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Recorded terminal-session transcript
    Ttyrec,
    /// Per-user activity log
    Userlog,
    /// Per-user state database
    Sqlite,
}

impl ArtifactKind {
    /// All artifact kinds, in scan order
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Ttyrec,
        ArtifactKind::Userlog,
        ArtifactKind::Sqlite,
    ];

    /// File extension this kind is recognized by
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Ttyrec => "ttyrec",
            ArtifactKind::Userlog => "log",
            ArtifactKind::Sqlite => "sqlite",
        }
    }

    /// Classify a path by its extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.extension() == ext)
    }

    /// Minimum encryption delay (days) that configuration may not go below
    ///
    /// Log and database artifacts carry a 31-day floor regardless of the
    /// configured value; session recordings have no floor.
    pub fn delay_floor_days(&self) -> i64 {
        match self {
            ArtifactKind::Ttyrec => 0,
            ArtifactKind::Userlog | ArtifactKind::Sqlite => 31,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactKind::Ttyrec => "ttyrec",
            ArtifactKind::Userlog => "userlog",
            ArtifactKind::Sqlite => "sqlite",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ttyrec" => Ok(ArtifactKind::Ttyrec),
            "userlog" => Ok(ArtifactKind::Userlog),
            "sqlite" => Ok(ArtifactKind::Sqlite),
            _ => Err(format!("unknown artifact kind: {}", s)),
        }
    }
}

/// A candidate artifact discovered on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Absolute path of the plaintext file
    pub path: PathBuf,

    /// Classified type
    pub kind: ArtifactKind,

    /// Modification time, the basis of the age check
    pub modified_at: DateTime<Utc>,

    /// Size in bytes at scan time
    pub size_bytes: u64,
}

impl Artifact {
    /// Build an artifact record from file metadata
    pub fn from_file(path: PathBuf, kind: ArtifactKind) -> io::Result<Self> {
        let meta = fs::metadata(&path)?;
        let modified_at: DateTime<Utc> = meta.modified()?.into();
        Ok(Self {
            path,
            kind,
            modified_at,
            size_bytes: meta.len(),
        })
    }

    /// Whole days elapsed since the modification time
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.modified_at).num_days()
    }
}
