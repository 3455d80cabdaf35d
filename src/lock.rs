//! Exclusive run lock
//!
//! At most one pipeline run may execute per host. The lock is a file created
//! with O_EXCL carrying the holder's pid and start time; a second run that
//! observes a live holder exits immediately instead of blocking. A lock left
//! behind by a dead process is broken and re-acquired. The file is removed on
//! Drop, covering both normal exit and unwinding.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Lock failures; fatal for the new run, which must not touch any artifact
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another run holds the lock at {path} (pid {pid})")]
    Held { path: PathBuf, pid: u32 },

    #[error("I/O error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Contents written into the lock file
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    started_at: DateTime<Utc>,
}

/// Held run lock; released on Drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to acquire the lock, breaking it first if the holder is dead
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        match Self::try_create(path) {
            Ok(lock) => Ok(lock),
            Err(LockError::Held { pid, .. }) if !is_process_alive(pid) => {
                warn!(path = %path.display(), pid, "breaking stale run lock");
                fs::remove_file(path).map_err(|source| LockError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::try_create(path)
            }
            Err(e) => Err(e),
        }
    }

    fn try_create(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(Self::read_holder(path));
            }
            Err(source) => return Err(io_err(source)),
        };

        let content = LockContent {
            pid: std::process::id(),
            started_at: Utc::now(),
        };
        let json = serde_json::to_string(&content)
            .map_err(|e| io_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        file.write_all(json.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Interpret an existing lock file; unreadable content counts as a dead
    /// holder so a corrupt lock cannot wedge the pipeline forever
    fn read_holder(path: &Path) -> LockError {
        let pid = fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str::<LockContent>(&text).ok())
            .map(|content| content.pid)
            .unwrap_or(0);
        LockError::Held {
            path: path.to_path_buf(),
            pid,
        }
    }

    /// Path of the held lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Liveness check for a recorded holder pid
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn is_process_alive(pid: u32) -> bool {
    // Conservative: only pid 0 (unreadable lock content) counts as dead
    pid != 0
}
