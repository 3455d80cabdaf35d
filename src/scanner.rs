//! Candidate artifact enumeration
//!
//! Walks the per-type source roots and yields classified artifact records.
//! The scan is lazy and restartable, and never mutates anything on disk.
//! An unreadable root is fatal for that type only; other types continue.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::artifact::{Artifact, ArtifactKind};
use crate::config::{ConfigError, SourcesConfig};

/// Directory walker producing classified artifacts
#[derive(Debug)]
pub struct Scanner<'a> {
    sources: &'a SourcesConfig,
    exclude: GlobSet,
}

impl<'a> Scanner<'a> {
    /// Build a scanner; invalid exclude patterns are a ConfigError
    pub fn new(sources: &'a SourcesConfig) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &sources.exclude {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::BadExcludePattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|source| ConfigError::BadExcludePattern {
                pattern: sources.exclude.join(","),
                source,
            })?;

        Ok(Self { sources, exclude })
    }

    /// Lazily scan the root for one artifact type
    ///
    /// Returns `Ok(None)` when no root is configured for the type. The root
    /// itself must be readable; errors on individual entries below it are
    /// logged and skipped so one bad file cannot mask the rest of the type.
    pub fn scan_kind(
        &self,
        kind: ArtifactKind,
    ) -> Result<Option<impl Iterator<Item = Artifact> + '_>, ConfigError> {
        let root = match self.sources.root_for(kind) {
            Some(root) => root,
            None => return Ok(None),
        };

        // Fail the whole type up front if the root cannot be opened
        std::fs::read_dir(root).map_err(|source| ConfigError::UnreadableRoot {
            kind,
            path: root.to_path_buf(),
            source,
        })?;

        let root_owned = root.to_path_buf();
        let iter = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(move |entry| {
                let path = entry.path();
                if ArtifactKind::from_path(path) != Some(kind) {
                    return None;
                }
                let relative = path.strip_prefix(&root_owned).unwrap_or(path);
                if self.exclude.is_match(relative) {
                    return None;
                }
                match Artifact::from_file(path.to_path_buf(), kind) {
                    Ok(artifact) => Some(artifact),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable file");
                        None
                    }
                }
            });

        Ok(Some(iter))
    }

    /// Scan every configured type, collecting per-type failures
    ///
    /// Failures do not interrupt the scan of other types.
    pub fn scan_all(&self) -> (Vec<Artifact>, Vec<ConfigError>) {
        let mut artifacts = Vec::new();
        let mut failures = Vec::new();

        for kind in ArtifactKind::ALL {
            match self.scan_kind(kind) {
                Ok(Some(iter)) => artifacts.extend(iter),
                Ok(None) => {}
                Err(e) => failures.push(e),
            }
        }

        (artifacts, failures)
    }

    /// Root directory configured for a type, if any
    pub fn root_for(&self, kind: ArtifactKind) -> Option<&Path> {
        self.sources.root_for(kind)
    }
}
