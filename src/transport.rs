//! Opaque transport collaborator
//!
//! The pipeline never implements a transfer protocol itself: it renders the
//! operator-supplied command template with the artifact path and destination
//! substituted, spawns it, and interprets nothing but the exit status.

use std::path::Path;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::config::SyncConfig;

/// Placeholder replaced by the local artifact path
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// Placeholder replaced by the destination URI
pub const DESTINATION_PLACEHOLDER: &str = "{destination}";

/// Transport failures; recoverable per artifact, retried next run
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport command exited with status {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },

    #[error("transport command terminated by signal")]
    Terminated,

    #[error("failed to spawn transport command {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("destination not reachable: {0}")]
    Unreachable(String),
}

/// External transfer capability
pub trait Transport {
    /// Transfer one local file to the destination
    fn send(&self, artifact: &Path) -> Result<(), TransportError>;

    /// Lightweight reachability check of the destination
    fn probe(&self) -> Result<(), TransportError>;
}

/// Transport that spawns the configured command template
pub struct CommandTransport {
    destination: String,
    template: Vec<String>,
    probe_command: Option<Vec<String>>,
}

impl CommandTransport {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            destination: config.destination.clone(),
            template: config.command.clone(),
            probe_command: config.probe_command.clone(),
        }
    }

    /// Substitute placeholders into a template
    fn render(&self, template: &[String], artifact: &Path) -> Vec<String> {
        template
            .iter()
            .map(|arg| {
                arg.replace(ARTIFACT_PLACEHOLDER, &artifact.to_string_lossy())
                    .replace(DESTINATION_PLACEHOLDER, &self.destination)
            })
            .collect()
    }

    fn run(&self, argv: &[String]) -> Result<(), TransportError> {
        if argv.is_empty() {
            return Err(TransportError::Spawn {
                command: String::new(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            });
        }
        let output = Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .map_err(|source| TransportError::Spawn {
                command: argv[0].clone(),
                source,
            })?;

        match output.status.code() {
            Some(0) => Ok(()),
            Some(status) => Err(TransportError::CommandFailed {
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
            None => Err(TransportError::Terminated),
        }
    }
}

impl Transport for CommandTransport {
    fn send(&self, artifact: &Path) -> Result<(), TransportError> {
        let argv = self.render(&self.template, artifact);
        debug!(command = ?argv, "running transport command");
        self.run(&argv)
    }

    fn probe(&self) -> Result<(), TransportError> {
        if let Some(template) = &self.probe_command {
            let argv = self.render(template, Path::new(""));
            return self
                .run(&argv)
                .map_err(|e| TransportError::Unreachable(e.to_string()));
        }

        if let Some((host, _)) = self.destination.split_once(':') {
            // Remote destination without an explicit probe: a batch-mode ssh
            // no-op mirrors what the default rsync transport will need
            let argv: Vec<String> = [
                "ssh",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                host,
                "true",
            ]
            .into_iter()
            .map(String::from)
            .collect();
            return self
                .run(&argv)
                .map_err(|e| TransportError::Unreachable(e.to_string()));
        }

        // Local destination: it must be an existing directory
        let path = Path::new(&self.destination);
        if path.is_dir() {
            Ok(())
        } else {
            Err(TransportError::Unreachable(format!(
                "{} is not a directory",
                self.destination
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sync_config(destination: &str, command: &[&str]) -> SyncConfig {
        SyncConfig {
            destination: destination.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            probe_command: None,
            removal_delay_days: 0,
        }
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let config = sync_config(
            "backup@vault:/srv",
            &["rsync", "-a", "--", "{artifact}", "{destination}/"],
        );
        let transport = CommandTransport::new(&config);
        let argv = transport.render(&transport.template, Path::new("/var/a.enc"));
        assert_eq!(
            argv,
            vec!["rsync", "-a", "--", "/var/a.enc", "backup@vault:/srv/"]
        );
    }

    #[test]
    fn test_send_success_and_failure() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("a.enc");
        std::fs::write(&artifact, b"ct").unwrap();
        let dest = dir.path().join("dest");
        std::fs::create_dir_all(&dest).unwrap();

        let ok = sync_config(
            dest.to_str().unwrap(),
            &["cp", "{artifact}", "{destination}"],
        );
        CommandTransport::new(&ok).send(&artifact).unwrap();
        assert!(dest.join("a.enc").exists());

        let fail = sync_config(dest.to_str().unwrap(), &["false", "{artifact}", "{destination}"]);
        assert!(matches!(
            CommandTransport::new(&fail).send(&artifact),
            Err(TransportError::CommandFailed { status: 1, .. })
        ));
    }

    #[test]
    fn test_spawn_failure() {
        let config = sync_config("/tmp", &["/nonexistent/bin", "{artifact}", "{destination}"]);
        assert!(matches!(
            CommandTransport::new(&config).send(Path::new("/tmp/a")),
            Err(TransportError::Spawn { .. })
        ));
    }

    #[test]
    fn test_probe_local_directory() {
        let dir = TempDir::new().unwrap();
        let config = sync_config(
            dir.path().to_str().unwrap(),
            &["cp", "{artifact}", "{destination}"],
        );
        CommandTransport::new(&config).probe().unwrap();

        let missing = PathBuf::from(dir.path().join("missing"));
        let config = sync_config(
            missing.to_str().unwrap(),
            &["cp", "{artifact}", "{destination}"],
        );
        assert!(matches!(
            CommandTransport::new(&config).probe(),
            Err(TransportError::Unreachable(_))
        ));
    }

    #[test]
    fn test_probe_command_overrides() {
        let mut config = sync_config("ignored", &["cp", "{artifact}", "{destination}"]);
        config.probe_command = Some(vec!["true".to_string()]);
        CommandTransport::new(&config).probe().unwrap();

        config.probe_command = Some(vec!["false".to_string()]);
        assert!(CommandTransport::new(&config).probe().is_err());
    }
}
